use crate::{Context, Error, RoPEFunc};
use vm::{
    Tensor,
    op::{FusedRoPE, SinCos},
};

/// 用频率表 `freqs` 对 `t` 施加旋转位置编码。
///
/// `cos`、`sin` 表在设备上由 `freqs` 计算，与 `freqs` 形状和数据类型相同。
pub fn apply_rotary_pos_emb<'vm, VM>(
    ctx: &mut Context<'vm, VM>,
    t: &Tensor<'vm, VM>,
    freqs: &Tensor<'vm, VM>,
    transpose_output: bool,
) -> Result<(Tensor<'vm, VM>, RoPEFunc<'vm, VM>), Error<VM::Error>>
where
    VM: FusedRoPE + SinCos + ?Sized,
{
    let [sin, cos] = ctx.trap("freqs", |ctx| -> Result<_, Error<VM::Error>> {
        let mut sin = ctx.workspace(freqs.dt(), freqs.shape());
        let mut cos = ctx.workspace(freqs.dt(), freqs.shape());
        ctx.sin_cos(&mut sin, &mut cos, freqs)?;
        Ok([sin, cos])
    })?;
    apply_rotary_pos_emb_cached(ctx, t, cos, sin, transpose_output)
}

/// 用预先计算的 `cos`、`sin` 表对 `t` 施加旋转位置编码。
pub fn apply_rotary_pos_emb_cached<'vm, VM>(
    ctx: &Context<'vm, VM>,
    t: &Tensor<'vm, VM>,
    cos: Tensor<'vm, VM>,
    sin: Tensor<'vm, VM>,
    transpose_output: bool,
) -> Result<(Tensor<'vm, VM>, RoPEFunc<'vm, VM>), Error<VM::Error>>
where
    VM: FusedRoPE + ?Sized,
{
    RoPEFunc::forward(ctx, t, cos, sin, transpose_output)
}
