use crate::{Context, Error, check::check};
use tracing::{debug, warn};
use vm::{ObjId, Tensor, op::FusedRoPE};

/// 检查参数后启动融合旋转位置编码的正向算子。
///
/// 任何一项检查失败都不会启动算子。`transpose_output` 原样传给算子，
/// 算子的返回值或错误原样返回。
pub fn forward<'vm, VM>(
    vm: &'vm VM,
    stack: ObjId,
    input: &Tensor<'vm, VM>,
    cos: &Tensor<'vm, VM>,
    sin: &Tensor<'vm, VM>,
    transpose_output: bool,
) -> Result<Tensor<'vm, VM>, Error<VM::Error>>
where
    VM: FusedRoPE + ?Sized,
{
    if let Err(e) = check("input", input, cos, sin) {
        warn!(%stack, "fused rope forward rejected: {e}");
        return Err(e.into());
    }
    debug!(
        %stack,
        input = ?input.shape(),
        table = ?cos.shape(),
        transpose_output,
        "fused rope forward"
    );
    vm.fused_rope_fwd(stack, input, cos, sin, transpose_output)
        .map_err(Error::Kernel)
}

/// 检查参数后启动融合旋转位置编码的反向算子，返回对正向输入的梯度。
pub fn backward<'vm, VM>(
    vm: &'vm VM,
    stack: ObjId,
    output_grads: &Tensor<'vm, VM>,
    cos: &Tensor<'vm, VM>,
    sin: &Tensor<'vm, VM>,
    transpose_output: bool,
) -> Result<Tensor<'vm, VM>, Error<VM::Error>>
where
    VM: FusedRoPE + ?Sized,
{
    if let Err(e) = check("output_grads", output_grads, cos, sin) {
        warn!(%stack, "fused rope backward rejected: {e}");
        return Err(e.into());
    }
    debug!(
        %stack,
        output_grads = ?output_grads.shape(),
        table = ?cos.shape(),
        transpose_output,
        "fused rope backward"
    );
    vm.fused_rope_bwd(stack, output_grads, cos, sin, transpose_output)
        .map_err(Error::Kernel)
}

impl<'vm, VM> Context<'vm, VM>
where
    VM: FusedRoPE + ?Sized,
{
    pub fn rope_forward(
        &self,
        input: &Tensor<'vm, VM>,
        cos: &Tensor<'vm, VM>,
        sin: &Tensor<'vm, VM>,
        transpose_output: bool,
    ) -> Result<Tensor<'vm, VM>, Error<VM::Error>> {
        forward(self.vm(), self.stack(), input, cos, sin, transpose_output)
    }

    pub fn rope_backward(
        &self,
        output_grads: &Tensor<'vm, VM>,
        cos: &Tensor<'vm, VM>,
        sin: &Tensor<'vm, VM>,
        transpose_output: bool,
    ) -> Result<Tensor<'vm, VM>, Error<VM::Error>> {
        backward(self.vm(), self.stack(), output_grads, cos, sin, transpose_output)
    }
}
