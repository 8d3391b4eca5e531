use crate::{Context, Error};
use vm::{Tensor, VirtualMachine, op::FusedRoPE};

/// 融合旋转位置编码的可微函数。
///
/// 正向时保存 `cos`、`sin` 表和 `transpose_output`，反向时用保存的值计算输入梯度。
/// 表和标志不需要梯度。
pub struct RoPEFunc<'vm, VM: VirtualMachine + ?Sized> {
    cos: Tensor<'vm, VM>,
    sin: Tensor<'vm, VM>,
    transpose_output: bool,
}

impl<'vm, VM> RoPEFunc<'vm, VM>
where
    VM: FusedRoPE + ?Sized,
{
    pub fn forward(
        ctx: &Context<'vm, VM>,
        t: &Tensor<'vm, VM>,
        cos: Tensor<'vm, VM>,
        sin: Tensor<'vm, VM>,
        transpose_output: bool,
    ) -> Result<(Tensor<'vm, VM>, Self), Error<VM::Error>> {
        let output = ctx.rope_forward(t, &cos, &sin, transpose_output)?;
        Ok((
            output,
            Self {
                cos,
                sin,
                transpose_output,
            },
        ))
    }

    /// 返回对正向输入 `t` 的梯度。
    pub fn backward(
        &self,
        ctx: &Context<'vm, VM>,
        grad_output: &Tensor<'vm, VM>,
    ) -> Result<Tensor<'vm, VM>, Error<VM::Error>> {
        let Self {
            cos,
            sin,
            transpose_output,
        } = self;
        ctx.rope_backward(grad_output, cos, sin, *transpose_output)
    }
}

impl<VM: VirtualMachine + ?Sized> RoPEFunc<'_, VM> {
    pub fn transpose_output(&self) -> bool {
        self.transpose_output
    }

    pub fn saved_tensors(&self) -> [&Tensor<'_, VM>; 2] {
        [&self.cos, &self.sin]
    }
}

#[cfg(test)]
mod test {
    use super::RoPEFunc;
    use crate::VirtualMachineExt;
    use digit_layout::types as ty;
    use test_vm::TestVM;
    use vm::VirtualMachine;

    #[test]
    fn test_saved_for_backward() {
        let vm = TestVM::default();
        let pid = vm.register("rope");
        let ctx = vm.context(pid, 0);

        let t = ctx.workspace(ty::BF16, &[16, 2, 8, 128]);
        let cos = ctx.workspace(ty::F32, &[16, 1, 1, 64]);
        let sin = ctx.workspace(ty::F32, &[16, 1, 1, 64]);
        let ids = [cos.blob().id(), sin.blob().id()];

        let (y, func) = RoPEFunc::forward(&ctx, &t, cos, sin, true).unwrap();
        assert!(func.transpose_output());
        assert_eq!(func.saved_tensors().map(|t| t.blob().id()), ids);

        let dy = ctx.workspace(ty::BF16, y.shape());
        let dx = func.backward(&ctx, &dy).unwrap();
        assert_eq!(dx.shape(), t.shape());

        let launches = vm.launches();
        assert_eq!(launches.len(), 2);
        assert_eq!(
            launches[1].info,
            format!(
                "fused_rope_bwd(%{}[16, 2, 8, 128], %{}[16, 1, 1, 64], %{}[16, 1, 1, 64], true) -> %{}",
                dy.blob().id(),
                ids[0],
                ids[1],
                dx.blob().id(),
            )
        );

        vm.unregister(pid)
    }

    #[test]
    fn test_backward_checked() {
        let vm = TestVM::default();
        let ctx = vm.context(vm.register("rope"), 0);

        let t = ctx.workspace(ty::F16, &[4, 1, 2, 32]);
        let cos = ctx.workspace(ty::F16, &[4, 1, 1, 32]);
        let sin = ctx.workspace(ty::F16, &[4, 1, 1, 32]);
        let (_, func) = RoPEFunc::forward(&ctx, &t, cos, sin, false).unwrap();

        // 梯度形状错误时不启动反向算子
        let dy = ctx.workspace(ty::F16, &[4, 1, 2, 16]);
        assert!(func.backward(&ctx, &dy).is_err());
        assert_eq!(vm.launches().len(), 1)
    }
}
