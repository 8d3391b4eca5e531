use crate::{Fault, TestVM, arg};
use vm::{ObjId, Tensor, op::FusedRoPE};

impl FusedRoPE for TestVM {
    fn fused_rope_fwd<'vm>(
        &'vm self,
        stack: ObjId,
        input: &Tensor<'vm, Self>,
        cos: &Tensor<'vm, Self>,
        sin: &Tensor<'vm, Self>,
        transpose_output: bool,
    ) -> Result<Tensor<'vm, Self>, Fault> {
        self.rope("fused_rope_fwd", stack, input, cos, sin, transpose_output)
    }

    fn fused_rope_bwd<'vm>(
        &'vm self,
        stack: ObjId,
        output_grads: &Tensor<'vm, Self>,
        cos: &Tensor<'vm, Self>,
        sin: &Tensor<'vm, Self>,
        transpose_output: bool,
    ) -> Result<Tensor<'vm, Self>, Fault> {
        self.rope("fused_rope_bwd", stack, output_grads, cos, sin, transpose_output)
    }
}

impl TestVM {
    fn rope<'vm>(
        &'vm self,
        op: &'static str,
        stack: ObjId,
        x: &Tensor<'vm, Self>,
        cos: &Tensor<'vm, Self>,
        sin: &Tensor<'vm, Self>,
        transpose_output: bool,
    ) -> Result<Tensor<'vm, Self>, Fault> {
        let &[s, b, h, d] = x.shape() else { panic!() };
        let y = if transpose_output {
            // 存储按 [b, s, h, d] 排布，转置回 [s, b, h, d]
            self.alloc_tensor(&stack, x.dt(), &[b, s, h, d])
                .transpose(&[1, 0, 2, 3])
        } else {
            self.alloc_tensor(&stack, x.dt(), &[s, b, h, d])
        };

        self.launch(
            op,
            stack,
            format!(
                "{op}({}, {}, {}, {transpose_output}) -> %{}",
                arg(x),
                arg(cos),
                arg(sin),
                y.blob().id(),
            ),
        )?;
        Ok(y)
    }
}
