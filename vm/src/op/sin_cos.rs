use crate::{ObjId, Tensor, VirtualMachine};

/// 逐元素计算 `sin = sin(freqs)`，`cos = cos(freqs)`。
pub trait SinCos: VirtualMachine {
    fn sin_cos(
        &self,
        stack: ObjId,
        sin: &mut Tensor<Self>,
        cos: &mut Tensor<Self>,
        freqs: &Tensor<Self>,
    ) -> Result<(), Self::Error>;
}
