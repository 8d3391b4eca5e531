use crate::{Context, Error};
use vm::{Tensor, op::SinCos};

impl<'vm, VM> Context<'vm, VM>
where
    VM: SinCos + ?Sized,
{
    pub fn sin_cos(
        &self,
        sin: &mut Tensor<VM>,
        cos: &mut Tensor<VM>,
        freqs: &Tensor<VM>,
    ) -> Result<(), Error<VM::Error>> {
        self.vm()
            .sin_cos(self.stack(), sin, cos, freqs)
            .map_err(Error::Kernel)
    }
}
