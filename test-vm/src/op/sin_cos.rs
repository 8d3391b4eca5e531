use crate::{Fault, TestVM, arg};
use vm::{ObjId, Tensor, op::SinCos};

impl SinCos for TestVM {
    fn sin_cos(
        &self,
        stack: ObjId,
        sin: &mut Tensor<Self>,
        cos: &mut Tensor<Self>,
        freqs: &Tensor<Self>,
    ) -> Result<(), Fault> {
        assert_eq!(sin.dt(), freqs.dt());
        assert_eq!(cos.dt(), freqs.dt());
        assert_eq!(sin.shape(), freqs.shape());
        assert_eq!(cos.shape(), freqs.shape());

        self.launch(
            "sin_cos",
            stack,
            format!("sin_cos(mut {}, mut {}, {})", arg(sin), arg(cos), arg(freqs)),
        )
    }
}
