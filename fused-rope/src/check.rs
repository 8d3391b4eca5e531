use crate::InvalidArgument::{self, *};
use vm::{Tensor, VirtualMachine};

/// 检查 `x`（名为 `arg`）与 `cos`、`sin` 的形状和数据类型，返回首个不满足的约束。
///
/// 只读取元信息，不访问数据。
pub(crate) fn check<VM: VirtualMachine + ?Sized>(
    arg: &'static str,
    x: &Tensor<VM>,
    cos: &Tensor<VM>,
    sin: &Tensor<VM>,
) -> Result<(), InvalidArgument> {
    let &[seq, _, _, hidden] = x.shape() else {
        return Err(NotFourDim {
            arg,
            ndim: x.ndim(),
        });
    };
    let &[cos_seq, cos_b, cos_h, cos_dim] = cos.shape() else {
        return Err(NotFourDim {
            arg: "cos",
            ndim: cos.ndim(),
        });
    };
    let &[sin_seq, sin_b, sin_h, sin_dim] = sin.shape() else {
        return Err(NotFourDim {
            arg: "sin",
            ndim: sin.ndim(),
        });
    };

    if seq != cos_seq {
        return Err(SeqLenMismatch {
            arg,
            table: "cos",
            seq,
            table_seq: cos_seq,
        });
    }
    if seq != sin_seq {
        return Err(SeqLenMismatch {
            arg,
            table: "sin",
            seq,
            table_seq: sin_seq,
        });
    }
    if cos_b != 1 || cos_h != 1 {
        return Err(NotBroadcast {
            table: "cos",
            shape: [cos_seq, cos_b, cos_h, cos_dim],
        });
    }
    if sin_b != 1 || sin_h != 1 {
        return Err(NotBroadcast {
            table: "sin",
            shape: [sin_seq, sin_b, sin_h, sin_dim],
        });
    }
    if cos_dim != sin_dim {
        return Err(LastDimMismatch {
            cos: cos_dim,
            sin: sin_dim,
        });
    }
    if hidden < cos_dim {
        return Err(DimExceedsHidden {
            arg,
            hidden,
            dim: cos_dim,
        });
    }
    if cos.dt() != sin.dt() {
        return Err(DtypeMismatch {
            cos: cos.dt(),
            sin: sin.dt(),
        });
    }
    Ok(())
}
