use digit_layout::DigitLayout;

/// 参数不满足融合旋转位置编码的约束。
///
/// 每种约束对应一个变体，按检查顺序排列。
#[derive(Clone, PartialEq, Eq, Debug, thiserror::Error)]
pub enum InvalidArgument {
    #[error("expected 4D tensor, but {arg} is {ndim}D")]
    NotFourDim { arg: &'static str, ndim: usize },

    #[error(
        "expected {arg} and {table} tensor have the same sequence length, \
         got {seq} and {table_seq}"
    )]
    SeqLenMismatch {
        arg: &'static str,
        table: &'static str,
        seq: usize,
        table_seq: usize,
    },

    #[error("expected the second and third dims of the {table} tensor equal 1, got {shape:?}")]
    NotBroadcast {
        table: &'static str,
        shape: [usize; 4],
    },

    #[error("expected cos and sin tensor have the same last dim, got {cos} and {sin}")]
    LastDimMismatch { cos: usize, sin: usize },

    #[error(
        "expected the last dim of the {arg} tensor equals or is greater than the cos tensor, \
         got {hidden} < {dim}"
    )]
    DimExceedsHidden {
        arg: &'static str,
        hidden: usize,
        dim: usize,
    },

    #[error("expected cos and sin tensor have the same dtype, got {cos:?} and {sin:?}")]
    DtypeMismatch { cos: DigitLayout, sin: DigitLayout },
}

/// 调度失败的原因。
///
/// 算子返回的错误原样保存在 [`Error::Kernel`] 中。
#[derive(Debug, thiserror::Error)]
pub enum Error<E> {
    #[error(transparent)]
    InvalidArgument(#[from] InvalidArgument),

    #[error(transparent)]
    Kernel(E),
}

impl<E> Error<E> {
    pub fn invalid_argument(&self) -> Option<&InvalidArgument> {
        match self {
            Self::InvalidArgument(e) => Some(e),
            Self::Kernel(_) => None,
        }
    }

    pub fn into_kernel(self) -> Option<E> {
        match self {
            Self::InvalidArgument(_) => None,
            Self::Kernel(e) => Some(e),
        }
    }
}
