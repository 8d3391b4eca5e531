//! 融合旋转位置编码（RoPE）算子的参数检查与调度。
//!
//! 输入按 `[seq, batch, heads, hidden]` 排布，`cos`/`sin` 表的形状为 `[seq, 1, 1, d]`，
//! 要求 `d <= hidden`，两张表形状和数据类型相同。检查通过后调用
//! [`vm::op::FusedRoPE`] 的实现，否则返回 [`InvalidArgument`] 且不启动算子。

mod apply;
mod check;
mod context;
mod error;
mod func;
mod op;

pub use apply::{apply_rotary_pos_emb, apply_rotary_pos_emb_cached};
pub use context::{Context, VirtualMachineExt};
pub use error::{Error, InvalidArgument};
pub use func::RoPEFunc;
pub use op::rope::{backward, forward};
