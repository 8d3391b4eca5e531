mod rope;
mod sin_cos;

pub use rope::{FusedRoPE, RotaryError, RotaryType};
pub use sin_cos::SinCos;
