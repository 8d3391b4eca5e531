pub(crate) mod rope;
mod sin_cos;
