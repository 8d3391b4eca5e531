mod rope;
mod sin_cos;
