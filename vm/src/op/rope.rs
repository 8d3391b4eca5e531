use crate::{ObjId, Tensor, VirtualMachine};
use std::f32::consts::PI;

/// 融合旋转位置编码。
///
/// 输入按 `[seq, batch, heads, hidden]` 排布，`sin`/`cos` 的形状为 `[seq, 1, 1, d]`，
/// 编码作用于 `hidden` 维的前 `d` 个元素。
/// `transpose_output` 要求输出存储交换 `seq` 与 `batch` 两维，逻辑形状不变。
///
/// 算子不检查参数，调用者负责保证形状和数据类型满足约束。
pub trait FusedRoPE: VirtualMachine {
    fn fused_rope_fwd<'vm>(
        &'vm self,
        stack: ObjId,
        input: &Tensor<'vm, Self>,
        cos: &Tensor<'vm, Self>,
        sin: &Tensor<'vm, Self>,
        transpose_output: bool,
    ) -> Result<Tensor<'vm, Self>, Self::Error>;

    fn fused_rope_bwd<'vm>(
        &'vm self,
        stack: ObjId,
        output_grads: &Tensor<'vm, Self>,
        cos: &Tensor<'vm, Self>,
        sin: &Tensor<'vm, Self>,
        transpose_output: bool,
    ) -> Result<Tensor<'vm, Self>, Self::Error>;
}

#[derive(Clone, Copy, PartialEq, Eq, Debug, thiserror::Error)]
pub enum RotaryError {
    #[error("rotary dim must be even, got {0}")]
    OddDim(usize),
}

#[derive(Clone, Copy, Debug)]
pub enum RotaryType {
    /// 无外推
    Normal { theta: f32 },
    /// 线性内插
    PI { theta: f32, s: f32 },
    /// 非均匀频率缩放
    NtkAware { theta: f32, s: f32 },
    /// 动态适配插值比例
    DynScale { theta: f32, s: f32, a: f32 },
    /// 基于波长局部分段插值
    NtkParts {
        theta: f32,
        s: f32,
        l0: usize,
        alpha: f32,
        beta: f32,
    },
    /// YARN
    Yarn {
        theta: f32,
        s: f32,
        l0: usize,
        alpha: f32,
        beta: f32,
    },
}

impl RotaryType {
    /// 生成形状为 `[nctx, 1, 1, dim]` 的频率表。
    ///
    /// 每行前后两半相同，对应 rotate-half 的配对方式。
    pub fn generate(&self, nctx: usize, dim: usize) -> Result<Box<[f32]>, RotaryError> {
        if dim % 2 != 0 {
            return Err(RotaryError::OddDim(dim));
        }
        let freqs = match *self {
            Self::Normal { theta } => generate(nctx, dim, theta, |theta, pos| theta * pos),
            Self::PI { theta, s } => generate(nctx, dim, theta, |theta, pos| theta * pos / s),
            Self::NtkAware { theta, s } => {
                generate(nctx, dim, theta * s, |theta, pos| theta * pos)
            }
            Self::DynScale { theta, s, a } => {
                generate(nctx, dim, theta * (a * s - a + 1.), |theta, pos| theta * pos)
            }
            Self::NtkParts {
                theta,
                s,
                l0,
                alpha,
                beta,
            } => generate(nctx, dim, theta, |theta, pos| {
                let r = l0 as f32 / (2. * PI / theta);
                let r = ((r - alpha) / (beta - alpha)).clamp(0., 1.);
                pos * ((1. - r) / s + r) * theta
            }),
            Self::Yarn {
                theta,
                s,
                l0,
                alpha,
                beta,
            } => generate(nctx, dim, theta, |theta, pos| {
                let pos = pos * (0.1 * s.ln() + 1.);
                let r = l0 as f32 / (2. * PI / theta);
                let r = ((r - alpha) / (beta - alpha)).clamp(0., 1.);
                pos * ((1. - r) / s + r) * theta
            }),
        };
        Ok(freqs)
    }

    /// 在主机上计算 `[sin, cos]` 表，形状同 [`generate`](Self::generate)。
    pub fn sin_cos(&self, nctx: usize, dim: usize) -> Result<[Box<[f32]>; 2], RotaryError> {
        let freqs = self.generate(nctx, dim)?;
        let (sin, cos) = freqs.iter().map(|f| f.sin_cos()).unzip::<_, _, Vec<_>, Vec<_>>();
        Ok([sin.into(), cos.into()])
    }
}

fn generate(nctx: usize, dim: usize, theta: f32, f: impl Fn(f32, f32) -> f32) -> Box<[f32]> {
    let dh = dim / 2;
    let mut freqs = vec![0.; nctx * dim];
    for (pos, row) in freqs.chunks_exact_mut(dim.max(1)).enumerate() {
        let (lo, hi) = row.split_at_mut(dh);
        for (idx, (lo, hi)) in lo.iter_mut().zip(hi).enumerate() {
            let theta = theta.powf(-(idx as f32 / dh as f32));
            let angle = f(theta, pos as f32);
            *lo = angle;
            *hi = angle
        }
    }
    freqs.into()
}

#[cfg(test)]
mod test {
    use super::{RotaryError, RotaryType};

    const NORMAL: RotaryType = RotaryType::Normal { theta: 1e4 };

    #[test]
    fn test_generate() {
        let freqs = NORMAL.generate(3, 8).unwrap();
        assert_eq!(freqs.len(), 3 * 8);
        // 第 0 个位置角度全为 0
        assert!(freqs[..8].iter().all(|&f| f == 0.));
        // 位置 1 的首个频率为 theta^0
        assert_eq!(freqs[8], 1.);
        let row = &freqs[16..24];
        assert_eq!(row[..4], row[4..]);
        assert!(row[0] > row[1] && row[1] > row[2] && row[2] > row[3])
    }

    #[test]
    fn test_pi_scales_positions() {
        let normal = NORMAL.generate(4, 4).unwrap();
        let pi = RotaryType::PI { theta: 1e4, s: 2. }.generate(4, 4).unwrap();
        for (n, p) in normal.iter().zip(&pi) {
            assert!((n / 2. - p).abs() < 1e-6)
        }
    }

    #[test]
    fn test_sin_cos() {
        let [sin, cos] = NORMAL.sin_cos(2, 4).unwrap();
        let expect = [1., 1., 1., 1., 1f32.cos(), 0.01f32.cos(), 1f32.cos(), 0.01f32.cos()];
        for (c, e) in cos.iter().zip(expect) {
            assert!((c - e).abs() < 1e-6)
        }
        assert_eq!(sin[..4], [0.; 4]);
        assert!((sin[4] - 1f32.sin()).abs() < 1e-6)
    }

    /// 位置 1 处的频率行，同时检查前后两半相同。
    fn row1(rope: RotaryType) -> [f32; 4] {
        let freqs = rope.generate(2, 8).unwrap();
        let row = &freqs[8..];
        assert_eq!(row[..4], row[4..]);
        [row[0], row[1], row[2], row[3]]
    }

    fn assert_close(row: [f32; 4], expect: [f32; 4]) {
        for (x, e) in row.into_iter().zip(expect) {
            assert!((x - e).abs() <= e.abs() * 1e-4, "{row:?} != {expect:?}")
        }
    }

    #[test]
    fn test_ntk_aware() {
        let row = row1(RotaryType::NtkAware { theta: 1e4, s: 2. });
        assert_close(row, [1., 0.084_089_64, 0.007_071_068, 0.000_594_603_6])
    }

    #[test]
    fn test_dyn_scale() {
        let row = row1(RotaryType::DynScale {
            theta: 1e4,
            s: 4.,
            a: 0.5,
        });
        assert_close(row, [1., 0.079_527_07, 0.006_324_555, 0.000_502_973_4]);
        // a = 1 时退化为 NTK-aware，a = 0 时退化为无外推
        assert_eq!(
            row1(RotaryType::DynScale {
                theta: 1e4,
                s: 2.,
                a: 1.
            }),
            row1(RotaryType::NtkAware { theta: 1e4, s: 2. })
        );
        assert_eq!(
            row1(RotaryType::DynScale {
                theta: 1e4,
                s: 2.,
                a: 0.
            }),
            row1(NORMAL)
        )
    }

    #[test]
    fn test_ntk_parts() {
        let row = row1(RotaryType::NtkParts {
            theta: 1e4,
            s: 4.,
            l0: 64,
            alpha: 1.,
            beta: 32.,
        });
        // 低频分量按 1/s 内插，高频分量部分保留
        assert_close(row, [0.472_239_9, 0.025_044_98, 0.002_5, 0.000_25])
    }

    #[test]
    fn test_yarn() {
        let row = row1(RotaryType::Yarn {
            theta: 1e4,
            s: 4.,
            l0: 64,
            alpha: 1.,
            beta: 32.,
        });
        assert_close(row, [0.537_706_3, 0.028_516_95, 0.002_846_574, 0.000_284_657_4])
    }

    #[test]
    fn test_odd_dim() {
        assert_eq!(NORMAL.generate(4, 7), Err(RotaryError::OddDim(7)))
    }
}
