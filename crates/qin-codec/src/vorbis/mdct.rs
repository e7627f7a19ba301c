//! 正向 MDCT.
//!
//! 定义 (n 为块大小, 输出 n/2 个系数):
//! ```text
//! X[k] = 4/n · Σ x[i] · cos(2π/n · (i + 1/2 + n/4) · (k + 1/2))
//! ```
//! 系数缩放 4/n 与标准 Vorbis 逆变换 (不带缩放) 配对, 加窗重叠相加后还原输入.
//!
//! 实现: 输入折叠为 n/2 点序列, 预旋转后做 n/4 点复数 FFT, 再后旋转得到系数.
//! 全程使用 f64 累加, 运算顺序固定, 同一输入总是得到相同输出.

use std::f64::consts::PI;
use std::ops::{Add, Mul, Sub};

#[derive(Debug, Clone, Copy, PartialEq)]
struct Complex {
    re: f64,
    im: f64,
}

impl Complex {
    fn new(re: f64, im: f64) -> Self {
        Self { re, im }
    }

    /// e^{-iθ}
    fn expi_neg(theta: f64) -> Self {
        Self::new(theta.cos(), -theta.sin())
    }
}

impl Add for Complex {
    type Output = Self;
    fn add(self, rhs: Self) -> Self {
        Self::new(self.re + rhs.re, self.im + rhs.im)
    }
}

impl Sub for Complex {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self {
        Self::new(self.re - rhs.re, self.im - rhs.im)
    }
}

impl Mul for Complex {
    type Output = Self;
    fn mul(self, rhs: Self) -> Self {
        Self::new(
            self.re * rhs.re - self.im * rhs.im,
            self.re * rhs.im + self.im * rhs.re,
        )
    }
}

/// 固定长度的 MDCT 变换器
///
/// 构造时预计算旋转因子, 之后 `forward` 只读访问, 可在线程间共享.
#[derive(Debug, Clone)]
pub struct Mdct {
    n: usize,
    pre_twiddle: Vec<Complex>,
    post_twiddle: Vec<Complex>,
    fft_twiddle: Vec<Complex>,
    bit_reverse: Vec<usize>,
}

impl Mdct {
    /// 创建长度为 `n` 的变换器, `n` 须为不小于 8 的 2 的幂
    pub fn new(n: usize) -> Self {
        debug_assert!(n.is_power_of_two() && n >= 8, "MDCT 长度非法: {n}");
        let m = n / 2;
        let q = n / 4;

        let pre_twiddle = (0..q)
            .map(|k| Complex::expi_neg(PI * (k as f64 + 0.25) / m as f64))
            .collect();
        let post_twiddle = (0..q)
            .map(|k| Complex::expi_neg(PI * k as f64 / m as f64))
            .collect();
        let fft_twiddle = (0..q / 2)
            .map(|j| Complex::expi_neg(2.0 * PI * j as f64 / q as f64))
            .collect();

        let bits = q.trailing_zeros();
        let bit_reverse = (0..q)
            .map(|i| if bits == 0 { 0 } else { i.reverse_bits() >> (usize::BITS - bits) })
            .collect();

        Self {
            n,
            pre_twiddle,
            post_twiddle,
            fft_twiddle,
            bit_reverse,
        }
    }

    /// 块大小
    pub fn len(&self) -> usize {
        self.n
    }

    /// 是否为零长度
    pub fn is_empty(&self) -> bool {
        self.n == 0
    }

    /// 对已加窗的 `input` (长度 n) 做正向变换, 写入 `output` (长度 n/2)
    pub fn forward(&self, input: &[f32], output: &mut [f32]) {
        let n = self.n;
        let m = n / 2;
        let q = n / 4;
        debug_assert_eq!(input.len(), n);
        debug_assert_eq!(output.len(), m);

        let x = |i: usize| f64::from(input[i]);

        // 折叠: [a b c d] → [-c_r - d, a - b_r]
        let mut folded = vec![0.0f64; m];
        for i in 0..q {
            folded[i] = -x(3 * q - 1 - i) - x(3 * q + i);
            folded[q + i] = x(i) - x(2 * q - 1 - i);
        }

        let mut z: Vec<Complex> = (0..q)
            .map(|k| Complex::new(folded[2 * k], folded[m - 1 - 2 * k]) * self.pre_twiddle[k])
            .collect();
        self.fft_in_place(&mut z);

        let scale = 4.0 / n as f64;
        for (k, &zk) in z.iter().enumerate() {
            let y = zk * self.post_twiddle[k];
            output[2 * k] = (y.re * scale) as f32;
            output[m - 1 - 2 * k] = (-y.im * scale) as f32;
        }
    }

    /// 基 2 迭代 FFT (正向, e^{-2πi/N})
    fn fft_in_place(&self, data: &mut [Complex]) {
        let len = data.len();
        for (i, &j) in self.bit_reverse.iter().enumerate() {
            if i < j {
                data.swap(i, j);
            }
        }

        let mut span = 2;
        while span <= len {
            let half = span / 2;
            let stride = len / span;
            for start in (0..len).step_by(span) {
                for k in 0..half {
                    let a = data[start + k];
                    let b = data[start + k + half] * self.fft_twiddle[k * stride];
                    data[start + k] = a + b;
                    data[start + k + half] = a - b;
                }
            }
            span <<= 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vorbis::window::vorbis_window;

    /// 按定义直接计算的 MDCT
    fn mdct_naive(input: &[f32]) -> Vec<f64> {
        let n = input.len();
        let m = n / 2;
        (0..m)
            .map(|k| {
                let sum: f64 = input
                    .iter()
                    .enumerate()
                    .map(|(i, &x)| {
                        let angle = PI / m as f64 * (i as f64 + 0.5 + m as f64 / 2.0) * (k as f64 + 0.5);
                        f64::from(x) * angle.cos()
                    })
                    .sum();
                sum * 4.0 / n as f64
            })
            .collect()
    }

    /// 标准 Vorbis 逆变换 (不带缩放)
    fn imdct_naive(coeffs: &[f32]) -> Vec<f64> {
        let m = coeffs.len();
        (0..2 * m)
            .map(|i| {
                coeffs
                    .iter()
                    .enumerate()
                    .map(|(k, &c)| {
                        let angle = PI / m as f64 * (i as f64 + 0.5 + m as f64 / 2.0) * (k as f64 + 0.5);
                        f64::from(c) * angle.cos()
                    })
                    .sum()
            })
            .collect()
    }

    fn test_signal(len: usize, seed: u32) -> Vec<f32> {
        let mut state = seed;
        (0..len)
            .map(|_| {
                state = state.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
                (state >> 8) as f32 / (1u32 << 24) as f32 * 2.0 - 1.0
            })
            .collect()
    }

    #[test]
    fn test_快速算法与定义一致() {
        for n in [8usize, 64, 256, 2048] {
            let input = test_signal(n, n as u32);
            let mdct = Mdct::new(n);
            let mut fast = vec![0.0f32; n / 2];
            mdct.forward(&input, &mut fast);
            let reference = mdct_naive(&input);
            for (k, (&a, &b)) in fast.iter().zip(reference.iter()).enumerate() {
                assert!((f64::from(a) - b).abs() < 1e-5, "n={n} k={k}: {a} vs {b}");
            }
        }
    }

    #[test]
    fn test_加窗重叠相加完全重建() {
        let n = 128;
        let hop = n / 2;
        let signal = test_signal(hop * 4, 7);
        let window = vorbis_window(n);
        let mdct = Mdct::new(n);

        let mut output = vec![0.0f64; signal.len()];
        for block in 0..3 {
            let start = block * hop;
            let windowed: Vec<f32> = (0..n).map(|i| signal[start + i] * window[i]).collect();
            let mut coeffs = vec![0.0f32; hop];
            mdct.forward(&windowed, &mut coeffs);
            for (i, v) in imdct_naive(&coeffs).into_iter().enumerate() {
                output[start + i] += v * f64::from(window[i]);
            }
        }

        // 首尾各半块只被一个块覆盖, 只检查中间完全重叠的区域
        for i in hop..hop * 3 {
            assert!(
                (output[i] - f64::from(signal[i])).abs() < 1e-4,
                "i={i}: {} vs {}",
                output[i],
                signal[i]
            );
        }
    }

    #[test]
    fn test_静音输入输出全零() {
        let mdct = Mdct::new(256);
        let mut out = vec![1.0f32; 128];
        mdct.forward(&[0.0; 256], &mut out);
        assert!(out.iter().all(|&v| v == 0.0));
        assert_eq!(mdct.len(), 256);
    }
}
