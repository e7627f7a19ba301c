//! Vorbis 窗函数.
//!
//! 窗形状: `w(x) = sin(π/2 · sin²(x))`, 满足功率互补 `w[i]² + w[i + n/2]² = 1`,
//! 编码端分析窗与解码端合成窗相同, 重叠相加后完全重建.
//!
//! 块长固定, 相邻块同尺寸, 只需要对称窗.

use std::f64::consts::FRAC_PI_2;

/// 对称 Vorbis 窗 (长度 `n`)
pub fn vorbis_window(n: usize) -> Vec<f32> {
    let half = n / 2;
    (0..n)
        .map(|i| {
            // 右半为左半的镜像
            let k = if i < half { i } else { n - 1 - i };
            let x = (k as f64 + 0.5) / half as f64 * FRAC_PI_2;
            (FRAC_PI_2 * x.sin().powi(2)).sin() as f32
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_对称窗功率互补() {
        for n in [64, 256, 2048] {
            let w = vorbis_window(n);
            for i in 0..n / 2 {
                let sum = w[i] * w[i] + w[i + n / 2] * w[i + n / 2];
                assert!((sum - 1.0).abs() < 1e-6, "n={n} i={i}: {sum}");
            }
        }
    }

    #[test]
    fn test_对称窗镜像() {
        let w = vorbis_window(64);
        for i in 0..32 {
            assert!((w[i] - w[63 - i]).abs() < 1e-7);
        }
        assert!(w[0] > 0.0 && w[0] < 0.01);
        assert!(w[31] > 0.99);
    }
}
