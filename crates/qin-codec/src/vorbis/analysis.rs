//! 分块加窗与频谱分析.
//!
//! 块划分 (hop = 块大小 / 2):
//! ```text
//! 填充后序列: [hop 个 0][S 个输入采样][补 0 至最后一块结束]
//! 块 k 覆盖:  [k·hop, k·hop + 块大小)
//! 块数:       S == 0 时为 0, 否则 ceil(S / hop) + 1
//! ```
//! 解码器对第一个包不输出采样, 首块 (预热块) 保证每个输入采样都落在两个块的重叠区,
//! 末尾不足半块的部分补零而不是丢弃.

use std::sync::LazyLock;

use log::{debug, warn};
use rayon::prelude::*;

use qin_core::{PcmBuffer, QinError, QinResult};

use super::config::{EncoderConfig, MAX_BLOCK_SIZE, MIN_BLOCK_SIZE};
use super::mdct::Mdct;
use super::window::vorbis_window;

/// 一个分析块的 MDCT 系数
#[derive(Debug, Clone, PartialEq)]
pub struct CoefficientBlock {
    /// 块序号
    pub index: usize,
    /// 是否为长块
    pub long: bool,
    /// 每声道 `块大小/2` 个系数
    pub channels: Vec<Vec<f32>>,
}

impl CoefficientBlock {
    /// 块大小 (系数个数的两倍)
    pub fn block_size(&self) -> usize {
        self.channels.first().map_or(0, |c| c.len() * 2)
    }
}

/// 频谱分析结果
#[derive(Debug, Clone, Default)]
pub struct SpectralAnalysis {
    /// 按时间顺序排列的系数块
    pub blocks: Vec<CoefficientBlock>,
    /// 被替换为 0 的非有限采样数 (NaN/Inf)
    pub non_finite_samples: u64,
}

/// 单一块大小的窗与变换器
struct BlockKernel {
    window: Vec<f32>,
    mdct: Mdct,
}

/// 所有合法块大小的窗与变换器, 首次分析时一并构造, 之后只读共享
static KERNELS: LazyLock<Vec<BlockKernel>> = LazyLock::new(|| {
    (MIN_BLOCK_SIZE.trailing_zeros()..=MAX_BLOCK_SIZE.trailing_zeros())
        .map(|bits| {
            let n = 1usize << bits;
            BlockKernel {
                window: vorbis_window(n),
                mdct: Mdct::new(n),
            }
        })
        .collect()
});

fn kernel(n: usize) -> Option<&'static BlockKernel> {
    if !n.is_power_of_two() {
        return None;
    }
    let slot = n.trailing_zeros().checked_sub(MIN_BLOCK_SIZE.trailing_zeros())?;
    KERNELS.get(slot as usize)
}

/// 给定采样数与步进, 计算分析块数
pub fn block_count(sample_count: usize, hop: usize) -> usize {
    if sample_count == 0 || hop == 0 {
        0
    } else {
        sample_count.div_ceil(hop) + 1
    }
}

/// 对整段 PCM 做分块加窗和 MDCT
///
/// 固定块长策略下相邻块尺寸相同, 所有块使用对称窗. 声道一致性由调用方保证.
pub fn analyze(pcm: &PcmBuffer, config: &EncoderConfig) -> QinResult<SpectralAnalysis> {
    let n = config.block_size();
    let BlockKernel { window, mdct } = kernel(n)
        .ok_or_else(|| QinError::InvalidConfiguration(format!("不支持的块大小: {n}")))?;
    let hop = n / 2;
    let long = config.uses_long_blocks();
    let frames = pcm.frames();
    let count = block_count(frames, hop);
    if count == 0 {
        debug!("空输入, 不产生分析块");
        return Ok(SpectralAnalysis::default());
    }

    let mut non_finite_samples = 0u64;
    let padded: Vec<Vec<f32>> = (0..pcm.channels())
        .map(|ch| {
            let mut buf = vec![0.0f32; (count + 1) * hop];
            if let Some(samples) = pcm.channel(ch) {
                for (dst, s) in buf[hop..hop + frames].iter_mut().zip(samples) {
                    if s.is_finite() {
                        *dst = s;
                    } else {
                        non_finite_samples += 1;
                    }
                }
            }
            buf
        })
        .collect();
    if non_finite_samples > 0 {
        warn!("输入含 {} 个非有限采样, 已按静音处理", non_finite_samples);
    }

    let transform = |k: usize| {
        let start = k * hop;
        let channels = padded
            .iter()
            .map(|buf| {
                let windowed: Vec<f32> = buf[start..start + n]
                    .iter()
                    .zip(window)
                    .map(|(s, w)| s * w)
                    .collect();
                let mut coeffs = vec![0.0f32; hop];
                mdct.forward(&windowed, &mut coeffs);
                coeffs
            })
            .collect();
        CoefficientBlock {
            index: k,
            long,
            channels,
        }
    };

    let blocks: Vec<CoefficientBlock> = if config.parallel {
        (0..count).into_par_iter().map(transform).collect()
    } else {
        (0..count).map(transform).collect()
    };

    debug!(
        "频谱分析完成: {} 帧 × {} 声道, 块大小 {}, {} 块",
        frames,
        pcm.channels(),
        n,
        blocks.len()
    );
    Ok(SpectralAnalysis {
        blocks,
        non_finite_samples,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vorbis::config::BlockPolicy;

    fn sine(frames: usize, freq: f32, rate: f32) -> Vec<f32> {
        (0..frames)
            .map(|i| 0.5 * (2.0 * std::f32::consts::PI * freq * i as f32 / rate).sin())
            .collect()
    }

    #[test]
    fn test_块数公式() {
        assert_eq!(block_count(0, 1024), 0);
        assert_eq!(block_count(1, 1024), 2);
        assert_eq!(block_count(1024, 1024), 2);
        assert_eq!(block_count(1025, 1024), 3);
        assert_eq!(block_count(4410, 1024), 6);
    }

    #[test]
    fn test_空输入零块() {
        let pcm = PcmBuffer::empty(2).unwrap();
        let analysis = analyze(&pcm, &EncoderConfig::default()).unwrap();
        assert!(analysis.blocks.is_empty());
    }

    #[test]
    fn test_块形状() {
        let pcm = PcmBuffer::from_planar(vec![sine(3000, 440.0, 44100.0), vec![0.0; 3000]]).unwrap();
        let analysis = analyze(&pcm, &EncoderConfig::default()).unwrap();
        assert_eq!(analysis.blocks.len(), 3000usize.div_ceil(1024) + 1);
        for (k, block) in analysis.blocks.iter().enumerate() {
            assert_eq!(block.index, k);
            assert!(block.long);
            assert_eq!(block.block_size(), 2048);
            assert_eq!(block.channels.len(), 2);
            assert!(block.channels[1].iter().all(|&c| c == 0.0));
        }
    }

    #[test]
    fn test_短块策略() {
        let pcm = PcmBuffer::from_interleaved(sine(441, 1000.0, 44100.0), 1).unwrap();
        let config = EncoderConfig::default().with_block_policy(BlockPolicy::Short);
        let analysis = analyze(&pcm, &config).unwrap();
        assert_eq!(analysis.blocks.len(), 441usize.div_ceil(128) + 1);
        assert!(analysis.blocks.iter().all(|b| !b.long && b.block_size() == 256));
    }

    #[test]
    fn test_变换核覆盖全部块大小() {
        for bits in 6..=13 {
            let n = 1usize << bits;
            let k = kernel(n).unwrap();
            assert_eq!(k.window.len(), n);
            assert_eq!(k.mdct.len(), n);
        }
        assert!(kernel(32).is_none());
        assert!(kernel(16384).is_none());
        assert!(kernel(1000).is_none());
    }

    #[test]
    fn test_并行与串行结果一致() {
        let pcm = PcmBuffer::from_interleaved(sine(20_000, 1234.0, 48000.0), 1).unwrap();
        let parallel = analyze(&pcm, &EncoderConfig::default()).unwrap();
        let serial = analyze(&pcm, &EncoderConfig::default().with_parallel(false)).unwrap();
        assert_eq!(parallel.blocks, serial.blocks);
    }

    #[test]
    fn test_非有限采样按静音处理() {
        let mut samples = sine(2048, 440.0, 44100.0);
        samples[10] = f32::NAN;
        samples[20] = f32::INFINITY;
        let pcm = PcmBuffer::from_interleaved(samples, 1).unwrap();
        let analysis = analyze(&pcm, &EncoderConfig::default()).unwrap();
        assert_eq!(analysis.non_finite_samples, 2);
        assert!(
            analysis
                .blocks
                .iter()
                .flat_map(|b| b.channels.iter().flatten())
                .all(|c| c.is_finite())
        );
    }

    #[test]
    fn test_正弦能量集中在对应频点() {
        let rate = 44100.0;
        let pcm = PcmBuffer::from_interleaved(sine(8192, 1000.0, rate), 1).unwrap();
        let analysis = analyze(&pcm, &EncoderConfig::default()).unwrap();
        let block = &analysis.blocks[2];
        let (peak_bin, _) = block.channels[0]
            .iter()
            .enumerate()
            .fold((0, 0.0f32), |best, (i, &c)| if c.abs() > best.1 { (i, c.abs()) } else { best });
        // 第 k 个系数中心频率约为 (k + 0.5) · rate / n
        let freq = (peak_bin as f32 + 0.5) * rate / 2048.0;
        assert!((freq - 1000.0).abs() < 2.0 * rate / 2048.0, "峰值频率 {freq}");
    }
}
