//! 量化与音频包编码.
//!
//! 每个块独立编码, 流程:
//! 1. 每声道拟合 floor, 按解码器规则重建包络
//! 2. 系数除以包络取整得到残差, 超出码本范围的值截断并计数
//! 3. 残差全零的声道 floor 标记为未使用
//! 4. 立体声先耦合再以 type 2 编码, 其他声道数以 type 1 编码

use std::ops::AddAssign;

use serde::Serialize;

use qin_core::QinResult;
use qin_core::bitwriter::BitWriter;

use super::analysis::CoefficientBlock;
use super::config::QualityTier;
use super::coupling::couple_channels;
use super::residue::{RESIDUE_MAX_MAGNITUDE, interleave};
use super::setup::StreamLayout;

/// 量化过程的诊断计数
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct QuantizationStats {
    /// 超出码本范围而被截断的残差值个数 (含耦合后截断)
    pub clamped_coefficients: u64,
    /// floor 未使用 (整块静音) 的声道块数
    pub silent_channel_blocks: u64,
    /// 输入中被替换为 0 的非有限采样数
    pub non_finite_samples: u64,
    /// 音频包总字节数
    pub coded_audio_bytes: u64,
}

impl AddAssign for QuantizationStats {
    fn add_assign(&mut self, rhs: Self) {
        self.clamped_coefficients += rhs.clamped_coefficients;
        self.silent_channel_blocks += rhs.silent_channel_blocks;
        self.non_finite_samples += rhs.non_finite_samples;
        self.coded_audio_bytes += rhs.coded_audio_bytes;
    }
}

/// 一个块编码后的音频包负载
#[derive(Debug, Clone)]
pub struct CodedBlock {
    /// 块序号
    pub index: usize,
    /// 包数据
    pub data: Vec<u8>,
    /// 本块的统计
    pub stats: QuantizationStats,
}

/// 编码一个系数块为 Vorbis 音频包
pub fn encode_block(
    block: &CoefficientBlock,
    layout: &StreamLayout,
    tier: &QualityTier,
) -> QinResult<CodedBlock> {
    let long = block.long;
    let floor = layout.floor(long);
    let mut stats = QuantizationStats::default();

    let mut bw = BitWriter::with_capacity(block.block_size() / 4);
    bw.write_bit(false);
    bw.write_bits(u32::from(long), layout.mode_bits());
    if long {
        // 固定块长: 前后相邻块都是长块
        bw.write_bit(true);
        bw.write_bit(true);
    }

    let mut residues: Vec<Vec<i32>> = Vec::with_capacity(block.channels.len());
    let mut used = Vec::with_capacity(block.channels.len());
    for coeffs in &block.channels {
        let values = floor.encode_values(&floor.fit(coeffs, tier));
        let curve = floor.curve(&values);
        let quantized: Vec<i32> = coeffs
            .iter()
            .zip(&curve)
            .map(|(&c, &f)| {
                let q = (c / f).round() as i32;
                let clamped = q.clamp(-RESIDUE_MAX_MAGNITUDE, RESIDUE_MAX_MAGNITUDE);
                if clamped != q {
                    stats.clamped_coefficients += 1;
                }
                clamped
            })
            .collect();

        if quantized.iter().all(|&q| q == 0) {
            bw.write_bit(false);
            stats.silent_channel_blocks += 1;
            used.push(false);
        } else {
            floor.write_packet(&mut bw, &values)?;
            used.push(true);
        }
        residues.push(quantized);
    }

    let residue = layout.residue(long);
    if layout.coupled() {
        if used.iter().any(|&u| u) {
            let (magnitude, angle, clamped) = couple_channels(&residues[0], &residues[1]);
            stats.clamped_coefficients += clamped;
            let interleaved = interleave(&[&magnitude, &angle]);
            residue.encode(&mut bw, &[&interleaved])?;
        }
    } else {
        let vectors: Vec<&[i32]> = residues
            .iter()
            .zip(&used)
            .filter(|(_, u)| **u)
            .map(|(r, _)| r.as_slice())
            .collect();
        if !vectors.is_empty() {
            residue.encode(&mut bw, &vectors)?;
        }
    }

    let data = bw.finish();
    stats.coded_audio_bytes = data.len() as u64;
    Ok(CodedBlock {
        index: block.index,
        data,
        stats,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use qin_core::bitreader::BitReader;

    fn block(channels: Vec<Vec<f32>>, long: bool) -> CoefficientBlock {
        CoefficientBlock {
            index: 0,
            long,
            channels,
        }
    }

    fn tone(n2: usize, bin: usize, amp: f32) -> Vec<f32> {
        (0..n2).map(|k| if k == bin { amp } else { 0.0 }).collect()
    }

    #[test]
    fn test_静音块只含包头与未使用标志() {
        let layout = StreamLayout::new(2, 256, 2048);
        let tier = QualityTier::from_quality(0.4);
        let coded = encode_block(&block(vec![vec![0.0; 1024]; 2], true), &layout, &tier).unwrap();
        assert_eq!(coded.stats.silent_channel_blocks, 2);
        // 类型 0 + mode 1 + 两个窗标志 + 两个 floor 未使用标志
        let mut br = BitReader::new(&coded.data);
        assert!(!br.read_flag().unwrap());
        assert!(br.read_flag().unwrap());
        assert!(br.read_flag().unwrap());
        assert!(br.read_flag().unwrap());
        assert!(!br.read_flag().unwrap());
        assert!(!br.read_flag().unwrap());
        assert_eq!(coded.data.len(), 1);
        assert_eq!(coded.stats.coded_audio_bytes, 1);
    }

    #[test]
    fn test_短块包头() {
        let layout = StreamLayout::new(1, 256, 2048);
        let tier = QualityTier::from_quality(0.4);
        let coded = encode_block(&block(vec![tone(128, 10, 0.3)], false), &layout, &tier).unwrap();
        let mut br = BitReader::new(&coded.data);
        assert!(!br.read_flag().unwrap());
        assert!(!br.read_flag().unwrap(), "短块 mode 号为 0");
        assert!(br.read_flag().unwrap(), "floor 已使用");
        assert_eq!(coded.stats.silent_channel_blocks, 0);
    }

    #[test]
    fn test_质量越高字节越多() {
        let layout = StreamLayout::new(1, 256, 2048);
        let coeffs: Vec<f32> = (0..1024).map(|k| ((k * 37 % 101) as f32 / 101.0 - 0.5) * 0.2).collect();
        let low = encode_block(&block(vec![coeffs.clone()], true), &layout, &QualityTier::from_quality(0.0)).unwrap();
        let high = encode_block(&block(vec![coeffs], true), &layout, &QualityTier::from_quality(1.0)).unwrap();
        assert!(high.data.len() > low.data.len(), "{} <= {}", high.data.len(), low.data.len());
    }

    #[test]
    fn test_编码确定性() {
        let layout = StreamLayout::new(2, 256, 2048);
        let tier = QualityTier::from_quality(0.4);
        let b = block(vec![tone(1024, 46, 0.5), tone(1024, 46, -0.25)], true);
        let first = encode_block(&b, &layout, &tier).unwrap();
        let second = encode_block(&b, &layout, &tier).unwrap();
        assert_eq!(first.data, second.data);
        assert_eq!(first.stats, second.stats);
    }

    #[test]
    fn test_统计累加() {
        let mut total = QuantizationStats::default();
        total += QuantizationStats {
            clamped_coefficients: 1,
            silent_channel_blocks: 2,
            non_finite_samples: 3,
            coded_audio_bytes: 4,
        };
        total += QuantizationStats {
            coded_audio_bytes: 6,
            ..Default::default()
        };
        assert_eq!(total.clamped_coefficients, 1);
        assert_eq!(total.coded_audio_bytes, 10);
    }
}
