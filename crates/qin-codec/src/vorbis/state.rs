//! 编码会话状态.
//!
//! `QuantizedState` 连接编码的两个阶段: PCM 分析 (系数块) 与组包/封装.
//! 阶段只能前进:
//!
//! ```text
//! Created ──analyze──▶ Analyzed ──packetize──▶ Packetized ──mark_framed──▶ Framed
//!    └────────────packetize (空分析)────────────▲                           │
//!                                                └──── 重复封装复用缓存 ◀───┘
//! ```
//!
//! 状态不可克隆, 由调用方独占持有; 丢弃即释放.

use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use log::{debug, warn};
use rayon::prelude::*;

use qin_core::{PcmBuffer, QinError, QinResult};

use crate::packet::Packet;

use super::analysis::{CoefficientBlock, analyze};
use super::config::EncoderConfig;
use super::packetizer::{build_audio_packets, build_header_packets};
use super::quantizer::{CodedBlock, QuantizationStats, encode_block};
use super::setup::StreamLayout;

/// 编码阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncodePhase {
    /// 已创建, 尚无系数块
    Created,
    /// 频谱分析完成
    Analyzed,
    /// 头包与音频包已生成
    Packetized,
    /// 已输出 Ogg 字节流
    Framed,
}

/// 编码会话状态
#[derive(Debug)]
pub struct QuantizedState {
    channels: usize,
    sample_rate: u32,
    config: EncoderConfig,
    serial_number: u32,
    layout: StreamLayout,
    phase: EncodePhase,
    sample_count: u64,
    blocks: Vec<CoefficientBlock>,
    header_packets: Vec<Packet>,
    audio_packets: Vec<Packet>,
    stats: QuantizationStats,
}

impl QuantizedState {
    /// 创建状态 (Created 阶段)
    pub fn new(channels: usize, sample_rate: u32, config: EncoderConfig) -> QinResult<Self> {
        if channels == 0 || channels > usize::from(u8::MAX) {
            return Err(QinError::InvalidConfiguration(format!(
                "声道数必须在 1..=255 之间: {channels}"
            )));
        }
        if sample_rate == 0 {
            return Err(QinError::InvalidConfiguration("采样率不能为 0".into()));
        }
        config.validate()?;

        let serial_number = config.serial_number.unwrap_or_else(next_serial_number);
        let layout = StreamLayout::new(channels, config.short_block, config.long_block);
        debug!(
            "创建编码状态: {} 声道, {} Hz, 序列号 0x{:08X}",
            channels, sample_rate, serial_number
        );
        Ok(Self {
            channels,
            sample_rate,
            config,
            serial_number,
            layout,
            phase: EncodePhase::Created,
            sample_count: 0,
            blocks: Vec::new(),
            header_packets: Vec::new(),
            audio_packets: Vec::new(),
            stats: QuantizationStats::default(),
        })
    }

    /// 对整段 PCM 做频谱分析 (Created → Analyzed)
    pub fn analyze(&mut self, pcm: &PcmBuffer) -> QinResult<()> {
        if self.phase != EncodePhase::Created {
            return Err(QinError::StateMisuse(format!(
                "只能在 Created 阶段分析, 当前为 {:?}, 重新分析需要新的状态",
                self.phase
            )));
        }
        if pcm.channels() != self.channels {
            return Err(QinError::MalformedInput(format!(
                "PCM 声道数 {} 与状态声道数 {} 不一致",
                pcm.channels(),
                self.channels
            )));
        }

        let analysis = analyze(pcm, &self.config)?;
        self.sample_count = pcm.frames() as u64;
        self.stats.non_finite_samples = analysis.non_finite_samples;
        self.blocks = analysis.blocks;
        self.phase = EncodePhase::Analyzed;
        Ok(())
    }

    /// 量化并生成全部包 (Analyzed → Packetized)
    ///
    /// 在 Created 阶段调用时按空输入处理, 只生成头包.
    /// 已生成过包时直接复用, 不会重复或丢失包.
    pub fn packetize(&mut self) -> QinResult<()> {
        match self.phase {
            EncodePhase::Packetized | EncodePhase::Framed => return Ok(()),
            EncodePhase::Created => warn!("状态尚未分析, 按空输入生成仅含头包的流"),
            EncodePhase::Analyzed => {}
        }
        if self.blocks.is_empty() {
            warn!("没有音频块, 输出仅含头包");
        }

        let tier = self.config.quality_tier();
        let layout = &self.layout;
        let coded: Vec<CodedBlock> = if self.config.parallel {
            self.blocks
                .par_iter()
                .map(|block| encode_block(block, layout, &tier))
                .collect::<QinResult<_>>()?
        } else {
            self.blocks
                .iter()
                .map(|block| encode_block(block, layout, &tier))
                .collect::<QinResult<_>>()?
        };

        for block in &coded {
            self.stats += block.stats;
        }
        if self.stats.clamped_coefficients > 0 {
            warn!(
                "{} 个残差值超出码本范围, 已截断",
                self.stats.clamped_coefficients
            );
        }

        self.header_packets = build_header_packets(&self.layout, self.sample_rate, &self.config)?;
        self.audio_packets = build_audio_packets(&coded, self.config.hop(), self.sample_count);
        self.phase = EncodePhase::Packetized;
        debug!(
            "组包完成: {} 个头包, {} 个音频包, 音频 {} 字节, 量化 {:?}",
            self.header_packets.len(),
            self.audio_packets.len(),
            self.stats.coded_audio_bytes,
            tier
        );
        Ok(())
    }

    /// 标记已输出字节流 (Packetized/Framed → Framed)
    pub fn mark_framed(&mut self) -> QinResult<()> {
        match self.phase {
            EncodePhase::Packetized | EncodePhase::Framed => {
                self.phase = EncodePhase::Framed;
                Ok(())
            }
            phase => Err(QinError::StateMisuse(format!(
                "封装前必须先组包, 当前为 {phase:?}"
            ))),
        }
    }

    /// 声道数
    pub fn channels(&self) -> usize {
        self.channels
    }

    /// 采样率
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// 采样率 (`sample_rate` 的别名)
    pub fn rate(&self) -> u32 {
        self.sample_rate
    }

    /// 当前阶段
    pub fn phase(&self) -> EncodePhase {
        self.phase
    }

    /// 输入采样数 (每声道)
    pub fn sample_count(&self) -> u64 {
        self.sample_count
    }

    /// 编码配置
    pub fn config(&self) -> &EncoderConfig {
        &self.config
    }

    /// 编码结构布局
    pub fn layout(&self) -> &StreamLayout {
        &self.layout
    }

    /// Ogg 逻辑流序列号
    pub fn serial_number(&self) -> u32 {
        self.serial_number
    }

    /// 量化统计 (组包之前只含输入统计)
    pub fn stats(&self) -> QuantizationStats {
        self.stats
    }

    /// 头包数量, 组包前为 0
    pub fn num_headers(&self) -> usize {
        self.header_packets.len()
    }

    /// 系数块序列
    pub fn mdct_coefficient_blocks(&self) -> &[CoefficientBlock] {
        &self.blocks
    }

    /// 音频包数量, 组包前为 0
    pub fn num_packets(&self) -> usize {
        self.audio_packets.len()
    }

    /// 头包
    pub fn header_packets(&self) -> &[Packet] {
        &self.header_packets
    }

    /// 音频包 (与系数块一一对应)
    pub fn audio_packets(&self) -> &[Packet] {
        &self.audio_packets
    }

    /// 全部包 (头包在前)
    pub fn packets(&self) -> impl Iterator<Item = &Packet> {
        self.header_packets.iter().chain(&self.audio_packets)
    }

    /// 全部包的原始字节 (头包在前)
    pub fn quantized_packet_bytes(&self) -> impl Iterator<Item = &[u8]> {
        self.packets().map(|p| &p.data[..])
    }
}

/// 进程内不重复的序列号: 计数器与时钟纳秒混合
fn next_serial_number() -> u32 {
    static COUNTER: AtomicU32 = AtomicU32::new(0);
    let count = COUNTER.fetch_add(1, Ordering::Relaxed);
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.subsec_nanos());
    nanos ^ count.wrapping_mul(0x9E37_79B9)
}
