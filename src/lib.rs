//! # Qin (琴)
//!
//! 纯 Rust 实现的 Ogg Vorbis 编码器.
//!
//! 编码分为两个阶段, 中间状态为 [`QuantizedState`]:
//! - **分析**: PCM → 加窗 + MDCT 系数块 ([`pcm_to_quantized_state`])
//! - **封装**: 量化、组包、Ogg 分页 ([`quantized_state_to_ogg`])
//!
//! # 快速开始
//!
//! ```rust
//! use qin::{EncoderConfig, PcmBuffer};
//!
//! // 0.1 秒 440 Hz 单声道正弦
//! let samples: Vec<f32> = (0..4410)
//!     .map(|i| (i as f32 * 440.0 * std::f32::consts::TAU / 44100.0).sin() * 0.5)
//!     .collect();
//! let pcm = PcmBuffer::from_interleaved(samples, 1).unwrap();
//! let ogg = qin::encode_pcm(&pcm, 44100, EncoderConfig::default()).unwrap();
//! assert_eq!(&ogg[..4], b"OggS");
//! ```
//!
//! # Crate 结构
//!
//! | Crate | 功能 |
//! |-------|------|
//! | `qin-core` | 错误类型、位读写、CRC、PCM 缓冲 |
//! | `qin-codec` | Vorbis 编码核心 |
//! | `qin-format` | Ogg 页面封装与读取 |

use tracing::debug;

pub mod config;
pub mod logging;

/// 核心类型与工具
pub use qin_core as core;

/// Vorbis 编码核心
pub use qin_codec as codec;

/// Ogg 容器
pub use qin_format as format;

pub use config::QinConfig;
pub use qin_codec::vorbis::{BlockPolicy, EncodePhase, EncoderConfig, QuantizationStats, QuantizedState};
pub use qin_core::{PcmBuffer, QinError, QinResult};
pub use qin_format::{StreamSummary, inspect};

/// 获取 Qin 版本号
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

/// 分析阶段: 由 PCM 创建并分析编码状态
///
/// 声道数取自 `pcm`. 返回的状态处于 [`EncodePhase::Analyzed`].
pub fn pcm_to_quantized_state(
    pcm: &PcmBuffer,
    sample_rate: u32,
    config: EncoderConfig,
) -> QinResult<QuantizedState> {
    let mut state = QuantizedState::new(pcm.channels(), sample_rate, config)?;
    state.analyze(pcm)?;
    debug!(
        "分析完成: {} 帧, {} 个系数块",
        state.sample_count(),
        state.mdct_coefficient_blocks().len()
    );
    Ok(state)
}

/// 封装阶段: 组包 (如尚未组包) 并输出完整 Ogg 字节流
///
/// 对同一状态重复调用得到逐字节相同的输出.
pub fn quantized_state_to_ogg(state: &mut QuantizedState) -> QinResult<Vec<u8>> {
    state.packetize()?;
    let bytes = qin_format::frame_packets(
        state.packets(),
        state.serial_number(),
        state.config().max_page_body,
    )?;
    state.mark_framed()?;
    debug!(
        "封装完成: {} 个包, {} 字节, 统计 {:?}",
        state.num_packets(),
        bytes.len(),
        state.stats()
    );
    Ok(bytes)
}

/// 一次完成分析与封装
pub fn encode_pcm(pcm: &PcmBuffer, sample_rate: u32, config: EncoderConfig) -> QinResult<Vec<u8>> {
    let mut state = pcm_to_quantized_state(pcm, sample_rate, config)?;
    quantized_state_to_ogg(&mut state)
}
