//! Vorbis I 编码器.
//!
//! 编码分两段:
//! - 分析: PCM 分块加窗, 正向 MDCT 得到系数块 ([`analysis`])
//! - 组包: floor/residue 量化与码本编码 ([`quantizer`]), 生成头包和音频包 ([`packetizer`])
//!
//! 两段之间的全部数据由 [`QuantizedState`] 持有. 码流结构 (码本、floor、residue、
//! mapping、mode) 在 [`setup`] 中定义, 编码端与 setup 头描述保持一致.
//!
//! 块长策略为固定块长 (见 [`BlockPolicy`]), 不做瞬态检测.

pub mod analysis;
pub mod codebook;
pub mod config;
pub mod coupling;
pub mod floor;
pub mod headers;
pub mod mdct;
pub mod packetizer;
pub mod quantizer;
pub mod residue;
pub mod setup;
pub mod state;
pub mod window;

pub use analysis::{CoefficientBlock, SpectralAnalysis, block_count};
pub use config::{BlockPolicy, EncoderConfig, QualityTier};
pub use headers::{CommentHeader, IdentificationHeader};
pub use packetizer::HEADER_PACKET_COUNT;
pub use quantizer::QuantizationStats;
pub use setup::{SetupSummary, StreamLayout, parse_setup_header};
pub use state::{EncodePhase, QuantizedState};
