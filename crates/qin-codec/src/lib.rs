//! # qin-codec
//!
//! Qin 音频编码器库: Vorbis I 编码核心与编码后的逻辑包抽象.
//!
//! ## 使用示例
//!
//! ```rust
//! use qin_codec::vorbis::{EncoderConfig, QuantizedState};
//! use qin_core::PcmBuffer;
//!
//! let pcm = PcmBuffer::from_interleaved(vec![0.0; 882], 2).unwrap();
//! let mut state = QuantizedState::new(2, 44100, EncoderConfig::default()).unwrap();
//! state.analyze(&pcm).unwrap();
//! state.packetize().unwrap();
//! assert_eq!(state.num_headers(), 3);
//! ```

pub mod packet;
pub mod vorbis;

// 重导出常用类型
pub use packet::{Packet, PacketKind};
pub use vorbis::{EncodePhase, EncoderConfig, QuantizedState};
