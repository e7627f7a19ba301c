//! # qin-core
//!
//! Qin 音频编码器核心库, 提供基础类型定义、错误处理和位级工具.
//!
//! 本 crate 为 Vorbis 编码核心 (qin-codec) 和 Ogg 封装 (qin-format) 提供底层基础设施.

pub mod bitreader;
pub mod bitwriter;
pub mod crc;
pub mod error;
pub mod pcm;

// 重导出常用类型
pub use error::{QinError, QinResult};
pub use pcm::{PcmBuffer, PcmLayout};
