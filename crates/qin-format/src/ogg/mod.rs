//! Ogg 容器.
//!
//! Ogg 页面格式:
//! - 捕获字 "OggS" (4 bytes)
//! - 版本 (1 byte, 必须为 0)
//! - 头部类型标志 (1 byte)
//! - 粒度位置 (8 bytes, little-endian)
//! - 逻辑流序列号 (4 bytes)
//! - 页面序号 (4 bytes)
//! - CRC 校验 (4 bytes)
//! - 段数 (1 byte)
//! - 段表 (N bytes)
//! - 页面数据

mod page;
mod reader;
mod writer;

use bitflags::bitflags;

pub use page::OggPage;
pub use reader::{OggPacket, OggPageReader, StreamSummary, inspect, reassemble_packets};
pub use writer::{OggStreamWriter, frame_packets};

/// Ogg 捕获字
pub const OGG_CAPTURE_PATTERN: &[u8; 4] = b"OggS";

/// 固定头部长度 (不含段表)
pub const OGG_HEADER_SIZE: usize = 27;

/// 单页最多的段数
pub const MAX_LACING_VALUES: usize = 255;

/// CRC 字段在页面头部中的偏移
pub const CRC_OFFSET: usize = 22;

bitflags! {
    /// 页面头部类型标志
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct PageFlags: u8 {
        /// 首个 packet 是上一页的延续
        const CONTINUED = 0x01;
        /// 逻辑流起始页
        const BOS       = 0x02;
        /// 逻辑流结束页
        const EOS       = 0x04;
    }
}
