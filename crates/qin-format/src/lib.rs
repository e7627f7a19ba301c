//! # qin-format
//!
//! Qin 音频编码器容器格式库, 负责 Ogg 页面的封装与读取.
//!
//! 封装端把 [`qin_codec::Packet`] 序列切分为 Ogg 页面;
//! 读取端用于校验输出 (页面解析、CRC 校验、packet 重组与流概览).

pub mod ogg;

// 重导出常用类型
pub use ogg::{
    OggPacket, OggPage, OggPageReader, OggStreamWriter, PageFlags, StreamSummary, frame_packets, inspect,
    reassemble_packets,
};
