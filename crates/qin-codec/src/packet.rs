//! 编码后的逻辑包.
//!
//! 封装前的 Vorbis 包: 三个头包或一个音频块, 附带 Ogg 页面所需的粒度位置.

use bytes::Bytes;

/// 包类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketKind {
    /// 标识头
    Identification,
    /// 注释头
    Comment,
    /// setup 头
    Setup,
    /// 音频数据
    Audio,
}

impl PacketKind {
    /// 是否为头包
    pub fn is_header(self) -> bool {
        !matches!(self, Self::Audio)
    }
}

/// 逻辑包
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    /// 包数据
    pub data: Bytes,
    /// 包结束处的粒度位置 (头包为 0)
    pub granule_position: i64,
    /// 包类型
    pub kind: PacketKind,
}

impl Packet {
    /// 创建头包
    pub fn header(kind: PacketKind, data: impl Into<Bytes>) -> Self {
        Self {
            data: data.into(),
            granule_position: 0,
            kind,
        }
    }

    /// 创建音频包
    pub fn audio(data: impl Into<Bytes>, granule_position: i64) -> Self {
        Self {
            data: data.into(),
            granule_position,
            kind: PacketKind::Audio,
        }
    }

    /// 数据大小 (字节)
    pub fn size(&self) -> usize {
        self.data.len()
    }

    /// 是否为空包
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}
