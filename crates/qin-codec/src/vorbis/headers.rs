//! Vorbis 标识头与注释头.

use qin_core::{QinError, QinResult};

/// 头包公共标识
pub const VORBIS_MAGIC: &[u8; 6] = b"vorbis";
/// 标识头包类型
pub const PACKET_TYPE_IDENTIFICATION: u8 = 0x01;
/// 注释头包类型
pub const PACKET_TYPE_COMMENT: u8 = 0x03;
/// setup 头包类型
pub const PACKET_TYPE_SETUP: u8 = 0x05;

/// 标识头包固定长度
const IDENTIFICATION_LEN: usize = 30;

/// 标识头
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentificationHeader {
    /// 声道数
    pub channels: u8,
    /// 采样率
    pub sample_rate: u32,
    /// 码率上限 (0 表示未指定)
    pub bitrate_maximum: i32,
    /// 名义码率
    pub bitrate_nominal: i32,
    /// 码率下限 (0 表示未指定)
    pub bitrate_minimum: i32,
    /// 短块大小
    pub short_block: usize,
    /// 长块大小
    pub long_block: usize,
}

impl IdentificationHeader {
    /// 序列化为 30 字节头包
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(IDENTIFICATION_LEN);
        out.push(PACKET_TYPE_IDENTIFICATION);
        out.extend_from_slice(VORBIS_MAGIC);
        out.extend_from_slice(&0u32.to_le_bytes());
        out.push(self.channels);
        out.extend_from_slice(&self.sample_rate.to_le_bytes());
        out.extend_from_slice(&self.bitrate_maximum.to_le_bytes());
        out.extend_from_slice(&self.bitrate_nominal.to_le_bytes());
        out.extend_from_slice(&self.bitrate_minimum.to_le_bytes());
        let exp0 = self.short_block.trailing_zeros() as u8;
        let exp1 = self.long_block.trailing_zeros() as u8;
        out.push((exp1 << 4) | (exp0 & 0x0F));
        out.push(1);
        out
    }

    /// 解析标识头包
    pub fn parse(packet: &[u8]) -> QinResult<Self> {
        if packet.len() < IDENTIFICATION_LEN {
            return Err(QinError::MalformedInput(format!(
                "Vorbis 标识头长度不足: {}",
                packet.len()
            )));
        }
        check_preamble(packet, PACKET_TYPE_IDENTIFICATION, "标识头")?;

        let le_u32 = |at: usize| u32::from_le_bytes([packet[at], packet[at + 1], packet[at + 2], packet[at + 3]]);
        let version = le_u32(7);
        if version != 0 {
            return Err(QinError::MalformedInput(format!("Vorbis 版本不支持: {version}")));
        }
        let channels = packet[11];
        let sample_rate = le_u32(12);
        if channels == 0 || sample_rate == 0 {
            return Err(QinError::MalformedInput("Vorbis 声道数或采样率为 0".into()));
        }

        let exp0 = packet[28] & 0x0F;
        let exp1 = packet[28] >> 4;
        if !(6..=13).contains(&exp0) || !(6..=13).contains(&exp1) || exp1 < exp0 {
            return Err(QinError::MalformedInput(format!(
                "Vorbis 块大小非法: exp0={exp0}, exp1={exp1}"
            )));
        }
        if packet[29] & 0x01 == 0 {
            return Err(QinError::MalformedInput("Vorbis 标识头 framing 位非法".into()));
        }

        Ok(Self {
            channels,
            sample_rate,
            bitrate_maximum: le_u32(16) as i32,
            bitrate_nominal: le_u32(20) as i32,
            bitrate_minimum: le_u32(24) as i32,
            short_block: 1 << exp0,
            long_block: 1 << exp1,
        })
    }
}

/// 注释头
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CommentHeader {
    /// 厂商字符串
    pub vendor: String,
    /// 用户注释 (`KEY=value`)
    pub comments: Vec<String>,
}

impl CommentHeader {
    /// 创建注释头
    pub fn new(vendor: impl Into<String>, comments: Vec<String>) -> Self {
        Self {
            vendor: vendor.into(),
            comments,
        }
    }

    /// 按字段名查找第一个注释值 (字段名不区分大小写)
    pub fn get(&self, key: &str) -> Option<&str> {
        self.comments.iter().find_map(|c| {
            let (k, v) = c.split_once('=')?;
            k.eq_ignore_ascii_case(key).then_some(v)
        })
    }

    /// 序列化为头包
    pub fn to_bytes(&self) -> Vec<u8> {
        let body: usize = self.comments.iter().map(|c| 4 + c.len()).sum();
        let mut out = Vec::with_capacity(7 + 4 + self.vendor.len() + 4 + body + 1);
        out.push(PACKET_TYPE_COMMENT);
        out.extend_from_slice(VORBIS_MAGIC);
        out.extend_from_slice(&(self.vendor.len() as u32).to_le_bytes());
        out.extend_from_slice(self.vendor.as_bytes());
        out.extend_from_slice(&(self.comments.len() as u32).to_le_bytes());
        for comment in &self.comments {
            out.extend_from_slice(&(comment.len() as u32).to_le_bytes());
            out.extend_from_slice(comment.as_bytes());
        }
        out.push(1);
        out
    }

    /// 解析注释头包
    pub fn parse(packet: &[u8]) -> QinResult<Self> {
        if packet.len() < 7 {
            return Err(QinError::MalformedInput("Vorbis 注释头长度不足".into()));
        }
        check_preamble(packet, PACKET_TYPE_COMMENT, "注释头")?;

        let mut pos = 7usize;
        let vendor = read_string(packet, &mut pos, "vendor")?;
        let count = read_le_u32(packet, &mut pos)? as usize;
        let mut comments = Vec::with_capacity(count.min(1024));
        for _ in 0..count {
            comments.push(read_string(packet, &mut pos, "comment")?);
        }
        match packet.get(pos) {
            Some(b) if b & 0x01 == 1 => Ok(Self { vendor, comments }),
            _ => Err(QinError::MalformedInput("Vorbis 注释头 framing 位非法".into())),
        }
    }
}

fn check_preamble(packet: &[u8], packet_type: u8, what: &str) -> QinResult<()> {
    if packet.first() != Some(&packet_type) || packet.get(1..7) != Some(VORBIS_MAGIC.as_slice()) {
        return Err(QinError::MalformedInput(format!("Vorbis {what}标识无效")));
    }
    Ok(())
}

fn read_le_u32(data: &[u8], pos: &mut usize) -> QinResult<u32> {
    let bytes = data
        .get(*pos..*pos + 4)
        .ok_or_else(|| QinError::MalformedInput(format!("读取 u32 越界: pos={}", *pos)))?;
    *pos += 4;
    Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

fn read_string(data: &[u8], pos: &mut usize, what: &str) -> QinResult<String> {
    let len = read_le_u32(data, pos)? as usize;
    let bytes = data
        .get(*pos..pos.saturating_add(len))
        .ok_or_else(|| QinError::MalformedInput(format!("{what} 字段越界: len={len}")))?;
    *pos += len;
    String::from_utf8(bytes.to_vec())
        .map_err(|_| QinError::MalformedInput(format!("{what} 不是合法 UTF-8")))
}
