//! Ogg 页面读取与流检查.
//!
//! 只做容器层解析: 页面边界、CRC、packet 重组和标识头概览, 不解码音频.

use std::io::Cursor;

use byteorder::{LittleEndian, ReadBytesExt};
use log::debug;

use qin_codec::vorbis::IdentificationHeader;
use qin_core::{QinError, QinResult};

use super::{OGG_CAPTURE_PATTERN, OGG_HEADER_SIZE, OggPage, PageFlags};

/// 逐页读取字节切片中的 Ogg 页面
///
/// 遇到错误后迭代结束.
pub struct OggPageReader<'a> {
    data: &'a [u8],
    position: usize,
    failed: bool,
}

impl<'a> OggPageReader<'a> {
    /// 创建读取器
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            position: 0,
            failed: false,
        }
    }

    /// 当前字节偏移
    pub fn position(&self) -> usize {
        self.position
    }

    /// 读取下一页
    pub fn read_page(&mut self) -> QinResult<OggPage> {
        let start = self.position;
        let rest = &self.data[start..];
        if rest.len() < OGG_HEADER_SIZE {
            return Err(QinError::MalformedInput(format!(
                "偏移 {start}: 页面头部被截断 (剩余 {} 字节)",
                rest.len(),
            )));
        }
        if &rest[0..4] != OGG_CAPTURE_PATTERN {
            return Err(QinError::MalformedInput(format!(
                "偏移 {start}: 无效的 Ogg 捕获字",
            )));
        }

        let mut cursor = Cursor::new(&rest[4..OGG_HEADER_SIZE]);
        let version = cursor.read_u8()?;
        if version != 0 {
            return Err(QinError::MalformedInput(format!(
                "偏移 {start}: 不支持的 Ogg 版本: {version}",
            )));
        }
        let raw_flags = cursor.read_u8()?;
        let flags = PageFlags::from_bits(raw_flags).ok_or_else(|| {
            QinError::MalformedInput(format!("偏移 {start}: 未知的页面标志 0x{raw_flags:02X}"))
        })?;
        let granule_position = cursor.read_i64::<LittleEndian>()?;
        let serial_number = cursor.read_u32::<LittleEndian>()?;
        let sequence = cursor.read_u32::<LittleEndian>()?;
        let checksum = cursor.read_u32::<LittleEndian>()?;
        let num_segments = cursor.read_u8()? as usize;

        let table_end = OGG_HEADER_SIZE + num_segments;
        if rest.len() < table_end {
            return Err(QinError::MalformedInput(format!(
                "偏移 {start}: 段表被截断",
            )));
        }
        let segment_table = rest[OGG_HEADER_SIZE..table_end].to_vec();
        let body_size: usize = segment_table.iter().map(|&s| s as usize).sum();
        let page_end = table_end + body_size;
        if rest.len() < page_end {
            return Err(QinError::MalformedInput(format!(
                "偏移 {start}: 页面数据被截断 (需要 {body_size} 字节, 剩余 {})",
                rest.len() - table_end,
            )));
        }
        let body = rest[table_end..page_end].to_vec();
        self.position = start + page_end;

        Ok(OggPage {
            flags,
            granule_position,
            serial_number,
            sequence,
            checksum,
            segment_table,
            body,
        })
    }
}

impl Iterator for OggPageReader<'_> {
    type Item = QinResult<OggPage>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.position >= self.data.len() {
            return None;
        }
        let result = self.read_page();
        if result.is_err() {
            self.failed = true;
        }
        Some(result)
    }
}

/// 重组出的 packet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OggPacket {
    /// packet 数据
    pub data: Vec<u8>,
    /// packet 结束所在页的粒度位置
    pub granule_position: i64,
    /// packet 结束所在页的下标
    pub page_index: usize,
}

/// 按段表与续延标志重组 packet 序列
pub fn reassemble_packets(pages: &[OggPage]) -> QinResult<Vec<OggPacket>> {
    let mut packets = Vec::new();
    let mut partial = Vec::new();
    let mut in_progress = false;

    for (index, page) in pages.iter().enumerate() {
        match (page.is_continued(), in_progress) {
            (true, false) => {
                return Err(QinError::MalformedInput(format!(
                    "第 {index} 页标记为续延, 但前面没有未完成的 packet",
                )));
            }
            (false, true) => {
                return Err(QinError::MalformedInput(format!(
                    "第 {index} 页未标记续延, 上一个 packet 未完成",
                )));
            }
            _ => {}
        }

        let mut offset = 0;
        for &lacing in &page.segment_table {
            let end = offset + lacing as usize;
            let segment = page.body.get(offset..end).ok_or_else(|| {
                QinError::MalformedInput(format!("第 {index} 页: 段表超出页面数据"))
            })?;
            partial.extend_from_slice(segment);
            offset = end;
            in_progress = true;
            if lacing < 255 {
                packets.push(OggPacket {
                    data: std::mem::take(&mut partial),
                    granule_position: page.granule_position,
                    page_index: index,
                });
                in_progress = false;
            }
        }
    }

    if in_progress {
        return Err(QinError::MalformedInput("流末尾的 packet 不完整".into()));
    }
    Ok(packets)
}

/// Ogg Vorbis 流概览
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamSummary {
    /// 逻辑流序列号
    pub serial: u32,
    /// 页面数
    pub pages: usize,
    /// packet 数 (含 3 个头包)
    pub packets: usize,
    /// 声道数
    pub channels: u8,
    /// 采样率
    pub sample_rate: u32,
    /// 最后一页的粒度位置
    pub final_granule: i64,
    /// 所有页面 CRC 均正确
    pub crc_ok: bool,
}

/// 解析 Ogg Vorbis 字节流并汇总
pub fn inspect(bytes: &[u8]) -> QinResult<StreamSummary> {
    let pages = OggPageReader::new(bytes).collect::<QinResult<Vec<_>>>()?;
    let (Some(first), Some(last)) = (pages.first(), pages.last()) else {
        return Err(QinError::MalformedInput("没有 Ogg 页面".into()));
    };
    let serial = first.serial_number;
    if let Some(other) = pages.iter().find(|p| p.serial_number != serial) {
        return Err(QinError::MalformedInput(format!(
            "不支持多路逻辑流: 0x{serial:08X} 与 0x{:08X}",
            other.serial_number,
        )));
    }

    let packets = reassemble_packets(&pages)?;
    let ident = packets
        .first()
        .ok_or_else(|| QinError::MalformedInput("没有标识头".into()))?;
    let ident = IdentificationHeader::parse(&ident.data)?;

    let summary = StreamSummary {
        serial,
        pages: pages.len(),
        packets: packets.len(),
        channels: ident.channels,
        sample_rate: ident.sample_rate,
        final_granule: last.granule_position,
        crc_ok: pages.iter().all(OggPage::verify_crc),
    };
    debug!("Ogg 流概览: {summary:?}");
    Ok(summary)
}
