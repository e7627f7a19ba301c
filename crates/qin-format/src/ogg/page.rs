//! Ogg 页面结构与序列化.

use std::io::Write;

use qin_core::QinResult;
use qin_core::crc::crc32_ogg;

use super::{OGG_CAPTURE_PATTERN, OGG_HEADER_SIZE, PageFlags};

/// 一个 Ogg 页面
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OggPage {
    /// 头部类型标志
    pub flags: PageFlags,
    /// 粒度位置 (本页无完整 packet 时为 -1)
    pub granule_position: i64,
    /// 逻辑流序列号
    pub serial_number: u32,
    /// 页面序号
    pub sequence: u32,
    /// 头部记录的 CRC
    pub checksum: u32,
    /// 段表
    pub segment_table: Vec<u8>,
    /// 页面数据
    pub body: Vec<u8>,
}

impl OggPage {
    /// 是否为 BOS 页面
    pub fn is_bos(&self) -> bool {
        self.flags.contains(PageFlags::BOS)
    }

    /// 是否为 EOS 页面
    pub fn is_eos(&self) -> bool {
        self.flags.contains(PageFlags::EOS)
    }

    /// 首个段是否延续上一页的 packet
    pub fn is_continued(&self) -> bool {
        self.flags.contains(PageFlags::CONTINUED)
    }

    /// 页面总字节数
    pub fn size(&self) -> usize {
        OGG_HEADER_SIZE + self.segment_table.len() + self.body.len()
    }

    /// 本页完成的 packet 数 (段值小于 255 的段数)
    pub fn completed_packets(&self) -> usize {
        self.segment_table.iter().filter(|&&s| s < 255).count()
    }

    /// 按当前字段计算 CRC (CRC 字段按 0 参与计算)
    pub fn compute_crc(&self) -> u32 {
        let mut bytes = self.serialize(0);
        bytes.extend_from_slice(&self.body);
        crc32_ogg(&bytes)
    }

    /// 校验头部记录的 CRC
    pub fn verify_crc(&self) -> bool {
        self.compute_crc() == self.checksum
    }

    /// 重新计算并写入 CRC
    pub fn update_crc(&mut self) {
        self.checksum = self.compute_crc();
    }

    /// 序列化为字节 (使用已记录的 CRC)
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = self.serialize(self.checksum);
        bytes.extend_from_slice(&self.body);
        bytes
    }

    /// 写入输出流
    pub fn write_to<W: Write>(&self, out: &mut W) -> QinResult<()> {
        out.write_all(&self.serialize(self.checksum))?;
        out.write_all(&self.body)?;
        Ok(())
    }

    /// 构建头部与段表
    fn serialize(&self, checksum: u32) -> Vec<u8> {
        let mut header = Vec::with_capacity(OGG_HEADER_SIZE + self.segment_table.len());
        header.extend_from_slice(OGG_CAPTURE_PATTERN);
        header.push(0);
        header.push(self.flags.bits());
        header.extend_from_slice(&self.granule_position.to_le_bytes());
        header.extend_from_slice(&self.serial_number.to_le_bytes());
        header.extend_from_slice(&self.sequence.to_le_bytes());
        header.extend_from_slice(&checksum.to_le_bytes());
        header.push(self.segment_table.len() as u8);
        header.extend_from_slice(&self.segment_table);
        header
    }
}
