//! Ogg 页面封装.
//!
//! 分页规则:
//! - 标识头独占第 0 页 (BOS)
//! - 注释头与 setup 头随后, setup 头结束后强制换页, 音频从新页开始
//! - 页面数据达到 `max_page_body` 字节或段表满 255 项时换页, packet 可跨页 (续延标志)
//! - 页面粒度位置取本页最后一个完成的 packet, 无完成 packet 时为 -1
//! - 最后一页带 EOS

use std::io::Write;

use log::debug;

use qin_codec::{Packet, PacketKind};
use qin_core::QinResult;

use super::{MAX_LACING_VALUES, OggPage, PageFlags};

/// 单个逻辑流的 Ogg 封装器
///
/// 已封口的页面延迟一页写出, 以便在 [`finish`](Self::finish) 时给最后一页加上 EOS.
pub struct OggStreamWriter<W: Write> {
    out: W,
    serial_number: u32,
    max_page_body: usize,
    /// 下一页的页面序号
    sequence: u32,
    /// 当前页段表
    segments: Vec<u8>,
    /// 当前页数据
    body: Vec<u8>,
    /// 当前页最后一个完成 packet 的粒度位置
    granule: Option<i64>,
    /// 当前页是否以上一页未完成的 packet 开头
    continued: bool,
    /// 已封口尚未写出的页面
    pending: Option<OggPage>,
    pages_written: usize,
    bytes_written: u64,
    packets_written: usize,
}

impl<W: Write> OggStreamWriter<W> {
    /// 创建封装器
    pub fn new(out: W, serial_number: u32, max_page_body: usize) -> Self {
        Self {
            out,
            serial_number,
            max_page_body: max_page_body.max(1),
            sequence: 0,
            segments: Vec::with_capacity(MAX_LACING_VALUES),
            body: Vec::new(),
            granule: None,
            continued: false,
            pending: None,
            pages_written: 0,
            bytes_written: 0,
            packets_written: 0,
        }
    }

    /// 逻辑流序列号
    pub fn serial_number(&self) -> u32 {
        self.serial_number
    }

    /// 已写出的页面数
    pub fn pages_written(&self) -> usize {
        self.pages_written
    }

    /// 已写出的字节数
    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    /// 写入一个 packet
    pub fn write_packet(&mut self, packet: &Packet) -> QinResult<()> {
        let data = &packet.data[..];
        let mut offset = 0;
        loop {
            if self.page_full() {
                self.seal_page(offset > 0)?;
            }
            let chunk = (data.len() - offset).min(255);
            self.segments.push(chunk as u8);
            self.body.extend_from_slice(&data[offset..offset + chunk]);
            offset += chunk;
            // 长度为 255 整数倍的 packet 以一个 0 段结束
            if chunk < 255 {
                break;
            }
        }
        self.granule = Some(packet.granule_position);
        self.packets_written += 1;

        if matches!(packet.kind, PacketKind::Identification | PacketKind::Setup) {
            self.flush_page()?;
        }
        Ok(())
    }

    /// 结束当前页 (当前页为空时无操作)
    pub fn flush_page(&mut self) -> QinResult<()> {
        self.seal_page(false)
    }

    /// 写出剩余页面并为最后一页加上 EOS, 返回输出流
    pub fn finish(mut self) -> QinResult<W> {
        self.seal_page(false)?;
        if let Some(mut last) = self.pending.take() {
            last.flags |= PageFlags::EOS;
            self.emit(last)?;
        }
        self.out.flush()?;
        debug!(
            "Ogg 封装完成: serial=0x{:08X}, packets={}, pages={}, bytes={}",
            self.serial_number, self.packets_written, self.pages_written, self.bytes_written,
        );
        Ok(self.out)
    }

    fn page_full(&self) -> bool {
        self.segments.len() >= MAX_LACING_VALUES || self.body.len() >= self.max_page_body
    }

    /// 封口当前页, `next_continued` 表示下一页以未完成的 packet 开头
    fn seal_page(&mut self, next_continued: bool) -> QinResult<()> {
        if self.segments.is_empty() {
            return Ok(());
        }

        let mut flags = PageFlags::empty();
        if self.sequence == 0 {
            flags |= PageFlags::BOS;
        }
        if self.continued {
            flags |= PageFlags::CONTINUED;
        }
        let page = OggPage {
            flags,
            granule_position: self.granule.take().unwrap_or(-1),
            serial_number: self.serial_number,
            sequence: self.sequence,
            checksum: 0,
            segment_table: std::mem::take(&mut self.segments),
            body: std::mem::take(&mut self.body),
        };
        self.sequence = self.sequence.wrapping_add(1);
        self.continued = next_continued;

        if let Some(previous) = self.pending.replace(page) {
            self.emit(previous)?;
        }
        Ok(())
    }

    fn emit(&mut self, mut page: OggPage) -> QinResult<()> {
        page.update_crc();
        page.write_to(&mut self.out)?;
        self.pages_written += 1;
        self.bytes_written += page.size() as u64;
        Ok(())
    }
}

/// 把 packet 序列封装为完整的 Ogg 字节流
pub fn frame_packets<'a, I>(packets: I, serial_number: u32, max_page_body: usize) -> QinResult<Vec<u8>>
where
    I: IntoIterator<Item = &'a Packet>,
{
    let mut writer = OggStreamWriter::new(Vec::new(), serial_number, max_page_body);
    for packet in packets {
        writer.write_packet(packet)?;
    }
    writer.finish()
}
