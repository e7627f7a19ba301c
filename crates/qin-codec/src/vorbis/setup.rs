//! setup 头.
//!
//! 编码器为短块与长块各声明一套 floor / residue / mapping / mode:
//!
//! | mode | blockflag | mapping | floor | residue |
//! |------|-----------|---------|-------|---------|
//! | 0    | 0 (短)    | 0       | 0     | 0       |
//! | 1    | 1 (长)    | 1       | 1     | 1       |
//!
//! 立体声 mapping 带一个耦合步骤 (幅度 0, 角度 1).
//! 本模块同时提供 setup 头的结构解析, 用于码流自检.

use qin_core::bitreader::{BitReader, ilog};
use qin_core::bitwriter::BitWriter;
use qin_core::{QinError, QinResult};

use super::codebook::{CODEBOOK_SYNC, CODEBOOKS, lookup1_values};
use super::floor::Floor1;
use super::headers::{PACKET_TYPE_SETUP, VORBIS_MAGIC};
use super::residue::Residue;

/// 一个逻辑流的全部编码结构
#[derive(Debug, Clone)]
pub struct StreamLayout {
    channels: usize,
    short_block: usize,
    long_block: usize,
    floors: [Floor1; 2],
    residues: [Residue; 2],
}

impl StreamLayout {
    /// 为给定声道数和块大小构造
    pub fn new(channels: usize, short_block: usize, long_block: usize) -> Self {
        Self {
            channels,
            short_block,
            long_block,
            floors: [
                Floor1::for_block(short_block, false),
                Floor1::for_block(long_block, true),
            ],
            residues: [
                Residue::new(short_block / 2, channels),
                Residue::new(long_block / 2, channels),
            ],
        }
    }

    /// 声道数
    pub fn channels(&self) -> usize {
        self.channels
    }

    /// 块大小
    pub fn block_size(&self, long: bool) -> usize {
        if long { self.long_block } else { self.short_block }
    }

    /// 块长对应的 floor
    pub fn floor(&self, long: bool) -> &Floor1 {
        &self.floors[usize::from(long)]
    }

    /// 块长对应的 residue
    pub fn residue(&self, long: bool) -> &Residue {
        &self.residues[usize::from(long)]
    }

    /// 是否使用立体声耦合
    pub fn coupled(&self) -> bool {
        self.channels == 2
    }

    /// 音频包中 mode 号的位数
    pub fn mode_bits(&self) -> u32 {
        ilog(self.floors.len() as u32 - 1)
    }

    /// 生成完整的 setup 头包
    pub fn write_setup_header(&self) -> QinResult<Vec<u8>> {
        if CODEBOOKS.is_empty() {
            return Err(QinError::Internal("码本不可用".into()));
        }
        let mut bw = BitWriter::with_capacity(16 * 1024);
        bw.write_bits(u32::from(PACKET_TYPE_SETUP), 8);
        bw.write_bytes(VORBIS_MAGIC);

        CODEBOOKS.write_setup(&mut bw);

        // time domain 占位
        bw.write_bits(0, 6);
        bw.write_bits(0, 16);

        bw.write_bits(self.floors.len() as u32 - 1, 6);
        for floor in &self.floors {
            floor.write_setup(&mut bw);
        }

        bw.write_bits(self.residues.len() as u32 - 1, 6);
        for residue in &self.residues {
            residue.write_setup(&mut bw);
        }

        let channel_bits = ilog(self.channels as u32 - 1);
        bw.write_bits(self.floors.len() as u32 - 1, 6);
        for mapping in 0..self.floors.len() as u32 {
            bw.write_bits(0, 16);
            bw.write_bit(false); // 单一 submap
            if self.coupled() {
                bw.write_bit(true);
                bw.write_bits(0, 8);
                bw.write_bits(0, channel_bits);
                bw.write_bits(1, channel_bits);
            } else {
                bw.write_bit(false);
            }
            bw.write_bits(0, 2);
            bw.write_bits(0, 8); // time
            bw.write_bits(mapping, 8);
            bw.write_bits(mapping, 8);
        }

        bw.write_bits(self.floors.len() as u32 - 1, 6);
        for mode in 0..self.floors.len() as u32 {
            bw.write_bit(mode == 1);
            bw.write_bits(0, 16);
            bw.write_bits(0, 16);
            bw.write_bits(mode, 8);
        }

        bw.write_bit(true);
        Ok(bw.finish())
    }
}

/// setup 头结构摘要
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetupSummary {
    /// 码本数
    pub codebook_count: u32,
    /// floor 数
    pub floor_count: u32,
    /// 每个 residue 的类型号
    pub residue_types: Vec<u32>,
    /// mapping 数
    pub mapping_count: u32,
    /// 所有 mapping 的耦合步骤总数
    pub coupling_steps: u32,
    /// 每个 mode 的 blockflag
    pub mode_block_flags: Vec<bool>,
}

/// 解析 setup 头包结构, 校验各段字段合法且 framing 位为 1
pub fn parse_setup_header(packet: &[u8], channels: u8) -> QinResult<SetupSummary> {
    if packet.len() < 8 || packet[0] != PACKET_TYPE_SETUP || &packet[1..7] != VORBIS_MAGIC {
        return Err(QinError::MalformedInput("Vorbis setup 头标识无效".into()));
    }
    let mut br = BitReader::new(&packet[7..]);
    let section = |what: &'static str| {
        move |e: QinError| QinError::MalformedInput(format!("Vorbis setup {what} 解析失败: {e}"))
    };

    let codebook_count = parse_codebooks(&mut br).map_err(section("codebooks"))?;
    let time_count = br.read_bits(6)? + 1;
    for _ in 0..time_count {
        if br.read_bits(16)? != 0 {
            return Err(QinError::MalformedInput("Vorbis time domain 取值必须为 0".into()));
        }
    }
    let floor_count = parse_floors(&mut br).map_err(section("floors"))?;
    let residue_types = parse_residues(&mut br).map_err(section("residues"))?;
    let (mapping_count, coupling_steps) =
        parse_mappings(&mut br, channels, floor_count, residue_types.len() as u32)
            .map_err(section("mappings"))?;
    let mode_block_flags = parse_modes(&mut br, mapping_count).map_err(section("modes"))?;

    if !br.read_flag()? {
        return Err(QinError::MalformedInput("Vorbis setup framing 位非法".into()));
    }
    Ok(SetupSummary {
        codebook_count,
        floor_count,
        residue_types,
        mapping_count,
        coupling_steps,
        mode_block_flags,
    })
}

fn parse_codebooks(br: &mut BitReader<'_>) -> QinResult<u32> {
    let count = br.read_bits(8)? + 1;
    for _ in 0..count {
        let sync = br.read_bits(24)?;
        if sync != CODEBOOK_SYNC {
            return Err(QinError::MalformedInput(format!("码本同步字错误: 0x{sync:06X}")));
        }
        let dimensions = br.read_bits(16)?;
        let entries = br.read_bits(24)?;
        if dimensions == 0 || entries == 0 {
            return Err(QinError::MalformedInput("码本维度或条目数为 0".into()));
        }
        if br.read_flag()? {
            let mut current = 0u32;
            br.read_bits(5)?;
            while current < entries {
                let number = br.read_bits(ilog(entries - current))?;
                if number == 0 || number > entries - current {
                    return Err(QinError::MalformedInput("有序码长组无效".into()));
                }
                current += number;
            }
        } else {
            let sparse = br.read_flag()?;
            for _ in 0..entries {
                if !sparse || br.read_flag()? {
                    br.read_bits(5)?;
                }
            }
        }

        match br.read_bits(4)? {
            0 => {}
            lookup @ (1 | 2) => {
                br.read_bits(32)?;
                br.read_bits(32)?;
                let value_bits = br.read_bits(4)? + 1;
                br.read_flag()?;
                let values = if lookup == 1 {
                    lookup1_values(entries, dimensions)
                } else {
                    entries.saturating_mul(dimensions)
                };
                for _ in 0..values {
                    br.read_bits(value_bits)?;
                }
            }
            other => {
                return Err(QinError::MalformedInput(format!("码本 lookup 类型非法: {other}")));
            }
        }
    }
    Ok(count)
}

fn parse_floors(br: &mut BitReader<'_>) -> QinResult<u32> {
    let count = br.read_bits(6)? + 1;
    for _ in 0..count {
        let floor_type = br.read_bits(16)?;
        if floor_type != 1 {
            return Err(QinError::MalformedInput(format!("不支持的 floor 类型: {floor_type}")));
        }
        let partitions = br.read_bits(5)?;
        let classes: Vec<u32> = (0..partitions).map(|_| br.read_bits(4)).collect::<QinResult<_>>()?;
        let class_count = classes.iter().max().map_or(0, |&m| m + 1);
        let mut dimensions = Vec::with_capacity(class_count as usize);
        for _ in 0..class_count {
            dimensions.push(br.read_bits(3)? + 1);
            let subclass = br.read_bits(2)?;
            if subclass > 0 {
                br.read_bits(8)?;
            }
            for _ in 0..1u32 << subclass {
                br.read_bits(8)?;
            }
        }
        br.read_bits(2)?;
        let range_bits = br.read_bits(4)?;
        for class in classes {
            for _ in 0..dimensions[class as usize] {
                br.read_bits(range_bits)?;
            }
        }
    }
    Ok(count)
}

fn parse_residues(br: &mut BitReader<'_>) -> QinResult<Vec<u32>> {
    let count = br.read_bits(6)? + 1;
    let mut types = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let residue_type = br.read_bits(16)?;
        if residue_type > 2 {
            return Err(QinError::MalformedInput(format!("residue 类型非法: {residue_type}")));
        }
        br.read_bits(24)?;
        br.read_bits(24)?;
        br.read_bits(24)?;
        let classifications = br.read_bits(6)? + 1;
        br.read_bits(8)?;
        let mut cascades = Vec::with_capacity(classifications as usize);
        for _ in 0..classifications {
            let low = br.read_bits(3)?;
            let high = if br.read_flag()? { br.read_bits(5)? } else { 0 };
            cascades.push(high * 8 + low);
        }
        let books: u32 = cascades.iter().map(|c| c.count_ones()).sum();
        for _ in 0..books {
            br.read_bits(8)?;
        }
        types.push(residue_type);
    }
    Ok(types)
}

fn parse_mappings(
    br: &mut BitReader<'_>,
    channels: u8,
    floor_count: u32,
    residue_count: u32,
) -> QinResult<(u32, u32)> {
    let count = br.read_bits(6)? + 1;
    let channel_bits = ilog(u32::from(channels).saturating_sub(1));
    let mut coupling_steps = 0u32;
    for _ in 0..count {
        if br.read_bits(16)? != 0 {
            return Err(QinError::MalformedInput("mapping 类型必须为 0".into()));
        }
        let submaps = if br.read_flag()? { br.read_bits(4)? + 1 } else { 1 };
        if br.read_flag()? {
            let steps = br.read_bits(8)? + 1;
            for _ in 0..steps {
                let magnitude = br.read_bits(channel_bits)?;
                let angle = br.read_bits(channel_bits)?;
                if magnitude == angle || magnitude >= u32::from(channels) || angle >= u32::from(channels) {
                    return Err(QinError::MalformedInput("耦合声道非法".into()));
                }
            }
            coupling_steps += steps;
        }
        if br.read_bits(2)? != 0 {
            return Err(QinError::MalformedInput("mapping 保留位非零".into()));
        }
        if submaps > 1 {
            for _ in 0..channels {
                br.read_bits(4)?;
            }
        }
        for _ in 0..submaps {
            br.read_bits(8)?;
            let floor = br.read_bits(8)?;
            let residue = br.read_bits(8)?;
            if floor >= floor_count || residue >= residue_count {
                return Err(QinError::MalformedInput("mapping 引用越界".into()));
            }
        }
    }
    Ok((count, coupling_steps))
}

fn parse_modes(br: &mut BitReader<'_>, mapping_count: u32) -> QinResult<Vec<bool>> {
    let count = br.read_bits(6)? + 1;
    let mut flags = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let block_flag = br.read_flag()?;
        let window = br.read_bits(16)?;
        let transform = br.read_bits(16)?;
        let mapping = br.read_bits(8)?;
        if window != 0 || transform != 0 || mapping >= mapping_count {
            return Err(QinError::MalformedInput("mode 字段非法".into()));
        }
        flags.push(block_flag);
    }
    Ok(flags)
}
