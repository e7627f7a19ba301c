//! 组包: 三个头包 + 每块一个音频包.

use qin_core::{QinError, QinResult};

use crate::packet::{Packet, PacketKind};

use super::config::EncoderConfig;
use super::headers::{CommentHeader, IdentificationHeader};
use super::quantizer::CodedBlock;
use super::setup::StreamLayout;

/// 头包个数
pub const HEADER_PACKET_COUNT: usize = 3;

/// 生成标识头、注释头与 setup 头
pub fn build_header_packets(
    layout: &StreamLayout,
    sample_rate: u32,
    config: &EncoderConfig,
) -> QinResult<Vec<Packet>> {
    let channels = u8::try_from(layout.channels())
        .map_err(|_| QinError::InvalidConfiguration(format!("声道数过多: {}", layout.channels())))?;
    let identification = IdentificationHeader {
        channels,
        sample_rate,
        bitrate_maximum: 0,
        bitrate_nominal: config.quality_tier().nominal_bitrate(layout.channels(), sample_rate),
        bitrate_minimum: 0,
        short_block: layout.block_size(false),
        long_block: layout.block_size(true),
    };
    let comment = CommentHeader::new(config.vendor.clone(), config.comments.clone());

    Ok(vec![
        Packet::header(PacketKind::Identification, identification.to_bytes()),
        Packet::header(PacketKind::Comment, comment.to_bytes()),
        Packet::header(PacketKind::Setup, layout.write_setup_header()?),
    ])
}

/// 第 `index` 个音频包结束处的粒度位置
///
/// 解码器对首包不输出采样, 之后每包输出 `hop` 个; 最后一包截断到输入采样数.
pub fn granule_for_block(index: usize, hop: usize, sample_count: u64) -> i64 {
    let end = (index as u64).saturating_mul(hop as u64).min(sample_count);
    i64::try_from(end).unwrap_or(i64::MAX)
}

/// 把编码块包装为音频包
pub fn build_audio_packets(coded: &[CodedBlock], hop: usize, sample_count: u64) -> Vec<Packet> {
    coded
        .iter()
        .map(|block| {
            Packet::audio(
                block.data.clone(),
                granule_for_block(block.index, hop, sample_count),
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vorbis::quantizer::QuantizationStats;

    #[test]
    fn test_头包顺序与内容() {
        let layout = StreamLayout::new(2, 256, 2048);
        let config = EncoderConfig::default().with_comment("TITLE=test");
        let packets = build_header_packets(&layout, 44100, &config).unwrap();
        assert_eq!(packets.len(), HEADER_PACKET_COUNT);
        assert_eq!(packets[0].kind, PacketKind::Identification);
        assert_eq!(packets[1].kind, PacketKind::Comment);
        assert_eq!(packets[2].kind, PacketKind::Setup);
        assert!(packets.iter().all(|p| p.granule_position == 0 && p.kind.is_header()));

        let ident = IdentificationHeader::parse(&packets[0].data).unwrap();
        assert_eq!(ident.channels, 2);
        assert_eq!(ident.sample_rate, 44100);
        assert_eq!(ident.bitrate_nominal, 128_000);
        let comment = CommentHeader::parse(&packets[1].data).unwrap();
        assert_eq!(comment.get("TITLE"), Some("test"));
        assert_eq!(comment.get("ENCODER"), Some("qin"));
    }

    #[test]
    fn test_声道数超限() {
        let layout = StreamLayout::new(300, 256, 2048);
        assert!(build_header_packets(&layout, 44100, &EncoderConfig::default()).is_err());
    }

    #[test]
    fn test_粒度位置() {
        assert_eq!(granule_for_block(0, 1024, 4410), 0);
        assert_eq!(granule_for_block(1, 1024, 4410), 1024);
        assert_eq!(granule_for_block(4, 1024, 4410), 4096);
        assert_eq!(granule_for_block(5, 1024, 4410), 4410);

        let coded: Vec<CodedBlock> = (0..6)
            .map(|index| CodedBlock {
                index,
                data: vec![0],
                stats: QuantizationStats::default(),
            })
            .collect();
        let packets = build_audio_packets(&coded, 1024, 4410);
        assert_eq!(packets.last().unwrap().granule_position, 4410);
        assert!(packets.windows(2).all(|w| w[0].granule_position <= w[1].granule_position));
    }
}
