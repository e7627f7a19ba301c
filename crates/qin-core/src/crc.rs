//! CRC 校验和计算.
//!
//! 提供 Ogg 页面使用的 CRC-32: 多项式 0x04C11DB7, 初始值 0, 不反射, 不取反.

/// Ogg CRC-32 多项式
pub const OGG_CRC_POLY: u32 = 0x04C1_1DB7;

/// CRC-32 查找表 (多项式 0x04C11DB7, 高位在前)
const CRC32_TABLE: [u32; 256] = {
    let mut table = [0u32; 256];
    let mut i = 0u32;
    while i < 256 {
        let mut crc = i << 24;
        let mut j = 0;
        while j < 8 {
            if crc & 0x8000_0000 != 0 {
                crc = (crc << 1) ^ OGG_CRC_POLY;
            } else {
                crc <<= 1;
            }
            j += 1;
        }
        table[i as usize] = crc;
        i += 1;
    }
    table
};

/// 计算 Ogg CRC-32
///
/// 校验页面时, 调用方需保证头部 22..26 字节的 CRC 字段已置零.
pub fn crc32_ogg(data: &[u8]) -> u32 {
    crc32_ogg_update(0, data)
}

/// 在已有 CRC 上继续累积 (页面头部与负载分段计算)
pub fn crc32_ogg_update(mut crc: u32, data: &[u8]) -> u32 {
    for &byte in data {
        crc = (crc << 8) ^ CRC32_TABLE[((crc >> 24) as u8 ^ byte) as usize];
    }
    crc
}

#[cfg(test)]
mod tests {
    use super::*;

    /// 逐位实现, 作为查找表的对照
    fn crc32_bitwise(data: &[u8]) -> u32 {
        let mut crc = 0u32;
        for &byte in data {
            crc ^= u32::from(byte) << 24;
            for _ in 0..8 {
                if crc & 0x8000_0000 != 0 {
                    crc = (crc << 1) ^ OGG_CRC_POLY;
                } else {
                    crc <<= 1;
                }
            }
        }
        crc
    }

    #[test]
    fn test_crc32_空数据() {
        assert_eq!(crc32_ogg(&[]), 0);
    }

    #[test]
    fn test_crc32_已知值() {
        // CRC-32/CKSUM 去掉结果取反后的 "123456789" 校验值
        assert_eq!(crc32_ogg(b"123456789"), 0x89A1_897F);
    }

    #[test]
    fn test_crc32_与逐位实现一致() {
        let data: Vec<u8> = (0..1000u32).map(|i| (i * 37 + 11) as u8).collect();
        assert_eq!(crc32_ogg(&data), crc32_bitwise(&data));
    }

    #[test]
    fn test_crc32_分段累积() {
        let data = b"OggS\0\x02segmented payload";
        let (head, tail) = data.split_at(7);
        assert_eq!(crc32_ogg_update(crc32_ogg(head), tail), crc32_ogg(data));
    }
}
