//! 比特流读取器.
//!
//! 与 [`BitWriter`](crate::bitwriter::BitWriter) 对应的小端位序 (LSB first) 读取器,
//! 用于头包解析和码流自检.

use crate::{QinError, QinResult};

/// 比特流读取器 (LSB first)
pub struct BitReader<'a> {
    data: &'a [u8],
    bit_pos: usize,
}

impl<'a> BitReader<'a> {
    /// 从字节切片创建读取器
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, bit_pos: 0 }
    }

    /// 剩余可读位数
    pub fn bits_left(&self) -> usize {
        self.data
            .len()
            .saturating_mul(8)
            .saturating_sub(self.bit_pos)
    }

    /// 当前位位置
    pub fn bit_position(&self) -> usize {
        self.bit_pos
    }

    /// 读取 1 位标志
    pub fn read_flag(&mut self) -> QinResult<bool> {
        Ok(self.read_bits(1)? != 0)
    }

    /// 读取 N 个位 (最多 32 位), 低位在前
    pub fn read_bits(&mut self, n: u32) -> QinResult<u32> {
        if n == 0 {
            return Ok(0);
        }
        if n > 32 {
            return Err(QinError::Internal(format!("read_bits 位数非法: {}", n)));
        }
        if self.bits_left() < n as usize {
            return Err(QinError::MalformedInput(format!(
                "比特流提前结束: 需要 {} 位, 剩余 {} 位",
                n,
                self.bits_left()
            )));
        }

        let mut out = 0u32;
        for i in 0..n {
            let bit_idx = self.bit_pos + i as usize;
            let bit = (self.data[bit_idx / 8] >> (bit_idx % 8)) & 1;
            out |= u32::from(bit) << i;
        }
        self.bit_pos += n as usize;
        Ok(out)
    }

    /// 读取 N 个完整字节 (要求当前位于字节边界)
    pub fn read_bytes(&mut self, n: usize) -> QinResult<&'a [u8]> {
        if self.bit_pos % 8 != 0 {
            return Err(QinError::Internal("read_bytes 需要字节对齐".into()));
        }
        let start = self.bit_pos / 8;
        let end = start
            .checked_add(n)
            .filter(|&end| end <= self.data.len())
            .ok_or_else(|| {
                QinError::MalformedInput(format!("字节数据不足: 需要 {} 字节", n))
            })?;
        self.bit_pos = end * 8;
        Ok(&self.data[start..end])
    }
}

/// Vorbis `ilog`: 表示 `v` 所需的最少位数, `ilog(0) == 0`
pub fn ilog(v: u32) -> u32 {
    32 - v.leading_zeros()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bit_reader_位序() {
        let data = [0b1011_0010];
        let mut br = BitReader::new(&data);
        assert_eq!(br.read_bits(1).unwrap(), 0);
        assert_eq!(br.read_bits(3).unwrap(), 0b001);
        assert_eq!(br.read_bits(4).unwrap(), 0b1011);
        assert!(br.read_bits(1).is_err());
    }

    #[test]
    fn test_read_bytes_对齐检查() {
        let data = [1u8, 2, 3];
        let mut br = BitReader::new(&data);
        assert_eq!(br.read_bytes(2).unwrap(), &[1, 2]);
        br.read_bits(1).unwrap();
        assert!(br.read_bytes(1).is_err());
    }

    #[test]
    fn test_ilog() {
        assert_eq!(ilog(0), 0);
        assert_eq!(ilog(1), 1);
        assert_eq!(ilog(2), 2);
        assert_eq!(ilog(3), 2);
        assert_eq!(ilog(127), 7);
        assert_eq!(ilog(128), 8);
        assert_eq!(ilog(u32::MAX), 32);
    }
}
