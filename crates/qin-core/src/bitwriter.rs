//! 比特流写入器.
//!
//! 提供向字节缓冲区按位写入数据的能力, 是 Vorbis 头包和音频包的基础设施.
//!
//! 按小端位序写入 (LSB first): 每个字节先填充最低位, 多位值也从最低位开始写,
//! 与 Vorbis I 规定的位打包方式一致.

/// 比特流写入器
///
/// 向字节缓冲区按位写入数据, 使用小端位序 (LSB first).
///
/// # 示例
/// ```
/// use qin_core::bitwriter::BitWriter;
///
/// let mut bw = BitWriter::new();
/// bw.write_bits(0b1011, 4);
/// bw.write_bits(0b0001, 4);
/// bw.write_bits(0b0101_0101, 8);
/// let data = bw.finish();
/// assert_eq!(data, vec![0b0001_1011, 0b0101_0101]);
/// ```
#[derive(Debug, Clone)]
pub struct BitWriter {
    /// 输出缓冲区
    data: Vec<u8>,
    /// 当前字节 (正在填充)
    current_byte: u8,
    /// 当前字节中已填充的位数 (0-7)
    bit_count: u8,
}

impl BitWriter {
    /// 创建新的比特流写入器
    pub fn new() -> Self {
        Self::with_capacity(0)
    }

    /// 以指定容量创建比特流写入器
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            data: Vec::with_capacity(capacity),
            current_byte: 0,
            bit_count: 0,
        }
    }

    /// 写入 1 个位
    pub fn write_bit(&mut self, bit: bool) {
        if bit {
            self.current_byte |= 1 << self.bit_count;
        }
        self.bit_count += 1;
        if self.bit_count == 8 {
            self.data.push(self.current_byte);
            self.current_byte = 0;
            self.bit_count = 0;
        }
    }

    /// 写入 N 个位 (最多 32 位)
    ///
    /// 值的低 N 位被写入, 低位在前.
    pub fn write_bits(&mut self, value: u32, n: u32) {
        debug_assert!(n <= 32, "write_bits: n={} 超过 32 位", n);

        let mut value = if n >= 32 {
            u64::from(value)
        } else {
            u64::from(value) & ((1u64 << n) - 1)
        };
        let mut remaining = n;
        while remaining > 0 {
            let available = 8 - u32::from(self.bit_count);
            let to_write = remaining.min(available);
            let bits = (value & ((1u64 << to_write) - 1)) as u8;

            self.current_byte |= bits << self.bit_count;
            self.bit_count += to_write as u8;
            if self.bit_count == 8 {
                self.data.push(self.current_byte);
                self.current_byte = 0;
                self.bit_count = 0;
            }

            value >>= to_write;
            remaining -= to_write;
        }
    }

    /// 写入 Huffman 码字
    ///
    /// `codeword` 为码字的自然数值 (高位为树根方向), 解码器逐位读取时
    /// 最先读到最高位, 因此这里按从高到低的顺序逐位写入.
    pub fn write_codeword(&mut self, codeword: u32, len: u8) {
        debug_assert!(len <= 32, "write_codeword: len={} 超过 32 位", len);
        if len == 0 {
            return;
        }
        let reversed = codeword.reverse_bits() >> (32 - u32::from(len));
        self.write_bits(reversed, u32::from(len));
    }

    /// 对齐到字节边界 (用 0 填充)
    pub fn align_to_byte(&mut self) {
        if self.bit_count > 0 {
            self.data.push(self.current_byte);
            self.current_byte = 0;
            self.bit_count = 0;
        }
    }

    /// 完成写入, 返回字节数据
    ///
    /// 如果当前不在字节边界, 自动用 0 填充.
    pub fn finish(mut self) -> Vec<u8> {
        self.align_to_byte();
        self.data
    }

    /// 写入完整字节
    pub fn write_bytes(&mut self, bytes: &[u8]) {
        if self.bit_count == 0 {
            // 快速路径: 已对齐
            self.data.extend_from_slice(bytes);
        } else {
            for &b in bytes {
                self.write_bits(u32::from(b), 8);
            }
        }
    }
}

impl Default for BitWriter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bitreader::BitReader;

    #[test]
    fn test_write_bits_低位在前() {
        let mut bw = BitWriter::new();
        bw.write_bits(0b1011, 4);
        bw.write_bits(0b0001, 4);
        assert_eq!(bw.finish(), vec![0b0001_1011]);
    }

    #[test]
    fn test_write_bits_跨字节() {
        let mut bw = BitWriter::new();
        bw.write_bits(0b101, 3);
        bw.write_bits(0x1FF, 9);
        bw.write_bits(0, 4);
        // 位序: 1,0,1 | 1x9 | 0x4
        assert_eq!(bw.finish(), vec![0b1111_1101, 0b0000_1111]);
    }

    #[test]
    fn test_write_bits_32_位() {
        let mut bw = BitWriter::new();
        bw.write_bits(0x1234_5678, 32);
        assert_eq!(bw.finish(), vec![0x78, 0x56, 0x34, 0x12]);
    }

    #[test]
    fn test_write_bits_截断高位() {
        let mut bw = BitWriter::new();
        bw.write_bits(0xFF, 3);
        assert_eq!(bw.finish(), vec![0b0000_0111]);
    }

    #[test]
    fn test_write_bit_逐位写入() {
        let mut bw = BitWriter::new();
        for bit in [true, false, true, true, false, false, false, true] {
            bw.write_bit(bit);
        }
        assert_eq!(bw.finish(), vec![0b1000_1101]);
    }

    #[test]
    fn test_write_codeword_高位先出() {
        // 码字 0b110 (长度 3): 解码器依次读到 1, 1, 0
        let mut bw = BitWriter::new();
        bw.write_codeword(0b110, 3);
        let data = bw.finish();
        let mut br = BitReader::new(&data);
        assert_eq!(br.read_bits(1).unwrap(), 1);
        assert_eq!(br.read_bits(1).unwrap(), 1);
        assert_eq!(br.read_bits(1).unwrap(), 0);
    }

    #[test]
    fn test_align_to_byte() {
        let mut bw = BitWriter::new();
        bw.write_bits(0b101, 3);
        bw.align_to_byte();
        bw.write_bits(0xFF, 8);
        assert_eq!(bw.finish(), vec![0b0000_0101, 0xFF]);
    }

    #[test]
    fn test_write_bytes_未对齐() {
        let mut bw = BitWriter::new();
        bw.write_bit(true);
        bw.write_bytes(&[0x80]);
        assert_eq!(bw.finish(), vec![0x01, 0x01]);
    }

    #[test]
    fn test_读写往返() {
        let mut bw = BitWriter::new();
        bw.write_bits(0x564342, 24);
        bw.write_bits(5, 4);
        bw.write_bit(true);
        bw.write_bits(0xDEAD_BEEF, 32);
        let data = bw.finish();

        let mut br = BitReader::new(&data);
        assert_eq!(br.read_bits(24).unwrap(), 0x564342);
        assert_eq!(br.read_bits(4).unwrap(), 5);
        assert!(br.read_flag().unwrap());
        assert_eq!(br.read_bits(32).unwrap(), 0xDEAD_BEEF);
    }
}
