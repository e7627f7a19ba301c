//! Vorbis 码本.
//!
//! 码本由每个条目的 Huffman 码长和可选的矢量查找表 (lookup type 1) 组成.
//! 码长由整数权重确定性地构造, 码字按 Vorbis 规定的顺序分配, 与解码器重建的码树一致.
//!
//! 全部码本在进程内只构造一次 ([`CODEBOOKS`]), 之后只读共享.

use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::sync::LazyLock;

use qin_core::bitreader::ilog;
use qin_core::bitwriter::BitWriter;
use qin_core::{QinError, QinResult};

use super::residue::RESIDUE_CLASSIFICATIONS;

/// 码本同步字 "BCV"
pub const CODEBOOK_SYNC: u32 = 0x56_43_42;
/// Vorbis 允许的最大码长
pub const MAX_CODEWORD_LEN: u8 = 32;

/// floor1 Y 值标量码本 (128 项)
pub const FLOOR1_Y_BOOK: usize = 0;
/// residue 分类码本 (每个码字携带 2 个分区的分类)
pub const RESIDUE_CLASS_BOOK: usize = 1;
/// residue 矢量码本: 4 维, 取值 {-1, 0, 1}
pub const RESIDUE_UNIT_BOOK: usize = 2;
/// residue 矢量码本: 2 维, 取值 -4..=4
pub const RESIDUE_SMALL_BOOK: usize = 3;
/// residue 矢量码本: 2 维, 取值 -15..=15
pub const RESIDUE_MEDIUM_BOOK: usize = 4;
/// residue 级联第一级: 2 维, 取值 16 × (-7..=7)
pub const RESIDUE_COARSE_BOOK: usize = 5;
/// residue 级联第二级: 2 维, 取值 -8..=7
pub const RESIDUE_FINE_BOOK: usize = 6;

/// 矢量查找表 (lookup type 1): 每维取值 `minimum + delta × i`, `i ∈ [0, values)`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VqLookup {
    /// 最小值
    pub minimum: i32,
    /// 步长
    pub delta: i32,
    /// 每维取值个数
    pub values: u32,
}

impl VqLookup {
    /// 每维可表示的最大值
    pub fn maximum(&self) -> i32 {
        self.minimum + self.delta * (self.values as i32 - 1)
    }

    /// 标量值对应的索引
    fn index_of(&self, value: i32) -> Option<u32> {
        let offset = value.checked_sub(self.minimum)?;
        if offset < 0 || offset % self.delta != 0 {
            return None;
        }
        let idx = (offset / self.delta) as u32;
        (idx < self.values).then_some(idx)
    }
}

/// 单个码本
#[derive(Debug, Clone)]
pub struct Codebook {
    dimensions: u16,
    lengths: Vec<u8>,
    codewords: Vec<u32>,
    lookup: Option<VqLookup>,
}

impl Codebook {
    /// 由条目权重构造码本
    ///
    /// 权重越大码字越短; 带查找表时条目数必须等于 `values ^ dimensions`.
    pub fn from_weights(
        dimensions: u16,
        weights: &[u64],
        lookup: Option<VqLookup>,
    ) -> QinResult<Self> {
        if dimensions == 0 || weights.len() < 2 {
            return Err(QinError::Internal("码本维度或条目数非法".into()));
        }
        if let Some(lookup) = lookup {
            let expected = u64::from(lookup.values).checked_pow(u32::from(dimensions));
            if expected != Some(weights.len() as u64) {
                return Err(QinError::Internal(format!(
                    "查找表条目数不匹配: {}^{} != {}",
                    lookup.values,
                    dimensions,
                    weights.len()
                )));
            }
        }
        let lengths = huffman_lengths(weights);
        let codewords = make_codewords(&lengths)?;
        Ok(Self {
            dimensions,
            lengths,
            codewords,
            lookup,
        })
    }

    /// 维度
    pub fn dimensions(&self) -> usize {
        usize::from(self.dimensions)
    }

    /// 条目数
    pub fn entries(&self) -> usize {
        self.lengths.len()
    }

    /// 各条目码长
    pub fn lengths(&self) -> &[u8] {
        &self.lengths
    }

    /// 查找表
    pub fn lookup(&self) -> Option<&VqLookup> {
        self.lookup.as_ref()
    }

    /// 条目的码字与码长
    pub fn codeword(&self, entry: usize) -> Option<(u32, u8)> {
        Some((*self.codewords.get(entry)?, self.lengths[entry]))
    }

    /// 写入一个条目的码字
    pub fn write_entry(&self, bw: &mut BitWriter, entry: usize) -> QinResult<()> {
        let (code, len) = self
            .codeword(entry)
            .ok_or_else(|| QinError::Internal(format!("码本条目越界: {entry}")))?;
        bw.write_codeword(code, len);
        Ok(())
    }

    /// 矢量对应的条目号 (第 0 维为最低位)
    pub fn vector_entry(&self, values: &[i32]) -> Option<usize> {
        let lookup = self.lookup.as_ref()?;
        if values.len() != self.dimensions() {
            return None;
        }
        let mut entry = 0usize;
        let mut weight = 1usize;
        for &v in values {
            entry += lookup.index_of(v)? as usize * weight;
            weight *= lookup.values as usize;
        }
        Some(entry)
    }

    /// 写入一个矢量
    pub fn write_vector(&self, bw: &mut BitWriter, values: &[i32]) -> QinResult<()> {
        let entry = self
            .vector_entry(values)
            .ok_or_else(|| QinError::Internal(format!("矢量无法用码本表示: {values:?}")))?;
        self.write_entry(bw, entry)
    }

    /// 条目对应的矢量 (解码方向, 用于自检)
    pub fn entry_vector(&self, entry: usize) -> Option<Vec<i32>> {
        let lookup = self.lookup.as_ref()?;
        if entry >= self.entries() {
            return None;
        }
        let mut rest = entry;
        let values = lookup.values as usize;
        Some(
            (0..self.dimensions())
                .map(|_| {
                    let idx = rest % values;
                    rest /= values;
                    lookup.minimum + lookup.delta * idx as i32
                })
                .collect(),
        )
    }

    /// 写入 setup 头中的码本描述
    pub fn write_setup(&self, bw: &mut BitWriter) {
        bw.write_bits(CODEBOOK_SYNC, 24);
        bw.write_bits(u32::from(self.dimensions), 16);
        bw.write_bits(self.entries() as u32, 24);
        bw.write_bit(false); // ordered
        bw.write_bit(false); // sparse
        for &len in &self.lengths {
            bw.write_bits(u32::from(len - 1), 5);
        }

        match &self.lookup {
            None => bw.write_bits(0, 4),
            Some(lookup) => {
                bw.write_bits(1, 4);
                bw.write_bits(float32_pack(lookup.minimum as f32), 32);
                bw.write_bits(float32_pack(lookup.delta as f32), 32);
                let value_bits = ilog(lookup.values - 1).max(1);
                bw.write_bits(value_bits - 1, 4);
                bw.write_bit(false); // sequence_p
                for multiplicand in 0..lookup.values {
                    bw.write_bits(multiplicand, value_bits);
                }
            }
        }
    }
}

/// 由整数权重计算 Huffman 码长
///
/// 权重相同时按条目序号 (合并节点按创建顺序) 决定次序, 结果与平台无关.
/// 码长超过 32 时把权重向均匀方向压缩后重建.
pub fn huffman_lengths(weights: &[u64]) -> Vec<u8> {
    let mut weights: Vec<u64> = weights.iter().map(|&w| w.max(1)).collect();
    loop {
        let lengths = huffman_lengths_unbounded(&weights);
        if lengths.iter().all(|&l| l <= MAX_CODEWORD_LEN) {
            return lengths;
        }
        for w in &mut weights {
            *w = (*w >> 1).max(1);
        }
    }
}

fn huffman_lengths_unbounded(weights: &[u64]) -> Vec<u8> {
    let n = weights.len();
    if n < 2 {
        return vec![1; n];
    }

    // 节点: 0..n 为叶子, 之后为合并节点; parent 记录父节点
    let mut parent = vec![usize::MAX; 2 * n - 1];
    let mut heap: BinaryHeap<Reverse<(u64, usize)>> = weights
        .iter()
        .enumerate()
        .map(|(i, &w)| Reverse((w, i)))
        .collect();
    let mut next = n;
    while heap.len() > 1 {
        let (Some(Reverse((w1, a))), Some(Reverse((w2, b)))) = (heap.pop(), heap.pop()) else {
            break;
        };
        parent[a] = next;
        parent[b] = next;
        heap.push(Reverse((w1.saturating_add(w2), next)));
        next += 1;
    }

    let mut depth = vec![0u8; 2 * n - 1];
    // 合并节点的序号总大于其子节点, 逆序遍历即可自顶向下求深度
    for node in (0..next.saturating_sub(1)).rev() {
        depth[node] = depth[parent[node]].saturating_add(1);
    }
    depth.truncate(n);
    depth
}

/// 按 Vorbis 规则为码长表分配码字
///
/// 依条目顺序, 每个条目取当前深度最左侧的空闲节点. 码长表过度指定时报错.
pub fn make_codewords(lengths: &[u8]) -> QinResult<Vec<u32>> {
    let mut marker = [0u64; 33];
    let mut codewords = Vec::with_capacity(lengths.len());

    for &len in lengths {
        let len = usize::from(len);
        if len == 0 || len > usize::from(MAX_CODEWORD_LEN) {
            return Err(QinError::Internal(format!("码长非法: {len}")));
        }
        let mut entry = marker[len];
        if len < 32 && (entry >> len) != 0 {
            return Err(QinError::Internal("Huffman 码长表过度指定".into()));
        }
        codewords.push(entry as u32);

        // 向上寻找下一个可用分支
        for j in (1..=len).rev() {
            if marker[j] & 1 != 0 {
                if j == 1 {
                    marker[1] += 1;
                } else {
                    marker[j] = marker[j - 1] << 1;
                }
                break;
            }
            marker[j] += 1;
        }

        // 挂在刚占用节点下的更长标记改挂到新节点
        for j in len + 1..33 {
            if (marker[j] >> 1) == entry {
                entry = marker[j];
                marker[j] = marker[j - 1] << 1;
            } else {
                break;
            }
        }
    }
    Ok(codewords)
}

/// Vorbis 浮点打包: 21 位尾数, 10 位偏置指数, 1 位符号
pub fn float32_pack(value: f32) -> u32 {
    if value == 0.0 {
        return 0;
    }
    let sign = if value < 0.0 { 0x8000_0000u32 } else { 0 };
    let magnitude = f64::from(value.abs());
    let exp = (magnitude.log2() + 0.001).floor() as i32;
    let mantissa = (magnitude * 2f64.powi(20 - exp)).round() as u32;
    sign | (((exp + 768) as u32) << 21) | (mantissa & 0x1F_FFFF)
}

/// Vorbis 浮点解包
pub fn float32_unpack(packed: u32) -> f32 {
    let mantissa = f64::from(packed & 0x1F_FFFF);
    let exp = ((packed & 0x7FE0_0000) >> 21) as i32;
    let value = mantissa * 2f64.powi(exp - 788);
    if packed & 0x8000_0000 != 0 {
        -value as f32
    } else {
        value as f32
    }
}

/// lookup type 1 的每维取值个数: 满足 `r^dimensions <= entries` 的最大 r
pub fn lookup1_values(entries: u32, dimensions: u32) -> u32 {
    if entries == 0 || dimensions == 0 {
        return 0;
    }
    let mut r = 1u32;
    while u64::from(r + 1).checked_pow(dimensions).is_some_and(|p| p <= u64::from(entries)) {
        r += 1;
    }
    r
}

/// 编码器使用的全部码本, 序号即 setup 头中的码本编号
#[derive(Debug)]
pub struct CodebookLibrary {
    books: Vec<Codebook>,
}

impl CodebookLibrary {
    fn build() -> QinResult<Self> {
        let floor_weights: Vec<u64> = (0..128u32)
            .map(|v| 1u64 << (12 - (v / 2).min(12)))
            .collect();

        // 分类码字 = 前一分区类别 × C + 后一分区类别
        const CLASS_COST: [u32; RESIDUE_CLASSIFICATIONS] = [1, 3, 6, 10, 14];
        let class_weights: Vec<u64> = (0..RESIDUE_CLASSIFICATIONS * RESIDUE_CLASSIFICATIONS)
            .map(|e| {
                let cost = CLASS_COST[e / RESIDUE_CLASSIFICATIONS] + CLASS_COST[e % RESIDUE_CLASSIFICATIONS];
                1u64 << 16u32.saturating_sub(cost)
            })
            .collect();

        let books = vec![
            Codebook::from_weights(1, &floor_weights, None)?,
            Codebook::from_weights(2, &class_weights, None)?,
            vq_book(4, VqLookup { minimum: -1, delta: 1, values: 3 }, (3, 1))?,
            vq_book(2, VqLookup { minimum: -4, delta: 1, values: 9 }, (2, 1))?,
            vq_book(2, VqLookup { minimum: -15, delta: 1, values: 31 }, (1, 1))?,
            vq_book(2, VqLookup { minimum: -112, delta: 16, values: 15 }, (3, 16))?,
            vq_book(2, VqLookup { minimum: -8, delta: 1, values: 16 }, (1, 1))?,
        ];
        Ok(Self { books })
    }

    /// 码本数量
    pub fn len(&self) -> usize {
        self.books.len()
    }

    /// 是否为空
    pub fn is_empty(&self) -> bool {
        self.books.is_empty()
    }

    /// 按编号获取码本
    pub fn get(&self, id: usize) -> Option<&Codebook> {
        self.books.get(id)
    }

    /// 按编号获取码本, 编号无效时返回内部错误
    pub fn book(&self, id: usize) -> QinResult<&Codebook> {
        self.get(id)
            .ok_or_else(|| QinError::Internal(format!("码本编号无效: {id}")))
    }

    /// 遍历全部码本
    pub fn iter(&self) -> impl Iterator<Item = &Codebook> {
        self.books.iter()
    }

    /// 写入 setup 头的码本段
    pub fn write_setup(&self, bw: &mut BitWriter) {
        bw.write_bits(self.books.len() as u32 - 1, 8);
        for book in &self.books {
            book.write_setup(bw);
        }
    }
}

/// 矢量码本: 权重随矢量绝对值和 (乘以 `cost_scale` 分数) 指数下降
fn vq_book(dimensions: u16, lookup: VqLookup, cost_scale: (u32, u32)) -> QinResult<Codebook> {
    let (num, den) = cost_scale;
    let entries = (lookup.values as usize).pow(u32::from(dimensions));
    let weights: Vec<u64> = (0..entries)
        .map(|entry| {
            let mut rest = entry;
            let mut magnitude = 0u32;
            for _ in 0..dimensions {
                let idx = (rest % lookup.values as usize) as i32;
                rest /= lookup.values as usize;
                magnitude += (lookup.minimum + lookup.delta * idx).unsigned_abs();
            }
            1u64 << 20u32.saturating_sub(magnitude * num / den)
        })
        .collect();
    Codebook::from_weights(dimensions, &weights, Some(lookup))
}

/// 进程内共享的码本集合
///
/// 码本参数是编译期常量, 构造只会因实现缺陷失败; 失败时记录错误并返回空集合,
/// 之后的编码调用会得到 `QinError::Internal`.
pub static CODEBOOKS: LazyLock<CodebookLibrary> = LazyLock::new(|| {
    CodebookLibrary::build().unwrap_or_else(|e| {
        log::error!("码本构造失败: {e}");
        CodebookLibrary { books: Vec::new() }
    })
});
