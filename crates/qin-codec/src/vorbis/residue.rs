//! 残差编码.
//!
//! 残差向量按 16 个系数一个分区, 每个分区按最大绝对值归入 5 个类别之一:
//!
//! | 类别 | 最大绝对值 | 第 0 遍码本 | 第 1 遍码本 |
//! |------|-----------|------------|------------|
//! | 0    | 0         | -          | -          |
//! | 1    | 1         | 4 维 {-1,0,1} | -       |
//! | 2    | 4         | 2 维 -4..=4 | -          |
//! | 3    | 15        | 2 维 -15..=15 | -        |
//! | 4    | 119       | 2 维 16 的倍数 | 2 维 -8..=7 |
//!
//! 类别 4 先编码粗粒度 (16 的倍数) 部分, 再编码余量.
//! 立体声使用 type 2 (两声道交织为一个向量), 其他声道数使用 type 1.

use qin_core::bitwriter::BitWriter;
use qin_core::{QinError, QinResult};

use super::codebook::{
    CODEBOOKS, RESIDUE_CLASS_BOOK, RESIDUE_COARSE_BOOK, RESIDUE_FINE_BOOK, RESIDUE_MEDIUM_BOOK,
    RESIDUE_SMALL_BOOK, RESIDUE_UNIT_BOOK,
};

/// 分区大小
pub const RESIDUE_PARTITION_SIZE: usize = 16;
/// 分类数
pub const RESIDUE_CLASSIFICATIONS: usize = 5;
/// 残差整数的最大绝对值
pub const RESIDUE_MAX_MAGNITUDE: i32 = 119;
/// 编码遍数 (级联深度)
const RESIDUE_PASSES: usize = 2;

const CLASS_LIMITS: [i32; RESIDUE_CLASSIFICATIONS] = [0, 1, 4, 15, RESIDUE_MAX_MAGNITUDE];
const CLASS_BOOKS: [&[usize]; RESIDUE_CLASSIFICATIONS] = [
    &[],
    &[RESIDUE_UNIT_BOOK],
    &[RESIDUE_SMALL_BOOK],
    &[RESIDUE_MEDIUM_BOOK],
    &[RESIDUE_COARSE_BOOK, RESIDUE_FINE_BOOK],
];
/// 使用两级级联的类别
const CASCADE_CLASS: usize = 4;
/// 级联第一级的粒度
const COARSE_STEP: i32 = 16;

/// residue 类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResidueKind {
    /// type 1: 各声道独立编码
    Separate,
    /// type 2: 所有声道交织为一个向量
    Interleaved,
}

impl ResidueKind {
    /// setup 头中的类型号
    pub fn type_id(self) -> u32 {
        match self {
            Self::Separate => 1,
            Self::Interleaved => 2,
        }
    }
}

/// 单个块长对应的 residue 配置
#[derive(Debug, Clone)]
pub struct Residue {
    kind: ResidueKind,
    end: usize,
}

impl Residue {
    /// 为 `n2` 个系数、`channels` 个声道构造
    pub fn new(n2: usize, channels: usize) -> Self {
        let kind = if channels == 2 {
            ResidueKind::Interleaved
        } else {
            ResidueKind::Separate
        };
        let end = match kind {
            ResidueKind::Interleaved => n2 * channels,
            ResidueKind::Separate => n2,
        };
        Self { kind, end }
    }

    /// residue 类型
    pub fn kind(&self) -> ResidueKind {
        self.kind
    }

    /// 编码区间终点 (起点恒为 0)
    pub fn end(&self) -> usize {
        self.end
    }

    /// 写入 setup 头中的 residue 描述 (含类型号)
    pub fn write_setup(&self, bw: &mut BitWriter) {
        bw.write_bits(self.kind.type_id(), 16);
        bw.write_bits(0, 24);
        bw.write_bits(self.end as u32, 24);
        bw.write_bits(RESIDUE_PARTITION_SIZE as u32 - 1, 24);
        bw.write_bits(RESIDUE_CLASSIFICATIONS as u32 - 1, 6);
        bw.write_bits(RESIDUE_CLASS_BOOK as u32, 8);
        for books in CLASS_BOOKS {
            let cascade = (1u32 << books.len()) - 1;
            bw.write_bits(cascade & 0x7, 3);
            bw.write_bit(false);
        }
        for books in CLASS_BOOKS {
            for &book in books {
                bw.write_bits(book as u32, 8);
            }
        }
    }

    /// 编码一组向量
    ///
    /// type 2 时传入一个交织后的向量, type 1 时传入每个需要编码的声道.
    /// 每个向量长度必须为 [`Residue::end`], 取值在 ±[`RESIDUE_MAX_MAGNITUDE`] 内.
    pub fn encode(&self, bw: &mut BitWriter, vectors: &[&[i32]]) -> QinResult<()> {
        if vectors.iter().any(|v| v.len() < self.end) {
            return Err(QinError::Internal("residue 向量长度不足".into()));
        }
        let classbook = CODEBOOKS.book(RESIDUE_CLASS_BOOK)?;
        let class_dim = classbook.dimensions();
        let partitions = self.end / RESIDUE_PARTITION_SIZE;

        let classes: Vec<Vec<usize>> = vectors
            .iter()
            .map(|v| {
                v[..partitions * RESIDUE_PARTITION_SIZE]
                    .chunks_exact(RESIDUE_PARTITION_SIZE)
                    .map(classify)
                    .collect()
            })
            .collect();

        for pass in 0..RESIDUE_PASSES {
            let mut part = 0usize;
            while part < partitions {
                if pass == 0 {
                    for vector_classes in &classes {
                        let word = (0..class_dim).fold(0usize, |word, i| {
                            word * RESIDUE_CLASSIFICATIONS
                                + vector_classes.get(part + i).copied().unwrap_or(0)
                        });
                        classbook.write_entry(bw, word)?;
                    }
                }
                for _ in 0..class_dim {
                    if part >= partitions {
                        break;
                    }
                    for (vector, vector_classes) in vectors.iter().zip(&classes) {
                        let class = vector_classes[part];
                        if let Some(&book_id) = CLASS_BOOKS[class].get(pass) {
                            let start = part * RESIDUE_PARTITION_SIZE;
                            let partition = &vector[start..start + RESIDUE_PARTITION_SIZE];
                            write_partition(bw, book_id, class, pass, partition)?;
                        }
                    }
                    part += 1;
                }
            }
        }
        Ok(())
    }
}

/// 按最大绝对值对分区分类
pub fn classify(partition: &[i32]) -> usize {
    let peak = partition.iter().map(|v| v.abs()).max().unwrap_or(0);
    CLASS_LIMITS
        .iter()
        .position(|&limit| peak <= limit)
        .unwrap_or(RESIDUE_CLASSIFICATIONS - 1)
}

/// 级联第一级的系数 (16 的倍数)
fn coarse_part(value: i32) -> i32 {
    (value + COARSE_STEP / 2).div_euclid(COARSE_STEP).clamp(-7, 7) * COARSE_STEP
}

fn write_partition(
    bw: &mut BitWriter,
    book_id: usize,
    class: usize,
    pass: usize,
    partition: &[i32],
) -> QinResult<()> {
    let book = CODEBOOKS.book(book_id)?;
    let mut scratch = vec![0i32; book.dimensions()];
    for chunk in partition.chunks_exact(book.dimensions()) {
        for (dst, &v) in scratch.iter_mut().zip(chunk) {
            *dst = match (class, pass) {
                (CASCADE_CLASS, 0) => coarse_part(v),
                (CASCADE_CLASS, _) => v - coarse_part(v),
                _ => v,
            };
        }
        book.write_vector(bw, &scratch)?;
    }
    Ok(())
}

/// 把多个声道交织为一个向量 (type 2)
pub fn interleave(channels: &[&[i32]]) -> Vec<i32> {
    let n = channels.iter().map(|c| c.len()).min().unwrap_or(0);
    let mut out = Vec::with_capacity(n * channels.len());
    for i in 0..n {
        out.extend(channels.iter().map(|c| c[i]));
    }
    out
}
