//! floor1 包络.
//!
//! 每个块每声道一条分段线性 (dB 域) 频谱包络, 残差为系数除以包络后的整数.
//! 编码端按解码器的重建过程逐点模拟包络, 保证两端使用完全相同的除数.
//!
//! 配置:
//! - multiplier 2, 取值范围 0..128, 首尾两点 7 位直接写出
//! - 内部点每 3 个一个分区, 共用一个类别 (单一子码本 [`FLOOR1_Y_BOOK`])
//! - 短块 9 个内部点, 长块 30 个

use qin_core::bitreader::ilog;
use qin_core::bitwriter::BitWriter;
use qin_core::QinResult;

use super::codebook::{CODEBOOKS, FLOOR1_Y_BOOK};
use super::config::QualityTier;

/// floor1 multiplier
pub const FLOOR1_MULTIPLIER: i32 = 2;
/// multiplier 2 对应的取值范围
pub const FLOOR1_RANGE: i32 = 128;
/// 每个分区的点数
pub const FLOOR1_PARTITION_DIM: usize = 3;
/// 短块内部点数
pub const SHORT_FLOOR_POSTS: usize = 9;
/// 长块内部点数
pub const LONG_FLOOR_POSTS: usize = 30;

/// dB 步进比, 与逆查表的相邻比值一致
const DB_STEP: f64 = 1.064_986_3;

/// 单个块长对应的 floor1 配置
#[derive(Debug, Clone)]
pub struct Floor1 {
    n2: usize,
    /// 点的 x 坐标, 前两个固定为 0 与 n2, 其余按二分顺序排列
    xs: Vec<usize>,
    /// 按 x 升序排列的点序号
    sorted: Vec<usize>,
    /// 每个内部点的 (低邻点, 高邻点)
    neighbors: Vec<(usize, usize)>,
    /// 每个点估计幅度时覆盖的系数区间
    spans: Vec<(usize, usize)>,
}

impl Floor1 {
    /// 为 `n2` 个系数构造 floor, `interior` 为内部点数 (3 的倍数)
    pub fn new(n2: usize, interior: usize) -> Self {
        let interior = interior.min(n2.saturating_sub(1)) / FLOOR1_PARTITION_DIM * FLOOR1_PARTITION_DIM;
        let xs = post_positions(n2, interior);

        let mut sorted: Vec<usize> = (0..xs.len()).collect();
        sorted.sort_by_key(|&i| xs[i]);

        let neighbors = (0..xs.len())
            .map(|i| if i < 2 { (0, 0) } else { find_neighbors(&xs, i) })
            .collect();

        let mut spans = vec![(0, 0); xs.len()];
        for (rank, &i) in sorted.iter().enumerate() {
            let lo = if rank > 0 { xs[sorted[rank - 1]] } else { 0 };
            let hi = sorted.get(rank + 1).map_or(n2, |&j| xs[j]);
            spans[i] = (lo.min(n2), hi.min(n2));
        }

        Self {
            n2,
            xs,
            sorted,
            neighbors,
            spans,
        }
    }

    /// 按块大小选择点数构造
    pub fn for_block(block_size: usize, long: bool) -> Self {
        let interior = if long { LONG_FLOOR_POSTS } else { SHORT_FLOOR_POSTS };
        Self::new(block_size / 2, interior)
    }

    /// 系数个数
    pub fn n2(&self) -> usize {
        self.n2
    }

    /// 所有点的 x 坐标 (setup 头中的顺序)
    pub fn posts(&self) -> &[usize] {
        &self.xs
    }

    fn range_bits(&self) -> u32 {
        ilog(self.n2 as u32 - 1)
    }

    fn partitions(&self) -> usize {
        (self.xs.len() - 2) / FLOOR1_PARTITION_DIM
    }

    /// 估计每个点的目标值 (0..128)
    ///
    /// 取点两侧相邻点之间的系数峰值, 乘以量化步长比例后与噪声底取大, 换算到 dB 刻度并向上取整,
    /// 使包络不低于该区域的量化步长.
    pub fn fit(&self, coeffs: &[f32], tier: &QualityTier) -> Vec<i32> {
        let step_ratio = f64::from(tier.step_ratio());
        let noise_floor = f64::from(tier.noise_floor);
        let ln_step = DB_STEP.ln();
        self.spans
            .iter()
            .map(|&(lo, hi)| {
                let amp = coeffs
                    .get(lo..hi)
                    .unwrap_or(&[])
                    .iter()
                    .fold(0.0f64, |m, &c| m.max(f64::from(c).abs()));
                let step = (amp * step_ratio).max(noise_floor);
                let level = 255.0 + step.ln() / ln_step;
                ((level / f64::from(FLOOR1_MULTIPLIER)).ceil() as i32).clamp(0, FLOOR1_RANGE - 1)
            })
            .collect()
    }

    /// 把目标值转换为码流中的取值 (相对预测值的差分编码)
    pub fn encode_values(&self, targets: &[i32]) -> Vec<u32> {
        let mut values = Vec::with_capacity(self.xs.len());
        values.extend(targets.iter().take(2).map(|&t| t as u32));
        for i in 2..self.xs.len() {
            let (lo, hi) = self.neighbors[i];
            let predicted = render_point(self.xs[lo], targets[lo], self.xs[hi], targets[hi], self.xs[i]);
            let high_room = FLOOR1_RANGE - predicted;
            let low_room = predicted;
            let room = high_room.min(low_room);
            let diff = targets[i] - predicted;
            let value = if diff == 0 {
                0
            } else if diff > 0 && diff < room {
                2 * diff
            } else if diff < 0 && -diff <= room {
                -2 * diff - 1
            } else if high_room > low_room {
                diff + low_room
            } else {
                -diff + high_room - 1
            };
            values.push(value as u32);
        }
        values
    }

    /// 按解码器规则由码流取值重建包络 (线性幅度)
    pub fn curve(&self, values: &[u32]) -> Vec<f32> {
        let count = self.xs.len();
        let mut final_y = vec![0i32; count];
        let mut step2 = vec![false; count];
        for i in 0..2.min(count) {
            final_y[i] = values.get(i).map_or(0, |&v| v as i32);
            step2[i] = true;
        }

        for i in 2..count {
            let (lo, hi) = self.neighbors[i];
            let predicted = render_point(self.xs[lo], final_y[lo], self.xs[hi], final_y[hi], self.xs[i]);
            let value = values.get(i).map_or(0, |&v| v as i32);
            if value == 0 {
                final_y[i] = predicted;
                continue;
            }
            step2[lo] = true;
            step2[hi] = true;
            step2[i] = true;
            let high_room = FLOOR1_RANGE - predicted;
            let low_room = predicted;
            let room = 2 * high_room.min(low_room);
            final_y[i] = if value >= room {
                if high_room > low_room {
                    value - low_room + predicted
                } else {
                    predicted - value + high_room - 1
                }
            } else if value & 1 == 1 {
                predicted - (value + 1) / 2
            } else {
                predicted + value / 2
            };
        }

        let mut levels = vec![0i32; self.n2];
        let mut lx = 0usize;
        let mut ly = final_y[self.sorted[0]] * FLOOR1_MULTIPLIER;
        let mut hx = 0usize;
        let mut hy = ly;
        for &i in self.sorted.iter().skip(1) {
            if !step2[i] {
                continue;
            }
            hx = self.xs[i];
            hy = final_y[i] * FLOOR1_MULTIPLIER;
            render_line(lx, ly, hx, hy, &mut levels);
            lx = hx;
            ly = hy;
        }
        if hx < self.n2 {
            render_line(hx, hy, self.n2, hy, &mut levels);
        }

        levels
            .into_iter()
            .map(|l| FLOOR1_INVERSE_DB_TABLE[l.clamp(0, 255) as usize])
            .collect()
    }

    /// 写入一个声道的 floor 数据 (以非零标志开头)
    pub fn write_packet(&self, bw: &mut BitWriter, values: &[u32]) -> QinResult<()> {
        let bits = ilog(FLOOR1_RANGE as u32 - 1);
        bw.write_bit(true);
        bw.write_bits(values[0], bits);
        bw.write_bits(values[1], bits);
        let book = CODEBOOKS.book(FLOOR1_Y_BOOK)?;
        for &value in &values[2..] {
            book.write_entry(bw, value as usize)?;
        }
        Ok(())
    }

    /// 写入 setup 头中的 floor 描述 (含类型号)
    pub fn write_setup(&self, bw: &mut BitWriter) {
        bw.write_bits(1, 16);
        let partitions = self.partitions();
        bw.write_bits(partitions as u32, 5);
        for _ in 0..partitions {
            bw.write_bits(0, 4);
        }
        // 类别 0: 3 维, 无子类, 单一子码本
        bw.write_bits(FLOOR1_PARTITION_DIM as u32 - 1, 3);
        bw.write_bits(0, 2);
        bw.write_bits(FLOOR1_Y_BOOK as u32 + 1, 8);

        bw.write_bits(FLOOR1_MULTIPLIER as u32 - 1, 2);
        let range_bits = self.range_bits();
        bw.write_bits(range_bits, 4);
        for &x in &self.xs[2..] {
            bw.write_bits(x as u32, range_bits);
        }
    }
}

/// 内部点位置: 按平方分布 (低频密集), 保证严格递增且不越界, 再按二分顺序排列
fn post_positions(n2: usize, interior: usize) -> Vec<usize> {
    let mut ascending = Vec::with_capacity(interior);
    let denom = (interior + 1) * (interior + 1);
    let mut prev = 0usize;
    for i in 1..=interior {
        let x = (n2 * i * i / denom).max(prev + 1).min(n2 - (interior - i) - 1);
        ascending.push(x);
        prev = x;
    }

    let mut xs = Vec::with_capacity(interior + 2);
    xs.push(0);
    xs.push(n2);
    bisect_order(&ascending, &mut xs);
    xs
}

fn bisect_order(ascending: &[usize], out: &mut Vec<usize>) {
    if ascending.is_empty() {
        return;
    }
    let mid = (ascending.len() - 1) / 2;
    out.push(ascending[mid]);
    bisect_order(&ascending[..mid], out);
    bisect_order(&ascending[mid + 1..], out);
}

fn find_neighbors(xs: &[usize], i: usize) -> (usize, usize) {
    let xi = xs[i];
    let mut low: Option<usize> = None;
    let mut high: Option<usize> = None;
    for (j, &xj) in xs.iter().enumerate().take(i) {
        if xj < xi && low.is_none_or(|l| xj > xs[l]) {
            low = Some(j);
        }
        if xj > xi && high.is_none_or(|h| xj < xs[h]) {
            high = Some(j);
        }
    }
    (low.unwrap_or(0), high.unwrap_or(1))
}

fn render_point(x0: usize, y0: i32, x1: usize, y1: i32, x: usize) -> i32 {
    let dy = y1 - y0;
    let adx = (x1 - x0) as i32;
    let offset = dy.abs() * (x - x0) as i32 / adx;
    if dy < 0 { y0 - offset } else { y0 + offset }
}

fn render_line(x0: usize, y0: i32, x1: usize, y1: i32, out: &mut [i32]) {
    if x1 <= x0 {
        return;
    }
    let dy = y1 - y0;
    let adx = (x1 - x0) as i32;
    let base = dy / adx;
    let sy = if dy < 0 { base - 1 } else { base + 1 };
    let ady = dy.abs() - base.abs() * adx;
    let mut y = y0;
    let mut err = 0;
    if let Some(slot) = out.get_mut(x0) {
        *slot = y;
    }
    for x in x0 + 1..x1 {
        err += ady;
        if err >= adx {
            err -= adx;
            y += sy;
        } else {
            y += base;
        }
        if let Some(slot) = out.get_mut(x) {
            *slot = y;
        }
    }
}

#[allow(clippy::excessive_precision)]
static FLOOR1_INVERSE_DB_TABLE: [f32; 256] = [
    1.0649863e-07, 1.1341951e-07, 1.2079015e-07, 1.2863978e-07, 1.3699951e-07, 1.4590251e-07,
    1.5538408e-07, 1.6548181e-07, 1.7623575e-07, 1.8768855e-07, 1.9988561e-07, 2.1287530e-07,
    2.2670913e-07, 2.4144197e-07, 2.5713223e-07, 2.7384213e-07, 2.9163793e-07, 3.1059021e-07,
    3.3077411e-07, 3.5226968e-07, 3.7516214e-07, 3.9954229e-07, 4.2550680e-07, 4.5315863e-07,
    4.8260743e-07, 5.1396998e-07, 5.4737065e-07, 5.8294187e-07, 6.2082472e-07, 6.6116941e-07,
    7.0413592e-07, 7.4989464e-07, 7.9862701e-07, 8.5052630e-07, 9.0579828e-07, 9.6466216e-07,
    1.0273513e-06, 1.0941144e-06, 1.1652161e-06, 1.2409384e-06, 1.3215816e-06, 1.4074654e-06,
    1.4989305e-06, 1.5963394e-06, 1.7000785e-06, 1.8105592e-06, 1.9282195e-06, 2.0535261e-06,
    2.1869758e-06, 2.3290978e-06, 2.4804557e-06, 2.6416497e-06, 2.8133190e-06, 2.9961443e-06,
    3.1908506e-06, 3.3982101e-06, 3.6190449e-06, 3.8542308e-06, 4.1047004e-06, 4.3714470e-06,
    4.6555282e-06, 4.9580707e-06, 5.2802740e-06, 5.6234160e-06, 5.9888572e-06, 6.3780469e-06,
    6.7925283e-06, 7.2339451e-06, 7.7040476e-06, 8.2047000e-06, 8.7378876e-06, 9.3057248e-06,
    9.9104632e-06, 1.0554501e-05, 1.1240392e-05, 1.1970856e-05, 1.2748789e-05, 1.3577278e-05,
    1.4459606e-05, 1.5399272e-05, 1.6400004e-05, 1.7465768e-05, 1.8600792e-05, 1.9809576e-05,
    2.1096914e-05, 2.2467911e-05, 2.3928002e-05, 2.5482978e-05, 2.7139006e-05, 2.8902651e-05,
    3.0780908e-05, 3.2781225e-05, 3.4911534e-05, 3.7180282e-05, 3.9596466e-05, 4.2169667e-05,
    4.4910090e-05, 4.7828601e-05, 5.0936773e-05, 5.4246931e-05, 5.7772202e-05, 6.1526565e-05,
    6.5524908e-05, 6.9783085e-05, 7.4317983e-05, 7.9147585e-05, 8.4291040e-05, 8.9768747e-05,
    9.5602426e-05, 1.0181521e-04, 1.0843174e-04, 1.1547824e-04, 1.2298267e-04, 1.3097477e-04,
    1.3948625e-04, 1.4855085e-04, 1.5820453e-04, 1.6848555e-04, 1.7943469e-04, 1.9109536e-04,
    2.0351382e-04, 2.1673929e-04, 2.3082423e-04, 2.4582449e-04, 2.6179955e-04, 2.7881275e-04,
    2.9693158e-04, 3.1622787e-04, 3.3677814e-04, 3.5866388e-04, 3.8197188e-04, 4.0679456e-04,
    4.3323036e-04, 4.6138411e-04, 4.9136745e-04, 5.2329927e-04, 5.5730621e-04, 5.9352311e-04,
    6.3209358e-04, 6.7317058e-04, 7.1691700e-04, 7.6350630e-04, 8.1312324e-04, 8.6596457e-04,
    9.2223983e-04, 9.8217216e-04, 1.0459992e-03, 1.1139742e-03, 1.1863665e-03, 1.2634633e-03,
    1.3455702e-03, 1.4330129e-03, 1.5261382e-03, 1.6253153e-03, 1.7309374e-03, 1.8434235e-03,
    1.9632195e-03, 2.0908006e-03, 2.2266726e-03, 2.3713743e-03, 2.5254795e-03, 2.6895994e-03,
    2.8643847e-03, 3.0505286e-03, 3.2487691e-03, 3.4598925e-03, 3.6847358e-03, 3.9241906e-03,
    4.1792066e-03, 4.4507950e-03, 4.7400328e-03, 5.0480668e-03, 5.3761186e-03, 5.7254891e-03,
    6.0975636e-03, 6.4938176e-03, 6.9158225e-03, 7.3652516e-03, 7.8438871e-03, 8.3536271e-03,
    8.8964928e-03, 9.4746370e-03, 1.0090352e-02, 1.0746080e-02, 1.1444421e-02, 1.2188144e-02,
    1.2980198e-02, 1.3823725e-02, 1.4722068e-02, 1.5678791e-02, 1.6697687e-02, 1.7782797e-02,
    1.8938423e-02, 2.0169149e-02, 2.1479854e-02, 2.2875735e-02, 2.4362330e-02, 2.5945531e-02,
    2.7631618e-02, 2.9427276e-02, 3.1339626e-02, 3.3376252e-02, 3.5545228e-02, 3.7855157e-02,
    4.0315199e-02, 4.2935108e-02, 4.5725273e-02, 4.8696758e-02, 5.1861348e-02, 5.5231591e-02,
    5.8820850e-02, 6.2643361e-02, 6.6714279e-02, 7.1049749e-02, 7.5666962e-02, 8.0584227e-02,
    8.5821044e-02, 9.1398179e-02, 9.7337747e-02, 1.0366330e-01, 1.1039993e-01, 1.1757434e-01,
    1.2521498e-01, 1.3335215e-01, 1.4201813e-01, 1.5124727e-01, 1.6107617e-01, 1.7154380e-01,
    1.8269168e-01, 1.9456402e-01, 2.0720788e-01, 2.2067342e-01, 2.3501402e-01, 2.5028656e-01,
    2.6655159e-01, 2.8387361e-01, 3.0232132e-01, 3.2196786e-01, 3.4289114e-01, 3.6517414e-01,
    3.8890521e-01, 4.1417847e-01, 4.4109412e-01, 4.6975890e-01, 5.0028648e-01, 5.3279791e-01,
    5.6742212e-01, 6.0429640e-01, 6.4356699e-01, 6.8538959e-01, 7.2993007e-01, 7.7736504e-01,
    8.2788260e-01, 8.8168307e-01, 9.3897980e-01, 1.0,
];

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vorbis::codebook::Codebook;
    use qin_core::bitreader::BitReader;

    #[test]
    fn test_点位置递增且唯一() {
        for (n, long) in [(256usize, false), (2048, true), (64, true), (64, false)] {
            let floor = Floor1::for_block(n, long);
            let mut xs = floor.posts().to_vec();
            assert_eq!(xs[0], 0);
            assert_eq!(xs[1], n / 2);
            xs.sort_unstable();
            xs.dedup();
            assert_eq!(xs.len(), floor.posts().len(), "n={n}");
            assert_eq!((floor.posts().len() - 2) % 3, 0);
        }
        assert_eq!(Floor1::for_block(2048, true).posts().len(), 32);
        assert_eq!(Floor1::for_block(256, false).posts().len(), 11);
    }

    #[test]
    fn test_二分顺序() {
        let floor = Floor1::new(1024, 3);
        let xs = floor.posts();
        // 第三个点是升序列表的中位
        assert!(xs[3] < xs[2] && xs[2] < xs[4]);
    }

    #[test]
    fn test_逆查表端点() {
        assert_eq!(FLOOR1_INVERSE_DB_TABLE[255], 1.0);
        assert!((FLOOR1_INVERSE_DB_TABLE[0] - 1.064_986_3e-7).abs() < 1e-12);
        for i in 1..256 {
            let ratio = FLOOR1_INVERSE_DB_TABLE[i] / FLOOR1_INVERSE_DB_TABLE[i - 1];
            assert!((ratio - 1.064_986_3).abs() < 1e-3);
        }
    }

    #[test]
    fn test_差分编码后解码器还原目标值() {
        let floor = Floor1::for_block(2048, true);
        let targets: Vec<i32> = (0..floor.posts().len())
            .map(|i| [0, 127, 64, 3, 120, 90, 10][i % 7])
            .collect();
        let values = floor.encode_values(&targets);
        assert!(values.iter().all(|&v| v < 128));

        // 每个点都非零时, 重建的点值应等于目标值
        let curve = floor.curve(&values);
        for (i, &x) in floor.posts().iter().enumerate() {
            if x < floor.n2() && values[i] != 0 {
                let expected = FLOOR1_INVERSE_DB_TABLE[(targets[i] * 2) as usize];
                assert_eq!(curve[x], expected, "post {i} x={x}");
            }
        }
    }

    #[test]
    fn test_平坦包络() {
        let floor = Floor1::for_block(256, false);
        let targets = vec![100; floor.posts().len()];
        let values = floor.encode_values(&targets);
        assert_eq!(&values[..2], &[100, 100]);
        assert!(values[2..].iter().all(|&v| v == 0));
        let curve = floor.curve(&values);
        assert!(curve.iter().all(|&c| c == FLOOR1_INVERSE_DB_TABLE[200]));
    }

    #[test]
    fn test_拟合不低于量化步长() {
        let floor = Floor1::for_block(2048, true);
        let tier = QualityTier::from_quality(0.4);
        let coeffs: Vec<f32> = (0..1024).map(|k| if k == 40 { 0.5 } else { 0.001 }).collect();
        let targets = floor.fit(&coeffs, &tier);
        let values = floor.encode_values(&targets);
        let curve = floor.curve(&values);
        // 点值取整带来的误差不超过一个 dB 刻度
        assert!(curve[40] >= 0.5 * tier.step_ratio() * 0.8);
        let q = (coeffs[40] / curve[40]).round();
        assert!(q > 0.0 && q <= (tier.peak_levels * 1.5).ceil());
    }

    #[test]
    fn test_静音拟合到噪声底() {
        let floor = Floor1::for_block(256, false);
        let tier = QualityTier::from_quality(0.0);
        let targets = floor.fit(&[0.0; 128], &tier);
        let level = 255.0 + f64::from(tier.noise_floor).ln() / DB_STEP.ln();
        let expected = (level / 2.0).ceil() as i32;
        assert!(targets.iter().all(|&t| t == expected));
    }

    #[test]
    fn test_setup_与包数据结构() {
        let floor = Floor1::for_block(256, false);
        let mut bw = BitWriter::new();
        floor.write_setup(&mut bw);
        let data = bw.finish();
        let mut br = BitReader::new(&data);
        assert_eq!(br.read_bits(16).unwrap(), 1);
        assert_eq!(br.read_bits(5).unwrap(), 3);
        for _ in 0..3 {
            assert_eq!(br.read_bits(4).unwrap(), 0);
        }
        assert_eq!(br.read_bits(3).unwrap() + 1, 3);
        assert_eq!(br.read_bits(2).unwrap(), 0);
        assert_eq!(br.read_bits(8).unwrap(), FLOOR1_Y_BOOK as u32 + 1);
        assert_eq!(br.read_bits(2).unwrap() + 1, 2);
        let range_bits = br.read_bits(4).unwrap();
        assert_eq!(1usize << range_bits, 128);
        for &x in &floor.posts()[2..] {
            assert_eq!(br.read_bits(range_bits).unwrap() as usize, x);
        }

        let values = floor.encode_values(&vec![50; floor.posts().len()]);
        let mut bw = BitWriter::new();
        floor.write_packet(&mut bw, &values).unwrap();
        let data = bw.finish();
        let mut br = BitReader::new(&data);
        assert!(br.read_flag().unwrap());
        assert_eq!(br.read_bits(7).unwrap(), 50);
        assert_eq!(br.read_bits(7).unwrap(), 50);
        let book: &Codebook = CODEBOOKS.book(FLOOR1_Y_BOOK).unwrap();
        let (code, len) = book.codeword(0).unwrap();
        let mut read = 0u32;
        for _ in 0..len {
            read = (read << 1) | br.read_bits(1).unwrap();
        }
        assert_eq!(read, code);
    }
}
