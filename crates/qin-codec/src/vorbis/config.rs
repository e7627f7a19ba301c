//! 编码器配置.
//!
//! `EncoderConfig` 可由 serde 反序列化 (缺省字段取默认值), 也可用 `with_*` 方法链式构建.

use serde::{Deserialize, Serialize};

use qin_core::{QinError, QinResult};

/// Vorbis 允许的最小块大小
pub const MIN_BLOCK_SIZE: usize = 64;
/// Vorbis 允许的最大块大小
pub const MAX_BLOCK_SIZE: usize = 8192;
/// quality 下限 (与 libvorbis VBR 模式一致)
pub const MIN_QUALITY: f32 = -0.1;
/// quality 上限
pub const MAX_QUALITY: f32 = 1.0;

/// 块长策略
///
/// 固定块长: 所有块使用同一尺寸, 不做瞬态检测.
/// 短块与长块两种尺寸都会写入标识头和 setup 头.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockPolicy {
    /// 全部使用长块 (默认)
    #[default]
    Long,
    /// 全部使用短块
    Short,
}

/// 编码器配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EncoderConfig {
    /// VBR 质量, 范围 [-0.1, 1.0]
    pub quality: f32,
    /// 块长策略
    pub block_policy: BlockPolicy,
    /// 短块大小 (2 的幂)
    pub short_block: usize,
    /// 长块大小 (2 的幂)
    pub long_block: usize,
    /// Ogg 逻辑流序列号, `None` 时在创建状态时自动选取
    pub serial_number: Option<u32>,
    /// 注释头中的厂商字符串
    pub vendor: String,
    /// 用户注释 (`KEY=value`)
    pub comments: Vec<String>,
    /// Ogg 页面负载上限 (字节)
    pub max_page_body: usize,
    /// 是否使用 rayon 并行处理各块
    pub parallel: bool,
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            quality: 0.4,
            block_policy: BlockPolicy::Long,
            short_block: 256,
            long_block: 2048,
            serial_number: None,
            vendor: format!("qin-vorbis {}", env!("CARGO_PKG_VERSION")),
            comments: vec!["ENCODER=qin".to_string()],
            max_page_body: 4096,
            parallel: true,
        }
    }
}

impl EncoderConfig {
    /// 设置质量
    pub fn with_quality(mut self, quality: f32) -> Self {
        self.quality = quality;
        self
    }

    /// 设置块长策略
    pub fn with_block_policy(mut self, policy: BlockPolicy) -> Self {
        self.block_policy = policy;
        self
    }

    /// 设置短块/长块大小
    pub fn with_block_sizes(mut self, short_block: usize, long_block: usize) -> Self {
        self.short_block = short_block;
        self.long_block = long_block;
        self
    }

    /// 指定 Ogg 序列号
    pub fn with_serial_number(mut self, serial: u32) -> Self {
        self.serial_number = Some(serial);
        self
    }

    /// 设置厂商字符串
    pub fn with_vendor(mut self, vendor: impl Into<String>) -> Self {
        self.vendor = vendor.into();
        self
    }

    /// 追加一条用户注释
    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comments.push(comment.into());
        self
    }

    /// 设置页面负载上限
    pub fn with_max_page_body(mut self, bytes: usize) -> Self {
        self.max_page_body = bytes;
        self
    }

    /// 开关并行处理
    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    /// 校验配置
    pub fn validate(&self) -> QinResult<()> {
        if !self.quality.is_finite() || !(MIN_QUALITY..=MAX_QUALITY).contains(&self.quality) {
            return Err(QinError::InvalidConfiguration(format!(
                "quality 超出范围 [{MIN_QUALITY}, {MAX_QUALITY}]: {}",
                self.quality
            )));
        }
        for (name, size) in [("short_block", self.short_block), ("long_block", self.long_block)] {
            if !size.is_power_of_two() || !(MIN_BLOCK_SIZE..=MAX_BLOCK_SIZE).contains(&size) {
                return Err(QinError::InvalidConfiguration(format!(
                    "{name} 必须是 {MIN_BLOCK_SIZE}..={MAX_BLOCK_SIZE} 之间的 2 的幂: {size}"
                )));
            }
        }
        if self.short_block > self.long_block {
            return Err(QinError::InvalidConfiguration(format!(
                "短块 {} 大于长块 {}",
                self.short_block, self.long_block
            )));
        }
        if u32::try_from(self.vendor.len()).is_err() {
            return Err(QinError::InvalidConfiguration("vendor 字符串过长".into()));
        }
        if let Some(bad) = self.comments.iter().find(|c| !is_valid_comment(c)) {
            return Err(QinError::InvalidConfiguration(format!(
                "用户注释必须为 KEY=value 形式: {bad:?}"
            )));
        }
        if self.max_page_body == 0 || self.max_page_body > 255 * 255 {
            return Err(QinError::InvalidConfiguration(format!(
                "max_page_body 超出范围 1..=65025: {}",
                self.max_page_body
            )));
        }
        Ok(())
    }

    /// 当前策略下的块大小
    pub fn block_size(&self) -> usize {
        match self.block_policy {
            BlockPolicy::Long => self.long_block,
            BlockPolicy::Short => self.short_block,
        }
    }

    /// 相邻块的步进 (块大小的一半)
    pub fn hop(&self) -> usize {
        self.block_size() / 2
    }

    /// 当前策略是否使用长块
    pub fn uses_long_blocks(&self) -> bool {
        self.block_policy == BlockPolicy::Long
    }

    /// 由 quality 派生的量化档位
    pub fn quality_tier(&self) -> QualityTier {
        QualityTier::from_quality(self.quality)
    }
}

/// Vorbis 注释字段名: 0x20..=0x7D 的 ASCII, 不含 '='
fn is_valid_comment(comment: &str) -> bool {
    match comment.split_once('=') {
        Some((key, _)) => !key.is_empty() && key.bytes().all(|b| (0x20..=0x7D).contains(&b)),
        None => false,
    }
}

/// 各档位 (quality -0.1 ~ 1.0) 的立体声 44.1kHz 名义码率 (kbps)
const NOMINAL_KBPS: [f32; 12] = [
    45.0, 64.0, 80.0, 96.0, 112.0, 128.0, 160.0, 192.0, 224.0, 256.0, 320.0, 500.0,
];

/// 量化档位
///
/// quality 越高, 残差的量化级数越多、噪声底越低, 码率越高.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QualityTier {
    /// 档位编号 (-1..=10)
    pub index: i32,
    /// 频带峰值对应的残差量化级数
    pub peak_levels: f32,
    /// 绝对噪声底 (线性幅度), 低于此值的频谱量化为零
    pub noise_floor: f32,
    quality: f32,
}

impl QualityTier {
    /// 由 quality 计算档位参数
    pub fn from_quality(quality: f32) -> Self {
        let quality = quality.clamp(MIN_QUALITY, MAX_QUALITY);
        Self {
            index: (quality * 10.0).round() as i32,
            peak_levels: 3.0 * (quality * 5.0).exp2(),
            noise_floor: 10f32.powf(-(70.0 + 30.0 * quality) / 20.0),
            quality,
        }
    }

    /// 量化步长与频带峰值之比
    pub fn step_ratio(&self) -> f32 {
        1.0 / self.peak_levels
    }

    /// 标识头中的名义码率估计 (bit/s)
    pub fn nominal_bitrate(&self, channels: usize, sample_rate: u32) -> i32 {
        let pos = ((self.quality - MIN_QUALITY) * 10.0).clamp(0.0, 11.0);
        let lo = pos.floor() as usize;
        let hi = (lo + 1).min(NOMINAL_KBPS.len() - 1);
        let frac = pos - lo as f32;
        let kbps = NOMINAL_KBPS[lo] + (NOMINAL_KBPS[hi] - NOMINAL_KBPS[lo]) * frac;
        let scaled = f64::from(kbps) * 1000.0 * channels as f64 / 2.0 * f64::from(sample_rate)
            / 44_100.0;
        scaled.round().min(f64::from(i32::MAX)) as i32
    }
}
