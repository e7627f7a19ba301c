//! 配置文件.
//!
//! JSON 格式, 缺省字段取默认值:
//!
//! ```json
//! {
//!   "encoder": { "quality": 0.6, "block_policy": "short" },
//!   "logging": { "level": "debug", "directory": "logs" }
//! }
//! ```

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

use qin_codec::vorbis::EncoderConfig;

use crate::logging::LoggingConfig;

/// 顶层配置
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QinConfig {
    /// 编码器配置
    pub encoder: EncoderConfig,
    /// 日志配置
    pub logging: LoggingConfig,
}

impl QinConfig {
    /// 从 JSON 字符串解析并校验
    pub fn from_json_str(text: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(text).context("解析 JSON 配置失败")?;
        config.encoder.validate().context("编码器配置无效")?;
        Ok(config)
    }

    /// 从 JSON 文件加载
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("读取配置文件失败, path={}", path.display()))?;
        Self::from_json_str(&text).with_context(|| format!("加载配置失败, path={}", path.display()))
    }

    /// 序列化为格式化的 JSON
    pub fn to_json_string(&self) -> Result<String> {
        serde_json::to_string_pretty(self).context("序列化配置失败")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use qin_codec::vorbis::BlockPolicy;

    #[test]
    fn test_部分字段() {
        let config = QinConfig::from_json_str(
            r#"{"encoder": {"quality": 0.6, "block_policy": "short"}, "logging": {"level": "debug"}}"#,
        )
        .unwrap();
        assert_eq!(config.encoder.quality, 0.6);
        assert_eq!(config.encoder.block_policy, BlockPolicy::Short);
        assert_eq!(config.encoder.long_block, 2048);
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.logging.file_prefix, "qin");
    }

    #[test]
    fn test_空对象取默认值() {
        assert_eq!(QinConfig::from_json_str("{}").unwrap(), QinConfig::default());
    }

    #[test]
    fn test_无效配置被拒绝() {
        assert!(QinConfig::from_json_str(r#"{"encoder": {"quality": 3.0}}"#).is_err());
        assert!(QinConfig::from_json_str(r#"{"encoder": {"long_block": 1000}}"#).is_err());
        assert!(QinConfig::from_json_str("not json").is_err());
    }

    #[test]
    fn test_序列化往返() {
        let config = QinConfig::default();
        let text = config.to_json_string().unwrap();
        assert_eq!(QinConfig::from_json_str(&text).unwrap(), config);
    }
}
