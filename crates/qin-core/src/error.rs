//! 统一错误类型定义.
//!
//! 所有 Qin crate 共用的错误类型, 支持跨模块传播.
//!
//! 量化溢出 (系数超出码本可表示范围) 不在此列: 编码器就地钳位并计数,
//! 通过 `QuantizationStats` 和 `warn!` 日志暴露, 不会中断编码.

use thiserror::Error;

/// Qin 编码器统一错误类型
#[derive(Debug, Error)]
pub enum QinError {
    /// 无效配置 (声道数/采样率/块大小/质量等)
    #[error("无效配置: {0}")]
    InvalidConfiguration(String),

    /// 输入数据形状或内容不合法
    #[error("输入数据不合法: {0}")]
    MalformedInput(String),

    /// 在不允许的阶段调用了状态机操作
    #[error("状态误用: {0}")]
    StateMisuse(String),

    /// I/O 错误
    #[error("I/O 错误: {0}")]
    Io(#[from] std::io::Error),

    /// 内部错误 (不应发生)
    #[error("内部错误: {0}")]
    Internal(String),
}

/// Qin 统一 Result 类型
pub type QinResult<T> = Result<T, QinError>;
