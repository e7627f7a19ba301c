//! 配置文件与日志系统集成测试.
//!
//! tracing 的全局 subscriber 只能安装一次, 调用 `init` 的测试集中在一个用例里.

use std::fs;
use std::time::Duration;

use qin::logging::{self, LoggingConfig};
use qin::{BlockPolicy, PcmBuffer, QinConfig, encode_pcm};
use tempfile::TempDir;

#[test]
fn test_从文件加载配置() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("qin.json");
    fs::write(
        &path,
        r#"{
            "encoder": { "quality": 0.8, "block_policy": "short", "comments": ["ARTIST=qin"] },
            "logging": { "level": "warn", "retention_days": 3 }
        }"#,
    )
    .unwrap();

    let config = QinConfig::from_file(&path).unwrap();
    assert_eq!(config.encoder.quality, 0.8);
    assert_eq!(config.encoder.block_policy, BlockPolicy::Short);
    assert_eq!(config.encoder.comments, vec!["ARTIST=qin".to_string()]);
    assert_eq!(config.logging.level, "warn");
    assert_eq!(config.logging.retention_days, 3);
    assert_eq!(config.logging.cleanup_interval_seconds, 3600);

    let missing = QinConfig::from_file(dir.path().join("missing.json"));
    let message = format!("{:#}", missing.unwrap_err());
    assert!(message.contains("missing.json"), "{message}");
}

#[test]
fn test_配置中的注释无效() {
    let result = QinConfig::from_json_str(r#"{"encoder": {"comments": ["没有等号"]}}"#);
    assert!(result.is_err());
}

#[tokio::test]
async fn test_日志初始化与桥接() {
    let dir = TempDir::new().unwrap();
    let config = LoggingConfig {
        level: "debug".to_string(),
        directory: dir.path().join("logs").to_string_lossy().to_string(),
        file_prefix: "qin-test".to_string(),
        retention_days: 7,
        compress_history: true,
        cleanup_interval_seconds: 60,
    };

    logging::init(&config).unwrap();
    // 重复初始化为空操作
    logging::init(&config).unwrap();

    let today = chrono::Local::now().date_naive();
    let log_path = dir
        .path()
        .join("logs")
        .join(format!("qin-test.{}.log", today.format("%Y-%m-%d")));
    assert!(log_path.exists(), "当天日志文件应已创建");

    // 库 crate 经 log 门面输出的记录写入日志文件
    let pcm = PcmBuffer::from_interleaved(vec![0.25; 4096], 1).unwrap();
    encode_pcm(&pcm, 44100, qin::EncoderConfig::default()).unwrap();
    tracing::info!("日志桥接测试结束");
    tokio::time::sleep(Duration::from_millis(200)).await;

    let text = fs::read_to_string(&log_path).unwrap();
    assert!(text.contains("日志桥接测试结束"), "日志内容: {text}");
    if std::env::var_os("RUST_LOG").is_none() {
        assert!(text.contains("组包完成"), "缺少库 crate 日志: {text}");
    }
}
