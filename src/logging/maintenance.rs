//! 历史日志维护: 压缩与过期清理.

use super::{LoggingConfig, log_path_for};
use anyhow::{Context, Result};
use chrono::{Duration as ChronoDuration, Local, NaiveDate};
use flate2::Compression;
use flate2::write::GzEncoder;
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// 一次维护的结果
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MaintenanceReport {
    /// 新压缩的文件数
    pub compressed: usize,
    /// 删除的过期文件数
    pub removed: usize,
}

/// 执行一次日志维护
///
/// - 日期早于 `今天 - retention_days` 的日志 (含 .gz) 被删除
/// - `compress_history` 开启时, 今天以前的 .log 压缩为 .log.gz
pub fn run_maintenance(config: &LoggingConfig) -> Result<MaintenanceReport> {
    run_maintenance_at(config, Local::now().date_naive())
}

fn run_maintenance_at(config: &LoggingConfig, today: NaiveDate) -> Result<MaintenanceReport> {
    let mut report = MaintenanceReport::default();
    let directory = Path::new(&config.directory);
    if !directory.exists() {
        return Ok(report);
    }

    let cutoff = today - ChronoDuration::days(config.retention_days.max(0));
    let entries = fs::read_dir(directory)
        .with_context(|| format!("读取日志目录失败, path={}", directory.display()))?;
    for entry in entries {
        let path = entry?.path();
        let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        let Some((date, compressed)) = parse_log_file_name(file_name, &config.file_prefix) else {
            continue;
        };

        if date < cutoff {
            fs::remove_file(&path)
                .with_context(|| format!("删除过期日志失败, path={}", path.display()))?;
            report.removed += 1;
        } else if config.compress_history && !compressed && date < today {
            compress_to_gz(&path)?;
            report.compressed += 1;
        }
    }
    Ok(report)
}

/// 有 tokio 运行时时启动周期维护任务
pub(super) fn spawn_periodic(config: LoggingConfig) {
    let Ok(handle) = tokio::runtime::Handle::try_current() else {
        tracing::debug!("当前无 tokio 运行时, 不启动周期日志维护");
        return;
    };
    let period = Duration::from_secs(config.cleanup_interval_seconds.max(1));
    handle.spawn(async move {
        let mut interval = tokio::time::interval(period);
        // 首次 tick 立即返回, 初始化时已维护过一次
        interval.tick().await;
        loop {
            interval.tick().await;
            if let Err(err) = run_maintenance(&config) {
                tracing::error!("周期日志维护失败: {err:#}");
            }
        }
    });
}

fn compress_to_gz(path: &Path) -> Result<()> {
    let gz_path = PathBuf::from(format!("{}.gz", path.display()));
    if !gz_path.exists() {
        let mut input =
            File::open(path).with_context(|| format!("打开待压缩日志失败, path={}", path.display()))?;
        let output = File::create(&gz_path)
            .with_context(|| format!("创建压缩日志失败, path={}", gz_path.display()))?;
        let mut encoder = GzEncoder::new(output, Compression::default());
        io::copy(&mut input, &mut encoder)?;
        encoder.finish()?;
    }
    fs::remove_file(path).with_context(|| format!("删除已压缩日志失败, path={}", path.display()))?;
    Ok(())
}

/// 解析 `<prefix>.<YYYY-MM-DD>.log[.gz]`, 返回 (日期, 是否已压缩)
fn parse_log_file_name(file_name: &str, prefix: &str) -> Option<(NaiveDate, bool)> {
    let rest = file_name.strip_prefix(prefix)?.strip_prefix('.')?;
    let (date_part, compressed) = match rest.strip_suffix(".log.gz") {
        Some(date_part) => (date_part, true),
        None => (rest.strip_suffix(".log")?, false),
    };
    if date_part.len() != 10 {
        return None;
    }
    let date = NaiveDate::parse_from_str(date_part, "%Y-%m-%d").ok()?;
    Some((date, compressed))
}
