//! 日志系统.
//!
//! 控制台 + 按日期分文件 (`<prefix>.<YYYY-MM-DD>.log`) 两路输出.
//! 库 crate 通过 `log` 门面输出的记录会桥接到 tracing.
//! `RUST_LOG` 优先于配置中的级别.

use anyhow::{Context, Result};
use chrono::{Datelike, Local, NaiveDate, Timelike};
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tracing_subscriber::{
    EnvFilter, Registry,
    fmt::{self, FormatEvent, FormatFields, format::Writer},
    layer::{Layer, SubscriberExt},
    registry::LookupSpan,
    util::SubscriberInitExt,
};

mod maintenance;

pub use maintenance::{MaintenanceReport, run_maintenance};

/// 日志配置
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// 日志级别或 EnvFilter 表达式
    pub level: String,
    /// 日志目录
    pub directory: String,
    /// 日志文件名前缀
    pub file_prefix: String,
    /// 保留天数, 更早的日志被删除
    pub retention_days: i64,
    /// 是否 gzip 压缩历史日志
    pub compress_history: bool,
    /// 周期维护间隔 (秒)
    pub cleanup_interval_seconds: u64,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            directory: "logs".to_string(),
            file_prefix: "qin".to_string(),
            retention_days: 30,
            compress_history: true,
            cleanup_interval_seconds: 3600,
        }
    }
}

static LOG_GUARD: OnceLock<tracing_appender::non_blocking::WorkerGuard> = OnceLock::new();

/// 初始化日志系统
///
/// 重复调用为空操作.
pub fn init(config: &LoggingConfig) -> Result<()> {
    if LOG_GUARD.get().is_some() {
        return Ok(());
    }

    let directory = Path::new(&config.directory);
    std::fs::create_dir_all(directory)
        .with_context(|| format!("创建日志目录失败, path={}", directory.display()))?;
    let file_writer = DailyFileWriter::new(directory, &config.file_prefix)?;
    let (non_blocking, guard) = tracing_appender::non_blocking(file_writer);

    let console_layer = fmt::Layer::default()
        .with_writer(std::io::stderr)
        .event_format(LineFormatter { ansi: true })
        .with_filter(level_filter(&config.level)?);

    let file_layer = fmt::Layer::default()
        .with_writer(non_blocking)
        .with_ansi(false)
        .event_format(LineFormatter { ansi: false })
        .with_filter(level_filter(&config.level)?);

    if Registry::default()
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .is_err()
    {
        // 其他组件已安装全局 subscriber, 丢弃本次的写入器
        return Ok(());
    }
    if LOG_GUARD.set(guard).is_err() {
        return Ok(());
    }

    match run_maintenance(config) {
        Ok(report) => tracing::debug!("日志维护: {report:?}"),
        Err(err) => tracing::warn!("日志维护失败: {err:#}"),
    }
    maintenance::spawn_periodic(config.clone());
    tracing::info!(
        "日志系统已初始化: dir={}, prefix={}",
        config.directory,
        config.file_prefix
    );
    Ok(())
}

fn level_filter(level: &str) -> Result<EnvFilter> {
    match EnvFilter::try_from_default_env() {
        Ok(filter) => Ok(filter),
        Err(_) => EnvFilter::try_new(level).with_context(|| format!("无效的日志级别: {level}")),
    }
}

/// 按当天日期写入的日志文件, 跨日自动切换
struct DailyFileWriter {
    directory: PathBuf,
    prefix: String,
    date: NaiveDate,
    file: File,
}

impl DailyFileWriter {
    fn new(directory: &Path, prefix: &str) -> Result<Self> {
        let date = Local::now().date_naive();
        let file = open_append_file(&log_path_for(directory, prefix, date))?;
        Ok(Self {
            directory: directory.to_path_buf(),
            prefix: prefix.to_string(),
            date,
            file,
        })
    }
}

impl Write for DailyFileWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let today = Local::now().date_naive();
        if today != self.date {
            let path = log_path_for(&self.directory, &self.prefix, today);
            self.file = open_append_file(&path).map_err(std::io::Error::other)?;
            self.date = today;
        }
        self.file.write_all(buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.file.flush()
    }
}

fn open_append_file(path: &Path) -> Result<File> {
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("打开日志文件失败, path={}", path.display()))
}

/// 指定日期的日志文件路径
pub(crate) fn log_path_for(directory: &Path, prefix: &str, date: NaiveDate) -> PathBuf {
    directory.join(format!("{}.{}.log", prefix, date.format("%Y-%m-%d")))
}

/// 单行日志格式: `[MM-DD HH:MM:SS.mmm] LEVEL > message`
struct LineFormatter {
    ansi: bool,
}

impl<S, N> FormatEvent<S, N> for LineFormatter
where
    S: tracing::Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &fmt::FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &tracing::Event<'_>,
    ) -> std::fmt::Result {
        let now = Local::now();
        let meta = event.metadata();
        write!(
            writer,
            "[{:02}-{:02} {:02}:{:02}:{:02}.{:03}] ",
            now.month(),
            now.day(),
            now.hour(),
            now.minute(),
            now.second(),
            now.timestamp_subsec_millis()
        )?;
        let level = meta.level().to_string();
        if self.ansi {
            let color = match *meta.level() {
                tracing::Level::ERROR => "\x1b[31m",
                tracing::Level::WARN => "\x1b[33m",
                tracing::Level::INFO => "\x1b[32m",
                _ => "\x1b[34m",
            };
            write!(writer, "{color}{level:5}\x1b[0m ")?;
        } else {
            write!(writer, "{level:5} ")?;
        }
        write!(writer, "> ")?;
        ctx.format_fields(writer.by_ref(), event)?;
        writeln!(writer)
    }
}
