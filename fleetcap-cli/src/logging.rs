use std::path::Path;
use anyhow::{anyhow, Context};
use tracing::level_filters::LevelFilter;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::Layer;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

pub fn log_level(s: &str) -> anyhow::Result<LevelFilter> {
    match s.to_lowercase().as_str() {
        "error" => Ok(LevelFilter::ERROR),
        "warn" => Ok(LevelFilter::WARN),
        "info" => Ok(LevelFilter::INFO),
        "debug" => Ok(LevelFilter::DEBUG),
        "trace" => Ok(LevelFilter::TRACE),
        _ => Err(anyhow!("Unknown Log LevelFilter {}", s)),
    }
}

/// Logs go to stderr so they don't interleave with the prompts and the report on stdout. With a
/// log file, the same events are also written there without colour. The guard flushes the file
/// when dropped and has to live until exit.
pub fn configure_logging(level: LevelFilter, log_file: Option<&str>) -> anyhow::Result<Option<WorkerGuard>> {
    let stderr_log = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_filter(level);

    let Some(log_file) = log_file else {
        tracing_subscriber::registry().with(stderr_log).init();
        return Ok(None);
    };

    let path = Path::new(log_file);
    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    let file_name = path.file_name()
        .with_context(|| format!("log file {log_file} has no file name"))?;
    std::fs::create_dir_all(dir).with_context(|| format!("creating log folder {}", dir.display()))?;

    let file_appender = tracing_appender::rolling::never(dir, file_name);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
    let file_log = tracing_subscriber::fmt::layer()
        .with_ansi(false)
        .with_writer(non_blocking)
        .with_filter(level);

    tracing_subscriber::registry()
        .with(stderr_log.and_then(file_log))
        .init();
    Ok(Some(guard))
}
