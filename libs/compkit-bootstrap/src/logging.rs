use crate::config::{LoggingConfig, Section};
use parking_lot::Mutex;
use std::io::IsTerminal;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::level_filters::LevelFilter;
use tracing::Level;
use tracing_subscriber::filter::Targets;
use tracing_subscriber::{fmt, util::SubscriberInitExt, Layer};

// ================= level helpers =================

fn parse_tracing_level(s: &str) -> Option<tracing::Level> {
    match s.to_ascii_lowercase().as_str() {
        "trace" => Some(Level::TRACE),
        "debug" => Some(Level::DEBUG),
        "info" => Some(Level::INFO),
        "warn" => Some(Level::WARN),
        "error" => Some(Level::ERROR),
        "off" | "none" => None,
        _ => Some(Level::INFO),
    }
}

fn level_filter(s: &str) -> LevelFilter {
    parse_tracing_level(s)
        .map(LevelFilter::from_level)
        .unwrap_or(LevelFilter::OFF)
}

// ================= rotating writer for files =================

use file_rotate::{
    compression::Compression,
    suffix::{AppendTimestamp, FileLimit},
    ContentLimit, FileRotate,
};

#[derive(Clone)]
struct RotWriter(Arc<Mutex<FileRotate<AppendTimestamp>>>);

impl<'a> fmt::MakeWriter<'a> for RotWriter {
    type Writer = RotWriterHandle;
    fn make_writer(&'a self) -> Self::Writer {
        RotWriterHandle(self.0.clone())
    }
}

struct RotWriterHandle(Arc<Mutex<FileRotate<AppendTimestamp>>>);

impl Write for RotWriterHandle {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().write(buf)
    }
    fn flush(&mut self) -> std::io::Result<()> {
        self.0.lock().flush()
    }
}

fn resolve_log_path(file: &str, base_dir: &Path) -> PathBuf {
    let p = Path::new(file);
    if p.is_absolute() {
        p.to_path_buf()
    } else {
        base_dir.join(p)
    }
}

fn create_rotating_writer(section: &Section, base_dir: &Path) -> std::io::Result<Option<RotWriter>> {
    if section.file.trim().is_empty() {
        return Ok(None);
    }
    let log_path = resolve_log_path(&section.file, base_dir);
    if let Some(parent) = log_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    // Respect retention policy: prefer MaxFiles if provided, else Age
    let limit = match section.max_backups {
        Some(n) => FileLimit::MaxFiles(n),
        None => FileLimit::Age(chrono::Duration::days(
            section.max_age_days.unwrap_or(1) as i64,
        )),
    };
    let max_bytes = section.max_size_mb.unwrap_or(100) as usize * 1024 * 1024;

    let rot = FileRotate::new(
        &log_path,
        AppendTimestamp::default(limit),
        ContentLimit::BytesSurpassed(max_bytes),
        Compression::None,
        None,
    );
    Ok(Some(RotWriter(Arc::new(Mutex::new(rot)))))
}

// ================= targets =================

/// Which level field of a section a sink reads.
#[derive(Clone, Copy)]
enum SinkKind {
    Console,
    File,
}

/// Default level from the "default" section, then one rule per other section.
fn build_targets(cfg: &LoggingConfig, kind: SinkKind) -> Targets {
    let level_of = |s: &Section| match kind {
        SinkKind::Console => level_filter(&s.console_level),
        SinkKind::File if s.file_level.trim().is_empty() => level_filter(&s.console_level),
        SinkKind::File => level_filter(&s.file_level),
    };

    let default_level = cfg.get("default").map(level_of).unwrap_or(LevelFilter::INFO);
    let mut targets = Targets::new().with_default(default_level);

    let mut sections: Vec<(&String, &Section)> =
        cfg.iter().filter(|(k, _)| k.as_str() != "default").collect();
    sections.sort_by(|a, b| a.0.cmp(b.0));
    for (target, section) in sections {
        targets = targets.with_target(target.clone(), level_of(section));
    }
    targets
}

// ================= public init =================

/// Install the global subscriber: console (stderr) plus an optional rotating
/// JSON file from the "default" section. `RUST_LOG`, when set, caps both sinks.
///
/// Relative log file paths are resolved against `base_dir`. Calling this more
/// than once keeps the first subscriber.
pub fn init_logging(cfg: &LoggingConfig, base_dir: &Path) {
    // Bridge `log` → `tracing` *before* installing the subscriber
    if let Err(e) = tracing_log::LogTracer::init() {
        eprintln!("LogTracer init skipped: {e}");
    }

    if cfg.is_empty() {
        init_minimal();
        return;
    }

    let file_writer = match cfg.get("default") {
        Some(section) => match create_rotating_writer(section, base_dir) {
            Ok(writer) => writer,
            Err(e) => {
                eprintln!("Failed to initialize log file '{}': {e}", section.file);
                None
            }
        },
        None => None,
    };

    install_subscriber(
        build_targets(cfg, SinkKind::Console),
        build_targets(cfg, SinkKind::File),
        file_writer,
    );
}

fn install_subscriber(console_targets: Targets, file_targets: Targets, file_writer: Option<RotWriter>) {
    use tracing_subscriber::{layer::SubscriberExt, EnvFilter, Registry};

    let env: Option<EnvFilter> = EnvFilter::try_from_default_env().ok();

    let console_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_ansi(std::io::stderr().is_terminal())
        .with_target(true)
        .with_level(true)
        .with_timer(fmt::time::UtcTime::rfc_3339())
        .with_filter(console_targets);

    let file_layer = file_writer.map(|writer| {
        fmt::layer()
            .json()
            .with_ansi(false)
            .with_target(true)
            .with_level(true)
            .with_timer(fmt::time::UtcTime::rfc_3339())
            .with_writer(writer)
            .with_filter(file_targets)
    });

    let subscriber = Registry::default()
        .with(env)
        .with(console_layer)
        .with(file_layer);

    let _ = subscriber.try_init();
}

fn init_minimal() {
    use tracing_subscriber::{layer::SubscriberExt, EnvFilter, Registry};

    let env = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let fmt_layer = fmt::layer()
        .with_target(true)
        .with_timer(fmt::time::UtcTime::rfc_3339());

    let _ = Registry::default().with(env).with(fmt_layer).try_init();
}
