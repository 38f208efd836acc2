//! JSON line logging on top of `env_logger`

use chrono::{DateTime, SecondsFormat, Utc};
use env_logger::{Builder, Target};
use log::{warn, LevelFilter, Record};
use serde_json::{json, Value};
use std::io::Write;

/// Environment variable holding the log level name
pub const LOG_LEVEL_ENV: &str = "PHUNTER_LOG_LEVEL";

/// Map a level name such as `DEBUG` or `warn` to a filter
pub fn parse_level(name: &str) -> Option<LevelFilter> {
    match name.trim().to_ascii_lowercase().as_str() {
        "trace" => Some(LevelFilter::Trace),
        "debug" => Some(LevelFilter::Debug),
        "info" => Some(LevelFilter::Info),
        "warn" | "warning" => Some(LevelFilter::Warn),
        "error" => Some(LevelFilter::Error),
        "off" => Some(LevelFilter::Off),
        _ => None,
    }
}

/// One log record as a JSON object
pub fn record_json(record: &Record<'_>, time: DateTime<Utc>) -> Value {
    let file = match (record.file(), record.line()) {
        (Some(file), Some(line)) => format!("{}:{}", file, line),
        (Some(file), None) => file.to_string(),
        _ => String::new(),
    };
    json!({
        "time": time.to_rfc3339_opts(SecondsFormat::Nanos, true),
        "level": record.level().as_str().to_ascii_lowercase(),
        "target": record.target(),
        "file": file,
        "msg": record.args().to_string(),
    })
}

/// Install the global logger
///
/// The level comes from `PHUNTER_LOG_LEVEL` (default `INFO`), `verbose`
/// forces `DEBUG`, and `RUST_LOG` directives are applied on top.
pub fn init(verbose: bool) {
    let requested = std::env::var(LOG_LEVEL_ENV).ok();
    let parsed = requested.as_deref().map(parse_level);
    let level = match (verbose, parsed) {
        (true, _) => LevelFilter::Debug,
        (false, Some(Some(level))) => level,
        _ => LevelFilter::Info,
    };

    Builder::new()
        .filter_level(level)
        .parse_default_env()
        .target(Target::Stdout)
        .format(|buf, record| writeln!(buf, "{}", record_json(record, Utc::now())))
        .init();

    if let (Some(name), Some(None)) = (requested, parsed) {
        warn!("unknown {} '{}', using {}", LOG_LEVEL_ENV, name, level);
    }
}
