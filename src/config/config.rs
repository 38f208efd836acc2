use crate::config::ThresholdParams;
use crate::error::ConfigError;
use chrono::{DateTime, FixedOffset, Local, SecondsFormat, Utc};
use chrono_tz::Tz;
use log::info;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Top-level configuration loaded from a TOML file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Process name pattern used to discover subjects (passed to `pgrep`)
    pub process_name: String,
    /// Seconds between two polling ticks
    pub check_interval_secs: u64,
    /// Runtime of the monitored processes, selects the trace tool
    pub application: Application,
    /// Per-signal thresholds and debounce settings
    pub thresholds: ThresholdParams,
    /// Trace session settings
    pub trace: TraceConfig,
    /// Trace tool tuning knobs
    pub tracer: TracerConfig,
    /// HTTP server settings
    pub server: ServerConfig,
}

/// Supported runtimes of monitored processes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Application {
    Php,
}

impl fmt::Display for Application {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Application::Php => f.write_str("php"),
        }
    }
}

/// Settings for one trace session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TraceConfig {
    /// Upper bound on the tracer's run time, in seconds
    pub duration_secs: u64,
    /// Directory trace files are written to (and served from)
    pub dir: PathBuf,
    /// Timezone used for the timestamp in trace file names
    pub timezone: TraceTimezone,
    /// Prefix trace files with the subject's docker container name
    pub docker: bool,
    /// Run an inert command instead of the real tracer
    pub dry_run: bool,
}

impl TraceConfig {
    pub fn duration(&self) -> Duration {
        Duration::from_secs(self.duration_secs)
    }
}

impl Default for TraceConfig {
    fn default() -> Self {
        Self {
            duration_secs: 30,
            dir: PathBuf::from("/var/lib/phunter/traces"),
            timezone: TraceTimezone::Utc,
            docker: false,
            dry_run: false,
        }
    }
}

/// Tuning knobs passed verbatim to the tracer (see phpspy's `-T -s -H -l`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TracerConfig {
    /// Tracer executable
    pub program: String,
    /// Runtime version the tracer targets (`-V`)
    pub version: String,
    /// Worker thread count (`-T`)
    pub threads: String,
    /// Nanoseconds between samples (`-s`)
    pub sleep_ns: String,
    /// Sample rate in Hz (`-H`)
    pub rate_hz: String,
    /// Stop after this many traces, 0 for unlimited (`-l`)
    pub limit: String,
}

impl Default for TracerConfig {
    fn default() -> Self {
        Self {
            program: "phpspy".to_string(),
            version: "74".to_string(),
            threads: "1".to_string(),
            sleep_ns: "10101010".to_string(),
            rate_hz: "99".to_string(),
            limit: "0".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address the trace file server listens on
    pub listen: SocketAddr,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: SocketAddr::from(([0, 0, 0, 0], 9000)),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            process_name: "php-fpm".to_string(),
            check_interval_secs: 10,
            application: Application::Php,
            thresholds: ThresholdParams::default(),
            trace: TraceConfig::default(),
            tracer: TracerConfig::default(),
            server: ServerConfig::default(),
        }
    }
}

impl Config {
    /// Load and validate configuration from a TOML file
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ReadError` if the file cannot be read,
    /// `ConfigError::TomlError` if it is not valid TOML for this schema, and
    /// `ConfigError::ValidationError` if a value is out of range.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::ReadError(format!("{}: {}", path.display(), e)))?;
        Self::from_toml(&contents)
    }

    /// Parse and validate configuration from TOML text
    pub fn from_toml(contents: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn check_interval(&self) -> Duration {
        Duration::from_secs(self.check_interval_secs)
    }

    /// Reject values the hunter cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.process_name.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "process_name must not be empty".to_string(),
            ));
        }
        if self.check_interval_secs == 0 {
            return Err(ConfigError::ValidationError(
                "check_interval_secs must be greater than 0".to_string(),
            ));
        }
        if self.trace.duration_secs == 0 {
            return Err(ConfigError::ValidationError(
                "trace.duration_secs must be greater than 0".to_string(),
            ));
        }
        let cpu = self.thresholds.cpu.threshold;
        if !cpu.is_finite() || cpu < 0.0 {
            return Err(ConfigError::ValidationError(format!(
                "thresholds.cpu.threshold must be a non-negative number, got {}",
                cpu
            )));
        }
        if !self.trace.dry_run && self.tracer.program.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "tracer.program must be set unless trace.dry_run is enabled".to_string(),
            ));
        }
        Ok(())
    }

    /// Log every effective setting at startup
    pub fn log_summary(&self) {
        let thresholds = &self.thresholds;
        info!("RSS threshold: {} KiB", thresholds.rss.threshold);
        info!("RSS trigger count: {}", thresholds.rss.trigger_count);
        info!("RSS trigger delay: {} seconds", thresholds.rss.trigger_delay_secs);
        info!("CPU threshold: {:.2}", thresholds.cpu.threshold);
        info!("CPU trigger count: {}", thresholds.cpu.trigger_count);
        info!("CPU trigger delay: {} seconds", thresholds.cpu.trigger_delay_secs);
        info!("check interval: {} seconds", self.check_interval_secs);
        info!("process name: {}", self.process_name);
        info!("application: {}", self.application);
        info!("application version: {}", self.tracer.version);
        info!("trace directory: {}", self.trace.dir.display());
        info!("trace duration: {} seconds", self.trace.duration_secs);
        info!("timezone: {}", self.trace.timezone);
        info!("docker: {}", self.trace.docker);
        info!("dryrun: {}", self.trace.dry_run);
        info!("listen address: {}", self.server.listen);
    }
}

/// Timezone used to stamp trace file names
///
/// Accepts an IANA zone name such as `Australia/Sydney`, `UTC`, `Local`, or
/// a fixed offset such as `+10:00` / `-0530`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum TraceTimezone {
    Utc,
    Local,
    Fixed(FixedOffset),
    Named(Tz),
}

impl TraceTimezone {
    /// RFC 3339 timestamp (second precision) of `at` in this timezone
    pub fn format(&self, at: DateTime<Utc>) -> String {
        match self {
            TraceTimezone::Utc => at.to_rfc3339_opts(SecondsFormat::Secs, true),
            TraceTimezone::Local => at
                .with_timezone(&Local)
                .to_rfc3339_opts(SecondsFormat::Secs, true),
            TraceTimezone::Fixed(offset) => at
                .with_timezone(offset)
                .to_rfc3339_opts(SecondsFormat::Secs, true),
            TraceTimezone::Named(zone) => at
                .with_timezone(zone)
                .to_rfc3339_opts(SecondsFormat::Secs, true),
        }
    }

    fn parse_offset(value: &str) -> Option<FixedOffset> {
        let (sign, rest) = match value.as_bytes().first()? {
            b'+' => (1, &value[1..]),
            b'-' => (-1, &value[1..]),
            _ => return None,
        };
        let digits: String = rest.chars().filter(|c| *c != ':').collect();
        if digits.len() != 4 || !digits.chars().all(|c| c.is_ascii_digit()) {
            return None;
        }
        let hours: i32 = digits[..2].parse().ok()?;
        let minutes: i32 = digits[2..].parse().ok()?;
        if minutes >= 60 {
            return None;
        }
        FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
    }
}

impl TryFrom<String> for TraceTimezone {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        let trimmed = value.trim();
        match trimmed.to_ascii_lowercase().as_str() {
            "utc" | "etc/utc" | "z" => Ok(TraceTimezone::Utc),
            "local" => Ok(TraceTimezone::Local),
            _ => Self::parse_offset(trimmed)
                .map(TraceTimezone::Fixed)
                .or_else(|| trimmed.parse::<Tz>().ok().map(TraceTimezone::Named))
                .ok_or_else(|| {
                    ConfigError::ValidationError(format!(
                        "unsupported timezone '{}', expected a zone name such as \
                         Australia/Sydney, UTC, Local or an offset like +10:00",
                        value
                    ))
                }),
        }
    }
}

impl From<TraceTimezone> for String {
    fn from(timezone: TraceTimezone) -> Self {
        timezone.to_string()
    }
}

impl fmt::Display for TraceTimezone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TraceTimezone::Utc => f.write_str("UTC"),
            TraceTimezone::Local => f.write_str("Local"),
            TraceTimezone::Fixed(offset) => write!(f, "{}", offset),
            TraceTimezone::Named(zone) => f.write_str(zone.name()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::io::Write;

    const FULL_CONFIG: &str = r#"
        process_name = "php-fpm: pool www"
        check_interval_secs = 15
        application = "php"

        [thresholds.cpu]
        threshold = 75.5
        trigger_count = 2
        trigger_delay_secs = 3

        [thresholds.rss]
        threshold = 2048
        trigger_count = 1
        trigger_delay_secs = 0

        [trace]
        duration_secs = 20
        dir = "/tmp/traces"
        timezone = "+10:00"
        docker = true
        dry_run = true

        [tracer]
        program = "phpspy"
        version = "81"
        threads = "4"
        sleep_ns = "5000000"
        rate_hz = "200"
        limit = "10"

        [server]
        listen = "127.0.0.1:9100"
    "#;

    #[test]
    fn test_parse_full_config() {
        let config = Config::from_toml(FULL_CONFIG).unwrap();

        assert_eq!(config.process_name, "php-fpm: pool www");
        assert_eq!(config.check_interval(), Duration::from_secs(15));
        assert_eq!(config.thresholds.cpu.threshold, 75.5);
        assert_eq!(config.thresholds.rss.threshold, 2048);
        assert_eq!(config.thresholds.rss.trigger_count, 1);
        assert_eq!(config.trace.duration(), Duration::from_secs(20));
        assert_eq!(config.trace.dir, PathBuf::from("/tmp/traces"));
        assert_eq!(
            config.trace.timezone,
            TraceTimezone::Fixed(FixedOffset::east_opt(10 * 3600).unwrap())
        );
        assert!(config.trace.docker);
        assert!(config.trace.dry_run);
        assert_eq!(config.tracer.version, "81");
        assert_eq!(config.server.listen, "127.0.0.1:9100".parse().unwrap());
    }

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = Config::from_toml("").unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_zero_check_interval_rejected() {
        let err = Config::from_toml("check_interval_secs = 0").unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError(_)));
    }

    #[test]
    fn test_zero_trace_duration_rejected() {
        let err = Config::from_toml("[trace]\nduration_secs = 0").unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError(_)));
    }

    #[test]
    fn test_negative_cpu_threshold_rejected() {
        let err = Config::from_toml("[thresholds.cpu]\nthreshold = -1.0").unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError(_)));
    }

    #[test]
    fn test_empty_process_name_rejected() {
        let err = Config::from_toml("process_name = \"  \"").unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError(_)));
    }

    #[test]
    fn test_unknown_application_rejected() {
        let err = Config::from_toml("application = \"ruby\"").unwrap_err();
        assert!(matches!(err, ConfigError::TomlError(_)));
    }

    #[test]
    fn test_invalid_timezone_rejected() {
        let err = Config::from_toml("[trace]\ntimezone = \"Mars/Olympus\"").unwrap_err();
        assert!(matches!(err, ConfigError::TomlError(_)));
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(FULL_CONFIG.as_bytes()).unwrap();

        let config = Config::from_file(file.path()).unwrap();
        assert_eq!(config.check_interval_secs, 15);
    }

    #[test]
    fn test_from_missing_file() {
        let err = Config::from_file(Path::new("/nonexistent/phunter.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::ReadError(_)));
    }

    #[test]
    fn test_timezone_parsing() {
        assert_eq!(
            TraceTimezone::try_from("utc".to_string()).unwrap(),
            TraceTimezone::Utc
        );
        assert_eq!(
            TraceTimezone::try_from("Local".to_string()).unwrap(),
            TraceTimezone::Local
        );
        assert_eq!(
            TraceTimezone::try_from("-0530".to_string()).unwrap(),
            TraceTimezone::Fixed(FixedOffset::west_opt(5 * 3600 + 30 * 60).unwrap())
        );
        assert!(TraceTimezone::try_from("+25:00".to_string()).is_err());
        assert!(TraceTimezone::try_from("+10:75".to_string()).is_err());
        assert_eq!(
            TraceTimezone::try_from("Australia/Sydney".to_string()).unwrap(),
            TraceTimezone::Named(chrono_tz::Australia::Sydney)
        );
        assert!(TraceTimezone::try_from("Mars/Olympus".to_string()).is_err());
    }

    #[test]
    fn test_named_timezone_from_config() {
        let config = Config::from_toml("[trace]\ntimezone = \"Australia/Sydney\"").unwrap();
        assert_eq!(
            config.trace.timezone,
            TraceTimezone::Named(chrono_tz::Australia::Sydney)
        );
        assert_eq!(config.trace.timezone.to_string(), "Australia/Sydney");
    }

    #[test]
    fn test_named_timezone_follows_daylight_saving() {
        let sydney = TraceTimezone::Named(chrono_tz::Australia::Sydney);

        let summer = Utc.with_ymd_and_hms(2024, 1, 15, 0, 0, 0).unwrap();
        assert_eq!(sydney.format(summer), "2024-01-15T11:00:00+11:00");
        let winter = Utc.with_ymd_and_hms(2024, 7, 15, 0, 0, 0).unwrap();
        assert_eq!(sydney.format(winter), "2024-07-15T10:00:00+10:00");
    }

    #[test]
    fn test_timezone_format() {
        let at = Utc.with_ymd_and_hms(2024, 3, 1, 12, 30, 0).unwrap();

        assert_eq!(TraceTimezone::Utc.format(at), "2024-03-01T12:30:00Z");
        let plus_ten = TraceTimezone::Fixed(FixedOffset::east_opt(10 * 3600).unwrap());
        assert_eq!(plus_ten.format(at), "2024-03-01T22:30:00+10:00");
    }

    #[test]
    fn test_timezone_round_trips_through_toml() {
        let config = Config::from_toml(FULL_CONFIG).unwrap();
        let serialized = toml::to_string(&config).unwrap();
        let reparsed = Config::from_toml(&serialized).unwrap();
        assert_eq!(config.trace.timezone, reparsed.trace.timezone);
    }
}
