/// Configuration loading and validation
pub mod config;
pub mod thresholds;

pub use config::{Application, Config, ServerConfig, TraceConfig, TraceTimezone, TracerConfig};
pub use thresholds::{SignalParams, ThresholdParams, TriggerPolicy};
