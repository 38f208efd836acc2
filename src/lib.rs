/// Error types for sampling, triggering and tracing
pub mod error;

/// Subjects, signal kinds and metric samples
pub mod signals;

/// Configuration management
pub mod config;

/// Subject discovery, resource sampling and container lookup
pub mod collectors;

/// Threshold evaluation and trigger arbitration
pub mod triggers;

/// Trace registry and bounded trace sessions
pub mod trace;

/// Polling loop dispatching one evaluation unit per subject
pub mod hunter;

/// Health endpoint and trace file server
pub mod server;

/// JSON line logging setup
pub mod logging;

/// Required external binaries
pub mod system;

// Re-export commonly used types
pub use error::{ConfigError, HuntError, SamplingError, TraceError, TriggerError};
pub use hunter::Hunter;
pub use signals::{SignalKind, Subject};
