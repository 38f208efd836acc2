//! Core subject and signal types
//!
//! This module defines the small value types shared by the evaluator, the
//! arbiter and the trace controller: the monitored process, the resource
//! signals that can trigger a trace, and the per-sample breach record.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A monitored operating-system process, identified by its process id
///
/// Subjects are ephemeral: they are rediscovered every polling cycle and may
/// disappear between two samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Subject(pub u32);

impl Subject {
    /// Process id of this subject
    pub fn pid(self) -> u32 {
        self.0
    }
}

impl fmt::Display for Subject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Resource signal that can cause a trace
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignalKind {
    /// CPU utilisation in percent
    Cpu,
    /// Resident set size in KiB
    Rss,
}

impl SignalKind {
    /// Every signal kind, in the order debounce tasks are spawned
    pub const ALL: [SignalKind; 2] = [SignalKind::Rss, SignalKind::Cpu];

    pub fn as_str(self) -> &'static str {
        match self {
            SignalKind::Cpu => "CPU",
            SignalKind::Rss => "RSS",
        }
    }
}

impl fmt::Display for SignalKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Point-in-time resource usage of one subject
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MetricsSample {
    /// CPU usage as a percentage (may exceed 100 on multi-core hosts)
    pub cpu_percent: f64,
    /// Resident memory in KiB
    pub rss_kib: u64,
}

/// Which signals exceeded their threshold in a single evaluation pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BreachFlags {
    pub cpu: bool,
    pub rss: bool,
}

impl BreachFlags {
    /// Breach flag for the given signal kind
    pub fn get(&self, kind: SignalKind) -> bool {
        match kind {
            SignalKind::Cpu => self.cpu,
            SignalKind::Rss => self.rss,
        }
    }

    /// True if at least one signal is breached
    pub fn any(&self) -> bool {
        SignalKind::ALL.iter().any(|kind| self.get(*kind))
    }
}
