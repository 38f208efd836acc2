use crate::signals::{BreachFlags, MetricsSample, SignalKind};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Threshold and debounce settings for one signal
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SignalParams<T> {
    /// Value the signal must strictly exceed to count as breached
    pub threshold: T,
    /// Number of consecutive breached rounds required before firing
    pub trigger_count: u32,
    /// Seconds to wait between two debounce rounds
    pub trigger_delay_secs: u64,
}

impl<T> SignalParams<T> {
    fn policy(&self) -> TriggerPolicy {
        TriggerPolicy {
            count: self.trigger_count,
            delay: Duration::from_secs(self.trigger_delay_secs),
        }
    }
}

/// Debounce strategy of a signal, independent of its threshold type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TriggerPolicy {
    pub count: u32,
    pub delay: Duration,
}

/// Per-signal limits shared read-only by every evaluation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThresholdParams {
    /// CPU limit in percent
    pub cpu: SignalParams<f64>,
    /// Resident memory limit in KiB
    pub rss: SignalParams<u64>,
}

impl Default for ThresholdParams {
    fn default() -> Self {
        Self {
            cpu: SignalParams {
                threshold: 80.0,
                trigger_count: 3,
                trigger_delay_secs: 5,
            },
            rss: SignalParams {
                threshold: 1024 * 1024, // 1 GiB
                trigger_count: 3,
                trigger_delay_secs: 5,
            },
        }
    }
}

impl ThresholdParams {
    /// Debounce policy for the given signal
    pub fn policy(&self, kind: SignalKind) -> TriggerPolicy {
        match kind {
            SignalKind::Cpu => self.cpu.policy(),
            SignalKind::Rss => self.rss.policy(),
        }
    }

    /// Compare one sample against the limits
    ///
    /// Comparison is strictly greater-than: a sample equal to its threshold
    /// is not a breach.
    pub fn check(&self, sample: &MetricsSample) -> BreachFlags {
        BreachFlags {
            cpu: sample.cpu_percent > self.cpu.threshold,
            rss: sample.rss_kib > self.rss.threshold,
        }
    }
}


#[cfg(test)]
mod property_tests {
    use super::*;
    use quickcheck_macros::quickcheck;

    #[quickcheck]
    fn prop_cpu_breach_is_strictly_greater(cpu: f64, threshold: f64) -> bool {
        let params = ThresholdParams {
            cpu: SignalParams {
                threshold,
                ..Default::default()
            },
            ..Default::default()
        };
        let flags = params.check(&MetricsSample {
            cpu_percent: cpu,
            rss_kib: 0,
        });
        flags.cpu == (cpu > threshold)
    }

    #[quickcheck]
    fn prop_rss_breach_is_strictly_greater(rss: u64, threshold: u64) -> bool {
        let params = ThresholdParams {
            rss: SignalParams {
                threshold,
                ..Default::default()
            },
            ..Default::default()
        };
        let flags = params.check(&MetricsSample {
            cpu_percent: 0.0,
            rss_kib: rss,
        });
        flags.rss == (rss > threshold)
    }

    #[quickcheck]
    fn prop_signals_are_independent(cpu: u8, rss: u32) -> bool {
        let params = ThresholdParams::default();
        let sample = MetricsSample {
            cpu_percent: cpu as f64,
            rss_kib: rss as u64,
        };
        let flags = params.check(&sample);
        flags.get(SignalKind::Cpu) == (sample.cpu_percent > params.cpu.threshold)
            && flags.get(SignalKind::Rss) == (sample.rss_kib > params.rss.threshold)
    }
}
