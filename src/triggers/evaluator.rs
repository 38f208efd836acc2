use crate::collectors::MetricsProvider;
use crate::config::ThresholdParams;
use crate::error::SamplingError;
use crate::signals::{BreachFlags, MetricsSample, Subject};
use log::{info, trace};
use std::sync::Arc;

/// Compares one metrics sample of a subject against the configured limits
///
/// Both signals are sampled together on every call so the returned flags
/// describe a single point in time. Sampling runs on the blocking thread pool
/// because providers shell out to system tools.
#[derive(Clone)]
pub struct ThresholdEvaluator {
    provider: Arc<dyn MetricsProvider>,
    params: Arc<ThresholdParams>,
}

impl ThresholdEvaluator {
    pub fn new(provider: Arc<dyn MetricsProvider>, params: Arc<ThresholdParams>) -> Self {
        Self { provider, params }
    }

    pub fn params(&self) -> &ThresholdParams {
        &self.params
    }

    /// Sample CPU and RSS of the subject
    ///
    /// # Errors
    ///
    /// Returns the first `SamplingError` raised by the provider; no partial
    /// sample is ever returned.
    pub async fn sample(&self, subject: Subject) -> Result<MetricsSample, SamplingError> {
        let provider = Arc::clone(&self.provider);
        tokio::task::spawn_blocking(move || {
            let cpu_percent = provider.cpu_percent(subject)?;
            let rss_kib = provider.rss_kib(subject)?;
            Ok(MetricsSample {
                cpu_percent,
                rss_kib,
            })
        })
        .await
        .map_err(|e| SamplingError::Task(e.to_string()))?
    }

    /// Sample the subject and report which thresholds it exceeds
    pub async fn evaluate(&self, subject: Subject) -> Result<BreachFlags, SamplingError> {
        let sample = self.sample(subject).await?;
        let flags = self.params.check(&sample);

        if flags.cpu {
            info!(
                "[pid {}] CPU above threshold: {:.2}/{:.2}",
                subject, sample.cpu_percent, self.params.cpu.threshold
            );
        } else {
            trace!("[pid {}] current process CPU: {:.2}", subject, sample.cpu_percent);
        }
        if flags.rss {
            info!(
                "[pid {}] RSS above threshold: {}/{}",
                subject, sample.rss_kib, self.params.rss.threshold
            );
        } else {
            trace!("[pid {}] current process RSS: {}", subject, sample.rss_kib);
        }

        Ok(flags)
    }
}
