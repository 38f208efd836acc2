//! Polling loop that ties discovery, arbitration and tracing together
//!
//! Every tick discovers the subjects by name and dispatches one independent
//! evaluation unit per subject. A tick's batch is dispatched without waiting
//! for the previous one, so units for the same subject may overlap; only the
//! trace itself is serialized by the [`TraceRegistry`].

use crate::collectors::{ContainerResolver, MetricsProvider, SubjectDiscovery, SystemProbe};
use crate::config::Config;
use crate::error::{HuntError, SamplingError};
use crate::signals::Subject;
use crate::trace::{TraceRegistry, TraceRunner, TraceSession};
use crate::triggers::{ThresholdEvaluator, TriggerArbiter};
use log::{debug, error, info, trace};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

/// Counts for one polling tick
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickSummary {
    /// Subjects discovered this tick
    pub subjects: usize,
    /// Trace sessions that completed successfully
    pub traced: usize,
    /// Evaluation units that ended in an error
    pub failed: usize,
}

/// Periodically hunts for subjects exceeding their thresholds and traces them
pub struct Hunter {
    process_name: String,
    interval: Duration,
    discovery: Arc<dyn SubjectDiscovery>,
    evaluator: ThresholdEvaluator,
    arbiter: TriggerArbiter,
    registry: Arc<TraceRegistry>,
    runner: TraceRunner,
}

impl Hunter {
    /// Create a hunter from its collaborators
    ///
    /// The registry is injected so that every hunter sharing it also shares
    /// the one-trace-per-subject guarantee.
    pub fn new(
        config: &Config,
        discovery: Arc<dyn SubjectDiscovery>,
        provider: Arc<dyn MetricsProvider>,
        resolver: Arc<dyn ContainerResolver>,
        registry: Arc<TraceRegistry>,
    ) -> Self {
        let evaluator = ThresholdEvaluator::new(provider, Arc::new(config.thresholds.clone()));
        Self {
            process_name: config.process_name.clone(),
            interval: config.check_interval(),
            discovery,
            arbiter: TriggerArbiter::new(evaluator.clone()),
            evaluator,
            registry,
            runner: TraceRunner::new(config, resolver),
        }
    }

    /// Hunter backed by the system tools
    pub fn with_system_probe(config: &Config) -> Self {
        let probe = Arc::new(SystemProbe::new());
        Self::new(
            config,
            probe.clone(),
            probe.clone(),
            probe,
            Arc::new(TraceRegistry::new()),
        )
    }

    /// Tick until `shutdown` is cancelled
    ///
    /// In-flight ticks are not awaited on shutdown; their tracers are killed
    /// when the runtime drops them.
    pub async fn run(self: Arc<Self>, shutdown: CancellationToken) {
        info!(
            "hunting for '{}' every {} seconds",
            self.process_name,
            self.interval.as_secs()
        );

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        // The first tick completes immediately; wait a full interval instead
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("hunter is now stopping...");
                    break;
                }
                _ = ticker.tick() => {
                    let hunter = Arc::clone(&self);
                    tokio::spawn(async move {
                        hunter.check_subjects().await;
                    });
                }
            }
        }
    }

    /// Run one polling tick: discover subjects and evaluate each in parallel
    pub async fn check_subjects(self: &Arc<Self>) -> TickSummary {
        info!("checking processes");

        let subjects = match self.discover().await {
            Ok(subjects) => subjects,
            Err(e) => {
                error!(
                    "failed to get processes for {}, are any running on the system? {}",
                    self.process_name, e
                );
                return TickSummary::default();
            }
        };

        let mut summary = TickSummary {
            subjects: subjects.len(),
            ..TickSummary::default()
        };
        let mut units = JoinSet::new();
        for subject in subjects {
            debug!("[pid {}] checking if trace should be triggered", subject);
            let hunter = Arc::clone(self);
            units.spawn(async move { (subject, hunter.attempt_trace(subject).await) });
        }

        while let Some(joined) = units.join_next().await {
            match joined {
                Ok((_, Ok(Some(_session)))) => summary.traced += 1,
                Ok((_, Ok(None))) => {}
                Ok((subject, Err(e))) => {
                    error!(
                        "[pid {}] error when attempting to trace process: {}",
                        subject, e
                    );
                    summary.failed += 1;
                }
                Err(e) => {
                    error!("evaluation task failed: {}", e);
                    summary.failed += 1;
                }
            }
        }

        info!("finished checking processes");
        summary
    }

    /// Evaluate one subject and trace it if a trigger fires
    ///
    /// Returns `Ok(None)` when nothing fired or a trace is already running for
    /// the subject. The registry slot is held only while the session runs and
    /// is released on every exit path.
    pub async fn attempt_trace(&self, subject: Subject) -> Result<Option<TraceSession>, HuntError> {
        let initial = self.evaluator.evaluate(subject).await?;
        if !initial.any() {
            trace!("[pid {}] no threshold reached", subject);
            return Ok(None);
        }

        let Some(signal) = self.arbiter.arbitrate(subject, initial).await else {
            return Ok(None);
        };
        info!("[pid {}] {} trigger fired trace", subject, signal);

        let Some(_slot) = self.registry.try_lock(subject) else {
            debug!("[pid {}] trace already running, skipping", subject);
            return Ok(None);
        };

        let session = self.runner.run(subject).await.inspect_err(|_| {
            error!("[pid {}] failed to run trace", subject);
        })?;
        trace!("[pid {}] finished trace", subject);
        Ok(Some(session))
    }

    async fn discover(&self) -> Result<Vec<Subject>, SamplingError> {
        let discovery = Arc::clone(&self.discovery);
        let name = self.process_name.clone();
        tokio::task::spawn_blocking(move || discovery.list_subjects(&name))
            .await
            .map_err(|e| SamplingError::Task(e.to_string()))?
    }
}
