//! Debounced, concurrent arbitration between resource signals
//!
//! Every signal kind gets its own debounce task. A task confirms its breach
//! over `trigger_count` resampling rounds spaced by `trigger_delay_secs`; the
//! first task to fire decides the arbitration and the others are cancelled.

use crate::config::TriggerPolicy;
use crate::error::TriggerError;
use crate::signals::{BreachFlags, SignalKind, Subject};
use crate::triggers::ThresholdEvaluator;
use log::{debug, error, info};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Result reported by one debounce task
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DebounceOutcome {
    Fired(SignalKind),
    Aborted(SignalKind),
    Cancelled(SignalKind),
}

/// Debounce state of one signal for one subject
struct DebounceTask {
    evaluator: ThresholdEvaluator,
    subject: Subject,
    kind: SignalKind,
    initially_breached: bool,
    policy: TriggerPolicy,
}

impl DebounceTask {
    async fn run(self, cancel: CancellationToken) -> DebounceOutcome {
        let kind = self.kind;
        let subject = self.subject;
        let count = self.policy.count;

        if self.initially_breached && count <= 1 {
            info!(
                "[pid {}] trigger count is <=1 - {} trigger fired after initial check",
                subject, kind
            );
            return DebounceOutcome::Fired(kind);
        }

        for round in 1..=count {
            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => return DebounceOutcome::Cancelled(kind),
                result = self.evaluator.evaluate(subject) => result,
            };

            let flags = match result {
                Ok(flags) => flags,
                Err(source) => {
                    let err = TriggerError::Evaluation {
                        signal: kind,
                        source,
                    };
                    error!("[pid {}] {}", subject, err);
                    return DebounceOutcome::Aborted(kind);
                }
            };

            if !flags.get(kind) {
                debug!(
                    "[pid {}] {} trigger was not fired as it was below threshold",
                    subject, kind
                );
                return DebounceOutcome::Aborted(kind);
            }

            if round >= count {
                info!(
                    "[pid {}] {} trigger count reached {}/{}. Trigger fired",
                    subject, kind, round, count
                );
                return DebounceOutcome::Fired(kind);
            }

            info!(
                "[pid {}] {} trigger count {}/{}. Waiting {} seconds before next check",
                subject,
                kind,
                round,
                count,
                self.policy.delay.as_secs()
            );
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return DebounceOutcome::Cancelled(kind),
                _ = tokio::time::sleep(self.policy.delay) => {}
            }
        }

        DebounceOutcome::Aborted(kind)
    }
}

/// Decides whether, and because of which signal, a subject should be traced
#[derive(Clone)]
pub struct TriggerArbiter {
    evaluator: ThresholdEvaluator,
}

impl TriggerArbiter {
    pub fn new(evaluator: ThresholdEvaluator) -> Self {
        Self { evaluator }
    }

    /// Run one debounce task per signal kind and return the first to fire
    ///
    /// `initial` is the evaluation that prompted the arbitration. Returns
    /// `None` once every task has aborted. When a task fires, the function
    /// returns immediately and the remaining tasks are cancelled; they stop
    /// at their next sample or delay.
    pub async fn arbitrate(&self, subject: Subject, initial: BreachFlags) -> Option<SignalKind> {
        debug!("[pid {}] checking if trigger conditions met", subject);

        let cancel = CancellationToken::new();
        // Cancels the losing tasks on every return path, including when this
        // future is dropped mid-arbitration.
        let _cancel_on_exit = cancel.clone().drop_guard();
        let (outcome_tx, mut outcome_rx) = mpsc::channel(SignalKind::ALL.len());

        for kind in SignalKind::ALL {
            let task = DebounceTask {
                evaluator: self.evaluator.clone(),
                subject,
                kind,
                initially_breached: initial.get(kind),
                policy: self.evaluator.params().policy(kind),
            };
            let outcome_tx = outcome_tx.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move {
                let outcome = task.run(cancel).await;
                // The receiver is gone once another signal has won
                let _ = outcome_tx.send(outcome).await;
            });
        }
        drop(outcome_tx);

        while let Some(outcome) = outcome_rx.recv().await {
            match outcome {
                DebounceOutcome::Fired(kind) => return Some(kind),
                DebounceOutcome::Aborted(kind) => {
                    debug!("[pid {}] {} debounce aborted", subject, kind);
                }
                DebounceOutcome::Cancelled(kind) => {
                    debug!("[pid {}] {} debounce cancelled", subject, kind);
                }
            }
        }

        None
    }
}
