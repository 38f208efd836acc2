use crate::signals::Subject;
use log::trace;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Tracks which subjects currently have a trace running
///
/// A single lock guards the whole map; every operation under it is a constant
/// time lookup or update. Entries are created lazily on first access and
/// removed on release, so the map only holds subjects being traced.
#[derive(Debug, Default)]
pub struct TraceRegistry {
    running: Mutex<HashMap<Subject, bool>>,
}

impl TraceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<Subject, bool>> {
        // The map only holds booleans, so a panic elsewhere cannot leave it
        // half-updated
        self.running.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Mark a trace as running for the subject
    ///
    /// Returns `false` if one is already running. That is a normal skip, not
    /// an error.
    pub fn acquire(&self, subject: Subject) -> bool {
        let mut entries = self.entries();
        let running = entries.entry(subject).or_insert(false);
        if *running {
            trace!("[pid {}] trace already running", subject);
            return false;
        }
        *running = true;
        true
    }

    /// Mark the subject's trace as finished
    ///
    /// The entry is dropped; a subject without an entry is not running.
    pub fn release(&self, subject: Subject) {
        self.entries().remove(&subject);
    }

    /// Scoped acquire: the returned guard releases the subject when dropped
    ///
    /// Returns `None` if a trace is already running for the subject.
    pub fn try_lock(&self, subject: Subject) -> Option<TraceGuard<'_>> {
        if self.acquire(subject) {
            Some(TraceGuard {
                registry: self,
                subject,
            })
        } else {
            None
        }
    }
}

/// Holds a subject's trace slot; releases it exactly once on drop
#[derive(Debug)]
pub struct TraceGuard<'a> {
    registry: &'a TraceRegistry,
    subject: Subject,
}

impl TraceGuard<'_> {
    pub fn subject(&self) -> Subject {
        self.subject
    }
}

impl Drop for TraceGuard<'_> {
    fn drop(&mut self) {
        self.registry.release(self.subject);
    }
}
