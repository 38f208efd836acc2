/// Per-subject trace mutual exclusion
pub mod registry;

/// Bounded execution of the external tracer
pub mod session;

pub use registry::{TraceGuard, TraceRegistry};
pub use session::{SessionState, TraceCommand, TraceRunner, TraceSession};
