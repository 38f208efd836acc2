/// Threshold evaluation and debounced trigger arbitration
pub mod arbiter;
pub mod evaluator;

pub use arbiter::TriggerArbiter;
pub use evaluator::ThresholdEvaluator;
