/// Subject discovery and resource sampling backed by system tools
pub mod process_probe;

/// Docker container lookup for a subject
pub mod container;

pub use process_probe::{ContainerResolver, MetricsProvider, SubjectDiscovery, SystemProbe};

#[cfg(test)]
pub use process_probe::{MockContainerResolver, MockMetricsProvider, MockSubjectDiscovery};
