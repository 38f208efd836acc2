use crate::signals::{SignalKind, Subject};
use std::path::PathBuf;
use std::process::ExitStatus;
use thiserror::Error;

/// Errors that can occur while sampling a subject
#[derive(Error, Debug)]
pub enum SamplingError {
    #[error("Process {0} no longer exists")]
    SubjectGone(Subject),

    #[error("Sampling command failed: {0}")]
    Command(String),

    #[error("Failed to parse sample output: {0}")]
    Parse(String),

    #[error("Sampling task failed: {0}")]
    Task(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised by a debounce round
#[derive(Error, Debug)]
pub enum TriggerError {
    #[error("{signal} trigger evaluation failed: {source}")]
    Evaluation {
        signal: SignalKind,
        #[source]
        source: SamplingError,
    },
}

/// Errors that end a trace session
#[derive(Error, Debug)]
pub enum TraceError {
    #[error("Failed to resolve container name: {0}")]
    ContainerLookup(#[source] SamplingError),

    #[error("Failed to create trace directory {path}: {source}")]
    OutputDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to create trace file {path}: {source}")]
    OutputFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Tracer exited with {0} before the trace duration elapsed")]
    Runtime(ExitStatus),

    #[error("Failed to wait on tracer: {0}")]
    Wait(#[source] std::io::Error),

    #[error("Failed to kill tracer after the trace duration: {0}")]
    Kill(#[source] std::io::Error),
}

/// Errors returned by one per-subject evaluation unit
#[derive(Error, Debug)]
pub enum HuntError {
    #[error(transparent)]
    Sampling(#[from] SamplingError),

    #[error(transparent)]
    Trace(#[from] TraceError),
}

/// Errors that can occur during configuration loading
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(String),

    #[error("Invalid configuration value: {0}")]
    ValidationError(String),

    #[error("TOML parse error: {0}")]
    TomlError(#[from] toml::de::Error),
}
