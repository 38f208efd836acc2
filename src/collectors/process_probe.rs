use crate::collectors::container;
use crate::error::SamplingError;
use crate::signals::Subject;
use log::{debug, trace};
use std::process::{Command, Output};

/// Finds the subjects to monitor
#[cfg_attr(test, mockall::automock)]
pub trait SubjectDiscovery: Send + Sync {
    /// Process ids whose name matches `name`; an empty list when none match
    fn list_subjects(&self, name: &str) -> Result<Vec<Subject>, SamplingError>;
}

/// Samples instantaneous resource usage of a subject
///
/// Implementations may block; callers run them on the blocking thread pool.
#[cfg_attr(test, mockall::automock)]
pub trait MetricsProvider: Send + Sync {
    /// Current CPU utilisation in percent
    fn cpu_percent(&self, subject: Subject) -> Result<f64, SamplingError>;

    /// Current resident set size in KiB
    fn rss_kib(&self, subject: Subject) -> Result<u64, SamplingError>;
}

/// Resolves the docker container a subject runs in
#[cfg_attr(test, mockall::automock)]
pub trait ContainerResolver: Send + Sync {
    fn container_name(&self, subject: Subject) -> Result<String, SamplingError>;
}

/// Collaborator implementation backed by `pgrep`, `top`, `ps` and docker
///
/// Every call shells out; nothing is cached between samples because subjects
/// may vanish at any time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemProbe;

impl SystemProbe {
    pub fn new() -> Self {
        Self
    }

    /// Check that the subject still exists before sampling it
    fn ensure_alive(subject: Subject) -> Result<(), SamplingError> {
        // pid 0 would address our own process group
        let pid = match libc::pid_t::try_from(subject.pid()) {
            Ok(pid) if pid > 0 => pid,
            _ => return Err(SamplingError::SubjectGone(subject)),
        };

        // SAFETY: signal 0 only performs the existence and permission check.
        let rc = unsafe { libc::kill(pid, 0) };
        if rc == 0 {
            return Ok(());
        }
        match std::io::Error::last_os_error().raw_os_error() {
            // Exists but owned by another user
            Some(libc::EPERM) => Ok(()),
            _ => Err(SamplingError::SubjectGone(subject)),
        }
    }

    fn run(program: &str, args: &[&str]) -> Result<Output, SamplingError> {
        trace!("running {} {}", program, args.join(" "));
        Command::new(program)
            .args(args)
            .output()
            .map_err(|e| SamplingError::Command(format!("{}: {}", program, e)))
    }

    fn stdout_of(program: &str, args: &[&str]) -> Result<String, SamplingError> {
        let output = Self::run(program, args)?;
        if !output.status.success() {
            return Err(SamplingError::Command(format!(
                "{} exited with {}: {}",
                program,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

impl SubjectDiscovery for SystemProbe {
    fn list_subjects(&self, name: &str) -> Result<Vec<Subject>, SamplingError> {
        let output = Self::run("pgrep", &[name])?;
        // pgrep exits with 1 when nothing matched
        if output.status.code() == Some(1) {
            debug!("no processes matching '{}'", name);
            return Ok(Vec::new());
        }
        if !output.status.success() {
            return Err(SamplingError::Command(format!(
                "pgrep exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        parse_pid_list(&String::from_utf8_lossy(&output.stdout))
    }
}

impl MetricsProvider for SystemProbe {
    fn cpu_percent(&self, subject: Subject) -> Result<f64, SamplingError> {
        Self::ensure_alive(subject)?;
        let pid = subject.to_string();
        let output = Self::stdout_of("top", &["-b", "-n", "1", "-p", &pid])?;
        parse_top_cpu(&output, subject)
    }

    fn rss_kib(&self, subject: Subject) -> Result<u64, SamplingError> {
        Self::ensure_alive(subject)?;
        let pid = subject.to_string();
        let output = Self::stdout_of("ps", &["-o", "rss=", "-p", &pid])?;
        parse_rss(&output)
    }
}

impl ContainerResolver for SystemProbe {
    fn container_name(&self, subject: Subject) -> Result<String, SamplingError> {
        container::find_container_name(subject)
    }
}

/// Parse one pid per line as printed by `pgrep`
fn parse_pid_list(output: &str) -> Result<Vec<Subject>, SamplingError> {
    output
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|line| {
            line.parse::<u32>()
                .map(Subject)
                .map_err(|e| SamplingError::Parse(format!("pid '{}': {}", line, e)))
        })
        .collect()
}

/// Extract the `%CPU` column (9th) of the subject's row in `top -b` output
fn parse_top_cpu(output: &str, subject: Subject) -> Result<f64, SamplingError> {
    let pid = subject.to_string();
    let row = output
        .lines()
        .map(|line| line.split_whitespace().collect::<Vec<_>>())
        .find(|fields| fields.first() == Some(&pid.as_str()))
        .ok_or_else(|| {
            SamplingError::Parse(format!(
                "no top row for pid {}, process probably disappeared",
                subject
            ))
        })?;

    let value = row
        .get(8)
        .ok_or_else(|| SamplingError::Parse(format!("short top row for pid {}", subject)))?;
    value
        .replace(',', ".")
        .parse::<f64>()
        .map_err(|e| SamplingError::Parse(format!("cpu '{}': {}", value, e)))
}

fn parse_rss(output: &str) -> Result<u64, SamplingError> {
    let value = output.trim();
    value
        .parse::<u64>()
        .map_err(|e| SamplingError::Parse(format!("rss '{}': {}", value, e)))
}
