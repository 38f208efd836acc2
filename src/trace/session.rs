use crate::collectors::ContainerResolver;
use crate::config::{Application, Config, TraceConfig, TracerConfig};
use crate::error::{SamplingError, TraceError};
use crate::signals::Subject;
use chrono::{DateTime, Utc};
use log::{debug, error, info, warn};
use std::fmt;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::time::Duration;
use tokio::process::Command;

/// Lifecycle of a trace session
///
/// A failure to start leaves the session in `NotStarted`; every other run
/// ends in one of the terminal states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    NotStarted,
    Running,
    /// The duration bound elapsed and the tracer was killed (expected outcome)
    KilledAtBound,
    /// The tracer exited cleanly before the duration bound
    ExitedEarly,
    /// The tracer exited with an error before the duration bound
    Failed(ExitStatus),
}

/// External tracer invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceCommand {
    program: String,
    args: Vec<String>,
}

impl TraceCommand {
    pub fn new<I, S>(program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    /// Tracer command for the subject, or an inert stand-in under dry-run
    pub fn for_subject(
        subject: Subject,
        application: Application,
        tracer: &TracerConfig,
        dry_run: bool,
    ) -> Self {
        if dry_run {
            return Self::new("echo", ["dryrun"]);
        }
        match application {
            Application::Php => Self::new(
                tracer.program.clone(),
                [
                    format!("-V{}", tracer.version),
                    "-p".to_string(),
                    subject.to_string(),
                    "-T".to_string(),
                    tracer.threads.clone(),
                    "-s".to_string(),
                    tracer.sleep_ns.clone(),
                    "-H".to_string(),
                    tracer.rate_hz.clone(),
                    "-l".to_string(),
                    tracer.limit.clone(),
                ],
            ),
        }
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }
}

impl fmt::Display for TraceCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}

/// One bounded run of the tracer against a subject
#[derive(Debug, Clone)]
pub struct TraceSession {
    pub subject: Subject,
    pub started_at: DateTime<Utc>,
    pub duration: Duration,
    pub output_path: PathBuf,
    pub dry_run: bool,
    pub state: SessionState,
}

impl TraceSession {
    pub fn new(subject: Subject, duration: Duration, output_path: PathBuf, dry_run: bool) -> Self {
        Self {
            subject,
            started_at: Utc::now(),
            duration,
            output_path,
            dry_run,
            state: SessionState::NotStarted,
        }
    }

    /// Run the command with stdout and stderr captured in the output file
    ///
    /// The command is killed once `duration` elapses, which counts as success.
    /// There is no retry on any failure.
    ///
    /// # Errors
    ///
    /// * `TraceError::OutputDir` / `TraceError::OutputFile` if the output file
    ///   cannot be created
    /// * `TraceError::Spawn` if the command cannot be started
    /// * `TraceError::Runtime` if it exits non-zero before the bound
    /// * `TraceError::Kill` if it cannot be terminated at the bound
    pub async fn execute(&mut self, command: &TraceCommand) -> Result<(), TraceError> {
        let subject = self.subject;

        if let Some(dir) = self.output_path.parent() {
            tokio::fs::create_dir_all(dir)
                .await
                .map_err(|source| TraceError::OutputDir {
                    path: dir.to_path_buf(),
                    source,
                })?;
        }
        let output_error = |source| TraceError::OutputFile {
            path: self.output_path.clone(),
            source,
        };
        let stdout = tokio::fs::File::create(&self.output_path)
            .await
            .map_err(output_error)?
            .into_std()
            .await;
        let stderr = stdout.try_clone().map_err(output_error)?;

        debug!("[pid {}] trace command: {}", subject, command);
        let mut child = Command::new(command.program())
            .args(command.args())
            .stdin(Stdio::null())
            .stdout(Stdio::from(stdout))
            .stderr(Stdio::from(stderr))
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| TraceError::Spawn {
                program: command.program().to_string(),
                source,
            })?;
        self.state = SessionState::Running;

        match tokio::time::timeout(self.duration, child.wait()).await {
            Err(_elapsed) => {
                if let Err(e) = child.kill().await {
                    error!(
                        "[pid {}] failed to kill tracer after specified trace duration",
                        subject
                    );
                    return Err(TraceError::Kill(e));
                }
                self.state = SessionState::KilledAtBound;
                info!(
                    "[pid {}] trace stopped after {} seconds",
                    subject,
                    self.duration.as_secs_f64()
                );
                info!(
                    "[pid {}] trace written to {}",
                    subject,
                    self.output_path.display()
                );
                Ok(())
            }
            Ok(Ok(status)) if status.success() => {
                self.state = SessionState::ExitedEarly;
                warn!(
                    "[pid {}] trace finished before elapsed trace duration",
                    subject
                );
                Ok(())
            }
            Ok(Ok(status)) => {
                self.state = SessionState::Failed(status);
                error!("[pid {}] unexpected tracing error: {}", subject, status);
                Err(TraceError::Runtime(status))
            }
            Ok(Err(e)) => Err(TraceError::Wait(e)),
        }
    }
}

/// Starts trace sessions with the configured tracer and output settings
#[derive(Clone)]
pub struct TraceRunner {
    application: Application,
    settings: Arc<TraceConfig>,
    tracer: Arc<TracerConfig>,
    resolver: Arc<dyn ContainerResolver>,
}

impl TraceRunner {
    pub fn new(config: &Config, resolver: Arc<dyn ContainerResolver>) -> Self {
        Self {
            application: config.application,
            settings: Arc::new(config.trace.clone()),
            tracer: Arc::new(config.tracer.clone()),
            resolver,
        }
    }

    /// Trace the subject for the configured duration
    ///
    /// Resolves the container name first when docker correlation is enabled;
    /// a failed lookup aborts the session before anything is written.
    pub async fn run(&self, subject: Subject) -> Result<TraceSession, TraceError> {
        let container = if self.settings.docker {
            Some(self.container_name(subject).await?)
        } else {
            None
        };

        let timestamp = self.settings.timezone.format(Utc::now());
        let file_name = trace_file_name(subject, container.as_deref(), &timestamp);
        info!("[pid {}] trace will be written to {}", subject, file_name);

        let mut session = TraceSession::new(
            subject,
            self.settings.duration(),
            self.settings.dir.join(file_name),
            self.settings.dry_run,
        );
        let command =
            TraceCommand::for_subject(subject, self.application, &self.tracer, session.dry_run);
        session.execute(&command).await?;
        Ok(session)
    }

    async fn container_name(&self, subject: Subject) -> Result<String, TraceError> {
        let resolver = Arc::clone(&self.resolver);
        let lookup = tokio::task::spawn_blocking(move || resolver.container_name(subject))
            .await
            .map_err(|e| TraceError::ContainerLookup(SamplingError::Task(e.to_string())))?;
        lookup.map_err(|e| {
            error!("[pid {}] failed to get container name for process", subject);
            TraceError::ContainerLookup(e)
        })
    }
}

/// `{container}-{pid}-{timestamp}.trace`, or `{pid}-{timestamp}.trace`
pub fn trace_file_name(subject: Subject, container: Option<&str>, timestamp: &str) -> String {
    match container {
        Some(container) => format!("{}-{}-{}.trace", container, subject, timestamp),
        None => format!("{}-{}.trace", subject, timestamp),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collectors::MockContainerResolver;
    use std::time::Instant;
    use tempfile::TempDir;

    fn session_in(dir: &TempDir, duration: Duration) -> TraceSession {
        TraceSession::new(
            Subject(4242),
            duration,
            dir.path().join("traces").join("4242-test.trace"),
            false,
        )
    }

    fn runner(dir: &TempDir, docker: bool, resolver: MockContainerResolver) -> TraceRunner {
        let mut config = Config::default();
        config.trace.dir = dir.path().join("out");
        config.trace.docker = docker;
        config.trace.dry_run = true;
        TraceRunner::new(&config, Arc::new(resolver))
    }

    #[test]
    fn test_php_command_arguments() {
        let command = TraceCommand::for_subject(
            Subject(4242),
            Application::Php,
            &TracerConfig::default(),
            false,
        );
        assert_eq!(command.program(), "phpspy");
        assert_eq!(
            command.to_string(),
            "phpspy -V74 -p 4242 -T 1 -s 10101010 -H 99 -l 0"
        );
    }

    #[test]
    fn test_dry_run_command_is_inert() {
        let command = TraceCommand::for_subject(
            Subject(4242),
            Application::Php,
            &TracerConfig::default(),
            true,
        );
        assert_eq!(command, TraceCommand::new("echo", ["dryrun"]));
    }

    #[test]
    fn test_trace_file_name() {
        assert_eq!(
            trace_file_name(Subject(7), None, "2024-03-01T12:30:00Z"),
            "7-2024-03-01T12:30:00Z.trace"
        );
        assert_eq!(
            trace_file_name(Subject(7), Some("web-1"), "2024-03-01T12:30:00Z"),
            "web-1-7-2024-03-01T12:30:00Z.trace"
        );
    }

    #[tokio::test]
    async fn test_tool_past_bound_is_killed_successfully() {
        let dir = TempDir::new().unwrap();
        let mut session = session_in(&dir, Duration::from_millis(200));

        let start = Instant::now();
        let result = session
            .execute(&TraceCommand::new("sleep", ["30"]))
            .await;

        assert!(result.is_ok(), "unexpected error: {:?}", result);
        assert_eq!(session.state, SessionState::KilledAtBound);
        assert!(start.elapsed() < Duration::from_secs(10));
    }

    #[tokio::test]
    async fn test_early_clean_exit_is_flagged() {
        let dir = TempDir::new().unwrap();
        let mut session = session_in(&dir, Duration::from_secs(30));

        session
            .execute(&TraceCommand::new("sh", ["-c", "echo out; echo err >&2"]))
            .await
            .unwrap();

        assert_eq!(session.state, SessionState::ExitedEarly);
        let written = std::fs::read_to_string(&session.output_path).unwrap();
        assert!(written.contains("out"));
        assert!(written.contains("err"));
    }

    #[tokio::test]
    async fn test_early_failed_exit_is_runtime_error() {
        let dir = TempDir::new().unwrap();
        let mut session = session_in(&dir, Duration::from_secs(30));

        let err = session
            .execute(&TraceCommand::new("sh", ["-c", "exit 3"]))
            .await
            .unwrap_err();

        match err {
            TraceError::Runtime(status) => assert_eq!(status.code(), Some(3)),
            other => panic!("expected Runtime error, got {:?}", other),
        }
        assert!(matches!(session.state, SessionState::Failed(status) if status.code() == Some(3)));
    }

    #[tokio::test]
    async fn test_spawn_failure_is_not_retried() {
        let dir = TempDir::new().unwrap();
        let mut session = session_in(&dir, Duration::from_secs(30));

        let err = session
            .execute(&TraceCommand::new("/nonexistent/tracer", Vec::<String>::new()))
            .await
            .unwrap_err();

        assert!(matches!(err, TraceError::Spawn { .. }));
        assert_eq!(session.state, SessionState::NotStarted);
        // The output file is created before the spawn attempt
        assert!(session.output_path.exists());
    }

    #[tokio::test]
    async fn test_output_dir_failure() {
        let dir = TempDir::new().unwrap();
        let blocker = dir.path().join("not-a-dir");
        std::fs::write(&blocker, b"").unwrap();
        let mut session = TraceSession::new(
            Subject(1),
            Duration::from_secs(1),
            blocker.join("1.trace"),
            true,
        );

        let err = session
            .execute(&TraceCommand::new("echo", ["dryrun"]))
            .await
            .unwrap_err();
        assert!(matches!(err, TraceError::OutputDir { .. }));
    }

    #[tokio::test]
    async fn test_runner_dry_run_writes_file() {
        let dir = TempDir::new().unwrap();
        let mut resolver = MockContainerResolver::new();
        resolver.expect_container_name().never();
        let runner = runner(&dir, false, resolver);

        let session = runner.run(Subject(4242)).await.unwrap();

        assert!(session.dry_run);
        assert_eq!(session.state, SessionState::ExitedEarly);
        let file_name = session.output_path.file_name().unwrap().to_str().unwrap();
        assert!(file_name.starts_with("4242-"));
        assert!(file_name.ends_with("Z.trace"));
        assert_eq!(
            std::fs::read_to_string(&session.output_path).unwrap().trim(),
            "dryrun"
        );
    }

    #[tokio::test]
    async fn test_runner_prefixes_container_name() {
        let dir = TempDir::new().unwrap();
        let mut resolver = MockContainerResolver::new();
        resolver
            .expect_container_name()
            .times(1)
            .returning(|_| Ok("web-1".to_string()));
        let runner = runner(&dir, true, resolver);

        let session = runner.run(Subject(4242)).await.unwrap();

        let file_name = session.output_path.file_name().unwrap().to_str().unwrap();
        assert!(file_name.starts_with("web-1-4242-"));
    }

    #[tokio::test]
    async fn test_runner_container_lookup_failure_aborts() {
        let dir = TempDir::new().unwrap();
        let mut resolver = MockContainerResolver::new();
        resolver
            .expect_container_name()
            .returning(|_| Err(SamplingError::Command("no container".to_string())));
        let runner = runner(&dir, true, resolver);

        let err = runner.run(Subject(4242)).await.unwrap_err();

        assert!(matches!(err, TraceError::ContainerLookup(_)));
        assert!(!dir.path().join("out").exists());
    }
}
