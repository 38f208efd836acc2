use anyhow::{bail, Context};
use clap::Parser;
use log::{error, info, warn};
use phunter::config::Config;
use phunter::{logging, server, system, Hunter};
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Command-line arguments for the process hunter
#[derive(Parser)]
#[command(
    name = "phunter",
    about = "Process hunter - traces processes that stay above CPU or memory thresholds",
    long_about = "Periodically samples CPU and resident memory of every process matching a \
                  configured name and runs a bounded trace against any process whose usage \
                  persistently exceeds its thresholds."
)]
struct Cli {
    /// Path to configuration file
    #[arg(
        short,
        long,
        value_name = "FILE",
        env = "PHUNTER_CONFIG_FILE",
        help = "Configuration file path (TOML format)"
    )]
    config: PathBuf,

    /// Enable verbose logging
    #[arg(short, long, help = "Enable verbose logging output (forces DEBUG level)")]
    verbose: bool,
}

impl Cli {
    /// Validate the CLI arguments
    ///
    /// # Returns
    ///
    /// `Ok(())` if all arguments are valid, `Err(String)` with error message otherwise
    fn validate(&self) -> Result<(), String> {
        if !self.config.is_file() {
            return Err(format!(
                "Configuration path is not a file: {}",
                self.config.display()
            ));
        }
        if self.config.extension().is_some_and(|ext| ext != "toml") {
            warn!(
                "Configuration file does not have .toml extension: {}",
                self.config.display()
            );
        }
        Ok(())
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    cli.validate().map_err(anyhow::Error::msg)?;

    let config = Config::from_file(&cli.config).with_context(|| {
        format!("failed to load configuration from {}", cli.config.display())
    })?;
    config.log_summary();

    let missing = system::missing_binaries(&config);
    if !missing.is_empty() {
        bail!("missing required binaries: {}", missing.join(", "));
    }

    let shutdown = CancellationToken::new();
    let signal_token = shutdown.clone();
    ctrlc::set_handler(move || {
        info!("Received interrupt signal (SIGINT), shutting down gracefully...");
        signal_token.cancel();
    })
    .context("failed to install SIGINT handler")?;

    let hunter = Arc::new(Hunter::with_system_probe(&config));
    let hunting = tokio::spawn(hunter.run(shutdown.clone()));

    let served = server::serve(config.server.listen, &config.trace.dir, shutdown.clone()).await;
    if served.is_err() {
        // Stop the hunter as well
        shutdown.cancel();
    }

    hunting.await.context("hunter task failed")?;
    served.with_context(|| format!("http server on {} failed", config.server.listen))?;

    info!("phunter shutdown complete");
    Ok(())
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    info!("Starting phunter");

    if let Err(e) = run(cli).await {
        error!("{:#}", e);
        std::process::exit(1);
    }
}
