use clap::Parser;
use env_logger::Target;
use log::{error, LevelFilter};
use phunter::collectors::container::find_container_name;
use phunter::Subject;

/// Print the docker container a process runs in
#[derive(Parser)]
#[command(
    name = "container_name",
    about = "Print the name of the docker container running a process"
)]
struct Cli {
    /// Process id to look up
    #[arg(long, value_name = "PID", allow_negative_numbers = true)]
    pid: Option<i64>,
}

impl Cli {
    /// Validate the pid argument
    ///
    /// # Returns
    ///
    /// The subject to look up, or an error message if the pid is missing,
    /// negative or out of range
    fn subject(&self) -> Result<Subject, String> {
        let pid = self
            .pid
            .ok_or_else(|| "PID must be specified and be >= 0".to_string())?;
        u32::try_from(pid)
            .map(Subject)
            .map_err(|_| format!("PID must be specified and be >= 0, got {}", pid))
    }
}

fn main() {
    // stdout carries only the container name
    env_logger::Builder::new()
        .filter_level(LevelFilter::Info)
        .parse_default_env()
        .target(Target::Stderr)
        .init();

    let cli = Cli::parse();
    let subject = match cli.subject() {
        Ok(subject) => subject,
        Err(e) => {
            error!("{}", e);
            std::process::exit(1);
        }
    };

    match find_container_name(subject) {
        Ok(name) => println!("{}", name),
        Err(e) => {
            error!("Failed to find container name for {}: {}", subject, e);
            std::process::exit(1);
        }
    }
}
