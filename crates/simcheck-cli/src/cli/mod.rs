mod commands;
mod helpers;

use clap::Parser;
use simcheck_core::domain::CheckError;
use tracing_subscriber::EnvFilter;

pub fn run_from_env() -> i32 {
    let args: Vec<String> = std::env::args().skip(1).collect();

    match run(args) {
        Ok(code) => code,
        Err(error) => {
            let check_error = error.as_check_error();
            eprintln!("{}", check_error.diagnostic_line());
            if let Some(summary_line) = check_error.fatal_exit_line() {
                eprintln!("{}", summary_line);
            }
            check_error.exit_code()
        }
    }
}

pub fn run<I, S>(args: I) -> Result<i32, CliError>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let full_args = std::iter::once("simcheck".to_string())
        .chain(args.into_iter().map(Into::into))
        .collect::<Vec<_>>();
    parse_and_dispatch(full_args)
}

fn parse_and_dispatch(args: Vec<String>) -> Result<i32, CliError> {
    match Cli::try_parse_from(&args) {
        Ok(cli) => {
            init_tracing(cli.verbose);
            dispatch_parsed(cli.command)
        }
        Err(err) => match err.kind() {
            clap::error::ErrorKind::DisplayHelp | clap::error::ErrorKind::DisplayVersion => {
                print!("{}", err);
                Ok(0)
            }
            _ => Err(CliError::Usage(err.to_string())),
        },
    }
}

/// Stderr subscriber; `RUST_LOG` wins over the `-v` count.
fn init_tracing(verbose: u8) {
    let default_level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    // A subscriber may already be installed when `run` is called repeatedly.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

#[derive(Parser)]
#[command(
    name = "simcheck",
    version,
    about = "Regression checks for simulation logs"
)]
struct Cli {
    /// Raise log level on stderr (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: CliCommand,
}

#[derive(clap::Subcommand)]
enum CliCommand {
    /// Compare two logs bit-exactly and under a tolerance schedule
    Compare(commands::CompareArgs),
    /// Run a harness check against a finished simulation
    Check(commands::CheckArgs),
    /// Report timings of finished runs
    #[command(subcommand)]
    Timings(commands::TimingsCommand),
    /// Read or rewrite namelist parameters
    #[command(subcommand)]
    Namelist(commands::NamelistCommand),
}

fn dispatch_parsed(command: CliCommand) -> Result<i32, CliError> {
    match command {
        CliCommand::Compare(args) => commands::run_compare_command(args),
        CliCommand::Check(args) => commands::run_check_command(args),
        CliCommand::Timings(command) => commands::run_timings_command(command),
        CliCommand::Namelist(command) => commands::run_namelist_command(command),
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error("{0}")]
    Usage(String),
    #[error("{0}")]
    Compute(CheckError),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl CliError {
    pub fn as_check_error(&self) -> CheckError {
        match self {
            Self::Usage(message) => CheckError::input_validation("INPUT.CLI_USAGE", message),
            Self::Compute(error) => error.clone(),
            Self::Internal(error) => CheckError::io_system("IO.CLI", format!("{error:#}")),
        }
    }
}

impl From<CheckError> for CliError {
    fn from(error: CheckError) -> Self {
        Self::Compute(error)
    }
}
