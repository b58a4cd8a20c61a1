mod commands;

use clap::Parser;
use tracing_subscriber::EnvFilter;
use xrf_core::domain::XrfError;

const PROGRAM_NAME: &str = "xrf-maps";

pub fn run_from_env() -> i32 {
    let args: Vec<String> = std::env::args().skip(1).collect();
    match run(args) {
        Ok(code) => code,
        Err(error) => {
            let xrf_error = error.as_xrf_error();
            eprintln!("{}", xrf_error.diagnostic_line());
            if let Some(summary_line) = xrf_error.fatal_exit_line() {
                eprintln!("{}", summary_line);
            }
            xrf_error.exit_code()
        }
    }
}

pub fn run<I, S>(args: I) -> Result<i32, CliError>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let full_args = std::iter::once(PROGRAM_NAME.to_string())
        .chain(args.into_iter().map(Into::into))
        .collect::<Vec<_>>();
    parse_and_dispatch(full_args)
}

fn parse_and_dispatch(args: Vec<String>) -> Result<i32, CliError> {
    match Cli::try_parse_from(&args) {
        Ok(cli) => {
            init_tracing(&cli.log_level);
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

fn init_tracing(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    // A subscriber may already be installed when `run` is called more than once.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

#[derive(Parser)]
#[command(name = PROGRAM_NAME, about = "XRF per-pixel spectral fitting engine")]
struct Cli {
    /// Log filter used when RUST_LOG is unset
    #[arg(long, global = true, default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: CliCommand,
}

#[derive(clap::Subcommand)]
enum CliCommand {
    /// Fit every pixel of a scan and write element maps
    Fit(commands::FitArgs),
    /// Print the records of a length-prefixed stream file
    DecodeStream(commands::DecodeStreamArgs),
}

fn dispatch_parsed(command: CliCommand) -> Result<i32, CliError> {
    match command {
        CliCommand::Fit(args) => commands::run_fit_command(args),
        CliCommand::DecodeStream(args) => commands::run_decode_stream_command(args),
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error("{0}")]
    Usage(String),
    #[error("{0}")]
    Compute(XrfError),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl From<XrfError> for CliError {
    fn from(error: XrfError) -> Self {
        Self::Compute(error)
    }
}

impl CliError {
    fn as_xrf_error(&self) -> XrfError {
        match self {
            Self::Usage(message) => XrfError::input_validation("INPUT.CLI_USAGE", message.clone()),
            Self::Compute(error) => error.clone(),
            Self::Internal(error) => XrfError::io_system("IO.CLI", format!("{error:#}")),
        }
    }
}
