//! Command-line entry point for the risk and credit engines.
//!
//! Reads one JSON request (from `--input` or stdin), dispatches it against an optional JSON
//! configuration and prints the JSON response. Exit code 2 marks a rejected request, 1 an engine
//! or I/O failure.
//!
//! ```bash
//! echo '{"operation": "credit_spread", "risk_free_rate": 0.03,
//!        "probability_of_default": 0.02, "maturity": 5}' | ferric-risk --pretty
//! ```

use std::io::Read;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing::{debug, error};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use ferric_risk::api::{Engine, Request};
use ferric_risk::core::{EngineConfig, RiskError};

#[derive(Parser)]
#[command(name = "ferric-risk")]
#[command(version, about = "VaR and credit-risk calculations over JSON requests", long_about = None)]
struct Cli {
    /// JSON request file; stdin when omitted
    #[arg(short, long)]
    input: Option<PathBuf>,

    /// JSON engine configuration overriding the defaults
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Pretty-print the response
    #[arg(long)]
    pretty: bool,

    /// Log filter used when RUST_LOG is unset
    #[arg(long, default_value = "warn")]
    log_level: String,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&cli.log_level)),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    match run(&cli) {
        Ok(output) => {
            println!("{output}");
            ExitCode::SUCCESS
        }
        Err(err) => {
            error!(%err, "request failed");
            eprintln!("error: {err}");
            if err.is_client_error() {
                ExitCode::from(2)
            } else {
                ExitCode::from(1)
            }
        }
    }
}

fn run(cli: &Cli) -> Result<String, RiskError> {
    let config = match &cli.config {
        Some(path) => EngineConfig::from_path(path)?,
        None => EngineConfig::default(),
    };

    let raw = match &cli.input {
        Some(path) => std::fs::read_to_string(path).map_err(|e| {
            RiskError::invalid_parameter("input", format!("{}: {e}", path.display()))
        })?,
        None => {
            let mut buf = String::new();
            std::io::stdin()
                .read_to_string(&mut buf)
                .map_err(|e| RiskError::invalid_parameter("input", e.to_string()))?;
            buf
        }
    };

    let request = Request::from_json_str(&raw)?;
    debug!(operation = request.operation(), "request parsed");
    let response = Engine::new(config).dispatch(request)?;
    response
        .to_json(cli.pretty)
        .map_err(|e| RiskError::Config(format!("response serialization: {e}")))
}
