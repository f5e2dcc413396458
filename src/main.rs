//! Runs the gateway with the demo backends.
//!
//!   RUST_LOG=info cargo run -- --log-format pretty
//!
//! Try:
//!   curl -H 'X-Route-To: GQL' localhost:3000/api/v2/calls
//!   curl -X POST localhost:3000/api/v2/webhooks
//!   curl -H 'X-RateLimit-Me: 1' localhost:3000/api/v2/tasks
//!   curl localhost:3000/unknown/path

mod backends;

use std::path::PathBuf;
use std::process::ExitCode;

use apigate::{Error, Gateway, GatewayBuilder, GatewayConfig, LogFormat, Server, telemetry};
use clap::Parser;
use tracing::error;

#[derive(Debug, Parser)]
#[command(name = "apigate", version, about = "Header-routed API gateway")]
struct Args {
    /// TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Listener address, overriding the config file.
    #[arg(short, long)]
    bind: Option<String>,

    /// Log output format, overriding the config file.
    #[arg(long, value_enum)]
    log_format: Option<LogFormat>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    let config = match load_config(&args) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("apigate: {e}");
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = telemetry::init(config.log_format) {
        eprintln!("apigate: {e}");
        return ExitCode::FAILURE;
    }

    match run(config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}

fn load_config(args: &Args) -> Result<GatewayConfig, Error> {
    let mut config = match &args.config {
        Some(path) => GatewayConfig::from_file(path)?,
        None => GatewayConfig::default(),
    };
    if let Some(bind) = &args.bind {
        config.bind.clone_from(bind);
    }
    if let Some(format) = args.log_format {
        config.log_format = format;
    }
    config.validate()?;
    Ok(config)
}

async fn run(config: GatewayConfig) -> Result<(), Error> {
    let addr = config.bind_addr()?;
    let gateway: Gateway = GatewayBuilder::new(config)
        .primary(backends::primary())
        .secondary(backends::secondary())
        .build()?;

    Server::bind(addr).serve(gateway).await
}
