//! Process-wide `tracing` subscriber.
//!
//! The level filter comes from `RUST_LOG` (default `info`). Access records
//! are emitted on target `apigate::access`, so
//! `RUST_LOG=warn,apigate::access=info` keeps only the access log.

use tracing_subscriber::EnvFilter;

use crate::config::LogFormat;
use crate::error::Error;

pub fn init(format: LogFormat) -> Result<(), Error> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    let installed = match format {
        LogFormat::Json => builder.json().try_init(),
        LogFormat::Pretty => builder.pretty().try_init(),
    };
    installed.map_err(|e| Error::config(format!("failed to install tracing subscriber: {e}")))
}
