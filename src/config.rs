//! Gateway configuration.
//!
//! Every field has a default, so an empty file (or no file) yields the
//! stock gateway: `/api/v2` prefix, `X-Route-To: GQL` selects the secondary
//! tree, `X-Request-Id` carries the correlation id, `X-RateLimit-Me` trips the
//! rate gate.
//!
//! ```toml
//! bind = "0.0.0.0:3000"
//! prefix = "/api/v2"
//! route_header = "x-route-to"
//! route_token = "GQL"
//! dispatch_timeout_ms = 5000
//! max_body_size = 2097152
//! log_format = "pretty"
//! ```

use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use http::header::HeaderName;
use serde::Deserialize;

use crate::error::Error;

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GatewayConfig {
    /// Listener address, `host:port`.
    pub bind: String,
    /// Path scope the gateway serves; everything else is answered 404.
    pub prefix: String,
    /// Header carrying the routing hint.
    pub route_header: String,
    /// Hint value (ASCII case-insensitive) that selects the secondary tree.
    pub route_token: String,
    pub request_id_header: String,
    /// Non-empty value on this header rejects the request with 429.
    pub rate_limit_header: String,
    /// Deadline for a backend handler. Unset means no deadline.
    pub dispatch_timeout_ms: Option<u64>,
    /// Largest request body read into memory, in bytes. Larger bodies are
    /// answered 413.
    pub max_body_size: usize,
    pub log_format: LogFormat,
}

/// 2 MiB.
pub const DEFAULT_MAX_BODY_SIZE: usize = 2 * 1024 * 1024;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Json,
    Pretty,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:3000".to_owned(),
            prefix: "/api/v2".to_owned(),
            route_header: "x-route-to".to_owned(),
            route_token: "GQL".to_owned(),
            request_id_header: "x-request-id".to_owned(),
            rate_limit_header: "x-ratelimit-me".to_owned(),
            dispatch_timeout_ms: None,
            max_body_size: DEFAULT_MAX_BODY_SIZE,
            log_format: LogFormat::Json,
        }
    }
}

impl GatewayConfig {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, Error> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::config(format!("failed to read {}: {e}", path.display())))?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self, Error> {
        toml::from_str(content).map_err(|e| Error::config(format!("invalid TOML: {e}")))
    }

    /// Checks every field that would otherwise fail on first use.
    pub fn validate(&self) -> Result<(), Error> {
        if !self.prefix.starts_with('/') || self.prefix.len() < 2 || self.prefix.ends_with('/') {
            return Err(Error::config(format!(
                "prefix `{}` must start with `/`, name at least one segment and not end with `/`",
                self.prefix
            )));
        }
        if self.route_token.is_empty() {
            return Err(Error::config("route_token must not be empty"));
        }
        if self.dispatch_timeout_ms == Some(0) {
            return Err(Error::config("dispatch_timeout_ms must be positive"));
        }
        if self.max_body_size == 0 {
            return Err(Error::config("max_body_size must be positive"));
        }
        self.route_header()?;
        self.request_id_header()?;
        self.rate_limit_header()?;
        self.bind_addr()?;
        Ok(())
    }

    pub fn bind_addr(&self) -> Result<SocketAddr, Error> {
        self.bind.parse().map_err(|_| Error::InvalidAddress(self.bind.clone()))
    }

    pub fn dispatch_timeout(&self) -> Option<Duration> {
        self.dispatch_timeout_ms.map(Duration::from_millis)
    }

    pub(crate) fn route_header(&self) -> Result<HeaderName, Error> {
        header_name("route_header", &self.route_header)
    }

    pub(crate) fn request_id_header(&self) -> Result<HeaderName, Error> {
        header_name("request_id_header", &self.request_id_header)
    }

    pub(crate) fn rate_limit_header(&self) -> Result<HeaderName, Error> {
        header_name("rate_limit_header", &self.rate_limit_header)
    }
}

fn header_name(field: &str, value: &str) -> Result<HeaderName, Error> {
    HeaderName::try_from(value)
        .map_err(|_| Error::config(format!("{field} `{value}` is not a valid header name")))
}
