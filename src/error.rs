//! Unified error type.

/// The error type returned by apigate's fallible startup operations.
///
/// Per-request failures (404, 429, 504, ...) are expressed as HTTP
/// [`Response`](crate::Response) values, never as `Error`s. This type surfaces
/// infrastructure and misconfiguration failures: binding a port, loading the
/// config file, registering conflicting routes.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid socket address `{0}`")]
    InvalidAddress(String),

    #[error("invalid route `{path}`: {reason}")]
    InvalidRoute { path: String, reason: String },

    #[error("no {0} route tree registered")]
    MissingRouteTree(&'static str),

    #[error("config: {0}")]
    Config(String),
}

impl Error {
    pub(crate) fn invalid_route(path: &str, reason: impl ToString) -> Self {
        Self::InvalidRoute { path: path.to_owned(), reason: reason.to_string() }
    }

    pub(crate) fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }
}
