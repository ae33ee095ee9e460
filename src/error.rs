use std::io;

use thiserror::Error;

/// Failures tied to a single request. Each one is answered with an HTTP
/// error response and leaves the connection eligible for keep-alive.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum RequestError {
    #[error("malformed request")]
    BadRequest,
    #[error("requested resource not found")]
    NotFound,
    #[error("requested resource is not world-readable")]
    Forbidden,
    #[error("internal error while serving the request")]
    Internal,
}

/// Failures that end the connection without a response.
#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("read buffer is full")]
    RequestTooLarge,
    #[error("peer closed the connection")]
    PeerClosed,
    #[error("transport error: {0}")]
    Transport(#[from] io::Error),
    #[error("response headers exceed the write buffer")]
    ResponseTooLarge,
    #[error("connection slot has no socket")]
    NotConnected,
    #[error("request processing panicked")]
    WorkerPanic,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config file: {0}")]
    Io(#[from] io::Error),
    #[error("cannot parse config file: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Error)]
pub enum ServerError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: std::net::SocketAddr,
        #[source]
        source: io::Error,
    },
    #[error("server is not bound")]
    NotBound,
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

pub type ConnectionResult<T> = Result<T, ConnectionError>;
