//! Error types.
//!
//! Request-level failures (404, 400, 500, …) are expressed as HTTP
//! [`Response`](crate::Response) values, never as errors. The types here
//! surface the two other classes of failure: infrastructure ([`Error`]) and
//! route construction ([`RouteError`]).

use tracing_subscriber::util::TryInitError;

use crate::config::ConfigError;
use crate::method::Method;
use crate::schema::SchemaError;

/// The error type returned by waypost's fallible process-level operations:
/// loading configuration, installing the log subscriber, binding a port.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("logging: {0}")]
    Telemetry(#[from] TryInitError),
}

/// A route definition could not be built or loaded.
///
/// These are programmer errors caught at startup. The registry logs them and
/// leaves the offending route out of the table; they never reach a client.
#[derive(Debug, thiserror::Error)]
pub enum RouteError {
    #[error("handler for {0} already defined")]
    DuplicateHandler(Method),

    #[error("schemas for {0} already defined")]
    DuplicateSchema(Method),

    #[error(transparent)]
    Schema(#[from] SchemaError),

    /// Raised by a route loader for any other reason (missing environment,
    /// unreadable asset, …).
    #[error("{0}")]
    Load(String),
}
