use std::fmt;
use std::sync::Arc;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, Error>;

/// SQL state classes that mark a connection as unusable regardless of the
/// query that triggered them.
const FATAL_SQLSTATES: &[&str] = &["57P01", "57P02", "57P03", "01002"];

/// Returns `true` if `sqlstate` indicates the underlying transport (not just
/// the statement) is broken and the connection must never be reused.
///
/// Any state in the `08` class ("connection exception") is fatal, as are a
/// handful of vendor-specific shutdown/admin-disconnect codes.
pub fn is_fatal_sqlstate(sqlstate: &str) -> bool {
    sqlstate.starts_with("08") || FATAL_SQLSTATES.contains(&sqlstate)
}

/// A driver-reported SQL error, carrying an optional SQLSTATE for
/// classification by [`is_fatal_sqlstate`].
#[derive(Debug, Clone)]
pub struct SqlError {
    pub message: String,
    pub sqlstate: Option<String>,
}

impl SqlError {
    pub fn new(message: impl Into<String>, sqlstate: Option<String>) -> Self {
        Self {
            message: message.into(),
            sqlstate,
        }
    }

    pub fn is_fatal(&self) -> bool {
        self.sqlstate
            .as_deref()
            .map(is_fatal_sqlstate)
            .unwrap_or(false)
    }
}

impl fmt::Display for SqlError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.sqlstate {
            Some(state) => write!(f, "{} (sqlstate {state})", self.message),
            None => f.write_str(&self.message),
        }
    }
}

impl std::error::Error for SqlError {}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("missing required configuration key: {0}")]
    ConfigMissing(&'static str),

    #[error("invalid configuration: {0}")]
    ConfigInvalid(String),

    #[error("failed to establish a connection: {0}")]
    DriverError(Arc<dyn std::error::Error + Send + Sync>),

    #[error(
        "timed out waiting for a connection (idle={idle}/{max}, total={total}){}",
        last_error.as_ref().map(|e| format!(": last error: {e}")).unwrap_or_default()
    )]
    PoolExhausted {
        idle: u32,
        total: u32,
        max: u32,
        last_error: Option<Arc<Error>>,
    },

    #[error("connection closed")]
    ConnectionClosed,

    #[error("pool is shut down")]
    PoolClosed,

    #[error("fatal transport error, connection discarded: {0}")]
    TransportFatal(#[source] SqlError),

    #[error("{0}")]
    Transient(#[source] SqlError),

    #[error("acquire cancelled")]
    Cancelled,
}

impl Error {
    /// Wraps an arbitrary driver error (e.g. a connect failure) for storage
    /// as the pool's latest diagnostic error.
    pub fn driver(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Error::DriverError(Arc::new(err))
    }

    /// Classifies a raw SQL error as fatal or transient, wrapping it in the
    /// matching variant.
    pub fn from_sql(err: SqlError) -> Self {
        if err.is_fatal() {
            Error::TransportFatal(err)
        } else {
            Error::Transient(err)
        }
    }

    /// `true` if this error, seen on a live connection, should force that
    /// connection closed rather than returning it to the idle queue.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::TransportFatal(_))
    }
}
