use std::future::Future;

use crate::error::SqlError;

/// A single outstanding statement/cursor opened against a [`RawConnection`].
///
/// The proxy tracks every `Statement` it opens so that closing the
/// connection can close its children in reverse order.
pub trait Statement: Send {
    /// Closes this statement. Errors are classified by the proxy the same
    /// way as any other SQL error, but never abort the connection's own
    /// close sequence.
    fn close(&mut self) -> impl Future<Output = Result<(), SqlError>> + Send + '_;
}

/// The capability surface a driver connection must expose to be managed by
/// the pool.
///
/// This is the non-reflective stand-in for the dynamic-proxy capability set
/// described by the source: rather than intercepting an arbitrary method
/// set at runtime, the pool wraps any type implementing this trait and
/// hand-delegates everything it doesn't need to intercept.
pub trait RawConnection: Send + 'static {
    type Statement: Statement;

    /// Opens a statement/cursor. Implementations should route SQL errors
    /// through [`SqlError`] so the proxy can classify them.
    fn prepare(
        &mut self,
        query: &str,
    ) -> impl Future<Output = Result<Self::Statement, SqlError>> + Send + '_;

    /// Runs a liveness probe query and reports whether the connection is
    /// still usable. Used by [`crate::health::HealthProbe`] implementations
    /// that don't have a cheaper built-in ping.
    fn execute_probe(
        &mut self,
        query: &str,
    ) -> impl Future<Output = Result<(), SqlError>> + Send + '_;

    /// Terminates the underlying transport. Called when the pool discards a
    /// connection (eviction, fatal error, shutdown).
    fn close(self) -> impl Future<Output = Result<(), SqlError>> + Send + 'static;
}
