//! Error types for framework operations.

use argosy_primitives::FilterError;

/// Boxed error type returned by user code (activators, factories,
/// customizers).
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Errors surfaced by framework operations.
///
/// Errors raised by user code (activators, listeners, factories, hooks,
/// customizers) never appear here directly: they are caught at the calling
/// boundary and reported as [`FrameworkEvent`](crate::event::FrameworkEvent)
/// errors instead.
#[derive(Debug, thiserror::Error)]
pub enum Error {
	/// A malformed argument: empty interface set, reserved property key with
	/// the wrong type, dead service reference.
	#[error("invalid argument: {0}")]
	InvalidArgument(String),

	/// The operation is illegal in the current state: invalidated bundle
	/// context, lifecycle transition from a wrong source state, repeated
	/// unregister.
	#[error("invalid state: {0}")]
	InvalidState(String),

	/// No service or bundle matched a query that required one.
	#[error("not found: {0}")]
	NotFound(String),

	/// The filter string did not parse.
	#[error("invalid filter: {0}")]
	InvalidFilter(#[from] FilterError),

	/// A bundle activator failed; the bundle fell back to RESOLVED.
	#[error("bundle activator failed: {0}")]
	Activator(String),

	/// Filesystem trouble while managing a bundle's data directory.
	#[error("I/O error: {0}")]
	Io(#[from] std::io::Error),

	/// An internal invariant was broken. Always a framework bug.
	#[error("internal error: {0}")]
	Internal(String),
}

/// Result alias for framework operations.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
	pub(crate) fn invalid_context() -> Self {
		Error::InvalidState("the bundle context is no longer valid".into())
	}
}
