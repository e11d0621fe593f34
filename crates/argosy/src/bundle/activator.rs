//! The activator contract.

use crate::bundle::context::BundleContext;
use crate::error::BoxError;

/// User code run at bundle start and stop.
///
/// Both hooks run on the caller's thread with no framework lock held. Errors
/// and panics are contained by the lifecycle controller: they become
/// framework error events and the bundle falls back to RESOLVED.
pub trait BundleActivator: Send {
	/// Called during STARTING. An error aborts the start.
	fn start(&mut self, context: &BundleContext) -> Result<(), BoxError>;

	/// Called during STOPPING. An error is reported but never prevents the
	/// stop from completing.
	fn stop(&mut self, context: &BundleContext) -> Result<(), BoxError>;
}

/// Produces a fresh activator for each start.
///
/// The bundle loader resolves this callable from the bundle binary by a
/// well-known symbol; the framework only ever sees the callable.
pub type ActivatorFactory = Box<dyn Fn() -> Box<dyn BundleActivator> + Send + Sync>;
