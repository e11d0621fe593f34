//! Bundles: installable units of code and metadata.

use std::fmt;
use std::sync::{Arc, Weak};

use argosy_primitives::AnyMap;
use parking_lot::{Condvar, Mutex};

use crate::bundle::activator::{ActivatorFactory, BundleActivator};
use crate::bundle::context::{BundleContext, ContextInner};
use crate::core_context::CoreContext;
use crate::error::Result;

pub mod activator;
pub mod context;
pub(crate) mod lifecycle;
pub(crate) mod registry;
#[cfg(test)]
mod tests;

/// Where a bundle is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BundleState {
	/// Installed but not yet resolved.
	Installed,
	/// Ready to start.
	Resolved,
	/// The activator's start hook is running.
	Starting,
	/// Running.
	Active,
	/// The activator's stop hook is running.
	Stopping,
	/// Removed from the framework. Terminal.
	Uninstalled,
}

impl BundleState {
	/// This state's bit for tracker state masks.
	pub const fn bit(self) -> u32 {
		match self {
			Self::Installed => 1 << 0,
			Self::Resolved => 1 << 1,
			Self::Starting => 1 << 2,
			Self::Active => 1 << 3,
			Self::Stopping => 1 << 4,
			Self::Uninstalled => 1 << 5,
		}
	}
}

impl fmt::Display for BundleState {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let name = match self {
			Self::Installed => "installed",
			Self::Resolved => "resolved",
			Self::Starting => "starting",
			Self::Active => "active",
			Self::Stopping => "stopping",
			Self::Uninstalled => "uninstalled",
		};
		write!(f, "{name}")
	}
}

/// Mutable lifecycle data behind the per-bundle state mutex.
pub(crate) struct Lifecycle {
	pub state: BundleState,
	/// True while a start/stop transition runs its activator; serializes
	/// transitions without holding the mutex across user code.
	pub in_transition: bool,
	/// The bundle's context; `Some` from STARTING until the exit from
	/// STOPPING.
	pub context: Option<Arc<ContextInner>>,
	/// The live activator while ACTIVE.
	pub activator: Option<Box<dyn BundleActivator>>,
}

/// One installed bundle's record.
pub(crate) struct BundleInner {
	/// Framework-assigned id; the framework bundle is 0.
	pub id: u64,
	/// Opaque install-time location. Unique among installed bundles.
	pub location: String,
	pub symbolic_name: String,
	pub version: String,
	/// Immutable manifest handed over at install.
	pub manifest: AnyMap,
	pub core: Weak<CoreContext>,
	pub lifecycle: Mutex<Lifecycle>,
	/// Signals the end of an in-flight transition.
	pub transition_done: Condvar,
	/// Produces a fresh activator for each start. Resolved by the bundle
	/// loader; absent for bundles without one.
	pub activator_factory: Option<ActivatorFactory>,
}

impl BundleInner {
	pub fn state(&self) -> BundleState {
		self.lifecycle.lock().state
	}

	pub fn core(&self) -> Option<Arc<CoreContext>> {
		self.core.upgrade()
	}
}

impl fmt::Debug for BundleInner {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Bundle")
			.field("id", &self.id)
			.field("symbolic_name", &self.symbolic_name)
			.field("state", &self.state())
			.finish()
	}
}

/// Shared-ownership handle to an installed bundle.
///
/// Handles stay usable after uninstall for identity queries; lifecycle
/// operations then fail with an invalid-state error.
#[derive(Clone)]
pub struct Bundle {
	pub(crate) inner: Arc<BundleInner>,
}

impl Bundle {
	pub(crate) fn from_inner(inner: Arc<BundleInner>) -> Self {
		Self { inner }
	}

	/// The framework-assigned bundle id. The framework itself is 0.
	pub fn id(&self) -> u64 {
		self.inner.id
	}

	/// The location string the bundle was installed from.
	pub fn location(&self) -> &str {
		&self.inner.location
	}

	pub fn symbolic_name(&self) -> &str {
		&self.inner.symbolic_name
	}

	pub fn version(&self) -> &str {
		&self.inner.version
	}

	/// The immutable manifest.
	pub fn manifest(&self) -> &AnyMap {
		&self.inner.manifest
	}

	pub fn state(&self) -> BundleState {
		self.inner.state()
	}

	/// The bundle's context while it is STARTING, ACTIVE, or STOPPING.
	pub fn context(&self) -> Option<BundleContext> {
		let lifecycle = self.inner.lifecycle.lock();
		lifecycle
			.context
			.as_ref()
			.filter(|ctx| ctx.is_valid())
			.map(|ctx| BundleContext::new(ctx.clone()))
	}

	/// Starts the bundle: RESOLVED -> STARTING -> ACTIVE.
	///
	/// A failing or panicking activator sends the bundle back to RESOLVED
	/// and surfaces both a framework error event and an `Err` here. Starting
	/// an ACTIVE bundle is a no-op.
	pub fn start(&self) -> Result<()> {
		lifecycle::start(&self.inner)
	}

	/// Stops the bundle: ACTIVE -> STOPPING -> RESOLVED.
	///
	/// Activator failures are reported as framework error events; the
	/// transition to RESOLVED completes regardless. Stopping a bundle that
	/// is not ACTIVE is a no-op.
	pub fn stop(&self) -> Result<()> {
		lifecycle::stop(&self.inner)
	}

	/// Uninstalls the bundle, stopping it first if needed. Terminal.
	pub fn uninstall(&self) -> Result<()> {
		lifecycle::uninstall(&self.inner)
	}
}

impl PartialEq for Bundle {
	fn eq(&self, other: &Self) -> bool {
		Arc::ptr_eq(&self.inner, &other.inner)
	}
}

impl Eq for Bundle {}

impl fmt::Debug for Bundle {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		self.inner.fmt(f)
	}
}
