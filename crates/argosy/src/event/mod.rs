//! Framework, bundle, and service events.

use std::fmt;

use argosy_primitives::AnyMap;

use crate::bundle::Bundle;
use crate::service::ServiceReference;

pub(crate) mod listeners;

pub use listeners::{BundleListenerFn, FrameworkListenerFn, ListenerToken, ServiceListenerFn};

/// What happened to a bundle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BundleEventKind {
	Installed,
	Started,
	Stopping,
	Stopped,
	Uninstalled,
	Resolved,
	Unresolved,
}

impl fmt::Display for BundleEventKind {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let name = match self {
			Self::Installed => "installed",
			Self::Started => "started",
			Self::Stopping => "stopping",
			Self::Stopped => "stopped",
			Self::Uninstalled => "uninstalled",
			Self::Resolved => "resolved",
			Self::Unresolved => "unresolved",
		};
		write!(f, "{name}")
	}
}

/// A lifecycle event for a single bundle.
#[derive(Clone)]
pub struct BundleEvent {
	pub kind: BundleEventKind,
	/// The bundle the transition happened to.
	pub bundle: Bundle,
}

impl fmt::Debug for BundleEvent {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("BundleEvent")
			.field("kind", &self.kind)
			.field("bundle", &self.bundle.id())
			.finish()
	}
}

/// What happened to a service registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ServiceEventKind {
	/// The service was just registered.
	Registered,
	/// The service's properties were replaced.
	Modified,
	/// The service's properties were replaced and no longer match a
	/// listener's filter that previously matched.
	ModifiedEndMatch,
	/// The service is about to leave the registry; consumers should release
	/// their uses.
	Unregistering,
}

impl fmt::Display for ServiceEventKind {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let name = match self {
			Self::Registered => "registered",
			Self::Modified => "modified",
			Self::ModifiedEndMatch => "modified-endmatch",
			Self::Unregistering => "unregistering",
		};
		write!(f, "{name}")
	}
}

/// A service registry event.
#[derive(Clone)]
pub struct ServiceEvent {
	pub kind: ServiceEventKind,
	/// Reference to the registration the event is about.
	pub reference: ServiceReference,
	/// For [`ServiceEventKind::ModifiedEndMatch`], the property snapshot from
	/// before the mutation that broke the match. `None` for other kinds.
	pub previous_properties: Option<AnyMap>,
}

impl fmt::Debug for ServiceEvent {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("ServiceEvent")
			.field("kind", &self.kind)
			.field("service_id", &self.reference.service_id())
			.finish()
	}
}

/// Severity / kind of a framework-level event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrameworkEventKind {
	/// The framework finished starting.
	Started,
	Error,
	Warning,
	Info,
}

/// A framework-level diagnostic or milestone.
#[derive(Clone)]
pub struct FrameworkEvent {
	pub kind: FrameworkEventKind,
	/// The bundle the event is attributed to (the framework bundle for
	/// framework milestones).
	pub bundle: Option<Bundle>,
	/// Human-readable description; for errors, the rendered error.
	pub message: String,
}

impl fmt::Debug for FrameworkEvent {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("FrameworkEvent")
			.field("kind", &self.kind)
			.field("bundle", &self.bundle.as_ref().map(Bundle::id))
			.field("message", &self.message)
			.finish()
	}
}
