//! The core context: the hub owning the registries and shared facilities.

use std::path::PathBuf;
use std::sync::Arc;

use argosy_primitives::{AnyMap, Value};
use tracing::warn;

use crate::bundle::activator::ActivatorFactory;
use crate::bundle::registry::BundleRegistry;
use crate::bundle::{Bundle, BundleInner, BundleState, Lifecycle};
use crate::constants;
use crate::error::{Error, Result};
use crate::event::listeners::ListenerHub;
use crate::event::{BundleEvent, BundleEventKind, FrameworkEvent, FrameworkEventKind};
use crate::service::registry::ServiceRegistry;
use crate::util::contain;

/// Long-lived hub owning the service registry, the bundle registry, the
/// listener tables, and the framework properties. Every bundle context
/// operates through it.
pub(crate) struct CoreContext {
	/// Framework properties supplied at construction. Immutable.
	pub properties: AnyMap,
	/// Base directory for per-bundle data directories.
	pub storage_root: PathBuf,
	pub bundles: BundleRegistry,
	pub services: ServiceRegistry,
	pub listeners: ListenerHub,
}

impl CoreContext {
	pub fn new(properties: AnyMap, storage_root: PathBuf) -> Arc<Self> {
		Arc::new(Self {
			properties,
			storage_root,
			bundles: BundleRegistry::new(),
			services: ServiceRegistry::new(),
			listeners: ListenerHub::new(),
		})
	}

	/// Installs a bundle from a manifest, or returns the bundle already
	/// installed at `location`. New installs resolve immediately.
	pub fn install(
		core: &Arc<Self>,
		location: &str,
		manifest: AnyMap,
		activator_factory: Option<ActivatorFactory>,
	) -> Result<Bundle> {
		let symbolic_name = manifest
			.get(constants::BUNDLE_SYMBOLIC_NAME)
			.and_then(Value::as_str)
			.ok_or_else(|| {
				Error::InvalidArgument(format!(
					"manifest is missing `{}`",
					constants::BUNDLE_SYMBOLIC_NAME
				))
			})?
			.to_owned();
		let version = manifest
			.get(constants::BUNDLE_VERSION)
			.and_then(Value::as_str)
			.ok_or_else(|| {
				Error::InvalidArgument(format!("manifest is missing `{}`", constants::BUNDLE_VERSION))
			})?
			.to_owned();

		let (bundle, fresh) = core.bundles.insert(location, |id| {
			Arc::new(BundleInner {
				id,
				location: location.to_owned(),
				symbolic_name,
				version,
				manifest,
				core: Arc::downgrade(core),
				lifecycle: parking_lot::Mutex::new(Lifecycle {
					state: BundleState::Installed,
					in_transition: false,
					context: None,
					activator: None,
				}),
				transition_done: parking_lot::Condvar::new(),
				activator_factory,
			})
		});
		if !fresh {
			return Ok(Bundle::from_inner(bundle));
		}

		core.post_bundle_event(BundleEventKind::Installed, &bundle);
		// Resolution has no work to do in-process; it always succeeds.
		bundle.lifecycle.lock().state = BundleState::Resolved;
		core.post_bundle_event(BundleEventKind::Resolved, &bundle);
		Ok(Bundle::from_inner(bundle))
	}

	/// Delivers a bundle event to the current listener snapshot, in
	/// registration order, on this thread.
	pub fn post_bundle_event(&self, kind: BundleEventKind, bundle: &Arc<BundleInner>) {
		let event = BundleEvent { kind, bundle: Bundle::from_inner(bundle.clone()) };
		let snapshot = self.listeners.bundle_snapshot();
		for entry in snapshot.iter() {
			if let Err(panic) = contain(|| (entry.listener)(&event)) {
				self.report_error(None, format!("bundle listener panicked: {panic}"));
			}
		}
	}

	/// Delivers a framework event to the current listener snapshot.
	pub fn post_framework_event(
		&self,
		kind: FrameworkEventKind,
		bundle: Option<Bundle>,
		message: String,
	) {
		let event = FrameworkEvent { kind, bundle, message };
		let snapshot = self.listeners.framework_snapshot();
		for entry in snapshot.iter() {
			if let Err(panic) = contain(|| (entry.listener)(&event)) {
				if kind == FrameworkEventKind::Error {
					// A listener failing while handling an error report is
					// only logged, not re-reported.
					warn!("framework listener panicked during error dispatch: {panic}");
				} else {
					self.report_error(None, format!("framework listener panicked: {panic}"));
				}
			}
		}
	}

	/// Reports a contained user-code failure as a framework error event.
	pub fn report_error(&self, bundle: Option<Bundle>, message: String) {
		warn!(bundle = bundle.as_ref().map(Bundle::id), "{message}");
		self.post_framework_event(FrameworkEventKind::Error, bundle, message);
	}

	/// The framework bundle (id 0).
	pub fn framework_bundle(&self) -> Option<Arc<BundleInner>> {
		self.bundles.get(0)
	}
}
