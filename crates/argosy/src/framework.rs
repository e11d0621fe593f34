//! The framework: bundle 0 and the entry point into everything else.

use std::path::PathBuf;
use std::sync::Arc;

use argosy_primitives::{AnyMap, Value};
use parking_lot::{Condvar, Mutex};
use tracing::debug;

use crate::bundle::context::BundleContext;
use crate::bundle::{Bundle, BundleInner, BundleState, Lifecycle, lifecycle};
use crate::constants;
use crate::core_context::CoreContext;
use crate::error::{Error, Result};
use crate::event::FrameworkEventKind;

#[cfg(test)]
mod tests;

/// Configures and builds a [`Framework`].
pub struct FrameworkBuilder {
	properties: AnyMap,
	storage_dir: Option<PathBuf>,
}

impl FrameworkBuilder {
	/// Sets one framework property, readable through any bundle context.
	pub fn property(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
		self.properties.insert(key, value);
		self
	}

	/// Replaces the framework properties wholesale.
	pub fn properties(mut self, properties: AnyMap) -> Self {
		self.properties = properties;
		self
	}

	/// Base directory for per-bundle data directories. Defaults to
	/// `argosy-storage` under the system temp directory.
	pub fn storage_dir(mut self, dir: impl Into<PathBuf>) -> Self {
		self.storage_dir = Some(dir.into());
		self
	}

	/// Builds the framework. The framework bundle (id 0) comes up INSTALLED;
	/// call [`Framework::start`] to bring it ACTIVE.
	pub fn build(self) -> Result<Framework> {
		let storage_root = self
			.storage_dir
			.unwrap_or_else(|| std::env::temp_dir().join("argosy-storage"));
		let core = CoreContext::new(self.properties, storage_root);

		let mut manifest = AnyMap::case_insensitive();
		manifest.insert(constants::BUNDLE_SYMBOLIC_NAME, constants::FRAMEWORK_SYMBOLIC_NAME);
		manifest.insert(constants::BUNDLE_VERSION, env!("CARGO_PKG_VERSION"));

		let bundle = Arc::new(BundleInner {
			id: 0,
			location: "argosy://framework".to_owned(),
			symbolic_name: constants::FRAMEWORK_SYMBOLIC_NAME.to_owned(),
			version: env!("CARGO_PKG_VERSION").to_owned(),
			manifest,
			core: Arc::downgrade(&core),
			lifecycle: Mutex::new(Lifecycle {
				state: BundleState::Installed,
				in_transition: false,
				context: None,
				activator: None,
			}),
			transition_done: Condvar::new(),
			activator_factory: None,
		});
		core.bundles.adopt_framework(bundle.clone());

		Ok(Framework { core, bundle: Bundle::from_inner(bundle) })
	}
}

/// A running framework instance.
///
/// The framework is itself a bundle with id 0; its context is the install
/// point for every other bundle.
pub struct Framework {
	core: Arc<CoreContext>,
	bundle: Bundle,
}

impl Framework {
	pub fn builder() -> FrameworkBuilder {
		FrameworkBuilder { properties: AnyMap::case_insensitive(), storage_dir: None }
	}

	/// Builds a framework with default configuration.
	pub fn new() -> Result<Self> {
		Self::builder().build()
	}

	/// The framework bundle (id 0).
	pub fn bundle(&self) -> &Bundle {
		&self.bundle
	}

	/// The framework bundle's context. Valid once the framework is started.
	pub fn context(&self) -> Result<BundleContext> {
		self.bundle
			.context()
			.ok_or_else(|| Error::InvalidState("the framework is not started".into()))
	}

	/// Brings the framework bundle ACTIVE and broadcasts the started event.
	pub fn start(&self) -> Result<()> {
		lifecycle::start(&self.bundle.inner)?;
		debug!("framework started");
		self.core.post_framework_event(
			FrameworkEventKind::Started,
			Some(self.bundle.clone()),
			"framework started".to_owned(),
		);
		Ok(())
	}

	/// Installs a bundle through the framework context.
	pub fn install(&self, location: &str, manifest: AnyMap) -> Result<Bundle> {
		self.context()?.install(location, manifest)
	}

	/// Stops every active bundle in reverse install order, then the
	/// framework bundle itself. All bundle contexts are invalid afterwards.
	pub fn stop(&self) -> Result<()> {
		let mut bundles = self.core.bundles.bundles();
		bundles.retain(|bundle| bundle.id() != 0);
		bundles.sort_by_key(|bundle| std::cmp::Reverse(bundle.id()));
		for bundle in bundles {
			if bundle.state() == BundleState::Active {
				// Individual stop failures are already reported as
				// framework events.
				let _ = bundle.stop();
			}
		}
		lifecycle::stop(&self.bundle.inner)?;
		debug!("framework stopped");
		Ok(())
	}
}

impl std::fmt::Debug for Framework {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Framework")
			.field("state", &self.bundle.state())
			.finish()
	}
}
