//! Shared helpers for the crate's tests.

use std::sync::Arc;

use argosy_primitives::AnyMap;
use parking_lot::Mutex;

use crate::bundle::Bundle;
use crate::framework::Framework;

/// A minimal valid manifest.
pub(crate) fn manifest(name: &str) -> AnyMap {
	let mut manifest = AnyMap::case_insensitive();
	manifest.insert(crate::constants::BUNDLE_SYMBOLIC_NAME, name);
	manifest.insert(crate::constants::BUNDLE_VERSION, "1.0.0");
	manifest
}

/// A built and started framework with test storage.
pub(crate) fn started_framework() -> Framework {
	let framework = Framework::builder()
		.storage_dir(std::env::temp_dir().join("argosy-test-storage"))
		.build()
		.expect("framework builds");
	framework.start().expect("framework starts");
	framework
}

/// Installs a bundle named `name` at a matching test location.
pub(crate) fn install(framework: &Framework, name: &str) -> Bundle {
	framework
		.context()
		.expect("framework context")
		.install(&format!("test://{name}"), manifest(name))
		.expect("bundle installs")
}

/// Installs and starts a bundle.
pub(crate) fn active(framework: &Framework, name: &str) -> Bundle {
	let bundle = install(framework, name);
	bundle.start().expect("bundle starts");
	bundle
}

/// A shared, thread-safe event log for listener assertions.
#[derive(Clone, Default)]
pub(crate) struct EventLog {
	entries: Arc<Mutex<Vec<String>>>,
}

impl EventLog {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn push(&self, entry: impl Into<String>) {
		self.entries.lock().push(entry.into());
	}

	pub fn entries(&self) -> Vec<String> {
		self.entries.lock().clone()
	}

	pub fn len(&self) -> usize {
		self.entries.lock().len()
	}
}
