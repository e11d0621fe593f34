//! Lightweight handles naming a registration.

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, Weak};

use argosy_primitives::{AnyMap, Value};

use crate::bundle::Bundle;
use crate::service::registration::RegistrationInner;

/// A copyable handle naming one service registration.
///
/// References stay usable after the registration is unregistered; lookups
/// through them then fail. Two references are equal iff they name the same
/// registration.
///
/// The ordering is the registry's selection order: higher `service.ranking`
/// first, ties broken by lower `service.id`. Sorting a vector of references
/// ascending therefore puts the best candidate first.
#[derive(Clone)]
pub struct ServiceReference {
	pub(crate) inner: Weak<RegistrationInner>,
	pub(crate) id: i64,
}

impl ServiceReference {
	pub(crate) fn new(inner: &Arc<RegistrationInner>) -> Self {
		Self { inner: Arc::downgrade(inner), id: inner.id }
	}

	/// The framework-assigned `service.id`. Unique and never reused.
	pub fn service_id(&self) -> i64 {
		self.id
	}

	pub(crate) fn upgrade(&self) -> Option<Arc<RegistrationInner>> {
		self.inner.upgrade()
	}

	/// Returns true while the named registration still exists in the
	/// registry.
	pub fn is_valid(&self) -> bool {
		self.upgrade().is_some_and(|reg| reg.is_registered())
	}

	/// A consistent snapshot of the registration's current properties.
	/// Empty once the registration is gone.
	pub fn properties(&self) -> AnyMap {
		match self.upgrade() {
			Some(reg) => (*reg.properties()).clone(),
			None => AnyMap::case_insensitive(),
		}
	}

	/// A single property from the current snapshot.
	pub fn property(&self, key: &str) -> Option<Value> {
		match self.upgrade() {
			Some(reg) => reg.properties().get(key).cloned(),
			None => None,
		}
	}

	/// The interface names the service was registered under.
	pub fn interfaces(&self) -> Vec<String> {
		match self.upgrade() {
			Some(reg) => reg.interfaces.iter().cloned().collect(),
			None => Vec::new(),
		}
	}

	/// The bundle that registered the service, while it is still reachable.
	pub fn bundle(&self) -> Option<Bundle> {
		self.upgrade()
			.and_then(|reg| reg.bundle.upgrade())
			.map(Bundle::from_inner)
	}

	fn ranking(&self) -> i64 {
		self.upgrade().map(|reg| reg.ranking()).unwrap_or(0)
	}
}

impl PartialEq for ServiceReference {
	fn eq(&self, other: &Self) -> bool {
		self.id == other.id
	}
}

impl Eq for ServiceReference {}

impl Hash for ServiceReference {
	fn hash<H: Hasher>(&self, state: &mut H) {
		self.id.hash(state);
	}
}

impl PartialOrd for ServiceReference {
	fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
		Some(self.cmp(other))
	}
}

impl Ord for ServiceReference {
	fn cmp(&self, other: &Self) -> Ordering {
		other
			.ranking()
			.cmp(&self.ranking())
			.then_with(|| self.id.cmp(&other.id))
	}
}

impl fmt::Debug for ServiceReference {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("ServiceReference")
			.field("service_id", &self.id)
			.field("valid", &self.is_valid())
			.finish()
	}
}
