//! Service publication and discovery.
//!
//! A service is one or more interface-name/object pairs published by a
//! bundle. The registry stores registrations, answers filter queries with
//! ranked [`ServiceReference`]s, and tracks per-consumer use counts so scoped
//! instances are destroyed exactly once.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use rustc_hash::FxHashMap;

use crate::bundle::Bundle;
use crate::error::BoxError;

pub mod guard;
pub mod reference;
pub mod registration;
pub(crate) mod registry;

pub use guard::{ServiceGuard, ServiceObjects};
pub use reference::ServiceReference;
pub use registration::ServiceRegistration;

/// Sharing policy for a service's instances.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ServiceScope {
	/// One shared instance for every consumer.
	#[default]
	Singleton,
	/// One instance per consuming bundle, created lazily.
	Bundle,
	/// A fresh instance per acquisition.
	Prototype,
}

impl ServiceScope {
	/// The `service.scope` property value for this scope.
	pub fn as_str(self) -> &'static str {
		match self {
			Self::Singleton => crate::constants::SCOPE_SINGLETON,
			Self::Bundle => crate::constants::SCOPE_BUNDLE,
			Self::Prototype => crate::constants::SCOPE_PROTOTYPE,
		}
	}

	/// Parses a `service.scope` property value.
	pub fn parse(value: &str) -> Option<Self> {
		match value {
			crate::constants::SCOPE_SINGLETON => Some(Self::Singleton),
			crate::constants::SCOPE_BUNDLE => Some(Self::Bundle),
			crate::constants::SCOPE_PROTOTYPE => Some(Self::Prototype),
			_ => None,
		}
	}
}

impl fmt::Display for ServiceScope {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}", self.as_str())
	}
}

/// The interface-name to object mapping a producer hands to the registry.
///
/// The registry treats the objects as opaque; it only requires that every
/// interface name declared at registration is present as a key. Consumers
/// recover typed access with [`instance`](Self::instance) (concrete types) or
/// [`shared`](Self::shared) (trait objects).
///
/// Cloning is cheap and shares the underlying table; two clones of the same
/// map compare identical for prototype-instance bookkeeping.
#[derive(Clone)]
pub struct InterfaceMap {
	entries: Arc<FxHashMap<String, Arc<dyn Any + Send + Sync>>>,
}

impl InterfaceMap {
	/// Starts building a map.
	pub fn builder() -> InterfaceMapBuilder {
		InterfaceMapBuilder { entries: FxHashMap::default() }
	}

	/// Builds a single-interface map from a concrete instance.
	pub fn from_instance<S: Send + Sync + 'static>(interface: impl Into<String>, instance: Arc<S>) -> Self {
		Self::builder().instance(interface, instance).build()
	}

	/// Returns the raw object registered under `interface`.
	pub fn get(&self, interface: &str) -> Option<&Arc<dyn Any + Send + Sync>> {
		self.entries.get(interface)
	}

	/// Downcasts the object registered under `interface` to a concrete type.
	pub fn instance<S: Send + Sync + 'static>(&self, interface: &str) -> Option<Arc<S>> {
		self.entries.get(interface)?.clone().downcast::<S>().ok()
	}

	/// Recovers a trait object stored with
	/// [`InterfaceMapBuilder::shared`].
	pub fn shared<T: ?Sized + Send + Sync + 'static>(&self, interface: &str) -> Option<Arc<T>> {
		self.entries
			.get(interface)?
			.downcast_ref::<Arc<T>>()
			.cloned()
	}

	/// Returns true if `interface` is a key of this map.
	pub fn contains(&self, interface: &str) -> bool {
		self.entries.contains_key(interface)
	}

	/// Iterates the interface names in this map.
	pub fn interfaces(&self) -> impl Iterator<Item = &str> {
		self.entries.keys().map(String::as_str)
	}

	pub fn len(&self) -> usize {
		self.entries.len()
	}

	pub fn is_empty(&self) -> bool {
		self.entries.is_empty()
	}

	/// Identity of this map's shared table; clones share it. Used to match a
	/// prototype instance back to its use slot.
	pub(crate) fn identity(&self) -> usize {
		Arc::as_ptr(&self.entries) as *const () as usize
	}
}

impl fmt::Debug for InterfaceMap {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_set().entries(self.entries.keys()).finish()
	}
}

/// Builder for [`InterfaceMap`].
pub struct InterfaceMapBuilder {
	entries: FxHashMap<String, Arc<dyn Any + Send + Sync>>,
}

impl InterfaceMapBuilder {
	/// Registers a concrete instance under an interface name.
	pub fn instance<S: Send + Sync + 'static>(mut self, interface: impl Into<String>, instance: Arc<S>) -> Self {
		self.entries.insert(interface.into(), instance);
		self
	}

	/// Registers a trait object under an interface name. Retrieve it with
	/// [`InterfaceMap::shared`] using the same `T`.
	pub fn shared<T: ?Sized + Send + Sync + 'static>(mut self, interface: impl Into<String>, instance: Arc<T>) -> Self {
		self.entries.insert(interface.into(), Arc::new(instance));
		self
	}

	pub fn build(self) -> InterfaceMap {
		InterfaceMap { entries: Arc::new(self.entries) }
	}
}

/// Produces service instances on demand for bundle- and prototype-scoped
/// registrations (and lazily for singletons).
pub trait ServiceFactory: Send + Sync {
	/// Creates an instance for the requesting bundle. The returned map must
	/// contain every interface name the service was registered under.
	///
	/// Called with no registry lock held.
	fn get(&self, bundle: &Bundle) -> Result<InterfaceMap, BoxError>;

	/// Releases an instance previously returned from
	/// [`get`](Self::get). Called when the instance's use count reaches zero.
	fn unget(&self, _bundle: &Bundle, _service: InterfaceMap) {}
}

/// What a registration produces: a ready object or a factory.
pub enum ServiceProducer {
	/// A concrete, already-built service. Always singleton scope.
	Instance(InterfaceMap),
	/// A factory invoked per the given scope.
	Factory(Arc<dyn ServiceFactory>, ServiceScope),
}

impl ServiceProducer {
	pub(crate) fn scope(&self) -> ServiceScope {
		match self {
			Self::Instance(_) => ServiceScope::Singleton,
			Self::Factory(_, scope) => *scope,
		}
	}
}
