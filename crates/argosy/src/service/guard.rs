//! Scoped ownership of acquired services.

use std::fmt;
use std::sync::{Arc, Weak};

use tracing::warn;

use crate::bundle::{Bundle, BundleInner};
use crate::error::{Error, Result};
use crate::service::registration::RegistrationInner;
use crate::service::{InterfaceMap, ServiceReference};
use crate::util::contain;

/// Shared-ownership handle to an acquired service.
///
/// Cloning shares the acquisition; when the last clone drops, the matching
/// release (and, for bundle- and prototype-scope instances at use count zero,
/// the factory's destroy hook) happens automatically. Consumers never release
/// manually.
#[derive(Clone)]
pub struct ServiceGuard {
	inner: Arc<GuardInner>,
}

struct GuardInner {
	registration: Arc<RegistrationInner>,
	consumer_id: u64,
	consumer: Weak<BundleInner>,
	instances: InterfaceMap,
	/// The interface the consumer asked for; typed accessors default to it.
	interface: String,
}

impl ServiceGuard {
	pub(crate) fn new(
		registration: Arc<RegistrationInner>,
		consumer: &Arc<BundleInner>,
		instances: InterfaceMap,
		interface: String,
	) -> Self {
		Self {
			inner: Arc::new(GuardInner {
				registration,
				consumer_id: consumer.id,
				consumer: Arc::downgrade(consumer),
				instances,
				interface,
			}),
		}
	}

	/// A reference naming the registration this acquisition came from.
	pub fn reference(&self) -> ServiceReference {
		ServiceReference::new(&self.inner.registration)
	}

	/// The interface name this guard was acquired under.
	pub fn interface(&self) -> &str {
		&self.inner.interface
	}

	/// The full interface map of the underlying instance.
	pub fn interface_map(&self) -> &InterfaceMap {
		&self.inner.instances
	}

	/// Downcasts the acquired interface to a concrete type.
	pub fn instance<S: Send + Sync + 'static>(&self) -> Option<Arc<S>> {
		self.inner.instances.instance::<S>(&self.inner.interface)
	}

	/// Recovers the acquired interface as a trait object (for services
	/// registered with [`InterfaceMapBuilder::shared`]).
	///
	/// [`InterfaceMapBuilder::shared`]: crate::service::InterfaceMapBuilder::shared
	pub fn shared<T: ?Sized + Send + Sync + 'static>(&self) -> Option<Arc<T>> {
		self.inner.instances.shared::<T>(&self.inner.interface)
	}
}

impl fmt::Debug for ServiceGuard {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("ServiceGuard")
			.field("service_id", &self.inner.registration.id)
			.field("interface", &self.inner.interface)
			.finish()
	}
}

impl Drop for GuardInner {
	fn drop(&mut self) {
		// Never panics out of a drop; release failures are logged.
		let registration = self.registration.clone();
		let consumer_id = self.consumer_id;
		let consumer = self.consumer.upgrade().map(Bundle::from_inner);
		let instances = self.instances.clone();
		let outcome = contain(|| {
			if let Some(core) = registration.core.upgrade() {
				core.services.unget(&registration, consumer_id, consumer, &instances);
			}
		});
		if outcome.is_err() {
			warn!(service_id = self.registration.id, "service release panicked");
		}
	}
}

/// Handle for acquiring multiple instances of a prototype-scope service.
///
/// Each [`get`](Self::get) on a prototype-scope reference produces a fresh
/// instance with its own release slot. For singleton and bundle scope it
/// degenerates to the ordinary shared acquisition.
pub struct ServiceObjects {
	consumer: Weak<BundleInner>,
	reference: ServiceReference,
}

impl ServiceObjects {
	pub(crate) fn new(consumer: &Arc<BundleInner>, reference: ServiceReference) -> Self {
		Self { consumer: Arc::downgrade(consumer), reference }
	}

	/// The reference this handle acquires from.
	pub fn reference(&self) -> &ServiceReference {
		&self.reference
	}

	/// Acquires an instance.
	pub fn get(&self) -> Result<ServiceGuard> {
		let consumer = self
			.consumer
			.upgrade()
			.ok_or_else(Error::invalid_context)?;
		let registration = self
			.reference
			.upgrade()
			.ok_or_else(|| Error::InvalidArgument("stale service reference".into()))?;
		let core = registration
			.core
			.upgrade()
			.ok_or_else(|| Error::InvalidState("the framework is no longer running".into()))?;
		let interface = registration
			.interfaces
			.first()
			.cloned()
			.unwrap_or_default();
		let instances = core.services.get(&core, &registration, &consumer)?;
		Ok(ServiceGuard::new(registration, &consumer, instances, interface))
	}
}

impl fmt::Debug for ServiceObjects {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("ServiceObjects")
			.field("service_id", &self.reference.service_id())
			.finish()
	}
}
