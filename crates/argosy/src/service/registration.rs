//! Registration records and the producer-side handle.

use std::fmt;
use std::sync::{Arc, Weak};

use argosy_primitives::AnyMap;
use parking_lot::{Condvar, Mutex};
use rustc_hash::FxHashMap;
use smallvec::SmallVec;

use crate::bundle::BundleInner;
use crate::constants;
use crate::core_context::CoreContext;
use crate::error::{Error, Result};
use crate::service::{InterfaceMap, ServiceProducer, ServiceReference, ServiceScope};

/// Where a registration is in its life.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RegistrationState {
	/// Live; gets succeed.
	Registered,
	/// The unregistering broadcast is in flight; gets already fail.
	Unregistering,
	/// Gone from the registry. Terminal.
	Unregistered,
}

/// Mutable half of a registration, behind its mutex.
pub(crate) struct Usage {
	pub state: RegistrationState,
	pub producer: ServiceProducer,
	/// The shared instance for singleton scope, once materialized.
	pub singleton: Option<InterfaceMap>,
	/// True while a thread is running the singleton factory.
	pub singleton_creating: bool,
	/// Consumer bundle id -> use count (singleton and bundle scope).
	pub dependents: FxHashMap<u64, usize>,
	/// Bundle-scope instances, one per consuming bundle.
	pub bundle_instances: FxHashMap<u64, InterfaceMap>,
	/// Bundle ids whose bundle-scope factory call is in flight.
	pub bundle_creating: rustc_hash::FxHashSet<u64>,
	/// Outstanding prototype instances per consuming bundle, matched back by
	/// map identity on release.
	pub prototypes: FxHashMap<u64, Vec<InterfaceMap>>,
}

/// One service registration as stored by the registry.
pub(crate) struct RegistrationInner {
	/// Framework-assigned, strictly increasing, never reused.
	pub id: i64,
	/// Declared interface names; immutable after registration.
	pub interfaces: SmallVec<[String; 2]>,
	pub scope: ServiceScope,
	/// The bundle that registered the service.
	pub bundle: Weak<BundleInner>,
	pub core: Weak<CoreContext>,
	/// Current property snapshot; replaced wholesale by `set_properties`.
	props: Mutex<Arc<AnyMap>>,
	pub usage: Mutex<Usage>,
	/// Signals completion of an in-flight factory call.
	pub created: Condvar,
}

impl RegistrationInner {
	pub fn new(
		id: i64,
		interfaces: SmallVec<[String; 2]>,
		producer: ServiceProducer,
		props: AnyMap,
		bundle: &Arc<BundleInner>,
		core: &Weak<CoreContext>,
	) -> Arc<Self> {
		let scope = producer.scope();
		Arc::new(Self {
			id,
			interfaces,
			scope,
			bundle: Arc::downgrade(bundle),
			core: core.clone(),
			props: Mutex::new(Arc::new(props)),
			usage: Mutex::new(Usage {
				state: RegistrationState::Registered,
				producer,
				singleton: None,
				singleton_creating: false,
				dependents: FxHashMap::default(),
				bundle_instances: FxHashMap::default(),
				bundle_creating: rustc_hash::FxHashSet::default(),
				prototypes: FxHashMap::default(),
			}),
			created: Condvar::new(),
		})
	}

	/// The current property snapshot. Cheap; the `Arc` stays consistent for
	/// the duration of a filter evaluation.
	pub fn properties(&self) -> Arc<AnyMap> {
		self.props.lock().clone()
	}

	/// Atomically replaces the property snapshot, returning the previous one.
	pub fn swap_properties(&self, next: AnyMap) -> Arc<AnyMap> {
		std::mem::replace(&mut *self.props.lock(), Arc::new(next))
	}

	pub fn ranking(&self) -> i64 {
		self.properties()
			.get(constants::SERVICE_RANKING)
			.and_then(|v| v.as_int())
			.unwrap_or(0)
	}

	pub fn is_registered(&self) -> bool {
		self.usage.lock().state == RegistrationState::Registered
	}
}

impl fmt::Debug for RegistrationInner {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Registration")
			.field("service_id", &self.id)
			.field("interfaces", &self.interfaces)
			.field("scope", &self.scope)
			.finish()
	}
}

/// Producer-side handle to a registration.
///
/// Held by the registering bundle to replace properties or take the service
/// back out of the registry. Cloneable; all clones name the same
/// registration.
#[derive(Clone)]
pub struct ServiceRegistration {
	pub(crate) inner: Arc<RegistrationInner>,
}

impl ServiceRegistration {
	pub(crate) fn new(inner: Arc<RegistrationInner>) -> Self {
		Self { inner }
	}

	/// A reference naming this registration.
	pub fn reference(&self) -> ServiceReference {
		ServiceReference::new(&self.inner)
	}

	/// The current property snapshot.
	pub fn properties(&self) -> AnyMap {
		(*self.inner.properties()).clone()
	}

	/// Atomically replaces the service's properties.
	///
	/// Reserved keys keep their framework-assigned values. Broadcasts
	/// `Modified`, and `ModifiedEndMatch` to listeners whose filter matched
	/// the previous snapshot but not the new one.
	pub fn set_properties(&self, properties: AnyMap) -> Result<()> {
		let core = self
			.inner
			.core
			.upgrade()
			.ok_or_else(|| Error::InvalidState("the framework is no longer running".into()))?;
		core.services.set_properties(&core, &self.inner, properties)
	}

	/// Takes the service out of the registry.
	///
	/// Broadcasts `Unregistering` synchronously so consumers can release
	/// their uses, then completes the removal. Fails with an invalid-state
	/// error if already unregistered.
	pub fn unregister(&self) -> Result<()> {
		let core = self
			.inner
			.core
			.upgrade()
			.ok_or_else(|| Error::InvalidState("the framework is no longer running".into()))?;
		core.services.unregister(&core, &self.inner)
	}
}

impl fmt::Debug for ServiceRegistration {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		self.inner.fmt(f)
	}
}
