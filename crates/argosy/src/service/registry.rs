//! The service registration table and its operations.
//!
//! One coarse mutex guards the registration indices. Registration usage
//! (instances, use counts) lives behind each registration's own mutex, and
//! the two are never held at the same time, so re-entrant callbacks cannot
//! deadlock. Factory calls and event dispatch always run with no lock held.

use std::sync::Arc;

use argosy_primitives::{AnyMap, Filter, Value};
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use smallvec::SmallVec;
use tracing::{debug, warn};

use crate::bundle::{Bundle, BundleInner, BundleState};
use crate::constants;
use crate::core_context::CoreContext;
use crate::error::{Error, Result};
use crate::event::listeners::ServiceListenerEntry;
use crate::event::{ServiceEvent, ServiceEventKind};
use crate::hooks;
use crate::service::registration::{RegistrationInner, RegistrationState};
use crate::service::{
	InterfaceMap, ServiceFactory, ServiceProducer, ServiceReference, ServiceRegistration,
	ServiceScope,
};
use crate::util::contain;

struct Indices {
	/// First `service.id` handed out is 1. Strictly increasing, never
	/// reused.
	next_id: i64,
	by_interface: FxHashMap<String, Vec<Arc<RegistrationInner>>>,
	by_id: FxHashMap<i64, Arc<RegistrationInner>>,
}

/// The concurrent store of service registrations.
pub(crate) struct ServiceRegistry {
	indices: Mutex<Indices>,
}

impl ServiceRegistry {
	pub fn new() -> Self {
		Self {
			indices: Mutex::new(Indices {
				next_id: 1,
				by_interface: FxHashMap::default(),
				by_id: FxHashMap::default(),
			}),
		}
	}

	/// Registers a service and broadcasts `Registered`.
	pub fn register(
		&self,
		core: &Arc<CoreContext>,
		bundle: &Arc<BundleInner>,
		interfaces: &[&str],
		producer: ServiceProducer,
		properties: AnyMap,
	) -> Result<ServiceRegistration> {
		if interfaces.is_empty() {
			return Err(Error::InvalidArgument("no interfaces declared".into()));
		}
		if let ServiceProducer::Instance(map) = &producer {
			for interface in interfaces {
				if !map.contains(interface) {
					return Err(Error::InvalidArgument(format!(
						"service object does not provide declared interface `{interface}`"
					)));
				}
			}
		}
		validate_reserved(&properties, producer.scope())?;

		let names: SmallVec<[String; 2]> =
			interfaces.iter().map(|s| (*s).to_owned()).collect();

		let (registration, snapshot) = {
			let mut indices = self.indices.lock();
			let id = indices.next_id;
			indices.next_id += 1;

			let props = seal_properties(properties, id, producer.scope(), &names);
			let registration =
				RegistrationInner::new(id, names, producer, props, bundle, &Arc::downgrade(core));
			for interface in registration.interfaces.iter() {
				indices
					.by_interface
					.entry(interface.clone())
					.or_default()
					.push(registration.clone());
			}
			indices.by_id.insert(id, registration.clone());
			// Listener snapshot taken inside the critical section so the
			// delivery is ordered with the mutation.
			(registration, core.listeners.service_snapshot())
		};

		debug!(service_id = registration.id, interfaces = ?registration.interfaces, "service registered");
		let reference = ServiceReference::new(&registration);
		let props = registration.properties();
		self.deliver(
			core,
			snapshot.as_slice(),
			ServiceEvent { kind: ServiceEventKind::Registered, reference, previous_properties: None },
			|filter| filter.matches(&props),
		);
		Ok(ServiceRegistration::new(registration))
	}

	/// Atomically replaces a registration's properties and broadcasts
	/// `Modified` / `ModifiedEndMatch`.
	pub fn set_properties(
		&self,
		core: &Arc<CoreContext>,
		registration: &Arc<RegistrationInner>,
		properties: AnyMap,
	) -> Result<()> {
		validate_reserved(&properties, registration.scope)?;
		if !registration.is_registered() {
			return Err(Error::InvalidState(
				"cannot replace properties of an unregistered service".into(),
			));
		}

		let sealed = seal_properties(
			properties,
			registration.id,
			registration.scope,
			&registration.interfaces,
		);
		let (previous, snapshot) = {
			// The property swap is the mutation; order the listener snapshot
			// with it.
			let previous = registration.swap_properties(sealed);
			(previous, core.listeners.service_snapshot())
		};
		let current = registration.properties();

		let reference = ServiceReference::new(registration);
		let endmatch_props = (*previous).clone();
		self.deliver(
			core,
			snapshot.as_slice(),
			ServiceEvent {
				kind: ServiceEventKind::Modified,
				reference: reference.clone(),
				previous_properties: None,
			},
			|filter| filter.matches(&current),
		);
		// Listeners that matched before but no longer do get the end-match
		// notification, carrying the pre-mutation snapshot.
		self.deliver_endmatch(
			core,
			snapshot.as_slice(),
			ServiceEvent {
				kind: ServiceEventKind::ModifiedEndMatch,
				reference,
				previous_properties: Some(endmatch_props),
			},
			&previous,
			&current,
		);
		Ok(())
	}

	/// Takes a registration out of the registry.
	pub fn unregister(
		&self,
		core: &Arc<CoreContext>,
		registration: &Arc<RegistrationInner>,
	) -> Result<()> {
		let snapshot = {
			let mut usage = registration.usage.lock();
			if usage.state != RegistrationState::Registered {
				return Err(Error::InvalidState("service already unregistered".into()));
			}
			usage.state = RegistrationState::Unregistering;
			core.listeners.service_snapshot()
		};

		// Broadcast synchronously so consumers can release their uses before
		// the registration is gone.
		let props = registration.properties();
		self.deliver(
			core,
			snapshot.as_slice(),
			ServiceEvent {
				kind: ServiceEventKind::Unregistering,
				reference: ServiceReference::new(registration),
				previous_properties: None,
			},
			|filter| filter.matches(&props),
		);

		let cleanup = {
			let mut usage = registration.usage.lock();
			usage.state = RegistrationState::Unregistered;
			let factory = match &usage.producer {
				ServiceProducer::Factory(factory, _) => Some(factory.clone()),
				ServiceProducer::Instance(_) => None,
			};
			// Use counts stay: outstanding bundle- and prototype-scope
			// guards still release through them, so each scoped get keeps
			// its exactly-one matching unget.
			factory.and_then(|f| usage.singleton.take().map(|instance| (f, instance)))
		};
		if let Some((factory, instance)) = cleanup {
			self.destroy_instance(registration, &factory, instance);
		}

		let mut indices = self.indices.lock();
		for interface in registration.interfaces.iter() {
			if let Some(list) = indices.by_interface.get_mut(interface) {
				list.retain(|r| r.id != registration.id);
				if list.is_empty() {
					indices.by_interface.remove(interface);
				}
			}
		}
		indices.by_id.remove(&registration.id);
		debug!(service_id = registration.id, "service unregistered");
		Ok(())
	}

	/// Looks up references matching an interface name and filter, sorted
	/// best-first (ranking descending, id ascending). Hook filtering is the
	/// caller's concern.
	pub fn find(
		&self,
		interface: Option<&str>,
		filter: Option<&Filter>,
	) -> Vec<ServiceReference> {
		let candidates: Vec<Arc<RegistrationInner>> = {
			let indices = self.indices.lock();
			match interface {
				Some(name) => indices.by_interface.get(name).cloned().unwrap_or_default(),
				None => indices.by_id.values().cloned().collect(),
			}
		};

		let mut references: Vec<ServiceReference> = candidates
			.into_iter()
			.filter(|reg| reg.is_registered())
			.filter(|reg| {
				// Registrations of an uninstalled bundle are invisible.
				reg.bundle
					.upgrade()
					.is_some_and(|b| b.state() != BundleState::Uninstalled)
			})
			.filter(|reg| match filter {
				Some(f) => f.matches(&reg.properties()),
				None => true,
			})
			.map(|reg| ServiceReference::new(&reg))
			.collect();
		references.sort();
		references
	}

	/// Scope-aware acquisition. Returns the instance map; the caller wraps
	/// it in a release guard. Factory invocations run with no lock held,
	/// structured so a concurrent unregister observes the in-flight get
	/// through the creating flags and use counters.
	pub fn get(
		&self,
		core: &Arc<CoreContext>,
		registration: &Arc<RegistrationInner>,
		consumer: &Arc<BundleInner>,
	) -> Result<InterfaceMap> {
		let consumer_bundle = Bundle::from_inner(consumer.clone());
		loop {
			let mut usage = registration.usage.lock();
			if usage.state != RegistrationState::Registered {
				return Err(Error::NotFound("service has been unregistered".into()));
			}
			let factory = match registration.scope {
				ServiceScope::Singleton => {
					if let Some(instance) = usage.singleton.clone() {
						*usage.dependents.entry(consumer.id).or_insert(0) += 1;
						return Ok(instance);
					}
					match &usage.producer {
						ServiceProducer::Instance(map) => {
							let instance = map.clone();
							usage.singleton = Some(instance.clone());
							*usage.dependents.entry(consumer.id).or_insert(0) += 1;
							return Ok(instance);
						}
						ServiceProducer::Factory(factory, _) => {
							if usage.singleton_creating {
								// Another thread is running the factory;
								// wait for it to publish the instance.
								registration.created.wait(&mut usage);
								continue;
							}
							let factory = factory.clone();
							usage.singleton_creating = true;
							factory
						}
					}
				}
				ServiceScope::Bundle => {
					if let Some(instance) = usage.bundle_instances.get(&consumer.id).cloned() {
						*usage.dependents.entry(consumer.id).or_insert(0) += 1;
						return Ok(instance);
					}
					if usage.bundle_creating.contains(&consumer.id) {
						registration.created.wait(&mut usage);
						continue;
					}
					let factory = require_factory(&usage.producer)?;
					usage.bundle_creating.insert(consumer.id);
					factory
				}
				ServiceScope::Prototype => require_factory(&usage.producer)?,
			};
			drop(usage);

			let produced = self.create_instance(core, registration, &factory, &consumer_bundle);

			let adopted = {
				let mut usage = registration.usage.lock();
				match registration.scope {
					ServiceScope::Singleton => usage.singleton_creating = false,
					ServiceScope::Bundle => {
						usage.bundle_creating.remove(&consumer.id);
					}
					ServiceScope::Prototype => {}
				}
				registration.created.notify_all();
				match produced {
					Err(error) => return Err(error),
					Ok(instance) if usage.state != RegistrationState::Registered => {
						// Lost the race with unregister; hand the instance
						// straight back outside the lock.
						Err(instance)
					}
					Ok(instance) => {
						match registration.scope {
							ServiceScope::Singleton => {
								usage.singleton = Some(instance.clone());
								*usage.dependents.entry(consumer.id).or_insert(0) += 1;
							}
							ServiceScope::Bundle => {
								usage.bundle_instances.insert(consumer.id, instance.clone());
								*usage.dependents.entry(consumer.id).or_insert(0) += 1;
							}
							ServiceScope::Prototype => {
								usage
									.prototypes
									.entry(consumer.id)
									.or_default()
									.push(instance.clone());
							}
						}
						Ok(instance)
					}
				}
			};
			return match adopted {
				Ok(instance) => Ok(instance),
				Err(unwanted) => {
					if contain(|| factory.unget(&consumer_bundle, unwanted)).is_err() {
						warn!(
							service_id = registration.id,
							"service factory panicked during release"
						);
					}
					Err(Error::NotFound("service has been unregistered".into()))
				}
			};
		}
	}

	/// Releases one use. Called from guard drops; tolerant of uses already
	/// force-released by context teardown.
	pub fn unget(
		&self,
		registration: &Arc<RegistrationInner>,
		consumer_id: u64,
		consumer: Option<Bundle>,
		instance: &InterfaceMap,
	) {
		let destroy = {
			let mut usage = registration.usage.lock();
			match registration.scope {
				ServiceScope::Singleton => {
					decrement(&mut usage.dependents, consumer_id);
					// Singletons are shared; no destruction on release.
					None
				}
				ServiceScope::Bundle => {
					if decrement(&mut usage.dependents, consumer_id) == Some(0) {
						let cached = usage.bundle_instances.remove(&consumer_id);
						factory_of(&usage.producer).zip(cached)
					} else {
						None
					}
				}
				ServiceScope::Prototype => {
					let removed = usage.prototypes.get_mut(&consumer_id).and_then(|list| {
						let at = list.iter().position(|i| i.identity() == instance.identity())?;
						Some(list.swap_remove(at))
					});
					factory_of(&usage.producer).zip(removed)
				}
			}
		};
		if let Some((factory, instance)) = destroy {
			if let Some(bundle) = consumer {
				if contain(|| factory.unget(&bundle, instance)).is_err() {
					warn!(service_id = registration.id, "service factory panicked during release");
				}
			}
		}
	}

	/// Unregisters every service the bundle registered. Part of context
	/// invalidation.
	pub fn unregister_bundle_services(&self, core: &Arc<CoreContext>, bundle_id: u64) {
		let owned: Vec<Arc<RegistrationInner>> = {
			let indices = self.indices.lock();
			indices
				.by_id
				.values()
				.filter(|reg| reg.bundle.upgrade().is_some_and(|b| b.id == bundle_id))
				.cloned()
				.collect()
		};
		for registration in owned {
			// Concurrent unregistration by the owner is fine.
			let _ = self.unregister(core, &registration);
		}
	}

	/// Force-releases every use a bundle still holds as a consumer. Part of
	/// context invalidation; later guard drops become no-ops.
	pub fn release_bundle(&self, bundle_id: u64, bundle: &Bundle) {
		let all: Vec<Arc<RegistrationInner>> = {
			let indices = self.indices.lock();
			indices.by_id.values().cloned().collect()
		};
		for registration in all {
			let work = {
				let mut usage = registration.usage.lock();
				usage.dependents.remove(&bundle_id);
				let factory = factory_of(&usage.producer);
				let mut instances = Vec::new();
				if let Some(cached) = usage.bundle_instances.remove(&bundle_id) {
					instances.push(cached);
				}
				if let Some(protos) = usage.prototypes.remove(&bundle_id) {
					instances.extend(protos);
				}
				factory.map(|f| (f, instances))
			};
			if let Some((factory, instances)) = work {
				for instance in instances {
					if contain(|| factory.unget(bundle, instance)).is_err() {
						warn!(
							service_id = registration.id,
							"service factory panicked during forced release"
						);
					}
				}
			}
		}
	}

	fn create_instance(
		&self,
		core: &Arc<CoreContext>,
		registration: &Arc<RegistrationInner>,
		factory: &Arc<dyn ServiceFactory>,
		consumer: &Bundle,
	) -> Result<InterfaceMap> {
		match contain(|| factory.get(consumer)) {
			Ok(Ok(map)) => {
				for interface in registration.interfaces.iter() {
					if !map.contains(interface) {
						core.report_error(
							registration.bundle.upgrade().map(Bundle::from_inner),
							format!(
								"service factory for id {} did not provide declared interface `{interface}`",
								registration.id
							),
						);
						return Err(Error::NotFound("service factory produced an incomplete service".into()));
					}
				}
				Ok(map)
			}
			Ok(Err(error)) => {
				core.report_error(
					registration.bundle.upgrade().map(Bundle::from_inner),
					format!("service factory for id {} failed: {error}", registration.id),
				);
				Err(Error::NotFound("service factory failed".into()))
			}
			Err(panic) => {
				core.report_error(
					registration.bundle.upgrade().map(Bundle::from_inner),
					format!("service factory for id {} panicked: {panic}", registration.id),
				);
				Err(Error::NotFound("service factory panicked".into()))
			}
		}
	}

	fn destroy_instance(
		&self,
		registration: &Arc<RegistrationInner>,
		factory: &Arc<dyn ServiceFactory>,
		instance: InterfaceMap,
	) {
		let Some(owner) = registration.bundle.upgrade().map(Bundle::from_inner) else {
			return;
		};
		if contain(|| factory.unget(&owner, instance)).is_err() {
			warn!(service_id = registration.id, "service factory panicked during release");
		}
	}

	/// Delivers a service event to the snapshot, honoring per-listener
	/// filters and event hooks. End-match delivery goes through
	/// [`Self::deliver_endmatch`] instead.
	fn deliver(
		&self,
		core: &Arc<CoreContext>,
		snapshot: &[Arc<ServiceListenerEntry>],
		event: ServiceEvent,
		matches_now: impl Fn(&Filter) -> bool,
	) {
		let allowed = hooks::filter_event_recipients(core, &event, snapshot);
		for entry in snapshot {
			if !allowed.contains(&(entry.owner.as_ptr() as usize)) {
				continue;
			}
			let deliver = match &entry.filter {
				None => true,
				Some(filter) => matches_now(filter),
			};
			if deliver {
				self.invoke_listener(core, entry, &event);
			}
		}
	}

	/// Delivers `ModifiedEndMatch` to listeners whose filter matched the
	/// previous snapshot but not the current one.
	fn deliver_endmatch(
		&self,
		core: &Arc<CoreContext>,
		snapshot: &[Arc<ServiceListenerEntry>],
		event: ServiceEvent,
		previous: &AnyMap,
		current: &AnyMap,
	) {
		let allowed = hooks::filter_event_recipients(core, &event, snapshot);
		for entry in snapshot {
			if !allowed.contains(&(entry.owner.as_ptr() as usize)) {
				continue;
			}
			let Some(filter) = &entry.filter else { continue };
			if filter.matches(previous) && !filter.matches(current) {
				self.invoke_listener(core, entry, &event);
			}
		}
	}

	fn invoke_listener(
		&self,
		core: &Arc<CoreContext>,
		entry: &Arc<ServiceListenerEntry>,
		event: &ServiceEvent,
	) {
		if let Err(panic) = contain(|| (entry.listener)(event)) {
			core.report_error(None, format!("service listener panicked: {panic}"));
		}
	}
}

fn decrement(dependents: &mut FxHashMap<u64, usize>, consumer: u64) -> Option<usize> {
	let count = dependents.get_mut(&consumer)?;
	*count = count.saturating_sub(1);
	let now = *count;
	if now == 0 {
		dependents.remove(&consumer);
	}
	Some(now)
}

fn require_factory(producer: &ServiceProducer) -> Result<Arc<dyn ServiceFactory>> {
	match producer {
		ServiceProducer::Factory(factory, _) => Ok(factory.clone()),
		ServiceProducer::Instance(_) => {
			Err(Error::Internal("scoped registration without a factory".into()))
		}
	}
}

fn factory_of(producer: &ServiceProducer) -> Option<Arc<dyn ServiceFactory>> {
	match producer {
		ServiceProducer::Factory(factory, _) => Some(factory.clone()),
		ServiceProducer::Instance(_) => None,
	}
}

/// Rejects user-supplied reserved keys of the wrong shape.
fn validate_reserved(properties: &AnyMap, scope: ServiceScope) -> Result<()> {
	if let Some(value) = properties.get(constants::SERVICE_ID)
		&& value.as_int().is_none()
	{
		return Err(Error::InvalidArgument("`service.id` must be an integer".into()));
	}
	if let Some(value) = properties.get(constants::SERVICE_RANKING)
		&& value.as_int().is_none()
	{
		return Err(Error::InvalidArgument("`service.ranking` must be an integer".into()));
	}
	if let Some(value) = properties.get(constants::SERVICE_SCOPE) {
		match value.as_str().and_then(ServiceScope::parse) {
			Some(declared) if declared == scope => {}
			Some(_) => {
				return Err(Error::InvalidArgument(format!(
					"`service.scope` conflicts with the registration's {scope} scope"
				)));
			}
			None => {
				return Err(Error::InvalidArgument(
					"`service.scope` must be one of singleton, bundle, prototype".into(),
				));
			}
		}
	}
	if let Some(value) = properties.get(constants::OBJECTCLASS) {
		let ok = value
			.as_list()
			.is_some_and(|items| items.iter().all(|v| v.as_str().is_some()));
		if !ok {
			return Err(Error::InvalidArgument("`objectclass` must be a list of strings".into()));
		}
	}
	Ok(())
}

/// Merges user properties with the framework-reserved keys.
fn seal_properties(
	user: AnyMap,
	id: i64,
	scope: ServiceScope,
	interfaces: &SmallVec<[String; 2]>,
) -> AnyMap {
	let mut props = AnyMap::case_insensitive();
	for (key, value) in user.iter() {
		props.insert(key, value.clone());
	}
	props.insert(constants::SERVICE_ID, Value::Int(id));
	props.insert(constants::SERVICE_SCOPE, scope.as_str());
	props.insert(
		constants::OBJECTCLASS,
		Value::List(interfaces.iter().map(|i| Value::String(i.clone())).collect()),
	);
	if props.get(constants::SERVICE_RANKING).is_none() {
		props.insert(constants::SERVICE_RANKING, Value::Int(0));
	}
	props
}
