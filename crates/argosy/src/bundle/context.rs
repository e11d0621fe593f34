//! Bundle contexts: a bundle's capability handle into the framework.

use std::fmt;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use argosy_primitives::{AnyMap, Filter, Value};

use crate::bundle::activator::ActivatorFactory;
use crate::bundle::{Bundle, BundleInner};
use crate::core_context::CoreContext;
use crate::error::{Error, Result};
use crate::event::listeners::{
	BundleListenerFn, FrameworkListenerFn, ListenerKey, ListenerToken, ServiceListenerFn,
};
use crate::event::{BundleEvent, FrameworkEvent, ServiceEvent};
use crate::hooks;
use crate::service::{
	InterfaceMap, ServiceFactory, ServiceGuard, ServiceObjects, ServiceProducer, ServiceReference,
	ServiceRegistration, ServiceScope,
};

/// Shared context state. The context holds only a weak back-pointer to its
/// bundle; the bundle owns the strong reference to the context.
pub(crate) struct ContextInner {
	pub bundle: Weak<BundleInner>,
	valid: AtomicBool,
}

impl ContextInner {
	pub fn new(bundle: Weak<BundleInner>) -> Arc<Self> {
		Arc::new(Self { bundle, valid: AtomicBool::new(true) })
	}

	pub fn is_valid(&self) -> bool {
		self.valid.load(Ordering::Acquire)
	}

	pub fn invalidate(&self) {
		self.valid.store(false, Ordering::Release);
	}

	/// Identity used to attribute listener registrations to this context.
	/// Matches `Weak::as_ptr` of handles to the same allocation.
	pub fn id(&self) -> usize {
		self as *const ContextInner as usize
	}
}

/// A bundle's authenticated handle into the framework.
///
/// Valid only while its bundle is STARTING, ACTIVE, or STOPPING. Every
/// operation on an invalidated context fails with an invalid-state error.
/// All service publication and lookup goes through a context, so every
/// action is attributable to a bundle.
#[derive(Clone)]
pub struct BundleContext {
	pub(crate) inner: Arc<ContextInner>,
}

impl BundleContext {
	pub(crate) fn new(inner: Arc<ContextInner>) -> Self {
		Self { inner }
	}

	fn handles(&self) -> Result<(Arc<BundleInner>, Arc<CoreContext>)> {
		if !self.inner.is_valid() {
			return Err(Error::invalid_context());
		}
		let bundle = self.inner.bundle.upgrade().ok_or_else(Error::invalid_context)?;
		let core = bundle.core().ok_or_else(Error::invalid_context)?;
		Ok((bundle, core))
	}

	/// True until the owning bundle leaves STOPPING.
	pub fn is_valid(&self) -> bool {
		self.inner.is_valid()
	}

	/// The bundle this context belongs to.
	pub fn bundle(&self) -> Result<Bundle> {
		let (bundle, _) = self.handles()?;
		Ok(Bundle::from_inner(bundle))
	}

	/// One framework property.
	pub fn property(&self, key: &str) -> Result<Option<Value>> {
		let (_, core) = self.handles()?;
		Ok(core.properties.get(key).cloned())
	}

	/// The framework properties supplied at construction.
	pub fn properties(&self) -> Result<AnyMap> {
		let (_, core) = self.handles()?;
		Ok(core.properties.clone())
	}

	/// Installs a bundle without an activator.
	///
	/// Installing a location that is already installed returns the existing
	/// bundle.
	pub fn install(&self, location: &str, manifest: AnyMap) -> Result<Bundle> {
		let (_, core) = self.handles()?;
		CoreContext::install(&core, location, manifest, None)
	}

	/// Installs a bundle whose activator is produced by `factory` on each
	/// start.
	pub fn install_with_activator(
		&self,
		location: &str,
		manifest: AnyMap,
		factory: ActivatorFactory,
	) -> Result<Bundle> {
		let (_, core) = self.handles()?;
		CoreContext::install(&core, location, manifest, Some(factory))
	}

	/// All bundles that are not uninstalled, in install order, after bundle
	/// find hooks had their say.
	pub fn bundles(&self) -> Result<Vec<Bundle>> {
		let (_, core) = self.handles()?;
		let mut bundles = core.bundles.bundles();
		hooks::filter_bundles(&core, self, &mut bundles);
		Ok(bundles)
	}

	/// Looks up a bundle by id. Find hooks may hide it.
	pub fn bundle_by_id(&self, id: u64) -> Result<Option<Bundle>> {
		let (_, core) = self.handles()?;
		let Some(bundle) = core.bundles.get(id).map(Bundle::from_inner) else {
			return Ok(None);
		};
		let mut bundles = vec![bundle];
		hooks::filter_bundles(&core, self, &mut bundles);
		Ok(bundles.into_iter().next())
	}

	/// Looks up the bundle installed from a location. Find hooks may hide
	/// it.
	pub fn bundle_by_location(&self, location: &str) -> Result<Option<Bundle>> {
		let (_, core) = self.handles()?;
		let Some(bundle) = core.bundles.by_location(location).map(Bundle::from_inner) else {
			return Ok(None);
		};
		let mut bundles = vec![bundle];
		hooks::filter_bundles(&core, self, &mut bundles);
		Ok(bundles.into_iter().next())
	}

	/// All non-uninstalled bundles with the given symbolic name.
	pub fn bundles_by_symbolic_name(&self, name: &str) -> Result<Vec<Bundle>> {
		let (_, core) = self.handles()?;
		let mut bundles = core.bundles.by_symbolic_name(name);
		hooks::filter_bundles(&core, self, &mut bundles);
		Ok(bundles)
	}

	/// Registers a ready service object under one or more interface names.
	///
	/// The object map must contain every declared name. Always singleton
	/// scope.
	pub fn register_service(
		&self,
		interfaces: &[&str],
		service: InterfaceMap,
		properties: AnyMap,
	) -> Result<ServiceRegistration> {
		let (bundle, core) = self.handles()?;
		core.services.register(
			&core,
			&bundle,
			interfaces,
			ServiceProducer::Instance(service),
			properties,
		)
	}

	/// Registers a factory-produced service with the given scope.
	pub fn register_service_factory(
		&self,
		interfaces: &[&str],
		factory: Arc<dyn ServiceFactory>,
		scope: ServiceScope,
		properties: AnyMap,
	) -> Result<ServiceRegistration> {
		let (bundle, core) = self.handles()?;
		core.services.register(
			&core,
			&bundle,
			interfaces,
			ServiceProducer::Factory(factory, scope),
			properties,
		)
	}

	/// References matching an interface and an optional filter string,
	/// best-first, after service find hooks had their say.
	pub fn service_references(
		&self,
		interface: Option<&str>,
		filter: Option<&str>,
	) -> Result<Vec<ServiceReference>> {
		let (_, core) = self.handles()?;
		let parsed = match filter {
			Some(text) => Some(Filter::new(text)?),
			None => None,
		};
		let mut references = core.services.find(interface, parsed.as_ref());
		hooks::filter_service_references(&core, self, interface, filter, &mut references);
		Ok(references)
	}

	/// The best reference for an interface: highest ranking, then lowest id.
	pub fn service_reference(&self, interface: &str) -> Result<ServiceReference> {
		self.service_references(Some(interface), None)?
			.into_iter()
			.next()
			.ok_or_else(|| Error::NotFound(format!("no service registered under `{interface}`")))
	}

	/// Acquires the service a reference names.
	///
	/// The returned guard shares ownership of the acquisition and performs
	/// the matching release when the last clone drops.
	pub fn get_service(&self, reference: &ServiceReference) -> Result<ServiceGuard> {
		let (bundle, core) = self.handles()?;
		let registration = reference
			.upgrade()
			.ok_or_else(|| Error::InvalidArgument("stale service reference".into()))?;
		let interface = registration.interfaces.first().cloned().unwrap_or_default();
		let instances = core.services.get(&core, &registration, &bundle)?;
		Ok(ServiceGuard::new(registration, &bundle, instances, interface))
	}

	/// A handle for acquiring multiple instances of a prototype-scope
	/// service.
	pub fn service_objects(&self, reference: &ServiceReference) -> Result<ServiceObjects> {
		let (bundle, _) = self.handles()?;
		if reference.upgrade().is_none() {
			return Err(Error::InvalidArgument("stale service reference".into()));
		}
		Ok(ServiceObjects::new(&bundle, reference.clone()))
	}

	/// Adds a service listener with no filter.
	pub fn add_service_listener(
		&self,
		listener: impl Fn(&ServiceEvent) + Send + Sync + 'static,
	) -> Result<ListenerToken> {
		self.add_service_listener_with(Arc::new(listener), 0, None)
	}

	/// Adds a service listener with explicit identity data and an optional
	/// filter.
	///
	/// Re-adding the same (callable, data) pair replaces the filter and
	/// returns the original token.
	pub fn add_service_listener_with(
		&self,
		listener: ServiceListenerFn,
		data: usize,
		filter: Option<&str>,
	) -> Result<ListenerToken> {
		let (_, core) = self.handles()?;
		let parsed = match filter {
			Some(text) => Some(Filter::new(text)?),
			None => None,
		};
		Ok(core
			.listeners
			.add_service_listener(Arc::downgrade(&self.inner), listener, data, parsed))
	}

	/// Adds a bundle lifecycle listener.
	pub fn add_bundle_listener(
		&self,
		listener: impl Fn(&BundleEvent) + Send + Sync + 'static,
	) -> Result<ListenerToken> {
		self.add_bundle_listener_with(Arc::new(listener), 0)
	}

	pub fn add_bundle_listener_with(
		&self,
		listener: BundleListenerFn,
		data: usize,
	) -> Result<ListenerToken> {
		let (_, core) = self.handles()?;
		Ok(core
			.listeners
			.add_bundle_listener(Arc::downgrade(&self.inner), listener, data))
	}

	/// Adds a framework event listener.
	pub fn add_framework_listener(
		&self,
		listener: impl Fn(&FrameworkEvent) + Send + Sync + 'static,
	) -> Result<ListenerToken> {
		self.add_framework_listener_with(Arc::new(listener), 0)
	}

	pub fn add_framework_listener_with(
		&self,
		listener: FrameworkListenerFn,
		data: usize,
	) -> Result<ListenerToken> {
		let (_, core) = self.handles()?;
		Ok(core
			.listeners
			.add_framework_listener(Arc::downgrade(&self.inner), listener, data))
	}

	/// Removes a listener of any kind by token. Unknown tokens are a no-op.
	pub fn remove_listener(&self, token: ListenerToken) -> Result<()> {
		let (_, core) = self.handles()?;
		core.listeners.remove_token(token);
		Ok(())
	}

	/// Removes a service listener by its (callable, data) identity.
	pub fn remove_service_listener(&self, listener: &ServiceListenerFn, data: usize) -> Result<()> {
		let (_, core) = self.handles()?;
		core.listeners
			.remove_service_listener(&Arc::downgrade(&self.inner), ListenerKey::of(listener, data));
		Ok(())
	}

	pub fn remove_bundle_listener(&self, listener: &BundleListenerFn, data: usize) -> Result<()> {
		let (_, core) = self.handles()?;
		core.listeners
			.remove_bundle_listener(&Arc::downgrade(&self.inner), ListenerKey::of(listener, data));
		Ok(())
	}

	pub fn remove_framework_listener(
		&self,
		listener: &FrameworkListenerFn,
		data: usize,
	) -> Result<()> {
		let (_, core) = self.handles()?;
		core.listeners
			.remove_framework_listener(&Arc::downgrade(&self.inner), ListenerKey::of(listener, data));
		Ok(())
	}

	/// A path inside the bundle's private data directory, creating the
	/// directory on first use.
	pub fn data_file(&self, relative: &str) -> Result<PathBuf> {
		let (bundle, core) = self.handles()?;
		let dir = core.storage_root.join(bundle.id.to_string());
		std::fs::create_dir_all(&dir)?;
		Ok(dir.join(relative))
	}
}

impl PartialEq for BundleContext {
	fn eq(&self, other: &Self) -> bool {
		Arc::ptr_eq(&self.inner, &other.inner)
	}
}

impl Eq for BundleContext {}

impl fmt::Debug for BundleContext {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("BundleContext")
			.field("valid", &self.is_valid())
			.field(
				"bundle",
				&self.inner.bundle.upgrade().map(|b| b.id),
			)
			.finish()
	}
}
