//! Visibility hooks.
//!
//! Hooks are ordinary services registered under the well-known interface
//! names in [`constants`]. The registry queries the currently registered hook
//! services on every use - there is no second registry - takes a stable
//! snapshot, releases all locks, and only then invokes them, so a hook may
//! re-enter the registry freely and a concurrently deregistered hook is
//! simply skipped.

use std::sync::Arc;

use rustc_hash::FxHashSet;

use crate::bundle::Bundle;
use crate::bundle::context::BundleContext;
use crate::constants;
use crate::core_context::CoreContext;
use crate::event::ServiceEvent;
use crate::event::listeners::ServiceListenerEntry;
use crate::service::{ServiceGuard, ServiceReference};
use crate::util::contain;


/// Reorders or hides bundles returned from bundle queries.
///
/// Register under [`constants::BUNDLE_FIND_HOOK`] with
/// [`InterfaceMapBuilder::shared`](crate::service::InterfaceMapBuilder::shared).
pub trait BundleFindHook: Send + Sync {
	/// Prunes `bundles` in place for the querying context.
	fn find(&self, context: &BundleContext, bundles: &mut Vec<Bundle>);
}

/// Hides references returned from service reference queries.
///
/// Register under [`constants::SERVICE_FIND_HOOK`].
pub trait ServiceFindHook: Send + Sync {
	/// Prunes `references` in place for the querying context.
	fn find(
		&self,
		context: &BundleContext,
		interface: Option<&str>,
		filter: Option<&str>,
		references: &mut Vec<ServiceReference>,
	);
}

/// Hides service events from specific listeners.
///
/// Register under [`constants::SERVICE_EVENT_HOOK`].
pub trait ServiceEventHook: Send + Sync {
	/// Prunes `contexts` in place; listeners owned by removed contexts do
	/// not see `event`.
	fn event(&self, event: &ServiceEvent, contexts: &mut Vec<BundleContext>);
}

/// Acquires the current hook services registered under `interface`,
/// best-first. The guards keep the acquisitions alive for the duration of
/// one hook pass.
fn acquire<T: ?Sized + Send + Sync + 'static>(
	core: &Arc<CoreContext>,
	interface: &str,
) -> Vec<(Arc<T>, ServiceGuard)> {
	let Some(framework) = core.framework_bundle() else {
		return Vec::new();
	};
	let references = core.services.find(Some(interface), None);
	let mut hooks = Vec::with_capacity(references.len());
	for reference in references {
		let Some(registration) = reference.upgrade() else { continue };
		let Ok(instances) = core.services.get(core, &registration, &framework) else {
			continue;
		};
		let guard = ServiceGuard::new(
			registration,
			&framework,
			instances,
			interface.to_owned(),
		);
		if let Some(hook) = guard.interface_map().shared::<T>(interface) {
			hooks.push((hook, guard));
		}
	}
	hooks
}

/// Runs bundle find hooks over a query result.
pub(crate) fn filter_bundles(
	core: &Arc<CoreContext>,
	context: &BundleContext,
	bundles: &mut Vec<Bundle>,
) {
	for (hook, _guard) in acquire::<dyn BundleFindHook>(core, constants::BUNDLE_FIND_HOOK) {
		if let Err(panic) = contain(|| hook.find(context, bundles)) {
			core.report_error(None, format!("bundle find hook panicked: {panic}"));
		}
	}
}

/// Runs service find hooks over a query result.
pub(crate) fn filter_service_references(
	core: &Arc<CoreContext>,
	context: &BundleContext,
	interface: Option<&str>,
	filter: Option<&str>,
	references: &mut Vec<ServiceReference>,
) {
	for (hook, _guard) in acquire::<dyn ServiceFindHook>(core, constants::SERVICE_FIND_HOOK) {
		if let Err(panic) = contain(|| hook.find(context, interface, filter, references)) {
			core.report_error(None, format!("service find hook panicked: {panic}"));
		}
	}
}

/// Runs service event hooks and returns the context ids still allowed to see
/// the event.
pub(crate) fn filter_event_recipients(
	core: &Arc<CoreContext>,
	event: &ServiceEvent,
	snapshot: &[Arc<ServiceListenerEntry>],
) -> FxHashSet<usize> {
	let mut contexts: Vec<BundleContext> = Vec::new();
	let mut seen: FxHashSet<usize> = FxHashSet::default();
	for entry in snapshot {
		if let Some(owner) = entry.owner.upgrade()
			&& seen.insert(Arc::as_ptr(&owner) as usize)
		{
			contexts.push(BundleContext::new(owner));
		}
	}

	let hooks = acquire::<dyn ServiceEventHook>(core, constants::SERVICE_EVENT_HOOK);
	for (hook, _guard) in hooks {
		if let Err(panic) = contain(|| hook.event(event, &mut contexts)) {
			core.report_error(None, format!("service event hook panicked: {panic}"));
		}
	}

	contexts.into_iter().map(|ctx| ctx.inner.id()).collect()
}
