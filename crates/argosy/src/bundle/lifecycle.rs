//! The bundle lifecycle state machine.
//!
//! Transitions are serialized per bundle by an in-transition flag under the
//! bundle's state mutex; the mutex itself is never held while activator code
//! runs. Event broadcast happens after each transition completes, on the
//! caller's thread.

use std::sync::Arc;

use tracing::debug;

use crate::bundle::context::{BundleContext, ContextInner};
use crate::bundle::{BundleInner, BundleState};
use crate::core_context::CoreContext;
use crate::error::{Error, Result};
use crate::event::BundleEventKind;
use crate::util::contain;

/// Drives RESOLVED -> STARTING -> ACTIVE, falling back to RESOLVED if the
/// activator fails.
pub(crate) fn start(bundle: &Arc<BundleInner>) -> Result<()> {
	let core = bundle
		.core()
		.ok_or_else(|| Error::InvalidState("the framework is no longer running".into()))?;

	let context = {
		let mut lifecycle = bundle.lifecycle.lock();
		while lifecycle.in_transition {
			bundle.transition_done.wait(&mut lifecycle);
		}
		match lifecycle.state {
			BundleState::Active => return Ok(()),
			BundleState::Installed | BundleState::Resolved => {}
			state => {
				return Err(Error::InvalidState(format!(
					"cannot start bundle {} from state {state}",
					bundle.id
				)));
			}
		}
		lifecycle.state = BundleState::Starting;
		lifecycle.in_transition = true;
		let context = ContextInner::new(Arc::downgrade(bundle));
		lifecycle.context = Some(context.clone());
		context
	};

	debug!(bundle = bundle.id, name = %bundle.symbolic_name, "starting bundle");
	let handle = BundleContext::new(context.clone());
	let mut activator = bundle.activator_factory.as_ref().map(|factory| factory());
	let outcome = match activator.as_mut() {
		Some(activator) => match contain(|| activator.start(&handle)) {
			Ok(Ok(())) => Ok(()),
			Ok(Err(error)) => Err(error.to_string()),
			Err(panic) => Err(panic),
		},
		None => Ok(()),
	};

	match outcome {
		Ok(()) => {
			{
				let mut lifecycle = bundle.lifecycle.lock();
				lifecycle.state = BundleState::Active;
				lifecycle.activator = activator;
				lifecycle.in_transition = false;
				bundle.transition_done.notify_all();
			}
			core.post_bundle_event(BundleEventKind::Started, bundle);
			Ok(())
		}
		Err(message) => {
			// The failed start tears the context down again before the
			// bundle settles back in RESOLVED.
			invalidate_context(&core, bundle, &context);
			{
				let mut lifecycle = bundle.lifecycle.lock();
				lifecycle.state = BundleState::Resolved;
				lifecycle.context = None;
				lifecycle.in_transition = false;
				bundle.transition_done.notify_all();
			}
			let description = format!(
				"activator start failed for bundle {} ({}): {message}",
				bundle.id, bundle.symbolic_name
			);
			core.report_error(Some(crate::bundle::Bundle::from_inner(bundle.clone())), description.clone());
			Err(Error::Activator(description))
		}
	}
}

/// Drives ACTIVE -> STOPPING -> RESOLVED. Activator failures are reported
/// but never block the transition.
pub(crate) fn stop(bundle: &Arc<BundleInner>) -> Result<()> {
	let core = bundle
		.core()
		.ok_or_else(|| Error::InvalidState("the framework is no longer running".into()))?;

	let (context, mut activator) = {
		let mut lifecycle = bundle.lifecycle.lock();
		while lifecycle.in_transition {
			bundle.transition_done.wait(&mut lifecycle);
		}
		match lifecycle.state {
			BundleState::Active => {}
			BundleState::Installed | BundleState::Resolved => return Ok(()),
			state => {
				return Err(Error::InvalidState(format!(
					"cannot stop bundle {} from state {state}",
					bundle.id
				)));
			}
		}
		let Some(context) = lifecycle.context.clone() else {
			return Err(Error::Internal(format!("active bundle {} has no context", bundle.id)));
		};
		lifecycle.state = BundleState::Stopping;
		lifecycle.in_transition = true;
		(context, lifecycle.activator.take())
	};

	debug!(bundle = bundle.id, name = %bundle.symbolic_name, "stopping bundle");
	core.post_bundle_event(BundleEventKind::Stopping, bundle);

	let handle = BundleContext::new(context.clone());
	let stop_error = match activator.as_mut() {
		Some(activator) => match contain(|| activator.stop(&handle)) {
			Ok(Ok(())) => None,
			Ok(Err(error)) => Some(error.to_string()),
			Err(panic) => Some(panic),
		},
		None => None,
	};

	// The context dies on exit from STOPPING regardless of the activator's
	// outcome.
	invalidate_context(&core, bundle, &context);
	{
		let mut lifecycle = bundle.lifecycle.lock();
		lifecycle.state = BundleState::Resolved;
		lifecycle.context = None;
		lifecycle.in_transition = false;
		bundle.transition_done.notify_all();
	}

	if let Some(message) = stop_error {
		core.report_error(
			Some(crate::bundle::Bundle::from_inner(bundle.clone())),
			format!(
				"activator stop failed for bundle {} ({}): {message}",
				bundle.id, bundle.symbolic_name
			),
		);
	}
	core.post_bundle_event(BundleEventKind::Stopped, bundle);
	Ok(())
}

/// Uninstalls a bundle, stopping it first if it is active. Terminal; the
/// record is retained so identity queries keep resolving.
pub(crate) fn uninstall(bundle: &Arc<BundleInner>) -> Result<()> {
	let core = bundle
		.core()
		.ok_or_else(|| Error::InvalidState("the framework is no longer running".into()))?;
	if bundle.id == 0 {
		return Err(Error::InvalidState("the framework bundle cannot be uninstalled".into()));
	}

	let was_resolved = loop {
		if bundle.state() == BundleState::Active {
			stop(bundle)?;
		}
		let mut lifecycle = bundle.lifecycle.lock();
		while lifecycle.in_transition {
			bundle.transition_done.wait(&mut lifecycle);
		}
		match lifecycle.state {
			BundleState::Uninstalled => {
				return Err(Error::InvalidState(format!(
					"bundle {} is already uninstalled",
					bundle.id
				)));
			}
			// Restarted while we were not looking; stop it again.
			BundleState::Active => continue,
			state => {
				lifecycle.state = BundleState::Uninstalled;
				break state != BundleState::Installed;
			}
		}
	};

	core.bundles.mark_uninstalled(bundle.id);
	debug!(bundle = bundle.id, name = %bundle.symbolic_name, "bundle uninstalled");

	if was_resolved {
		core.post_bundle_event(BundleEventKind::Unresolved, bundle);
	}
	core.post_bundle_event(BundleEventKind::Uninstalled, bundle);
	Ok(())
}

/// Tears down everything attributed to a context: its listeners, the
/// services its bundle registered, and the uses it still holds.
pub(crate) fn invalidate_context(
	core: &Arc<CoreContext>,
	bundle: &Arc<BundleInner>,
	context: &Arc<ContextInner>,
) {
	context.invalidate();
	core.listeners.remove_owner(context.id());
	core.services.unregister_bundle_services(core, bundle.id);
	core.services
		.release_bundle(bundle.id, &crate::bundle::Bundle::from_inner(bundle.clone()));
}
