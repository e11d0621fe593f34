//! Mirrors a set of service registrations.

use std::sync::Arc;

use parking_lot::Mutex;
use rustc_hash::{FxHashMap, FxHashSet};
use tracing::warn;

use crate::bundle::context::BundleContext;
use crate::constants;
use crate::error::Result;
use crate::event::listeners::ListenerToken;
use crate::event::{ServiceEvent, ServiceEventKind};
use crate::service::{ServiceGuard, ServiceReference};
use crate::tracker::TrackerTarget;
use crate::tracker::latch::CounterLatch;
use crate::util::contain;

/// Chooses the value a [`ServiceTracker`] keeps per tracked reference.
///
/// Callbacks run on the thread that caused the mutation, with no tracker
/// lock held. Panics are contained and logged.
pub trait ServiceTrackerCustomizer: Send + Sync {
	type Tracked: Send + Sync + 'static;

	/// Called when a matching service appears. Returning `None` leaves the
	/// service untracked.
	fn adding(&self, reference: &ServiceReference) -> Option<Self::Tracked>;

	/// Called when a tracked service's properties changed but it still
	/// matches.
	fn modified(&self, _reference: &ServiceReference, _tracked: &Self::Tracked) {}

	/// Called when a tracked service stops matching or unregisters.
	fn removed(&self, _reference: &ServiceReference, _tracked: &Self::Tracked) {}
}

/// The default customizer: acquires the service and tracks the guard, so
/// tracked services stay alive while mirrored.
pub struct DefaultCustomizer {
	context: BundleContext,
}

impl ServiceTrackerCustomizer for DefaultCustomizer {
	type Tracked = ServiceGuard;

	fn adding(&self, reference: &ServiceReference) -> Option<ServiceGuard> {
		self.context.get_service(reference).ok()
	}
}

struct Entry<T> {
	reference: ServiceReference,
	value: Arc<T>,
}

struct TrackState<T> {
	open: bool,
	token: Option<ListenerToken>,
	tracked: FxHashMap<i64, Entry<T>>,
	/// Ids whose `adding` call is in flight, to keep the open-time snapshot
	/// and a racing event from double-adding.
	pending: FxHashSet<i64>,
	tracking_count: i64,
}

struct Shared<C: ServiceTrackerCustomizer> {
	context: BundleContext,
	target: TrackerTarget,
	customizer: C,
	state: Mutex<TrackState<C::Tracked>>,
	latch: CounterLatch,
}

/// Mirrors the registrations matching an interface name or filter.
///
/// The tracking count increments on every add, modify, and remove, and never
/// decreases while open; it answers "has anything changed since I last
/// looked?".
pub struct ServiceTracker<C: ServiceTrackerCustomizer + 'static = DefaultCustomizer> {
	shared: Arc<Shared<C>>,
}

impl ServiceTracker<DefaultCustomizer> {
	/// Tracks services with the default customizer, holding an acquisition
	/// per tracked service.
	pub fn new(context: &BundleContext, target: impl Into<TrackerTarget>) -> Self {
		Self::with_customizer(context, target, DefaultCustomizer { context: context.clone() })
	}
}

impl<C: ServiceTrackerCustomizer + 'static> ServiceTracker<C> {
	/// Tracks services through a caller-supplied customizer.
	pub fn with_customizer(
		context: &BundleContext,
		target: impl Into<TrackerTarget>,
		customizer: C,
	) -> Self {
		Self {
			shared: Arc::new(Shared {
				context: context.clone(),
				target: target.into(),
				customizer,
				state: Mutex::new(TrackState {
					open: false,
					token: None,
					tracked: FxHashMap::default(),
					pending: FxHashSet::default(),
					tracking_count: 0,
				}),
				latch: CounterLatch::new(),
			}),
		}
	}

	/// Arms the listener, then seeds the tracker from the current snapshot
	/// of matching services. Idempotent.
	pub fn open(&self) -> Result<()> {
		{
			let mut state = self.shared.state.lock();
			if state.open {
				return Ok(());
			}
			state.open = true;
		}
		let armed = self.arm();
		if armed.is_err() {
			self.shared.state.lock().open = false;
		}
		armed
	}

	fn arm(&self) -> Result<()> {
		let filter_text = match &self.shared.target {
			TrackerTarget::Interface(interface) => {
				format!("({}={interface})", constants::OBJECTCLASS)
			}
			TrackerTarget::Filter(filter) => filter.to_string(),
		};
		let weak = Arc::downgrade(&self.shared);
		let token = self.shared.context.add_service_listener_with(
			Arc::new(move |event: &ServiceEvent| {
				if let Some(shared) = weak.upgrade() {
					shared.on_event(event);
				}
			}),
			0,
			Some(&filter_text),
		)?;
		self.shared.state.lock().token = Some(token);

		// Services registered between the listener arming and this snapshot
		// are classified twice; the pending set makes that harmless.
		let (interface, filter) = match &self.shared.target {
			TrackerTarget::Interface(interface) => (Some(interface.as_str()), None),
			TrackerTarget::Filter(_) => (None, Some(filter_text.as_str())),
		};
		for reference in self.shared.context.service_references(interface, filter)? {
			self.shared.track_adding(reference);
		}
		Ok(())
	}

	/// Disarms the listener, waits for in-flight customizer calls, and
	/// removes every remaining entry.
	pub fn close(&self) {
		let token = {
			let mut state = self.shared.state.lock();
			if !state.open {
				return;
			}
			state.open = false;
			state.token.take()
		};
		if let Some(token) = token {
			// The owning context may already be invalid; its teardown
			// removed the listener for us.
			let _ = self.shared.context.remove_listener(token);
		}
		self.shared.latch.wait_for_zero();

		let drained: Vec<Entry<C::Tracked>> = {
			let mut state = self.shared.state.lock();
			let entries = state.tracked.drain().map(|(_, entry)| entry).collect();
			state.tracking_count += 1;
			entries
		};
		for entry in drained {
			if contain(|| self.shared.customizer.removed(&entry.reference, &entry.value)).is_err() {
				warn!("tracker customizer panicked during close");
			}
		}
	}

	/// Blocks until no customizer call is in flight.
	pub fn wait_for_customizers(&self) {
		self.shared.latch.wait_for_zero();
	}

	/// Number of currently tracked services.
	pub fn size(&self) -> usize {
		self.shared.state.lock().tracked.len()
	}

	pub fn is_empty(&self) -> bool {
		self.size() == 0
	}

	/// The monotone mutation counter, or -1 while the tracker is closed.
	pub fn tracking_count(&self) -> i64 {
		let state = self.shared.state.lock();
		if state.open { state.tracking_count } else { -1 }
	}

	/// The customized value for a tracked reference.
	pub fn get(&self, reference: &ServiceReference) -> Option<Arc<C::Tracked>> {
		self.shared
			.state
			.lock()
			.tracked
			.get(&reference.service_id())
			.map(|entry| entry.value.clone())
	}

	/// References currently tracked, best-first.
	pub fn service_references(&self) -> Vec<ServiceReference> {
		let mut references: Vec<ServiceReference> = self
			.shared
			.state
			.lock()
			.tracked
			.values()
			.map(|entry| entry.reference.clone())
			.collect();
		references.sort();
		references
	}

	/// Tracked values, in reference order.
	pub fn services(&self) -> Vec<Arc<C::Tracked>> {
		let state = self.shared.state.lock();
		let mut entries: Vec<&Entry<C::Tracked>> = state.tracked.values().collect();
		entries.sort_by(|a, b| a.reference.cmp(&b.reference));
		entries.iter().map(|entry| entry.value.clone()).collect()
	}
}

impl<C: ServiceTrackerCustomizer + 'static> Drop for ServiceTracker<C> {
	fn drop(&mut self) {
		self.close();
	}
}

impl<C: ServiceTrackerCustomizer> Shared<C> {
	/// Classifies one event against the current map.
	fn on_event(&self, event: &ServiceEvent) {
		if !self.state.lock().open {
			return;
		}
		match event.kind {
			// The listener filter already established that the service
			// matches the target for these kinds.
			ServiceEventKind::Registered | ServiceEventKind::Modified => {
				let tracked = self
					.state
					.lock()
					.tracked
					.contains_key(&event.reference.service_id());
				if tracked {
					self.track_modified(&event.reference);
				} else {
					self.track_adding(event.reference.clone());
				}
			}
			ServiceEventKind::ModifiedEndMatch | ServiceEventKind::Unregistering => {
				self.track_removed(&event.reference);
			}
		}
	}

	fn track_adding(&self, reference: ServiceReference) {
		let id = reference.service_id();
		{
			let mut state = self.state.lock();
			if !state.open || state.tracked.contains_key(&id) || !state.pending.insert(id) {
				return;
			}
		}

		self.latch.enter();
		let value = match contain(|| self.customizer.adding(&reference)) {
			Ok(value) => value,
			Err(panic) => {
				warn!("tracker customizer panicked while adding: {panic}");
				None
			}
		};

		let orphan = {
			let mut state = self.state.lock();
			state.pending.remove(&id);
			match value {
				Some(value) if state.open => {
					state
						.tracked
						.insert(id, Entry { reference: reference.clone(), value: Arc::new(value) });
					state.tracking_count += 1;
					None
				}
				other => other,
			}
		};
		// A value produced after close raced the shutdown; balance it with
		// an immediate removal.
		if let Some(value) = orphan {
			let value = Arc::new(value);
			if contain(|| self.customizer.removed(&reference, &value)).is_err() {
				warn!("tracker customizer panicked during removal");
			}
		}
		self.latch.exit();
	}

	fn track_modified(&self, reference: &ServiceReference) {
		let value = {
			let mut state = self.state.lock();
			let Some(entry) = state.tracked.get(&reference.service_id()) else {
				return;
			};
			let value = entry.value.clone();
			state.tracking_count += 1;
			value
		};
		self.latch.enter();
		if let Err(panic) = contain(|| self.customizer.modified(reference, &value)) {
			warn!("tracker customizer panicked while modifying: {panic}");
		}
		self.latch.exit();
	}

	fn track_removed(&self, reference: &ServiceReference) {
		let entry = {
			let mut state = self.state.lock();
			let entry = state.tracked.remove(&reference.service_id());
			if entry.is_some() {
				state.tracking_count += 1;
			}
			entry
		};
		let Some(entry) = entry else { return };
		self.latch.enter();
		if let Err(panic) = contain(|| self.customizer.removed(reference, &entry.value)) {
			warn!("tracker customizer panicked while removing: {panic}");
		}
		self.latch.exit();
	}
}
