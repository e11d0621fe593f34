//! Mirrors the set of bundles in selected states.

use std::sync::Arc;

use parking_lot::Mutex;
use rustc_hash::{FxHashMap, FxHashSet};
use tracing::warn;

use crate::bundle::Bundle;
use crate::bundle::context::BundleContext;
use crate::error::Result;
use crate::event::BundleEvent;
use crate::event::listeners::ListenerToken;
use crate::tracker::latch::CounterLatch;
use crate::util::contain;

/// Chooses the value a [`BundleTracker`] keeps per tracked bundle.
pub trait BundleTrackerCustomizer: Send + Sync {
	type Tracked: Send + Sync + 'static;

	/// Called when a bundle enters a state covered by the mask. Returning
	/// `None` leaves the bundle untracked.
	fn adding(&self, bundle: &Bundle) -> Option<Self::Tracked>;

	/// Called when a tracked bundle changes state but stays in the mask.
	fn modified(&self, _bundle: &Bundle, _tracked: &Self::Tracked) {}

	/// Called when a tracked bundle leaves the mask or uninstalls.
	fn removed(&self, _bundle: &Bundle, _tracked: &Self::Tracked) {}
}

/// The default customizer: tracks the bundle handle itself.
pub struct DefaultBundleCustomizer;

impl BundleTrackerCustomizer for DefaultBundleCustomizer {
	type Tracked = Bundle;

	fn adding(&self, bundle: &Bundle) -> Option<Bundle> {
		Some(bundle.clone())
	}
}

struct Entry<T> {
	bundle: Bundle,
	value: Arc<T>,
}

struct TrackState<T> {
	open: bool,
	token: Option<ListenerToken>,
	tracked: FxHashMap<u64, Entry<T>>,
	pending: FxHashSet<u64>,
	tracking_count: i64,
}

struct Shared<C: BundleTrackerCustomizer> {
	context: BundleContext,
	/// Bitwise or of [`BundleState::bit`] values to track.
	mask: u32,
	customizer: C,
	state: Mutex<TrackState<C::Tracked>>,
	latch: CounterLatch,
}

/// Mirrors the bundles whose state is covered by a mask, driven by bundle
/// events.
pub struct BundleTracker<C: BundleTrackerCustomizer + 'static = DefaultBundleCustomizer> {
	shared: Arc<Shared<C>>,
}

impl BundleTracker<DefaultBundleCustomizer> {
	/// Tracks bundle handles for every bundle whose state bit is in `mask`.
	pub fn new(context: &BundleContext, mask: u32) -> Self {
		Self::with_customizer(context, mask, DefaultBundleCustomizer)
	}
}

impl<C: BundleTrackerCustomizer + 'static> BundleTracker<C> {
	pub fn with_customizer(context: &BundleContext, mask: u32, customizer: C) -> Self {
		Self {
			shared: Arc::new(Shared {
				context: context.clone(),
				mask,
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

	/// Arms the listener, then seeds from the current bundle set. Idempotent.
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
		let weak = Arc::downgrade(&self.shared);
		let token = self.shared.context.add_bundle_listener_with(
			Arc::new(move |event: &BundleEvent| {
				if let Some(shared) = weak.upgrade() {
					shared.on_event(event);
				}
			}),
			0,
		)?;
		self.shared.state.lock().token = Some(token);

		for bundle in self.shared.context.bundles()? {
			if bundle.state().bit() & self.shared.mask != 0 {
				self.shared.track_adding(bundle);
			}
		}
		Ok(())
	}

	/// Disarms the listener, drains in-flight customizers, and removes all
	/// entries.
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
			if contain(|| self.shared.customizer.removed(&entry.bundle, &entry.value)).is_err() {
				warn!("bundle tracker customizer panicked during close");
			}
		}
	}

	/// Blocks until no customizer call is in flight.
	pub fn wait_for_customizers(&self) {
		self.shared.latch.wait_for_zero();
	}

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

	/// The customized value for a tracked bundle.
	pub fn get(&self, bundle: &Bundle) -> Option<Arc<C::Tracked>> {
		self.shared
			.state
			.lock()
			.tracked
			.get(&bundle.id())
			.map(|entry| entry.value.clone())
	}

	/// Tracked bundles in install order.
	pub fn bundles(&self) -> Vec<Bundle> {
		let mut bundles: Vec<Bundle> = self
			.shared
			.state
			.lock()
			.tracked
			.values()
			.map(|entry| entry.bundle.clone())
			.collect();
		bundles.sort_by_key(Bundle::id);
		bundles
	}
}

impl<C: BundleTrackerCustomizer + 'static> Drop for BundleTracker<C> {
	fn drop(&mut self) {
		self.close();
	}
}

impl<C: BundleTrackerCustomizer> Shared<C> {
	/// Classifies a bundle event against the mask and the current map.
	fn on_event(&self, event: &BundleEvent) {
		if !self.state.lock().open {
			return;
		}
		let bundle = &event.bundle;
		let in_mask = bundle.state().bit() & self.mask != 0;
		let tracked = self.state.lock().tracked.contains_key(&bundle.id());
		match (tracked, in_mask) {
			(false, true) => self.track_adding(bundle.clone()),
			(true, true) => self.track_modified(bundle),
			(true, false) => self.track_removed(bundle),
			(false, false) => {}
		}
	}

	fn track_adding(&self, bundle: Bundle) {
		let id = bundle.id();
		{
			let mut state = self.state.lock();
			if !state.open || state.tracked.contains_key(&id) || !state.pending.insert(id) {
				return;
			}
		}

		self.latch.enter();
		let value = match contain(|| self.customizer.adding(&bundle)) {
			Ok(value) => value,
			Err(panic) => {
				warn!("bundle tracker customizer panicked while adding: {panic}");
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
						.insert(id, Entry { bundle: bundle.clone(), value: Arc::new(value) });
					state.tracking_count += 1;
					None
				}
				other => other,
			}
		};
		if let Some(value) = orphan {
			let value = Arc::new(value);
			if contain(|| self.customizer.removed(&bundle, &value)).is_err() {
				warn!("bundle tracker customizer panicked during removal");
			}
		}
		self.latch.exit();
	}

	fn track_modified(&self, bundle: &Bundle) {
		let value = {
			let mut state = self.state.lock();
			let Some(entry) = state.tracked.get(&bundle.id()) else { return };
			let value = entry.value.clone();
			state.tracking_count += 1;
			value
		};
		self.latch.enter();
		if let Err(panic) = contain(|| self.customizer.modified(bundle, &value)) {
			warn!("bundle tracker customizer panicked while modifying: {panic}");
		}
		self.latch.exit();
	}

	fn track_removed(&self, bundle: &Bundle) {
		let entry = {
			let mut state = self.state.lock();
			let entry = state.tracked.remove(&bundle.id());
			if entry.is_some() {
				state.tracking_count += 1;
			}
			entry
		};
		let Some(entry) = entry else { return };
		self.latch.enter();
		if let Err(panic) = contain(|| self.customizer.removed(bundle, &entry.value)) {
			warn!("bundle tracker customizer panicked while removing: {panic}");
		}
		self.latch.exit();
	}
}
