//! The installed-bundle table.

use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use rustc_hash::FxHashMap;

use crate::bundle::{Bundle, BundleInner, BundleState};

/// Strong until uninstall, weak afterwards: the table stops keeping an
/// uninstalled bundle alive, but still resolves its id while user handles
/// remain.
enum Slot {
	Installed(Arc<BundleInner>),
	Uninstalled(Weak<BundleInner>),
}

impl Slot {
	fn get(&self) -> Option<Arc<BundleInner>> {
		match self {
			Slot::Installed(bundle) => Some(bundle.clone()),
			Slot::Uninstalled(bundle) => bundle.upgrade(),
		}
	}
}

struct Table {
	/// Installed bundle ids start at 1; 0 is the framework bundle.
	next_id: u64,
	by_id: FxHashMap<u64, Slot>,
	by_location: FxHashMap<String, u64>,
}

/// The table of bundles known to one framework instance.
pub(crate) struct BundleRegistry {
	table: Mutex<Table>,
}

impl BundleRegistry {
	pub fn new() -> Self {
		Self {
			table: Mutex::new(Table {
				next_id: 1,
				by_id: FxHashMap::default(),
				by_location: FxHashMap::default(),
			}),
		}
	}

	/// Stores the framework bundle under id 0.
	pub fn adopt_framework(&self, framework: Arc<BundleInner>) {
		let mut table = self.table.lock();
		table.by_location.insert(framework.location.clone(), 0);
		table.by_id.insert(0, Slot::Installed(framework));
	}

	/// Allocates an id and stores a new bundle, or returns the bundle
	/// already installed at the location.
	pub fn insert(
		&self,
		location: &str,
		build: impl FnOnce(u64) -> Arc<BundleInner>,
	) -> (Arc<BundleInner>, bool) {
		let mut table = self.table.lock();
		if let Some(id) = table.by_location.get(location).copied()
			&& let Some(existing) = table.by_id.get(&id).and_then(Slot::get)
		{
			return (existing, false);
		}
		let id = table.next_id;
		table.next_id += 1;
		let bundle = build(id);
		table.by_id.insert(id, Slot::Installed(bundle.clone()));
		table.by_location.insert(location.to_owned(), id);
		(bundle, true)
	}

	/// Resolves a bundle by id, uninstalled ones included while a handle
	/// survives.
	pub fn get(&self, id: u64) -> Option<Arc<BundleInner>> {
		self.table.lock().by_id.get(&id).and_then(Slot::get)
	}

	pub fn by_location(&self, location: &str) -> Option<Arc<BundleInner>> {
		let table = self.table.lock();
		let id = table.by_location.get(location)?;
		table.by_id.get(id).and_then(Slot::get)
	}

	/// All bundles that are not uninstalled, in install (id) order.
	pub fn bundles(&self) -> Vec<Bundle> {
		// State is read after the table lock is released; the lock order is
		// bundle-state before bundle-registry, never the reverse.
		let collected: Vec<Arc<BundleInner>> = {
			let table = self.table.lock();
			let mut ids: Vec<u64> = table.by_id.keys().copied().collect();
			ids.sort_unstable();
			ids.iter()
				.filter_map(|id| table.by_id.get(id).and_then(Slot::get))
				.collect()
		};
		collected
			.into_iter()
			.filter(|bundle| bundle.state() != BundleState::Uninstalled)
			.map(Bundle::from_inner)
			.collect()
	}

	pub fn by_symbolic_name(&self, name: &str) -> Vec<Bundle> {
		self.bundles()
			.into_iter()
			.filter(|bundle| bundle.symbolic_name() == name)
			.collect()
	}

	/// Downgrades the registry's reference and frees the location for
	/// reinstallation.
	pub fn mark_uninstalled(&self, id: u64) {
		let mut table = self.table.lock();
		if let Some(slot) = table.by_id.get_mut(&id)
			&& let Slot::Installed(bundle) = slot
		{
			let weak = Arc::downgrade(bundle);
			let location = bundle.location.clone();
			*slot = Slot::Uninstalled(weak);
			table.by_location.remove(&location);
		}
	}
}
