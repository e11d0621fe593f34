//! Listener tables.
//!
//! Each listener kind has its own table. Mutations go through a mutex;
//! readers load an `ArcSwap` snapshot, so dispatch never holds a table lock
//! while user callbacks run. Entries are kept in token order, which is
//! registration order.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Weak;

use arc_swap::ArcSwap;
use argosy_primitives::Filter;
use parking_lot::Mutex;

use crate::bundle::context::ContextInner;
use crate::event::{BundleEvent, FrameworkEvent, ServiceEvent};

/// Callback invoked for service events.
pub type ServiceListenerFn = Arc<dyn Fn(&ServiceEvent) + Send + Sync>;
/// Callback invoked for bundle lifecycle events.
pub type BundleListenerFn = Arc<dyn Fn(&BundleEvent) + Send + Sync>;
/// Callback invoked for framework events.
pub type FrameworkListenerFn = Arc<dyn Fn(&FrameworkEvent) + Send + Sync>;

/// Opaque handle naming one listener registration.
///
/// Tokens are unique across all listener kinds and monotonically allocated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerToken(pub(crate) u64);

/// Identity of a listener for pair-wise removal: the callable's allocation
/// plus the caller-supplied data word.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ListenerKey {
	pub callable: usize,
	pub data: usize,
}

impl ListenerKey {
	pub fn of<T: ?Sized>(callable: &Arc<T>, data: usize) -> Self {
		Self { callable: Arc::as_ptr(callable) as *const () as usize, data }
	}
}

pub(crate) struct ServiceListenerEntry {
	pub token: ListenerToken,
	pub owner: Weak<ContextInner>,
	pub key: ListenerKey,
	pub listener: ServiceListenerFn,
	pub filter: Option<Filter>,
}

pub(crate) struct BundleListenerEntry {
	pub token: ListenerToken,
	pub owner: Weak<ContextInner>,
	pub key: ListenerKey,
	pub listener: BundleListenerFn,
}

pub(crate) struct FrameworkListenerEntry {
	pub token: ListenerToken,
	pub owner: Weak<ContextInner>,
	pub key: ListenerKey,
	pub listener: FrameworkListenerFn,
}

/// One listener kind's table.
struct ListenerTable<E> {
	entries: Mutex<Vec<Arc<E>>>,
	snap: ArcSwap<Vec<Arc<E>>>,
}

impl<E> ListenerTable<E> {
	fn new() -> Self {
		Self {
			entries: Mutex::new(Vec::new()),
			snap: ArcSwap::from_pointee(Vec::new()),
		}
	}

	/// Runs a mutation under the table lock and republishes the snapshot.
	fn mutate<R>(&self, f: impl FnOnce(&mut Vec<Arc<E>>) -> R) -> R {
		let mut entries = self.entries.lock();
		let result = f(&mut entries);
		self.snap.store(Arc::new(entries.clone()));
		result
	}

	fn snapshot(&self) -> Arc<Vec<Arc<E>>> {
		self.snap.load_full()
	}
}

fn owner_id(owner: &Weak<ContextInner>) -> usize {
	owner.as_ptr() as usize
}

/// All three listener tables plus the shared token counter.
pub(crate) struct ListenerHub {
	next_token: AtomicU64,
	service: ListenerTable<ServiceListenerEntry>,
	bundle: ListenerTable<BundleListenerEntry>,
	framework: ListenerTable<FrameworkListenerEntry>,
}

impl ListenerHub {
	pub fn new() -> Self {
		Self {
			next_token: AtomicU64::new(1),
			service: ListenerTable::new(),
			bundle: ListenerTable::new(),
			framework: ListenerTable::new(),
		}
	}

	fn allocate_token(&self) -> ListenerToken {
		ListenerToken(self.next_token.fetch_add(1, Ordering::Relaxed))
	}

	/// Adds a service listener, or replaces the filter of an existing
	/// (callable, data) pair on the same context. Returns the entry's token.
	pub fn add_service_listener(
		&self,
		owner: Weak<ContextInner>,
		listener: ServiceListenerFn,
		data: usize,
		filter: Option<Filter>,
	) -> ListenerToken {
		let key = ListenerKey::of(&listener, data);
		self.service.mutate(|entries| {
			if let Some(existing) = entries
				.iter_mut()
				.find(|e| e.key == key && owner_id(&e.owner) == owner_id(&owner))
			{
				let token = existing.token;
				*existing = Arc::new(ServiceListenerEntry {
					token,
					owner,
					key,
					listener,
					filter,
				});
				return token;
			}
			let token = self.allocate_token();
			entries.push(Arc::new(ServiceListenerEntry { token, owner, key, listener, filter }));
			token
		})
	}

	pub fn add_bundle_listener(
		&self,
		owner: Weak<ContextInner>,
		listener: BundleListenerFn,
		data: usize,
	) -> ListenerToken {
		let key = ListenerKey::of(&listener, data);
		self.bundle.mutate(|entries| {
			if let Some(existing) = entries
				.iter()
				.find(|e| e.key == key && owner_id(&e.owner) == owner_id(&owner))
			{
				return existing.token;
			}
			let token = self.allocate_token();
			entries.push(Arc::new(BundleListenerEntry { token, owner, key, listener }));
			token
		})
	}

	pub fn add_framework_listener(
		&self,
		owner: Weak<ContextInner>,
		listener: FrameworkListenerFn,
		data: usize,
	) -> ListenerToken {
		let key = ListenerKey::of(&listener, data);
		self.framework.mutate(|entries| {
			if let Some(existing) = entries
				.iter()
				.find(|e| e.key == key && owner_id(&e.owner) == owner_id(&owner))
			{
				return existing.token;
			}
			let token = self.allocate_token();
			entries.push(Arc::new(FrameworkListenerEntry { token, owner, key, listener }));
			token
		})
	}

	/// Removes a listener by token, whichever kind it belongs to. Unknown
	/// tokens are a no-op.
	pub fn remove_token(&self, token: ListenerToken) {
		self.service.mutate(|entries| entries.retain(|e| e.token != token));
		self.bundle.mutate(|entries| entries.retain(|e| e.token != token));
		self.framework.mutate(|entries| entries.retain(|e| e.token != token));
	}

	/// Removes a service listener by its (callable, data) identity.
	pub fn remove_service_listener(&self, owner: &Weak<ContextInner>, key: ListenerKey) {
		self.service.mutate(|entries| {
			entries.retain(|e| !(e.key == key && owner_id(&e.owner) == owner_id(owner)));
		});
	}

	pub fn remove_bundle_listener(&self, owner: &Weak<ContextInner>, key: ListenerKey) {
		self.bundle.mutate(|entries| {
			entries.retain(|e| !(e.key == key && owner_id(&e.owner) == owner_id(owner)));
		});
	}

	pub fn remove_framework_listener(&self, owner: &Weak<ContextInner>, key: ListenerKey) {
		self.framework.mutate(|entries| {
			entries.retain(|e| !(e.key == key && owner_id(&e.owner) == owner_id(owner)));
		});
	}

	/// Drops every listener registered through the given context. Called on
	/// context invalidation.
	pub fn remove_owner(&self, owner: usize) {
		self.service.mutate(|entries| entries.retain(|e| owner_id(&e.owner) != owner));
		self.bundle.mutate(|entries| entries.retain(|e| owner_id(&e.owner) != owner));
		self.framework.mutate(|entries| entries.retain(|e| owner_id(&e.owner) != owner));
	}

	pub fn service_snapshot(&self) -> Arc<Vec<Arc<ServiceListenerEntry>>> {
		self.service.snapshot()
	}

	pub fn bundle_snapshot(&self) -> Arc<Vec<Arc<BundleListenerEntry>>> {
		self.bundle.snapshot()
	}

	pub fn framework_snapshot(&self) -> Arc<Vec<Arc<FrameworkListenerEntry>>> {
		self.framework.snapshot()
	}
}
