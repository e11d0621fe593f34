use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use argosy_primitives::AnyMap;

use crate::bundle::{Bundle, BundleState};
use crate::service::{InterfaceMap, ServiceReference};
use crate::testing::{active, started_framework};
use crate::tracker::{
	BundleTracker, BundleTrackerCustomizer, ServiceTracker, ServiceTrackerCustomizer,
};

const IFACE: &str = "test.Tracked";

fn service_map(n: i64) -> InterfaceMap {
	InterfaceMap::from_instance(IFACE, Arc::new(n))
}

#[derive(Default)]
struct Counting {
	adds: AtomicUsize,
	modifies: AtomicUsize,
	removes: AtomicUsize,
}

impl ServiceTrackerCustomizer for Arc<Counting> {
	type Tracked = i64;

	fn adding(&self, reference: &ServiceReference) -> Option<i64> {
		self.adds.fetch_add(1, Ordering::SeqCst);
		Some(reference.service_id())
	}

	fn modified(&self, _reference: &ServiceReference, _tracked: &i64) {
		self.modifies.fetch_add(1, Ordering::SeqCst);
	}

	fn removed(&self, _reference: &ServiceReference, _tracked: &i64) {
		self.removes.fetch_add(1, Ordering::SeqCst);
	}
}

#[test]
fn test_open_seeds_from_existing_registrations() {
	let framework = started_framework();
	let bundle = active(&framework, "observer");
	let context = bundle.context().expect("context");

	context
		.register_service(&[IFACE], service_map(1), AnyMap::case_insensitive())
		.expect("registers");

	let tracker = ServiceTracker::new(&context, IFACE);
	assert_eq!(tracker.tracking_count(), -1, "closed trackers report -1");
	tracker.open().expect("opens");
	assert_eq!(tracker.size(), 1);
	assert!(tracker.tracking_count() >= 1);
	tracker.close();
	assert_eq!(tracker.tracking_count(), -1);
}

#[test]
fn test_tracker_follows_register_and_unregister() {
	let framework = started_framework();
	let bundle = active(&framework, "observer");
	let context = bundle.context().expect("context");

	let tracker = ServiceTracker::new(&context, IFACE);
	tracker.open().expect("opens");
	assert!(tracker.is_empty());

	let registration = context
		.register_service(&[IFACE], service_map(7), AnyMap::case_insensitive())
		.expect("registers");
	tracker.wait_for_customizers();
	assert_eq!(tracker.size(), 1);

	let reference = registration.reference();
	let tracked = tracker.get(&reference).expect("tracked value");
	assert_eq!(*tracked.instance::<i64>().expect("typed"), 7);
	assert_eq!(tracker.service_references(), vec![reference.clone()]);

	registration.unregister().expect("unregisters");
	tracker.wait_for_customizers();
	assert!(tracker.is_empty());
	assert!(tracker.get(&reference).is_none());
}

#[test]
fn test_tracking_count_bumps_on_every_mutation() {
	let framework = started_framework();
	let bundle = active(&framework, "observer");
	let context = bundle.context().expect("context");

	let customizer = Arc::new(Counting::default());
	let tracker = ServiceTracker::with_customizer(&context, IFACE, customizer.clone());
	tracker.open().expect("opens");
	let mut last = tracker.tracking_count();

	let registration = context
		.register_service(&[IFACE], service_map(1), AnyMap::case_insensitive())
		.expect("registers");
	assert!(tracker.tracking_count() > last, "add bumps the count");
	last = tracker.tracking_count();

	let mut props = AnyMap::case_insensitive();
	props.insert("tweaked", true);
	registration.set_properties(props).expect("sets");
	assert!(tracker.tracking_count() > last, "modify bumps the count");
	last = tracker.tracking_count();

	registration.unregister().expect("unregisters");
	assert!(tracker.tracking_count() > last, "remove bumps the count");

	assert_eq!(customizer.adds.load(Ordering::SeqCst), 1);
	assert_eq!(customizer.modifies.load(Ordering::SeqCst), 1);
	assert_eq!(customizer.removes.load(Ordering::SeqCst), 1);
}

#[test]
fn test_filter_target_endmatch_removes_entry() {
	let framework = started_framework();
	let bundle = active(&framework, "observer");
	let context = bundle.context().expect("context");

	let filter = crate::Filter::new("(color=red)").expect("parses");
	let customizer = Arc::new(Counting::default());
	let tracker = ServiceTracker::with_customizer(&context, filter, customizer.clone());
	tracker.open().expect("opens");

	let mut red = AnyMap::case_insensitive();
	red.insert("color", "red");
	let registration = context
		.register_service(&[IFACE], service_map(1), red)
		.expect("registers");
	tracker.wait_for_customizers();
	assert_eq!(tracker.size(), 1);

	// Property change that breaks the match evicts the entry.
	let mut blue = AnyMap::case_insensitive();
	blue.insert("color", "blue");
	registration.set_properties(blue).expect("sets");
	tracker.wait_for_customizers();
	assert!(tracker.is_empty());
	assert_eq!(customizer.removes.load(Ordering::SeqCst), 1);

	// Matching again re-adds it.
	let mut red_again = AnyMap::case_insensitive();
	red_again.insert("color", "red");
	registration.set_properties(red_again).expect("sets");
	tracker.wait_for_customizers();
	assert_eq!(tracker.size(), 1);
	assert_eq!(customizer.adds.load(Ordering::SeqCst), 2);
}

#[test]
fn test_close_removes_remaining_entries() {
	let framework = started_framework();
	let bundle = active(&framework, "observer");
	let context = bundle.context().expect("context");

	let customizer = Arc::new(Counting::default());
	let tracker = ServiceTracker::with_customizer(&context, IFACE, customizer.clone());
	tracker.open().expect("opens");

	for n in 0..3 {
		context
			.register_service(&[IFACE], service_map(n), AnyMap::case_insensitive())
			.expect("registers");
	}
	tracker.wait_for_customizers();
	assert_eq!(tracker.size(), 3);

	tracker.close();
	assert_eq!(tracker.size(), 0);
	assert_eq!(customizer.removes.load(Ordering::SeqCst), 3);

	// Closing twice is harmless.
	tracker.close();
	assert_eq!(customizer.removes.load(Ordering::SeqCst), 3);
}

#[test]
fn test_tracker_consistency_under_churn() {
	let framework = started_framework();
	let producer = active(&framework, "churner");
	let observer = active(&framework, "observer");
	let context = observer.context().expect("context");

	let customizer = Arc::new(Counting::default());
	let tracker = ServiceTracker::with_customizer(&context, IFACE, customizer.clone());
	tracker.open().expect("opens");

	let producer_ctx = producer.context().expect("context");
	let worker = std::thread::spawn(move || {
		let mut registrations = Vec::new();
		for n in 0..100 {
			registrations.push(
				producer_ctx
					.register_service(&[IFACE], service_map(n), AnyMap::case_insensitive())
					.expect("registers"),
			);
		}
		for registration in registrations.drain(..50) {
			registration.unregister().expect("unregisters");
		}
	});
	worker.join().expect("worker finishes");
	tracker.wait_for_customizers();

	assert_eq!(tracker.size(), 50, "the mirror matches the surviving registrations");
	let adds = customizer.adds.load(Ordering::SeqCst);
	let modifies = customizer.modifies.load(Ordering::SeqCst);
	let removes = customizer.removes.load(Ordering::SeqCst);
	assert_eq!(adds, 100);
	assert_eq!(removes, 50);
	assert_eq!(
		tracker.tracking_count(),
		(adds + modifies + removes) as i64,
		"the tracking count accounts for every observed mutation"
	);
}

struct BundleNames;

impl BundleTrackerCustomizer for BundleNames {
	type Tracked = String;

	fn adding(&self, bundle: &Bundle) -> Option<String> {
		Some(bundle.symbolic_name().to_owned())
	}
}

#[test]
fn test_bundle_tracker_follows_lifecycle() {
	let framework = started_framework();
	let observer = active(&framework, "observer");
	let context = observer.context().expect("context");

	let running = active(&framework, "already-running");
	let tracker = BundleTracker::with_customizer(&context, BundleState::Active.bit(), BundleNames);
	tracker.open().expect("opens");

	// Seeded with the bundles already active (observer, framework itself,
	// and the one above).
	assert!(tracker.get(&running).is_some());
	let seeded = tracker.size();

	let late = active(&framework, "late-arrival");
	tracker.wait_for_customizers();
	assert_eq!(tracker.size(), seeded + 1);
	assert_eq!(tracker.get(&late).as_deref(), Some(&"late-arrival".to_owned()));

	late.stop().expect("stops");
	tracker.wait_for_customizers();
	assert_eq!(tracker.size(), seeded, "a stopped bundle leaves the mask");
	assert!(tracker.get(&late).is_none());
}

#[test]
fn test_bundle_tracker_mask_spanning_states() {
	let framework = started_framework();
	let observer = active(&framework, "observer");
	let context = observer.context().expect("context");

	let mask = BundleState::Resolved.bit() | BundleState::Active.bit();
	let tracker = BundleTracker::new(&context, mask);
	tracker.open().expect("opens");

	let bundle = crate::testing::install(&framework, "wanderer");
	tracker.wait_for_customizers();
	assert!(tracker.get(&bundle).is_some(), "resolved bundles are in the mask");
	let count_before = tracker.tracking_count();

	// Resolved -> Active stays in the mask: a modify, not a remove.
	bundle.start().expect("starts");
	tracker.wait_for_customizers();
	assert!(tracker.get(&bundle).is_some());
	assert!(tracker.tracking_count() > count_before);

	bundle.uninstall().expect("uninstalls");
	tracker.wait_for_customizers();
	assert!(tracker.get(&bundle).is_none(), "uninstalled bundles fall out");
}
