use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use argosy_primitives::AnyMap;

use crate::bundle::activator::BundleActivator;
use crate::bundle::context::BundleContext;
use crate::bundle::BundleState;
use crate::error::{BoxError, Error};
use crate::event::FrameworkEventKind;
use crate::service::InterfaceMap;
use crate::testing::{EventLog, active, install, manifest, started_framework};

struct RecordingActivator {
	log: EventLog,
	fail_start: bool,
	fail_stop: bool,
}

impl BundleActivator for RecordingActivator {
	fn start(&mut self, context: &BundleContext) -> Result<(), BoxError> {
		assert!(context.is_valid(), "context must be valid during start");
		self.log.push("start");
		if self.fail_start {
			return Err("start refused".into());
		}
		Ok(())
	}

	fn stop(&mut self, context: &BundleContext) -> Result<(), BoxError> {
		assert!(context.is_valid(), "context must be valid during stop");
		self.log.push("stop");
		if self.fail_stop {
			return Err("stop refused".into());
		}
		Ok(())
	}
}

fn recording_bundle(
	framework: &crate::framework::Framework,
	name: &str,
	log: EventLog,
	fail_start: bool,
	fail_stop: bool,
) -> crate::bundle::Bundle {
	framework
		.context()
		.expect("framework context")
		.install_with_activator(
			&format!("test://{name}"),
			manifest(name),
			Box::new(move || -> Box<dyn BundleActivator> {
				Box::new(RecordingActivator { log: log.clone(), fail_start, fail_stop })
			}),
		)
		.expect("bundle installs")
}

#[test]
fn test_install_resolves_and_assigns_ids() {
	let framework = started_framework();
	let first = install(&framework, "one");
	let second = install(&framework, "two");

	assert_eq!(first.state(), BundleState::Resolved);
	assert!(first.id() >= 1);
	assert!(second.id() > first.id());
	assert_eq!(first.symbolic_name(), "one");
	assert_eq!(first.version(), "1.0.0");
}

#[test]
fn test_install_validates_manifest() {
	let framework = started_framework();
	let context = framework.context().expect("context");

	let mut missing_version = AnyMap::case_insensitive();
	missing_version.insert(crate::constants::BUNDLE_SYMBOLIC_NAME, "broken");
	let err = context.install("test://broken", missing_version).unwrap_err();
	assert!(matches!(err, Error::InvalidArgument(_)));

	let err = context.install("test://empty", AnyMap::case_insensitive()).unwrap_err();
	assert!(matches!(err, Error::InvalidArgument(_)));
}

#[test]
fn test_install_same_location_returns_existing() {
	let framework = started_framework();
	let context = framework.context().expect("context");
	let first = context.install("test://dup", manifest("dup")).expect("installs");
	let second = context.install("test://dup", manifest("dup")).expect("installs");
	assert_eq!(first, second);
	assert_eq!(context.bundles_by_symbolic_name("dup").expect("query").len(), 1);
	assert_eq!(
		context
			.bundle_by_location("test://dup")
			.expect("query")
			.map(|b| b.id()),
		Some(first.id())
	);
}

#[test]
fn test_start_stop_runs_activator_and_events() {
	let framework = started_framework();
	let log = EventLog::new();
	let events = EventLog::new();

	let event_log = events.clone();
	framework
		.context()
		.expect("context")
		.add_bundle_listener(move |event| {
			event_log.push(format!("{}:{}", event.kind, event.bundle.symbolic_name()));
		})
		.expect("listener added");

	let bundle = recording_bundle(&framework, "worker", log.clone(), false, false);
	assert_eq!(
		events.entries(),
		vec!["installed:worker", "resolved:worker"],
		"install fires installed then resolved"
	);

	bundle.start().expect("starts");
	assert_eq!(bundle.state(), BundleState::Active);
	assert_eq!(log.entries(), vec!["start"]);

	// Starting an active bundle is a no-op.
	bundle.start().expect("start is idempotent");
	assert_eq!(log.entries(), vec!["start"]);

	bundle.stop().expect("stops");
	assert_eq!(bundle.state(), BundleState::Resolved);
	assert_eq!(log.entries(), vec!["start", "stop"]);

	assert_eq!(
		events.entries(),
		vec![
			"installed:worker",
			"resolved:worker",
			"started:worker",
			"stopping:worker",
			"stopped:worker",
		]
	);
}

#[test]
fn test_activator_start_failure_returns_to_resolved() {
	let framework = started_framework();
	let log = EventLog::new();
	let errors = EventLog::new();

	let error_log = errors.clone();
	framework
		.context()
		.expect("context")
		.add_framework_listener(move |event| {
			if event.kind == FrameworkEventKind::Error {
				error_log.push(event.message.clone());
			}
		})
		.expect("listener added");

	let bundle = recording_bundle(&framework, "flaky", log, true, false);
	let err = bundle.start().unwrap_err();
	assert!(matches!(err, Error::Activator(_)));
	assert_eq!(bundle.state(), BundleState::Resolved);
	assert_eq!(errors.len(), 1, "activator failure becomes a framework error event");

	// The bundle remains queryable and restartable.
	let context = framework.context().expect("context");
	assert!(context.bundle_by_id(bundle.id()).expect("query").is_some());
}

#[test]
fn test_activator_stop_failure_still_resolves() {
	let framework = started_framework();
	let log = EventLog::new();
	let errors = EventLog::new();

	let error_log = errors.clone();
	framework
		.context()
		.expect("context")
		.add_framework_listener(move |event| {
			if event.kind == FrameworkEventKind::Error {
				error_log.push(event.message.clone());
			}
		})
		.expect("listener added");

	let bundle = recording_bundle(&framework, "grumpy", log, false, true);
	bundle.start().expect("starts");
	bundle.stop().expect("stop completes despite the activator");
	assert_eq!(bundle.state(), BundleState::Resolved);
	assert_eq!(errors.len(), 1);
}

#[test]
fn test_activator_panic_is_contained() {
	struct PanickingActivator;
	impl BundleActivator for PanickingActivator {
		fn start(&mut self, _context: &BundleContext) -> Result<(), BoxError> {
			panic!("activator exploded");
		}
		fn stop(&mut self, _context: &BundleContext) -> Result<(), BoxError> {
			Ok(())
		}
	}

	let framework = started_framework();
	let bundle = framework
		.context()
		.expect("context")
		.install_with_activator(
			"test://panicky",
			manifest("panicky"),
			Box::new(|| Box::new(PanickingActivator)),
		)
		.expect("installs");

	let err = bundle.start().unwrap_err();
	assert!(matches!(err, Error::Activator(_)));
	assert_eq!(bundle.state(), BundleState::Resolved);
}

#[test]
fn test_uninstall_is_terminal_and_keeps_identity() {
	let framework = started_framework();
	let events = EventLog::new();
	let event_log = events.clone();
	framework
		.context()
		.expect("context")
		.add_bundle_listener(move |event| {
			event_log.push(format!("{}", event.kind));
		})
		.expect("listener added");

	let bundle = active(&framework, "doomed");
	bundle.uninstall().expect("uninstalls");
	assert_eq!(bundle.state(), BundleState::Uninstalled);

	let entries = events.entries();
	assert!(entries.ends_with(&["unresolved".into(), "uninstalled".into()]));

	// Identity queries keep working; lifecycle requests fail.
	let context = framework.context().expect("context");
	let found = context.bundle_by_id(bundle.id()).expect("query").expect("still resolvable");
	assert_eq!(found.state(), BundleState::Uninstalled);
	assert!(matches!(bundle.start(), Err(Error::InvalidState(_))));
	assert!(matches!(bundle.uninstall(), Err(Error::InvalidState(_))));

	// Not listed among live bundles.
	assert!(
		context
			.bundles()
			.expect("query")
			.iter()
			.all(|b| b.id() != bundle.id())
	);

	// An active bundle is stopped on the way out.
	let other = active(&framework, "doomed-active");
	other.uninstall().expect("uninstalls");
	assert_eq!(other.state(), BundleState::Uninstalled);
}

#[test]
fn test_stop_invalidates_context_and_cleans_up() {
	let framework = started_framework();
	let bundle = active(&framework, "tidy");
	let context = bundle.context().expect("context");

	let observed = Arc::new(AtomicUsize::new(0));
	let counter = observed.clone();
	context
		.add_service_listener(move |_event| {
			counter.fetch_add(1, Ordering::SeqCst);
		})
		.expect("listener added");

	context
		.register_service(
			&["test.Tidy"],
			InterfaceMap::from_instance("test.Tidy", Arc::new(1i64)),
			AnyMap::case_insensitive(),
		)
		.expect("registers");
	let baseline = observed.load(Ordering::SeqCst);

	bundle.stop().expect("stops");
	assert!(!context.is_valid());
	assert!(matches!(context.bundle(), Err(Error::InvalidState(_))));

	// The bundle's service went with it, and its listener hears nothing
	// further.
	let fresh = framework.context().expect("context");
	assert!(fresh.service_references(Some("test.Tidy"), None).expect("query").is_empty());
	fresh
		.register_service(
			&["test.Tidy"],
			InterfaceMap::from_instance("test.Tidy", Arc::new(2i64)),
			AnyMap::case_insensitive(),
		)
		.expect("registers");
	assert_eq!(observed.load(Ordering::SeqCst), baseline, "removed listener saw no event");
}

#[test]
fn test_data_file_creates_directory() {
	let storage = tempfile::tempdir().expect("temp dir");
	let framework = crate::framework::Framework::builder()
		.storage_dir(storage.path())
		.build()
		.expect("builds");
	framework.start().expect("starts");

	let bundle = active(&framework, "stateful");
	let context = bundle.context().expect("context");
	let path = context.data_file("state.json").expect("data file path");
	assert!(path.starts_with(storage.path()));
	assert!(path.parent().expect("parent").exists(), "data directory is created");
	assert!(path.ends_with("state.json"));
}

#[test]
fn test_transitions_wait_for_each_other() {
	// A start and stop racing on the same bundle serialize; the final state
	// is one of the legal resting states.
	let framework = started_framework();
	let bundle = Arc::new(active(&framework, "contended"));

	let mut workers = Vec::new();
	for _ in 0..4 {
		let bundle = bundle.clone();
		workers.push(std::thread::spawn(move || {
			let _ = bundle.stop();
			let _ = bundle.start();
		}));
	}
	for worker in workers {
		worker.join().expect("worker finishes");
	}
	assert!(matches!(bundle.state(), BundleState::Active | BundleState::Resolved));
}
