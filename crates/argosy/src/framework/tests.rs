use argosy_primitives::Value;

use crate::bundle::BundleState;
use crate::bundle::activator::BundleActivator;
use crate::bundle::context::BundleContext;
use crate::error::{BoxError, Error};
use crate::framework::Framework;
use crate::testing::{EventLog, active, manifest, started_framework};

#[test]
fn test_framework_is_bundle_zero() {
	let framework = started_framework();
	assert_eq!(framework.bundle().id(), 0);
	assert_eq!(framework.bundle().state(), BundleState::Active);
	assert_eq!(
		framework.bundle().symbolic_name(),
		crate::constants::FRAMEWORK_SYMBOLIC_NAME
	);
	let context = framework.context().expect("context");
	assert_eq!(context.bundle().expect("bundle").id(), 0);
}

#[test]
fn test_context_requires_start() {
	let framework = Framework::new().expect("builds");
	assert!(matches!(framework.context(), Err(Error::InvalidState(_))));
	framework.start().expect("starts");
	assert!(framework.context().is_ok());
}

#[test]
fn test_framework_properties_are_visible() {
	let framework = Framework::builder()
		.property("deployment", "test")
		.property("threads", 4i64)
		.build()
		.expect("builds");
	framework.start().expect("starts");

	let context = framework.context().expect("context");
	assert_eq!(context.property("deployment").expect("query"), Some(Value::String("test".into())));
	assert_eq!(context.property("threads").expect("query"), Some(Value::Int(4)));
	assert_eq!(context.property("absent").expect("query"), None);
	assert_eq!(context.properties().expect("query").len(), 2);
}

#[test]
fn test_started_event_signals_startup() {
	let framework = started_framework();
	let events = EventLog::new();
	let log = events.clone();
	framework
		.context()
		.expect("context")
		.add_framework_listener(move |event| {
			if event.kind == crate::FrameworkEventKind::Started {
				log.push("started");
			}
		})
		.expect("added");

	// Start on an active framework is a no-op transition but still
	// broadcasts the milestone.
	framework.start().expect("idempotent start");
	assert_eq!(events.entries(), vec!["started"]);
}

struct OrderedActivator {
	name: &'static str,
	log: EventLog,
}

impl BundleActivator for OrderedActivator {
	fn start(&mut self, _context: &BundleContext) -> Result<(), BoxError> {
		self.log.push(format!("start:{}", self.name));
		Ok(())
	}

	fn stop(&mut self, _context: &BundleContext) -> Result<(), BoxError> {
		self.log.push(format!("stop:{}", self.name));
		Ok(())
	}
}

#[test]
fn test_stop_unwinds_bundles_in_reverse_install_order() {
	let framework = started_framework();
	let log = EventLog::new();
	let context = framework.context().expect("context");

	for name in ["alpha", "beta"] {
		let activator_log = log.clone();
		context
			.install_with_activator(
				&format!("test://{name}"),
				manifest(name),
				Box::new(move || -> Box<dyn BundleActivator> {
					Box::new(OrderedActivator { name, log: activator_log.clone() })
				}),
			)
			.expect("installs")
			.start()
			.expect("starts");
	}

	framework.stop().expect("stops");
	assert_eq!(
		log.entries(),
		vec!["start:alpha", "start:beta", "stop:beta", "stop:alpha"],
		"bundles stop in reverse install order"
	);
	assert_eq!(framework.bundle().state(), BundleState::Resolved);
	assert!(matches!(framework.context(), Err(Error::InvalidState(_))));
}

#[test]
fn test_framework_bundle_rejects_uninstall() {
	let framework = started_framework();
	assert!(matches!(framework.bundle().uninstall(), Err(Error::InvalidState(_))));
}

#[test]
fn test_stopping_framework_invalidates_bundle_contexts() {
	let framework = started_framework();
	let bundle = active(&framework, "worker");
	let context = bundle.context().expect("context");

	framework.stop().expect("stops");
	assert!(!context.is_valid());
	assert_eq!(bundle.state(), BundleState::Resolved);
}

#[test]
fn test_bundles_visible_through_context() {
	let framework = started_framework();
	let one = active(&framework, "one");
	let _two = active(&framework, "two");

	let context = framework.context().expect("context");
	let bundles = context.bundles().expect("query");
	let ids: Vec<u64> = bundles.iter().map(crate::Bundle::id).collect();
	assert_eq!(ids, {
		let mut sorted = ids.clone();
		sorted.sort_unstable();
		sorted
	}, "bundles list in install order");
	assert!(bundles.iter().any(|b| b.id() == 0), "the framework bundle is listed");
	assert_eq!(
		context
			.bundles_by_symbolic_name("one")
			.expect("query")
			.first()
			.map(crate::Bundle::id),
		Some(one.id())
	);
}
