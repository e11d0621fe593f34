//! argosy - an in-process service runtime.
//!
//! A [`Framework`] hosts dynamically installable bundles. Each bundle
//! publishes and discovers services by interface name through its
//! [`BundleContext`], queries them with LDAP-style [`Filter`]s, and observes
//! lifecycle and registry churn through listeners and
//! [trackers](crate::tracker).
//!
//! # Overview
//!
//! - [`framework`] - the entry point; the framework is itself bundle 0
//! - [`bundle`] - installable units with a lifecycle state machine and
//!   per-bundle capability contexts
//! - [`service`] - the concurrent, filter-queryable service registry with
//!   singleton/bundle/prototype scopes and counted acquisitions
//! - [`event`] - bundle, service, and framework events with snapshot-ordered
//!   synchronous dispatch
//! - [`tracker`] - live mirrors of registry state driven by customizer
//!   callbacks
//! - [`hooks`] - privileged services that censor bundle, service, and event
//!   visibility
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//!
//! use argosy::{AnyMap, Framework, InterfaceMap};
//!
//! # fn main() -> argosy::Result<()> {
//! let framework = Framework::new()?;
//! framework.start()?;
//! let context = framework.context()?;
//!
//! let mut manifest = AnyMap::case_insensitive();
//! manifest.insert("bundle.symbolic_name", "demo");
//! manifest.insert("bundle.version", "1.0.0");
//! let bundle = context.install("demo://bundle", manifest)?;
//! bundle.start()?;
//!
//! let greeter: Arc<String> = Arc::new("hello".to_owned());
//! let registration = bundle.context().unwrap().register_service(
//! 	&["demo.Greeter"],
//! 	InterfaceMap::from_instance("demo.Greeter", greeter),
//! 	AnyMap::case_insensitive(),
//! )?;
//!
//! let reference = context.service_reference("demo.Greeter")?;
//! let guard = context.get_service(&reference)?;
//! assert_eq!(*guard.instance::<String>().unwrap(), "hello");
//!
//! drop(guard);
//! registration.unregister()?;
//! framework.stop()?;
//! # Ok(())
//! # }
//! ```

pub mod bundle;
pub mod constants;
mod core_context;
pub mod error;
pub mod event;
pub mod framework;
pub mod hooks;
pub mod service;
pub mod tracker;
mod util;

#[cfg(test)]
pub(crate) mod testing;

pub use argosy_primitives::{AnyMap, Filter, FilterError, KeyPolicy, Value};
pub use bundle::activator::{ActivatorFactory, BundleActivator};
pub use bundle::context::BundleContext;
pub use bundle::{Bundle, BundleState};
pub use error::{BoxError, Error, Result};
pub use event::{
	BundleEvent, BundleEventKind, BundleListenerFn, FrameworkEvent, FrameworkEventKind,
	FrameworkListenerFn, ListenerToken, ServiceEvent, ServiceEventKind, ServiceListenerFn,
};
pub use framework::{Framework, FrameworkBuilder};
pub use hooks::{BundleFindHook, ServiceEventHook, ServiceFindHook};
pub use service::{
	InterfaceMap, InterfaceMapBuilder, ServiceFactory, ServiceGuard, ServiceObjects,
	ServiceProducer, ServiceReference, ServiceRegistration, ServiceScope,
};
pub use tracker::{
	BundleTracker, BundleTrackerCustomizer, ServiceTracker, ServiceTrackerCustomizer,
	TrackerTarget,
};
