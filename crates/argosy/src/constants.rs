//! Well-known property keys and values.

/// Service property: framework-assigned registration id (`i64`).
pub const SERVICE_ID: &str = "service.id";

/// Service property: selection ranking (`i32`, default 0).
pub const SERVICE_RANKING: &str = "service.ranking";

/// Service property: sharing scope, one of [`SCOPE_SINGLETON`],
/// [`SCOPE_BUNDLE`], [`SCOPE_PROTOTYPE`].
pub const SERVICE_SCOPE: &str = "service.scope";

/// Service property: the declared interface names (`list` of strings,
/// framework-assigned).
pub const OBJECTCLASS: &str = "objectclass";

/// One shared instance for all consumers.
pub const SCOPE_SINGLETON: &str = "singleton";

/// One instance per consuming bundle.
pub const SCOPE_BUNDLE: &str = "bundle";

/// A fresh instance per acquisition.
pub const SCOPE_PROTOTYPE: &str = "prototype";

/// Manifest key: the bundle's symbolic name (string, required).
pub const BUNDLE_SYMBOLIC_NAME: &str = "bundle.symbolic_name";

/// Manifest key: the bundle's version (string, required).
pub const BUNDLE_VERSION: &str = "bundle.version";

/// Symbolic name of the framework bundle (id 0).
pub const FRAMEWORK_SYMBOLIC_NAME: &str = "argosy.framework";

/// Interface name under which bundle find hooks are registered.
pub const BUNDLE_FIND_HOOK: &str = "argosy.hooks.BundleFindHook";

/// Interface name under which service find hooks are registered.
pub const SERVICE_FIND_HOOK: &str = "argosy.hooks.ServiceFindHook";

/// Interface name under which service event hooks are registered.
pub const SERVICE_EVENT_HOOK: &str = "argosy.hooks.ServiceEventHook";
