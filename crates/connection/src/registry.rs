//! Type-name to constructor registry used on `__create__`.

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::object::{ObjectSpec, RemoteObject};

/// Creates proxies for `__create__` notifications.
///
/// The connection only knows this trait, so typed wrappers can plug their own
/// construction logic in without the core depending on them.
pub trait ObjectFactory: Send + Sync {
	/// Builds the proxy described by `spec`.
	///
	/// Returns [`Error::UnknownObjectType`] when the type has no constructor.
	fn create_object(&self, spec: ObjectSpec) -> Result<Arc<RemoteObject>>;
}

/// Constructor registered for one protocol type.
pub type Constructor = Arc<dyn Fn(ObjectSpec) -> Result<RemoteObject> + Send + Sync>;

/// Object types the Playwright driver announces.
pub const PLAYWRIGHT_TYPES: &[&str] = &[
	"Android",
	"AndroidDevice",
	"APIRequestContext",
	"Artifact",
	"BindingCall",
	"Browser",
	"BrowserContext",
	"BrowserType",
	"CDPSession",
	"Debugger",
	"Dialog",
	"Electron",
	"ElectronApplication",
	"ElementHandle",
	"EventTarget",
	"Frame",
	"JSHandle",
	"JsonPipe",
	"LocalUtils",
	"Page",
	"Playwright",
	"Request",
	"Response",
	"Route",
	"Selectors",
	"SocksSupport",
	"Stream",
	"Tracing",
	"WebSocket",
	"WebSocketRoute",
	"Worker",
	"WritableStream",
];

/// Registry of constructors keyed by protocol type name.
#[derive(Clone, Default)]
pub struct TypeRegistry {
	constructors: HashMap<String, Constructor>,
	fallback: Option<Constructor>,
}

impl TypeRegistry {
	/// An empty registry; every type is unknown.
	pub fn new() -> Self {
		Self::default()
	}

	/// Registry with the generic constructor for every [`PLAYWRIGHT_TYPES`] entry.
	pub fn playwright() -> Self {
		let mut registry = Self::new();
		for type_name in PLAYWRIGHT_TYPES {
			registry.register_generic(*type_name);
		}
		registry
	}

	/// Registry accepting any type with the generic constructor.
	pub fn any() -> Self {
		Self {
			constructors: HashMap::new(),
			fallback: Some(Arc::new(generic_constructor)),
		}
	}

	/// Registers `constructor` for `type_name`, replacing any previous entry.
	pub fn register<F>(&mut self, type_name: impl Into<String>, constructor: F) -> &mut Self
	where
		F: Fn(ObjectSpec) -> Result<RemoteObject> + Send + Sync + 'static,
	{
		self.constructors.insert(type_name.into(), Arc::new(constructor));
		self
	}

	/// Registers the plain [`RemoteObject::new`] constructor for `type_name`.
	pub fn register_generic(&mut self, type_name: impl Into<String>) -> &mut Self {
		self.register(type_name, generic_constructor)
	}

	/// Builder form of [`TypeRegistry::register_generic`].
	pub fn with_type(mut self, type_name: impl Into<String>) -> Self {
		self.register_generic(type_name);
		self
	}

	pub fn is_registered(&self, type_name: &str) -> bool {
		self.fallback.is_some() || self.constructors.contains_key(type_name)
	}
}

fn generic_constructor(spec: ObjectSpec) -> Result<RemoteObject> {
	Ok(RemoteObject::new(spec))
}

impl ObjectFactory for TypeRegistry {
	fn create_object(&self, spec: ObjectSpec) -> Result<Arc<RemoteObject>> {
		let constructor = self
			.constructors
			.get(spec.type_name.as_ref())
			.or(self.fallback.as_ref())
			.ok_or_else(|| Error::UnknownObjectType(spec.type_name.to_string()))?;
		constructor(spec).map(Arc::new)
	}
}

impl std::fmt::Debug for TypeRegistry {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		let mut types: Vec<_> = self.constructors.keys().collect();
		types.sort();
		f.debug_struct("TypeRegistry")
			.field("types", &types)
			.field("fallback", &self.fallback.is_some())
			.finish()
	}
}
