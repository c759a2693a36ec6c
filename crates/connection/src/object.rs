//! Local proxies for remote engine objects.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use pw_protocol::ROOT_GUID;
use serde_json::Value;

use crate::catalog::Query;
use crate::channel::Channel;
use crate::connection::{Connection, WeakConnection};
use crate::error::Result;

/// Reason an object left the catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisposeReason {
	/// Closed by the engine or by user code.
	Closed,
	/// Garbage collected by the engine.
	GarbageCollected,
}

/// Everything a constructor needs to build a [`RemoteObject`].
#[derive(Clone)]
pub struct ObjectSpec {
	pub type_name: Arc<str>,
	pub guid: Arc<str>,
	/// GUID of the owning object; the root for top level objects.
	pub parent: Arc<str>,
	pub initializer: Value,
	/// Route for the proxy's calls; does not keep the connection alive.
	pub connection: WeakConnection,
}

/// Local stand-in for an object living in the engine.
///
/// Proxies are created and removed only by the connection actor. A proxy handed
/// out to callers stays usable as a value after disposal, but calls through its
/// channel will be rejected by the engine. Proxies do not own the connection:
/// once every [`Connection`] handle is dropped their calls fail with
/// [`Error::ConnectionClosed`](crate::Error::ConnectionClosed).
pub struct RemoteObject {
	guid: Arc<str>,
	type_name: Arc<str>,
	parent: Mutex<Option<Arc<str>>>,
	initializer: Value,
	channel: Channel,
	disposed: AtomicBool,
	was_collected: AtomicBool,
}

impl RemoteObject {
	/// Builds a proxy from its creation spec.
	pub fn new(spec: ObjectSpec) -> Self {
		let ObjectSpec {
			type_name,
			guid,
			parent,
			initializer,
			connection,
		} = spec;

		Self {
			channel: Channel::with_weak(Arc::clone(&guid), connection),
			guid,
			type_name,
			parent: Mutex::new(Some(parent)),
			initializer,
			disposed: AtomicBool::new(false),
			was_collected: AtomicBool::new(false),
		}
	}

	/// The synthetic root every top level object hangs off.
	pub(crate) fn root(connection: WeakConnection) -> Self {
		let guid: Arc<str> = Arc::from(ROOT_GUID);
		Self {
			channel: Channel::with_weak(Arc::clone(&guid), connection),
			type_name: Arc::clone(&guid),
			guid,
			parent: Mutex::new(None),
			initializer: Value::Null,
			disposed: AtomicBool::new(false),
			was_collected: AtomicBool::new(false),
		}
	}

	pub fn guid(&self) -> &str {
		&self.guid
	}

	pub(crate) fn guid_arc(&self) -> Arc<str> {
		Arc::clone(&self.guid)
	}

	/// Protocol type name (e.g. "Browser", "Page").
	pub fn type_name(&self) -> &str {
		&self.type_name
	}

	/// GUID of the owning object, `None` for the root.
	pub fn parent_guid(&self) -> Option<Arc<str>> {
		self.parent.lock().clone()
	}

	pub fn is_root(&self) -> bool {
		self.parent.lock().is_none()
	}

	/// Attributes the engine supplied at creation time.
	pub fn initializer(&self) -> &Value {
		&self.initializer
	}

	pub fn channel(&self) -> &Channel {
		&self.channel
	}

	/// The owning connection, if any handle to it is still alive.
	pub fn connection(&self) -> Result<Connection> {
		self.channel.connection()
	}

	/// Current children of this object, in catalog order.
	pub async fn children(&self) -> Result<Vec<Arc<RemoteObject>>> {
		self.connection()?
			.find(Query::children_of(self.guid()), Vec::new())
			.await
	}

	/// True once the object was removed from the catalog.
	pub fn is_disposed(&self) -> bool {
		self.disposed.load(Ordering::SeqCst)
	}

	/// True if the engine garbage collected the object.
	pub fn was_collected(&self) -> bool {
		self.was_collected.load(Ordering::SeqCst)
	}

	pub(crate) fn set_parent(&self, parent: Arc<str>) {
		*self.parent.lock() = Some(parent);
	}

	pub(crate) fn mark_disposed(&self, reason: DisposeReason) {
		if reason == DisposeReason::GarbageCollected {
			self.was_collected.store(true, Ordering::SeqCst);
		}
		self.disposed.store(true, Ordering::SeqCst);
	}
}

impl std::fmt::Debug for RemoteObject {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("RemoteObject")
			.field("guid", &self.guid)
			.field("type_name", &self.type_name)
			.field("parent", &*self.parent.lock())
			.field("disposed", &self.is_disposed())
			.finish()
	}
}

/// Maps the engine's empty root address onto the local root GUID.
pub fn normalize_guid(guid: &str) -> Arc<str> {
	if guid.is_empty() {
		Arc::from(ROOT_GUID)
	} else {
		Arc::from(guid)
	}
}
