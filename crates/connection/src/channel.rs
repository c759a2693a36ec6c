//! Channel - per-object front for sending calls.
//!
//! Typed wrappers around remote objects build every call through a Channel:
//! method name plus parameters in, [`Reply`] (or a typed value) out.

use std::sync::Arc;

use pw_protocol::{Metadata, Request};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::connection::{Connection, WeakConnection};
use crate::error::Result;
use crate::object::RemoteObject;
use crate::pending::Reply;

/// Sends calls addressed to one object GUID.
///
/// Holds the connection weakly; each call upgrades it for as long as it waits.
#[derive(Clone)]
pub struct Channel {
	guid: Arc<str>,
	connection: WeakConnection,
}

impl Channel {
	pub fn new(guid: Arc<str>, connection: &Connection) -> Self {
		Self::with_weak(guid, connection.downgrade())
	}

	pub fn with_weak(guid: Arc<str>, connection: WeakConnection) -> Self {
		Self { guid, connection }
	}

	/// Calls `method` on this object and awaits the reply.
	pub async fn send<P: Serialize>(&self, method: &str, params: P) -> Result<Reply> {
		self.send_with_metadata(method, params, Metadata::now()).await
	}

	/// Like [`Channel::send`] with caller supplied metadata (API name, stack).
	pub async fn send_with_metadata<P: Serialize>(&self, method: &str, params: P, metadata: Metadata) -> Result<Reply> {
		let params = match serde_json::to_value(params)? {
			Value::Null => Value::Object(Default::default()),
			params => params,
		};
		let request = Request::new(Arc::clone(&self.guid), method, params).with_metadata(metadata);
		self.connection.upgrade()?.post(request).await
	}

	/// Sends a call and deserializes the reply payload (see [`Reply::into_value`]).
	pub async fn send_as<P: Serialize, R: DeserializeOwned>(&self, method: &str, params: P) -> Result<R> {
		let value = self.send(method, params).await?.into_value()?;
		serde_json::from_value(value).map_err(Into::into)
	}

	/// Sends a call whose reply references an object.
	pub async fn send_object<P: Serialize>(&self, method: &str, params: P) -> Result<Arc<RemoteObject>> {
		self.send(method, params).await?.into_object()
	}

	/// Sends a call with no parameters.
	pub async fn send_no_params(&self, method: &str) -> Result<Reply> {
		self.send(method, Value::Null).await
	}

	/// Sends a call whose reply carries nothing of interest.
	pub async fn send_no_result<P: Serialize>(&self, method: &str, params: P) -> Result<()> {
		self.send(method, params).await.map(|_| ())
	}

	pub fn guid(&self) -> &str {
		&self.guid
	}

	pub fn connection(&self) -> Result<Connection> {
		self.connection.upgrade()
	}
}

impl std::fmt::Debug for Channel {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Channel").field("guid", &self.guid).finish()
	}
}
