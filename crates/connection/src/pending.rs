//! Outstanding calls and reply resolution.

use std::collections::HashMap;
use std::sync::Arc;

use pw_protocol::Response;
use serde_json::{Map, Value};
use tokio::sync::oneshot;

use crate::catalog::Catalog;
use crate::error::{Error, Result};
use crate::object::RemoteObject;

/// What a posted call resolved to.
#[derive(Debug, Clone)]
pub enum Reply {
	/// The result referenced a single object by GUID.
	Object(Arc<RemoteObject>),
	/// The result was `{"value": V}` or `{"elements": V}`.
	Value(Value),
	/// The result was `{}`.
	Empty,
	/// No recognized result shape: the outbound request with the inbound frame's
	/// fields laid over it.
	Echo(Map<String, Value>),
}

impl Reply {
	pub fn kind(&self) -> &'static str {
		match self {
			Reply::Object(_) => "object",
			Reply::Value(_) => "value",
			Reply::Empty => "empty",
			Reply::Echo(_) => "echo",
		}
	}

	pub fn into_object(self) -> Result<Arc<RemoteObject>> {
		match self {
			Reply::Object(object) => Ok(object),
			other => Err(Error::UnexpectedReply {
				expected: "object",
				actual: other.kind(),
			}),
		}
	}

	/// The JSON payload of the reply.
	///
	/// `Value` yields its inner value, `Empty` yields `null` and `Echo` yields the
	/// echoed `result` field (or `null`).
	pub fn into_value(self) -> Result<Value> {
		match self {
			Reply::Value(value) => Ok(value),
			Reply::Empty => Ok(Value::Null),
			Reply::Echo(mut fields) => Ok(fields.remove("result").unwrap_or(Value::Null)),
			Reply::Object(_) => Err(Error::UnexpectedReply {
				expected: "value",
				actual: "object",
			}),
		}
	}

	pub fn is_empty(&self) -> bool {
		matches!(self, Reply::Empty)
	}
}

/// A caller waiting for its reply.
pub(crate) struct PendingCall {
	pub(crate) reply: oneshot::Sender<Result<Reply>>,
	/// The request as posted, kept for echo replies.
	pub(crate) request: Value,
}

/// Pending calls keyed by message id.
///
/// Ids start at 1 and increase by one per call; an id is never handed out twice.
#[derive(Default)]
pub struct PendingCalls {
	last_id: u32,
	calls: HashMap<u32, PendingCall>,
}

impl PendingCalls {
	pub fn new() -> Self {
		Self::default()
	}

	pub(crate) fn next_id(&mut self) -> Result<u32> {
		self.last_id = self
			.last_id
			.checked_add(1)
			.ok_or_else(|| Error::ProtocolError("Message id space exhausted".to_string()))?;
		Ok(self.last_id)
	}

	/// Id most recently handed out, 0 before the first call.
	pub fn last_id(&self) -> u32 {
		self.last_id
	}

	pub(crate) fn insert(&mut self, id: u32, call: PendingCall) {
		self.calls.insert(id, call);
	}

	pub(crate) fn take(&mut self, id: u32) -> Option<PendingCall> {
		self.calls.remove(&id)
	}

	pub fn contains(&self, id: u32) -> bool {
		self.calls.contains_key(&id)
	}

	pub fn len(&self) -> usize {
		self.calls.len()
	}

	pub fn is_empty(&self) -> bool {
		self.calls.is_empty()
	}

	/// Fails every outstanding call with [`Error::ConnectionClosed`].
	pub(crate) fn fail_all(&mut self) {
		for (id, call) in self.calls.drain() {
			tracing::debug!(id, "failing pending call: connection closed");
			let _ = call.reply.send(Err(Error::ConnectionClosed));
		}
	}
}

/// Turns a reply frame into the value its caller receives.
///
/// An `error` always wins over `result`. Otherwise the result is matched against
/// the object reference, value/elements and empty shapes, in that order, and
/// anything else falls back to an echo of the request merged with `frame`.
pub(crate) fn resolve_reply(frame: &Value, response: Response, request: Value, catalog: &Catalog) -> Result<Reply> {
	if let Some(error) = response.error {
		return Err(error.into_payload().into());
	}

	if let Some(Value::Object(result)) = &response.result {
		if result.is_empty() {
			return Ok(Reply::Empty);
		}
		if result.len() == 1 {
			if let Some((key, inner)) = result.iter().next() {
				if let Some(guid) = inner.get("guid").and_then(Value::as_str) {
					return catalog
						.get(guid)
						.map(Reply::Object)
						.ok_or_else(|| Error::ObjectNotFound { guid: guid.to_string() });
				}
				if key == "value" || key == "elements" {
					return Ok(Reply::Value(inner.clone()));
				}
			}
		}
	}

	let mut merged = match request {
		Value::Object(fields) => fields,
		_ => Map::new(),
	};
	if let Value::Object(fields) = frame {
		merged.extend(fields.iter().map(|(k, v)| (k.clone(), v.clone())));
	}
	Ok(Reply::Echo(merged))
}
