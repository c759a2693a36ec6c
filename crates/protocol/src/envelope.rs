//! Request, response and notification envelopes.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Metadata attached to every outbound call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Metadata {
	/// Public API name the call was issued on behalf of (e.g. `page.goto`).
	#[serde(default)]
	pub api_name: String,
	/// Caller-side stack frames, innermost first.
	#[serde(default)]
	pub stack: Vec<StackFrame>,
	/// Unix timestamp in milliseconds.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub wall_time: Option<i64>,
	/// Whether this is an internal call (not user-facing API).
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub internal: Option<bool>,
}

impl Metadata {
	/// Metadata stamped with the current wall clock.
	pub fn now() -> Self {
		let wall_time = std::time::SystemTime::now()
			.duration_since(std::time::UNIX_EPOCH)
			.map(|d| d.as_millis() as i64)
			.ok();
		Self {
			wall_time,
			..Self::default()
		}
	}

	/// Sets the public API name.
	pub fn with_api_name(mut self, api_name: impl Into<String>) -> Self {
		self.api_name = api_name.into();
		self
	}

	/// Marks the call as internal (not surfaced in traces).
	pub fn internal(mut self) -> Self {
		self.internal = Some(true);
		self
	}
}

/// Source location of the caller of an outbound call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StackFrame {
	pub file: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub line: Option<u32>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub column: Option<u32>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub function: Option<String>,
}

/// Outbound method call addressed to a remote object.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
	/// Correlation id, assigned by the connection when the request is posted.
	pub id: u32,
	/// GUID of the target object.
	#[serde(serialize_with = "serialize_arc_str", deserialize_with = "deserialize_arc_str")]
	pub guid: Arc<str>,
	pub method: String,
	#[serde(default)]
	pub params: Value,
	#[serde(default)]
	pub metadata: Metadata,
}

impl Request {
	/// Builds an unnumbered request; the id is filled in on post.
	pub fn new(guid: impl Into<Arc<str>>, method: impl Into<String>, params: Value) -> Self {
		Self {
			id: 0,
			guid: guid.into(),
			method: method.into(),
			params,
			metadata: Metadata::now(),
		}
	}

	pub fn with_metadata(mut self, metadata: Metadata) -> Self {
		self.metadata = metadata;
		self
	}
}

/// Serde helpers for `Arc<str>` serialization
pub fn serialize_arc_str<S>(arc: &Arc<str>, serializer: S) -> std::result::Result<S::Ok, S::Error>
where
	S: serde::Serializer,
{
	serializer.serialize_str(arc)
}

pub fn deserialize_arc_str<'de, D>(deserializer: D) -> std::result::Result<Arc<str>, D::Error>
where
	D: serde::Deserializer<'de>,
{
	let s: String = Deserialize::deserialize(deserializer)?;
	Ok(Arc::from(s.as_str()))
}

/// Reply to a previously posted [`Request`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
	/// Id of the request this reply correlates to.
	pub id: u32,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub result: Option<Value>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub error: Option<ErrorWrapper>,
}

/// Error carried by a [`Response`].
///
/// Engines send either `{"error": {"message": ..}}` or the payload directly.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ErrorWrapper {
	Wrapped { error: ErrorPayload },
	Bare(ErrorPayload),
	Other(Value),
}

impl ErrorWrapper {
	pub fn into_payload(self) -> ErrorPayload {
		match self {
			ErrorWrapper::Wrapped { error } | ErrorWrapper::Bare(error) => error,
			ErrorWrapper::Other(value) => ErrorPayload {
				message: match value {
					Value::String(s) => s,
					other => other.to_string(),
				},
				name: None,
				stack: None,
			},
		}
	}
}

/// Remote error details.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorPayload {
	#[serde(default)]
	pub message: String,
	/// Error class name (e.g. `TimeoutError`, `TargetClosedError`).
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub name: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub stack: Option<String>,
}

/// Notification pushed by the engine for an object GUID.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
	#[serde(serialize_with = "serialize_arc_str", deserialize_with = "deserialize_arc_str")]
	pub guid: Arc<str>,
	pub method: String,
	#[serde(default)]
	pub params: Value,
}

/// Discriminated union of inbound frames.
///
/// Anything carrying an `id` is a reply; anything carrying `guid` and `method`
/// is a notification; the rest is kept verbatim for forward compatibility.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Message {
	Response(Response),
	Event(Event),
	Unknown(Value),
}
