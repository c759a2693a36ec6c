//! Error types for the connection core.

use pw_protocol::ErrorPayload;
use thiserror::Error;

/// Result type alias for connection operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by the connection, its transports and the driver launcher.
#[derive(Debug, Error)]
pub enum Error {
	/// Engine driver was not found.
	#[error("Driver not found. Set PLAYWRIGHT_NODE_EXE and PLAYWRIGHT_CLI_JS, or PLAYWRIGHT_DRIVER_PATH")]
	ServerNotFound,

	/// Failed to launch the driver process.
	#[error("Failed to launch driver: {0}")]
	LaunchFailed(String),

	/// Transport-level error (framing, pipe or socket I/O).
	#[error("Transport error: {0}")]
	TransportError(String),

	/// Protocol desync or malformed frame.
	#[error("Protocol error: {0}")]
	ProtocolError(String),

	/// Error reported by the engine for a specific call.
	#[error("{name}: {message}")]
	Remote {
		/// Error class name (e.g. "TimeoutError", "Error", "TargetClosedError")
		name: String,
		message: String,
		/// Stack trace from the engine, if any
		stack: Option<String>,
	},

	/// The connection is gone; every outstanding call fails with this.
	#[error("Connection closed")]
	ConnectionClosed,

	/// `__create__` named a type with no registered constructor.
	#[error("Unknown protocol object type: {0}")]
	UnknownObjectType(String),

	/// A reply referenced an object that is not in the catalog.
	#[error("Object not found: {guid}")]
	ObjectNotFound { guid: String },

	/// A typed helper got a reply of a different shape.
	#[error("Unexpected reply: expected {expected}, got {actual}")]
	UnexpectedReply {
		expected: &'static str,
		actual: &'static str,
	},

	/// Caller-imposed wait elapsed.
	#[error("Timeout: {0}")]
	Timeout(String),

	#[error("I/O error: {0}")]
	Io(#[from] std::io::Error),

	#[error("JSON error: {0}")]
	Json(#[from] serde_json::Error),
}

impl Error {
	/// Returns the error name if this is a Remote error.
	pub fn error_name(&self) -> Option<&str> {
		match self {
			Error::Remote { name, .. } => Some(name),
			_ => None,
		}
	}

	/// Returns the stack trace if this is a Remote error with a stack.
	pub fn stack_trace(&self) -> Option<&str> {
		match self {
			Error::Remote { stack, .. } => stack.as_deref(),
			_ => None,
		}
	}

	/// Returns true if this is a timeout error.
	pub fn is_timeout(&self) -> bool {
		match self {
			Error::Timeout(_) => true,
			Error::Remote { name, .. } => name == "TimeoutError",
			_ => false,
		}
	}

	/// Returns true if this is a target closed error.
	pub fn is_target_closed(&self) -> bool {
		match self {
			Error::ConnectionClosed => true,
			Error::Remote { name, .. } => name == "TargetClosedError",
			_ => false,
		}
	}
}

impl From<ErrorPayload> for Error {
	fn from(error: ErrorPayload) -> Self {
		Error::Remote {
			name: error.name.unwrap_or_else(|| "Error".to_string()),
			message: error.message,
			stack: error.stack,
		}
	}
}
