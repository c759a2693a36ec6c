//! Wire envelope types for the remote object channel protocol.
//!
//! Every frame exchanged with the engine is one JSON object. Outbound frames are
//! [`Request`]s; inbound frames are either a [`Response`] correlated by `id`, or an
//! [`Event`] addressed to an object GUID (`__create__`, `__dispose__`, `__adopt__`
//! and ordinary events).

pub mod envelope;

pub use envelope::{ErrorPayload, ErrorWrapper, Event, Message, Metadata, Request, Response, StackFrame};

/// GUID of the synthetic root object in the local catalog.
pub const ROOT_GUID: &str = "Root";

/// Notification method that creates a remote object.
pub const CREATE_METHOD: &str = "__create__";

/// Notification method that disposes a remote object and its subtree.
pub const DISPOSE_METHOD: &str = "__dispose__";

/// Notification method that moves an object under a new parent.
pub const ADOPT_METHOD: &str = "__adopt__";
