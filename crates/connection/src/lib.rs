//! Connection core for the remote object protocol.
//!
//! The engine exposes a tree of stateful objects, each addressed by a GUID. This
//! crate keeps a local mirror of that tree and multiplexes any number of concurrent
//! method calls over one ordered frame stream:
//!
//! - **Transport**: length-prefixed pipes (driver stdio, sockets) or WebSocket
//! - **Connection**: actor owning the catalog and the pending call table; assigns
//!   message ids and correlates replies
//! - **Catalog**: GUID to [`RemoteObject`] map, grown by `__create__` and pruned
//!   recursively by `__dispose__`
//! - **Channel**: per-object front every typed wrapper sends its calls through
//!
//! # Architecture
//!
//! ```text
//!  callers ──► Connection (handle) ──► mailbox ──► ConnectionActor ──► writer ──► Transport
//!     ▲                                               │    ▲                        │
//!     └──────────── oneshot reply ◄───────────────────┘    └──── reader ◄───────────┘
//! ```
//!
//! # Decoupling via ObjectFactory
//!
//! Proxies are built through the [`ObjectFactory`] trait; [`TypeRegistry`] maps
//! protocol type names to constructors and rejects unknown types.

pub mod catalog;
pub mod channel;
pub mod connection;
pub mod driver;
pub mod error;
pub mod object;
pub mod pending;
pub mod registry;
pub mod transport;

pub use catalog::{Catalog, Query, Selector, Take};
pub use channel::Channel;
pub use connection::{Connection, ConnectionActor, ConnectionOptions, WeakConnection};
pub use driver::{Driver, DriverConfig};
pub use error::{Error, Result};
pub use object::{DisposeReason, ObjectSpec, RemoteObject};
pub use pending::{PendingCalls, Reply};
pub use pw_protocol::{Event, Metadata, ROOT_GUID, Request, StackFrame};
pub use registry::{Constructor, ObjectFactory, PLAYWRIGHT_TYPES, TypeRegistry};
pub use transport::{
	PipeTransport, PipeTransportReceiver, PipeTransportSender, Transport, TransportParts, TransportReceiver,
	WebSocketTransport, WebSocketTransportReceiver, WebSocketTransportSender,
};
