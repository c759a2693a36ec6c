//! Connection to the engine: a cloneable handle in front of a single actor task.
//!
//! The actor ([`ConnectionActor`]) exclusively owns the catalog, the pending call
//! table and the transport halves. Every [`Connection`] operation is a command sent
//! over an unbounded mailbox, so state changes are applied one at a time in the
//! order they reach the actor, while callers wait on their own oneshot reply.
//!
//! # Message Flow
//!
//! 1. Caller posts a [`Request`] (directly or through a [`Channel`](crate::Channel))
//! 2. Actor assigns the next id, records the caller and the request, queues the frame
//! 3. Writer task hands the frame to the transport
//! 4. Reader task pushes inbound frames to the actor
//! 5. Actor either resolves the pending call for the frame's `id`, or applies a
//!    `__create__` / `__dispose__` / `__adopt__` notification to the catalog
//! 6. Caller wakes with its [`Reply`] or a typed error

use std::sync::Arc;
use std::time::Duration;

use pw_protocol::{Event, ROOT_GUID, Request};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::{broadcast, mpsc, oneshot};

use crate::catalog::Query;
use crate::error::{Error, Result};
use crate::object::{RemoteObject, normalize_guid};
use crate::pending::Reply;
use crate::registry::ObjectFactory;
use crate::transport::TransportParts;

mod actor;

pub use actor::ConnectionActor;

/// Tunables for a connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ConnectionOptions {
	/// Language reported to the engine by [`Connection::initialize`].
	pub sdk_language: String,
	/// Capacity of the event broadcast; slower subscribers lose events.
	pub event_capacity: usize,
}

impl Default for ConnectionOptions {
	fn default() -> Self {
		Self {
			sdk_language: "rust".to_string(),
			event_capacity: 256,
		}
	}
}

/// Work items processed by the actor.
pub(crate) enum Command {
	Post {
		request: Request,
		reply: oneshot::Sender<Result<Reply>>,
	},
	Get {
		guid: Arc<str>,
		reply: oneshot::Sender<Arc<RemoteObject>>,
	},
	Find {
		query: Query,
		reply: oneshot::Sender<Vec<Arc<RemoteObject>>>,
	},
	Close,
}

/// Handle to a running connection actor.
///
/// Cheap to clone. The actor runs while at least one handle exists; dropping the
/// last one stops it and closes the transport.
#[derive(Clone)]
pub struct Connection {
	commands: mpsc::UnboundedSender<Command>,
	events: broadcast::WeakSender<Event>,
	options: Arc<ConnectionOptions>,
}

/// Non-owning reference to a connection, held by proxies and their channels.
#[derive(Clone)]
pub struct WeakConnection {
	commands: mpsc::WeakUnboundedSender<Command>,
	events: broadcast::WeakSender<Event>,
	options: Arc<ConnectionOptions>,
}

impl WeakConnection {
	/// The connection, or [`Error::ConnectionClosed`] once every handle is gone.
	pub fn upgrade(&self) -> Result<Connection> {
		let commands = self.commands.upgrade().ok_or(Error::ConnectionClosed)?;
		Ok(Connection {
			commands,
			events: self.events.clone(),
			options: Arc::clone(&self.options),
		})
	}
}

impl Connection {
	/// Creates a connection over `parts`.
	///
	/// The returned actor must be driven with [`ConnectionActor::run`], usually on
	/// its own task; until then, calls queue up without being sent.
	pub fn new(
		parts: TransportParts,
		factory: Arc<dyn ObjectFactory>,
		options: ConnectionOptions,
	) -> (Self, ConnectionActor) {
		let (commands, commands_rx) = mpsc::unbounded_channel();
		let (events, _) = broadcast::channel(options.event_capacity.max(1));

		let connection = Self {
			commands,
			events: events.downgrade(),
			options: Arc::new(options),
		};
		let actor = ConnectionActor::new(connection.downgrade(), events, commands_rx, parts, factory);
		(connection, actor)
	}

	/// Creates a connection and spawns its actor on the current runtime.
	pub fn spawn(parts: TransportParts, factory: Arc<dyn ObjectFactory>, options: ConnectionOptions) -> Self {
		let (connection, actor) = Self::new(parts, factory, options);
		tokio::spawn(actor.run());
		connection
	}

	pub fn options(&self) -> &ConnectionOptions {
		&self.options
	}

	/// A reference that does not keep the actor running.
	pub fn downgrade(&self) -> WeakConnection {
		WeakConnection {
			commands: self.commands.downgrade(),
			events: self.events.clone(),
			options: Arc::clone(&self.options),
		}
	}

	/// Sends `request` and waits for its reply.
	///
	/// The request id is assigned by the actor; whatever the caller put there is
	/// replaced. There is no timeout here: a reply that never comes leaves the
	/// caller waiting until the connection closes.
	pub async fn post(&self, request: Request) -> Result<Reply> {
		let (reply, rx) = oneshot::channel();
		self.command(Command::Post { request, reply })?;
		rx.await.map_err(|_| Error::ConnectionClosed)?
	}

	/// Returns the object for `guid`, waiting for its `__create__` if needed.
	///
	/// Any number of callers may wait on the same GUID; all are resolved by the
	/// creation. Fails with [`Error::ConnectionClosed`] if the connection ends first.
	pub async fn get(&self, guid: &str) -> Result<Arc<RemoteObject>> {
		let (reply, rx) = oneshot::channel();
		self.command(Command::Get {
			guid: normalize_guid(guid),
			reply,
		})?;
		rx.await.map_err(|_| Error::ConnectionClosed)
	}

	/// [`Connection::get`] bounded by `timeout`.
	pub async fn get_timeout(&self, guid: &str, timeout: Duration) -> Result<Arc<RemoteObject>> {
		tokio::time::timeout(timeout, self.get(guid))
			.await
			.map_err(|_| Error::Timeout(format!("Timeout {}ms waiting for object: {guid}", timeout.as_millis())))?
	}

	/// Objects currently in the catalog matching `query`, or `default` if none do.
	pub async fn find(&self, query: Query, default: Vec<Arc<RemoteObject>>) -> Result<Vec<Arc<RemoteObject>>> {
		let (reply, rx) = oneshot::channel();
		self.command(Command::Find { query, reply })?;
		let found = rx.await.map_err(|_| Error::ConnectionClosed)?;
		Ok(if found.is_empty() { default } else { found })
	}

	/// First object matching `query`, if any.
	pub async fn find_first(&self, query: Query) -> Result<Option<Arc<RemoteObject>>> {
		Ok(self.find(query.first(1), Vec::new()).await?.into_iter().next())
	}

	/// The synthetic root object.
	pub async fn root(&self) -> Result<Arc<RemoteObject>> {
		self.get(ROOT_GUID).await
	}

	/// Performs the `initialize` handshake and returns the engine's top object.
	pub async fn initialize(&self) -> Result<Arc<RemoteObject>> {
		let request = Request::new(
			ROOT_GUID,
			"initialize",
			json!({ "sdkLanguage": self.options.sdk_language }),
		);
		self.post(request).await?.into_object()
	}

	/// Subscribes to notifications the core does not interpret itself.
	///
	/// The stream ends with [`broadcast::error::RecvError::Closed`] when the actor
	/// stops; subscribing after that yields an already closed receiver.
	pub fn subscribe(&self) -> broadcast::Receiver<Event> {
		match self.events.upgrade() {
			Some(events) => events.subscribe(),
			None => broadcast::channel(1).1,
		}
	}

	/// Stops the actor; outstanding calls fail with [`Error::ConnectionClosed`].
	pub fn close(&self) {
		let _ = self.commands.send(Command::Close);
	}

	/// True once the actor has stopped.
	pub fn is_closed(&self) -> bool {
		self.commands.is_closed()
	}

	fn command(&self, command: Command) -> Result<()> {
		self.commands.send(command).map_err(|_| Error::ConnectionClosed)
	}
}

impl std::fmt::Debug for Connection {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Connection")
			.field("closed", &self.is_closed())
			.field("options", &self.options)
			.finish()
	}
}
