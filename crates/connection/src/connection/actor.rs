use std::sync::Arc;

use pw_protocol::{ADOPT_METHOD, CREATE_METHOD, DISPOSE_METHOD, Event, Message, ROOT_GUID, Request, Response};
use serde::Deserialize;
use serde_json::Value;
use tokio::sync::{broadcast, mpsc, oneshot};

use super::{Command, WeakConnection};
use crate::catalog::Catalog;
use crate::error::{Error, Result};
use crate::object::{DisposeReason, ObjectSpec, RemoteObject, normalize_guid};
use crate::pending::{PendingCall, PendingCalls, Reply, resolve_reply};
use crate::registry::ObjectFactory;
use crate::transport::TransportParts;

/// Single owner of the catalog, the pending call table and the transport.
///
/// Inbound frames and client commands are processed one at a time by
/// [`ConnectionActor::run`]; nothing else mutates this state.
pub struct ConnectionActor {
	connection: WeakConnection,
	events: broadcast::Sender<Event>,
	commands_rx: mpsc::UnboundedReceiver<Command>,
	transport: Option<TransportParts>,
	outbound_tx: mpsc::UnboundedSender<String>,
	outbound_rx: Option<mpsc::UnboundedReceiver<String>>,
	factory: Arc<dyn ObjectFactory>,
	catalog: Catalog,
	pending: PendingCalls,
}

impl ConnectionActor {
	pub(super) fn new(
		connection: WeakConnection,
		events: broadcast::Sender<Event>,
		commands_rx: mpsc::UnboundedReceiver<Command>,
		transport: TransportParts,
		factory: Arc<dyn ObjectFactory>,
	) -> Self {
		let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
		let root = Arc::new(RemoteObject::root(connection.clone()));

		Self {
			connection,
			events,
			commands_rx,
			transport: Some(transport),
			outbound_tx,
			outbound_rx: Some(outbound_rx),
			factory,
			catalog: Catalog::new(root),
			pending: PendingCalls::new(),
		}
	}

	pub fn catalog(&self) -> &Catalog {
		&self.catalog
	}

	pub fn pending(&self) -> &PendingCalls {
		&self.pending
	}

	/// Runs the actor until the transport ends, the connection is closed, or the
	/// last [`Connection`](super::Connection) handle is dropped.
	///
	/// On exit every pending call and every deferred lookup fails with
	/// [`Error::ConnectionClosed`], and event subscribers see the stream close.
	pub async fn run(mut self) {
		let (Some(parts), Some(mut outbound_rx)) = (self.transport.take(), self.outbound_rx.take()) else {
			tracing::error!("connection actor started twice");
			return;
		};
		let TransportParts {
			mut sender,
			receiver,
			mut message_rx,
		} = parts;

		let reader = tokio::spawn(async move {
			if let Err(e) = receiver.run().await {
				tracing::error!(error = %e, "transport read failed");
			}
		});

		let mut writer = tokio::spawn(async move {
			while let Some(frame) = outbound_rx.recv().await {
				sender.send(frame).await?;
			}
			Ok::<(), Error>(())
		});

		let reason = loop {
			tokio::select! {
				biased;

				frame = message_rx.recv() => match frame {
					Some(frame) => self.receive(&frame),
					None => break "transport closed",
				},
				written = &mut writer => {
					match written {
						Ok(Err(e)) => tracing::error!(error = %e, "transport write failed"),
						Err(e) => tracing::error!(error = %e, "transport writer task failed"),
						Ok(Ok(())) => {}
					}
					break "transport write failed";
				},
				command = self.commands_rx.recv() => match command {
					Some(Command::Close) => break "closed by client",
					None => break "all handles dropped",
					Some(command) => self.handle_command(command),
				},
			}
		};

		self.shutdown(reason);
		reader.abort();
		writer.abort();
	}

	/// Applies one client command.
	pub(super) fn handle_command(&mut self, command: Command) {
		match command {
			Command::Post { request, reply } => self.post(request, reply),
			Command::Get { guid, reply } => self.catalog.wait_for(guid, reply),
			Command::Find { query, reply } => {
				self.catalog.prune_waiters();
				let _ = reply.send(self.catalog.find(&query));
			}
			Command::Close => {}
		}
	}

	fn post(&mut self, mut request: Request, reply: oneshot::Sender<Result<Reply>>) {
		let prepared = self.pending.next_id().and_then(|id| {
			request.id = id;
			let payload = serde_json::to_value(&request)?;
			let frame = wire_frame(&payload)?;
			Ok((id, payload, frame))
		});
		let (id, payload, frame) = match prepared {
			Ok(prepared) => prepared,
			Err(e) => {
				let _ = reply.send(Err(e));
				return;
			}
		};

		tracing::debug!(id, guid = %request.guid, method = %request.method, "sending call");
		self.pending.insert(id, PendingCall { reply, request: payload });

		if self.outbound_tx.send(frame).is_err() {
			if let Some(call) = self.pending.take(id) {
				let _ = call.reply.send(Err(Error::ConnectionClosed));
			}
		}
	}

	/// Decodes and applies one inbound frame. Bad frames are logged and dropped.
	pub fn receive(&mut self, frame: &str) {
		let value: Value = match serde_json::from_str(frame) {
			Ok(value) => value,
			Err(e) => {
				tracing::warn!(error = %e, "dropping malformed frame");
				return;
			}
		};

		let result = match Message::deserialize(&value) {
			Ok(Message::Response(response)) => self.resolve(&value, response),
			Ok(Message::Event(event)) => self.notify(event),
			Ok(Message::Unknown(_)) => {
				tracing::debug!(frame = %value, "unknown frame (ignored)");
				Ok(())
			}
			Err(e) => Err(e.into()),
		};

		if let Err(e) = result {
			tracing::error!(error = %e, "dropping inbound frame");
		}
	}

	fn resolve(&mut self, frame: &Value, response: Response) -> Result<()> {
		let id = response.id;
		let call = self
			.pending
			.take(id)
			.ok_or_else(|| Error::ProtocolError(format!("Cannot find request to respond: id={id}")))?;

		let reply = resolve_reply(frame, response, call.request, &self.catalog);
		match &reply {
			Ok(reply) => tracing::debug!(id, kind = reply.kind(), "call resolved"),
			Err(e) => tracing::debug!(id, error = %e, "call failed"),
		}
		if call.reply.send(reply).is_err() {
			tracing::debug!(id, "caller gone, reply discarded");
		}
		Ok(())
	}

	fn notify(&mut self, event: Event) -> Result<()> {
		let guid = normalize_guid(&event.guid);
		match event.method.as_str() {
			CREATE_METHOD => self.create(guid, &event.params),
			DISPOSE_METHOD => self.dispose(&guid, &event.params),
			ADOPT_METHOD => self.adopt(&guid, &event.params),
			_ => {
				tracing::debug!(guid = %guid, method = %event.method, "event not handled by connection");
				// No subscribers is not an error.
				let _ = self.events.send(Event { guid, ..event });
				Ok(())
			}
		}
	}

	fn create(&mut self, parent: Arc<str>, params: &Value) -> Result<()> {
		let guid = params
			.get("guid")
			.and_then(Value::as_str)
			.filter(|g| !g.is_empty())
			.ok_or_else(|| Error::ProtocolError("__create__ missing 'guid'".to_string()))?;
		let type_name = params
			.get("type")
			.and_then(Value::as_str)
			.ok_or_else(|| Error::ProtocolError("__create__ missing 'type'".to_string()))?;

		if !self.catalog.contains(&parent) {
			return Err(Error::ProtocolError(format!(
				"Parent object not found: {parent} (creating {type_name} {guid})"
			)));
		}

		let initializer = match params.get("initializer") {
			Some(initializer) => initializer.clone(),
			None => {
				let mut fields = params.as_object().cloned().unwrap_or_default();
				fields.remove("guid");
				fields.remove("type");
				Value::Object(fields)
			}
		};

		let object = self.factory.create_object(ObjectSpec {
			type_name: Arc::from(type_name),
			guid: Arc::from(guid),
			parent: Arc::clone(&parent),
			initializer,
			connection: self.connection.clone(),
		})?;
		self.catalog.insert(object)?;

		tracing::debug!(guid, type_name, parent = %parent, "created object");
		Ok(())
	}

	fn dispose(&mut self, guid: &str, params: &Value) -> Result<()> {
		let reason = match params.get("reason").and_then(Value::as_str) {
			Some("gc") => DisposeReason::GarbageCollected,
			_ => DisposeReason::Closed,
		};

		let removed = self.catalog.remove_subtree(guid)?;
		if removed.is_empty() {
			tracing::debug!(guid, "dispose for unknown object (ignored)");
			return Ok(());
		}
		for object in &removed {
			object.mark_disposed(reason);
		}
		tracing::debug!(guid, count = removed.len(), ?reason, "disposed subtree");
		Ok(())
	}

	fn adopt(&mut self, parent: &str, params: &Value) -> Result<()> {
		let child = params
			.get("guid")
			.and_then(Value::as_str)
			.ok_or_else(|| Error::ProtocolError("__adopt__ missing 'guid'".to_string()))?;
		self.catalog.reparent(child, parent)?;
		tracing::debug!(child, parent, "adopted object");
		Ok(())
	}

	fn shutdown(&mut self, reason: &str) {
		tracing::info!(
			reason,
			pending = self.pending.len(),
			objects = self.catalog.len(),
			"connection closing"
		);
		self.commands_rx.close();
		while let Ok(command) = self.commands_rx.try_recv() {
			if let Command::Post { reply, .. } = command {
				let _ = reply.send(Err(Error::ConnectionClosed));
			}
		}
		self.pending.fail_all();
		self.catalog.clear_waiters();
	}

	#[cfg(test)]
	pub(super) fn take_outbound(&mut self) -> Vec<String> {
		let mut frames = Vec::new();
		if let Some(rx) = self.outbound_rx.as_mut() {
			while let Ok(frame) = rx.try_recv() {
				frames.push(frame);
			}
		}
		frames
	}
}

/// Serializes a request, addressing the local root as the engine's empty GUID.
fn wire_frame(payload: &Value) -> Result<String> {
	if payload.get("guid").and_then(Value::as_str) == Some(ROOT_GUID) {
		let mut payload = payload.clone();
		payload["guid"] = Value::String(String::new());
		return Ok(serde_json::to_string(&payload)?);
	}
	Ok(serde_json::to_string(payload)?)
}
