//! End-to-end sessions against a scripted engine.

use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use pw_connection::{
	Connection, ConnectionOptions, Error, Metadata, PipeTransport, Query, ROOT_GUID, Reply, TypeRegistry,
	WebSocketTransport,
};
use serde_json::{Value, json};
use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream, duplex};
use tokio::net::TcpListener;
use tokio::sync::broadcast::error::RecvError;
use tokio_tungstenite::tungstenite::Message as WsMessage;

struct Engine {
	inbound: DuplexStream,
	outbound: DuplexStream,
}

impl Engine {
	async fn recv(&mut self) -> Value {
		let mut len_buf = [0u8; 4];
		self.inbound.read_exact(&mut len_buf).await.unwrap();
		let mut body = vec![0u8; u32::from_le_bytes(len_buf) as usize];
		self.inbound.read_exact(&mut body).await.unwrap();
		serde_json::from_slice(&body).unwrap()
	}

	async fn send(&mut self, frame: Value) {
		let body = serde_json::to_vec(&frame).unwrap();
		self.outbound.write_all(&(body.len() as u32).to_le_bytes()).await.unwrap();
		self.outbound.write_all(&body).await.unwrap();
		self.outbound.flush().await.unwrap();
	}

	async fn create(&mut self, parent: &str, type_name: &str, guid: &str, initializer: Value) {
		self.send(json!({
			"guid": parent,
			"method": "__create__",
			"params": {"type": type_name, "guid": guid, "initializer": initializer}
		}))
		.await;
	}
}

fn connect() -> (Connection, Engine) {
	let (stdin_read, stdin_write) = duplex(64 * 1024);
	let (stdout_read, stdout_write) = duplex(64 * 1024);
	let (transport, message_rx) = PipeTransport::new(stdin_write, stdout_read);
	let connection = Connection::spawn(
		transport.into_transport_parts(message_rx),
		Arc::new(TypeRegistry::playwright()),
		ConnectionOptions::default(),
	);
	(
		connection,
		Engine {
			inbound: stdin_read,
			outbound: stdout_write,
		},
	)
}

#[tokio::test]
async fn test_browser_session_lifecycle() {
	let (connection, mut engine) = connect();

	let init = tokio::spawn({
		let connection = connection.clone();
		async move { connection.initialize().await }
	});
	let request = engine.recv().await;
	engine.create("", "Playwright", "playwright", json!({})).await;
	engine.create("playwright", "BrowserType", "chromium", json!({"name": "chromium"})).await;
	engine
		.send(json!({"id": request["id"], "result": {"playwright": {"guid": "playwright"}}}))
		.await;
	let playwright = init.await.unwrap().unwrap();
	assert_eq!(playwright.guid(), "playwright");

	let chromium = connection
		.find_first(Query::children_of_type("playwright", "BrowserType"))
		.await
		.unwrap()
		.unwrap();
	assert_eq!(chromium.initializer()["name"], "chromium");

	let launch = tokio::spawn({
		let chromium = Arc::clone(&chromium);
		async move {
			chromium
				.channel()
				.send_with_metadata(
					"launch",
					json!({"headless": true}),
					Metadata::now().with_api_name("browserType.launch"),
				)
				.await
		}
	});
	let request = engine.recv().await;
	assert_eq!(request["guid"], "chromium");
	assert_eq!(request["method"], "launch");
	assert_eq!(request["metadata"]["apiName"], "browserType.launch");

	engine.create("chromium", "Browser", "browser@1", json!({"version": "120"})).await;
	engine.create("browser@1", "BrowserContext", "context@1", json!({})).await;
	engine.create("context@1", "Page", "page@1", json!({})).await;
	engine.create("context@1", "Page", "page@2", json!({})).await;
	engine.create("page@1", "Frame", "frame@1", json!({})).await;
	engine
		.send(json!({"id": request["id"], "result": {"browser": {"guid": "browser@1"}}}))
		.await;

	let browser = launch.await.unwrap().unwrap().into_object().unwrap();
	assert_eq!(browser.parent_guid().as_deref(), Some("chromium"));

	let pages = connection
		.find(Query::children_of_type("context@1", "Page"), Vec::new())
		.await
		.unwrap();
	let page_guids: Vec<&str> = pages.iter().map(|p| p.guid()).collect();
	assert_eq!(page_guids, vec!["page@1", "page@2"]);

	let frame = connection.get("frame@1").await.unwrap();

	let close = tokio::spawn({
		let browser = Arc::clone(&browser);
		async move { browser.channel().send_no_params("close").await }
	});
	let request = engine.recv().await;
	engine.send(json!({"guid": "browser@1", "method": "__dispose__"})).await;
	engine.send(json!({"id": request["id"], "result": {}})).await;
	assert!(close.await.unwrap().unwrap().is_empty());
	assert!(browser.is_disposed());

	let leftover = connection.find(Query::children_of("chromium"), Vec::new()).await.unwrap();
	assert!(leftover.is_empty());
	assert!(frame.is_disposed());
	for guid in ["browser@1", "context@1", "page@1", "page@2", "frame@1"] {
		let found = connection.find(Query::guid(guid), Vec::new()).await.unwrap();
		assert!(found.is_empty(), "{guid} should be gone");
	}
	assert!(connection.find_first(Query::guid("chromium")).await.unwrap().is_some());
}

#[tokio::test]
async fn test_typed_channel_calls_and_remote_errors() {
	let (connection, mut engine) = connect();
	engine.create("", "Page", "page@1", json!({})).await;
	let page = connection.get("page@1").await.unwrap();

	let title = tokio::spawn({
		let page = Arc::clone(&page);
		async move { page.channel().send_as::<_, String>("title", Value::Null).await }
	});
	let request = engine.recv().await;
	assert_eq!(request["params"], json!({}));
	engine.send(json!({"id": request["id"], "result": {"value": "Example Domain"}})).await;
	assert_eq!(title.await.unwrap().unwrap(), "Example Domain");

	let click = tokio::spawn({
		let page = Arc::clone(&page);
		async move { page.channel().send_no_result("click", json!({"selector": "#go"})).await }
	});
	let request = engine.recv().await;
	engine
		.send(json!({
			"id": request["id"],
			"error": {"error": {"name": "TimeoutError", "message": "Timeout 200ms exceeded."}}
		}))
		.await;
	let err = click.await.unwrap().unwrap_err();
	assert!(err.is_timeout());
	assert_eq!(err.to_string(), "TimeoutError: Timeout 200ms exceeded.");
}

#[tokio::test]
async fn test_events_reach_subscribers() {
	let (connection, mut engine) = connect();
	let mut events = connection.subscribe();

	engine.create("", "Page", "page@1", json!({})).await;
	engine
		.send(json!({"guid": "page@1", "method": "console", "params": {"text": "hi"}}))
		.await;

	let event = events.recv().await.unwrap();
	assert_eq!(event.guid.as_ref(), "page@1");
	assert_eq!(event.method, "console");

	let root_children = connection.find(Query::children_of(ROOT_GUID), Vec::new()).await.unwrap();
	assert_eq!(root_children.len(), 1);
	let children = root_children[0].children().await.unwrap();
	assert!(children.is_empty());
}

#[tokio::test]
async fn test_engine_exit_closes_connection() {
	let (connection, mut engine) = connect();
	let mut events = connection.subscribe();

	let call = tokio::spawn({
		let connection = connection.clone();
		async move { connection.root().await?.channel().send_no_params("never").await }
	});
	let _ = engine.recv().await;
	drop(engine);

	let result: Result<Reply, Error> = call.await.unwrap();
	assert!(matches!(result, Err(Error::ConnectionClosed)));
	assert!(matches!(connection.get("anything").await, Err(Error::ConnectionClosed)));
	assert!(matches!(events.recv().await, Err(RecvError::Closed)));
}

#[tokio::test]
async fn test_dropping_connection_releases_engine() {
	let (connection, mut engine) = connect();
	engine.create("", "Playwright", "playwright", json!({})).await;
	let playwright = connection.get("playwright").await.unwrap();

	drop(connection);

	let mut buf = [0u8; 1];
	let read = tokio::time::timeout(Duration::from_secs(5), engine.inbound.read(&mut buf))
		.await
		.unwrap()
		.unwrap();
	assert_eq!(read, 0);
	assert!(matches!(playwright.children().await, Err(Error::ConnectionClosed)));
}

#[tokio::test]
async fn test_websocket_session() {
	let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
	let addr = listener.local_addr().unwrap();

	let server = tokio::spawn(async move {
		let (stream, _) = listener.accept().await.unwrap();
		let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();

		let message = ws.next().await.unwrap().unwrap();
		let request: Value = serde_json::from_str(message.to_text().unwrap()).unwrap();
		assert_eq!(request["method"], "initialize");

		let frames = [
			json!({"guid": "", "method": "__create__", "params": {"type": "Playwright", "guid": "pw", "initializer": {}}}),
			json!({"id": request["id"], "result": {"playwright": {"guid": "pw"}}}),
		];
		for frame in frames {
			ws.send(WsMessage::Text(frame.to_string())).await.unwrap();
		}
		while let Some(Ok(_)) = ws.next().await {}
	});

	let (transport, message_rx) = WebSocketTransport::connect(&format!("ws://{addr}")).await.unwrap();
	let connection = Connection::spawn(
		transport.into_transport_parts(message_rx),
		Arc::new(TypeRegistry::playwright()),
		ConnectionOptions::default(),
	);

	let playwright = connection.initialize().await.unwrap();
	assert_eq!(playwright.guid(), "pw");

	connection.close();
	let _ = server.await;
}
