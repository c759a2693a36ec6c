use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use pw_connection::{
	Connection, ConnectionOptions, Driver, DriverConfig, Query, RemoteObject, Reply, Request, TypeRegistry,
	WebSocketTransport,
};
use serde_json::{Value, json};

mod logging;

#[derive(Parser, Debug)]
#[command(name = "pw-probe")]
#[command(about = "Inspect a running automation engine")]
#[command(version)]
struct Cli {
	/// Increase verbosity (-v info, -vv debug)
	#[arg(short, long, global = true, action = clap::ArgAction::Count)]
	verbose: u8,

	/// Connect to an engine WebSocket endpoint instead of launching the driver
	#[arg(long, global = true, value_name = "URL")]
	ws: Option<String>,

	/// Accept every object type instead of the known engine types
	#[arg(long, global = true)]
	any_type: bool,

	#[command(subcommand)]
	command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
	/// Print the object tree after the initialize handshake
	Tree,
	/// Call a method on an object and print the reply
	Call {
		/// Target object GUID ("" addresses the root)
		guid: String,
		method: String,
		/// Parameters as a JSON object
		#[arg(default_value = "{}")]
		params: String,
		/// Seconds to wait for the target object to appear
		#[arg(long, default_value_t = 10)]
		wait: u64,
	},
	/// Print engine notifications as they arrive
	Watch {
		/// Stop after this many events
		#[arg(long)]
		count: Option<usize>,
	},
}

#[tokio::main]
async fn main() {
	let cli = Cli::parse();
	logging::init_logging(cli.verbose);

	if let Err(err) = run(cli).await {
		eprintln!("error: {err:#}");
		std::process::exit(1);
	}
}

async fn run(cli: Cli) -> Result<()> {
	let registry = if cli.any_type {
		TypeRegistry::any()
	} else {
		TypeRegistry::playwright()
	};

	let (connection, driver) = connect(cli.ws.as_deref(), registry).await?;
	let top = connection.initialize().await.context("initialize handshake failed")?;
	tracing::info!(guid = top.guid(), type_name = top.type_name(), "engine ready");

	let outcome = match cli.command {
		Commands::Tree => print_tree(&connection).await,
		Commands::Call {
			guid,
			method,
			params,
			wait,
		} => call(&connection, &guid, &method, &params, Duration::from_secs(wait)).await,
		Commands::Watch { count } => watch(&connection, count).await,
	};

	connection.close();
	if let Some(driver) = driver {
		driver.shutdown().await?;
	}
	outcome
}

async fn connect(ws: Option<&str>, registry: TypeRegistry) -> Result<(Connection, Option<Driver>)> {
	let factory = Arc::new(registry);
	let options = ConnectionOptions::default();

	match ws {
		Some(url) => {
			let (transport, message_rx) = WebSocketTransport::connect(url)
				.await
				.with_context(|| format!("failed to connect to {url}"))?;
			let parts = transport.into_transport_parts(message_rx);
			Ok((Connection::spawn(parts, factory, options), None))
		}
		None => {
			let config = DriverConfig::from_env().context(
				"driver not found; set PLAYWRIGHT_DRIVER_PATH or PLAYWRIGHT_NODE_EXE and PLAYWRIGHT_CLI_JS",
			)?;
			let (driver, parts) = Driver::launch(&config).await?;
			Ok((Connection::spawn(parts, factory, options), Some(driver)))
		}
	}
}

async fn print_tree(connection: &Connection) -> Result<()> {
	let root = connection.root().await?;
	let mut stack: Vec<(Arc<RemoteObject>, usize)> = vec![(root, 0)];

	while let Some((object, depth)) = stack.pop() {
		println!("{}{} <{}>", "  ".repeat(depth), display_guid(&object), object.type_name());
		let children = connection.find(Query::children_of(object.guid()), Vec::new()).await?;
		stack.extend(children.into_iter().rev().map(|child| (child, depth + 1)));
	}
	Ok(())
}

async fn call(connection: &Connection, guid: &str, method: &str, params: &str, wait: Duration) -> Result<()> {
	let params: Value = serde_json::from_str(params).context("params must be valid JSON")?;
	let target = connection.get_timeout(guid, wait).await?;

	let reply = connection.post(Request::new(target.guid(), method, params)).await?;
	println!("{}", serde_json::to_string_pretty(&reply_json(reply))?);
	Ok(())
}

async fn watch(connection: &Connection, count: Option<usize>) -> Result<()> {
	let mut events = connection.subscribe();
	let mut seen = 0;

	while count.is_none_or(|limit| seen < limit) {
		match events.recv().await {
			Ok(event) => {
				println!("{}", serde_json::to_string(&event)?);
				seen += 1;
			}
			Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
				tracing::warn!(skipped, "event subscriber lagged");
			}
			Err(tokio::sync::broadcast::error::RecvError::Closed) => {
				tracing::info!(seen, "connection closed, no more events");
				break;
			}
		}
	}
	Ok(())
}

fn reply_json(reply: Reply) -> Value {
	match reply {
		Reply::Object(object) => json!({ "guid": object.guid(), "type": object.type_name() }),
		Reply::Value(value) => value,
		Reply::Empty => json!({}),
		Reply::Echo(fields) => Value::Object(fields),
	}
}

fn display_guid(object: &RemoteObject) -> &str {
	if object.is_root() { "(root)" } else { object.guid() }
}
