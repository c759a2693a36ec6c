//! Driver process launch.
//!
//! The engine runs as a Node.js driver (`node cli.js run-driver`) speaking the
//! length-prefixed frame protocol over stdio.

use std::path::PathBuf;
use std::process::Stdio;

use tokio::process::{Child, Command};

use crate::error::{Error, Result};
use crate::transport::{PipeTransport, TransportParts};

/// How to start the driver process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriverConfig {
	pub node: PathBuf,
	pub cli_js: PathBuf,
	pub args: Vec<String>,
	/// Extra environment for the child.
	pub env: Vec<(String, String)>,
}

impl DriverConfig {
	pub fn new(node: impl Into<PathBuf>, cli_js: impl Into<PathBuf>) -> Self {
		Self {
			node: node.into(),
			cli_js: cli_js.into(),
			args: vec!["run-driver".to_string()],
			env: Vec::new(),
		}
	}

	/// Locates the driver from the process environment.
	///
	/// 1. `PLAYWRIGHT_NODE_EXE` and `PLAYWRIGHT_CLI_JS`
	/// 2. `PLAYWRIGHT_DRIVER_PATH` (`<dir>/node`, `<dir>/package/cli.js`)
	///
	/// `PLAYWRIGHT_BROWSERS_PATH` is passed through to the child when set.
	pub fn from_env() -> Result<Self> {
		Self::from_vars(|key| std::env::var(key).ok())
	}

	fn from_vars(var: impl Fn(&str) -> Option<String>) -> Result<Self> {
		let mut config = match (var("PLAYWRIGHT_NODE_EXE"), var("PLAYWRIGHT_CLI_JS")) {
			(Some(node), Some(cli_js)) => Self::new(node, cli_js),
			_ => {
				let dir = PathBuf::from(var("PLAYWRIGHT_DRIVER_PATH").ok_or(Error::ServerNotFound)?);
				let node = if cfg!(windows) { dir.join("node.exe") } else { dir.join("node") };
				Self::new(node, dir.join("package").join("cli.js"))
			}
		};

		if let Some(browsers_path) = var("PLAYWRIGHT_BROWSERS_PATH") {
			config.env.push(("PLAYWRIGHT_BROWSERS_PATH".to_string(), browsers_path));
		}
		Ok(config)
	}
}

/// A running driver process.
#[derive(Debug)]
pub struct Driver {
	process: Child,
}

impl Driver {
	/// Spawns the driver and wires its stdio into a pipe transport.
	///
	/// The child is killed when the returned [`Driver`] is dropped.
	pub async fn launch(config: &DriverConfig) -> Result<(Self, TransportParts)> {
		if !config.cli_js.exists() {
			return Err(Error::ServerNotFound);
		}

		let mut process = Command::new(&config.node)
			.arg(&config.cli_js)
			.args(&config.args)
			.envs(config.env.iter().map(|(k, v)| (k, v)))
			.env("PW_LANG_NAME", "rust")
			.env("PW_CLI_DISPLAY_VERSION", env!("CARGO_PKG_VERSION"))
			.stdin(Stdio::piped())
			.stdout(Stdio::piped())
			.stderr(Stdio::inherit())
			.kill_on_drop(true)
			.spawn()
			.map_err(|e| Error::LaunchFailed(format!("{}: {e}", config.node.display())))?;

		tokio::time::sleep(std::time::Duration::from_millis(100)).await;
		if let Some(status) = process.try_wait()? {
			return Err(Error::LaunchFailed(format!("driver exited immediately with {status}")));
		}

		let stdin = process
			.stdin
			.take()
			.ok_or_else(|| Error::LaunchFailed("driver stdin not captured".to_string()))?;
		let stdout = process
			.stdout
			.take()
			.ok_or_else(|| Error::LaunchFailed("driver stdout not captured".to_string()))?;

		tracing::debug!(pid = process.id(), node = %config.node.display(), "driver launched");

		let (transport, message_rx) = PipeTransport::new(stdin, stdout);
		Ok((Self { process }, transport.into_transport_parts(message_rx)))
	}

	pub fn id(&self) -> Option<u32> {
		self.process.id()
	}

	/// Kills the driver and waits for it to exit.
	pub async fn shutdown(mut self) -> Result<()> {
		if self.process.try_wait()?.is_none() {
			self.process.kill().await?;
		}
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use std::collections::HashMap;

	use super::*;

	fn vars(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
		let map: HashMap<String, String> = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
		move |key: &str| map.get(key).cloned()
	}

	#[test]
	fn test_node_and_cli_vars_take_precedence() {
		let config = DriverConfig::from_vars(vars(&[
			("PLAYWRIGHT_NODE_EXE", "/opt/node"),
			("PLAYWRIGHT_CLI_JS", "/opt/pw/cli.js"),
			("PLAYWRIGHT_DRIVER_PATH", "/ignored"),
		]))
		.unwrap();

		assert_eq!(config.node, PathBuf::from("/opt/node"));
		assert_eq!(config.cli_js, PathBuf::from("/opt/pw/cli.js"));
		assert_eq!(config.args, vec!["run-driver".to_string()]);
	}

	#[test]
	fn test_driver_path_layout() {
		let config = DriverConfig::from_vars(vars(&[
			("PLAYWRIGHT_DRIVER_PATH", "/drv"),
			("PLAYWRIGHT_BROWSERS_PATH", "/browsers"),
		]))
		.unwrap();

		assert_eq!(config.cli_js, PathBuf::from("/drv").join("package").join("cli.js"));
		assert!(config.node.starts_with("/drv"));
		assert_eq!(
			config.env,
			vec![("PLAYWRIGHT_BROWSERS_PATH".to_string(), "/browsers".to_string())]
		);
	}

	#[test]
	fn test_missing_driver() {
		let err = DriverConfig::from_vars(vars(&[("PLAYWRIGHT_NODE_EXE", "/opt/node")])).unwrap_err();
		assert!(matches!(err, Error::ServerNotFound));
	}

	#[tokio::test]
	async fn test_launch_without_cli_js() {
		let config = DriverConfig::new("node", "/definitely/not/here/cli.js");
		let err = Driver::launch(&config).await.err().expect("launch should fail");
		assert!(matches!(err, Error::ServerNotFound));
	}
}
