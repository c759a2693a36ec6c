use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::writer::MakeWriterExt;

/// Installs the stderr subscriber.
///
/// `RUST_LOG` overrides the verbosity-derived filter when set.
pub fn init_logging(verbosity: u8) {
	// 0 keeps the connection core quiet, -v surfaces lifecycle, -vv every frame
	let filter = match verbosity {
		0 => "warn,pw_connection=error",
		1 => "info,pw_connection=info",
		_ => "debug",
	};

	let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));
	let stderr = std::io::stderr.with_max_level(tracing::Level::TRACE);

	tracing_subscriber::fmt()
		.with_env_filter(env_filter)
		.with_writer(stderr)
		.with_target(true)
		.compact()
		.init();
}
