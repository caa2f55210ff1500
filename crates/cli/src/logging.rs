use tracing_subscriber::EnvFilter;

/// Filter directives for a `-v` count. `RUST_LOG` takes precedence.
pub fn default_filter(verbosity: u8) -> &'static str {
	// 0 = CLI errors only, runtime silent
	match verbosity {
		0 => "error,clearnode_runtime=off",
		1 => "info,clearnode_runtime=info",
		2 => "info,clearnode_runtime=debug,clearnode_cli=debug",
		_ => "trace",
	}
}

pub fn init_logging(verbosity: u8) {
	let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter(verbosity)));

	tracing_subscriber::fmt()
		.with_env_filter(env_filter)
		.with_writer(std::io::stderr)
		.with_target(true)
		.with_level(true)
		.compact()
		.init();
}
