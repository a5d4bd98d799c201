//! Tracing bootstrap for the CLI.

use std::fs::OpenOptions;
use std::path::Path;
use std::sync::Arc;

use tracing_subscriber::EnvFilter;

/// Installs the global subscriber. Diagnostics go to stderr so the report
/// stays alone on stdout; `--log FILE` appends them to a file instead.
pub fn init(verbose: u8, log_file: Option<&Path>) {
	let level = match verbose {
		0 => "warn",
		1 => "info",
		_ => "debug",
	};
	let filter = EnvFilter::try_from_default_env()
		.unwrap_or_else(|_| EnvFilter::new(format!("loadwatch={level},lw={level}")));

	match log_file {
		Some(path) => {
			let file = match OpenOptions::new().create(true).append(true).open(path) {
				Ok(file) => file,
				Err(err) => {
					eprintln!("lw: cannot open log file {}: {err}", path.display());
					std::process::exit(4);
				}
			};
			tracing_subscriber::fmt()
				.with_env_filter(filter)
				.with_writer(Arc::new(file))
				.with_ansi(false)
				.init();
		}
		None => {
			tracing_subscriber::fmt()
				.with_env_filter(filter)
				.with_writer(std::io::stderr)
				.init();
		}
	}
}
