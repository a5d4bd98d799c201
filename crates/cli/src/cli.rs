//! Command-line interface definition.

use std::path::PathBuf;

use clap::Parser;

use crate::formatter::ReportFormat;

#[derive(Parser, Debug)]
#[command(name = "lw")]
#[command(about = "Page-load profiler - opens a page, watches it load, reports metrics")]
#[command(version)]
pub struct Cli {
	/// Target URL to profile
	pub url: Option<String>,

	/// Report format
	#[arg(short, long, value_enum, value_name = "FORMAT")]
	pub format: Option<ReportFormat>,

	/// Viewport as WIDTHxHEIGHT (default 1280x1024)
	#[arg(long, value_name = "WxH")]
	pub viewport: Option<String>,

	/// Increase verbosity (-v info, -vv debug)
	#[arg(short, long, action = clap::ArgAction::Count)]
	pub verbose: u8,

	/// Suppress report output
	#[arg(long)]
	pub silent: bool,

	/// Hard timeout in seconds (default 15)
	#[arg(short, long, value_name = "SECONDS")]
	pub timeout: Option<u64>,

	/// Comma-separated observer list (default: all available)
	#[arg(short, long, value_name = "NAMES")]
	pub modules: Option<String>,

	/// Override the browser user agent
	#[arg(long, value_name = "UA")]
	pub user_agent: Option<String>,

	/// Cookie as 'name=value;domain=...;secure'
	#[arg(long, value_name = "COOKIE")]
	pub cookie: Option<String>,

	/// Append diagnostic log output to a file
	#[arg(long, value_name = "FILE")]
	pub log: Option<PathBuf>,

	/// JSON config file; command-line values win
	#[arg(short, long, value_name = "FILE")]
	pub config: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn parse_url_and_defaults() {
		let cli = Cli::try_parse_from(["lw", "https://example.com"]).unwrap();
		assert_eq!(cli.url.as_deref(), Some("https://example.com"));
		assert_eq!(cli.format, None);
		assert_eq!(cli.timeout, None);
		assert!(!cli.silent);
		assert_eq!(cli.verbose, 0);
	}

	#[test]
	fn parse_format_and_timeout() {
		let cli = Cli::try_parse_from(["lw", "https://example.com", "-f", "json", "-t", "30"]).unwrap();
		assert_eq!(cli.format, Some(ReportFormat::Json));
		assert_eq!(cli.timeout, Some(30));
	}

	#[test]
	fn parse_modules_list() {
		let cli = Cli::try_parse_from(["lw", "https://example.com", "-m", "console,load_times"]).unwrap();
		assert_eq!(cli.modules.as_deref(), Some("console,load_times"));
	}

	#[test]
	fn verbose_flag_accumulates() {
		let cli = Cli::try_parse_from(["lw", "-vv", "https://example.com"]).unwrap();
		assert_eq!(cli.verbose, 2);
	}

	#[test]
	fn url_may_come_from_config_file_instead() {
		let cli = Cli::try_parse_from(["lw", "--config", "lw.json"]).unwrap();
		assert_eq!(cli.url, None);
		assert_eq!(cli.config, Some(std::path::PathBuf::from("lw.json")));
	}

	#[test]
	fn unknown_format_is_rejected() {
		assert!(Cli::try_parse_from(["lw", "https://example.com", "-f", "xml"]).is_err());
	}
}
