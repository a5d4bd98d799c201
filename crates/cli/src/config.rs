//! Resolves CLI flags and the optional JSON config file into session settings.

use std::fs;
use std::path::Path;
use std::time::Duration;

use serde_json::{Map, Value};
use tracing::{debug, warn};
use url::Url;

use loadwatch::{CookieSpec, DEFAULT_TIMEOUT_SECS, Error, Result, SessionConfig, Viewport, default_user_agent};

use crate::cli::Cli;
use crate::formatter::ReportFormat;

/// Fully resolved run settings: the session configuration plus output glue.
#[derive(Debug)]
pub struct RunSettings {
	pub session: SessionConfig,
	pub format: ReportFormat,
	pub silent: bool,
}

/// Merges the optional JSON config file with command-line flags.
/// Command-line values win; the merged map stays visible to observers.
pub fn resolve(cli: Cli) -> Result<RunSettings> {
	let mut params = match &cli.config {
		Some(path) => load_config_file(path)?,
		None => Map::new(),
	};

	overlay(&mut params, "url", cli.url.map(Value::from));
	overlay(&mut params, "format", cli.format.map(|format| Value::from(format.to_string())));
	overlay(&mut params, "viewport", cli.viewport.map(Value::from));
	overlay(&mut params, "timeout", cli.timeout.map(Value::from));
	overlay(&mut params, "modules", cli.modules.map(Value::from));
	overlay(&mut params, "user-agent", cli.user_agent.map(Value::from));
	overlay(&mut params, "cookie", cli.cookie.map(Value::from));
	if cli.silent {
		params.insert("silent".to_string(), Value::from(true));
	}
	if cli.verbose > 0 {
		params.insert("verbose".to_string(), Value::from(true));
	}

	let url = get_str(&params, "url").ok_or(Error::MissingUrl)?;
	let parsed_url = Url::parse(&url).map_err(|err| Error::Config(format!("invalid url {url:?}: {err}")))?;

	let viewport = match get_str(&params, "viewport") {
		Some(raw) => Viewport::parse(&raw)?,
		None => Viewport::default(),
	};

	let observers = get_str(&params, "modules").map(|raw| {
		raw.split(',')
			.map(str::trim)
			.filter(|name| !name.is_empty())
			.map(String::from)
			.collect::<Vec<_>>()
	});

	let cookies = match get_str(&params, "cookie") {
		Some(raw) => vec![parse_cookie(&raw, &parsed_url)?],
		None => Vec::new(),
	};

	let format = get_str(&params, "format")
		.and_then(|raw| raw.parse::<ReportFormat>().ok())
		.unwrap_or_default();
	let silent = params.get("silent").and_then(Value::as_bool).unwrap_or(false);

	let session = SessionConfig {
		url,
		viewport,
		user_agent: get_str(&params, "user-agent").unwrap_or_else(default_user_agent),
		timeout: Duration::from_secs(timeout_secs(&params)),
		debounce: Duration::from_millis(loadwatch::DEFAULT_DEBOUNCE_MS),
		observers,
		cookies,
		silent,
		params,
	};

	Ok(RunSettings { session, format, silent })
}

fn load_config_file(path: &Path) -> Result<Map<String, Value>> {
	let raw = fs::read_to_string(path)
		.map_err(|err| Error::Config(format!("failed reading config file {}: {err}", path.display())))?;
	let value: Value = serde_json::from_str(&raw)
		.map_err(|err| Error::Config(format!("failed parsing JSON config file {}: {err}", path.display())))?;
	match value {
		Value::Object(map) => {
			debug!(target: "lw", path = %path.display(), "using JSON config file");
			Ok(map)
		}
		_ => Err(Error::Config(format!("config file {} must contain a JSON object", path.display()))),
	}
}

fn overlay(params: &mut Map<String, Value>, key: &str, value: Option<Value>) {
	if let Some(value) = value {
		params.insert(key.to_string(), value);
	}
}

fn get_str(params: &Map<String, Value>, key: &str) -> Option<String> {
	params.get(key).and_then(Value::as_str).map(str::to_string)
}

/// A non-positive or unparsable timeout falls back to the default.
fn timeout_secs(params: &Map<String, Value>) -> u64 {
	let raw = match params.get("timeout") {
		Some(Value::Number(n)) => n.as_i64(),
		Some(Value::String(s)) => s.parse::<i64>().ok(),
		_ => None,
	};
	match raw {
		Some(secs) if secs > 0 => secs as u64,
		Some(secs) => {
			warn!(target: "lw", timeout = secs, default = DEFAULT_TIMEOUT_SECS, "ignoring non-positive timeout");
			DEFAULT_TIMEOUT_SECS
		}
		None => DEFAULT_TIMEOUT_SECS,
	}
}

/// Parses a `name=value;attr=...;secure` cookie string. The domain defaults
/// to the target host when the string does not carry one.
fn parse_cookie(raw: &str, page_url: &Url) -> Result<CookieSpec> {
	let mut fragments = raw.split(';');
	let pair = fragments.next().unwrap_or_default().trim();
	let (name, value) = pair
		.split_once('=')
		.ok_or_else(|| Error::Cookie(format!("expected name=value, got {pair:?}")))?;
	let mut cookie = CookieSpec::new(name.trim(), value.trim());

	for fragment in fragments {
		let fragment = fragment.trim();
		if fragment.is_empty() {
			continue;
		}
		match fragment.split_once('=') {
			Some((key, val)) => match key.trim().to_ascii_lowercase().as_str() {
				"domain" => cookie.domain = Some(val.trim().to_string()),
				"path" => cookie.path = Some(val.trim().to_string()),
				"expires" => match val.trim().parse::<f64>() {
					Ok(epoch) => cookie.expires = Some(epoch),
					Err(_) => warn!(target: "lw", value = val, "ignoring unparsable cookie expiry"),
				},
				other => debug!(target: "lw", attribute = other, "ignoring cookie attribute"),
			},
			None if fragment.eq_ignore_ascii_case("secure") => cookie.secure = true,
			None if fragment.eq_ignore_ascii_case("httponly") => cookie.http_only = true,
			None => debug!(target: "lw", attribute = fragment, "ignoring cookie attribute"),
		}
	}

	if cookie.domain.is_none() {
		cookie.domain = page_url.host_str().map(|host| host.trim_start_matches("www.").to_string());
	}
	cookie.validate()?;
	Ok(cookie)
}

#[cfg(test)]
mod tests {
	use std::io::Write;

	use super::*;

	fn cli(url: Option<&str>) -> Cli {
		Cli {
			url: url.map(String::from),
			format: None,
			viewport: None,
			verbose: 0,
			silent: false,
			timeout: None,
			modules: None,
			user_agent: None,
			cookie: None,
			log: None,
			config: None,
		}
	}

	fn page_url() -> Url {
		Url::parse("https://www.example.com/page").unwrap()
	}

	#[test]
	fn defaults_apply_when_only_url_is_given() {
		let settings = resolve(cli(Some("https://example.com/"))).unwrap();
		assert_eq!(settings.session.url, "https://example.com/");
		assert_eq!(settings.session.timeout, Duration::from_secs(15));
		assert_eq!(settings.session.viewport, Viewport::default());
		assert_eq!(settings.format, ReportFormat::Plain);
		assert!(settings.session.observers.is_none());
		assert!(!settings.silent);
	}

	#[test]
	fn missing_url_is_a_config_fault() {
		let err = resolve(cli(None)).unwrap_err();
		assert!(matches!(err, Error::MissingUrl));
	}

	#[test]
	fn invalid_url_is_rejected() {
		let err = resolve(cli(Some("not a url"))).unwrap_err();
		assert!(matches!(err, Error::Config(_)));
	}

	#[test]
	fn cli_values_override_config_file() {
		let mut file = tempfile::NamedTempFile::new().unwrap();
		write!(file, r#"{{"url": "https://from-file.example/", "timeout": 60, "format": "csv"}}"#).unwrap();

		let mut args = cli(Some("https://from-cli.example/"));
		args.config = Some(file.path().to_path_buf());
		args.timeout = Some(5);

		let settings = resolve(args).unwrap();
		assert_eq!(settings.session.url, "https://from-cli.example/");
		assert_eq!(settings.session.timeout, Duration::from_secs(5));
		// untouched file values still apply
		assert_eq!(settings.format, ReportFormat::Csv);
	}

	#[test]
	fn config_file_fills_in_the_url() {
		let mut file = tempfile::NamedTempFile::new().unwrap();
		write!(file, r#"{{"url": "https://from-file.example/", "modules": "console"}}"#).unwrap();

		let mut args = cli(None);
		args.config = Some(file.path().to_path_buf());

		let settings = resolve(args).unwrap();
		assert_eq!(settings.session.url, "https://from-file.example/");
		assert_eq!(settings.session.observers, Some(vec!["console".to_string()]));
	}

	#[test]
	fn malformed_config_file_is_fatal() {
		let mut file = tempfile::NamedTempFile::new().unwrap();
		write!(file, "{{ not json").unwrap();

		let mut args = cli(Some("https://example.com/"));
		args.config = Some(file.path().to_path_buf());

		let err = resolve(args).unwrap_err();
		assert!(matches!(err, Error::Config(_)));
		assert_eq!(err.exit_code(), 4);
	}

	#[test]
	fn params_stay_visible_after_resolution() {
		let mut args = cli(Some("https://example.com/"));
		args.timeout = Some(30);
		let settings = resolve(args).unwrap();
		assert_eq!(settings.session.params.get("timeout"), Some(&Value::from(30)));
		assert_eq!(settings.session.params.get("url"), Some(&Value::from("https://example.com/")));
	}

	#[test]
	fn zero_timeout_falls_back_to_default() {
		let mut args = cli(Some("https://example.com/"));
		args.timeout = Some(0);
		let settings = resolve(args).unwrap();
		assert_eq!(settings.session.timeout, Duration::from_secs(15));
	}

	#[test]
	fn cookie_parses_value_and_attributes() {
		let cookie = parse_cookie("session=abc123;domain=shop.example;path=/cart;secure", &page_url()).unwrap();
		assert_eq!(cookie.name, "session");
		assert_eq!(cookie.value, "abc123");
		assert_eq!(cookie.domain.as_deref(), Some("shop.example"));
		assert_eq!(cookie.path.as_deref(), Some("/cart"));
		assert!(cookie.secure);
		assert!(!cookie.http_only);
	}

	#[test]
	fn cookie_domain_defaults_to_target_host() {
		let cookie = parse_cookie("session=abc123", &page_url()).unwrap();
		assert_eq!(cookie.domain.as_deref(), Some("example.com"));
	}

	#[test]
	fn cookie_without_value_is_fatal() {
		let err = parse_cookie("justaname", &page_url()).unwrap_err();
		assert!(matches!(err, Error::Cookie(_)));
		assert_eq!(err.exit_code(), 4);
	}

	#[test]
	fn modules_list_is_split_and_trimmed() {
		let mut args = cli(Some("https://example.com/"));
		args.modules = Some("console, load_times ,".to_string());
		let settings = resolve(args).unwrap();
		assert_eq!(
			settings.session.observers,
			Some(vec!["console".to_string(), "load_times".to_string()])
		);
	}
}
