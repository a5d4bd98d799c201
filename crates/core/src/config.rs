//! Session configuration and validation.

use std::fmt;
use std::time::Duration;

use serde_json::{Map, Value};

use crate::error::{Error, Result};

/// Hard timeout applied when the configuration does not override it.
pub const DEFAULT_TIMEOUT_SECS: u64 = 15;

/// Quiet period after the last settled request before the report fires.
pub const DEFAULT_DEBOUNCE_MS: u64 = 1000;

/// Browser viewport dimensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Viewport {
	pub width: u32,
	pub height: u32,
}

impl Viewport {
	/// Parses a `WIDTHxHEIGHT` string such as `1280x1024`.
	pub fn parse(raw: &str) -> Result<Self> {
		let (width, height) = raw
			.split_once(['x', 'X'])
			.ok_or_else(|| Error::Config(format!("viewport must be WIDTHxHEIGHT, got {raw:?}")))?;
		let width: u32 = width
			.trim()
			.parse()
			.map_err(|_| Error::Config(format!("invalid viewport width in {raw:?}")))?;
		let height: u32 = height
			.trim()
			.parse()
			.map_err(|_| Error::Config(format!("invalid viewport height in {raw:?}")))?;
		if width == 0 || height == 0 {
			return Err(Error::Config(format!("viewport dimensions must be positive, got {raw:?}")));
		}
		Ok(Self { width, height })
	}
}

impl Default for Viewport {
	fn default() -> Self {
		Self { width: 1280, height: 1024 }
	}
}

impl fmt::Display for Viewport {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}x{}", self.width, self.height)
	}
}

/// A cookie to install before the page is opened.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CookieSpec {
	pub name: String,
	pub value: String,
	pub domain: Option<String>,
	pub path: Option<String>,
	pub secure: bool,
	pub http_only: bool,
	/// Expiry as seconds since the epoch.
	pub expires: Option<f64>,
}

impl CookieSpec {
	pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
		Self { name: name.into(), value: value.into(), ..Self::default() }
	}

	/// A cookie needs at least a name and a value.
	pub fn validate(&self) -> Result<()> {
		if self.name.is_empty() || self.value.is_empty() {
			return Err(Error::Cookie("cookie missing name or value".into()));
		}
		Ok(())
	}
}

/// User agent reported when the configuration does not override it.
pub fn default_user_agent() -> String {
	format!(
		"loadwatch/{} ({} {})",
		env!("CARGO_PKG_VERSION"),
		std::env::consts::OS,
		std::env::consts::ARCH
	)
}

/// Everything a session needs to profile one page load.
#[derive(Debug)]
pub struct SessionConfig {
	pub url: String,
	pub viewport: Viewport,
	pub user_agent: String,
	/// Forward-progress guarantee against hung pages.
	pub timeout: Duration,
	/// Quiet period after the last settled request.
	pub debounce: Duration,
	/// Observer names to load; `None` loads everything available.
	pub observers: Option<Vec<String>>,
	pub cookies: Vec<CookieSpec>,
	/// Suppresses `echo` output, including the final report.
	pub silent: bool,
	/// Raw merged parameters, exposed to observers through the facade.
	pub params: Map<String, Value>,
}

impl SessionConfig {
	pub fn new(url: impl Into<String>) -> Self {
		Self {
			url: url.into(),
			viewport: Viewport::default(),
			user_agent: default_user_agent(),
			timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
			debounce: Duration::from_millis(DEFAULT_DEBOUNCE_MS),
			observers: None,
			cookies: Vec::new(),
			silent: false,
			params: Map::new(),
		}
	}

	pub fn with_timeout(mut self, timeout: Duration) -> Self {
		self.timeout = timeout;
		self
	}

	pub fn with_viewport(mut self, viewport: Viewport) -> Self {
		self.viewport = viewport;
		self
	}

	pub fn with_observers(mut self, observers: Vec<String>) -> Self {
		self.observers = Some(observers);
		self
	}

	pub fn with_cookie(mut self, cookie: CookieSpec) -> Self {
		self.cookies.push(cookie);
		self
	}

	pub fn validate(&self) -> Result<()> {
		if self.url.trim().is_empty() {
			return Err(Error::MissingUrl);
		}
		for cookie in &self.cookies {
			cookie.validate()?;
		}
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn viewport_parses_width_and_height() {
		let viewport = Viewport::parse("1920x1080").unwrap();
		assert_eq!(viewport.width, 1920);
		assert_eq!(viewport.height, 1080);
		assert_eq!(viewport.to_string(), "1920x1080");
	}

	#[test]
	fn viewport_rejects_malformed_input() {
		assert!(Viewport::parse("1920").is_err());
		assert!(Viewport::parse("ax b").is_err());
		assert!(Viewport::parse("0x100").is_err());
	}

	#[test]
	fn viewport_default_matches_reference() {
		assert_eq!(Viewport::default(), Viewport { width: 1280, height: 1024 });
	}

	#[test]
	fn missing_url_is_rejected_before_run() {
		let config = SessionConfig::new("  ");
		assert!(matches!(config.validate(), Err(Error::MissingUrl)));
	}

	#[test]
	fn cookie_without_value_is_rejected() {
		let config = SessionConfig::new("https://example.com/").with_cookie(CookieSpec::new("session", ""));
		assert!(matches!(config.validate(), Err(Error::Cookie(_))));
	}

	#[test]
	fn default_user_agent_carries_version() {
		assert!(default_user_agent().starts_with(&format!("loadwatch/{}", env!("CARGO_PKG_VERSION"))));
	}
}
