//! Observer contract, capability facade, and load-time registry.

mod asset_types;
mod console;
mod load_times;
mod request_monitor;
mod window_performance;

use serde_json::Value;
use tracing::{debug, info, warn};

use crate::config::SessionConfig;
use crate::engine::PageEngine;
use crate::error::{Error, Result};
use crate::events::{Event, EventBus};
use crate::session::SessionState;

/// A pluggable observer: a name, optional version, a skip flag, and an
/// initialization routine run once against the capability facade.
pub struct ObserverSpec {
	pub name: String,
	pub version: Option<String>,
	pub skip: bool,
	init: Box<dyn FnOnce(&mut ObserverCtx<'_>) -> Result<()>>,
}

impl ObserverSpec {
	pub fn new<F>(name: impl Into<String>, init: F) -> Self
	where
		F: FnOnce(&mut ObserverCtx<'_>) -> Result<()> + 'static,
	{
		Self { name: name.into(), version: None, skip: false, init: Box::new(init) }
	}

	pub fn with_version(mut self, version: impl Into<String>) -> Self {
		self.version = Some(version.into());
		self
	}

	pub fn with_skip(mut self, skip: bool) -> Self {
		self.skip = skip;
		self
	}
}

/// Observers shipped with the crate, excluding the built-in monitor.
pub fn available() -> Vec<ObserverSpec> {
	vec![
		asset_types::spec(),
		console::spec(),
		load_times::spec(),
		window_performance::spec(),
	]
}

/// Initializes the built-in request monitor first, then either the requested
/// name list or every available observer. No observer failure aborts the
/// remaining loads.
pub(crate) fn load(ctx: &mut ObserverCtx<'_>, requested: Option<&[String]>, extra: Vec<ObserverSpec>) {
	init_observer(ctx, request_monitor::spec());

	let mut pool: Vec<ObserverSpec> = available().into_iter().chain(extra).collect();
	match requested {
		Some(names) => {
			for name in names {
				match pool.iter().position(|spec| spec.name == *name) {
					Some(index) => init_observer(ctx, pool.remove(index)),
					None => warn!(target: "loadwatch.observers", observer = %name, "unable to load observer"),
				}
			}
		}
		None => {
			for spec in pool {
				init_observer(ctx, spec);
			}
		}
	}
}

fn init_observer(ctx: &mut ObserverCtx<'_>, spec: ObserverSpec) {
	let ObserverSpec { name, version, skip, init } = spec;
	if skip {
		info!(target: "loadwatch.observers", observer = %name, "observer skipped");
		return;
	}
	match init(ctx) {
		Ok(()) => debug!(
			target: "loadwatch.observers",
			observer = %name,
			version = version.as_deref().unwrap_or("-"),
			"observer initialized"
		),
		Err(err) => warn!(
			target: "loadwatch.observers",
			observer = %name,
			error = %err,
			"observer failed to initialize; skipping"
		),
	}
}

/// Capability facade observers program against: a fixed method set over the
/// session's bus, metric store, configuration, and page engine.
pub struct ObserverCtx<'a> {
	pub(crate) cfg: &'a SessionConfig,
	pub(crate) bus: &'a EventBus,
	pub(crate) state: &'a mut SessionState,
	pub(crate) engine: &'a mut dyn PageEngine,
}

impl ObserverCtx<'_> {
	/// The target URL of the session.
	pub fn url(&self) -> &str {
		&self.cfg.url
	}

	/// Raw configuration parameter, as merged from all sources.
	pub fn get_param(&self, key: &str) -> Option<&Value> {
		self.cfg.params.get(key)
	}

	/// Subscribes to every future emission of `event`.
	pub fn on<F>(&self, event: &str, handler: F)
	where
		F: FnMut(&mut ObserverCtx<'_>, &Event) -> Result<()> + 'static,
	{
		self.bus.subscribe(event, handler);
	}

	/// Subscribes to the next emission of `event` only.
	pub fn once<F>(&self, event: &str, handler: F)
	where
		F: FnMut(&mut ObserverCtx<'_>, &Event) -> Result<()> + 'static,
	{
		self.bus.subscribe_once(event, handler);
	}

	/// Emits an event; all handlers run before this returns.
	pub fn emit(&mut self, event: &str, payload: Value) {
		let bus = self.bus;
		bus.emit(self, event, payload);
	}

	pub fn set_metric(&mut self, name: &str, value: impl Into<Value>) {
		self.state.metrics.set(name, value);
	}

	pub fn incr_metric(&mut self, name: &str, by: i64) {
		self.state.metrics.incr(name, by);
	}

	pub fn get_metric(&self, name: &str) -> Option<&Value> {
		self.state.metrics.get(name)
	}

	/// Evaluates `script` in the page and stores its return value.
	pub fn set_metric_evaluate(&mut self, name: &str, script: &str) -> Result<()> {
		let value = self.engine.evaluate(script)?;
		self.state.metrics.set(name, value);
		Ok(())
	}

	/// Reads a value the helper scope recorded under `key` (default: `name`).
	pub fn set_metric_from_scope(&mut self, name: &str, key: Option<&str>) -> Result<()> {
		let key = key.unwrap_or(name);
		let lookup = serde_json::to_string(key).map_err(|err| Error::Evaluate(err.to_string()))?;
		let script = format!("window.__loadwatch && window.__loadwatch.get({lookup}) || 0");
		let value = self.engine.evaluate(&script)?;
		self.state.metrics.set(name, value);
		Ok(())
	}

	pub fn add_notice(&mut self, text: impl Into<String>) {
		self.state.metrics.add_notice(text);
	}

	/// Diagnostic log line, visible with `--verbose`.
	pub fn log(&self, message: &str) {
		tracing::debug!(target: "loadwatch", "{message}");
	}

	/// User-facing output line, suppressed in silent mode.
	pub fn echo(&self, message: &str) {
		if !self.cfg.silent {
			println!("{message}");
		}
	}

	/// Blocking evaluation in the page context.
	pub fn evaluate(&mut self, script: &str) -> Result<Value> {
		self.engine.evaluate(script)
	}

	/// Registers extra script to run in new documents.
	pub fn inject_js(&mut self, source: &str) -> Result<bool> {
		self.engine.inject_js(source)
	}

	/// Current serialized page content.
	pub fn page_content(&mut self) -> Result<String> {
		self.engine.page_content()
	}
}

#[cfg(test)]
mod tests {
	use std::cell::Cell;
	use std::rc::Rc;

	use super::*;
	use crate::engine::test_support::NullEngine;

	fn fixture() -> (SessionConfig, SessionState, NullEngine, EventBus) {
		let config = SessionConfig::new("https://example.com/");
		let state = SessionState::new(config.debounce);
		(config, state, NullEngine, EventBus::new())
	}

	#[test]
	fn monitor_always_loads_first_and_unconditionally() {
		let (config, mut state, mut engine, bus) = fixture();
		let mut ctx = ObserverCtx { cfg: &config, bus: &bus, state: &mut state, engine: &mut engine };
		// empty request list: nothing but the core monitor
		load(&mut ctx, Some(&[]), Vec::new());
		assert_eq!(bus.handler_count("onResourceRequested"), 1);
		assert_eq!(bus.handler_count("onResourceReceived"), 1);
		assert_eq!(bus.handler_count("consoleLog"), 0);
	}

	#[test]
	fn requested_names_load_in_order_and_unknown_is_skipped() {
		let (config, mut state, mut engine, bus) = fixture();
		let mut ctx = ObserverCtx { cfg: &config, bus: &bus, state: &mut state, engine: &mut engine };
		load(&mut ctx, Some(&["no_such_observer".to_string(), "console".to_string()]), Vec::new());
		assert_eq!(bus.handler_count("consoleLog"), 1);
	}

	#[test]
	fn skip_flag_prevents_initialization() {
		let (config, mut state, mut engine, bus) = fixture();
		let touched = Rc::new(Cell::new(false));
		let spec = {
			let touched = Rc::clone(&touched);
			ObserverSpec::new("skipped", move |_ctx| {
				touched.set(true);
				Ok(())
			})
			.with_skip(true)
		};
		let mut ctx = ObserverCtx { cfg: &config, bus: &bus, state: &mut state, engine: &mut engine };
		load(&mut ctx, Some(&["skipped".to_string()]), vec![spec]);
		assert!(!touched.get());
	}

	#[test]
	fn failing_observer_does_not_abort_the_rest() {
		let (config, mut state, mut engine, bus) = fixture();
		let survivor = Rc::new(Cell::new(false));
		let failing = ObserverSpec::new("failing", |_ctx| {
			Err(Error::ObserverLoad { name: "failing".into(), message: "nope".into() })
		});
		let following = {
			let survivor = Rc::clone(&survivor);
			ObserverSpec::new("following", move |_ctx| {
				survivor.set(true);
				Ok(())
			})
		};
		let mut ctx = ObserverCtx { cfg: &config, bus: &bus, state: &mut state, engine: &mut engine };
		load(
			&mut ctx,
			Some(&["failing".to_string(), "following".to_string()]),
			vec![failing, following],
		);
		assert!(survivor.get());
	}

	#[test]
	fn facade_reads_params_and_url() {
		let (mut config, mut state, mut engine, bus) = fixture();
		config.params.insert("timeout".into(), Value::from(30));
		let ctx = ObserverCtx { cfg: &config, bus: &bus, state: &mut state, engine: &mut engine };
		assert_eq!(ctx.url(), "https://example.com/");
		assert_eq!(ctx.get_param("timeout"), Some(&Value::from(30)));
		assert_eq!(ctx.get_param("missing"), None);
	}
}
