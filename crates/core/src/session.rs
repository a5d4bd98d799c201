//! Session orchestration: wiring, the completion race, reporting, teardown.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::Serialize;
use serde_json::{Value, json};
use tokio::time::{Instant, sleep_until};
use tracing::{debug, info, warn};

use crate::adapter::{self, Flow};
use crate::config::SessionConfig;
use crate::engine::{EngineEvent, EngineEvents, PageEngine, SCOPE_JS};
use crate::error::{Error, Result};
use crate::events::EventBus;
use crate::metrics::MetricsStore;
use crate::observers::{self, ObserverCtx, ObserverSpec};
use crate::scheduler::CompletionScheduler;

/// Final session output handed to the formatter.
#[derive(Debug, Clone, Serialize)]
pub struct Report {
	pub url: String,
	pub metrics: BTreeMap<String, Value>,
	pub notices: Vec<String>,
}

/// Runtime state mutated by the adapter and observers during a run.
pub(crate) struct SessionState {
	pub(crate) metrics: MetricsStore,
	pub(crate) scheduler: CompletionScheduler,
	pub(crate) started: Instant,
	pub(crate) load_finished: bool,
}

impl SessionState {
	pub(crate) fn new(debounce: Duration) -> Self {
		Self {
			metrics: MetricsStore::new(),
			scheduler: CompletionScheduler::new(debounce),
			started: Instant::now(),
			load_finished: false,
		}
	}
}

enum Tick {
	Engine(Option<EngineEvent>),
	Debounce,
	HardTimeout,
}

/// Owns one page-load profiling run from open to report.
///
/// Three completion signals race: the settle debounce, the hard timeout,
/// and an explicit load failure. The scheduler's `finalized` guard makes
/// whichever wins the only one that reports.
pub struct Session {
	cfg: SessionConfig,
	bus: EventBus,
	state: SessionState,
	engine: Box<dyn PageEngine>,
	events: EngineEvents,
	extra_observers: Vec<ObserverSpec>,
}

impl std::fmt::Debug for Session {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Session").field("cfg", &self.cfg).finish_non_exhaustive()
	}
}

impl Session {
	/// Validates configuration up front; a missing URL never starts a run.
	pub fn new(cfg: SessionConfig, engine: Box<dyn PageEngine>, events: EngineEvents) -> Result<Self> {
		cfg.validate()?;
		let state = SessionState::new(cfg.debounce);
		Ok(Self { cfg, bus: EventBus::new(), state, engine, events, extra_observers: Vec::new() })
	}

	/// Adds a third-party observer ahead of `run`.
	pub fn register_observer(&mut self, spec: ObserverSpec) {
		self.extra_observers.push(spec);
	}

	/// Runs the session to completion.
	///
	/// The page handle is released on every exit path before this returns;
	/// the caller owns what happens next (formatting, exit code).
	pub async fn run(mut self) -> Result<Report> {
		let outcome = self.drive().await;
		self.engine.close();
		if let Err(err) = &outcome {
			warn!(target: "loadwatch", error = %err, code = err.exit_code(), "session ended in failure");
		}
		outcome
	}

	async fn drive(&mut self) -> Result<Report> {
		info!(target: "loadwatch", url = %self.cfg.url, "opening page");
		debug!(
			target: "loadwatch",
			user_agent = %self.cfg.user_agent,
			viewport = %self.cfg.viewport,
			"session configured"
		);

		let extra = std::mem::take(&mut self.extra_observers);
		let requested = self.cfg.observers.clone();
		self.with_ctx(|ctx| observers::load(ctx, requested.as_deref(), extra));

		for cookie in &self.cfg.cookies {
			self.engine.add_cookie(cookie).map_err(|err| match err {
				Error::Cookie(_) => err,
				other => Error::Cookie(other.to_string()),
			})?;
		}
		self.engine.set_viewport(self.cfg.viewport)?;
		self.engine.set_user_agent(&self.cfg.user_agent)?;

		match self.engine.inject_js(SCOPE_JS) {
			Ok(true) => debug!(target: "loadwatch", "helper scope registered"),
			Ok(false) => return Err(Error::ScopeInjection("engine refused helper script".into())),
			Err(err) => return Err(Error::ScopeInjection(err.to_string())),
		}

		// in-flight accounting is driven by the bus so synthetic
		// send/recv entries emitted by observers count too
		self.bus.subscribe("send", |ctx, _event| {
			ctx.state.scheduler.request_started();
			Ok(())
		});
		self.bus.subscribe("recv", |ctx, _event| {
			ctx.state.scheduler.request_settled(Instant::now());
			Ok(())
		});

		let before_open = json!({ "url": self.cfg.url });
		self.emit("pageBeforeOpen", before_open);
		self.engine.open(&self.cfg.url)?;
		self.emit("pageOpen", Value::Null);

		self.state.scheduler.arm_hard_timeout(Instant::now(), self.cfg.timeout);
		debug!(target: "loadwatch", timeout_secs = self.cfg.timeout.as_secs(), "hard timeout armed");

		loop {
			let debounce_at = self.state.scheduler.debounce_deadline();
			let hard_at = self.state.scheduler.hard_deadline();
			let tick = tokio::select! {
				biased;
				event = self.events.recv() => Tick::Engine(event),
				_ = sleep_until(debounce_at.unwrap_or_else(far_deadline)), if debounce_at.is_some() => Tick::Debounce,
				_ = sleep_until(hard_at.unwrap_or_else(far_deadline)), if hard_at.is_some() => Tick::HardTimeout,
			};

			match tick {
				Tick::Engine(Some(event)) => {
					if let Flow::Fatal(err) = self.with_ctx(|ctx| adapter::dispatch(ctx, event)) {
						return Err(err);
					}
				}
				Tick::Engine(None) => {
					warn!(target: "loadwatch", "engine event stream closed; reporting early");
					if self.state.scheduler.try_finalize() {
						return self.finish();
					}
					return Err(Error::Engine("engine event stream closed".into()));
				}
				Tick::Debounce => {
					if self.state.scheduler.debounce_elapsed() && self.state.scheduler.try_finalize() {
						debug!(target: "loadwatch", "network settled");
						return self.finish();
					}
				}
				Tick::HardTimeout => {
					info!(
						target: "loadwatch",
						timeout_secs = self.cfg.timeout.as_secs(),
						"timeout reached"
					);
					if self.state.scheduler.try_finalize() {
						return self.finish();
					}
				}
			}
		}
	}

	/// The exactly-once report path. Callers must hold the finalize guard.
	fn finish(&mut self) -> Result<Report> {
		self.emit("report", Value::Null);

		let elapsed = self.state.started.elapsed();
		debug!(target: "loadwatch", elapsed_ms = elapsed.as_millis() as u64, "monitoring finished");

		let report = Report {
			url: self.cfg.url.clone(),
			metrics: self.state.metrics.metrics().clone(),
			notices: self.state.metrics.notices().to_vec(),
		};
		let results = serde_json::to_value(&report).unwrap_or(Value::Null);
		self.emit("results", results);

		info!(target: "loadwatch", metrics = report.metrics.len(), "metrics collected");
		Ok(report)
	}

	fn emit(&mut self, event: &str, payload: Value) {
		self.with_ctx(|ctx| ctx.emit(event, payload));
	}

	fn with_ctx<R>(&mut self, f: impl FnOnce(&mut ObserverCtx<'_>) -> R) -> R {
		let Self { cfg, bus, state, engine, .. } = self;
		let mut ctx = ObserverCtx { cfg, bus, state, engine: engine.as_mut() };
		f(&mut ctx)
	}
}

fn far_deadline() -> Instant {
	Instant::now() + Duration::from_secs(86_400)
}
