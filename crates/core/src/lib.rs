//! loadwatch core: instruments a single page load and produces one report.
//!
//! A [`Session`] opens a page through a [`PageEngine`], multiplexes engine
//! callbacks to observers over a synchronous [`EventBus`], tracks in-flight
//! requests, and finalizes exactly once when the settle debounce or the
//! hard timeout wins the completion race.

mod adapter;
pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod metrics;
pub mod observers;
pub mod scheduler;
pub mod session;

pub use config::{CookieSpec, DEFAULT_DEBOUNCE_MS, DEFAULT_TIMEOUT_SECS, SessionConfig, Viewport, default_user_agent};
pub use engine::{
	EngineEvent, EngineEventSender, EngineEvents, LoadStatus, PageEngine, ResourceRequest, ResourceResponse,
	SCOPE_BINDING, SCOPE_JS, ScopeMessage, engine_channel,
};
pub use error::{Error, Result};
pub use events::{Event, EventBus};
pub use metrics::MetricsStore;
pub use observers::{ObserverCtx, ObserverSpec};
pub use scheduler::CompletionScheduler;
pub use session::{Report, Session};

/// Crate version reported in the default user agent.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
