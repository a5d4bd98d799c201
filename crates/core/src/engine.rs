//! Browser engine seam: trait, event stream, and the injected page helper.

use serde::Serialize;
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::trace;

use crate::config::{CookieSpec, Viewport};
use crate::error::Result;

/// Helper script installed into every new document before navigation.
pub const SCOPE_JS: &str = include_str!("scope.js");

/// Name of the binding the helper scope uses to message the host.
pub const SCOPE_BINDING: &str = "__loadwatch_emit";

/// Synchronous surface of the browser collaborator.
///
/// `evaluate` blocks the session thread until the page context returns; it
/// is not cancellable and carries no timeout of its own.
pub trait PageEngine {
	fn set_viewport(&mut self, viewport: Viewport) -> Result<()>;
	fn set_user_agent(&mut self, user_agent: &str) -> Result<()>;
	fn add_cookie(&mut self, cookie: &CookieSpec) -> Result<()>;
	/// Registers `source` to run in every new document. `Ok(false)` means
	/// the engine refused the script.
	fn inject_js(&mut self, source: &str) -> Result<bool>;
	/// Starts navigation; the outcome arrives later as `LoadFinished`.
	fn open(&mut self, url: &str) -> Result<()>;
	fn evaluate(&mut self, script: &str) -> Result<Value>;
	fn page_content(&mut self) -> Result<String>;
	/// Releases the page handle. Called on every session exit path.
	fn close(&mut self);
}

/// Outcome the engine reports for the page load.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadStatus {
	Success,
	Failed(String),
}

/// An outgoing network request observed by the engine.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceRequest {
	pub id: String,
	pub url: String,
	pub method: String,
}

/// A settled network request (response or failure).
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceResponse {
	pub id: String,
	pub url: String,
	pub status: i64,
	pub content_type: Option<String>,
	pub body_size: u64,
}

/// Message pushed from the injected helper scope.
#[derive(Debug, Clone)]
pub struct ScopeMessage {
	pub kind: String,
	pub data: Value,
}

/// Raw engine callback, delivered through the session's event channel.
#[derive(Debug, Clone)]
pub enum EngineEvent {
	PageInitialized,
	LoadStarted,
	LoadFinished(LoadStatus),
	ResourceRequested(ResourceRequest),
	ResourceReceived(ResourceResponse),
	ConsoleMessage(String),
	Alert(String),
	ScopeMessage(ScopeMessage),
}

/// Receiving half of the engine-to-session channel, owned by the session.
pub type EngineEvents = mpsc::UnboundedReceiver<EngineEvent>;

/// Clonable sender handed to engine implementations.
#[derive(Debug, Clone)]
pub struct EngineEventSender {
	tx: mpsc::UnboundedSender<EngineEvent>,
}

impl EngineEventSender {
	/// Delivery is best-effort: events racing session teardown are dropped.
	pub fn send(&self, event: EngineEvent) {
		if self.tx.send(event).is_err() {
			trace!(target: "loadwatch.engine", "engine event dropped after session end");
		}
	}
}

/// Creates the single-consumer channel carrying engine callbacks.
pub fn engine_channel() -> (EngineEventSender, EngineEvents) {
	let (tx, rx) = mpsc::unbounded_channel();
	(EngineEventSender { tx }, rx)
}
