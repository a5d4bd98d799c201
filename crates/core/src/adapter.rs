//! Translates engine callbacks into bus events and session mutations.

use serde_json::{Value, json};
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::engine::{EngineEvent, LoadStatus, ScopeMessage};
use crate::error::Error;
use crate::observers::ObserverCtx;

/// What the session loop should do after a callback is applied.
pub(crate) enum Flow {
	Continue,
	Fatal(Error),
}

pub(crate) fn dispatch(ctx: &mut ObserverCtx<'_>, event: EngineEvent) -> Flow {
	match event {
		EngineEvent::PageInitialized => {
			debug!(target: "loadwatch", "page context initialized");
			ctx.emit("init", Value::Null);
		}
		EngineEvent::LoadStarted => {
			debug!(target: "loadwatch", "page loading started");
			ctx.emit("loadStarted", Value::Null);
		}
		EngineEvent::LoadFinished(status) => return load_finished(ctx, status),
		EngineEvent::ResourceRequested(request) => {
			let payload = serde_json::to_value(&request).unwrap_or(Value::Null);
			ctx.emit("onResourceRequested", payload);
		}
		EngineEvent::ResourceReceived(response) => {
			let payload = serde_json::to_value(&response).unwrap_or(Value::Null);
			ctx.emit("onResourceReceived", payload);
		}
		EngineEvent::ConsoleMessage(text) => {
			ctx.emit("consoleLog", Value::from(text));
		}
		EngineEvent::Alert(text) => {
			debug!(target: "loadwatch", message = %text, "alert");
			ctx.emit("alert", Value::from(text));
		}
		EngineEvent::ScopeMessage(message) => scope_message(ctx, message),
	}
	Flow::Continue
}

/// Engines may repeat the load-finished callback; only the first one counts.
fn load_finished(ctx: &mut ObserverCtx<'_>, status: LoadStatus) -> Flow {
	if ctx.state.load_finished {
		return Flow::Continue;
	}
	ctx.state.load_finished = true;

	match status {
		LoadStatus::Success => {
			debug!(target: "loadwatch", "page load finished");
			ctx.emit("loadFinished", Value::from("success"));
			ctx.state.scheduler.arm_debounce(Instant::now());
			Flow::Continue
		}
		LoadStatus::Failed(reason) => {
			warn!(target: "loadwatch", %reason, "page load failed");
			ctx.emit("loadFailed", Value::from(reason.clone()));
			Flow::Fatal(Error::LoadFailed(reason))
		}
	}
}

fn scope_message(ctx: &mut ObserverCtx<'_>, message: ScopeMessage) {
	let ScopeMessage { kind, data } = message;
	match kind.as_str() {
		"log" => {
			let text = data.as_str().map(str::to_string).unwrap_or_else(|| data.to_string());
			ctx.log(&text);
		}
		"setMetric" => match data.get("name").and_then(Value::as_str).map(str::to_string) {
			Some(name) => {
				let value = data.get("value").cloned().unwrap_or(Value::Null);
				ctx.set_metric(&name, value);
			}
			None => warn!(target: "loadwatch", "setMetric scope message without a name"),
		},
		"incrMetric" => match data.get("name").and_then(Value::as_str).map(str::to_string) {
			Some(name) => {
				let by = data.get("incr").and_then(Value::as_i64).unwrap_or(1);
				ctx.incr_metric(&name, by);
			}
			None => warn!(target: "loadwatch", "incrMetric scope message without a name"),
		},
		other => {
			debug!(target: "loadwatch", kind = %other, "scope message passed through");
			ctx.emit("message", json!({ "type": other, "data": data }));
		}
	}
}
