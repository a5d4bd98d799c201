//! Counts console output and alert dialogs raised by the page.

use serde_json::Value;

use super::{ObserverCtx, ObserverSpec};
use crate::error::Result;

pub(crate) fn spec() -> ObserverSpec {
	ObserverSpec::new("console", init)
}

fn init(ctx: &mut ObserverCtx<'_>) -> Result<()> {
	ctx.on("consoleLog", |ctx, event| {
		ctx.incr_metric("consoleMessages", 1);
		if let Some(text) = event.payload.as_str() {
			ctx.log(&format!("console: {text}"));
		}
		Ok(())
	});

	ctx.on("alert", |ctx, event| {
		ctx.incr_metric("alerts", 1);
		let text = event.payload.as_str().unwrap_or_default().to_string();
		ctx.add_notice(format!("alert: {text}"));
		Ok(())
	});

	// unrecognized scope messages end up here for observers to inspect
	ctx.on("message", |ctx, event| {
		if let Some(kind) = event.payload.get("type").and_then(Value::as_str) {
			ctx.log(&format!("page message: {kind}"));
		}
		Ok(())
	});

	Ok(())
}
