//! Built-in monitor: turns resource callbacks into `send`/`recv` entries
//! and keeps the request-level counters.

use serde_json::Value;

use super::{ObserverCtx, ObserverSpec};
use crate::error::Result;

pub(crate) fn spec() -> ObserverSpec {
	ObserverSpec::new("request_monitor", init).with_version(env!("CARGO_PKG_VERSION"))
}

fn init(ctx: &mut ObserverCtx<'_>) -> Result<()> {
	ctx.on("onResourceRequested", |ctx, event| {
		ctx.incr_metric("requests", 1);
		let entry = event.payload.clone();
		ctx.emit("send", entry);
		Ok(())
	});

	ctx.on("onResourceReceived", |ctx, event| {
		let payload = &event.payload;
		if let Some(status) = payload.get("status").and_then(Value::as_i64) {
			if (300..400).contains(&status) {
				ctx.incr_metric("redirects", 1);
			}
			if status == 404 {
				ctx.incr_metric("notFound", 1);
			}
		}
		if payload.get("url").and_then(Value::as_str).is_some_and(|url| url.starts_with("https://")) {
			ctx.incr_metric("httpsRequests", 1);
		}
		if let Some(size) = payload.get("bodySize").and_then(Value::as_i64) {
			ctx.incr_metric("bodySize", size);
		}
		let entry = event.payload.clone();
		ctx.emit("recv", entry);
		Ok(())
	});

	Ok(())
}
