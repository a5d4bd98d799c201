//! Counts settled requests per content type.

use serde_json::Value;

use super::{ObserverCtx, ObserverSpec};
use crate::error::Result;

pub(crate) fn spec() -> ObserverSpec {
	ObserverSpec::new("asset_types", init)
}

fn init(ctx: &mut ObserverCtx<'_>) -> Result<()> {
	ctx.on("recv", |ctx, event| {
		let content_type = event.payload.get("contentType").and_then(Value::as_str).unwrap_or("");
		let bucket = classify(content_type);
		ctx.incr_metric(bucket, 1);
		Ok(())
	});
	Ok(())
}

fn classify(content_type: &str) -> &'static str {
	let content_type = content_type.split(';').next().unwrap_or("").trim();
	match content_type {
		t if t.ends_with("html") => "htmlCount",
		t if t.ends_with("css") => "cssCount",
		t if t.ends_with("javascript") || t.ends_with("ecmascript") => "jsCount",
		t if t.ends_with("json") => "jsonCount",
		t if t.starts_with("image/") => "imageCount",
		_ => "otherCount",
	}
}
