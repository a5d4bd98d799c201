//! Page-context metrics gathered at report time.

use super::{ObserverCtx, ObserverSpec};
use crate::error::Result;

pub(crate) fn spec() -> ObserverSpec {
	ObserverSpec::new("window_performance", init)
}

fn init(ctx: &mut ObserverCtx<'_>) -> Result<()> {
	ctx.on("report", |ctx, _event| {
		ctx.set_metric_from_scope("domReadyTime", None)?;
		ctx.set_metric_evaluate("domElements", "document.getElementsByTagName('*').length")?;
		let content = ctx.page_content()?;
		ctx.set_metric("contentLength", content.len() as i64);
		Ok(())
	});
	Ok(())
}
