//! Wall-clock load timings: first byte and the load event.

use std::cell::Cell;
use std::rc::Rc;

use tokio::time::Instant;

use super::{ObserverCtx, ObserverSpec};
use crate::error::Result;

pub(crate) fn spec() -> ObserverSpec {
	ObserverSpec::new("load_times", init)
}

fn init(ctx: &mut ObserverCtx<'_>) -> Result<()> {
	let origin = Instant::now();
	let started: Rc<Cell<Option<Instant>>> = Rc::new(Cell::new(None));

	{
		let started = Rc::clone(&started);
		ctx.on("loadStarted", move |_ctx, _event| {
			if started.get().is_none() {
				started.set(Some(Instant::now()));
			}
			Ok(())
		});
	}

	ctx.once("recv", move |ctx, _event| {
		ctx.set_metric("timeToFirstByte", origin.elapsed().as_millis() as i64);
		Ok(())
	});

	{
		let started = Rc::clone(&started);
		ctx.on("loadFinished", move |ctx, _event| {
			let base = started.get().unwrap_or(origin);
			ctx.set_metric("loadTime", base.elapsed().as_millis() as i64);
			Ok(())
		});
	}

	Ok(())
}
