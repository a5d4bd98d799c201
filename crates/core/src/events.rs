//! Synchronous publish/subscribe bus for session events.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;

use serde_json::Value;
use tracing::{trace, warn};

use crate::error::Result;
use crate::observers::ObserverCtx;

/// A named event with a JSON payload. Ephemeral; not retained after dispatch.
#[derive(Debug, Clone)]
pub struct Event {
	pub name: String,
	pub payload: Value,
}

type Handler = dyn FnMut(&mut ObserverCtx<'_>, &Event) -> Result<()>;

struct Registered {
	once: bool,
	spent: Cell<bool>,
	handler: RefCell<Box<Handler>>,
}

/// Dispatches events to handlers synchronously, in subscription order.
///
/// A handler that returns `Err` is logged and skipped; its siblings still
/// run. Nested `emit` calls from inside a handler drain depth-first before
/// the outer dispatch continues.
#[derive(Default)]
pub struct EventBus {
	handlers: RefCell<HashMap<String, Vec<Rc<Registered>>>>,
}

impl EventBus {
	pub fn new() -> Self {
		Self::default()
	}

	/// Registers `handler` for every future emission of `event`.
	pub fn subscribe<F>(&self, event: &str, handler: F)
	where
		F: FnMut(&mut ObserverCtx<'_>, &Event) -> Result<()> + 'static,
	{
		self.register(event, handler, false);
	}

	/// Registers `handler` for the next emission of `event` only.
	pub fn subscribe_once<F>(&self, event: &str, handler: F)
	where
		F: FnMut(&mut ObserverCtx<'_>, &Event) -> Result<()> + 'static,
	{
		self.register(event, handler, true);
	}

	fn register<F>(&self, event: &str, handler: F, once: bool)
	where
		F: FnMut(&mut ObserverCtx<'_>, &Event) -> Result<()> + 'static,
	{
		self.handlers.borrow_mut().entry(event.to_string()).or_default().push(Rc::new(Registered {
			once,
			spent: Cell::new(false),
			handler: RefCell::new(Box::new(handler)),
		}));
	}

	/// Number of live handlers registered for `event`.
	pub fn handler_count(&self, event: &str) -> usize {
		self.handlers.borrow().get(event).map_or(0, Vec::len)
	}

	/// Invokes every handler registered for `event` before returning.
	///
	/// Dispatch runs against a snapshot taken at emit time, so handlers may
	/// subscribe or emit without affecting the current round.
	pub fn emit(&self, ctx: &mut ObserverCtx<'_>, event: &str, payload: Value) {
		trace!(target: "loadwatch.events", event, "emit");
		let snapshot: Vec<Rc<Registered>> = self.handlers.borrow().get(event).cloned().unwrap_or_default();
		if snapshot.is_empty() {
			return;
		}

		let ev = Event { name: event.to_string(), payload };
		let mut prune = false;
		for registered in &snapshot {
			if registered.once {
				if registered.spent.replace(true) {
					continue;
				}
				prune = true;
			}
			match registered.handler.try_borrow_mut() {
				Ok(mut handler) => {
					if let Err(err) = handler(ctx, &ev) {
						warn!(target: "loadwatch.events", event, error = %err, "event handler failed");
					}
				}
				// the handler is already running further up the stack
				Err(_) => warn!(target: "loadwatch.events", event, "re-entrant handler invocation skipped"),
			}
		}

		if prune {
			if let Some(list) = self.handlers.borrow_mut().get_mut(event) {
				list.retain(|registered| !(registered.once && registered.spent.get()));
			}
		}
	}
}

#[cfg(test)]
mod tests {
	use std::cell::RefCell;
	use std::rc::Rc;

	use serde_json::Value;

	use super::*;
	use crate::config::SessionConfig;
	use crate::engine::test_support::NullEngine;
	use crate::error::Error;
	use crate::session::SessionState;

	fn fixture() -> (SessionConfig, SessionState, NullEngine) {
		let config = SessionConfig::new("https://example.com/");
		let state = SessionState::new(config.debounce);
		(config, state, NullEngine)
	}

	#[test]
	fn handlers_run_in_subscription_order() {
		let (config, mut state, mut engine) = fixture();
		let bus = EventBus::new();
		let order = Rc::new(RefCell::new(Vec::new()));

		for tag in ["first", "second", "third"] {
			let order = Rc::clone(&order);
			bus.subscribe("tick", move |_ctx, _event| {
				order.borrow_mut().push(tag);
				Ok(())
			});
		}

		let mut ctx = ObserverCtx { cfg: &config, bus: &bus, state: &mut state, engine: &mut engine };
		bus.emit(&mut ctx, "tick", Value::Null);
		assert_eq!(*order.borrow(), ["first", "second", "third"]);
	}

	#[test]
	fn failing_handler_does_not_abort_siblings() {
		let (config, mut state, mut engine) = fixture();
		let bus = EventBus::new();
		let seen = Rc::new(RefCell::new(Vec::new()));

		bus.subscribe("tick", |_ctx, _event| Err(Error::Evaluate("boom".into())));
		{
			let seen = Rc::clone(&seen);
			bus.subscribe("tick", move |_ctx, _event| {
				seen.borrow_mut().push("survivor");
				Ok(())
			});
		}

		let mut ctx = ObserverCtx { cfg: &config, bus: &bus, state: &mut state, engine: &mut engine };
		bus.emit(&mut ctx, "tick", Value::Null);
		assert_eq!(*seen.borrow(), ["survivor"]);
	}

	#[test]
	fn once_handler_fires_exactly_once() {
		let (config, mut state, mut engine) = fixture();
		let bus = EventBus::new();
		let count = Rc::new(Cell::new(0));
		{
			let count = Rc::clone(&count);
			bus.subscribe_once("tick", move |_ctx, _event| {
				count.set(count.get() + 1);
				Ok(())
			});
		}

		let mut ctx = ObserverCtx { cfg: &config, bus: &bus, state: &mut state, engine: &mut engine };
		bus.emit(&mut ctx, "tick", Value::Null);
		bus.emit(&mut ctx, "tick", Value::Null);
		assert_eq!(count.get(), 1);
		assert_eq!(bus.handler_count("tick"), 0);
	}

	#[test]
	fn nested_emit_drains_depth_first() {
		let (config, mut state, mut engine) = fixture();
		let bus = EventBus::new();
		let order = Rc::new(RefCell::new(Vec::new()));

		{
			let order = Rc::clone(&order);
			bus.subscribe("outer", move |ctx, _event| {
				order.borrow_mut().push("outer-1");
				ctx.emit("inner", Value::Null);
				Ok(())
			});
		}
		{
			let order = Rc::clone(&order);
			bus.subscribe("outer", move |_ctx, _event| {
				order.borrow_mut().push("outer-2");
				Ok(())
			});
		}
		{
			let order = Rc::clone(&order);
			bus.subscribe("inner", move |_ctx, _event| {
				order.borrow_mut().push("inner");
				Ok(())
			});
		}

		let mut ctx = ObserverCtx { cfg: &config, bus: &bus, state: &mut state, engine: &mut engine };
		bus.emit(&mut ctx, "outer", Value::Null);
		assert_eq!(*order.borrow(), ["outer-1", "inner", "outer-2"]);
	}

	#[test]
	fn handler_emitting_its_own_event_does_not_recurse() {
		let (config, mut state, mut engine) = fixture();
		let bus = EventBus::new();
		let count = Rc::new(Cell::new(0));
		{
			let count = Rc::clone(&count);
			bus.subscribe("loop", move |ctx, _event| {
				count.set(count.get() + 1);
				ctx.emit("loop", Value::Null);
				Ok(())
			});
		}

		let mut ctx = ObserverCtx { cfg: &config, bus: &bus, state: &mut state, engine: &mut engine };
		bus.emit(&mut ctx, "loop", Value::Null);
		assert_eq!(count.get(), 1);
	}

	#[test]
	fn handler_subscribed_during_dispatch_misses_current_round() {
		let (config, mut state, mut engine) = fixture();
		let bus = EventBus::new();
		let late = Rc::new(Cell::new(0));
		{
			let late = Rc::clone(&late);
			bus.subscribe("tick", move |ctx, _event| {
				let late = Rc::clone(&late);
				ctx.on("tick", move |_ctx, _event| {
					late.set(late.get() + 1);
					Ok(())
				});
				Ok(())
			});
		}

		let mut ctx = ObserverCtx { cfg: &config, bus: &bus, state: &mut state, engine: &mut engine };
		bus.emit(&mut ctx, "tick", Value::Null);
		assert_eq!(late.get(), 0);
		bus.emit(&mut ctx, "tick", Value::Null);
		assert_eq!(late.get(), 1);
	}
}
