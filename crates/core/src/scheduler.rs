//! Completion detection: in-flight tracking, settle debounce, hard timeout.

use std::time::Duration;

use tokio::time::Instant;

/// Decides when a session is done by racing a trailing-request debounce
/// against a hard timeout. Whichever deadline fires first wins; the
/// `finalized` guard absorbs the loser.
#[derive(Debug)]
pub struct CompletionScheduler {
	in_flight: i64,
	debounce_delay: Duration,
	debounce_at: Option<Instant>,
	hard_at: Option<Instant>,
	finalized: bool,
}

impl CompletionScheduler {
	pub fn new(debounce_delay: Duration) -> Self {
		Self {
			in_flight: 0,
			debounce_delay,
			debounce_at: None,
			hard_at: None,
			finalized: false,
		}
	}

	pub fn in_flight(&self) -> i64 {
		self.in_flight
	}

	pub fn is_finalized(&self) -> bool {
		self.finalized
	}

	pub fn debounce_deadline(&self) -> Option<Instant> {
		self.debounce_at
	}

	pub fn hard_deadline(&self) -> Option<Instant> {
		self.hard_at
	}

	/// A request went out.
	pub fn request_started(&mut self) {
		self.in_flight += 1;
	}

	/// A request settled; re-arms the debounce when nothing is in flight.
	///
	/// The counter is not clamped: a settle without a matching start (cached
	/// or synthetic responses) may push it negative, and the completion
	/// threshold stays `< 1`.
	pub fn request_settled(&mut self, now: Instant) {
		self.in_flight -= 1;
		self.arm_debounce(now);
	}

	/// Cancels any pending debounce and arms a fresh one if idle.
	pub fn arm_debounce(&mut self, now: Instant) {
		self.debounce_at = None;
		if self.finalized {
			return;
		}
		if self.in_flight < 1 {
			self.debounce_at = Some(now + self.debounce_delay);
		}
	}

	/// Arms the forward-progress timeout; called once when navigation begins.
	pub fn arm_hard_timeout(&mut self, now: Instant, timeout: Duration) {
		self.hard_at = Some(now + timeout);
	}

	/// Consumes a fired debounce timer and reports whether finalization may
	/// proceed. A request that started between arming and firing makes this
	/// a no-op; the next settle re-arms.
	pub fn debounce_elapsed(&mut self) -> bool {
		self.debounce_at = None;
		self.in_flight < 1
	}

	/// First caller wins and cancels both timers; everyone after gets `false`.
	pub fn try_finalize(&mut self) -> bool {
		if self.finalized {
			return false;
		}
		self.finalized = true;
		self.debounce_at = None;
		self.hard_at = None;
		true
	}
}
