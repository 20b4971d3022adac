//! Sliding-window guard against runaway expired-driven renewals.

// self
use crate::_prelude::*;

/// Number of most recent attempts the window tracks.
const ATTEMPT_WINDOW: usize = 10;
/// Minimum span those attempts must cover before renewals are allowed through.
const STORM_SPAN_MS: i64 = 30_000;

/// Decision returned for each expired-driven renewal attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RenewGate {
	/// The renewal may proceed.
	Allow,
	/// The renewal is suppressed; an error event should be emitted instead.
	Throttle,
}

/// Sliding window over the timestamps of recent renewal attempts.
///
/// An attempt is throttled when the window holds its full complement of attempts and
/// their span is strictly under the policy threshold. Suppressed attempts stay in the
/// window, so a storm keeps tripping until the spacing genuinely relaxes.
#[derive(Clone, Debug, Default)]
pub struct RenewRateLimiter {
	attempts: VecDeque<i64>,
}
impl RenewRateLimiter {
	/// Creates an empty limiter.
	pub fn new() -> Self {
		Self::default()
	}

	/// Records an attempt at `now_ms` and gates it.
	pub fn note_attempt(&mut self, now_ms: i64) -> RenewGate {
		self.attempts.push_back(now_ms);

		while self.attempts.len() > ATTEMPT_WINDOW {
			self.attempts.pop_front();
		}
		if self.attempts.len() < ATTEMPT_WINDOW {
			return RenewGate::Allow;
		}

		let span = now_ms - self.attempts.front().copied().unwrap_or(now_ms);

		if span < STORM_SPAN_MS {
			RenewGate::Throttle
		} else {
			RenewGate::Allow
		}
	}
}
