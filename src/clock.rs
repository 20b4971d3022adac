//! Clock abstractions and the expiry arithmetic shared by every component.

// std
use std::sync::atomic::{AtomicI64, Ordering};
// self
use crate::{_prelude::*, token::Token};

/// Tells the current wall-clock time.
///
/// All expiry decisions in the crate read the clock through this trait so tests and
/// skew simulations can substitute their own time source.
pub trait Clock
where
	Self: Debug + Send + Sync,
{
	/// Current instant in whole milliseconds since the Unix epoch.
	fn now_unix_ms(&self) -> i64;
}

/// System wall clock.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SystemClock;
impl Clock for SystemClock {
	fn now_unix_ms(&self) -> i64 {
		(OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000) as i64
	}
}

/// Settable clock for tests and clock-skew simulations.
#[derive(Clone, Debug, Default)]
pub struct TestClock(Arc<AtomicI64>);
impl TestClock {
	/// Creates a clock frozen at the provided Unix-seconds instant.
	pub fn at_unix_secs(secs: i64) -> Self {
		Self(Arc::new(AtomicI64::new(secs * 1_000)))
	}

	/// Moves the clock to the provided Unix-milliseconds instant.
	pub fn set_unix_ms(&self, ms: i64) {
		self.0.store(ms, Ordering::Release);
	}

	/// Advances the clock by the provided number of milliseconds.
	pub fn advance_ms(&self, delta: i64) {
		self.0.fetch_add(delta, Ordering::AcqRel);
	}
}
impl Clock for TestClock {
	fn now_unix_ms(&self) -> i64 {
		self.0.load(Ordering::Acquire)
	}
}

/// Expiry policy combining the early-expiry window and the local clock offset.
///
/// The effective expiry of a token is
/// `expiresAt − expireEarlySeconds − localClockOffset / 1000`, evaluated in integer
/// milliseconds. Timers fire at this instant and [`has_expired`](Self::has_expired)
/// uses the same arithmetic, so the two can never disagree.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ExpiryPolicy {
	/// Seconds by which expiry is pulled earlier than the server instant.
	pub expire_early_seconds: u32,
	/// Signed offset in milliseconds; positive when the local clock trails the server.
	pub local_clock_offset_ms: i64,
}
impl ExpiryPolicy {
	/// Effective expiry instant for a server-side `expiresAt`, in Unix milliseconds.
	pub fn effective_expiry_ms(&self, expires_at_secs: i64) -> i64 {
		expires_at_secs * 1_000 - i64::from(self.expire_early_seconds) * 1_000 - self.local_clock_offset_ms
	}

	/// Returns `true` once the clock has reached the token's effective expiry.
	pub fn has_expired(&self, clock: &dyn Clock, token: &Token) -> bool {
		clock.now_unix_ms() >= self.effective_expiry_ms(token.expires_at())
	}

	/// Remaining time until the effective expiry, saturating at zero.
	pub fn delay_until_expiry(&self, clock: &dyn Clock, expires_at_secs: i64) -> StdDuration {
		let remaining = self.effective_expiry_ms(expires_at_secs) - clock.now_unix_ms();

		StdDuration::from_millis(remaining.max(0) as u64)
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;
	use crate::token::ScopeSet;

	fn access_token(expires_at: i64) -> Token {
		Token::builder()
			.access_token("access")
			.scopes(ScopeSet::new(["openid"]).expect("Scope fixture should be valid."))
			.expires_at(expires_at)
			.build()
			.expect("Access token fixture should build successfully.")
	}

	#[test]
	fn effective_expiry_subtracts_window_and_offset() {
		let policy = ExpiryPolicy { expire_early_seconds: 30, local_clock_offset_ms: 2_500 };

		assert_eq!(policy.effective_expiry_ms(1_000), 1_000_000 - 30_000 - 2_500);
	}

	#[test]
	fn expiry_boundary_is_inclusive() {
		let policy = ExpiryPolicy::default();
		let clock = TestClock::at_unix_secs(1_000);
		let token = access_token(1_000);

		assert!(policy.has_expired(&clock, &token));

		clock.set_unix_ms(999_999);

		assert!(!policy.has_expired(&clock, &token));
	}

	#[test]
	fn delay_saturates_at_zero_for_past_instants() {
		let policy = ExpiryPolicy::default();
		let clock = TestClock::at_unix_secs(2_000);

		assert_eq!(policy.delay_until_expiry(&clock, 1_000), StdDuration::ZERO);
		assert_eq!(policy.delay_until_expiry(&clock, 2_001), StdDuration::from_secs(1));
	}

	#[test]
	fn negative_offset_pushes_expiry_later() {
		let policy = ExpiryPolicy { expire_early_seconds: 0, local_clock_offset_ms: -5_000 };
		let clock = TestClock::at_unix_secs(1_003);
		let token = access_token(1_000);

		assert!(!policy.has_expired(&clock, &token));

		clock.advance_ms(2_000);

		assert!(policy.has_expired(&clock, &token));
	}
}
