//! Per-key expiration timers feeding the manager's lifecycle driver.

// crates.io
use tokio::{sync::mpsc, task::JoinHandle, time};
// self
use crate::{
	_prelude::*,
	clock::{Clock, ExpiryPolicy},
	store::TokenMap,
	token::{Token, TokenKey},
};

/// Longest single sleep a timer takes before re-checking the clock.
///
/// Chaining bounded slices keeps arbitrarily distant expiries schedulable and lets a
/// timer notice clock adjustments (suspend/resume, test clocks) within one slice.
const MAX_SLEEP_SLICE: StdDuration = StdDuration::from_secs(30);

/// Notice sent when a token reaches its effective expiry.
#[derive(Clone, Debug, PartialEq)]
pub struct ExpiryNotice {
	/// Expired token slot.
	pub key: TokenKey,
	/// Serialized token as it was armed.
	pub token: Json,
}

/// Maintains at most one deferred expiration timer per token key.
///
/// Every write path re-arms through [`arm`](Self::arm) (or
/// [`rearm_all`](Self::rearm_all) for whole-payload replacement), and every delete
/// cancels, so the timer map mirrors the stored mapping.
pub struct ExpirationScheduler {
	clock: Arc<dyn Clock>,
	policy: ExpiryPolicy,
	notices: mpsc::UnboundedSender<ExpiryNotice>,
	timers: Mutex<HashMap<TokenKey, JoinHandle<()>>>,
}
impl ExpirationScheduler {
	/// Creates a scheduler publishing notices on the provided channel.
	pub fn new(
		clock: Arc<dyn Clock>,
		policy: ExpiryPolicy,
		notices: mpsc::UnboundedSender<ExpiryNotice>,
	) -> Self {
		Self { clock, policy, notices, timers: Mutex::new(HashMap::new()) }
	}

	/// Arms (or re-arms) the expiration timer for `key`.
	pub fn arm(&self, key: &TokenKey, token: &Token) {
		self.arm_raw(key, token.to_json(), token.expires_at());
	}

	/// Arms from a raw stored value when it parses as a token; other values carry no
	/// usable expiry and are skipped.
	pub fn arm_value(&self, key: &TokenKey, value: &Json) {
		if let Ok(token) = Token::try_from(value) {
			self.arm_raw(key, value.clone(), token.expires_at());
		}
	}

	fn arm_raw(&self, key: &TokenKey, payload: Json, expires_at: i64) {
		let target = self.policy.effective_expiry_ms(expires_at);
		let clock = self.clock.clone();
		let notices = self.notices.clone();
		let notice = ExpiryNotice { key: key.clone(), token: payload };
		let handle = tokio::spawn(async move {
			loop {
				let remaining = target - clock.now_unix_ms();

				if remaining <= 0 {
					break;
				}

				time::sleep(StdDuration::from_millis(remaining as u64).min(MAX_SLEEP_SLICE)).await;
			}

			let _ = notices.send(notice);
		});

		if let Some(previous) = self.timers.lock().insert(key.clone(), handle) {
			previous.abort();
		}
	}

	/// Cancels the timer for `key`, if one is armed.
	pub fn cancel(&self, key: &TokenKey) {
		if let Some(handle) = self.timers.lock().remove(key) {
			handle.abort();
		}
	}

	/// Cancels every armed timer.
	pub fn cancel_all(&self) {
		for (_, handle) in self.timers.lock().drain() {
			handle.abort();
		}
	}

	/// Cancels everything and re-arms from a freshly loaded payload.
	pub fn rearm_all(&self, map: &TokenMap) {
		self.cancel_all();

		for (key, value) in map {
			self.arm_value(&TokenKey::new(key), value);
		}
	}

	/// Returns `true` while a timer for `key` has not yet fired.
	pub fn is_armed(&self, key: &TokenKey) -> bool {
		self.timers.lock().get(key).is_some_and(|handle| !handle.is_finished())
	}
}
impl Drop for ExpirationScheduler {
	fn drop(&mut self) {
		self.cancel_all();
	}
}
impl Debug for ExpirationScheduler {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("ExpirationScheduler")
			.field("policy", &self.policy)
			.field("armed", &self.timers.lock().len())
			.finish()
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;
	use crate::_preludet::*;

	fn scheduler_fixture(
		clock: Arc<dyn Clock>,
	) -> (ExpirationScheduler, mpsc::UnboundedReceiver<ExpiryNotice>) {
		let (tx, rx) = mpsc::unbounded_channel();

		(ExpirationScheduler::new(clock, ExpiryPolicy::default(), tx), rx)
	}

	#[tokio::test(start_paused = true)]
	async fn timers_fire_at_the_effective_expiry() {
		let clock = Arc::new(TokioClock::starting_at_secs(1_000));
		let (scheduler, mut notices) = scheduler_fixture(clock);
		let key = TokenKey::new("accessToken");
		let token = access_token_fixture(1_002);

		scheduler.arm(&key, &token);
		time::advance(StdDuration::from_secs(3)).await;

		let notice = notices.recv().await.expect("Timer should publish an expiry notice.");

		assert_eq!(notice.key, key);
		assert_eq!(notice.token, token.to_json());
	}

	#[tokio::test(start_paused = true)]
	async fn rearming_replaces_the_previous_timer() {
		let clock = Arc::new(TokioClock::starting_at_secs(1_000));
		let (scheduler, mut notices) = scheduler_fixture(clock);
		let key = TokenKey::new("accessToken");

		scheduler.arm(&key, &access_token_fixture(1_001));
		scheduler.arm(&key, &access_token_fixture(1_005));
		time::advance(StdDuration::from_secs(2)).await;

		assert!(notices.try_recv().is_err(), "The replaced timer must not fire.");

		time::advance(StdDuration::from_secs(4)).await;

		let notice = notices.recv().await.expect("The replacement timer should fire.");

		assert_eq!(notice.token, access_token_fixture(1_005).to_json());
	}

	#[tokio::test(start_paused = true)]
	async fn cancel_silences_the_timer() {
		let clock = Arc::new(TokioClock::starting_at_secs(1_000));
		let (scheduler, mut notices) = scheduler_fixture(clock);
		let key = TokenKey::new("accessToken");

		scheduler.arm(&key, &access_token_fixture(1_001));

		assert!(scheduler.is_armed(&key));

		scheduler.cancel(&key);
		time::advance(StdDuration::from_secs(5)).await;

		assert!(notices.try_recv().is_err());
		assert!(!scheduler.is_armed(&key));
	}

	#[tokio::test(start_paused = true)]
	async fn distant_expiries_chain_bounded_slices() {
		let clock = Arc::new(TokioClock::starting_at_secs(1_000));
		let (scheduler, mut notices) = scheduler_fixture(clock);
		let key = TokenKey::new("accessToken");

		scheduler.arm(&key, &access_token_fixture(1_000 + 120));
		time::advance(StdDuration::from_secs(119)).await;

		assert!(notices.try_recv().is_err());

		time::advance(StdDuration::from_secs(2)).await;

		assert!(notices.recv().await.is_some());
	}

	#[tokio::test(start_paused = true)]
	async fn rearm_all_skips_values_without_a_usable_expiry() {
		let clock = Arc::new(TokioClock::starting_at_secs(1_000));
		let (scheduler, mut notices) = scheduler_fixture(clock);
		let mut map = TokenMap::new();

		map.insert("idToken".into(), Json::String("T".into()));
		map.insert("accessToken".into(), access_token_fixture(1_001).to_json());
		scheduler.rearm_all(&map);

		assert!(!scheduler.is_armed(&TokenKey::new("idToken")));

		time::advance(StdDuration::from_secs(2)).await;

		let notice = notices.recv().await.expect("The parseable entry should still fire.");

		assert_eq!(notice.key, TokenKey::new("accessToken"));
	}
}
