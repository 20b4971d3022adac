//! Renewal collaborator contract and single-flight coordination primitives.

mod metrics;

pub use metrics::RenewMetrics;

// crates.io
use tokio::sync::broadcast;
// self
use crate::{
	_prelude::*,
	error::RenewError,
	token::{Token, TokenKey},
};

/// Boxed future returned by [`TokenClient::renew`].
pub type ClientFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, RenewError>> + 'a + Send>>;

/// OAuth collaborator performing the provider round-trip for a renewal.
///
/// The surrounding SDK supplies the implementation; request construction, transport,
/// and response parsing all live behind this seam.
pub trait TokenClient
where
	Self: Send + Sync,
{
	/// Renews the token stored under `key`, resolving to the replacement token.
	fn renew<'a>(&'a self, key: &'a TokenKey) -> ClientFuture<'a, Token>;
}

/// Role assigned to a caller entering the single-flight map.
pub(crate) enum Flight<T> {
	/// First caller for the key; must drive the work and publish the outcome.
	Leader(broadcast::Receiver<T>),
	/// Overlapping caller sharing the in-flight outcome.
	Follower(broadcast::Receiver<T>),
}

/// Pending-outcome map guaranteeing at most one in-flight operation per key.
///
/// Overlapping callers observe the identical outcome through a broadcast channel.
/// [`finish`](Self::finish) clears the pending entry before publishing, so a caller
/// arriving after completion starts a fresh flight rather than joining a settled one.
pub(crate) struct SingleFlight<T> {
	pending: Mutex<HashMap<TokenKey, broadcast::Sender<T>>>,
}
impl<T> SingleFlight<T>
where
	T: Clone,
{
	/// Joins the flight for `key`, creating it when none is pending.
	pub fn begin(&self, key: &TokenKey) -> Flight<T> {
		let mut pending = self.pending.lock();

		if let Some(sender) = pending.get(key) {
			return Flight::Follower(sender.subscribe());
		}

		let (sender, receiver) = broadcast::channel(1);

		pending.insert(key.clone(), sender);

		Flight::Leader(receiver)
	}

	/// Clears the pending entry for `key`, then publishes the outcome to every waiter.
	pub fn finish(&self, key: &TokenKey, outcome: T) {
		let sender = self.pending.lock().remove(key);

		if let Some(sender) = sender {
			let _ = sender.send(outcome);
		}
	}

	/// Returns `true` while a flight for `key` is pending.
	pub fn in_flight(&self, key: &TokenKey) -> bool {
		self.pending.lock().contains_key(key)
	}
}
impl<T> Default for SingleFlight<T> {
	fn default() -> Self {
		Self { pending: Mutex::new(HashMap::new()) }
	}
}
impl<T> Debug for SingleFlight<T> {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("SingleFlight").field("pending", &self.pending.lock().len()).finish()
	}
}
