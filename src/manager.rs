//! Token manager facade, configuration, and the lifecycle driver.

// crates.io
use tokio::{
	sync::{broadcast, mpsc},
	task::JoinHandle,
	time,
};
// self
use crate::{
	_prelude::*,
	clock::{Clock, ExpiryPolicy, SystemClock},
	error::StorageError,
	events::{EventBus, TokenEvent},
	host::{HostEnvironment, StorageChange},
	obs::{self, OpKind, OpOutcome, OpSpan},
	rate_limit::{RenewGate, RenewRateLimiter},
	renew::{Flight, RenewMetrics, SingleFlight, TokenClient},
	scheduler::{ExpirationScheduler, ExpiryNotice},
	storage::{self, StorageKind, StorageSelection},
	store::{TokenMap, TokenStore},
	sync,
	token::{Token, TokenKey, TokenKind},
};

/// Default name of the persisted token record.
pub const DEFAULT_STORAGE_KEY: &str = "okta-token-storage";
/// Default early-expiry window, and its ceiling outside local development.
pub const DEFAULT_EXPIRE_EARLY_SECONDS: u32 = 30;
/// Storage-event delay applied on hosts that fire storage events before the write is
/// visible to readers.
const LEGACY_STORAGE_EVENT_DELAY_MS: u64 = 1_000;

/// Construction options for [`TokenManager`]. All fields have defaults.
#[derive(Clone, Debug)]
pub struct TokenManagerOptions {
	storage: StorageSelection,
	storage_key: String,
	expire_early_seconds: u32,
	auto_renew: bool,
	auto_remove: bool,
	local_clock_offset_ms: i64,
	secure: Option<bool>,
	storage_event_delay_ms: Option<u64>,
	pkce: bool,
	clock: Arc<dyn Clock>,
}
impl TokenManagerOptions {
	/// Selects the storage variant; defaults to the first available of
	/// localStorage → sessionStorage → cookie.
	pub fn with_storage(mut self, storage: StorageSelection) -> Self {
		self.storage = storage;

		self
	}

	/// Selects the storage variant by its configuration name; unknown names fail.
	pub fn with_storage_name(self, name: &str) -> Result<Self> {
		let storage = StorageSelection::from_str(name)?;

		Ok(self.with_storage(storage))
	}

	/// Overrides the name of the persisted record.
	pub fn with_storage_key(mut self, storage_key: impl Into<String>) -> Self {
		self.storage_key = storage_key.into();

		self
	}

	/// Overrides the early-expiry window. Outside local development the effective
	/// value is clamped to [`DEFAULT_EXPIRE_EARLY_SECONDS`].
	pub fn with_expire_early_seconds(mut self, seconds: u32) -> Self {
		self.expire_early_seconds = seconds;

		self
	}

	/// Enables or disables scheduler-driven renewal (defaults to enabled).
	pub fn with_auto_renew(mut self, auto_renew: bool) -> Self {
		self.auto_renew = auto_renew;

		self
	}

	/// Enables or disables removal of expired tokens when auto-renew is off
	/// (defaults to enabled).
	pub fn with_auto_remove(mut self, auto_remove: bool) -> Self {
		self.auto_remove = auto_remove;

		self
	}

	/// Sets the signed local clock offset in milliseconds; positive when the local
	/// clock trails the server.
	pub fn with_local_clock_offset_ms(mut self, offset_ms: i64) -> Self {
		self.local_clock_offset_ms = offset_ms;

		self
	}

	/// Overrides the cookie `secure` attribute; defaults to the origin's transport.
	pub fn with_secure(mut self, secure: bool) -> Self {
		self.secure = Some(secure);

		self
	}

	/// Overrides the delay between a storage-change notification and its handling;
	/// defaults to zero, or one second on legacy hosts.
	pub fn with_storage_event_delay_ms(mut self, delay_ms: u64) -> Self {
		self.storage_event_delay_ms = Some(delay_ms);

		self
	}

	/// Enables or disables PKCE callback detection for `get` (defaults to enabled).
	pub fn with_pkce(mut self, pkce: bool) -> Self {
		self.pkce = pkce;

		self
	}

	/// Substitutes the clock used for every expiry decision.
	pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
		self.clock = clock;

		self
	}
}
impl Default for TokenManagerOptions {
	fn default() -> Self {
		Self {
			storage: StorageSelection::Auto,
			storage_key: DEFAULT_STORAGE_KEY.into(),
			expire_early_seconds: DEFAULT_EXPIRE_EARLY_SECONDS,
			auto_renew: true,
			auto_remove: true,
			local_clock_offset_ms: 0,
			secure: None,
			storage_event_delay_ms: None,
			pkce: true,
			clock: Arc::new(SystemClock),
		}
	}
}

/// Key-agnostic projection of the stored tokens, selected by credential variant.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TokensBundle {
	/// The stored ID token, if any.
	pub id_token: Option<Token>,
	/// The stored access token, if any.
	pub access_token: Option<Token>,
	/// The stored refresh token, if any.
	pub refresh_token: Option<Token>,
}
impl TokensBundle {
	fn entries(self) -> [(TokenKey, Option<Token>); 3] {
		[
			(TokenKey::new(TokenKey::ID_TOKEN), self.id_token),
			(TokenKey::new(TokenKey::ACCESS_TOKEN), self.access_token),
			(TokenKey::new(TokenKey::REFRESH_TOKEN), self.refresh_token),
		]
	}
}

/// Facade orchestrating storage, expiration, renewal, and cross-tab observation.
///
/// Must be constructed inside a tokio runtime: expiration timers and the lifecycle
/// driver are spawned tasks. Dropping the last handle aborts the driver (which drops
/// the storage-change subscription) and cancels every timer.
#[derive(Clone)]
pub struct TokenManager {
	inner: Arc<Inner>,
	supervisor: Arc<DriverGuard>,
}
impl TokenManager {
	/// Builds the manager, resolving the storage cascade and spawning the driver.
	pub fn new(
		host: Arc<dyn HostEnvironment>,
		client: Arc<dyn TokenClient>,
		bus: Arc<EventBus>,
		options: TokenManagerOptions,
	) -> Result<Self> {
		let secure = options.secure.unwrap_or_else(|| host.is_https());
		let backend = storage::select_backend(host.as_ref(), &options.storage, secure)?;
		let expire_early_seconds = if host.is_localhost() {
			options.expire_early_seconds
		} else {
			options.expire_early_seconds.min(DEFAULT_EXPIRE_EARLY_SECONDS)
		};
		let policy = ExpiryPolicy {
			expire_early_seconds,
			local_clock_offset_ms: options.local_clock_offset_ms,
		};
		let storage_event_delay = StdDuration::from_millis(
			options.storage_event_delay_ms.unwrap_or_else(|| {
				if host.legacy_storage_events() { LEGACY_STORAGE_EVENT_DELAY_MS } else { 0 }
			}),
		);
		let (notice_tx, notice_rx) = mpsc::unbounded_channel();
		let scheduler = ExpirationScheduler::new(options.clock.clone(), policy, notice_tx);
		let store = TokenStore::new(host.clone(), backend, options.storage_key, secure);
		let changes = host.subscribe_storage_changes();
		let inner = Arc::new(Inner {
			host,
			client,
			bus,
			clock: options.clock,
			store,
			scheduler,
			flights: SingleFlight::default(),
			limiter: Mutex::new(RenewRateLimiter::new()),
			renew_metrics: Arc::new(RenewMetrics::default()),
			policy,
			auto_renew: options.auto_renew,
			auto_remove: options.auto_remove,
			storage_event_delay,
			pkce: options.pkce,
		});

		if let Ok(map) = inner.store.load() {
			inner.scheduler.rearm_all(&map);
		}

		let driver = tokio::spawn(drive(inner.clone(), notice_rx, changes));

		Ok(Self { inner, supervisor: Arc::new(DriverGuard { driver }) })
	}

	/// Validates, stores, and announces a token under `key`.
	pub async fn add(&self, key: &TokenKey, token: Token) -> Result<()> {
		self.inner.add_token(key, &token)?;

		Ok(())
	}

	/// Returns the token stored under `key`, or `None` once it has passed its
	/// effective expiry.
	///
	/// Refuses while the host URL indicates an in-progress OAuth callback (a `code`
	/// query parameter with PKCE configured).
	pub async fn get(&self, key: &TokenKey) -> Result<Option<Token>> {
		if self.inner.callback_in_progress() {
			return Err(Error::CallbackInProgress);
		}

		let Some(value) = self.inner.store.get_one(key)? else { return Ok(None) };
		let token = Token::try_from(&value)?;

		if self.inner.policy.has_expired(self.inner.clock.as_ref(), &token) {
			return Ok(None);
		}

		Ok(Some(token))
	}

	/// Returns a key-agnostic projection of whatever is stored, selecting each slot
	/// by the credential variant.
	pub async fn get_tokens(&self) -> Result<TokensBundle> {
		let map = self.inner.store.load()?;
		let mut bundle = TokensBundle::default();

		for value in map.values() {
			let Ok(token) = Token::try_from(value) else { continue };
			let slot = match token.kind() {
				TokenKind::Id { .. } => &mut bundle.id_token,
				TokenKind::Access { .. } => &mut bundle.access_token,
				TokenKind::Refresh { .. } => &mut bundle.refresh_token,
			};

			if slot.is_none() {
				*slot = Some(token);
			}
		}

		Ok(bundle)
	}

	/// Replaces the stored mapping with the provided bundle in a single write.
	///
	/// Emits `added` for each new or changed canonical key (in bundle order) and
	/// `removed` for every dropped key; a key changing value emits `added` only.
	pub async fn set_tokens(&self, bundle: TokensBundle) -> Result<()> {
		self.inner.set_bundle(bundle)
	}

	/// Deletes the token stored under `key`, announcing the prior value.
	pub async fn remove(&self, key: &TokenKey) -> Result<()> {
		self.inner.remove_token(key)?;

		Ok(())
	}

	/// Deletes every stored token, announcing each prior value.
	pub async fn clear(&self) -> Result<()> {
		let old = self.inner.store.clear_all()?;

		self.inner.scheduler.cancel_all();

		for (key, value) in &old {
			self.inner
				.bus
				.emit(&TokenEvent::Removed { key: TokenKey::new(key), token: value.clone() });
		}

		Ok(())
	}

	/// Returns `true` once `token` has passed its effective expiry. Pure; agrees
	/// with [`get`](Self::get) by construction.
	pub fn has_expired(&self, token: &Token) -> bool {
		self.inner.policy.has_expired(self.inner.clock.as_ref(), token)
	}

	/// Renews the token stored under `key` through the renewal collaborator.
	///
	/// Overlapping calls for the same key share a single in-flight renewal and
	/// observe the identical outcome; a sequential call starts fresh.
	pub async fn renew(&self, key: &TokenKey) -> Result<Token> {
		Inner::renew(self.inner.clone(), key.clone()).await
	}

	/// Shared event bus the manager publishes on.
	pub fn bus(&self) -> &Arc<EventBus> {
		&self.inner.bus
	}

	/// Counters for renewal attempts and settlements.
	pub fn renew_metrics(&self) -> &Arc<RenewMetrics> {
		&self.inner.renew_metrics
	}

	/// Variant label of the currently active storage backend.
	pub fn backend_kind(&self) -> StorageKind {
		self.inner.store.backend_kind()
	}

	/// Tears the facade down: cancels every timer and stops observing storage
	/// changes. Equivalent to dropping the last handle.
	pub fn destroy(&self) {
		self.supervisor.driver.abort();
		self.inner.scheduler.cancel_all();
	}
}
impl Debug for TokenManager {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("TokenManager")
			.field("storage_key", &self.inner.store.storage_key())
			.field("backend", &self.inner.store.backend_kind())
			.field("auto_renew", &self.inner.auto_renew)
			.finish()
	}
}

struct DriverGuard {
	driver: JoinHandle<()>,
}
impl Drop for DriverGuard {
	fn drop(&mut self) {
		self.driver.abort();
	}
}

struct Inner {
	host: Arc<dyn HostEnvironment>,
	client: Arc<dyn TokenClient>,
	bus: Arc<EventBus>,
	clock: Arc<dyn Clock>,
	store: TokenStore,
	scheduler: ExpirationScheduler,
	flights: SingleFlight<Result<Token>>,
	limiter: Mutex<RenewRateLimiter>,
	renew_metrics: Arc<RenewMetrics>,
	policy: ExpiryPolicy,
	auto_renew: bool,
	auto_remove: bool,
	storage_event_delay: StdDuration,
	pkce: bool,
}
impl Inner {
	fn callback_in_progress(&self) -> bool {
		if !self.pkce {
			return false;
		}

		self.host
			.current_url()
			.is_some_and(|url| url.query_pairs().any(|(name, _)| name == "code"))
	}

	fn add_token(&self, key: &TokenKey, token: &Token) -> Result<()> {
		let value = token.to_json();
		let old = self.store.set_one(key, value.clone())?;

		self.scheduler.arm(key, token);

		if old.as_ref() != Some(&value) {
			self.bus.emit(&TokenEvent::Added { key: key.clone(), token: value });
		}

		Ok(())
	}

	fn remove_token(&self, key: &TokenKey) -> Result<Option<Json>, StorageError> {
		let old = self.store.delete_one(key)?;

		self.scheduler.cancel(key);

		if let Some(value) = &old {
			self.bus.emit(&TokenEvent::Removed { key: key.clone(), token: value.clone() });
		}

		Ok(old)
	}

	fn set_bundle(&self, bundle: TokensBundle) -> Result<()> {
		let old = self.store.load()?;
		let entries = bundle.entries();
		let mut new_map = TokenMap::new();

		for (key, token) in &entries {
			if let Some(token) = token {
				new_map.insert(key.as_str().to_owned(), token.to_json());
			}
		}

		self.store.save(&new_map)?;
		self.scheduler.rearm_all(&new_map);

		for (key, token) in &entries {
			let Some(token) = token else { continue };
			let value = token.to_json();

			if old.get(key.as_str()) != Some(&value) {
				self.bus.emit(&TokenEvent::Added { key: key.clone(), token: value });
			}
		}
		for (key, value) in &old {
			if !new_map.contains_key(key) {
				self.bus
					.emit(&TokenEvent::Removed { key: TokenKey::new(key), token: value.clone() });
			}
		}

		Ok(())
	}

	async fn renew(self: Arc<Self>, key: TokenKey) -> Result<Token> {
		let span = OpSpan::new(OpKind::Renew, "renew");

		obs::record_op_outcome(OpKind::Renew, OpOutcome::Attempt);
		self.renew_metrics.record_attempt();

		let result = span
			.instrument(async move {
				let mut receiver = match self.flights.begin(&key) {
					Flight::Leader(receiver) => {
						let driver = self.clone();
						let flight_key = key.clone();

						tokio::spawn(async move {
							let outcome = driver.perform_renewal(&flight_key).await;

							driver.flights.finish(&flight_key, outcome);
						});

						receiver
					},
					Flight::Follower(receiver) => receiver,
				};

				match receiver.recv().await {
					Ok(outcome) => outcome,
					Err(_) => Err(Error::Renew(
						crate::error::RenewError::sdk(
							"renew_interrupted",
							"The renewal was interrupted before completing",
						)
						.with_token_key(key),
					)),
				}
			})
			.await;

		match &result {
			Ok(_) => obs::record_op_outcome(OpKind::Renew, OpOutcome::Success),
			Err(_) => obs::record_op_outcome(OpKind::Renew, OpOutcome::Failure),
		}

		result
	}

	async fn perform_renewal(&self, key: &TokenKey) -> Result<Token> {
		let stored = self.store.get_one(key).inspect_err(|_| self.renew_metrics.record_failure())?;

		if stored.is_none() {
			self.renew_metrics.record_failure();

			return Err(Error::NoTokenForKey { token_key: key.clone() });
		}

		match self.client.renew(key).await {
			Ok(new_token) => {
				let new_value = new_token.to_json();
				let swapped = self
					.store
					.swap_if_present(key, new_value.clone())
					.inspect_err(|_| self.renew_metrics.record_failure())?;

				// A `clear` during the flight empties the store; the renewed token is
				// then discarded rather than resurrected.
				if let Some(old_value) = swapped {
					self.bus.emit(&TokenEvent::Renewed {
						key: key.clone(),
						new_token: new_value.clone(),
						old_token: old_value.clone(),
					});

					if old_value != new_value {
						self.bus
							.emit(&TokenEvent::Added { key: key.clone(), token: new_value });
						self.bus
							.emit(&TokenEvent::Removed { key: key.clone(), token: old_value });
					}

					self.scheduler.arm(key, &new_token);
				}

				self.renew_metrics.record_success();

				Ok(new_token)
			},
			Err(error) => {
				self.renew_metrics.record_failure();

				let error = Error::Renew(error.with_token_key(key.clone()));

				// A failed renewal abandons the token only once it is genuinely past
				// its effective expiry; fresher tokens stay usable.
				if let Ok(Some(value)) = self.store.get_one(key) {
					if let Ok(current) = Token::try_from(&value) {
						if self.policy.has_expired(self.clock.as_ref(), &current) {
							let _ = self.remove_token(key);
						}
					}
				}

				Err(error)
			},
		}
	}

	async fn handle_expiry(self: Arc<Self>, notice: ExpiryNotice) {
		match self.store.get_one(&notice.key) {
			Ok(Some(value)) if value == notice.token => (),
			// The token was removed or replaced after the timer fired.
			_ => return,
		}

		obs::record_op_outcome(OpKind::Expire, OpOutcome::Attempt);
		self.bus.emit(&TokenEvent::Expired { key: notice.key.clone(), token: notice.token.clone() });

		if self.auto_renew {
			let gate = self.limiter.lock().note_attempt(self.clock.now_unix_ms());

			if gate == RenewGate::Throttle {
				obs::record_op_outcome(OpKind::Expire, OpOutcome::Failure);
				self.bus.emit(&TokenEvent::Error { error: Error::TooManyRenewRequests });

				return;
			}

			let inner = self.clone();
			let key = notice.key;

			tokio::spawn(async move {
				// Scheduler-driven renewals have no caller stack; failures are
				// re-emitted on the error channel instead.
				if let Err(error) = Inner::renew(inner.clone(), key).await {
					inner.bus.emit(&TokenEvent::Error { error });
				}
			});
		} else if self.auto_remove {
			if let Err(error) = self.remove_token(&notice.key) {
				self.bus.emit(&TokenEvent::Error { error: error.into() });
			}
		}

		obs::record_op_outcome(OpKind::Expire, OpOutcome::Success);
	}

	async fn handle_storage_change(&self, change: StorageChange) {
		if !sync::is_relevant(&change, self.store.storage_key()) {
			return;
		}
		if change.new_value == change.old_value {
			return;
		}
		if !self.storage_event_delay.is_zero() {
			time::sleep(self.storage_event_delay).await;
		}

		let Some(diff) = sync::diff_change(&change) else { return };

		obs::record_op_outcome(OpKind::Sync, OpOutcome::Attempt);

		for (key, value) in &diff.added {
			self.bus.emit(&TokenEvent::Added { key: TokenKey::new(key), token: value.clone() });
		}
		for (key, value) in &diff.removed {
			self.bus.emit(&TokenEvent::Removed { key: TokenKey::new(key), token: value.clone() });
		}

		self.scheduler.rearm_all(&diff.new_map);
		obs::record_op_outcome(OpKind::Sync, OpOutcome::Success);
	}
}

async fn drive(
	inner: Arc<Inner>,
	mut notices: mpsc::UnboundedReceiver<ExpiryNotice>,
	mut changes: broadcast::Receiver<StorageChange>,
) {
	let mut changes_open = true;

	loop {
		tokio::select! {
			notice = notices.recv() => match notice {
				Some(notice) => inner.clone().handle_expiry(notice).await,
				None => break,
			},
			change = changes.recv(), if changes_open => match change {
				Ok(change) => inner.handle_storage_change(change).await,
				Err(broadcast::error::RecvError::Lagged(_)) => (),
				Err(broadcast::error::RecvError::Closed) => changes_open = false,
			},
		}
	}
}
