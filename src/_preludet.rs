//! Convenience fixtures and fakes for unit and integration tests; enabled via
//! `cfg(test)` or the `test` crate feature.

pub use crate::_prelude::*;

// std
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
// crates.io
use tokio::sync::{Notify, broadcast};
use url::Url;
// self
pub use crate::{
	clock::{Clock, ExpiryPolicy, SystemClock, TestClock},
	error::{RenewError, SdkFailure, StorageError},
	events::{EventBus, EventKind, HandlerId, TokenEvent},
	host::{
		CookieAttributes, CookieJar, HostEnvironment, MediumError, SameSite, StorageChange,
		StorageMedium,
	},
	manager::{TokenManager, TokenManagerOptions, TokensBundle},
	renew::{ClientFuture, TokenClient},
	storage::MemoryMedium,
	token::{ScopeSet, Token, TokenKey, TokenKind},
};

/// Expiry far enough out that nothing in a test reaches it.
pub fn far_future_expiry() -> i64 {
	4_102_444_800
}

/// Builds an access token expiring at the provided Unix-seconds instant.
pub fn access_token_fixture(expires_at: i64) -> Token {
	Token::builder()
		.access_token("access-fixture")
		.scopes(ScopeSet::new(["openid"]).expect("Fixture scopes should be valid."))
		.expires_at(expires_at)
		.build()
		.expect("Access token fixture should build successfully.")
}

/// Builds an ID token with the provided credential value.
pub fn id_token_fixture(value: &str, expires_at: i64) -> Token {
	Token::builder()
		.id_token(value)
		.claims(JsonMap::new())
		.scopes(ScopeSet::new(["openid"]).expect("Fixture scopes should be valid."))
		.expires_at(expires_at)
		.build()
		.expect("ID token fixture should build successfully.")
}

/// Yields repeatedly so spawned driver and renewal tasks drain their queues.
///
/// Pure yields never advance a paused tokio clock, so timestamps observed by the
/// code under test stay exactly where the test put them.
pub async fn settle() {
	for _ in 0..12 {
		tokio::task::yield_now().await;
	}
}

/// Clock that follows the tokio time driver, keeping paused-time tests aligned with
/// `tokio::time::advance`.
#[derive(Clone, Debug)]
pub struct TokioClock {
	base_ms: i64,
	origin: tokio::time::Instant,
}
impl TokioClock {
	/// Creates a clock reading the provided Unix-seconds instant "now".
	pub fn starting_at_secs(secs: i64) -> Self {
		Self { base_ms: secs * 1_000, origin: tokio::time::Instant::now() }
	}
}
impl Clock for TokioClock {
	fn now_unix_ms(&self) -> i64 {
		self.base_ms + self.origin.elapsed().as_millis() as i64
	}
}

/// Storage medium whose writes can be made to fail on demand.
#[derive(Debug, Default)]
pub struct FailableMedium {
	inner: MemoryMedium,
	failing: AtomicBool,
}
impl FailableMedium {
	/// Starts or stops failing writes.
	pub fn fail_writes(&self, fail: bool) {
		self.failing.store(fail, Ordering::Release);
	}
}
impl StorageMedium for FailableMedium {
	fn get_item(&self, key: &str) -> Option<String> {
		self.inner.get_item(key)
	}

	fn set_item(&self, key: &str, value: &str) -> Result<(), MediumError> {
		if self.failing.load(Ordering::Acquire) {
			return Err(MediumError::new("Simulated quota exceeded"));
		}

		self.inner.set_item(key, value)
	}

	fn remove_item(&self, key: &str) {
		self.inner.remove_item(key);
	}
}

/// Cookie jar recording values and the attributes of the last write per record.
#[derive(Debug, Default)]
pub struct FakeCookieJar {
	records: Mutex<BTreeMap<String, (String, CookieAttributes)>>,
	failing: AtomicBool,
}
impl FakeCookieJar {
	/// Starts or stops failing writes.
	pub fn fail_writes(&self, fail: bool) {
		self.failing.store(fail, Ordering::Release);
	}

	/// Attributes applied by the most recent write to `name`.
	pub fn last_attributes(&self, name: &str) -> Option<CookieAttributes> {
		self.records.lock().get(name).map(|(_, attributes)| attributes.clone())
	}
}
impl CookieJar for FakeCookieJar {
	fn get(&self, name: &str) -> Option<String> {
		self.records.lock().get(name).map(|(value, _)| value.clone())
	}

	fn set(&self, name: &str, value: &str, attributes: &CookieAttributes) -> Result<(), MediumError> {
		if self.failing.load(Ordering::Acquire) {
			return Err(MediumError::new("Simulated cookie rejection"));
		}

		self.records.lock().insert(name.into(), (value.into(), attributes.clone()));

		Ok(())
	}

	fn delete(&self, name: &str) {
		self.records.lock().remove(name);
	}

	fn entries(&self) -> Vec<(String, String)> {
		self.records.lock().iter().map(|(name, (value, _))| (name.clone(), value.clone())).collect()
	}
}

/// Host environment fake with controllable media, URL, and storage-change stream.
pub struct FakeHost {
	local: Option<Arc<FailableMedium>>,
	session: Option<Arc<FailableMedium>>,
	jar: Option<Arc<FakeCookieJar>>,
	url: Mutex<Option<Url>>,
	warnings: Mutex<Vec<String>>,
	changes: broadcast::Sender<StorageChange>,
	legacy: bool,
}
impl FakeHost {
	/// Creates a host with every medium available on a secure non-localhost origin.
	pub fn new() -> Self {
		let (changes, _) = broadcast::channel(16);

		Self {
			local: Some(Arc::new(FailableMedium::default())),
			session: Some(Arc::new(FailableMedium::default())),
			jar: Some(Arc::new(FakeCookieJar::default())),
			url: Mutex::new(Some(
				Url::parse("https://app.example.com/").expect("Fixture URL should parse."),
			)),
			warnings: Mutex::new(Vec::new()),
			changes,
			legacy: false,
		}
	}

	/// Removes the persistent keyed storage medium.
	pub fn without_local_storage(mut self) -> Self {
		self.local = None;

		self
	}

	/// Removes the session-scoped keyed storage medium.
	pub fn without_session_storage(mut self) -> Self {
		self.session = None;

		self
	}

	/// Removes the cookie facility.
	pub fn without_cookie_jar(mut self) -> Self {
		self.jar = None;

		self
	}

	/// Replaces the current page URL.
	pub fn with_url(self, url: &str) -> Self {
		*self.url.lock() = Some(Url::parse(url).expect("Test URL should parse."));

		self
	}

	/// Marks the host as firing storage events before writes become visible.
	pub fn with_legacy_storage_events(mut self, legacy: bool) -> Self {
		self.legacy = legacy;

		self
	}

	/// The persistent medium; panics when removed.
	pub fn local_medium(&self) -> Arc<FailableMedium> {
		self.local.clone().expect("Local storage medium was removed from the fake host.")
	}

	/// The session medium; panics when removed.
	pub fn session_medium(&self) -> Arc<FailableMedium> {
		self.session.clone().expect("Session storage medium was removed from the fake host.")
	}

	/// The cookie jar; panics when removed.
	pub fn jar(&self) -> Arc<FakeCookieJar> {
		self.jar.clone().expect("Cookie jar was removed from the fake host.")
	}

	/// Warnings emitted through the warn channel, in order.
	pub fn warnings(&self) -> Vec<String> {
		self.warnings.lock().clone()
	}

	/// Injects a storage-change notification as another tab would.
	pub fn push_storage_change(&self, change: StorageChange) {
		let _ = self.changes.send(change);
	}
}
impl Default for FakeHost {
	fn default() -> Self {
		Self::new()
	}
}
impl HostEnvironment for FakeHost {
	fn local_storage(&self) -> Option<Arc<dyn StorageMedium>> {
		self.local.clone().map(|medium| medium as Arc<dyn StorageMedium>)
	}

	fn session_storage(&self) -> Option<Arc<dyn StorageMedium>> {
		self.session.clone().map(|medium| medium as Arc<dyn StorageMedium>)
	}

	fn cookie_jar(&self) -> Option<Arc<dyn CookieJar>> {
		self.jar.clone().map(|jar| jar as Arc<dyn CookieJar>)
	}

	fn current_url(&self) -> Option<Url> {
		self.url.lock().clone()
	}

	fn legacy_storage_events(&self) -> bool {
		self.legacy
	}

	fn warn(&self, message: &str) {
		self.warnings.lock().push(message.into());
	}

	fn subscribe_storage_changes(&self) -> broadcast::Receiver<StorageChange> {
		self.changes.subscribe()
	}
}

/// Token client fake resolving from a scripted queue, with an optional hold gate.
#[derive(Default)]
pub struct ScriptedTokenClient {
	results: Mutex<VecDeque<Result<Token, RenewError>>>,
	fallback: Mutex<Option<Token>>,
	calls: AtomicUsize,
	gate: Mutex<Option<Arc<Notify>>>,
}
impl ScriptedTokenClient {
	/// Queues a successful renewal result.
	pub fn script_ok(&self, token: Token) {
		self.results.lock().push_back(Ok(token));
	}

	/// Queues a failed renewal result.
	pub fn script_err(&self, error: RenewError) {
		self.results.lock().push_back(Err(error));
	}

	/// Token returned whenever the scripted queue is empty.
	pub fn set_fallback(&self, token: Token) {
		*self.fallback.lock() = Some(token);
	}

	/// Makes subsequent renewals wait until [`release`](Self::release) is called.
	pub fn hold(&self) {
		*self.gate.lock() = Some(Arc::new(Notify::new()));
	}

	/// Releases one held renewal.
	pub fn release(&self) {
		if let Some(gate) = self.gate.lock().as_ref() {
			gate.notify_one();
		}
	}

	/// Number of renewal round-trips started.
	pub fn calls(&self) -> usize {
		self.calls.load(Ordering::Acquire)
	}
}
impl TokenClient for ScriptedTokenClient {
	fn renew<'a>(&'a self, key: &'a TokenKey) -> ClientFuture<'a, Token> {
		Box::pin(async move {
			self.calls.fetch_add(1, Ordering::AcqRel);

			let gate = self.gate.lock().clone();

			match gate {
				Some(gate) => gate.notified().await,
				// Always suspend once so overlapping callers can observe the flight.
				None => tokio::task::yield_now().await,
			}

			let scripted = self.results.lock().pop_front();

			match scripted {
				Some(result) => result,
				None => match self.fallback.lock().clone() {
					Some(token) => Ok(token),
					None => Err(RenewError::sdk(
						"unscripted_renewal",
						format!("No scripted renewal result for key `{key}`"),
					)),
				},
			}
		})
	}
}

/// Records every event published on a bus, in emission order.
#[derive(Clone, Default)]
pub struct EventRecorder {
	events: Arc<Mutex<Vec<TokenEvent>>>,
}
impl EventRecorder {
	/// Subscribes to every channel of `bus`.
	pub fn subscribe_all(bus: &EventBus) -> Self {
		let recorder = Self::default();

		for kind in EventKind::all() {
			let sink = recorder.events.clone();

			bus.on(kind, move |event| sink.lock().push(event.clone()));
		}

		recorder
	}

	/// Everything recorded so far.
	pub fn events(&self) -> Vec<TokenEvent> {
		self.events.lock().clone()
	}

	/// Compact `kind:key` labels for order assertions.
	pub fn labels(&self) -> Vec<String> {
		self.events
			.lock()
			.iter()
			.map(|event| match event {
				TokenEvent::Added { key, .. } => format!("added:{key}"),
				TokenEvent::Removed { key, .. } => format!("removed:{key}"),
				TokenEvent::Renewed { key, .. } => format!("renewed:{key}"),
				TokenEvent::Expired { key, .. } => format!("expired:{key}"),
				TokenEvent::Error { .. } => "error".into(),
			})
			.collect()
	}

	/// Number of recorded events on the given channel.
	pub fn count_of(&self, kind: EventKind) -> usize {
		self.events.lock().iter().filter(|event| event.kind() == kind).count()
	}

	/// Forgets everything recorded so far.
	pub fn clear(&self) {
		self.events.lock().clear();
	}
}
