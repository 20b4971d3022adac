//! Host-environment capability seams consumed by the manager.
//!
//! The enclosing SDK wires these in from whatever browser-like host it runs inside.
//! The manager never touches a global: storage media, the cookie facility, the page
//! URL, the warn channel, and the storage-change notification stream all arrive
//! through [`HostEnvironment`].

// crates.io
use tokio::sync::broadcast;
use url::Url;
// self
use crate::_prelude::*;

/// Notification describing a persisted-storage change observed by the host.
///
/// Mirrors the host's storage-change events: `key` is `None` when storage was
/// wholesale cleared, and the old/new values are the serialized payloads before and
/// after the write.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StorageChange {
	/// Storage record that changed.
	pub key: Option<String>,
	/// Serialized payload before the change, if any.
	pub old_value: Option<String>,
	/// Serialized payload after the change, if any.
	pub new_value: Option<String>,
}

/// Failure reported by a storage medium write (quota, disabled medium).
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
#[error("{message}")]
pub struct MediumError {
	/// Human-readable failure payload.
	pub message: String,
}
impl MediumError {
	/// Wraps a medium-specific failure message.
	pub fn new(message: impl Into<String>) -> Self {
		Self { message: message.into() }
	}
}

/// Synchronous keyed storage surface matching the host's DOM storage contract.
///
/// Caller-supplied custom providers implement this same trait and are wrapped
/// verbatim; their errors propagate without entering the fallback cascade.
pub trait StorageMedium
where
	Self: Send + Sync,
{
	/// Reads the serialized payload stored under `key`.
	fn get_item(&self, key: &str) -> Option<String>;

	/// Writes `value` under `key`; fails on quota or medium restrictions.
	fn set_item(&self, key: &str, value: &str) -> Result<(), MediumError>;

	/// Deletes the record stored under `key`.
	fn remove_item(&self, key: &str);
}

/// `SameSite` policy applied to keyed records.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SameSite {
	/// Cookies restricted to same-site requests plus top-level navigation.
	Lax,
	/// Cookies sent on all requests; requires `secure`.
	None,
	/// Cookies restricted to same-site requests.
	Strict,
}
impl SameSite {
	/// Returns the attribute value string.
	pub const fn as_str(self) -> &'static str {
		match self {
			Self::Lax => "lax",
			Self::None => "none",
			Self::Strict => "strict",
		}
	}
}

/// Attributes applied when writing a keyed record.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CookieAttributes {
	/// Absolute expiry instant.
	pub expires: OffsetDateTime,
	/// Path scope of the record.
	pub path: String,
	/// `SameSite` policy.
	pub same_site: SameSite,
	/// Whether the record is restricted to secure transports.
	pub secure: bool,
}

/// Cookie facility exposed by the host.
pub trait CookieJar
where
	Self: Send + Sync,
{
	/// Reads the value of the named record.
	fn get(&self, name: &str) -> Option<String>;

	/// Writes the named record with the provided attributes.
	fn set(&self, name: &str, value: &str, attributes: &CookieAttributes) -> Result<(), MediumError>;

	/// Deletes the named record.
	fn delete(&self, name: &str);

	/// Lists all visible records as name/value pairs.
	fn entries(&self) -> Vec<(String, String)>;
}

/// Capabilities the enclosing SDK wires in from the host environment.
pub trait HostEnvironment
where
	Self: Send + Sync,
{
	/// The host's persistent keyed storage, when available.
	fn local_storage(&self) -> Option<Arc<dyn StorageMedium>>;

	/// The host's session-scoped keyed storage, when available.
	fn session_storage(&self) -> Option<Arc<dyn StorageMedium>>;

	/// The host's cookie facility, when available.
	fn cookie_jar(&self) -> Option<Arc<dyn CookieJar>>;

	/// Current page URL, when the host has one.
	fn current_url(&self) -> Option<Url>;

	/// Whether the current origin uses a secure transport.
	fn is_https(&self) -> bool {
		self.current_url().is_some_and(|url| url.scheme() == "https")
	}

	/// Whether the host is a local development environment.
	fn is_localhost(&self) -> bool {
		self.current_url()
			.and_then(|url| url.host_str().map(str::to_owned))
			.is_some_and(|host| host == "localhost" || host == "127.0.0.1")
	}

	/// Whether the host fires storage events before the write is visible to readers.
	fn legacy_storage_events(&self) -> bool {
		false
	}

	/// Emits a warning through the SDK's warn channel.
	fn warn(&self, message: &str);

	/// Subscribes to the host's storage-change notification stream.
	fn subscribe_storage_changes(&self) -> broadcast::Receiver<StorageChange>;
}
