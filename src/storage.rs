//! Storage backend variants, availability probing, and the fallback cascade.

pub mod memory;

pub use memory::MemoryMedium;

// crates.io
use time::macros::datetime;
// self
use crate::{
	_prelude::*,
	error::StorageError,
	host::{CookieAttributes, CookieJar, HostEnvironment, MediumError, SameSite, StorageMedium},
};

/// Expiry stamped on keyed records; effectively "never".
pub const FAR_FUTURE_EXPIRY: OffsetDateTime = datetime!(2200-01-01 00:00 UTC);

/// Key written and deleted while probing a medium for availability.
const PROBE_KEY: &str = "storage-probe";
/// Fallback order walked when a cascading backend is unavailable.
const CASCADE: [StorageKind; 3] = [StorageKind::LocalStorage, StorageKind::SessionStorage, StorageKind::Cookie];

/// Storage variants recognized by the manager configuration.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum StorageKind {
	/// The host's persistent keyed storage.
	LocalStorage,
	/// The host's session-scoped keyed storage.
	SessionStorage,
	/// One record per token in the host's cookie facility.
	Cookie,
	/// Process-local mapping surviving only the facade's lifetime.
	Memory,
	/// Caller-supplied provider wrapped verbatim.
	Custom,
}
impl StorageKind {
	/// Returns the configuration name of the variant.
	pub const fn as_str(self) -> &'static str {
		match self {
			Self::LocalStorage => "localStorage",
			Self::SessionStorage => "sessionStorage",
			Self::Cookie => "cookie",
			Self::Memory => "memory",
			Self::Custom => "custom",
		}
	}
}
impl Display for StorageKind {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Configured storage choice.
#[derive(Clone, Default)]
pub enum StorageSelection {
	/// First available of localStorage → sessionStorage → cookie.
	#[default]
	Auto,
	/// The host's persistent keyed storage, with fallback.
	LocalStorage,
	/// The host's session-scoped keyed storage, with fallback.
	SessionStorage,
	/// The host's cookie facility.
	Cookie,
	/// Process-local storage.
	Memory,
	/// Caller-supplied provider wrapped verbatim; its errors propagate.
	Custom(Arc<dyn StorageMedium>),
}
impl Debug for StorageSelection {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		match self {
			Self::Auto => f.write_str("Auto"),
			Self::LocalStorage => f.write_str("LocalStorage"),
			Self::SessionStorage => f.write_str("SessionStorage"),
			Self::Cookie => f.write_str("Cookie"),
			Self::Memory => f.write_str("Memory"),
			Self::Custom(_) => f.write_str("Custom(..)"),
		}
	}
}
impl FromStr for StorageSelection {
	type Err = StorageError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s {
			"localStorage" => Ok(Self::LocalStorage),
			"sessionStorage" => Ok(Self::SessionStorage),
			"cookie" => Ok(Self::Cookie),
			"memory" => Ok(Self::Memory),
			other => Err(StorageError::UnrecognizedOption { option: other.into() }),
		}
	}
}

/// Selected backend exposing a uniform key→serialized-blob surface.
///
/// Blob variants persist the whole token mapping as one record under the storage
/// key; the keyed variant persists one record per token named
/// `<storage_key>_<token_key>`.
#[derive(Clone)]
pub enum StorageBackend {
	/// Single serialized mapping stored under the storage key.
	Blob {
		/// Variant label used for diagnostics and fallback decisions.
		kind: StorageKind,
		/// Backing medium.
		medium: Arc<dyn StorageMedium>,
	},
	/// One record per token in the host's cookie facility.
	Keyed {
		/// Backing cookie facility.
		jar: Arc<dyn CookieJar>,
		/// Attributes applied to every record write.
		attributes: CookieAttributes,
	},
}
impl StorageBackend {
	/// Variant label of the backend.
	pub fn kind(&self) -> StorageKind {
		match self {
			Self::Blob { kind, .. } => *kind,
			Self::Keyed { .. } => StorageKind::Cookie,
		}
	}

	/// Reads a record; `subkey` selects the per-token record on keyed backends.
	pub fn get_item(&self, storage_key: &str, subkey: Option<&str>) -> Option<String> {
		match self {
			Self::Blob { medium, .. } => medium.get_item(storage_key),
			Self::Keyed { jar, .. } => subkey.and_then(|s| jar.get(&keyed_name(storage_key, s))),
		}
	}

	/// Writes a record; `subkey` selects the per-token record on keyed backends.
	pub fn set_item(&self, storage_key: &str, subkey: Option<&str>, value: &str) -> Result<(), MediumError> {
		match self {
			Self::Blob { medium, .. } => medium.set_item(storage_key, value),
			Self::Keyed { jar, attributes } => match subkey {
				Some(s) => jar.set(&keyed_name(storage_key, s), value, attributes),
				None => Err(MediumError::new("Keyed backends require a token key for writes")),
			},
		}
	}

	/// Deletes a record; `subkey` selects the per-token record on keyed backends.
	pub fn remove_item(&self, storage_key: &str, subkey: Option<&str>) {
		match self {
			Self::Blob { medium, .. } => medium.remove_item(storage_key),
			Self::Keyed { jar, .. } =>
				if let Some(s) = subkey {
					jar.delete(&keyed_name(storage_key, s));
				},
		}
	}

	/// Lists per-token records on keyed backends as `(token_key, value)` pairs.
	pub fn entries(&self, storage_key: &str) -> Vec<(String, String)> {
		match self {
			Self::Blob { .. } => Vec::new(),
			Self::Keyed { jar, .. } => {
				let prefix = format!("{storage_key}_");

				jar.entries()
					.into_iter()
					.filter_map(|(name, value)| {
						name.strip_prefix(&prefix).map(|subkey| (subkey.to_owned(), value))
					})
					.collect()
			},
		}
	}
}
impl Debug for StorageBackend {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_tuple("StorageBackend").field(&self.kind()).finish()
	}
}

fn keyed_name(storage_key: &str, token_key: &str) -> String {
	format!("{storage_key}_{token_key}")
}

/// Builds the attribute set applied to keyed records for the given origin security.
pub fn cookie_attributes(secure: bool) -> CookieAttributes {
	CookieAttributes {
		expires: FAR_FUTURE_EXPIRY,
		path: "/".into(),
		same_site: if secure { SameSite::None } else { SameSite::Lax },
		secure,
	}
}

/// Resolves the configured selection into a working backend.
///
/// Cascading variants are probed with a write-and-delete; each downgrade is reported
/// through the host's warn channel. Memory and custom selections never cascade.
pub fn select_backend(
	host: &dyn HostEnvironment,
	selection: &StorageSelection,
	secure: bool,
) -> Result<StorageBackend, StorageError> {
	match selection {
		StorageSelection::Custom(medium) =>
			Ok(StorageBackend::Blob { kind: StorageKind::Custom, medium: medium.clone() }),
		StorageSelection::Memory => Ok(StorageBackend::Blob {
			kind: StorageKind::Memory,
			medium: Arc::new(MemoryMedium::default()),
		}),
		StorageSelection::Auto | StorageSelection::LocalStorage =>
			cascade_from(host, StorageKind::LocalStorage, secure),
		StorageSelection::SessionStorage => cascade_from(host, StorageKind::SessionStorage, secure),
		StorageSelection::Cookie => cascade_from(host, StorageKind::Cookie, secure),
	}
}

/// Walks the fallback order starting at `start`, warning on every downgrade.
pub(crate) fn cascade_from(
	host: &dyn HostEnvironment,
	start: StorageKind,
	secure: bool,
) -> Result<StorageBackend, StorageError> {
	let mut index = CASCADE.iter().position(|kind| *kind == start).unwrap_or(0);

	loop {
		let kind = CASCADE[index];

		if let Some(backend) = probe_backend(host, kind, secure) {
			return Ok(backend);
		}
		if index + 1 >= CASCADE.len() {
			return Err(StorageError::Unavailable);
		}

		host.warn(&format!(
			"This browser doesn't support {kind}. Switching to {}.",
			CASCADE[index + 1]
		));

		index += 1;
	}
}

/// Selects the backend that replaces `failed` after a write-time failure, if any.
///
/// Only cascading variants escalate; memory cannot fail and custom-provider errors
/// propagate to the caller untouched.
pub(crate) fn fallback_after_write_failure(
	host: &dyn HostEnvironment,
	failed: StorageKind,
	secure: bool,
) -> Option<StorageBackend> {
	let index = CASCADE.iter().position(|kind| *kind == failed)?;
	let next = *CASCADE.get(index + 1)?;

	host.warn(&format!("This browser doesn't support {failed}. Switching to {next}."));

	cascade_from(host, next, secure).ok()
}

fn probe_backend(host: &dyn HostEnvironment, kind: StorageKind, secure: bool) -> Option<StorageBackend> {
	match kind {
		StorageKind::LocalStorage => host
			.local_storage()
			.filter(|medium| medium_available(medium.as_ref()))
			.map(|medium| StorageBackend::Blob { kind, medium }),
		StorageKind::SessionStorage => host
			.session_storage()
			.filter(|medium| medium_available(medium.as_ref()))
			.map(|medium| StorageBackend::Blob { kind, medium }),
		StorageKind::Cookie => {
			let attributes = cookie_attributes(secure);

			host.cookie_jar()
				.filter(|jar| jar_available(jar.as_ref(), &attributes))
				.map(|jar| StorageBackend::Keyed { jar, attributes })
		},
		StorageKind::Memory | StorageKind::Custom => None,
	}
}

fn medium_available(medium: &dyn StorageMedium) -> bool {
	if medium.set_item(PROBE_KEY, "probe").is_err() {
		return false;
	}

	medium.remove_item(PROBE_KEY);

	true
}

fn jar_available(jar: &dyn CookieJar, attributes: &CookieAttributes) -> bool {
	if jar.set(PROBE_KEY, "probe", attributes).is_err() {
		return false;
	}

	jar.delete(PROBE_KEY);

	true
}
