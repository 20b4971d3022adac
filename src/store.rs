//! Typed token-map accessor bridging the facade and a storage backend.

// self
use crate::{
	_prelude::*,
	error::StorageError,
	host::{HostEnvironment, MediumError},
	storage::{self, StorageBackend, StorageKind},
	token::TokenKey,
};

/// Raw persisted token mapping, keyed by token key.
///
/// Values stay as raw JSON so unknown fields written by other tabs or SDK versions
/// survive read-modify-write cycles untouched. The map is key-sorted, which keeps
/// blob serialization byte-stable across writes.
pub type TokenMap = JsonMap;

/// Typed accessor over a [`StorageBackend`] holding the token mapping.
///
/// Blob backends persist the whole map as one JSON object; keyed backends split it
/// across per-token records. Mutations are load-mutate-store under an internal lock,
/// relying on the backend's single synchronous write for atomicity. Write failures
/// escalate through the fallback cascade, re-writing the payload on the replacement
/// backend.
pub struct TokenStore {
	storage_key: String,
	backend: RwLock<StorageBackend>,
	host: Arc<dyn HostEnvironment>,
	secure: bool,
	mutation: Mutex<()>,
}
impl TokenStore {
	/// Wraps a selected backend.
	pub fn new(
		host: Arc<dyn HostEnvironment>,
		backend: StorageBackend,
		storage_key: impl Into<String>,
		secure: bool,
	) -> Self {
		Self {
			storage_key: storage_key.into(),
			backend: RwLock::new(backend),
			host,
			secure,
			mutation: Mutex::new(()),
		}
	}

	/// Name of the persisted record.
	pub fn storage_key(&self) -> &str {
		&self.storage_key
	}

	/// Variant label of the currently active backend.
	pub fn backend_kind(&self) -> StorageKind {
		self.backend.read().kind()
	}

	/// Loads the full token mapping.
	pub fn load(&self) -> Result<TokenMap, StorageError> {
		let backend = self.backend.read().clone();

		match &backend {
			StorageBackend::Blob { .. } => match backend.get_item(&self.storage_key, None) {
				None => Ok(TokenMap::new()),
				Some(raw) => self.parse_map(&raw),
			},
			StorageBackend::Keyed { .. } => {
				let mut map = TokenMap::new();

				for (subkey, raw) in backend.entries(&self.storage_key) {
					map.insert(subkey, self.parse_value(&raw)?);
				}

				Ok(map)
			},
		}
	}

	/// Persists the full token mapping in a single logical write.
	pub fn save(&self, map: &TokenMap) -> Result<(), StorageError> {
		loop {
			let backend = self.backend.read().clone();

			match Self::write(&backend, &self.storage_key, map) {
				Ok(()) => return Ok(()),
				Err(error) => {
					let failed = backend.kind();

					match storage::fallback_after_write_failure(self.host.as_ref(), failed, self.secure) {
						Some(replacement) => *self.backend.write() = replacement,
						None if failed == StorageKind::LocalStorage
							|| failed == StorageKind::SessionStorage
							|| failed == StorageKind::Cookie =>
							return Err(StorageError::Unavailable),
						None => return Err(StorageError::Write { kind: failed, message: error.message }),
					}
				},
			}
		}
	}

	/// Reads the raw value stored under `key`, if any.
	pub fn get_one(&self, key: &TokenKey) -> Result<Option<Json>, StorageError> {
		Ok(self.load()?.get(key.as_str()).cloned())
	}

	/// Stores `value` under `key`, returning the previous value.
	pub fn set_one(&self, key: &TokenKey, value: Json) -> Result<Option<Json>, StorageError> {
		let _guard = self.mutation.lock();
		let mut map = self.load()?;
		let old = map.insert(key.as_str().to_owned(), value);

		self.save(&map)?;

		Ok(old)
	}

	/// Replaces the value under `key` only if one is currently stored.
	///
	/// Returns the replaced value, or `None` when the entry vanished and the write
	/// was skipped.
	pub fn swap_if_present(&self, key: &TokenKey, value: Json) -> Result<Option<Json>, StorageError> {
		let _guard = self.mutation.lock();
		let mut map = self.load()?;
		let Some(old) = map.get(key.as_str()).cloned() else { return Ok(None) };

		map.insert(key.as_str().to_owned(), value);
		self.save(&map)?;

		Ok(Some(old))
	}

	/// Deletes the value stored under `key`, returning it.
	pub fn delete_one(&self, key: &TokenKey) -> Result<Option<Json>, StorageError> {
		let _guard = self.mutation.lock();
		let mut map = self.load()?;
		let old = map.remove(key.as_str());

		if old.is_some() {
			self.save(&map)?;
		}

		Ok(old)
	}

	/// Deletes every stored value, returning the prior mapping.
	pub fn clear_all(&self) -> Result<TokenMap, StorageError> {
		let _guard = self.mutation.lock();
		let old = self.load()?;

		self.save(&TokenMap::new())?;

		Ok(old)
	}

	fn write(backend: &StorageBackend, storage_key: &str, map: &TokenMap) -> Result<(), MediumError> {
		match backend {
			StorageBackend::Blob { .. } =>
				if map.is_empty() {
					backend.remove_item(storage_key, None);

					Ok(())
				} else {
					let serialized = serde_json::to_string(map)
						.map_err(|e| MediumError::new(format!("Failed to serialize token map: {e}")))?;

					backend.set_item(storage_key, None, &serialized)
				},
			StorageBackend::Keyed { .. } => {
				for (subkey, value) in map {
					backend.set_item(storage_key, Some(subkey), &value.to_string())?;
				}
				for (subkey, _) in backend.entries(storage_key) {
					if !map.contains_key(&subkey) {
						backend.remove_item(storage_key, Some(&subkey));
					}
				}

				Ok(())
			},
		}
	}

	fn parse_map(&self, raw: &str) -> Result<TokenMap, StorageError> {
		let deserializer = &mut serde_json::Deserializer::from_str(raw);

		serde_path_to_error::deserialize::<_, TokenMap>(deserializer).map_err(|e| self.unparseable(&e))
	}

	fn parse_value(&self, raw: &str) -> Result<Json, StorageError> {
		let deserializer = &mut serde_json::Deserializer::from_str(raw);

		serde_path_to_error::deserialize::<_, Json>(deserializer).map_err(|e| self.unparseable(&e))
	}

	fn unparseable(&self, error: &serde_path_to_error::Error<serde_json::Error>) -> StorageError {
		StorageError::Unparseable {
			storage_key: self.storage_key.clone(),
			path: error.path().to_string(),
			message: error.inner().to_string(),
		}
	}
}
impl Debug for TokenStore {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("TokenStore")
			.field("storage_key", &self.storage_key)
			.field("backend", &self.backend_kind())
			.finish()
	}
}

#[cfg(test)]
mod tests {
	// crates.io
	use serde_json::json;
	// self
	use super::*;
	use crate::{_preludet::*, storage::StorageSelection};

	fn blob_store(host: &Arc<FakeHost>) -> TokenStore {
		let backend = storage::select_backend(host.as_ref(), &StorageSelection::Auto, true)
			.expect("Fake host should offer local storage.");

		TokenStore::new(host.clone(), backend, "token-storage", true)
	}

	#[test]
	fn empty_map_removes_the_blob_record() {
		let host = Arc::new(FakeHost::new());
		let store = blob_store(&host);
		let key = TokenKey::new("accessToken");

		store.set_one(&key, json!({"a": 1})).expect("Initial write should succeed.");

		assert!(host.local_medium().get_item("token-storage").is_some());

		store.delete_one(&key).expect("Delete should succeed.");

		assert_eq!(host.local_medium().get_item("token-storage"), None);
	}

	#[test]
	fn add_then_remove_restores_prior_bytes() {
		let host = Arc::new(FakeHost::new());
		let store = blob_store(&host);

		store
			.set_one(&TokenKey::new("idToken"), json!({"idToken": "a"}))
			.expect("Baseline write should succeed.");

		let before = host.local_medium().get_item("token-storage");

		store
			.set_one(&TokenKey::new("accessToken"), json!({"accessToken": "b"}))
			.expect("Second write should succeed.");
		store.delete_one(&TokenKey::new("accessToken")).expect("Delete should succeed.");

		assert_eq!(host.local_medium().get_item("token-storage"), before);
	}

	#[test]
	fn unknown_fields_survive_read_modify_write() {
		let host = Arc::new(FakeHost::new());
		let store = blob_store(&host);
		let annotated = json!({"accessToken": "a", "vendorHint": {"nested": true}});

		store.set_one(&TokenKey::new("accessToken"), annotated.clone()).expect("Write should succeed.");
		store.set_one(&TokenKey::new("idToken"), json!({"idToken": "b"})).expect("Write should succeed.");

		let loaded = store.load().expect("Load should succeed.");

		assert_eq!(loaded.get("accessToken"), Some(&annotated));
	}

	#[test]
	fn parse_failures_surface_the_storage_key_and_path() {
		let host = Arc::new(FakeHost::new());
		let store = blob_store(&host);

		host.local_medium()
			.set_item("token-storage", "{\"idToken\": <garbage>}")
			.expect("Seeding the corrupt payload should succeed.");

		let error = store.load().expect_err("Corrupt payloads must not be swallowed.");

		assert!(
			matches!(&error, StorageError::Unparseable { storage_key, .. } if storage_key == "token-storage")
		);
	}

	#[test]
	fn write_failures_escalate_to_the_next_backend() {
		let host = Arc::new(FakeHost::new());
		let store = blob_store(&host);
		let key = TokenKey::new("accessToken");

		host.local_medium().fail_writes(true);
		store.set_one(&key, json!({"accessToken": "a"})).expect("Write should land after fallback.");

		assert_eq!(store.backend_kind(), StorageKind::SessionStorage);
		assert!(host.session_medium().get_item("token-storage").is_some());
		assert!(!host.warnings().is_empty());
	}

	#[test]
	fn custom_provider_errors_propagate() {
		let host = Arc::new(FakeHost::new());
		let medium = Arc::new(FailableMedium::default());
		let backend = storage::select_backend(
			host.as_ref(),
			&StorageSelection::Custom(medium.clone()),
			true,
		)
		.expect("Custom providers are wrapped verbatim.");
		let store = TokenStore::new(host.clone(), backend, "token-storage", true);

		medium.fail_writes(true);

		let error = store
			.set_one(&TokenKey::new("accessToken"), json!({"accessToken": "a"}))
			.expect_err("Custom provider failures must propagate.");

		assert!(matches!(error, StorageError::Write { kind: StorageKind::Custom, .. }));
	}

	#[test]
	fn keyed_layout_round_trips_through_per_token_records() {
		let host = Arc::new(FakeHost::new());
		let backend = storage::select_backend(host.as_ref(), &StorageSelection::Cookie, true)
			.expect("Cookie backend should be available.");
		let store = TokenStore::new(host.clone(), backend, "token-storage", true);
		let mut map = TokenMap::new();

		map.insert("idToken".into(), json!({"idToken": "a"}));
		map.insert("accessToken".into(), json!({"accessToken": "b"}));
		store.save(&map).expect("Keyed save should succeed.");

		assert!(host.jar().get("token-storage_idToken").is_some());
		assert_eq!(store.load().expect("Keyed load should succeed."), map);

		map.remove("idToken");
		store.save(&map).expect("Keyed save should prune dropped records.");

		assert_eq!(host.jar().get("token-storage_idToken"), None);
	}

	#[test]
	fn swap_skips_vanished_entries() {
		let host = Arc::new(FakeHost::new());
		let store = blob_store(&host);
		let key = TokenKey::new("accessToken");

		assert_eq!(
			store.swap_if_present(&key, json!({"accessToken": "new"})).expect("Swap should succeed."),
			None
		);
		assert_eq!(host.local_medium().get_item("token-storage"), None);

		store.set_one(&key, json!({"accessToken": "old"})).expect("Seed write should succeed.");

		let replaced =
			store.swap_if_present(&key, json!({"accessToken": "new"})).expect("Swap should succeed.");

		assert_eq!(replaced, Some(json!({"accessToken": "old"})));
		assert_eq!(store.get_one(&key).expect("Read should succeed."), Some(json!({"accessToken": "new"})));
	}
}
