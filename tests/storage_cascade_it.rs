// self
use oidc_token_manager::_preludet::*;
use oidc_token_manager::storage::{StorageKind, StorageSelection};

fn build_manager(host: Arc<FakeHost>, options: TokenManagerOptions) -> TokenManager {
	TokenManager::new(
		host,
		Arc::new(ScriptedTokenClient::default()),
		Arc::new(EventBus::new()),
		options,
	)
	.expect("Manager construction should succeed against the fake host.")
}

#[tokio::test]
async fn a_missing_local_storage_downgrades_to_session_storage() {
	let host = Arc::new(FakeHost::new().without_local_storage());
	let manager = build_manager(host.clone(), TokenManagerOptions::default());

	assert_eq!(host.warnings(), [
		"This browser doesn't support localStorage. Switching to sessionStorage.",
	]);
	assert_eq!(manager.backend_kind(), StorageKind::SessionStorage);

	manager
		.add(&TokenKey::new("idToken"), id_token_fixture("id-value", far_future_expiry()))
		.await
		.expect("Writing through the downgraded backend should succeed.");

	assert!(
		host.session_medium().get_item("okta-token-storage").is_some(),
		"Writes must land in session storage after the downgrade.",
	);
}

#[tokio::test]
async fn an_exhausted_cascade_fails_construction() {
	let host = Arc::new(
		FakeHost::new().without_local_storage().without_session_storage().without_cookie_jar(),
	);
	let error = TokenManager::new(
		host,
		Arc::new(ScriptedTokenClient::default()),
		Arc::new(EventBus::new()),
		TokenManagerOptions::default(),
	)
	.expect_err("An environment with no usable storage must fail construction.");

	assert_eq!(error, Error::Storage(StorageError::Unavailable));
}

#[tokio::test]
async fn a_write_time_quota_failure_escalates_silently() {
	let host = Arc::new(FakeHost::new());
	let manager = build_manager(host.clone(), TokenManagerOptions::default());
	let key = TokenKey::new("accessToken");

	manager
		.add(&key, access_token_fixture(far_future_expiry()))
		.await
		.expect("The initial write should succeed.");
	host.local_medium().fail_writes(true);
	manager
		.add(&key, access_token_fixture(far_future_expiry() + 60))
		.await
		.expect("The write should land on the next backend.");

	assert_eq!(manager.backend_kind(), StorageKind::SessionStorage);
	assert!(host.session_medium().get_item("okta-token-storage").is_some());
	assert!(!host.warnings().is_empty());
}

#[tokio::test]
async fn the_cookie_backend_stores_one_record_per_token() {
	let host = Arc::new(FakeHost::new());
	let manager = build_manager(
		host.clone(),
		TokenManagerOptions::default().with_storage(StorageSelection::Cookie),
	);

	manager
		.add(&TokenKey::new("idToken"), id_token_fixture("id-value", far_future_expiry()))
		.await
		.expect("The ID token write should succeed.");
	manager
		.add(&TokenKey::new("test-accessToken"), access_token_fixture(far_future_expiry()))
		.await
		.expect("The access token write should succeed.");

	let jar = host.jar();

	assert!(jar.get("okta-token-storage_idToken").is_some());
	assert!(jar.get("okta-token-storage_test-accessToken").is_some());

	let token = manager
		.get(&TokenKey::new("test-accessToken"))
		.await
		.expect("Reading should succeed.")
		.expect("The stored token should be returned.");

	assert_eq!(token, access_token_fixture(far_future_expiry()));

	manager.clear().await.expect("Clearing should succeed.");

	assert_eq!(jar.get("okta-token-storage_idToken"), None);
	assert_eq!(jar.get("okta-token-storage_test-accessToken"), None);
}

#[tokio::test]
async fn the_memory_backend_needs_no_host_media() {
	let host = Arc::new(
		FakeHost::new().without_local_storage().without_session_storage().without_cookie_jar(),
	);
	let manager = build_manager(
		host.clone(),
		TokenManagerOptions::default().with_storage(StorageSelection::Memory),
	);
	let key = TokenKey::new("accessToken");
	let token = access_token_fixture(far_future_expiry());

	manager.add(&key, token.clone()).await.expect("The memory write should succeed.");

	assert_eq!(manager.get(&key).await.expect("Reading should succeed."), Some(token));
	assert!(host.warnings().is_empty());
}

#[tokio::test]
async fn a_custom_provider_is_wrapped_verbatim() {
	let host = Arc::new(FakeHost::new());
	let medium = Arc::new(FailableMedium::default());
	let manager = build_manager(
		host.clone(),
		TokenManagerOptions::default()
			.with_storage(StorageSelection::Custom(medium.clone()))
			.with_storage_key("custom-token-storage"),
	);
	let key = TokenKey::new("accessToken");

	manager
		.add(&key, access_token_fixture(far_future_expiry()))
		.await
		.expect("The custom write should succeed.");

	assert!(medium.get_item("custom-token-storage").is_some());
	assert_eq!(host.local_medium().get_item("custom-token-storage"), None);

	// Custom provider failures propagate; there is no cascade to hide behind.
	medium.fail_writes(true);

	let error = manager
		.add(&key, access_token_fixture(far_future_expiry() + 60))
		.await
		.expect_err("Custom provider failures must propagate.");

	assert!(matches!(
		error,
		Error::Storage(StorageError::Write { kind: StorageKind::Custom, .. })
	));
	assert!(host.warnings().is_empty());
}
