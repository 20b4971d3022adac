// crates.io
use serde_json::json;
use tokio::time;
// self
use oidc_token_manager::_preludet::*;

fn build_manager(
	host: Arc<FakeHost>,
	options: TokenManagerOptions,
) -> (TokenManager, EventRecorder) {
	let bus = Arc::new(EventBus::new());
	let recorder = EventRecorder::subscribe_all(&bus);
	let manager =
		TokenManager::new(host, Arc::new(ScriptedTokenClient::default()), bus, options)
			.expect("Manager construction should succeed against the fake host.");

	(manager, recorder)
}

fn change(key: Option<&str>, old: Option<&str>, new: Option<&str>) -> StorageChange {
	StorageChange {
		key: key.map(str::to_owned),
		old_value: old.map(str::to_owned),
		new_value: new.map(str::to_owned),
	}
}

#[tokio::test]
async fn a_foreign_write_is_reemitted_without_writing_back() {
	let host = Arc::new(FakeHost::new());
	let (_manager, recorder) = build_manager(host.clone(), TokenManagerOptions::default());

	host.push_storage_change(change(
		Some("okta-token-storage"),
		None,
		Some(r#"{"idToken":"T"}"#),
	));
	settle().await;

	assert_eq!(recorder.events(), [TokenEvent::Added {
		key: TokenKey::new("idToken"),
		token: Json::String("T".into()),
	}]);
	assert_eq!(
		host.local_medium().get_item("okta-token-storage"),
		None,
		"The synchronizer must never write back to storage.",
	);
}

#[tokio::test]
async fn the_emitted_events_are_the_keyed_diff() {
	let host = Arc::new(FakeHost::new());
	let (_manager, recorder) = build_manager(host.clone(), TokenManagerOptions::default());
	let old = json!({
		"a": {"accessToken": "1", "scopes": ["openid"], "expiresAt": 1},
		"b": {"accessToken": "2", "scopes": ["openid"], "expiresAt": 2}
	})
	.to_string();
	let new = json!({
		"a": {"accessToken": "9", "scopes": ["openid"], "expiresAt": 9},
		"c": {"accessToken": "3", "scopes": ["openid"], "expiresAt": 3}
	})
	.to_string();

	host.push_storage_change(change(Some("okta-token-storage"), Some(&old), Some(&new)));
	settle().await;

	assert_eq!(recorder.labels(), ["added:a", "added:c", "removed:b"]);
}

#[tokio::test]
async fn irrelevant_and_unchanged_notifications_are_ignored() {
	let host = Arc::new(FakeHost::new());
	let (_manager, recorder) = build_manager(host.clone(), TokenManagerOptions::default());

	host.push_storage_change(change(Some("some-other-key"), None, Some(r#"{"idToken":"T"}"#)));
	host.push_storage_change(change(
		Some("okta-token-storage"),
		Some(r#"{"idToken":"T"}"#),
		Some(r#"{"idToken":"T"}"#),
	));
	settle().await;

	assert!(recorder.events().is_empty());
}

#[tokio::test]
async fn a_wholesale_clear_removes_every_observed_token() {
	let host = Arc::new(FakeHost::new());
	let (_manager, recorder) = build_manager(host.clone(), TokenManagerOptions::default());
	let old = json!({
		"accessToken": {"accessToken": "1", "scopes": ["openid"], "expiresAt": 1},
		"idToken": {"idToken": "2", "scopes": ["openid"], "expiresAt": 2}
	})
	.to_string();

	host.push_storage_change(change(None, Some(&old), None));
	settle().await;

	assert_eq!(recorder.labels(), ["removed:accessToken", "removed:idToken"]);
}

#[tokio::test(start_paused = true)]
async fn the_configured_delay_defers_handling() {
	let clock = Arc::new(TokioClock::starting_at_secs(1_000_000));
	let host = Arc::new(FakeHost::new());
	let (_manager, recorder) = build_manager(
		host.clone(),
		TokenManagerOptions::default().with_clock(clock).with_storage_event_delay_ms(1_000),
	);

	host.push_storage_change(change(
		Some("okta-token-storage"),
		None,
		Some(r#"{"idToken":"T"}"#),
	));
	settle().await;

	assert!(recorder.events().is_empty(), "Handling must wait out the configured delay.");

	time::advance(StdDuration::from_millis(1_100)).await;
	settle().await;

	assert_eq!(recorder.labels(), ["added:idToken"]);
}

#[tokio::test(start_paused = true)]
async fn observed_tokens_rearm_expiration_timers() {
	let clock = Arc::new(TokioClock::starting_at_secs(1_000_000));
	let host = Arc::new(FakeHost::new());
	let (_manager, recorder) = build_manager(
		host.clone(),
		TokenManagerOptions::default()
			.with_clock(clock.clone())
			.with_expire_early_seconds(0)
			.with_auto_renew(false)
			.with_auto_remove(false),
	);
	let expires_at = clock.now_unix_ms() / 1_000 + 2;
	let payload = json!({
		"accessToken": {"accessToken": "1", "scopes": ["openid"], "expiresAt": expires_at}
	})
	.to_string();

	// Another tab wrote the token; this tab must expire it on time anyway.
	host.local_medium()
		.set_item("okta-token-storage", &payload)
		.expect("Seeding shared storage should succeed.");
	host.push_storage_change(change(Some("okta-token-storage"), None, Some(&payload)));
	settle().await;
	recorder.clear();
	time::advance(StdDuration::from_secs(3)).await;
	settle().await;

	assert_eq!(recorder.labels(), ["expired:accessToken"]);
}
