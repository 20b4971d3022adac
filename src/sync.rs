//! Cross-tab reconciliation of storage-change notifications.
//!
//! Writes made by another tab arrive as [`StorageChange`] notifications. The
//! synchronizer diffs the old payload against the new one and replays the difference
//! through the lifecycle event path, so subscribers and timers in this tab track the
//! shared storage without anyone writing it a second time.

// self
use crate::{_prelude::*, host::StorageChange, store::TokenMap};

/// Keyed difference between two persisted payloads.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct StorageDiff {
	/// Keys present only in the new payload, or whose value changed.
	pub added: Vec<(String, Json)>,
	/// Keys present only in the old payload.
	pub removed: Vec<(String, Json)>,
	/// Parsed new payload, used to re-arm expiration timers.
	pub new_map: TokenMap,
}

/// Returns whether the change targets the given storage record.
///
/// A `None` key is accepted: it means storage was wholesale cleared.
pub fn is_relevant(change: &StorageChange, storage_key: &str) -> bool {
	change.key.as_deref().is_none_or(|key| key == storage_key)
}

/// Diffs a storage change into lifecycle additions and removals.
///
/// Returns `None` when the payload did not actually change. Payloads that fail to
/// parse are treated as empty maps; a foreign tab may have written anything.
pub fn diff_change(change: &StorageChange) -> Option<StorageDiff> {
	if change.new_value == change.old_value {
		return None;
	}

	let old_map = parse_payload(change.old_value.as_deref());
	let new_map = parse_payload(change.new_value.as_deref());
	let added = new_map
		.iter()
		.filter(|(key, value)| old_map.get(*key) != Some(value))
		.map(|(key, value)| (key.clone(), value.clone()))
		.collect();
	let removed = old_map
		.iter()
		.filter(|(key, _)| !new_map.contains_key(*key))
		.map(|(key, value)| (key.clone(), value.clone()))
		.collect();

	Some(StorageDiff { added, removed, new_map })
}

fn parse_payload(raw: Option<&str>) -> TokenMap {
	raw.and_then(|value| serde_json::from_str::<TokenMap>(value).ok()).unwrap_or_default()
}
