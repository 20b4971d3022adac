//! Process-local storage medium for the `memory` option, native hosts, and tests.

// self
use crate::{_prelude::*, host::{MediumError, StorageMedium}};

/// Thread-safe in-process medium; contents survive only the owning facade's lifetime.
#[derive(Clone, Debug, Default)]
pub struct MemoryMedium(Arc<RwLock<HashMap<String, String>>>);
impl MemoryMedium {
	/// Number of stored records.
	pub fn len(&self) -> usize {
		self.0.read().len()
	}

	/// Returns `true` when nothing is stored.
	pub fn is_empty(&self) -> bool {
		self.0.read().is_empty()
	}
}
impl StorageMedium for MemoryMedium {
	fn get_item(&self, key: &str) -> Option<String> {
		self.0.read().get(key).cloned()
	}

	fn set_item(&self, key: &str, value: &str) -> Result<(), MediumError> {
		self.0.write().insert(key.into(), value.into());

		Ok(())
	}

	fn remove_item(&self, key: &str) {
		self.0.write().remove(key);
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn records_round_trip_and_delete() {
		let medium = MemoryMedium::default();

		medium.set_item("k", "v").expect("Memory writes cannot fail.");

		assert_eq!(medium.get_item("k").as_deref(), Some("v"));

		medium.remove_item("k");

		assert_eq!(medium.get_item("k"), None);
		assert!(medium.is_empty());
	}

	#[test]
	fn clones_share_contents() {
		let medium = MemoryMedium::default();
		let alias = medium.clone();

		medium.set_item("k", "v").expect("Memory writes cannot fail.");

		assert_eq!(alias.get_item("k").as_deref(), Some("v"));
	}
}
