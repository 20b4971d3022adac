//! Opaque token-slot identifiers.

// std
use std::borrow::Borrow;
// self
use crate::_prelude::*;

/// Opaque string identifying a token slot in the store (e.g. `idToken`,
/// `test-accessToken`). Callers choose keys freely; the bundle operations use the
/// canonical constants below.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TokenKey(String);
impl TokenKey {
	/// Canonical key the bundle operations use for access tokens.
	pub const ACCESS_TOKEN: &'static str = "accessToken";
	/// Canonical key the bundle operations use for ID tokens.
	pub const ID_TOKEN: &'static str = "idToken";
	/// Canonical key the bundle operations use for refresh tokens.
	pub const REFRESH_TOKEN: &'static str = "refreshToken";

	/// Wraps a caller-chosen key.
	pub fn new(value: impl Into<String>) -> Self {
		Self(value.into())
	}

	/// Returns the key as a string slice.
	pub fn as_str(&self) -> &str {
		&self.0
	}
}
impl AsRef<str> for TokenKey {
	fn as_ref(&self) -> &str {
		&self.0
	}
}
impl Borrow<str> for TokenKey {
	fn borrow(&self) -> &str {
		&self.0
	}
}
impl From<&str> for TokenKey {
	fn from(value: &str) -> Self {
		Self::new(value)
	}
}
impl From<String> for TokenKey {
	fn from(value: String) -> Self {
		Self(value)
	}
}
impl From<TokenKey> for String {
	fn from(value: TokenKey) -> Self {
		value.0
	}
}
impl Debug for TokenKey {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		write!(f, "TokenKey({})", self.0)
	}
}
impl Display for TokenKey {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(&self.0)
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn borrow_supports_string_lookup() {
		let map: HashMap<TokenKey, u8> = HashMap::from_iter([(TokenKey::new("idToken"), 7_u8)]);

		assert_eq!(map.get("idToken"), Some(&7));
	}

	#[test]
	fn canonical_constants_match_the_persisted_layout() {
		assert_eq!(TokenKey::new(TokenKey::ID_TOKEN).as_str(), "idToken");
		assert_eq!(TokenKey::new(TokenKey::ACCESS_TOKEN).as_str(), "accessToken");
		assert_eq!(TokenKey::new(TokenKey::REFRESH_TOKEN).as_str(), "refreshToken");
	}
}
