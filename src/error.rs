//! Manager-level error types shared across storage, renewal, and the facade.
//!
//! Every variant carries structured string payloads instead of boxed sources so the
//! whole taxonomy stays [`Clone`]; renewal outcomes are broadcast to every waiter of a
//! single-flight operation, which requires cloning the error as-is.

// self
use crate::{_prelude::*, storage::StorageKind, token::TokenKey};

/// Manager-wide result type alias returning [`Error`] by default.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Canonical token manager error exposed by public APIs.
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
pub enum Error {
	/// Storage-layer failure.
	#[error(transparent)]
	Storage(#[from] StorageError),
	/// Failure reported by the renewal collaborator.
	#[error(transparent)]
	Renew(#[from] RenewError),

	/// Token value rejected at the facade boundary.
	#[error("Token is invalid: {reason}.")]
	InvalidToken {
		/// What made the value unacceptable.
		reason: InvalidTokenReason,
	},
	/// `renew` was called for a key with no stored token.
	#[error("No token is stored under the key `{token_key}`.")]
	NoTokenForKey {
		/// Key the caller asked to renew.
		token_key: TokenKey,
	},
	/// The renewal rate limiter tripped; emitted on the `error` channel, never thrown.
	#[error("Too many token renewal requests were issued in a short period.")]
	TooManyRenewRequests,
	/// `get` was called while the host URL indicates an OAuth callback in progress.
	#[error("Tokens cannot be read while an OAuth redirect callback is in progress.")]
	CallbackInProgress,
}
impl Error {
	/// Tags the error with the token key it concerns, where the variant carries one.
	pub fn with_token_key(self, key: TokenKey) -> Self {
		match self {
			Self::Renew(inner) => Self::Renew(inner.with_token_key(key)),
			other => other,
		}
	}

	/// Returns the tagged token key, if any.
	pub fn token_key(&self) -> Option<&TokenKey> {
		match self {
			Self::Renew(inner) => inner.token_key(),
			Self::NoTokenForKey { token_key } => Some(token_key),
			_ => None,
		}
	}
}

/// Reasons a token value is rejected before it reaches storage.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InvalidTokenReason {
	/// The value is not a JSON object.
	NotAnObject,
	/// The `scopes` field is missing.
	MissingScopes,
	/// The `scopes` field is present but empty.
	EmptyScopes,
	/// The `expiresAt` field is missing.
	MissingExpiresAt,
	/// None of `idToken`, `accessToken`, or `refreshToken` is present.
	MissingCredential,
	/// More than one of `idToken`, `accessToken`, or `refreshToken` is present.
	ConflictingCredentials,
	/// A known field does not have the expected shape.
	MalformedField {
		/// Name of the offending field.
		field: &'static str,
	},
}
impl Display for InvalidTokenReason {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		match self {
			Self::NotAnObject => f.write_str("the value is not an object"),
			Self::MissingScopes => f.write_str("the `scopes` field is missing"),
			Self::EmptyScopes => f.write_str("the `scopes` field is empty"),
			Self::MissingExpiresAt => f.write_str("the `expiresAt` field is missing"),
			Self::MissingCredential =>
				f.write_str("none of `idToken`, `accessToken`, or `refreshToken` is present"),
			Self::ConflictingCredentials =>
				f.write_str("more than one of `idToken`, `accessToken`, or `refreshToken` is present"),
			Self::MalformedField { field } => write!(f, "the `{field}` field is malformed"),
		}
	}
}

/// Storage selection, cascade, and parsing failures.
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
pub enum StorageError {
	/// The configured storage name is not a known variant. Fatal at construction.
	#[error("`{option}` is not a recognized storage option.")]
	UnrecognizedOption {
		/// The rejected storage name.
		option: String,
	},
	/// Every backend in the fallback cascade failed.
	#[error("No supported storage medium is available in this environment.")]
	Unavailable,
	/// A persisted payload could not be parsed as JSON.
	#[error("Stored payload under `{storage_key}` could not be parsed at `{path}`: {message}.")]
	Unparseable {
		/// Storage record the payload was read from.
		storage_key: String,
		/// JSON path of the failure.
		path: String,
		/// Human-readable parser message.
		message: String,
	},
	/// A backend write failed and no further fallback was possible.
	#[error("Failed to write to {kind}: {message}.")]
	Write {
		/// Backend that rejected the write.
		kind: StorageKind,
		/// Human-readable failure payload.
		message: String,
	},
}

/// Structured payload of an SDK-class renewal failure.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SdkFailure {
	/// SDK-assigned error code.
	pub error_code: String,
	/// SDK-supplied summary.
	pub error_summary: String,
	/// Documentation link for the failure.
	pub error_link: String,
	/// Correlation identifier.
	pub error_id: String,
	/// Individual causes contributing to the failure.
	pub error_causes: Vec<String>,
}
impl Display for SdkFailure {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		write!(f, "Authentication SDK error `{}`: {}", self.error_code, self.error_summary)
	}
}

/// Failures produced by the renewal collaborator, tagged with the affected token key.
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
pub enum RenewError {
	/// The OAuth provider rejected the renewal.
	#[error("OAuth error `{error_code}`: {error_summary}.")]
	OAuth {
		/// Provider-assigned error code.
		error_code: String,
		/// Provider-supplied summary.
		error_summary: String,
		/// Key of the token whose renewal failed, added by the coordinator.
		token_key: Option<TokenKey>,
	},
	/// The enclosing SDK reported a local failure during the renewal.
	#[error("{detail}.")]
	Sdk {
		/// Structured failure payload.
		detail: Box<SdkFailure>,
		/// Key of the token whose renewal failed, added by the coordinator.
		token_key: Option<TokenKey>,
	},
}
impl RenewError {
	/// Builds an SDK-class error from a code and summary.
	pub fn sdk(error_code: impl Into<String>, error_summary: impl Into<String>) -> Self {
		Self::Sdk {
			detail: Box::new(SdkFailure {
				error_code: error_code.into(),
				error_summary: error_summary.into(),
				error_link: String::new(),
				error_id: String::new(),
				error_causes: Vec::new(),
			}),
			token_key: None,
		}
	}

	/// Tags the error with the token key whose renewal produced it.
	pub fn with_token_key(self, key: TokenKey) -> Self {
		match self {
			Self::OAuth { error_code, error_summary, .. } =>
				Self::OAuth { error_code, error_summary, token_key: Some(key) },
			Self::Sdk { detail, .. } => Self::Sdk { detail, token_key: Some(key) },
		}
	}

	/// Returns the tagged token key, if any.
	pub fn token_key(&self) -> Option<&TokenKey> {
		match self {
			Self::OAuth { token_key, .. } | Self::Sdk { token_key, .. } => token_key.as_ref(),
		}
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn storage_error_converts_into_manager_error() {
		let storage_error = StorageError::Unavailable;
		let error: Error = storage_error.clone().into();

		assert!(matches!(error, Error::Storage(_)));
		assert_eq!(error.to_string(), storage_error.to_string());
	}

	#[test]
	fn renew_error_tagging_preserves_class_and_payload() {
		let original = RenewError::OAuth {
			error_code: "invalid_grant".into(),
			error_summary: "The refresh token is no longer valid".into(),
			token_key: None,
		};
		let tagged = original.with_token_key(TokenKey::new("accessToken"));

		assert!(matches!(&tagged, RenewError::OAuth { error_code, .. } if error_code == "invalid_grant"));
		assert_eq!(tagged.token_key().map(TokenKey::as_str), Some("accessToken"));
	}

	#[test]
	fn invalid_token_reason_renders_field_names() {
		let error = Error::InvalidToken { reason: InvalidTokenReason::MalformedField { field: "claims" } };

		assert!(error.to_string().contains("`claims`"));
	}
}
