//! Token data model: the shared envelope, the credential variants, and validation.

pub mod key;
pub mod scope;

pub use key::TokenKey;
pub use scope::{ScopeError, ScopeSet};

// crates.io
use serde::Serializer;
// self
use crate::{_prelude::*, error::InvalidTokenReason};

const FIELD_ID_TOKEN: &str = "idToken";
const FIELD_ACCESS_TOKEN: &str = "accessToken";
const FIELD_REFRESH_TOKEN: &str = "refreshToken";
const FIELD_CLAIMS: &str = "claims";
const FIELD_SCOPES: &str = "scopes";
const FIELD_EXPIRES_AT: &str = "expiresAt";

/// Redacted credential wrapper keeping sensitive material out of logs.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TokenSecret(String);
impl TokenSecret {
	/// Wraps a new credential string.
	pub fn new(value: impl Into<String>) -> Self {
		Self(value.into())
	}

	/// Returns the inner credential. Callers must avoid logging this string.
	pub fn expose(&self) -> &str {
		&self.0
	}
}
impl AsRef<str> for TokenSecret {
	fn as_ref(&self) -> &str {
		self.expose()
	}
}
impl Debug for TokenSecret {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_tuple("TokenSecret").field(&"<redacted>").finish()
	}
}
impl Display for TokenSecret {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str("<redacted>")
	}
}

/// The credential carried by a token, exactly one variant per token.
#[derive(Clone, Debug, PartialEq)]
pub enum TokenKind {
	/// OIDC ID token with its decoded claims.
	Id {
		/// Serialized ID token.
		id_token: TokenSecret,
		/// Decoded claim mapping.
		claims: JsonMap,
	},
	/// OAuth access token.
	Access {
		/// Serialized access token.
		access_token: TokenSecret,
	},
	/// OAuth refresh token.
	Refresh {
		/// Serialized refresh token.
		refresh_token: TokenSecret,
	},
}
impl TokenKind {
	/// Canonical token key this credential occupies in a bundle.
	pub const fn canonical_key(&self) -> &'static str {
		match self {
			Self::Id { .. } => FIELD_ID_TOKEN,
			Self::Access { .. } => FIELD_ACCESS_TOKEN,
			Self::Refresh { .. } => FIELD_REFRESH_TOKEN,
		}
	}
}

/// A stored token: one credential plus the shared `scopes`/`expiresAt` envelope.
///
/// Unknown fields read from storage are kept in the envelope and written back
/// untouched, so foreign annotations survive read-modify-write cycles.
#[derive(Clone, PartialEq)]
pub struct Token {
	kind: TokenKind,
	scopes: ScopeSet,
	expires_at: i64,
	extra: JsonMap,
}
impl Token {
	/// Returns a builder for assembling a validated token.
	pub fn builder() -> TokenBuilder {
		TokenBuilder::default()
	}

	/// The credential variant.
	pub fn kind(&self) -> &TokenKind {
		&self.kind
	}

	/// Granted scopes.
	pub fn scopes(&self) -> &ScopeSet {
		&self.scopes
	}

	/// Absolute expiry in Unix seconds, server-clock reference.
	pub fn expires_at(&self) -> i64 {
		self.expires_at
	}

	/// Fields carried through storage that the manager does not interpret.
	pub fn extra(&self) -> &JsonMap {
		&self.extra
	}

	/// Serialized form used for persistence and event payloads.
	pub fn to_json(&self) -> Json {
		let mut map = JsonMap::new();

		match &self.kind {
			TokenKind::Id { id_token, claims } => {
				map.insert(FIELD_ID_TOKEN.into(), Json::String(id_token.expose().into()));
				map.insert(FIELD_CLAIMS.into(), Json::Object(claims.clone()));
			},
			TokenKind::Access { access_token } => {
				map.insert(FIELD_ACCESS_TOKEN.into(), Json::String(access_token.expose().into()));
			},
			TokenKind::Refresh { refresh_token } => {
				map.insert(FIELD_REFRESH_TOKEN.into(), Json::String(refresh_token.expose().into()));
			},
		}

		map.insert(
			FIELD_SCOPES.into(),
			Json::Array(self.scopes.iter().map(|s| Json::String(s.into())).collect()),
		);
		map.insert(FIELD_EXPIRES_AT.into(), Json::from(self.expires_at));

		for (name, value) in &self.extra {
			map.insert(name.clone(), value.clone());
		}

		Json::Object(map)
	}
}
impl Debug for Token {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("Token")
			.field("kind", &self.kind.canonical_key())
			.field("scopes", &self.scopes)
			.field("expires_at", &self.expires_at)
			.field("extra", &self.extra.keys().collect::<Vec<_>>())
			.finish()
	}
}
impl Serialize for Token {
	fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
	where
		S: Serializer,
	{
		self.to_json().serialize(serializer)
	}
}
impl<'a> TryFrom<&'a Json> for Token {
	type Error = Error;

	fn try_from(value: &'a Json) -> Result<Self> {
		let object = value.as_object().ok_or_else(|| invalid(InvalidTokenReason::NotAnObject))?;
		let scopes_value =
			object.get(FIELD_SCOPES).ok_or_else(|| invalid(InvalidTokenReason::MissingScopes))?;
		let scopes = parse_scopes(scopes_value)?;
		let expires_at = object
			.get(FIELD_EXPIRES_AT)
			.ok_or_else(|| invalid(InvalidTokenReason::MissingExpiresAt))?
			.as_i64()
			.ok_or_else(|| invalid(InvalidTokenReason::MalformedField { field: FIELD_EXPIRES_AT }))?;
		let kind = parse_kind(object)?;
		let consumed = [
			FIELD_ID_TOKEN,
			FIELD_ACCESS_TOKEN,
			FIELD_REFRESH_TOKEN,
			FIELD_CLAIMS,
			FIELD_SCOPES,
			FIELD_EXPIRES_AT,
		];
		let extra = object
			.iter()
			.filter(|(name, _)| !consumed.contains(&name.as_str()))
			.map(|(name, value)| (name.clone(), value.clone()))
			.collect();

		Ok(Self { kind, scopes, expires_at, extra })
	}
}
impl TryFrom<Json> for Token {
	type Error = Error;

	fn try_from(value: Json) -> Result<Self> {
		Self::try_from(&value)
	}
}

fn invalid(reason: InvalidTokenReason) -> Error {
	Error::InvalidToken { reason }
}

fn parse_scopes(value: &Json) -> Result<ScopeSet> {
	let entries = value
		.as_array()
		.ok_or_else(|| invalid(InvalidTokenReason::MalformedField { field: FIELD_SCOPES }))?
		.iter()
		.map(|entry| entry.as_str().map(str::to_owned))
		.collect::<Option<Vec<_>>>()
		.ok_or_else(|| invalid(InvalidTokenReason::MalformedField { field: FIELD_SCOPES }))?;
	let scopes = ScopeSet::new(entries)
		.map_err(|_| invalid(InvalidTokenReason::MalformedField { field: FIELD_SCOPES }))?;

	if scopes.is_empty() {
		return Err(invalid(InvalidTokenReason::EmptyScopes));
	}

	Ok(scopes)
}

fn parse_kind(object: &JsonMap) -> Result<TokenKind> {
	let credential_of = |field: &'static str| -> Result<Option<TokenSecret>> {
		match object.get(field) {
			None => Ok(None),
			Some(Json::String(value)) => Ok(Some(TokenSecret::new(value))),
			Some(_) => Err(invalid(InvalidTokenReason::MalformedField { field })),
		}
	};
	let id_token = credential_of(FIELD_ID_TOKEN)?;
	let access_token = credential_of(FIELD_ACCESS_TOKEN)?;
	let refresh_token = credential_of(FIELD_REFRESH_TOKEN)?;
	let present =
		[id_token.is_some(), access_token.is_some(), refresh_token.is_some()].iter().filter(|p| **p).count();

	if present > 1 {
		return Err(invalid(InvalidTokenReason::ConflictingCredentials));
	}
	if let Some(id_token) = id_token {
		let claims = match object.get(FIELD_CLAIMS) {
			None => JsonMap::new(),
			Some(Json::Object(claims)) => claims.clone(),
			Some(_) => return Err(invalid(InvalidTokenReason::MalformedField { field: FIELD_CLAIMS })),
		};

		return Ok(TokenKind::Id { id_token, claims });
	}
	if let Some(access_token) = access_token {
		return Ok(TokenKind::Access { access_token });
	}
	if let Some(refresh_token) = refresh_token {
		return Ok(TokenKind::Refresh { refresh_token });
	}

	Err(invalid(InvalidTokenReason::MissingCredential))
}

/// Builder for [`Token`].
#[derive(Clone, Debug, Default)]
pub struct TokenBuilder {
	id_token: Option<TokenSecret>,
	claims: Option<JsonMap>,
	access_token: Option<TokenSecret>,
	refresh_token: Option<TokenSecret>,
	scopes: Option<ScopeSet>,
	expires_at: Option<i64>,
	extra: JsonMap,
}
impl TokenBuilder {
	/// Provides the ID token credential.
	pub fn id_token(mut self, value: impl Into<String>) -> Self {
		self.id_token = Some(TokenSecret::new(value));

		self
	}

	/// Provides the decoded ID token claims.
	pub fn claims(mut self, claims: JsonMap) -> Self {
		self.claims = Some(claims);

		self
	}

	/// Provides the access token credential.
	pub fn access_token(mut self, value: impl Into<String>) -> Self {
		self.access_token = Some(TokenSecret::new(value));

		self
	}

	/// Provides the refresh token credential.
	pub fn refresh_token(mut self, value: impl Into<String>) -> Self {
		self.refresh_token = Some(TokenSecret::new(value));

		self
	}

	/// Sets the granted scopes.
	pub fn scopes(mut self, scopes: ScopeSet) -> Self {
		self.scopes = Some(scopes);

		self
	}

	/// Sets the absolute expiry in Unix seconds.
	pub fn expires_at(mut self, expires_at: i64) -> Self {
		self.expires_at = Some(expires_at);

		self
	}

	/// Attaches an uninterpreted field carried through storage.
	pub fn extra_field(mut self, name: impl Into<String>, value: Json) -> Self {
		self.extra.insert(name.into(), value);

		self
	}

	/// Consumes the builder and produces a validated [`Token`].
	pub fn build(self) -> Result<Token> {
		let scopes = self.scopes.ok_or_else(|| invalid(InvalidTokenReason::MissingScopes))?;

		if scopes.is_empty() {
			return Err(invalid(InvalidTokenReason::EmptyScopes));
		}

		let expires_at = self.expires_at.ok_or_else(|| invalid(InvalidTokenReason::MissingExpiresAt))?;
		let present = [self.id_token.is_some(), self.access_token.is_some(), self.refresh_token.is_some()]
			.iter()
			.filter(|p| **p)
			.count();

		if present > 1 {
			return Err(invalid(InvalidTokenReason::ConflictingCredentials));
		}

		let kind = if let Some(id_token) = self.id_token {
			TokenKind::Id { id_token, claims: self.claims.unwrap_or_default() }
		} else if let Some(access_token) = self.access_token {
			TokenKind::Access { access_token }
		} else if let Some(refresh_token) = self.refresh_token {
			TokenKind::Refresh { refresh_token }
		} else {
			return Err(invalid(InvalidTokenReason::MissingCredential));
		};

		Ok(Token { kind, scopes, expires_at, extra: self.extra })
	}
}
