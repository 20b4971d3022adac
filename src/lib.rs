//! Client-side OAuth/OIDC token manager—pluggable persistence with graceful fallback,
//! per-token expiration scheduling, single-flight renewal, and cross-tab synchronization
//! in one crate built for embedding into a larger authentication SDK.

#![deny(clippy::all, missing_docs, unused_crate_dependencies)]

pub mod clock;
pub mod error;
pub mod events;
pub mod host;
pub mod manager;
pub mod obs;
pub mod rate_limit;
pub mod renew;
pub mod scheduler;
pub mod storage;
pub mod store;
pub mod sync;
pub mod token;
#[cfg(any(test, feature = "test"))]
pub mod _preludet;

#[cfg(test)]
use oidc_token_manager as _;

mod _prelude {
	pub use std::{
		collections::{BTreeMap, HashMap, VecDeque},
		fmt::{Debug, Display, Formatter, Result as FmtResult},
		future::Future,
		pin::Pin,
		str::FromStr,
		sync::Arc,
		time::Duration as StdDuration,
	};

	pub use parking_lot::{Mutex, RwLock};
	pub use serde::{Deserialize, Serialize};
	pub use serde_json::Value as Json;
	/// A JSON object map, as used for token claims and extra fields.
	pub type JsonMap = serde_json::Map<String, serde_json::Value>;
	pub use thiserror::Error as ThisError;
	pub use time::OffsetDateTime;

	pub use crate::error::{Error, Result};
}

pub use url;
