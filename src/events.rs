//! Lifecycle event contracts and the publish/subscribe bus shared with the SDK.

// std
use std::sync::atomic::{AtomicU64, Ordering};
// self
use crate::{_prelude::*, token::TokenKey};

/// Lifecycle events published by the manager.
///
/// Token payloads are the serialized JSON form rather than typed tokens: cross-tab
/// observation re-emits whatever another tab stored, and application subscribers on
/// the shared bus receive plain data either way.
#[derive(Clone, Debug, PartialEq)]
pub enum TokenEvent {
	/// A token appeared or changed under `key`.
	Added {
		/// Affected token slot.
		key: TokenKey,
		/// Serialized new token.
		token: Json,
	},
	/// The token stored under `key` was deleted.
	Removed {
		/// Affected token slot.
		key: TokenKey,
		/// Serialized prior token.
		token: Json,
	},
	/// A renewal produced a replacement token; always precedes the paired
	/// `Added`/`Removed`.
	Renewed {
		/// Affected token slot.
		key: TokenKey,
		/// Serialized replacement token.
		new_token: Json,
		/// Serialized replaced token.
		old_token: Json,
	},
	/// The token stored under `key` reached its effective expiry.
	Expired {
		/// Affected token slot.
		key: TokenKey,
		/// Serialized expired token.
		token: Json,
	},
	/// An asynchronous failure with no caller stack to surface through.
	Error {
		/// The failure.
		error: Error,
	},
}
impl TokenEvent {
	/// Channel this event is published on.
	pub fn kind(&self) -> EventKind {
		match self {
			Self::Added { .. } => EventKind::Added,
			Self::Removed { .. } => EventKind::Removed,
			Self::Renewed { .. } => EventKind::Renewed,
			Self::Expired { .. } => EventKind::Expired,
			Self::Error { .. } => EventKind::Error,
		}
	}
}

/// Event channels addressable by subscribers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EventKind {
	/// `added` lifecycle channel.
	Added,
	/// `removed` lifecycle channel.
	Removed,
	/// `renewed` lifecycle channel.
	Renewed,
	/// `expired` lifecycle channel.
	Expired,
	/// `error` channel.
	Error,
}
impl EventKind {
	/// Returns the channel name.
	pub const fn as_str(self) -> &'static str {
		match self {
			Self::Added => "added",
			Self::Removed => "removed",
			Self::Renewed => "renewed",
			Self::Expired => "expired",
			Self::Error => "error",
		}
	}

	/// All channels, for subscribers that want everything.
	pub const fn all() -> [Self; 5] {
		[Self::Added, Self::Removed, Self::Renewed, Self::Expired, Self::Error]
	}
}
impl Display for EventKind {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Opaque subscription handle returned by [`EventBus::on`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HandlerId(u64);

type Handler = Arc<dyn Fn(&TokenEvent) + Send + Sync>;

/// Named-channel publish/subscribe bus.
///
/// The bus is shared with the enclosing SDK: the manager publishes on the same
/// instance application subscribers listen on, so its lifecycle events are visible
/// directly. Handlers are invoked outside the registry lock, so a handler may call
/// back into the bus (or the manager) without deadlocking. The handler's context is
/// whatever its closure captures.
#[derive(Default)]
pub struct EventBus {
	next_id: AtomicU64,
	handlers: Mutex<HashMap<EventKind, Vec<(HandlerId, Handler)>>>,
}
impl EventBus {
	/// Creates an empty bus.
	pub fn new() -> Self {
		Self::default()
	}

	/// Registers `handler` on the `kind` channel.
	pub fn on(&self, kind: EventKind, handler: impl Fn(&TokenEvent) + Send + Sync + 'static) -> HandlerId {
		let id = HandlerId(self.next_id.fetch_add(1, Ordering::Relaxed));

		self.handlers.lock().entry(kind).or_default().push((id, Arc::new(handler)));

		id
	}

	/// Removes one handler (by id) or every handler on the `kind` channel.
	pub fn off(&self, kind: EventKind, id: Option<HandlerId>) {
		let mut handlers = self.handlers.lock();

		match (handlers.get_mut(&kind), id) {
			(Some(registered), Some(id)) => registered.retain(|(handler_id, _)| *handler_id != id),
			(Some(registered), None) => registered.clear(),
			(None, _) => (),
		}
	}

	/// Publishes `event` to every handler on its channel.
	pub fn emit(&self, event: &TokenEvent) {
		let targets: Vec<Handler> = self
			.handlers
			.lock()
			.get(&event.kind())
			.map(|registered| registered.iter().map(|(_, handler)| handler.clone()).collect())
			.unwrap_or_default();

		for handler in targets {
			handler(event);
		}
	}
}
impl Debug for EventBus {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		let counts: Vec<(EventKind, usize)> =
			self.handlers.lock().iter().map(|(kind, registered)| (*kind, registered.len())).collect();

		f.debug_struct("EventBus").field("handlers", &counts).finish()
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	fn added_fixture() -> TokenEvent {
		TokenEvent::Added { key: TokenKey::new("idToken"), token: Json::String("T".into()) }
	}

	#[test]
	fn handlers_receive_only_their_channel() {
		let bus = EventBus::new();
		let added = Arc::new(Mutex::new(0_u32));
		let removed = Arc::new(Mutex::new(0_u32));
		let added_count = added.clone();
		let removed_count = removed.clone();

		bus.on(EventKind::Added, move |_| *added_count.lock() += 1);
		bus.on(EventKind::Removed, move |_| *removed_count.lock() += 1);
		bus.emit(&added_fixture());

		assert_eq!(*added.lock(), 1);
		assert_eq!(*removed.lock(), 0);
	}

	#[test]
	fn off_removes_by_id_or_wholesale() {
		let bus = EventBus::new();
		let count = Arc::new(Mutex::new(0_u32));
		let first = count.clone();
		let second = count.clone();
		let first_id = bus.on(EventKind::Added, move |_| *first.lock() += 1);

		bus.on(EventKind::Added, move |_| *second.lock() += 10);
		bus.off(EventKind::Added, Some(first_id));
		bus.emit(&added_fixture());

		assert_eq!(*count.lock(), 10);

		bus.off(EventKind::Added, None);
		bus.emit(&added_fixture());

		assert_eq!(*count.lock(), 10);
	}

	#[test]
	fn handlers_may_reenter_the_bus() {
		let bus = Arc::new(EventBus::new());
		let count = Arc::new(Mutex::new(0_u32));
		let inner_count = count.clone();
		let reentrant = bus.clone();

		bus.on(EventKind::Added, move |_| {
			reentrant.emit(&TokenEvent::Error { error: Error::TooManyRenewRequests });
		});
		bus.on(EventKind::Error, move |_| *inner_count.lock() += 1);
		bus.emit(&added_fixture());

		assert_eq!(*count.lock(), 1);
	}
}
