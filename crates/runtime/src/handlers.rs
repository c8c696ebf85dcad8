//! Generic listener infrastructure.
//!
//! Listeners are stored as [`HandlerEntry<E, M>`] values in an [`IndexMap`],
//! which gives O(1) removal and stable insertion order. Invocation goes
//! through [`invoke_isolated`], so a failing or panicking listener never
//! affects its siblings or the caller.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use bidi_protocol::ProjectionError;
use indexmap::IndexMap;
use parking_lot::Mutex;
use thiserror::Error;
use tracing::error;

/// Identifier for a registered listener. Increases with registration order.
pub type HandlerId = u64;

/// Allocator of [`HandlerId`]s, one per registry.
#[derive(Debug)]
pub struct HandlerIds(AtomicU64);

impl HandlerIds {
	pub const fn new() -> Self {
		Self(AtomicU64::new(1))
	}

	pub fn next(&self) -> HandlerId {
		self.0.fetch_add(1, Ordering::SeqCst)
	}
}

impl Default for HandlerIds {
	fn default() -> Self {
		Self::new()
	}
}

/// Failure reported by a listener.
#[derive(Debug, Error)]
pub enum ListenerError {
	/// The event payload could not be projected into the listener's shape.
	#[error("payload projection failed: {0}")]
	Projection(#[from] ProjectionError),

	/// The listener rejected the event.
	#[error("{0}")]
	Failed(String),

	/// The listener panicked.
	#[error("listener panicked: {0}")]
	Panicked(String),
}

impl ListenerError {
	pub fn failed(message: impl Into<String>) -> Self {
		ListenerError::Failed(message.into())
	}
}

/// Synchronous listener: `&E` → `Result<(), ListenerError>`.
pub type HandlerFn<E> = Arc<dyn Fn(&E) -> Result<(), ListenerError> + Send + Sync>;

/// Listener entry with optional metadata `M`.
pub struct HandlerEntry<E, M = ()> {
	pub id: HandlerId,
	pub meta: M,
	pub handler: HandlerFn<E>,
}

impl<E, M: Clone> Clone for HandlerEntry<E, M> {
	fn clone(&self) -> Self {
		Self {
			id: self.id,
			meta: self.meta.clone(),
			handler: Arc::clone(&self.handler),
		}
	}
}

/// Shared listener storage.
pub type HandlerMap<E, M = ()> = Arc<Mutex<IndexMap<HandlerId, HandlerEntry<E, M>>>>;

/// Creates an empty [`HandlerMap`].
pub fn handler_map<E, M>() -> HandlerMap<E, M> {
	Arc::new(Mutex::new(IndexMap::new()))
}

/// Invokes `handler`, converting a panic into [`ListenerError::Panicked`].
pub fn invoke_isolated<E>(handler: &HandlerFn<E>, event: &E) -> Result<(), ListenerError> {
	match catch_unwind(AssertUnwindSafe(|| handler(event))) {
		Ok(result) => result,
		Err(payload) => {
			let message = payload
				.downcast_ref::<&str>()
				.map(|s| s.to_string())
				.or_else(|| payload.downcast_ref::<String>().cloned())
				.unwrap_or_else(|| "<non-string panic payload>".to_string());
			Err(ListenerError::Panicked(message))
		}
	}
}

/// Invokes every handler in `map` in insertion order.
///
/// The map lock is released before any handler runs, so handlers may register
/// or remove listeners. Returns the number of handlers that failed.
pub fn emit<E, M>(map: &HandlerMap<E, M>, event: &E) -> usize {
	let handlers: Vec<(HandlerId, HandlerFn<E>)> = map
		.lock()
		.values()
		.map(|entry| (entry.id, Arc::clone(&entry.handler)))
		.collect();

	let mut failures = 0;
	for (id, handler) in handlers {
		if let Err(e) = invoke_isolated(&handler, event) {
			failures += 1;
			error!(handler = id, error = %e, "Listener failed");
		}
	}
	failures
}

/// RAII handle that unregisters a listener on drop.
///
/// Holds a weak reference to the handler map, so dropping it after the owning
/// connection is gone is a no-op.
pub struct Subscription {
	id: HandlerId,
	dropper: Option<Arc<dyn Fn(HandlerId) + Send + Sync>>,
}

impl Subscription {
	/// Creates a subscription with a custom dropper function.
	pub fn new(id: HandlerId, dropper: Arc<dyn Fn(HandlerId) + Send + Sync>) -> Self {
		Self {
			id,
			dropper: Some(dropper),
		}
	}

	/// Creates a subscription from a handler map using a weak reference.
	pub fn from_handler_map<E, M>(id: HandlerId, handlers: &HandlerMap<E, M>) -> Self
	where
		E: Send + Sync + 'static,
		M: Send + Sync + 'static,
	{
		let weak: Weak<Mutex<IndexMap<HandlerId, HandlerEntry<E, M>>>> = Arc::downgrade(handlers);
		let dropper = Arc::new(move |id: HandlerId| {
			if let Some(map) = weak.upgrade() {
				map.lock().shift_remove(&id);
			}
		});
		Self::new(id, dropper)
	}

	pub fn id(&self) -> HandlerId {
		self.id
	}

	/// Explicitly unsubscribes. Equivalent to dropping.
	pub fn unsubscribe(mut self) {
		if let Some(dropper) = self.dropper.take() {
			(dropper)(self.id);
		}
	}
}

impl Drop for Subscription {
	fn drop(&mut self) {
		if let Some(dropper) = self.dropper.take() {
			(dropper)(self.id);
		}
	}
}

impl std::fmt::Debug for Subscription {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Subscription")
			.field("id", &self.id)
			.field("active", &self.dropper.is_some())
			.finish()
	}
}

#[cfg(test)]
mod tests {
	use std::sync::atomic::AtomicUsize;

	use super::*;

	fn insert<E>(map: &HandlerMap<E>, id: HandlerId, handler: HandlerFn<E>) {
		map.lock().insert(
			id,
			HandlerEntry {
				id,
				meta: (),
				handler,
			},
		);
	}

	#[test]
	fn test_handler_ids_increment() {
		let ids = HandlerIds::new();
		let id1 = ids.next();
		let id2 = ids.next();
		assert_eq!(id1, 1);
		assert!(id2 > id1);
	}

	#[test]
	fn test_emit_isolates_failures() {
		let map: HandlerMap<String> = handler_map();
		let seen = Arc::new(Mutex::new(Vec::new()));

		let log = Arc::clone(&seen);
		insert(
			&map,
			1,
			Arc::new(move |e: &String| -> Result<(), ListenerError> {
				log.lock().push(format!("first:{e}"));
				Ok(())
			}),
		);
		insert(
			&map,
			2,
			Arc::new(|_: &String| -> Result<(), ListenerError> {
				Err(ListenerError::failed("nope"))
			}),
		);
		insert(
			&map,
			3,
			Arc::new(|_: &String| -> Result<(), ListenerError> { panic!("boom") }),
		);
		let log = Arc::clone(&seen);
		insert(
			&map,
			4,
			Arc::new(move |e: &String| -> Result<(), ListenerError> {
				log.lock().push(format!("last:{e}"));
				Ok(())
			}),
		);

		let failures = emit(&map, &"evt".to_string());

		assert_eq!(failures, 2);
		assert_eq!(*seen.lock(), vec!["first:evt", "last:evt"]);
	}

	#[test]
	fn test_invoke_isolated_reports_panic_message() {
		let handler: HandlerFn<u32> =
			Arc::new(|n: &u32| -> Result<(), ListenerError> { panic!("bad value {n}") });
		match invoke_isolated(&handler, &7) {
			Err(ListenerError::Panicked(message)) => assert_eq!(message, "bad value 7"),
			other => panic!("Expected Panicked, got {other:?}"),
		}
	}

	#[test]
	fn test_subscription_unsubscribe() {
		let calls = Arc::new(AtomicUsize::new(0));
		let counter = Arc::clone(&calls);
		let dropper = Arc::new(move |_id: HandlerId| {
			counter.fetch_add(1, Ordering::SeqCst);
		});

		let sub = Subscription::new(1, dropper);
		assert_eq!(calls.load(Ordering::SeqCst), 0);

		sub.unsubscribe();
		assert_eq!(calls.load(Ordering::SeqCst), 1);
	}

	#[test]
	fn test_subscription_from_handler_map() {
		let map: HandlerMap<String> = handler_map();
		insert(&map, 5, Arc::new(|_: &String| -> Result<(), ListenerError> { Ok(()) }));
		assert_eq!(map.lock().len(), 1);

		{
			let _sub = Subscription::from_handler_map(5, &map);
		}

		assert!(map.lock().is_empty());
	}

	#[test]
	fn test_subscription_weak_reference() {
		let map: HandlerMap<String> = handler_map();
		insert(&map, 1, Arc::new(|_: &String| -> Result<(), ListenerError> { Ok(()) }));

		let sub = Subscription::from_handler_map(1, &map);
		drop(map);

		// Dropping after the map is gone must not panic.
		drop(sub);
	}
}
