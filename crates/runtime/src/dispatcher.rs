//! Event dispatcher and subscription registry.
//!
//! Listeners register for an [`EventName`], optionally narrowed to one browsing
//! context (the *scope*). All listeners sharing a `(event, scope)` pair share one
//! remote subscription: the first registration for a key issues
//! `session.subscribe`, the last removal issues `session.unsubscribe`. A per-key
//! async lock serializes those transitions, so concurrent registrations for the
//! same key still produce a single subscribe.
//!
//! Dispatch is synchronous and runs on the router's read path. For each inbound
//! event the dispatcher extracts the payload's context, collects the global and
//! matching scoped listeners, orders them by registration and invokes each one
//! in isolation.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use bidi_protocol::{Decode, Event, EventName, project, scope};
use dashmap::DashMap;
use indexmap::IndexMap;
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::{Mutex as AsyncMutex, mpsc};
use tracing::{debug, error, warn};

use crate::error::{Error, Result};
use crate::handlers::{HandlerEntry, HandlerFn, HandlerId, HandlerIds, ListenerError, invoke_isolated};

/// Boxed future returned by [`SubscriptionWire`] operations.
pub type WireFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + Send + 'a>>;

/// Remote side of subscription management.
///
/// Implemented by [`Connection`](crate::Connection), which routes both requests
/// through its command correlator.
pub trait SubscriptionWire: Send + Sync {
	/// Issues `session.subscribe`, returning the subscription id if the endpoint
	/// provides one.
	fn subscribe<'a>(&'a self, event: EventName, scope: Option<&'a str>) -> WireFuture<'a, Option<String>>;

	/// Issues `session.unsubscribe`, by `token` when present.
	fn unsubscribe<'a>(
		&'a self,
		token: Option<&'a str>,
		event: EventName,
		scope: Option<&'a str>,
	) -> WireFuture<'a, ()>;
}

/// Registry key: event name plus optional context scope.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SubscriptionKey {
	pub event: EventName,
	pub scope: Option<String>,
}

impl SubscriptionKey {
	pub fn new(event: EventName, scope: Option<&str>) -> Self {
		Self {
			event,
			scope: scope.map(str::to_string),
		}
	}

	pub fn global(event: EventName) -> Self {
		Self { event, scope: None }
	}
}

/// Identifies one registered listener.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ListenerHandle {
	id: HandlerId,
	key: SubscriptionKey,
}

impl ListenerHandle {
	pub fn id(&self) -> HandlerId {
		self.id
	}

	pub fn event(&self) -> EventName {
		self.key.event
	}

	pub fn scope(&self) -> Option<&str> {
		self.key.scope.as_deref()
	}
}

/// Listeners and wire state for one [`SubscriptionKey`].
struct Registration {
	listeners: IndexMap<HandlerId, HandlerEntry<Value>>,
	/// Subscription id returned by the endpoint, if any.
	token: Option<String>,
}

/// Counters exposed for diagnostics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatcherStats {
	/// Events matched against the registry.
	pub dispatched: u64,
	/// Events dropped because their name is not in the catalogue.
	pub unrecognized: u64,
	/// Listener invocations that returned an error or panicked.
	pub listener_failures: u64,
	/// Events dropped because the dispatcher was closed.
	pub dropped_after_close: u64,
}

#[derive(Default)]
struct Counters {
	dispatched: AtomicU64,
	unrecognized: AtomicU64,
	listener_failures: AtomicU64,
	dropped_after_close: AtomicU64,
}

/// Subscription registry and event fan-out for one connection.
#[derive(Default)]
pub struct Dispatcher {
	registry: Mutex<HashMap<SubscriptionKey, Registration>>,
	key_locks: DashMap<SubscriptionKey, Arc<AsyncMutex<()>>>,
	ids: HandlerIds,
	closed: AtomicBool,
	counters: Counters,
}

impl Dispatcher {
	pub fn new() -> Self {
		Self::default()
	}

	/// Registers `callback` for `event`, subscribing on the wire if this is the
	/// first listener for `(event, scope)`.
	///
	/// Each payload is projected into `T` before the callback runs; a projection
	/// failure is reported like a listener error.
	pub async fn add_listener<T, F>(
		&self,
		wire: &dyn SubscriptionWire,
		event: EventName,
		scope: Option<&str>,
		callback: F,
	) -> Result<ListenerHandle>
	where
		T: Decode + 'static,
		F: Fn(T) -> std::result::Result<(), ListenerError> + Send + Sync + 'static,
	{
		let handler: HandlerFn<Value> = Arc::new(move |params: &Value| callback(project::<T>(params)?));
		self.add_erased(wire, SubscriptionKey::new(event, scope), handler)
			.await
	}

	/// Registers a channel-backed listener.
	///
	/// Projected payloads are delivered in arrival order. The channel closes when
	/// the listener is removed or the dispatcher is closed.
	pub async fn listen<T>(
		&self,
		wire: &dyn SubscriptionWire,
		event: EventName,
		scope: Option<&str>,
	) -> Result<(ListenerHandle, mpsc::UnboundedReceiver<T>)>
	where
		T: Decode + Send + 'static,
	{
		let (tx, rx) = mpsc::unbounded_channel();
		let handle = self
			.add_listener(wire, event, scope, move |value: T| {
				if tx.send(value).is_err() {
					debug!(%event, "Listener channel receiver dropped");
				}
				Ok(())
			})
			.await?;
		Ok((handle, rx))
	}

	async fn add_erased(
		&self,
		wire: &dyn SubscriptionWire,
		key: SubscriptionKey,
		handler: HandlerFn<Value>,
	) -> Result<ListenerHandle> {
		let lock = self.key_lock(&key);
		let _guard = lock.lock().await;

		if self.is_closed() {
			return Err(Error::ConnectionClosed);
		}

		let id = self.ids.next();
		let entry = HandlerEntry {
			id,
			meta: (),
			handler,
		};

		let first = {
			let mut registry = self.registry.lock();
			match registry.get_mut(&key) {
				Some(registration) => {
					registration.listeners.insert(id, entry);
					false
				}
				None => {
					let mut listeners = IndexMap::new();
					listeners.insert(id, entry);
					registry.insert(
						key.clone(),
						Registration {
							listeners,
							token: None,
						},
					);
					true
				}
			}
		};

		if first {
			debug!(event = %key.event, scope = ?key.scope, "Subscribing");
			match wire.subscribe(key.event, key.scope.as_deref()).await {
				Ok(token) => {
					if let Some(registration) = self.registry.lock().get_mut(&key) {
						registration.token = token;
					}
				}
				Err(e) => {
					self.registry.lock().remove(&key);
					self.release_key_lock(&key, &lock);
					return Err(e);
				}
			}
		}

		Ok(ListenerHandle { id, key })
	}

	/// Removes a listener, unsubscribing on the wire if it was the last one for
	/// its key.
	///
	/// Returns `false` if the handle was not registered (already removed).
	pub async fn remove_listener(&self, wire: &dyn SubscriptionWire, handle: &ListenerHandle) -> Result<bool> {
		let key = &handle.key;
		let lock = self.key_lock(key);
		let _guard = lock.lock().await;

		let (removed, emptied) = {
			let mut registry = self.registry.lock();
			match registry.get_mut(key) {
				None => (false, None),
				Some(registration) => {
					let removed = registration.listeners.shift_remove(&handle.id).is_some();
					if registration.listeners.is_empty() {
						(removed, registry.remove(key))
					} else {
						(removed, None)
					}
				}
			}
		};

		let unsubscribed = match emptied {
			Some(_) if self.is_closed() => {
				debug!(event = %key.event, "Skipping unsubscribe on closed connection");
				Ok(())
			}
			Some(registration) => {
				debug!(event = %key.event, scope = ?key.scope, "Unsubscribing");
				wire.unsubscribe(registration.token.as_deref(), key.event, key.scope.as_deref())
					.await
			}
			None => Ok(()),
		};

		if !self.registry.lock().contains_key(key) {
			self.release_key_lock(key, &lock);
		}
		unsubscribed?;
		Ok(removed)
	}

	/// Delivers one inbound event to every matching listener.
	pub fn dispatch(&self, event: &Event) {
		if self.is_closed() {
			self.counters.dropped_after_close.fetch_add(1, Ordering::Relaxed);
			debug!(method = %event.method, "Dropping event after close");
			return;
		}

		let Some(name) = EventName::from_name(&event.method) else {
			self.counters.unrecognized.fetch_add(1, Ordering::Relaxed);
			warn!(method = %event.method, "Dropping event with unrecognized name");
			return;
		};

		let context = scope::context_id(name, &event.params);
		let mut targets: Vec<(HandlerId, HandlerFn<Value>)> = {
			let registry = self.registry.lock();
			let global = registry.get(&SubscriptionKey::global(name));
			let scoped = context
				.as_ref()
				.and_then(|ctx| registry.get(&SubscriptionKey::new(name, Some(ctx.as_str()))));
			global
				.into_iter()
				.chain(scoped)
				.flat_map(|registration| registration.listeners.values())
				.map(|entry| (entry.id, Arc::clone(&entry.handler)))
				.collect()
		};
		targets.sort_by_key(|(id, _)| *id);

		self.counters.dispatched.fetch_add(1, Ordering::Relaxed);
		debug!(event = %name, context = ?context, listeners = targets.len(), "Dispatching event");

		for (id, handler) in targets {
			if let Err(e) = invoke_isolated(&handler, &event.params) {
				self.counters.listener_failures.fetch_add(1, Ordering::Relaxed);
				error!(event = %name, listener = id, error = %e, "Event listener failed");
			}
		}
	}

	/// Drops every listener and rejects further registrations and events.
	pub fn close(&self) {
		if self.closed.swap(true, Ordering::SeqCst) {
			return;
		}
		let registrations = std::mem::take(&mut *self.registry.lock());
		self.key_locks.clear();
		debug!(keys = registrations.len(), "Dispatcher closed");
	}

	pub fn is_closed(&self) -> bool {
		self.closed.load(Ordering::SeqCst)
	}

	/// Number of listeners currently registered under `(event, scope)`.
	pub fn listener_count(&self, event: EventName, scope: Option<&str>) -> usize {
		self.registry
			.lock()
			.get(&SubscriptionKey::new(event, scope))
			.map_or(0, |registration| registration.listeners.len())
	}

	pub fn stats(&self) -> DispatcherStats {
		DispatcherStats {
			dispatched: self.counters.dispatched.load(Ordering::Relaxed),
			unrecognized: self.counters.unrecognized.load(Ordering::Relaxed),
			listener_failures: self.counters.listener_failures.load(Ordering::Relaxed),
			dropped_after_close: self.counters.dropped_after_close.load(Ordering::Relaxed),
		}
	}

	fn key_lock(&self, key: &SubscriptionKey) -> Arc<AsyncMutex<()>> {
		Arc::clone(self.key_locks.entry(key.clone()).or_default().value())
	}

	/// Drops the lock for an emptied key unless another task is waiting on it.
	///
	/// Called with `lock` held: the map and the caller own the only two
	/// references when nobody else is queued.
	fn release_key_lock(&self, key: &SubscriptionKey, lock: &Arc<AsyncMutex<()>>) {
		self.key_locks.remove_if(key, |_, held| {
			Arc::ptr_eq(held, lock) && Arc::strong_count(held) == 2
		});
	}
}

impl std::fmt::Debug for Dispatcher {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Dispatcher")
			.field("keys", &self.registry.lock().len())
			.field("closed", &self.is_closed())
			.field("stats", &self.stats())
			.finish()
	}
}

#[cfg(test)]
mod tests;
