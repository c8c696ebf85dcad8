use std::sync::atomic::AtomicUsize;
use std::time::Duration;

use bidi_protocol::{LogEntry, NetworkEvent};
use serde_json::json;

use super::*;

/// Records wire traffic instead of talking to a remote end.
#[derive(Default)]
struct FakeWire {
	subscribes: Mutex<Vec<(EventName, Option<String>)>>,
	unsubscribes: Mutex<Vec<(Option<String>, EventName, Option<String>)>>,
	next_token: AtomicUsize,
	with_tokens: bool,
	fail_subscribe: bool,
	delay: Option<Duration>,
}

impl FakeWire {
	fn with_tokens() -> Self {
		Self {
			with_tokens: true,
			..Self::default()
		}
	}

	fn subscribe_count(&self) -> usize {
		self.subscribes.lock().len()
	}

	fn unsubscribe_count(&self) -> usize {
		self.unsubscribes.lock().len()
	}
}

impl SubscriptionWire for FakeWire {
	fn subscribe<'a>(&'a self, event: EventName, scope: Option<&'a str>) -> WireFuture<'a, Option<String>> {
		Box::pin(async move {
			if let Some(delay) = self.delay {
				tokio::time::sleep(delay).await;
			}
			if self.fail_subscribe {
				return Err(Error::Protocol {
					error: "invalid argument".to_string(),
					message: "no such event".to_string(),
					stacktrace: None,
				});
			}
			self.subscribes.lock().push((event, scope.map(str::to_string)));
			let n = self.next_token.fetch_add(1, Ordering::SeqCst);
			Ok(self.with_tokens.then(|| format!("sub-{n}")))
		})
	}

	fn unsubscribe<'a>(
		&'a self,
		token: Option<&'a str>,
		event: EventName,
		scope: Option<&'a str>,
	) -> WireFuture<'a, ()> {
		Box::pin(async move {
			self.unsubscribes.lock().push((
				token.map(str::to_string),
				event,
				scope.map(str::to_string),
			));
			Ok(())
		})
	}
}

fn event(method: &str, params: Value) -> Event {
	Event {
		method: method.to_string(),
		params,
	}
}

type Seen = Arc<Mutex<Vec<String>>>;

fn record(seen: &Seen, tag: &'static str) -> impl Fn(Value) -> std::result::Result<(), ListenerError> + Send + Sync + 'static {
	let seen = Arc::clone(seen);
	move |_| {
		seen.lock().push(tag.to_string());
		Ok(())
	}
}

#[tokio::test]
async fn test_shared_key_subscribes_once() {
	let wire = FakeWire::default();
	let dispatcher = Dispatcher::new();

	let first = dispatcher
		.add_listener(&wire, EventName::EntryAdded, None, |_: Value| Ok(()))
		.await
		.unwrap();
	let second = dispatcher
		.add_listener(&wire, EventName::EntryAdded, None, |_: Value| Ok(()))
		.await
		.unwrap();

	assert_eq!(wire.subscribe_count(), 1);
	assert_eq!(dispatcher.listener_count(EventName::EntryAdded, None), 2);
	assert_ne!(first.id(), second.id());

	assert!(dispatcher.remove_listener(&wire, &first).await.unwrap());
	assert_eq!(wire.unsubscribe_count(), 0);

	assert!(dispatcher.remove_listener(&wire, &second).await.unwrap());
	assert_eq!(wire.unsubscribe_count(), 1);
	assert_eq!(dispatcher.listener_count(EventName::EntryAdded, None), 0);

	// Removing again is a no-op on the wire.
	assert!(!dispatcher.remove_listener(&wire, &second).await.unwrap());
	assert_eq!(wire.unsubscribe_count(), 1);
}

#[tokio::test]
async fn test_distinct_scopes_subscribe_separately() {
	let wire = FakeWire::default();
	let dispatcher = Dispatcher::new();

	dispatcher
		.add_listener(&wire, EventName::ResponseStarted, Some("ctx-1"), |_: Value| Ok(()))
		.await
		.unwrap();
	dispatcher
		.add_listener(&wire, EventName::ResponseStarted, Some("ctx-2"), |_: Value| Ok(()))
		.await
		.unwrap();

	assert_eq!(
		*wire.subscribes.lock(),
		vec![
			(EventName::ResponseStarted, Some("ctx-1".to_string())),
			(EventName::ResponseStarted, Some("ctx-2".to_string())),
		]
	);
}

#[tokio::test]
async fn test_unsubscribe_uses_token_when_available() {
	let wire = FakeWire::with_tokens();
	let dispatcher = Dispatcher::new();

	let handle = dispatcher
		.add_listener(&wire, EventName::Load, Some("ctx-9"), |_: Value| Ok(()))
		.await
		.unwrap();
	dispatcher.remove_listener(&wire, &handle).await.unwrap();

	assert_eq!(
		*wire.unsubscribes.lock(),
		vec![(
			Some("sub-0".to_string()),
			EventName::Load,
			Some("ctx-9".to_string())
		)]
	);
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_adds_subscribe_once() {
	let wire = Arc::new(FakeWire {
		delay: Some(Duration::from_millis(50)),
		..FakeWire::default()
	});
	let dispatcher = Arc::new(Dispatcher::new());

	let tasks: Vec<_> = (0..8)
		.map(|_| {
			let wire = Arc::clone(&wire);
			let dispatcher = Arc::clone(&dispatcher);
			tokio::spawn(async move {
				dispatcher
					.add_listener(&*wire, EventName::BeforeRequestSent, None, |_: Value| Ok(()))
					.await
			})
		})
		.collect();

	for task in tasks {
		task.await.unwrap().unwrap();
	}

	assert_eq!(wire.subscribe_count(), 1);
	assert_eq!(dispatcher.listener_count(EventName::BeforeRequestSent, None), 8);
}

#[tokio::test]
async fn test_key_locks_released_when_keys_empty() {
	let wire = FakeWire::default();
	let dispatcher = Dispatcher::new();

	let mut handles = Vec::new();
	for ctx in ["ctx-1", "ctx-2", "ctx-3"] {
		for _ in 0..2 {
			handles.push(
				dispatcher
					.add_listener(&wire, EventName::Load, Some(ctx), |_: Value| Ok(()))
					.await
					.unwrap(),
			);
		}
	}
	assert_eq!(dispatcher.key_locks.len(), 3);

	dispatcher.remove_listener(&wire, &handles[0]).await.unwrap();
	assert_eq!(dispatcher.key_locks.len(), 3);

	for handle in &handles {
		dispatcher.remove_listener(&wire, handle).await.unwrap();
	}
	assert!(dispatcher.key_locks.is_empty());

	// Removing a stale handle leaves nothing behind either.
	dispatcher.remove_listener(&wire, &handles[0]).await.unwrap();
	assert!(dispatcher.key_locks.is_empty());
}

#[tokio::test]
async fn test_failed_subscribe_leaves_no_registration() {
	let wire = FakeWire {
		fail_subscribe: true,
		..FakeWire::default()
	};
	let dispatcher = Dispatcher::new();

	let result = dispatcher
		.add_listener(&wire, EventName::Load, None, |_: Value| Ok(()))
		.await;

	assert_eq!(result.unwrap_err().error_code(), Some("invalid argument"));
	assert_eq!(dispatcher.listener_count(EventName::Load, None), 0);
	assert!(dispatcher.key_locks.is_empty());

	dispatcher.dispatch(&event("browsingContext.load", json!({"context": "ctx"})));
	assert_eq!(dispatcher.stats().listener_failures, 0);
}

#[tokio::test]
async fn test_dispatch_projects_payload() {
	let wire = FakeWire::default();
	let dispatcher = Dispatcher::new();
	let received = Arc::new(Mutex::new(Vec::new()));

	let sink = Arc::clone(&received);
	dispatcher
		.add_listener(&wire, EventName::EntryAdded, None, move |entry: LogEntry| {
			sink.lock().push((entry.level, entry.text));
			Ok(())
		})
		.await
		.unwrap();

	dispatcher.dispatch(&event(
		"log.entryAdded",
		json!({"level": "warn", "text": "x"}),
	));

	assert_eq!(
		*received.lock(),
		vec![("warn".to_string(), "x".to_string())]
	);
	assert_eq!(dispatcher.stats().dispatched, 1);
}

#[tokio::test]
async fn test_scoped_listener_only_sees_its_context() {
	let wire = FakeWire::default();
	let dispatcher = Dispatcher::new();
	let seen = Seen::default();

	dispatcher
		.add_listener(&wire, EventName::ResponseStarted, Some("ctx-1"), record(&seen, "one"))
		.await
		.unwrap();
	dispatcher
		.add_listener(&wire, EventName::ResponseStarted, Some("ctx-2"), record(&seen, "two"))
		.await
		.unwrap();
	dispatcher
		.add_listener(&wire, EventName::ResponseStarted, None, record(&seen, "global"))
		.await
		.unwrap();

	dispatcher.dispatch(&event(
		"network.responseStarted",
		json!({"context": "ctx-1", "request": {"url": "https://example.com"}}),
	));
	assert_eq!(*seen.lock(), vec!["one", "global"]);

	seen.lock().clear();
	dispatcher.dispatch(&event(
		"network.responseStarted",
		json!({"request": {"url": "https://example.com"}}),
	));
	assert_eq!(*seen.lock(), vec!["global"]);
}

#[tokio::test]
async fn test_listeners_run_in_registration_order_across_keys() {
	let wire = FakeWire::default();
	let dispatcher = Dispatcher::new();
	let seen = Seen::default();

	dispatcher
		.add_listener(&wire, EventName::EntryAdded, Some("ctx"), record(&seen, "scoped-1"))
		.await
		.unwrap();
	dispatcher
		.add_listener(&wire, EventName::EntryAdded, None, record(&seen, "global-2"))
		.await
		.unwrap();
	dispatcher
		.add_listener(&wire, EventName::EntryAdded, Some("ctx"), record(&seen, "scoped-3"))
		.await
		.unwrap();

	dispatcher.dispatch(&event(
		"log.entryAdded",
		json!({"source": {"realm": "r", "context": "ctx"}, "text": "hi"}),
	));

	assert_eq!(*seen.lock(), vec!["scoped-1", "global-2", "scoped-3"]);
}

#[tokio::test]
async fn test_failing_listener_is_isolated() {
	let wire = FakeWire::default();
	let dispatcher = Dispatcher::new();
	let seen = Seen::default();

	dispatcher
		.add_listener(&wire, EventName::ResponseCompleted, None, |_: Value| {
			Err(ListenerError::failed("rejected"))
		})
		.await
		.unwrap();
	dispatcher
		.add_listener(&wire, EventName::ResponseCompleted, None, |_: Value| -> std::result::Result<(), ListenerError> {
			panic!("listener bug")
		})
		.await
		.unwrap();
	dispatcher
		.add_listener(&wire, EventName::ResponseCompleted, None, |_: NetworkEvent| Ok(()))
		.await
		.unwrap();
	dispatcher
		.add_listener(&wire, EventName::ResponseCompleted, None, record(&seen, "survivor"))
		.await
		.unwrap();

	dispatcher.dispatch(&event(
		"network.responseCompleted",
		json!({"isBlocked": "not a bool", "request": {"url": "u"}}),
	));

	assert_eq!(*seen.lock(), vec!["survivor"]);
	assert_eq!(dispatcher.stats().listener_failures, 3);
}

#[tokio::test]
async fn test_events_delivered_in_arrival_order() {
	let wire = FakeWire::default();
	let dispatcher = Dispatcher::new();

	let (_handle, mut rx) = dispatcher
		.listen::<LogEntry>(&wire, EventName::EntryAdded, None)
		.await
		.unwrap();

	for i in 0..20 {
		dispatcher.dispatch(&event("log.entryAdded", json!({"text": format!("m{i}")})));
	}

	for i in 0..20 {
		assert_eq!(rx.recv().await.unwrap().text, format!("m{i}"));
	}
}

#[tokio::test]
async fn test_unrecognized_event_is_counted() {
	let dispatcher = Dispatcher::new();

	dispatcher.dispatch(&event("bluetooth.requestDevicePromptUpdated", json!({})));

	let stats = dispatcher.stats();
	assert_eq!(stats.unrecognized, 1);
	assert_eq!(stats.dispatched, 0);
}

#[tokio::test]
async fn test_close_drops_listeners_and_events() {
	let wire = FakeWire::default();
	let dispatcher = Dispatcher::new();

	let (handle, mut rx) = dispatcher
		.listen::<Value>(&wire, EventName::Load, None)
		.await
		.unwrap();

	dispatcher.close();
	dispatcher.dispatch(&event("browsingContext.load", json!({"context": "c"})));

	assert_eq!(dispatcher.stats().dropped_after_close, 1);
	assert!(rx.recv().await.is_none());

	// No wire traffic after close.
	assert!(!dispatcher.remove_listener(&wire, &handle).await.unwrap());
	assert_eq!(wire.unsubscribe_count(), 0);

	let err = dispatcher
		.add_listener(&wire, EventName::Load, None, |_: Value| Ok(()))
		.await
		.unwrap_err();
	assert!(err.is_connection_closed());
}
