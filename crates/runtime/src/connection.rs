//! Command correlation and inbound routing for one BiDi connection.
//!
//! # Message Flow
//!
//! 1. A caller invokes [`Connection::call`] with a method and params
//! 2. The connection allocates a unique id, registers a pending slot and queues
//!    the serialized frame for the writer task
//! 3. The caller awaits the slot, bounded by the command timeout
//! 4. The router ([`Connection::run`]) receives frames one at a time, in
//!    arrival order, and classifies each as response, error or event
//! 5. Responses resolve their slot; error frames go through the retry policy;
//!    events go to the [`Dispatcher`]
//!
//! Every slot resolves exactly once: with a result, a protocol error, a
//! timeout, or [`Error::ConnectionClosed`] when the connection shuts down.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use bidi_protocol::{
	Command, Decode, ErrorFrame, EventName, Message, Response, SUBSCRIBE, SubscribeParams,
	SubscribeResult, UNSUBSCRIBE, UnsubscribeParams, project,
};
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::{Notify, mpsc, oneshot};
use tokio::time::Instant;
use tracing::{debug, error, warn};

use crate::config::ConnectionConfig;
use crate::dispatcher::{Dispatcher, DispatcherStats, ListenerHandle, SubscriptionWire, WireFuture};
use crate::error::{Error, Result};
use crate::handlers::{
	HandlerEntry, HandlerIds, HandlerMap, ListenerError, Subscription, emit, handler_map,
};
use crate::retry::RetryDecision;
use crate::transport::{Transport, TransportParts, TransportReceiver};

/// A command awaiting its response.
struct PendingCommand {
	method: String,
	/// Serialized frame, re-sent verbatim on retry.
	frame: String,
	first_sent: Instant,
	retries: u32,
	tx: oneshot::Sender<Result<Value>>,
}

type PendingMap = Mutex<HashMap<u64, PendingCommand>>;

/// Removes the pending slot when a call future completes or is dropped.
struct PendingGuard<'a> {
	id: u64,
	pending: &'a PendingMap,
}

impl Drop for PendingGuard<'_> {
	fn drop(&mut self) {
		if self.pending.lock().remove(&self.id).is_some() {
			debug!(id = self.id, "Removed abandoned pending command");
		}
	}
}

enum Outbound {
	Frame(String),
	Close,
}

/// Halves consumed by [`Connection::run`].
struct RunParts {
	sender: Box<dyn Transport>,
	receiver: Box<dyn TransportReceiver>,
	message_rx: mpsc::UnboundedReceiver<Value>,
	outbound_rx: mpsc::UnboundedReceiver<Outbound>,
}

/// How an error frame is handled.
enum ErrorRoute {
	/// The id has no live slot: expired, abandoned, or a `send` id.
	Stale,
	Retry { frame: String, retries: u32 },
	Fail(PendingCommand),
}

/// BiDi connection: command correlator, inbound router and event dispatcher.
///
/// Shared as `Arc<Connection>`; [`run`](Self::run) must be driven (usually in a
/// spawned task) for any call to complete.
pub struct Connection {
	/// Last allocated command id; ids start at 1.
	last_id: AtomicU64,
	pending: PendingMap,
	outbound_tx: mpsc::UnboundedSender<Outbound>,
	run_parts: Mutex<Option<RunParts>>,
	dispatcher: Dispatcher,
	error_handlers: HandlerMap<ErrorFrame>,
	error_handler_ids: HandlerIds,
	config: ConnectionConfig,
	closed: AtomicBool,
	shutdown: Notify,
}

impl Connection {
	/// Creates a connection with the default configuration.
	pub fn new(parts: TransportParts) -> Self {
		Self::with_config(parts, ConnectionConfig::default())
	}

	pub fn with_config(parts: TransportParts, config: ConnectionConfig) -> Self {
		let TransportParts {
			sender,
			receiver,
			message_rx,
		} = parts;
		let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();

		Self {
			last_id: AtomicU64::new(0),
			pending: Mutex::new(HashMap::new()),
			outbound_tx,
			run_parts: Mutex::new(Some(RunParts {
				sender,
				receiver,
				message_rx,
				outbound_rx,
			})),
			dispatcher: Dispatcher::new(),
			error_handlers: handler_map(),
			error_handler_ids: HandlerIds::new(),
			config,
			closed: AtomicBool::new(false),
			shutdown: Notify::new(),
		}
	}

	pub fn config(&self) -> &ConnectionConfig {
		&self.config
	}

	pub fn is_open(&self) -> bool {
		!self.closed.load(Ordering::SeqCst)
	}

	/// Number of commands awaiting a response.
	pub fn pending_commands(&self) -> usize {
		self.pending.lock().len()
	}

	pub fn dispatcher_stats(&self) -> DispatcherStats {
		self.dispatcher.stats()
	}

	fn next_id(&self) -> u64 {
		self.last_id.fetch_add(1, Ordering::SeqCst) + 1
	}

	/// Sends a command and projects its result into `R`, using the configured
	/// command timeout.
	pub async fn call<R: Decode>(&self, method: &str, params: Value) -> Result<R> {
		self.call_with_timeout(method, params, self.config.command_timeout)
			.await
	}

	pub async fn call_with_timeout<R: Decode>(
		&self,
		method: &str,
		params: Value,
		timeout: Duration,
	) -> Result<R> {
		let result = self.call_raw(method, params, timeout).await?;
		Ok(project(&result)?)
	}

	/// Sends a command and returns its unprojected result.
	pub async fn call_raw(&self, method: &str, params: Value, timeout: Duration) -> Result<Value> {
		if !self.is_open() {
			return Err(Error::ConnectionClosed);
		}

		let id = self.next_id();
		let frame = serde_json::to_string(&Command::new(id, method, params))?;
		let (tx, rx) = oneshot::channel();

		self.pending.lock().insert(
			id,
			PendingCommand {
				method: method.to_string(),
				frame: frame.clone(),
				first_sent: Instant::now(),
				retries: 0,
				tx,
			},
		);
		let _guard = PendingGuard {
			id,
			pending: &self.pending,
		};

		// Close drains the table after setting the flag, so a slot inserted
		// after the drain is caught here.
		if !self.is_open() {
			return Err(Error::ConnectionClosed);
		}

		debug!(id, method, "Sending command");
		if self.outbound_tx.send(Outbound::Frame(frame)).is_err() {
			return Err(Error::ConnectionClosed);
		}

		match tokio::time::timeout(timeout, rx).await {
			Ok(Ok(result)) => result,
			Ok(Err(_)) => Err(Error::ConnectionClosed),
			Err(_) => {
				debug!(id, method, ?timeout, "Command timed out");
				Err(Error::Timeout {
					method: method.to_string(),
					id,
					timeout,
				})
			}
		}
	}

	/// Sends a command without waiting for its response.
	///
	/// Returns the allocated id. A response for it is ignored when it arrives.
	pub fn send(&self, method: &str, params: Value) -> Result<u64> {
		if !self.is_open() {
			return Err(Error::ConnectionClosed);
		}
		let id = self.next_id();
		let frame = serde_json::to_string(&Command::new(id, method, params))?;
		debug!(id, method, "Sending command (no reply expected)");
		self.outbound_tx
			.send(Outbound::Frame(frame))
			.map_err(|_| Error::ConnectionClosed)?;
		Ok(id)
	}

	/// Closes the connection.
	///
	/// Every pending call resolves with [`Error::ConnectionClosed`], listeners are
	/// dropped and the transport is closed once queued frames are written.
	pub fn close(&self) {
		self.mark_closed();
		let _ = self.outbound_tx.send(Outbound::Close);
		self.shutdown.notify_one();
	}

	fn mark_closed(&self) {
		if self.closed.swap(true, Ordering::SeqCst) {
			return;
		}
		let drained: Vec<(u64, PendingCommand)> = self.pending.lock().drain().collect();
		debug!(pending = drained.len(), "Connection closed");
		for (id, command) in drained {
			debug!(id, method = %command.method, "Failing pending command: connection closed");
			let _ = command.tx.send(Err(Error::ConnectionClosed));
		}
		self.dispatcher.close();
	}

	/// Runs the connection until the transport ends or [`close`](Self::close) is
	/// called.
	///
	/// Spawns the transport reader and writer tasks and routes inbound frames in
	/// arrival order. Only the first call does anything.
	pub async fn run(self: &Arc<Self>) {
		let Some(RunParts {
			mut sender,
			receiver,
			mut message_rx,
			mut outbound_rx,
		}) = self.run_parts.lock().take()
		else {
			warn!("Connection::run called more than once");
			return;
		};

		let reader = tokio::spawn(async move {
			if let Err(e) = receiver.run().await {
				error!(error = %e, "Transport read error");
			}
		});

		let writer = tokio::spawn({
			let connection = Arc::downgrade(self);
			async move {
				while let Some(outbound) = outbound_rx.recv().await {
					match outbound {
						Outbound::Frame(frame) => {
							if let Err(e) = sender.send(frame).await {
								error!(error = %e, "Transport write error");
								// In-flight calls resolve with ConnectionClosed.
								if let Some(connection) = connection.upgrade() {
									connection.mark_closed();
									connection.shutdown.notify_one();
								}
								break;
							}
						}
						Outbound::Close => {
							if let Err(e) = sender.close().await {
								debug!(error = %e, "Transport close failed");
							}
							break;
						}
					}
				}
			}
		});

		loop {
			tokio::select! {
				biased;
				_ = self.shutdown.notified() => break,
				message = message_rx.recv() => match message {
					Some(value) => self.route(value),
					None => {
						debug!("Transport closed by remote end");
						break;
					}
				},
			}
		}

		self.mark_closed();
		let _ = self.outbound_tx.send(Outbound::Close);
		reader.abort();
		let _ = writer.await;
	}

	/// Routes one inbound frame.
	fn route(&self, value: Value) {
		match Message::classify(value) {
			Ok(Message::Response(response)) => self.complete(response),
			Ok(Message::Error(frame)) => self.handle_error(frame),
			Ok(Message::Event(event)) => self.dispatcher.dispatch(&event),
			Ok(Message::Unknown(value)) => {
				warn!(frame = %value, "Dropping frame of unknown shape");
			}
			Err(e) => warn!(error = %e, "Dropping malformed frame"),
		}
	}

	fn complete(&self, response: Response) {
		let command = self.pending.lock().remove(&response.id);
		match command {
			Some(command) => {
				debug!(id = response.id, method = %command.method, "Command completed");
				let _ = command.tx.send(Ok(response.result));
			}
			None => debug!(id = response.id, "Ignoring response without pending command"),
		}
	}

	fn handle_error(&self, frame: ErrorFrame) {
		let Some(id) = frame.id else {
			self.broadcast_error(frame);
			return;
		};

		let policy = self.config.retry;
		let route = {
			let mut pending = self.pending.lock();
			let decision = pending.get_mut(&id).map(|command| {
				match policy.decide(command.first_sent.elapsed(), command.retries) {
					RetryDecision::Retry => {
						command.retries += 1;
						Some((command.frame.clone(), command.retries))
					}
					RetryDecision::Fail => None,
				}
			});
			match decision {
				None => ErrorRoute::Stale,
				Some(Some((frame, retries))) => ErrorRoute::Retry { frame, retries },
				Some(None) => pending
					.remove(&id)
					.map_or(ErrorRoute::Stale, ErrorRoute::Fail),
			}
		};

		match route {
			ErrorRoute::Stale => {
				debug!(id, error = %frame.error, "Ignoring error frame without pending command");
			}
			ErrorRoute::Retry { frame: resend, retries } => {
				debug!(id, retries, error = %frame.error, "Retrying command");
				if self.outbound_tx.send(Outbound::Frame(resend)).is_err() {
					if let Some(command) = self.pending.lock().remove(&id) {
						let _ = command.tx.send(Err(Error::ConnectionClosed));
					}
				}
			}
			ErrorRoute::Fail(command) => {
				debug!(
					id,
					method = %command.method,
					retries = command.retries,
					error = %frame.error,
					"Command failed"
				);
				let _ = command.tx.send(Err(frame.into()));
			}
		}
	}

	fn broadcast_error(&self, frame: ErrorFrame) {
		if self.error_handlers.lock().is_empty() {
			warn!(
				id = ?frame.id,
				error = %frame.error,
				message = %frame.message,
				"Uncorrelated error frame"
			);
			return;
		}
		emit(&self.error_handlers, &frame);
	}

	/// Registers a listener for error frames that carry no command id.
	///
	/// The listener stays registered while the returned [`Subscription`] lives.
	pub fn on_error<F>(&self, handler: F) -> Subscription
	where
		F: Fn(&ErrorFrame) + Send + Sync + 'static,
	{
		let id = self.error_handler_ids.next();
		self.error_handlers.lock().insert(
			id,
			HandlerEntry {
				id,
				meta: (),
				handler: Arc::new(move |frame: &ErrorFrame| {
					handler(frame);
					Ok(())
				}),
			},
		);
		Subscription::from_handler_map(id, &self.error_handlers)
	}

	/// Registers an event listener. See [`Dispatcher::add_listener`].
	pub async fn add_listener<T, F>(
		&self,
		event: EventName,
		scope: Option<&str>,
		callback: F,
	) -> Result<ListenerHandle>
	where
		T: Decode + 'static,
		F: Fn(T) -> std::result::Result<(), ListenerError> + Send + Sync + 'static,
	{
		self.dispatcher
			.add_listener(self, event, scope, callback)
			.await
	}

	/// Registers a channel-backed event listener. See [`Dispatcher::listen`].
	pub async fn listen<T>(
		&self,
		event: EventName,
		scope: Option<&str>,
	) -> Result<(ListenerHandle, mpsc::UnboundedReceiver<T>)>
	where
		T: Decode + Send + 'static,
	{
		self.dispatcher.listen(self, event, scope).await
	}

	pub async fn remove_listener(&self, handle: &ListenerHandle) -> Result<bool> {
		self.dispatcher.remove_listener(self, handle).await
	}
}

impl SubscriptionWire for Connection {
	fn subscribe<'a>(&'a self, event: EventName, scope: Option<&'a str>) -> WireFuture<'a, Option<String>> {
		Box::pin(async move {
			let params = serde_json::to_value(SubscribeParams::new(event, scope))?;
			let result: SubscribeResult = self.call(SUBSCRIBE, params).await?;
			Ok(result.subscription)
		})
	}

	fn unsubscribe<'a>(
		&'a self,
		token: Option<&'a str>,
		event: EventName,
		scope: Option<&'a str>,
	) -> WireFuture<'a, ()> {
		Box::pin(async move {
			let params = serde_json::to_value(UnsubscribeParams::new(token, event, scope))?;
			self.call::<()>(UNSUBSCRIBE, params).await
		})
	}
}

impl std::fmt::Debug for Connection {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Connection")
			.field("open", &self.is_open())
			.field("pending", &self.pending_commands())
			.field("dispatcher", &self.dispatcher)
			.finish_non_exhaustive()
	}
}
