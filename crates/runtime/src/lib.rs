//! BiDi Runtime - connection, correlation and event dispatch
//!
//! This crate provides the runtime infrastructure for talking to a BiDi
//! endpoint over one persistent duplex connection:
//!
//! - **Transport**: text frames over stdio-style pipes or WebSocket
//! - **Connection**: command/response correlation with timeouts, bounded
//!   retry of error frames, and a single ordered inbound read path
//! - **Dispatcher**: reference-counted event subscriptions and isolated,
//!   ordered delivery to listeners
//! - **Configuration**: per-connection settings with environment overrides
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────┐
//! │          bidi-runtime        │
//! │  ┌────────────┐ ┌──────────┐ │
//! │  │ Connection │─│Dispatcher│ │  correlation, retry, fan-out
//! │  └─────┬──────┘ └──────────┘ │
//! │  ┌─────▼──────┐              │
//! │  │ Transport  │              │  pipe / WebSocket
//! │  └────────────┘              │
//! └──────────────┬───────────────┘
//!                │ wire types, projection
//! ┌──────────────▼───────────────┐
//! │         bidi-protocol        │
//! └──────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```ignore
//! let (transport, message_rx) = WebSocketTransport::connect(url).await?;
//! let connection = Arc::new(Connection::with_config(
//!     transport.into_transport_parts(message_rx),
//!     ConnectionConfig::from_env()?,
//! ));
//! tokio::spawn({
//!     let connection = Arc::clone(&connection);
//!     async move { connection.run().await }
//! });
//!
//! let created: CreateResult = connection
//!     .call("browsingContext.create", json!({"type": "tab"}))
//!     .await?;
//! ```

pub mod config;
pub mod connection;
pub mod dispatcher;
pub mod error;
pub mod handlers;
pub mod retry;
pub mod transport;

pub use config::ConnectionConfig;
pub use connection::Connection;
pub use dispatcher::{
	Dispatcher, DispatcherStats, ListenerHandle, SubscriptionKey, SubscriptionWire, WireFuture,
};
pub use error::{Error, Result};
pub use handlers::{HandlerId, ListenerError, Subscription};
pub use retry::{RetryBounds, RetryDecision, RetryPolicy};
pub use transport::{
	PipeTransport, PipeTransportReceiver, PipeTransportSender, Transport, TransportParts,
	TransportReceiver, WebSocketTransport, WebSocketTransportReceiver, WebSocketTransportSender,
};
