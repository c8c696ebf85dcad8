//! Wire types for the BiDi remote-automation protocol.
//!
//! This crate contains everything that can be expressed without I/O:
//!
//! - **Frames**: [`Command`], [`Response`], [`ErrorFrame`], [`Event`] and the
//!   [`Message`] classifier used by the inbound router
//! - **Event catalogue**: [`EventName`], the events this client understands
//! - **Scope extraction**: [`scope::context_id`], locating the browsing context
//!   an event payload refers to
//! - **Projection**: the [`Decode`] trait and [`project`], which turn untyped
//!   payloads into typed values with permissive defaults
//! - **Payload shapes**: typed views of common event and result payloads
//!
//! # Design Philosophy
//!
//! Types in this crate are:
//! - **Pure data**: No behavior beyond parsing, classification and projection
//! - **Tolerant**: Missing fields never fail a projection; they default
//! - **Runtime-free**: No async, no transport, no shared state

pub mod browsing_context;
pub mod event_name;
pub mod input;
pub mod log;
pub mod message;
pub mod network;
pub mod project;
pub mod scope;
pub mod script;
pub mod session;

pub use browsing_context::*;
pub use event_name::{EventName, UnknownEvent};
pub use input::*;
pub use log::*;
pub use message::{Command, ErrorFrame, Event, Message, Response};
pub use network::*;
pub use project::{Decode, Projection, ProjectionError, field_key, project};
pub use script::*;
pub use session::*;
