//! Transport abstraction for the device socket.
//!
//! The session never touches a socket directly. It talks to a
//! [`Transport`], obtained from a [`Connector`], so the same session code
//! runs against TCP in production and an in-process mock in tests.
//!
//! # Traits
//!
//! | Trait | Purpose |
//! |-------|---------|
//! | [`Connector`] | Opens a new connection; called once per connect attempt |
//! | [`Transport`] | One open connection: send frames, wait for frames, close |
//!
//! # Framing
//!
//! Transports deal in whole frames. Delimiters are added on send and
//! stripped on receive, so the session only ever sees text such as
//! `ok X:1000 Y:1000 Z:1000`.
//!
//! # Example
//!
//! ```rust,ignore
//! use rs_lineus::traits::{Connector, Transport, TransportEvent};
//!
//! async fn hello<C: Connector>(connector: &C) -> Option<String> {
//!     let mut transport = connector.connect().await.ok()?;
//!     match transport.next_event().await {
//!         TransportEvent::Frame(line) => Some(line),
//!         _ => None,
//!     }
//! }
//! ```

use crate::error::TransportError;

/// Something that happened on an open connection.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TransportEvent {
    /// One complete frame, delimiter removed.
    Frame(String),
    /// A non-fatal transport error. The connection may still be usable.
    Error(String),
    /// The connection is gone. No further events follow.
    Closed,
}

/// An open, bidirectional, frame-oriented connection.
///
/// # Implementation Notes
///
/// - `next_event` must be cancel-safe: it is polled inside `select!` and
///   dropping its future must not lose a frame.
/// - After `Closed` has been returned, `next_event` keeps returning
///   `Closed`.
/// - `close` is idempotent.
pub trait Transport: Send {
    /// Writes one frame. The delimiter is appended by the transport.
    fn send(
        &mut self,
        frame: &str,
    ) -> impl core::future::Future<Output = Result<(), TransportError>> + Send;

    /// Waits for the next event on the connection.
    fn next_event(&mut self) -> impl core::future::Future<Output = TransportEvent> + Send;

    /// Closes the connection.
    fn close(&mut self) -> impl core::future::Future<Output = ()> + Send;
}

/// Opens connections to a device.
///
/// Shared between the session task and spawned connect attempts, hence
/// `Sync + 'static`.
pub trait Connector: Send + Sync + 'static {
    /// Connection type produced.
    type Transport: Transport + 'static;

    /// Opens a new connection.
    fn connect(
        &self,
    ) -> impl core::future::Future<Output = Result<Self::Transport, TransportError>> + Send;
}
