//! # rs-lineus
//!
//! An async client for the Line-us drawing robot and other devices that
//! speak its line-oriented text protocol.
//!
//! ## Features
//!
//! - **One command at a time**: the device has no buffer, so every call is
//!   queued and sent only after the previous reply
//! - **Pen tracking**: travel moves lift the pen, lines lower it, decided
//!   when the call is made
//! - **Pause with lift**: pausing can raise a lowered pen and put it back on
//!   resume
//! - **Observable**: state snapshots over `watch`, events over `broadcast`
//! - **Testable**: an in-process [`MockDevice`](hal::MockDevice) speaks the
//!   same protocol as the hardware
//!
//! ## Architecture
//!
//! - `commands` - Command values and builders for every device verb
//! - `protocol` - Request encoder and reply decoder
//! - `coordinates` - Logical canvas to machine transform
//! - `pen` - Submission-time pen state tracking
//! - `queue` - Two-tier FIFO with a single in-flight slot
//! - `session` - The session task and its [`LineUs`] handle
//! - `traits` - Transport abstractions
//! - `hal` - Concrete transports (mock, TCP)
//!
//! ## Example
//!
//! ```rust
//! use rs_lineus::{config::SessionConfig, hal::MockDevice, Coordinate, LineUs};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), rs_lineus::Error> {
//! let plotter = LineUs::spawn(MockDevice::new(), SessionConfig::default());
//! plotter.connect().await?;
//!
//! plotter.move_to(Coordinate::xy(100.0, 100.0)).await?;
//! plotter.line_to(Coordinate::xy(400.0, 100.0)).await?;
//! plotter.line_to(Coordinate::xy(400.0, 400.0)).await?;
//! plotter.home().await?;
//!
//! assert_eq!(plotter.coordinates().map(|p| p.z), Some(1000.0));
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]

/// Device commands and builders.
pub mod commands;
/// Connection and session configuration.
pub mod config;
/// Logical and machine coordinate spaces.
pub mod coordinates;
/// Error types.
pub mod error;
/// Transport implementations (mock device, TCP).
pub mod hal;
/// Pen state tracking.
pub mod pen;
/// Wire codec.
pub mod protocol;
/// Single-slot command queue.
pub mod queue;
/// Session task and handle.
pub mod session;
/// Transport traits.
pub mod traits;

// Re-exports for convenience
pub use commands::{Command, Value};
pub use config::Config;
pub use coordinates::{Coordinate, Position};
pub use error::{Error, ProtocolError, TransportError};
pub use pen::PenState;
pub use protocol::{decode, encode, Fields, Response};
pub use session::{LineUs, Reply, SessionEvent, SessionSnapshot, SessionState};
pub use traits::{Connector, Transport, TransportEvent};
