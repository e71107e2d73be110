//! Error types for the protocol, transport and session layers.
//!
//! Errors are split by the layer that detects them:
//!
//! - [`ProtocolError`]: a frame or command that breaks the wire contract.
//!   Never retried.
//! - [`TransportError`]: the socket itself failed, closed or timed out.
//! - [`Error`]: what a caller of [`LineUs`](crate::LineUs) sees. A device
//!   `error` reply becomes [`Error::Device`] and only affects the command
//!   that produced it.

use std::time::Duration;

use thiserror::Error;

/// A frame or command that violates the text protocol.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ProtocolError {
    /// The frame has no leading type word (empty or malformed frame).
    #[error("frame has no response type: {0:?}")]
    MissingType(String),

    /// A position report is missing one of the three axes.
    #[error("position report is missing the {0} axis")]
    MissingAxis(char),

    /// An axis value in a position report is not a number.
    #[error("axis {axis} has non-numeric value {value:?}")]
    InvalidAxis {
        /// Axis letter.
        axis: char,
        /// Raw value as received.
        value: String,
    },

    /// The reply tag is neither `ok` nor `error`.
    #[error("unexpected response type {0:?}")]
    UnexpectedResponse(String),

    /// A command was built or parsed without a verb.
    #[error("command has no verb")]
    EmptyVerb,

    /// A request-side parameter token could not be parsed.
    #[error("invalid parameter {0:?}")]
    InvalidParam(String),
}

/// Socket-level failures.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Opening the connection failed.
    #[error("failed to connect to {addr}: {source}")]
    Connect {
        /// Address that was dialled.
        addr: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Reading or writing failed.
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The connection closed while a reply was expected.
    #[error("connection closed")]
    Closed,

    /// The device did not answer within the dispatch timeout.
    #[error("no response from device within {0:?}")]
    Timeout(Duration),
}

/// Errors returned by [`LineUs`](crate::LineUs) operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Malformed or contract-violating frame.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// The device answered with an `error` reply.
    #[error("device error: {message}")]
    Device {
        /// Response tag as sent by the device.
        tag: String,
        /// Human readable message from the `INFO` field.
        message: String,
    },

    /// Socket failure while this command was outstanding.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The command was removed from the queue before it was sent.
    #[error("command discarded before it was sent")]
    Discarded,

    /// The operation needs a completed handshake.
    #[error("not connected to a device")]
    NotConnected,

    /// The session task has shut down.
    #[error("session closed")]
    SessionClosed,
}

impl Error {
    /// Returns true if the device itself rejected the command.
    pub fn is_device_error(&self) -> bool {
        matches!(self, Self::Device { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn device_error_display_uses_message() {
        let err = Error::Device {
            tag: "error".into(),
            message: "bad command".into(),
        };
        assert_eq!(err.to_string(), "device error: bad command");
        assert!(err.is_device_error());
    }

    #[test]
    fn protocol_error_is_transparent() {
        let err: Error = ProtocolError::MissingAxis('Y').into();
        assert_eq!(err.to_string(), "position report is missing the Y axis");
        assert!(!err.is_device_error());
    }

    #[test]
    fn timeout_display() {
        let err: Error = TransportError::Timeout(Duration::from_millis(1500)).into();
        assert_eq!(err.to_string(), "no response from device within 1.5s");
    }
}
