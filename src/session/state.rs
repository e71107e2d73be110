//! Session state types shared between the actor and its handles.

use core::fmt;

use crate::coordinates::Position;
use crate::pen::PenState;
use crate::protocol::Fields;

/// Connection and drawing state of a session.
///
/// ```text
/// disconnected -> connecting -> connected -> drawing <-> paused
///       ^                                        |          |
///       +----------------------------------------+----------+
/// ```
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum SessionState {
    /// No transport.
    #[default]
    Disconnected,
    /// Transport opening or waiting for the hello frame.
    Connecting,
    /// Handshake complete, queue not yet started or paused.
    Connected,
    /// Queue is dispatching commands.
    Drawing,
    /// Queue is stopped; queued commands are kept.
    Paused,
}

impl SessionState {
    /// Lower-case state name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Drawing => "drawing",
            Self::Paused => "paused",
        }
    }

    /// True once the handshake has completed and until the connection closes.
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected | Self::Drawing | Self::Paused)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Read-only view of the session, published after every change.
#[derive(Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SessionSnapshot {
    /// Current state.
    pub state: SessionState,
    /// Last reported position in logical space. `None` until the first
    /// handshake.
    pub coordinates: Option<Position>,
    /// Hello frame fields with lower-cased keys.
    pub info: Fields,
    /// Pen state once every queued command has run.
    pub queued_pen: PenState,
}

/// Something observers may react to.
///
/// Every state change produces exactly one [`SessionEvent::State`];
/// subscribers interested in a single state match on its payload.
#[derive(Clone, Debug, PartialEq)]
pub enum SessionEvent {
    /// The session moved to a new state.
    State(SessionState),
    /// A reply carried a new position.
    Coordinates(Position),
    /// Something went wrong outside a single caller's command.
    Error(String),
}

impl SessionEvent {
    /// True if this event announces `state`.
    pub fn is_state(&self, state: SessionState) -> bool {
        matches!(self, Self::State(s) if *s == state)
    }
}

/// Successful reply to a command.
#[derive(Clone, Debug, PartialEq)]
pub struct Reply {
    /// Response tag as sent by the device.
    pub tag: String,
    /// Raw fields.
    pub fields: Fields,
    /// Logical position, if the reply was a position report.
    pub position: Option<Position>,
}
