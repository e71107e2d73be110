//! Submission-time pen state tracking.
//!
//! The tracker records where the pen *will be* once everything already
//! queued has run, not where it is now. Decisions are made when a command is
//! submitted so that back-to-back lines only lower the pen once, even when
//! the earlier commands have not been sent yet.
//!
//! | Call | Queued state | Effect |
//! |------|--------------|--------|
//! | `move_to` | down | z forced to [`PEN_UP_Z`], state becomes up |
//! | `line_to` | up | separate `Z0` move queued first, state becomes down |
//! | any move with z | - | z below [`PEN_THRESHOLD_Z`] means down, else up |
//! | home | - | up, overriding the z rule |
//!
//! The lowering move cannot be folded into the xy move: the device only
//! drops the pen at the end of a combined move.

use crate::commands::Command;
use crate::coordinates::{Coordinate, PEN_DOWN_Z, PEN_THRESHOLD_Z, PEN_UP_Z};

/// Whether the pen touches the paper.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum PenState {
    /// Lifted.
    #[default]
    Up,
    /// Touching the paper.
    Down,
}

impl PenState {
    /// State implied by a z height.
    pub fn from_z(z: f64) -> Self {
        if z < PEN_THRESHOLD_Z {
            Self::Down
        } else {
            Self::Up
        }
    }

    /// Lower-case name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Up => "up",
            Self::Down => "down",
        }
    }
}

/// Tracks the pen state implied by queued commands.
#[derive(Clone, Debug, Default)]
pub struct PenTracker {
    queued: PenState,
}

impl PenTracker {
    /// Tracker starting lifted.
    pub fn new() -> Self {
        Self::default()
    }

    /// Pen state once every queued command has run.
    pub fn queued(&self) -> PenState {
        self.queued
    }

    /// Forces the tracked state, e.g. after a (re)connect homes the device.
    pub fn reset(&mut self, state: PenState) {
        self.queued = state;
    }

    /// Target for a travel move: lifts the pen if it is queued down.
    pub fn plan_move(&self, target: Coordinate) -> Coordinate {
        match self.queued {
            PenState::Down => target.with_z(PEN_UP_Z),
            PenState::Up => target,
        }
    }

    /// Extra lowering move to queue before a line, if the pen is queued up.
    pub fn plan_line(&self) -> Option<Coordinate> {
        match self.queued {
            PenState::Up => Some(Coordinate::new().with_z(PEN_DOWN_Z)),
            PenState::Down => None,
        }
    }

    /// Updates the queued state from a command being submitted.
    ///
    /// Home always wins over an explicit z in the same command.
    pub fn observe(&mut self, cmd: &Command) {
        if let Some(z) = cmd.z() {
            self.queued = PenState::from_z(z);
        }
        if cmd.is_home() {
            self.queued = PenState::Up;
        }
    }
}
