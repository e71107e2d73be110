//! Logical drawing coordinates and the machine transform.
//!
//! The logical space has its origin at the top-left of the canvas with y
//! growing downwards. The device works in its own units, offset in x and
//! mirrored in y:
//!
//! ```text
//! x' = x + 650
//! y' = 1000 - y
//! z' = z
//! ```
//!
//! ```rust
//! use rs_lineus::coordinates::{to_logical, to_machine, Coordinate, Position};
//!
//! let machine = to_machine(&Coordinate::xy(500.0, 500.0));
//! assert_eq!(machine, Coordinate::xy(1150.0, 500.0));
//!
//! let back = to_logical(&machine.with_z(0.0)).unwrap();
//! assert_eq!(back, Position::new(500.0, 500.0, 0.0));
//! ```

use crate::error::ProtocolError;

/// Logical canvas width.
pub const CANVAS_WIDTH: f64 = 1125.0;
/// Logical canvas height.
pub const CANVAS_HEIGHT: f64 = 2000.0;

/// Added to logical x to get machine x.
pub const X_OFFSET: f64 = 650.0;
/// Machine y of logical y = 0.
pub const Y_OFFSET: f64 = 1000.0;

/// Z height of a lifted pen.
pub const PEN_UP_Z: f64 = 1000.0;
/// Z height of a lowered pen.
pub const PEN_DOWN_Z: f64 = 0.0;
/// Heights below this count as lowered.
pub const PEN_THRESHOLD_Z: f64 = 500.0;

/// Machine position the device reports after homing.
pub const MACHINE_HOME: Position = Position {
    x: 1000.0,
    y: 1000.0,
    z: 1000.0,
};

/// A possibly partial coordinate. Missing axes hold their last value on
/// the device.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Coordinate {
    /// X axis.
    pub x: Option<f64>,
    /// Y axis.
    pub y: Option<f64>,
    /// Z (pen height) axis.
    pub z: Option<f64>,
}

impl Coordinate {
    /// Coordinate with no axes set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Coordinate with x and y set.
    pub fn xy(x: f64, y: f64) -> Self {
        Self {
            x: Some(x),
            y: Some(y),
            z: None,
        }
    }

    /// Coordinate with all three axes set.
    pub fn xyz(x: f64, y: f64, z: f64) -> Self {
        Self {
            x: Some(x),
            y: Some(y),
            z: Some(z),
        }
    }

    /// Sets x.
    pub fn with_x(mut self, x: f64) -> Self {
        self.x = Some(x);
        self
    }

    /// Sets y.
    pub fn with_y(mut self, y: f64) -> Self {
        self.y = Some(y);
        self
    }

    /// Sets z.
    pub fn with_z(mut self, z: f64) -> Self {
        self.z = Some(z);
        self
    }

    /// True if no axis is set.
    pub fn is_empty(&self) -> bool {
        self.x.is_none() && self.y.is_none() && self.z.is_none()
    }
}

/// A fully specified position, as reported by the device.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Position {
    /// X axis.
    pub x: f64,
    /// Y axis.
    pub y: f64,
    /// Z (pen height) axis.
    pub z: f64,
}

impl Position {
    /// Creates a position.
    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// True if the pen is touching the paper at this height.
    pub fn is_pen_down(&self) -> bool {
        self.z < PEN_THRESHOLD_Z
    }
}

impl From<Position> for Coordinate {
    fn from(p: Position) -> Self {
        Coordinate::xyz(p.x, p.y, p.z)
    }
}

/// Logical to machine space. Axes absent from the input stay absent.
pub fn to_machine(logical: &Coordinate) -> Coordinate {
    Coordinate {
        x: logical.x.map(|x| x + X_OFFSET),
        y: logical.y.map(|y| -y + Y_OFFSET),
        z: logical.z,
    }
}

/// Machine to logical space.
///
/// The device always reports all three axes, so a missing axis is a
/// contract violation.
pub fn to_logical(machine: &Coordinate) -> Result<Position, ProtocolError> {
    let x = machine.x.ok_or(ProtocolError::MissingAxis('X'))?;
    let y = machine.y.ok_or(ProtocolError::MissingAxis('Y'))?;
    let z = machine.z.ok_or(ProtocolError::MissingAxis('Z'))?;
    Ok(Position {
        x: x - X_OFFSET,
        y: Y_OFFSET - y,
        z,
    })
}

/// Logical position of the device's home.
pub fn logical_home() -> Position {
    Position {
        x: MACHINE_HOME.x - X_OFFSET,
        y: Y_OFFSET - MACHINE_HOME.y,
        z: MACHINE_HOME.z,
    }
}
