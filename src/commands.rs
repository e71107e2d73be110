//! Device commands and their builders.
//!
//! A [`Command`] is a verb plus an ordered list of single-letter parameters.
//! Verbs and keys are canonicalized to upper case when the command is built,
//! so two commands are wire-equal iff their verb and parameter lists match.
//!
//! ```rust
//! use rs_lineus::commands::{Command, Value};
//! use rs_lineus::protocol::encode;
//!
//! let cmd = Command::new("g01").with_param('x', 1150.0).with_param('y', 500.0);
//! assert_eq!(encode(&cmd).unwrap(), "G01 X1150 Y500");
//! assert_eq!(cmd.param('X'), Some(&Value::Number(1150.0)));
//! ```
//!
//! # Verbs
//!
//! | Verb | Builder | Purpose |
//! |------|---------|---------|
//! | `G01` | [`Command::linear_move`] | Linear move, any of X/Y/Z |
//! | `G28` | [`Command::home`] | Return to home, finishes lifted |
//! | `M114` | [`Command::get_position`] | Report position |
//! | `M115` | [`Command::get_capabilities`] | Firmware and hardware info |
//! | `M122` | [`Command::get_diagnostics`] | Diagnostics |
//! | `M370`-`M372` | calibration builders | Clear / enter / save calibration |
//! | `M550` | [`Command::set_name`] | Rename the device |
//! | `M587` | [`Command::set_wifi`] | Store network credentials |

use core::fmt;
use core::str::FromStr;

use crate::coordinates::Coordinate;
use crate::error::ProtocolError;

/// Linear move.
pub const LINEAR_MOVE: &str = "G01";
/// Home.
pub const HOME: &str = "G28";
/// Report current position.
pub const GET_POSITION: &str = "M114";
/// Report firmware capabilities.
pub const GET_CAPABILITIES: &str = "M115";
/// Report diagnostics.
pub const GET_DIAGNOSTICS: &str = "M122";
/// Clear stored calibration.
pub const CLEAR_CALIBRATION: &str = "M370";
/// Enter calibration mode.
pub const CALIBRATION_MODE: &str = "M371";
/// Save the current calibration.
pub const SAVE_CALIBRATION: &str = "M372";
/// Set the device name.
pub const SET_NAME: &str = "M550";
/// Store network credentials.
pub const SET_WIFI: &str = "M587";

// ============================================================================
// Parameter values
// ============================================================================

/// Scalar parameter value.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(untagged))]
pub enum Value {
    /// Numeric value, written in shortest round-trip form.
    Number(f64),
    /// Text written verbatim.
    Text(String),
}

impl Value {
    /// Returns the numeric value, if this is a number.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            Self::Text(_) => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            // -0 prints as "-0", the device expects "0"
            Self::Number(n) if *n == 0.0 => f.write_str("0"),
            Self::Number(n) => write!(f, "{}", n),
            Self::Text(s) => f.write_str(s),
        }
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Self::Number(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Self::Number(n as f64)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

// ============================================================================
// Command
// ============================================================================

/// A device command: verb plus ordered single-letter parameters.
///
/// Immutable once built; the `with_param` builder consumes and returns it.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Command {
    verb: String,
    params: Vec<(char, Value)>,
}

impl Command {
    /// Creates a command with no parameters. The verb is upper-cased.
    pub fn new(verb: &str) -> Self {
        Self {
            verb: verb.trim().to_ascii_uppercase(),
            params: Vec::new(),
        }
    }

    /// Adds a parameter. The key is upper-cased; an existing key keeps its
    /// position and takes the new value.
    pub fn with_param(mut self, key: char, value: impl Into<Value>) -> Self {
        let key = key.to_ascii_uppercase();
        let value = value.into();
        match self.params.iter_mut().find(|(k, _)| *k == key) {
            Some(slot) => slot.1 = value,
            None => self.params.push((key, value)),
        }
        self
    }

    /// Canonical (upper-case) verb.
    pub fn verb(&self) -> &str {
        &self.verb
    }

    /// Parameters in insertion order.
    pub fn params(&self) -> &[(char, Value)] {
        &self.params
    }

    /// Looks up a parameter by key (case-insensitive).
    pub fn param(&self, key: char) -> Option<&Value> {
        let key = key.to_ascii_uppercase();
        self.params.iter().find(|(k, _)| *k == key).map(|(_, v)| v)
    }

    /// Explicit Z height carried by this command, if any.
    pub fn z(&self) -> Option<f64> {
        self.param('Z').and_then(Value::as_f64)
    }

    /// True for the home verb.
    pub fn is_home(&self) -> bool {
        self.verb == HOME
    }

    /// True for a linear move.
    pub fn is_move(&self) -> bool {
        self.verb == LINEAR_MOVE
    }

    /// `G01` with whichever axes are present in `target`.
    ///
    /// `target` is in machine space; use
    /// [`to_machine`](crate::coordinates::to_machine) first for logical
    /// coordinates.
    pub fn linear_move(target: &Coordinate) -> Self {
        let mut cmd = Self::new(LINEAR_MOVE);
        if let Some(x) = target.x {
            cmd = cmd.with_param('X', x);
        }
        if let Some(y) = target.y {
            cmd = cmd.with_param('Y', y);
        }
        if let Some(z) = target.z {
            cmd = cmd.with_param('Z', z);
        }
        cmd
    }

    /// `G28`.
    pub fn home() -> Self {
        Self::new(HOME)
    }

    /// `M114`.
    pub fn get_position() -> Self {
        Self::new(GET_POSITION)
    }

    /// `M115`.
    pub fn get_capabilities() -> Self {
        Self::new(GET_CAPABILITIES)
    }

    /// `M122`.
    pub fn get_diagnostics() -> Self {
        Self::new(GET_DIAGNOSTICS)
    }

    /// `M370`.
    pub fn clear_calibration() -> Self {
        Self::new(CLEAR_CALIBRATION)
    }

    /// `M371`.
    pub fn calibration_mode() -> Self {
        Self::new(CALIBRATION_MODE)
    }

    /// `M372`.
    pub fn save_calibration() -> Self {
        Self::new(SAVE_CALIBRATION)
    }

    /// `M550 P"<name>"`.
    pub fn set_name(name: &str) -> Self {
        Self::new(SET_NAME).with_param('P', quoted(name))
    }

    /// `M587 S"<ssid>" P"<password>"`.
    pub fn set_wifi(ssid: &str, password: &str) -> Self {
        Self::new(SET_WIFI)
            .with_param('S', quoted(ssid))
            .with_param('P', quoted(password))
    }
}

fn quoted(s: &str) -> String {
    format!("\"{}\"", s)
}

/// Parses the request form `G01 X1150 Y500`, the inverse of
/// [`encode`](crate::protocol::encode).
///
/// Numeric values become [`Value::Number`], anything else [`Value::Text`].
/// Double-quoted values may contain spaces and keep their quotes.
impl FromStr for Command {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut tokens = split_request(s).into_iter();
        let verb = tokens.next().ok_or(ProtocolError::EmptyVerb)?;
        let mut cmd = Command::new(verb);

        for token in tokens {
            let mut chars = token.chars();
            let key = match chars.next() {
                Some(c) if c.is_ascii_alphabetic() => c,
                _ => return Err(ProtocolError::InvalidParam(token.to_string())),
            };
            let raw = chars.as_str();
            let value = match raw.parse::<f64>() {
                Ok(n) => Value::Number(n),
                Err(_) => Value::Text(raw.to_string()),
            };
            cmd = cmd.with_param(key, value);
        }

        Ok(cmd)
    }
}

/// Splits on spaces outside double quotes.
fn split_request(s: &str) -> Vec<&str> {
    let mut tokens = Vec::new();
    let mut start = None;
    let mut in_quotes = false;

    for (i, c) in s.char_indices() {
        match c {
            '"' => {
                in_quotes = !in_quotes;
                start.get_or_insert(i);
            }
            c if c.is_whitespace() && !in_quotes => {
                if let Some(begin) = start.take() {
                    tokens.push(&s[begin..i]);
                }
            }
            _ => {
                start.get_or_insert(i);
            }
        }
    }
    if let Some(begin) = start {
        tokens.push(&s[begin..]);
    }
    tokens
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verb_and_keys_are_upper_cased() {
        let cmd = Command::new("g01").with_param('x', 1.0);
        assert_eq!(cmd.verb(), "G01");
        assert_eq!(cmd.params()[0].0, 'X');
        assert!(cmd.is_move());
    }

    #[test]
    fn duplicate_key_keeps_position_and_takes_last_value() {
        let cmd = Command::new("G01")
            .with_param('x', 1.0)
            .with_param('y', 2.0)
            .with_param('X', 3.0);
        assert_eq!(
            cmd.params(),
            &[('X', Value::Number(3.0)), ('Y', Value::Number(2.0))]
        );
    }

    #[test]
    fn linear_move_omits_missing_axes() {
        let cmd = Command::linear_move(&Coordinate::new().with_x(1150.0).with_z(0.0));
        assert_eq!(cmd.param('X'), Some(&Value::Number(1150.0)));
        assert_eq!(cmd.param('Y'), None);
        assert_eq!(cmd.z(), Some(0.0));
    }

    #[test]
    fn home_is_detected() {
        assert!(Command::home().is_home());
        assert!(Command::new("g28").is_home());
        assert!(!Command::get_position().is_home());
    }

    #[test]
    fn number_display_has_no_trailing_zero() {
        assert_eq!(Value::Number(1150.0).to_string(), "1150");
        assert_eq!(Value::Number(0.5).to_string(), "0.5");
        assert_eq!(Value::Number(-0.0).to_string(), "0");
        assert_eq!(Value::Number(-12.25).to_string(), "-12.25");
    }

    #[test]
    fn parse_request_line() {
        let cmd: Command = "g01 x1150 Y500 z0".parse().unwrap();
        assert_eq!(cmd.verb(), "G01");
        assert_eq!(cmd.param('x'), Some(&Value::Number(1150.0)));
        assert_eq!(cmd.param('Y'), Some(&Value::Number(500.0)));
        assert_eq!(cmd.z(), Some(0.0));
    }

    #[test]
    fn parse_quoted_text_with_spaces() {
        let cmd: Command = r#"M550 P"my robot""#.parse().unwrap();
        assert_eq!(cmd.param('P'), Some(&Value::Text("\"my robot\"".into())));
        assert_eq!(cmd, Command::set_name("my robot"));
    }

    #[test]
    fn parse_rejects_empty_and_bad_keys() {
        assert_eq!("   ".parse::<Command>(), Err(ProtocolError::EmptyVerb));
        assert_eq!(
            "G01 1150".parse::<Command>(),
            Err(ProtocolError::InvalidParam("1150".into()))
        );
    }

    #[test]
    fn wifi_builder_quotes_both_values() {
        let cmd = Command::set_wifi("home", "secret");
        assert_eq!(cmd.verb(), SET_WIFI);
        assert_eq!(cmd.param('S'), Some(&Value::Text("\"home\"".into())));
        assert_eq!(cmd.param('P'), Some(&Value::Text("\"secret\"".into())));
    }
}
