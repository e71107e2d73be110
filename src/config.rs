//! Connection and session configuration.
//!
//! Uses `heapless::String` for host names so the whole config is a plain
//! value type with no heap indirection.
//!
//! # Example
//!
//! ```rust
//! use rs_lineus::config::{Config, DeviceConfig, SessionConfig};
//!
//! // Use defaults
//! let config = Config::default();
//! assert_eq!(config.device.url().as_str(), "line-us.local:1337");
//!
//! // Or customize
//! let config = Config::default()
//!     .with_device(DeviceConfig::default().with_host("192.168.1.50"))
//!     .with_session(SessionConfig::default().with_auto_start(false));
//! ```

use core::fmt::Write;
use std::time::Duration;

use heapless::String as HString;

/// Maximum length for short config strings (hostnames)
pub const MAX_SHORT_STRING: usize = 64;

/// Maximum length for longer config strings (`host:port` addresses)
pub const MAX_LONG_STRING: usize = 128;

/// Type alias for short config strings
pub type ShortString = HString<MAX_SHORT_STRING>;

/// Type alias for longer config strings
pub type LongString = HString<MAX_LONG_STRING>;

// ============================================================================
// Helper for creating heapless strings
// ============================================================================

/// Byte length of the longest prefix of `s` that fits in `max` bytes
/// without splitting a character.
fn fit(s: &str, max: usize) -> usize {
    s.char_indices()
        .map(|(i, c)| i + c.len_utf8())
        .take_while(|end| *end <= max)
        .last()
        .unwrap_or(0)
}

/// Create a ShortString from a &str, truncating if too long
pub fn short_string(s: &str) -> ShortString {
    let mut hs = ShortString::new();
    let _ = hs.push_str(&s[..fit(s, MAX_SHORT_STRING)]);
    hs
}

/// Create a LongString from a &str, truncating if too long
pub fn long_string(s: &str) -> LongString {
    let mut hs = LongString::new();
    let _ = hs.push_str(&s[..fit(s, MAX_LONG_STRING)]);
    hs
}

// ============================================================================
// Main Config
// ============================================================================

/// Complete client configuration
#[derive(Clone, Debug, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Config {
    /// Where the device lives and how frames are delimited
    pub device: DeviceConfig,
    /// Session behaviour
    pub session: SessionConfig,
}

impl Config {
    /// Set device configuration
    pub fn with_device(mut self, device: DeviceConfig) -> Self {
        self.device = device;
        self
    }

    /// Set session configuration
    pub fn with_session(mut self, session: SessionConfig) -> Self {
        self.session = session;
        self
    }
}

// ============================================================================
// Device Config
// ============================================================================

/// Device address and framing
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DeviceConfig {
    /// Hostname or IP
    pub host: ShortString,
    /// TCP port
    pub port: u16,
    /// Byte terminating every frame in both directions
    pub delimiter: u8,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            host: short_string("line-us.local"),
            port: 1337,
            delimiter: b'\0',
        }
    }
}

impl DeviceConfig {
    /// Set the host
    pub fn with_host(mut self, host: &str) -> Self {
        self.host = short_string(host);
        self
    }

    /// Set the port
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Set the frame delimiter
    pub fn with_delimiter(mut self, delimiter: u8) -> Self {
        self.delimiter = delimiter;
        self
    }

    /// `host:port`, suitable for `TcpStream::connect`
    pub fn url(&self) -> LongString {
        let mut url = LongString::new();
        let _ = write!(url, "{}:{}", self.host, self.port);
        url
    }
}

// ============================================================================
// Session Config
// ============================================================================

/// Session behaviour
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SessionConfig {
    /// Connect as soon as the session is spawned
    pub auto_connect: bool,
    /// Start drawing right after the handshake; otherwise stay paused
    pub auto_start: bool,
    /// Per-command reply timeout in milliseconds (0 = wait forever)
    pub dispatch_timeout_ms: u32,
    /// Capacity of the request channel into the session task
    pub request_capacity: usize,
    /// Capacity of the event broadcast channel
    pub event_capacity: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            auto_connect: true,
            auto_start: true,
            dispatch_timeout_ms: 0,
            request_capacity: 64,
            event_capacity: 64,
        }
    }
}

impl SessionConfig {
    /// Set whether to connect on spawn
    pub fn with_auto_connect(mut self, auto_connect: bool) -> Self {
        self.auto_connect = auto_connect;
        self
    }

    /// Set whether to start drawing after the handshake
    pub fn with_auto_start(mut self, auto_start: bool) -> Self {
        self.auto_start = auto_start;
        self
    }

    /// Set the dispatch timeout
    pub fn with_dispatch_timeout_ms(mut self, ms: u32) -> Self {
        self.dispatch_timeout_ms = ms;
        self
    }

    /// Set the request channel capacity (at least 1)
    pub fn with_request_capacity(mut self, capacity: usize) -> Self {
        self.request_capacity = capacity.max(1);
        self
    }

    /// Set the event channel capacity (at least 1)
    pub fn with_event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity.max(1);
        self
    }

    /// Dispatch timeout, `None` when disabled
    pub fn dispatch_timeout(&self) -> Option<Duration> {
        match self.dispatch_timeout_ms {
            0 => None,
            ms => Some(Duration::from_millis(u64::from(ms))),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = Config::default();
        assert_eq!(config.device.host.as_str(), "line-us.local");
        assert_eq!(config.device.port, 1337);
        assert_eq!(config.device.delimiter, 0);
        assert!(config.session.auto_connect);
        assert!(config.session.auto_start);
        assert_eq!(config.session.dispatch_timeout(), None);
    }

    #[test]
    fn device_url() {
        let device = DeviceConfig::default().with_host("10.0.0.7").with_port(8080);
        assert_eq!(device.url().as_str(), "10.0.0.7:8080");
    }

    #[test]
    fn short_string_truncation() {
        let long_input = "a".repeat(100);
        let s = short_string(&long_input);
        assert_eq!(s.len(), MAX_SHORT_STRING);
    }

    #[test]
    fn short_string_respects_char_boundaries() {
        // 63 ASCII bytes then a 2-byte char that would straddle the limit
        let input = format!("{}é", "a".repeat(MAX_SHORT_STRING - 1));
        let s = short_string(&input);
        assert_eq!(s.len(), MAX_SHORT_STRING - 1);
        assert!(s.chars().all(|c| c == 'a'));
    }

    #[test]
    fn builder_pattern() {
        let config = Config::default()
            .with_device(
                DeviceConfig::default()
                    .with_host("plotter.lan")
                    .with_delimiter(b'\n'),
            )
            .with_session(
                SessionConfig::default()
                    .with_auto_connect(false)
                    .with_auto_start(false)
                    .with_dispatch_timeout_ms(2500),
            );

        assert_eq!(config.device.host.as_str(), "plotter.lan");
        assert_eq!(config.device.delimiter, b'\n');
        assert!(!config.session.auto_connect);
        assert!(!config.session.auto_start);
        assert_eq!(
            config.session.dispatch_timeout(),
            Some(Duration::from_millis(2500))
        );
    }

    #[test]
    fn capacities_never_zero() {
        let session = SessionConfig::default()
            .with_request_capacity(0)
            .with_event_capacity(0);
        assert_eq!(session.request_capacity, 1);
        assert_eq!(session.event_capacity, 1);
    }
}
