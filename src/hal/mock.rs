//! In-process mock device for testing without hardware.
//!
//! [`MockDevice`] is both the device and its [`Connector`]: hand a clone to
//! the session, keep another in the test to script replies and inspect what
//! was sent.
//!
//! # Default behaviour
//!
//! | Request | Reply |
//! |---------|-------|
//! | connect | hello frame (see [`MockDevice::with_hello`]) |
//! | `G01` | `ok X:<x> Y:<y> Z:<z>`, omitted axes hold their value |
//! | `G28` | `ok`, position returns to home |
//! | `M114` | `ok X:<x> Y:<y> Z:<z>` |
//! | anything else parseable | `ok` |
//! | unparseable | `error INFO:"unknown command"` |
//!
//! # Example
//!
//! ```rust
//! use rs_lineus::hal::MockDevice;
//!
//! let device = MockDevice::new();
//! device.script_response(r#"error INFO:"out of range""#);
//! assert_eq!(device.connect_count(), 0);
//! assert!(device.received().is_empty());
//! ```
//!
//! [`Connector`]: crate::traits::Connector

use std::collections::VecDeque;
use std::io;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::sync::mpsc;

use crate::commands::{Command, Value};
use crate::coordinates::{Position, MACHINE_HOME};
use crate::error::TransportError;
use crate::traits::{Connector, Transport, TransportEvent};

/// Hello frame sent on connect unless overridden.
pub const DEFAULT_HELLO: &str =
    r#"hello VERSION:"3.1.1 Sep 24 2018" NAME:"mock-line-us" SERIAL:"000042""#;

#[derive(Debug)]
struct DeviceState {
    hello: String,
    position: Position,
    auto_respond: bool,
    response_delay: Option<Duration>,
    refuse_connect: bool,
    fail_sends: bool,
    scripted: VecDeque<String>,
    received: Vec<String>,
    outstanding: usize,
    max_outstanding: usize,
    connect_count: usize,
    link: Option<Link>,
}

#[derive(Debug)]
struct Link {
    id: usize,
    tx: mpsc::UnboundedSender<TransportEvent>,
}

/// Scriptable in-process device.
///
/// Cheap to clone; all clones share one device.
#[derive(Clone, Debug)]
pub struct MockDevice {
    state: Arc<Mutex<DeviceState>>,
}

impl Default for MockDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl MockDevice {
    /// Creates a device that answers every command immediately.
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(DeviceState {
                hello: DEFAULT_HELLO.to_string(),
                position: MACHINE_HOME,
                auto_respond: true,
                response_delay: None,
                refuse_connect: false,
                fail_sends: false,
                scripted: VecDeque::new(),
                received: Vec::new(),
                outstanding: 0,
                max_outstanding: 0,
                connect_count: 0,
                link: None,
            })),
        }
    }

    /// Sets the hello frame sent on connect.
    pub fn with_hello(self, frame: &str) -> Self {
        self.lock().hello = frame.to_string();
        self
    }

    /// Delays every automatic reply.
    pub fn with_response_delay(self, delay: Duration) -> Self {
        self.lock().response_delay = Some(delay);
        self
    }

    /// Enables or disables automatic replies. When disabled, replies are
    /// sent with [`respond`](Self::respond).
    pub fn with_auto_respond(self, auto_respond: bool) -> Self {
        self.set_auto_respond(auto_respond);
        self
    }

    /// Enables or disables automatic replies.
    pub fn set_auto_respond(&self, auto_respond: bool) {
        self.lock().auto_respond = auto_respond;
    }

    /// Makes the next connect attempts fail.
    pub fn set_refuse_connect(&self, refuse: bool) {
        self.lock().refuse_connect = refuse;
    }

    /// Makes writes fail with a broken pipe while the connection stays
    /// open.
    pub fn set_fail_sends(&self, fail: bool) {
        self.lock().fail_sends = fail;
    }

    /// Queues a reply that replaces the default for the next command.
    pub fn script_response(&self, frame: &str) {
        self.lock().scripted.push_back(frame.to_string());
    }

    /// Sends a reply to the oldest unanswered command.
    ///
    /// Returns false if no connection is open.
    pub fn respond(&self, frame: &str) -> bool {
        let mut state = self.lock();
        state.outstanding = state.outstanding.saturating_sub(1);
        state.deliver(TransportEvent::Frame(frame.to_string()))
    }

    /// Sends a frame nobody asked for.
    pub fn inject_frame(&self, frame: &str) -> bool {
        self.lock().deliver(TransportEvent::Frame(frame.to_string()))
    }

    /// Reports a non-fatal transport error on the open connection.
    pub fn inject_error(&self, message: &str) -> bool {
        self.lock()
            .deliver(TransportEvent::Error(message.to_string()))
    }

    /// Drops the open connection from the device side.
    pub fn drop_connection(&self) {
        let mut state = self.lock();
        if let Some(link) = state.link.take() {
            let _ = link.tx.send(TransportEvent::Closed);
        }
        state.outstanding = 0;
    }

    /// Every frame received so far, in order.
    pub fn received(&self) -> Vec<String> {
        self.lock().received.clone()
    }

    /// Drains the received frames.
    pub fn take_received(&self) -> Vec<String> {
        std::mem::take(&mut self.lock().received)
    }

    /// Commands sent but not yet answered.
    pub fn outstanding(&self) -> usize {
        self.lock().outstanding
    }

    /// Highest number of unanswered commands ever observed.
    pub fn max_outstanding(&self) -> usize {
        self.lock().max_outstanding
    }

    /// Number of successful connects.
    pub fn connect_count(&self) -> usize {
        self.lock().connect_count
    }

    /// True while a connection is open.
    pub fn is_connected(&self) -> bool {
        self.lock().link.is_some()
    }

    /// Current machine-space position.
    pub fn position(&self) -> Position {
        self.lock().position
    }

    fn lock(&self) -> MutexGuard<'_, DeviceState> {
        // poisoned only when a test already panicked
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl DeviceState {
    fn deliver(&self, event: TransportEvent) -> bool {
        match &self.link {
            Some(link) => link.tx.send(event).is_ok(),
            None => false,
        }
    }

    /// Applies a request and builds the default reply.
    fn execute(&mut self, frame: &str) -> String {
        let cmd: Command = match frame.parse() {
            Ok(cmd) => cmd,
            Err(_) => return r#"error INFO:"unknown command""#.to_string(),
        };

        if cmd.is_home() {
            self.position = MACHINE_HOME;
            return "ok".to_string();
        }
        if cmd.is_move() {
            let axis = |key: char, current: f64| {
                cmd.param(key).and_then(Value::as_f64).unwrap_or(current)
            };
            self.position = Position::new(
                axis('X', self.position.x),
                axis('Y', self.position.y),
                axis('Z', self.position.z),
            );
            return self.position_report();
        }
        if cmd.verb() == crate::commands::GET_POSITION {
            return self.position_report();
        }
        "ok".to_string()
    }

    fn position_report(&self) -> String {
        format!(
            "ok X:{} Y:{} Z:{}",
            Value::Number(self.position.x),
            Value::Number(self.position.y),
            Value::Number(self.position.z)
        )
    }
}

impl Connector for MockDevice {
    type Transport = MockTransport;

    async fn connect(&self) -> Result<MockTransport, TransportError> {
        let mut state = self.lock();
        if state.refuse_connect {
            return Err(TransportError::Connect {
                addr: "mock".to_string(),
                source: io::Error::new(io::ErrorKind::ConnectionRefused, "refused by mock"),
            });
        }

        // a new connection replaces any previous one
        if let Some(old) = state.link.take() {
            let _ = old.tx.send(TransportEvent::Closed);
        }

        let (tx, rx) = mpsc::unbounded_channel();
        state.connect_count += 1;
        let id = state.connect_count;
        state.position = MACHINE_HOME;
        state.outstanding = 0;
        let _ = tx.send(TransportEvent::Frame(state.hello.clone()));
        state.link = Some(Link { id, tx });

        Ok(MockTransport {
            id,
            device: self.clone(),
            rx,
            closed: false,
        })
    }
}

/// One connection to a [`MockDevice`].
#[derive(Debug)]
pub struct MockTransport {
    id: usize,
    device: MockDevice,
    rx: mpsc::UnboundedReceiver<TransportEvent>,
    closed: bool,
}

impl Transport for MockTransport {
    async fn send(&mut self, frame: &str) -> Result<(), TransportError> {
        if self.closed {
            return Err(TransportError::Closed);
        }

        let mut state = self.device.lock();
        match &state.link {
            Some(link) if link.id == self.id => {}
            _ => return Err(TransportError::Closed),
        }
        if state.fail_sends {
            return Err(TransportError::Io(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "write failed",
            )));
        }

        state.received.push(frame.to_string());
        state.outstanding += 1;
        state.max_outstanding = state.max_outstanding.max(state.outstanding);

        if !state.auto_respond {
            return Ok(());
        }

        let reply = match state.scripted.pop_front() {
            Some(scripted) => {
                // scripted replies still move the simulated pen
                state.execute(frame);
                scripted
            }
            None => state.execute(frame),
        };

        match state.response_delay {
            None => {
                state.outstanding -= 1;
                state.deliver(TransportEvent::Frame(reply));
            }
            Some(delay) => {
                let device = self.device.clone();
                let id = self.id;
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    let mut state = device.lock();
                    if matches!(&state.link, Some(link) if link.id == id) {
                        state.outstanding = state.outstanding.saturating_sub(1);
                        state.deliver(TransportEvent::Frame(reply));
                    }
                });
            }
        }
        Ok(())
    }

    async fn next_event(&mut self) -> TransportEvent {
        if self.closed {
            return TransportEvent::Closed;
        }
        match self.rx.recv().await {
            Some(TransportEvent::Closed) | None => {
                self.closed = true;
                TransportEvent::Closed
            }
            Some(event) => event,
        }
    }

    async fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        let mut state = self.device.lock();
        if matches!(&state.link, Some(link) if link.id == self.id) {
            if let Some(link) = state.link.take() {
                let _ = link.tx.send(TransportEvent::Closed);
            }
            state.outstanding = 0;
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    async fn expect_frame(t: &mut MockTransport) -> String {
        match t.next_event().await {
            TransportEvent::Frame(f) => f,
            other => panic!("expected frame, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn connect_sends_hello_first() {
        let device = MockDevice::new().with_hello("hello NAME:test");
        let mut t = device.connect().await.unwrap();
        assert_eq!(expect_frame(&mut t).await, "hello NAME:test");
        assert_eq!(device.connect_count(), 1);
        assert!(device.is_connected());
    }

    #[tokio::test]
    async fn move_echoes_position_holding_omitted_axes() {
        let device = MockDevice::new();
        let mut t = device.connect().await.unwrap();
        expect_frame(&mut t).await;

        t.send("G01 X1150 Y500").await.unwrap();
        assert_eq!(expect_frame(&mut t).await, "ok X:1150 Y:500 Z:1000");

        t.send("G01 Z0").await.unwrap();
        assert_eq!(expect_frame(&mut t).await, "ok X:1150 Y:500 Z:0");

        t.send("G28").await.unwrap();
        assert_eq!(expect_frame(&mut t).await, "ok");
        assert_eq!(device.position(), MACHINE_HOME);

        assert_eq!(device.received(), vec!["G01 X1150 Y500", "G01 Z0", "G28"]);
        assert_eq!(device.max_outstanding(), 1);
    }

    #[tokio::test]
    async fn scripted_reply_overrides_default() {
        let device = MockDevice::new();
        let mut t = device.connect().await.unwrap();
        expect_frame(&mut t).await;

        device.script_response(r#"error INFO:"nope""#);
        t.send("M115").await.unwrap();
        assert_eq!(expect_frame(&mut t).await, r#"error INFO:"nope""#);
    }

    #[tokio::test]
    async fn manual_replies() {
        let device = MockDevice::new().with_auto_respond(false);
        let mut t = device.connect().await.unwrap();
        expect_frame(&mut t).await;

        t.send("M114").await.unwrap();
        assert_eq!(device.outstanding(), 1);
        assert!(device.respond("ok X:1 Y:2 Z:3"));
        assert_eq!(device.outstanding(), 0);
        assert_eq!(expect_frame(&mut t).await, "ok X:1 Y:2 Z:3");
    }

    #[tokio::test]
    async fn drop_connection_closes_transport() {
        let device = MockDevice::new();
        let mut t = device.connect().await.unwrap();
        expect_frame(&mut t).await;

        device.drop_connection();
        assert_eq!(t.next_event().await, TransportEvent::Closed);
        assert_eq!(t.next_event().await, TransportEvent::Closed);
        assert!(matches!(t.send("G28").await, Err(TransportError::Closed)));
    }

    #[tokio::test]
    async fn close_from_client_side() {
        let device = MockDevice::new();
        let mut t = device.connect().await.unwrap();
        expect_frame(&mut t).await;

        t.close().await;
        assert!(!device.is_connected());
        assert_eq!(t.next_event().await, TransportEvent::Closed);

        assert!(matches!(t.send("G28").await, Err(TransportError::Closed)));
        assert!(device.received().is_empty());
    }

    #[tokio::test]
    async fn failing_writes_keep_connection_open() {
        let device = MockDevice::new();
        let mut t = device.connect().await.unwrap();
        expect_frame(&mut t).await;

        device.set_fail_sends(true);
        assert!(matches!(t.send("G28").await, Err(TransportError::Io(_))));
        assert!(device.is_connected());
        assert_eq!(device.outstanding(), 0);

        device.set_fail_sends(false);
        t.send("G28").await.unwrap();
        assert_eq!(expect_frame(&mut t).await, "ok");
    }

    #[tokio::test]
    async fn refused_connect() {
        let device = MockDevice::new();
        device.set_refuse_connect(true);
        assert!(matches!(
            device.connect().await,
            Err(TransportError::Connect { .. })
        ));
        assert_eq!(device.connect_count(), 0);
    }

    #[tokio::test]
    async fn unparseable_request_gets_error() {
        let device = MockDevice::new();
        let mut t = device.connect().await.unwrap();
        expect_frame(&mut t).await;

        t.send("G01 123").await.unwrap();
        assert_eq!(
            expect_frame(&mut t).await,
            r#"error INFO:"unknown command""#
        );
    }

    #[tokio::test(start_paused = true)]
    async fn delayed_replies_arrive_after_delay() {
        let device = MockDevice::new().with_response_delay(Duration::from_millis(200));
        let mut t = device.connect().await.unwrap();
        expect_frame(&mut t).await;

        let start = tokio::time::Instant::now();
        t.send("G28").await.unwrap();
        assert_eq!(device.outstanding(), 1);
        assert_eq!(expect_frame(&mut t).await, "ok");
        assert!(start.elapsed() >= Duration::from_millis(200));
        assert_eq!(device.outstanding(), 0);
    }
}
