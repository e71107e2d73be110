//! Device session: connection lifecycle, queueing and pen tracking.
//!
//! [`LineUs`] is a cheap, cloneable handle to a session task that owns the
//! connection. All drawing calls are queued and sent one at a time; each
//! call resolves when the device has answered *that* command.
//!
//! # Lifecycle
//!
//! | State | Entered when |
//! |-------|--------------|
//! | `disconnected` | initially, and whenever the connection closes |
//! | `connecting` | [`LineUs::connect`] (or spawn with `auto_connect`) |
//! | `connected` | the hello frame arrives |
//! | `drawing` | right after the handshake with `auto_start`, or [`LineUs::resume`] |
//! | `paused` | [`LineUs::pause`], [`LineUs::stop`], or after the handshake without `auto_start` |
//!
//! Closing the connection fails the command in flight, discards everything
//! queued and returns to `disconnected`. Nothing reconnects on its own.
//!
//! # Example
//!
//! ```rust
//! use rs_lineus::config::SessionConfig;
//! use rs_lineus::hal::MockDevice;
//! use rs_lineus::{Coordinate, LineUs, PenState};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), rs_lineus::Error> {
//! let device = MockDevice::new();
//! let plotter = LineUs::spawn(device.clone(), SessionConfig::default());
//!
//! // Calls issued together still go out one at a time, in order
//! let (a, b) = tokio::join!(
//!     plotter.move_to(Coordinate::xy(0.0, 0.0)),
//!     plotter.line_to(Coordinate::xy(500.0, 500.0)),
//! );
//! a?;
//! assert_eq!(b?.position.map(|p| p.x), Some(500.0));
//! assert_eq!(plotter.queued_pen_state(), PenState::Down);
//! assert_eq!(device.max_outstanding(), 1);
//! # Ok(())
//! # }
//! ```

mod actor;
pub mod state;

pub use state::{Reply, SessionEvent, SessionSnapshot, SessionState};

use tokio::sync::{broadcast, mpsc, oneshot, watch};

use crate::commands::Command;
use crate::config::{Config, SessionConfig};
use crate::coordinates::{to_machine, Coordinate, Position, PEN_DOWN_Z, PEN_UP_Z};
use crate::error::Error;
use crate::hal::TcpConnector;
use crate::pen::PenState;
use crate::protocol::Fields;
use crate::traits::Connector;

use actor::{Request, SessionActor};

/// Handle to a device session.
///
/// Cloning is cheap; all clones drive the same session. The session task
/// stops and closes its connection once every clone has been dropped.
#[derive(Clone, Debug)]
pub struct LineUs {
    requests: mpsc::Sender<Request>,
    snapshot: watch::Receiver<SessionSnapshot>,
    events: broadcast::Sender<SessionEvent>,
}

impl LineUs {
    /// Spawns a session on the current tokio runtime.
    ///
    /// Connects immediately when `config.auto_connect` is set.
    ///
    /// # Panics
    ///
    /// Panics if called outside a tokio runtime.
    pub fn spawn<C: Connector>(connector: C, config: SessionConfig) -> Self {
        let (requests, rx) = mpsc::channel(config.request_capacity.max(1));
        let (snapshot_tx, snapshot) = watch::channel(SessionSnapshot::default());
        let (events, _) = broadcast::channel(config.event_capacity.max(1));

        let actor = SessionActor::new(connector, config, rx, snapshot_tx, events.clone());
        tokio::spawn(actor.run());

        Self {
            requests,
            snapshot,
            events,
        }
    }

    /// Spawns a session talking TCP to the configured device.
    pub fn from_config(config: &Config) -> Self {
        Self::spawn(
            TcpConnector::from_config(&config.device),
            config.session.clone(),
        )
    }

    async fn request<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<T>) -> Request,
    ) -> Result<T, Error> {
        let (tx, rx) = oneshot::channel();
        self.requests
            .send(make(tx))
            .await
            .map_err(|_| Error::SessionClosed)?;
        rx.await.map_err(|_| Error::SessionClosed)
    }

    // ========================================================================
    // Connection
    // ========================================================================

    /// Opens the connection and waits for the handshake.
    ///
    /// Resolves immediately if already connected.
    pub async fn connect(&self) -> Result<(), Error> {
        self.request(Request::Connect).await?
    }

    /// Closes the connection. Queued commands fail with
    /// [`Error::Discarded`].
    pub async fn disconnect(&self) -> Result<(), Error> {
        self.request(Request::Disconnect).await?
    }

    /// Waits until the session reaches `state`.
    pub async fn wait_for_state(&self, state: SessionState) -> Result<(), Error> {
        let mut snapshot = self.snapshot.clone();
        snapshot
            .wait_for(|s| s.state == state)
            .await
            .map(|_| ())
            .map_err(|_| Error::SessionClosed)
    }

    // ========================================================================
    // Commands
    // ========================================================================

    /// Queues a raw command.
    ///
    /// An explicit Z updates the tracked pen state; `G28` always leaves it
    /// up.
    pub async fn send(&self, cmd: Command) -> Result<Reply, Error> {
        self.request(|tx| Request::Send(cmd, tx)).await?
    }

    /// Moves to a logical coordinate exactly as given, with no pen handling.
    pub async fn to(&self, target: Coordinate) -> Result<Reply, Error> {
        self.send(Command::linear_move(&to_machine(&target))).await
    }

    /// Travels to `target`, lifting the pen on the way if it is down.
    pub async fn move_to(&self, target: Coordinate) -> Result<Reply, Error> {
        self.request(|tx| Request::MoveTo(target, tx)).await?
    }

    /// Draws a line to `target`, lowering the pen first if it is up.
    pub async fn line_to(&self, target: Coordinate) -> Result<Reply, Error> {
        self.request(|tx| Request::LineTo(target, tx)).await?
    }

    /// Lifts the pen in place.
    pub async fn pen_up(&self) -> Result<Reply, Error> {
        self.to(Coordinate::new().with_z(PEN_UP_Z)).await
    }

    /// Lowers the pen in place.
    pub async fn pen_down(&self) -> Result<Reply, Error> {
        self.to(Coordinate::new().with_z(PEN_DOWN_Z)).await
    }

    /// Returns to the home position, pen up.
    pub async fn home(&self) -> Result<Reply, Error> {
        self.send(Command::home()).await
    }

    /// Asks the device where it is. Updates [`coordinates`](Self::coordinates).
    pub async fn get_position(&self) -> Result<Reply, Error> {
        self.send(Command::get_position()).await
    }

    /// Firmware and hardware information.
    pub async fn get_capabilities(&self) -> Result<Reply, Error> {
        self.send(Command::get_capabilities()).await
    }

    /// Device diagnostics.
    pub async fn get_diagnostics(&self) -> Result<Reply, Error> {
        self.send(Command::get_diagnostics()).await
    }

    /// Renames the device.
    pub async fn set_name(&self, name: &str) -> Result<Reply, Error> {
        self.send(Command::set_name(name)).await
    }

    /// Stores network credentials on the device.
    pub async fn set_wifi(&self, ssid: &str, password: &str) -> Result<Reply, Error> {
        self.send(Command::set_wifi(ssid, password)).await
    }

    /// Puts the device into calibration mode.
    pub async fn calibration_mode(&self) -> Result<Reply, Error> {
        self.send(Command::calibration_mode()).await
    }

    /// Saves the current calibration.
    pub async fn save_calibration(&self) -> Result<Reply, Error> {
        self.send(Command::save_calibration()).await
    }

    /// Clears the stored calibration.
    pub async fn clear_calibration(&self) -> Result<Reply, Error> {
        self.send(Command::clear_calibration()).await
    }

    // ========================================================================
    // Queue control
    // ========================================================================

    /// Pauses after the command in flight.
    ///
    /// With `lift`, a lowered pen is raised before the session settles in
    /// `paused`, and lowered again as the first thing after
    /// [`resume`](Self::resume). Resolves immediately if the queue is not
    /// running or a pause is already on its way.
    pub async fn pause(&self, lift: bool) -> Result<(), Error> {
        self.request(|ack| Request::Pause { lift, ack }).await?
    }

    /// Resumes dispatching queued commands.
    pub async fn resume(&self) -> Result<(), Error> {
        self.request(Request::Resume).await?
    }

    /// Discards queued commands that have not been sent. The command in
    /// flight still completes. Returns how many were discarded.
    pub async fn clear(&self) -> Result<usize, Error> {
        self.request(Request::Clear).await
    }

    /// Pauses immediately and discards everything queued.
    pub async fn stop(&self) -> Result<usize, Error> {
        self.request(Request::Stop).await
    }

    // ========================================================================
    // Observation
    // ========================================================================

    /// Current state.
    pub fn state(&self) -> SessionState {
        self.snapshot.borrow().state
    }

    /// Last reported logical position.
    pub fn coordinates(&self) -> Option<Position> {
        self.snapshot.borrow().coordinates
    }

    /// Fields of the hello frame, keys lower-cased.
    pub fn info(&self) -> Fields {
        self.snapshot.borrow().info.clone()
    }

    /// Pen state once every queued command has run.
    pub fn queued_pen_state(&self) -> PenState {
        self.snapshot.borrow().queued_pen
    }

    /// Everything above in one consistent copy.
    pub fn snapshot(&self) -> SessionSnapshot {
        self.snapshot.borrow().clone()
    }

    /// Receiver that sees every snapshot change.
    pub fn watch(&self) -> watch::Receiver<SessionSnapshot> {
        self.snapshot.clone()
    }

    /// Subscribes to state, coordinate and error events.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }
}
