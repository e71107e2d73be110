//! The task that owns a session.
//!
//! Everything mutable about a session lives here: the transport, the
//! command queue, the pen tracker and the published state. Handles only
//! send [`Request`]s, so every mutation happens on this one task and in
//! the order requests were sent.
//!
//! The event loop waits on four sources at once:
//!
//! | Source | Active when |
//! |--------|-------------|
//! | request channel | always |
//! | transport events | a transport is open |
//! | connect task | a connect attempt is running |
//! | dispatch deadline | a command is in flight and a timeout is set |

use std::future::pending;
use std::io;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::{JoinError, JoinHandle};
use tokio::time::{sleep_until, Instant};

use crate::commands::Command;
use crate::config::SessionConfig;
use crate::coordinates::{
    logical_home, to_logical, to_machine, Coordinate, Position, PEN_DOWN_Z, PEN_THRESHOLD_Z,
    PEN_UP_Z,
};
use crate::error::{Error, ProtocolError, TransportError};
use crate::pen::{PenState, PenTracker};
use crate::protocol::{decode, encode, Fields, Response};
use crate::queue::{CommandQueue, Priority};
use crate::session::state::{Reply, SessionEvent, SessionSnapshot, SessionState};
use crate::traits::{Connector, Transport, TransportEvent};

pub(crate) type Responder = oneshot::Sender<Result<Reply, Error>>;
pub(crate) type Ack = oneshot::Sender<Result<(), Error>>;

/// Messages from [`LineUs`](crate::LineUs) handles.
pub(crate) enum Request {
    Connect(Ack),
    Disconnect(Ack),
    /// Raw command, pen tracking from its z only.
    Send(Command, Responder),
    /// Travel move; lifts the pen if it is queued down.
    MoveTo(Coordinate, Responder),
    /// Drawing move; lowers the pen first if it is queued up.
    LineTo(Coordinate, Responder),
    Pause { lift: bool, ack: Ack },
    Resume(Ack),
    Clear(oneshot::Sender<usize>),
    Stop(oneshot::Sender<usize>),
}

/// A unit of queued work.
enum Job {
    Command {
        cmd: Command,
        line: String,
        /// `None` for commands the session injected itself.
        reply: Option<Responder>,
    },
    Pause {
        lift: bool,
        ack: Ack,
    },
}

/// The command currently on the wire.
struct InFlight {
    cmd: Command,
    line: String,
    reply: Option<Responder>,
    /// Set when this is the lift issued by a pause; acked once it lands.
    then_pause: Option<Ack>,
    deadline: Option<Instant>,
}

pub(crate) struct SessionActor<C: Connector> {
    connector: Arc<C>,
    config: SessionConfig,
    requests: mpsc::Receiver<Request>,
    snapshot: watch::Sender<SessionSnapshot>,
    events: broadcast::Sender<SessionEvent>,

    transport: Option<C::Transport>,
    connecting: Option<JoinHandle<Result<C::Transport, TransportError>>>,
    connect_waiters: Vec<Ack>,

    queue: CommandQueue<Job>,
    in_flight: Option<InFlight>,
    pause_pending: bool,
    /// Set by a failed write; nothing is dispatched until resume or close.
    stalled: bool,
    pen: PenTracker,

    state: SessionState,
    coordinates: Option<Position>,
    info: Fields,
}

impl<C: Connector> SessionActor<C> {
    pub(crate) fn new(
        connector: C,
        config: SessionConfig,
        requests: mpsc::Receiver<Request>,
        snapshot: watch::Sender<SessionSnapshot>,
        events: broadcast::Sender<SessionEvent>,
    ) -> Self {
        Self {
            connector: Arc::new(connector),
            config,
            requests,
            snapshot,
            events,
            transport: None,
            connecting: None,
            connect_waiters: Vec::new(),
            queue: CommandQueue::new(),
            in_flight: None,
            pause_pending: false,
            stalled: false,
            pen: PenTracker::new(),
            state: SessionState::Disconnected,
            coordinates: None,
            info: Fields::new(),
        }
    }

    /// Runs until every handle has been dropped.
    pub(crate) async fn run(mut self) {
        if self.config.auto_connect {
            self.begin_connect(None);
        }

        loop {
            let deadline = self.in_flight.as_ref().and_then(|f| f.deadline);

            tokio::select! {
                request = self.requests.recv() => match request {
                    Some(request) => self.handle_request(request).await,
                    None => break,
                },
                event = next_event(&mut self.transport) => {
                    self.handle_transport_event(event).await;
                }
                outcome = connect_outcome(&mut self.connecting) => {
                    self.connecting = None;
                    self.handle_connect_outcome(outcome);
                }
                _ = until(deadline) => self.handle_timeout().await,
            }
        }

        tracing::debug!("all handles dropped, shutting down session");
        if let Some(task) = self.connecting.take() {
            task.abort();
        }
        self.close_transport().await;
    }

    // ========================================================================
    // Requests
    // ========================================================================

    async fn handle_request(&mut self, request: Request) {
        match request {
            Request::Connect(ack) => self.begin_connect(Some(ack)),
            Request::Disconnect(ack) => {
                self.disconnect().await;
                let _ = ack.send(Ok(()));
            }
            Request::Send(cmd, reply) => {
                self.submit(cmd, Some(reply));
                self.pump().await;
            }
            Request::MoveTo(target, reply) => {
                let target = self.pen.plan_move(target);
                self.submit(Command::linear_move(&to_machine(&target)), Some(reply));
                self.pump().await;
            }
            Request::LineTo(target, reply) => {
                if let Some(lower) = self.pen.plan_line() {
                    self.submit(Command::linear_move(&to_machine(&lower)), None);
                }
                self.submit(Command::linear_move(&to_machine(&target)), Some(reply));
                self.pump().await;
            }
            Request::Pause { lift, ack } => {
                if !self.queue.is_running() || self.pause_pending {
                    let _ = ack.send(Ok(()));
                    return;
                }
                if self.stalled {
                    // a lift could not be sent anyway
                    self.queue.pause();
                    self.set_state(SessionState::Paused);
                    let _ = ack.send(Ok(()));
                    return;
                }
                self.pause_pending = true;
                self.queue.push(Job::Pause { lift, ack }, Priority::High);
                self.pump().await;
            }
            Request::Resume(ack) => {
                let result = self.resume();
                let _ = ack.send(result);
                self.pump().await;
            }
            Request::Clear(ack) => {
                let _ = ack.send(self.clear());
            }
            Request::Stop(ack) => {
                self.queue.pause();
                if self.state.is_connected() {
                    self.set_state(SessionState::Paused);
                }
                let _ = ack.send(self.clear());
            }
        }
    }

    /// Encodes, updates pen tracking and queues a command.
    ///
    /// Encoding happens here so a malformed command fails its caller
    /// without touching the tracked pen state.
    fn submit(&mut self, cmd: Command, reply: Option<Responder>) {
        let line = match encode(&cmd) {
            Ok(line) => line,
            Err(e) => {
                match reply {
                    Some(reply) => {
                        let _ = reply.send(Err(e.into()));
                    }
                    None => tracing::warn!(error = %e, "dropping unencodable command"),
                }
                return;
            }
        };

        self.pen.observe(&cmd);
        self.queue
            .push(Job::Command { cmd, line, reply }, Priority::Normal);
        self.publish();
    }

    fn resume(&mut self) -> Result<(), Error> {
        if !self.state.is_connected() {
            return Err(Error::NotConnected);
        }
        self.stalled = false;
        self.queue.start();
        self.set_state(SessionState::Drawing);
        Ok(())
    }

    /// Drops every queued entry. Returns how many were removed.
    fn clear(&mut self) -> usize {
        let running = self.queue.is_running();
        let discarded = self.queue.clear();
        let count = discarded.len();

        for job in discarded {
            match job {
                Job::Command { reply: Some(reply), .. } => {
                    let _ = reply.send(Err(Error::Discarded));
                }
                Job::Command { line, reply: None, .. } => {
                    tracing::debug!(frame = %line, "discarded injected command");
                }
                Job::Pause { ack, .. } => {
                    self.pause_pending = false;
                    // a stop leaves the queue paused, which is what was asked for
                    let _ = ack.send(if running { Err(Error::Discarded) } else { Ok(()) });
                }
            }
        }

        if count > 0 {
            tracing::info!(count, "cleared queued commands");
        }
        self.resync_pen();
        count
    }

    /// Recomputes the queued pen state after the queue was emptied.
    fn resync_pen(&mut self) {
        let from_flight = self.in_flight.as_ref().and_then(|f| {
            if f.cmd.is_home() {
                Some(PenState::Up)
            } else {
                f.cmd.z().map(PenState::from_z)
            }
        });
        let state = from_flight
            .or_else(|| self.coordinates.map(|p| PenState::from_z(p.z)))
            .unwrap_or_default();
        self.pen.reset(state);
        self.publish();
    }

    /// Recomputes the queued pen state from a freshly homed device and
    /// whatever was queued before the handshake.
    fn replay_queued_pen(&mut self) {
        self.pen.reset(PenState::Up);
        for job in self.queue.iter() {
            if let Job::Command { cmd, .. } = job {
                self.pen.observe(cmd);
            }
        }
        self.publish();
    }

    // ========================================================================
    // Connection lifecycle
    // ========================================================================

    fn begin_connect(&mut self, ack: Option<Ack>) {
        match self.state {
            SessionState::Disconnected => {}
            SessionState::Connecting => {
                self.connect_waiters.extend(ack);
                return;
            }
            _ => {
                if let Some(ack) = ack {
                    let _ = ack.send(Ok(()));
                }
                return;
            }
        }

        self.connect_waiters.extend(ack);
        self.set_state(SessionState::Connecting);

        let connector = Arc::clone(&self.connector);
        self.connecting = Some(tokio::spawn(async move { connector.connect().await }));
    }

    fn handle_connect_outcome(
        &mut self,
        outcome: Result<Result<C::Transport, TransportError>, JoinError>,
    ) {
        let err = match outcome {
            Ok(Ok(transport)) => {
                tracing::debug!("transport open, waiting for hello");
                self.transport = Some(transport);
                return;
            }
            Ok(Err(e)) => e,
            Err(e) => TransportError::Io(io::Error::other(e.to_string())),
        };

        tracing::warn!(error = %err, "connect failed");
        self.emit(SessionEvent::Error(format!("connect failed: {}", err)));
        self.set_state(SessionState::Disconnected);

        let message = err.to_string();
        let mut err = Some(err);
        for ack in self.connect_waiters.drain(..) {
            let e = err
                .take()
                .unwrap_or_else(|| TransportError::Io(io::Error::other(message.clone())));
            let _ = ack.send(Err(e.into()));
        }
    }

    /// First frame on a new connection.
    async fn handle_hello(&mut self, frame: &str) {
        let hello = match decode(frame) {
            Ok(hello) => hello,
            Err(e) => {
                tracing::warn!(error = %e, "malformed handshake");
                self.emit(SessionEvent::Error(format!("malformed handshake: {}", e)));
                for ack in self.connect_waiters.drain(..) {
                    let _ = ack.send(Err(e.clone().into()));
                }
                self.close_transport().await;
                return;
            }
        };

        self.info = hello.fields().to_lowercase_keys();
        self.replay_queued_pen();
        tracing::info!(info = ?self.info, "handshake complete");

        self.set_coordinates(logical_home());
        self.set_state(SessionState::Connected);

        if self.config.auto_start {
            self.queue.start();
            self.set_state(SessionState::Drawing);
        } else {
            self.queue.pause();
            self.set_state(SessionState::Paused);
        }

        for ack in self.connect_waiters.drain(..) {
            let _ = ack.send(Ok(()));
        }
        self.pump().await;
    }

    async fn disconnect(&mut self) {
        if let Some(task) = self.connecting.take() {
            task.abort();
        }
        self.close_transport().await;
    }

    async fn close_transport(&mut self) {
        if let Some(mut transport) = self.transport.take() {
            transport.close().await;
        }
        self.handle_closed();
    }

    /// The connection is gone: fail what is in flight, then stop and clear.
    fn handle_closed(&mut self) {
        self.transport = None;

        if let Some(flight) = self.in_flight.take() {
            self.queue.complete();
            self.finish(flight, Err(TransportError::Closed.into()));
        }

        self.queue.pause();
        self.clear();
        self.stalled = false;

        for ack in self.connect_waiters.drain(..) {
            let _ = ack.send(Err(TransportError::Closed.into()));
        }
        self.set_state(SessionState::Disconnected);
    }

    // ========================================================================
    // Transport events
    // ========================================================================

    async fn handle_transport_event(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::Frame(frame) => {
                tracing::debug!(%frame, "received");
                if self.state == SessionState::Connecting {
                    self.handle_hello(&frame).await;
                } else if let Some(flight) = self.in_flight.take() {
                    self.queue.complete();
                    let result = self.interpret(&flight.cmd, &frame);
                    if let Err(Error::Protocol(e)) = &result {
                        self.emit(SessionEvent::Error(format!(
                            "protocol error on {:?}: {}",
                            flight.line, e
                        )));
                    }
                    self.finish(flight, result);
                    self.pump().await;
                } else {
                    tracing::warn!(%frame, "unsolicited frame");
                }
            }
            TransportEvent::Error(message) => {
                tracing::warn!(%message, "transport error");
                self.emit(SessionEvent::Error(format!("transport error: {}", message)));
            }
            TransportEvent::Closed => {
                tracing::info!("connection closed");
                self.handle_closed();
            }
        }
    }

    async fn handle_timeout(&mut self) {
        let Some(flight) = self.in_flight.take() else {
            return;
        };
        let timeout = self.config.dispatch_timeout().unwrap_or(Duration::ZERO);

        tracing::warn!(frame = %flight.line, ?timeout, "dispatch timed out");
        self.queue.complete();
        self.emit(SessionEvent::Error(format!(
            "no response to {:?} within {:?}",
            flight.line, timeout
        )));
        self.finish(flight, Err(TransportError::Timeout(timeout).into()));

        // a late reply would be taken for the next command's
        self.close_transport().await;
    }

    /// Turns the reply to `cmd` into the caller's result.
    ///
    /// A plain `ok` to home leaves the device at its documented home.
    fn interpret(&mut self, cmd: &Command, frame: &str) -> Result<Reply, Error> {
        match decode(frame)? {
            Response::Ok { tag, fields } => {
                let position = match machine_position(&fields)? {
                    Some(machine) => {
                        let logical = to_logical(&machine)?;
                        self.set_coordinates(logical);
                        Some(logical)
                    }
                    None => {
                        if cmd.is_home() {
                            self.set_coordinates(logical_home());
                        }
                        None
                    }
                };
                Ok(Reply {
                    tag,
                    fields,
                    position,
                })
            }
            Response::Error { tag, message, .. } => Err(Error::Device { tag, message }),
            Response::Other { tag, .. } => Err(ProtocolError::UnexpectedResponse(tag).into()),
        }
    }

    // ========================================================================
    // Dispatch
    // ========================================================================

    /// Starts queued work until something is in flight or nothing is ready.
    async fn pump(&mut self) {
        while self.in_flight.is_none() && !self.stalled {
            let Some(entry) = self.queue.next_ready() else {
                break;
            };
            match entry.item {
                Job::Command { cmd, line, reply } => self.dispatch(cmd, line, reply, None).await,
                Job::Pause { lift, ack } => self.begin_pause(lift, ack).await,
            }
        }
    }

    async fn begin_pause(&mut self, lift: bool, ack: Ack) {
        self.pause_pending = false;
        self.queue.pause();

        let lowered = self
            .coordinates
            .map(|p| p.z < PEN_THRESHOLD_Z)
            .unwrap_or(false);

        if lift && lowered {
            tracing::debug!("lifting pen for pause");
            let restore = Command::linear_move(&Coordinate::new().with_z(PEN_DOWN_Z));
            if let Ok(line) = encode(&restore) {
                self.queue.push(
                    Job::Command {
                        cmd: restore,
                        line,
                        reply: None,
                    },
                    Priority::High,
                );
            }
            let up = Command::linear_move(&Coordinate::new().with_z(PEN_UP_Z));
            match encode(&up) {
                Ok(line) => self.dispatch(up, line, None, Some(ack)).await,
                Err(e) => {
                    self.queue.complete();
                    self.set_state(SessionState::Paused);
                    let _ = ack.send(Err(e.into()));
                }
            }
            return;
        }

        self.queue.complete();
        self.set_state(SessionState::Paused);
        let _ = ack.send(Ok(()));
    }

    async fn dispatch(
        &mut self,
        cmd: Command,
        line: String,
        reply: Option<Responder>,
        then_pause: Option<Ack>,
    ) {
        let deadline = self.config.dispatch_timeout().map(|t| Instant::now() + t);
        let flight = InFlight {
            cmd,
            line,
            reply,
            then_pause,
            deadline,
        };

        let sent = match self.transport.as_mut() {
            Some(transport) => {
                tracing::debug!(frame = %flight.line, "dispatch");
                transport.send(&flight.line).await.map_err(Error::from)
            }
            None => Err(Error::NotConnected),
        };

        match sent {
            Ok(()) => self.in_flight = Some(flight),
            Err(e) => {
                if let Error::Transport(t) = &e {
                    tracing::warn!(frame = %flight.line, error = %t, "send failed");
                    self.emit(SessionEvent::Error(format!("send failed: {}", t)));
                }
                // later entries wait for resume or the close that usually follows
                self.stalled = true;
                self.queue.complete();
                self.finish(flight, Err(e));
            }
        }
    }

    /// Delivers the outcome of a dispatched command.
    fn finish(&mut self, flight: InFlight, result: Result<Reply, Error>) {
        if let Some(ack) = flight.then_pause {
            if self.state.is_connected() {
                self.set_state(SessionState::Paused);
            }
            let _ = ack.send(result.map(|_| ()));
            return;
        }

        match flight.reply {
            Some(reply) => {
                let _ = reply.send(result);
            }
            None => {
                if let Err(e) = result {
                    tracing::warn!(frame = %flight.line, error = %e, "injected command failed");
                }
            }
        }
    }

    // ========================================================================
    // State publication
    // ========================================================================

    fn set_state(&mut self, state: SessionState) {
        if self.state == state {
            return;
        }
        tracing::info!(from = %self.state, to = %state, "session state");
        self.state = state;
        self.publish();
        self.emit(SessionEvent::State(state));
    }

    fn set_coordinates(&mut self, position: Position) {
        self.coordinates = Some(position);
        self.publish();
        self.emit(SessionEvent::Coordinates(position));
    }

    fn emit(&self, event: SessionEvent) {
        // no subscribers is fine
        let _ = self.events.send(event);
    }

    fn publish(&self) {
        let next = SessionSnapshot {
            state: self.state,
            coordinates: self.coordinates,
            info: self.info.clone(),
            queued_pen: self.pen.queued(),
        };
        self.snapshot.send_if_modified(|current| {
            if *current == next {
                false
            } else {
                *current = next;
                true
            }
        });
    }
}

/// Position carried by an `ok` reply, in machine space.
///
/// Any of X, Y or Z makes the reply a position report, which must then
/// carry all three as numbers.
fn machine_position(fields: &Fields) -> Result<Option<Coordinate>, ProtocolError> {
    if !["X", "Y", "Z"].iter().any(|key| fields.contains_key(key)) {
        return Ok(None);
    }

    let axis = |axis: char| -> Result<f64, ProtocolError> {
        let raw = fields
            .get_ignore_case(&axis.to_string())
            .ok_or(ProtocolError::MissingAxis(axis))?;
        raw.parse().map_err(|_| ProtocolError::InvalidAxis {
            axis,
            value: raw.to_string(),
        })
    };

    Ok(Some(Coordinate::xyz(axis('X')?, axis('Y')?, axis('Z')?)))
}

async fn next_event<T: Transport>(transport: &mut Option<T>) -> TransportEvent {
    match transport {
        Some(transport) => transport.next_event().await,
        None => pending().await,
    }
}

async fn connect_outcome<T>(task: &mut Option<JoinHandle<T>>) -> Result<T, JoinError> {
    match task {
        Some(task) => task.await,
        None => pending().await,
    }
}

async fn until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => pending().await,
    }
}
