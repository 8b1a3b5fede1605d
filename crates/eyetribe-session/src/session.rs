use std::fmt;
use std::mem;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use eyetribe_protocol::{GazeFrame, ProtocolError, Request, VALUE_FRAME};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::{Endpoint, SessionConfig};
use crate::connection::Connection;
use crate::error::{Result, SessionError};
use crate::handshake::{self, TrackerInfo};
use crate::link::{lock, FrameFilter};
use crate::queue::Pop;

/// How frames are obtained from the tracker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Each `next()` asks the tracker for its current frame.
    Pull,
    /// The tracker streams frames; `next()` takes them from a queue.
    Push,
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Pull => f.write_str("pull"),
            Mode::Push => f.write_str("push"),
        }
    }
}

/// Observable session state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Never connected, handshake failed, or the connection was lost.
    Disconnected,
    /// `connect()` is in progress.
    Connecting,
    Connected(Mode),
    /// `close()` was called; terminal.
    Closed,
}

enum Lifecycle {
    Disconnected,
    Connecting(Option<Arc<Connection>>),
    Connected(Arc<Connection>),
    Closed,
}

/// A client session with one Eye Tribe tracker server.
///
/// All methods take `&self`, so a session can be shared with another thread
/// that calls [`Session::close`] to wake a blocked [`Session::next`]. Frame
/// retrieval itself expects a single consumer.
///
/// ```no_run
/// use eyetribe_session::{Endpoint, Session};
///
/// let session = Session::new(Endpoint::default());
/// session.connect()?;
/// session.pushmode()?;
/// for _ in 0..30 {
///     let frame = session.next()?;
///     println!("{}", frame.to_record(";"));
/// }
/// session.close();
/// # Ok::<(), eyetribe_session::SessionError>(())
/// ```
pub struct Session {
    endpoint: Endpoint,
    config: SessionConfig,
    next_id: AtomicU64,
    lifecycle: Mutex<Lifecycle>,
}

impl Session {
    /// Create a disconnected session with default configuration.
    pub fn new(endpoint: Endpoint) -> Self {
        Self::with_config(endpoint, SessionConfig::default())
    }

    pub fn with_config(endpoint: Endpoint, config: SessionConfig) -> Self {
        Self {
            endpoint,
            config,
            next_id: AtomicU64::new(1),
            lifecycle: Mutex::new(Lifecycle::Disconnected),
        }
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    fn lifecycle(&self) -> MutexGuard<'_, Lifecycle> {
        lock(&self.lifecycle)
    }

    fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Connect, start the receiver and perform the handshake.
    ///
    /// On success the session is connected in pull mode. On failure the
    /// connection is torn down and the session stays disconnected, so
    /// `connect()` may be retried.
    pub fn connect(&self) -> Result<()> {
        let stale = {
            let mut state = self.lifecycle();
            match &*state {
                Lifecycle::Closed => return Err(SessionError::Closed),
                Lifecycle::Connecting(_) => return Err(SessionError::AlreadyConnected),
                Lifecycle::Connected(conn) if !conn.link.is_closed() => {
                    return Err(SessionError::AlreadyConnected)
                }
                _ => {}
            }
            mem::replace(&mut *state, Lifecycle::Connecting(None))
        };
        if let Lifecycle::Connected(lost) = stale {
            lost.shutdown(false);
        }

        info!(endpoint = %self.endpoint, "connecting to tracker");
        let conn = match Connection::open(&self.endpoint, &self.config) {
            Ok(conn) => Arc::new(conn),
            Err(err) => {
                self.abandon_connect();
                return Err(err);
            }
        };

        {
            let mut state = self.lifecycle();
            match &mut *state {
                Lifecycle::Connecting(slot) => *slot = Some(Arc::clone(&conn)),
                _ => {
                    drop(state);
                    conn.shutdown(false);
                    return Err(SessionError::Closed);
                }
            }
        }

        let outcome = handshake::perform(&conn, &self.config, || self.next_id());

        let mut state = self.lifecycle();
        let still_connecting =
            matches!(&*state, Lifecycle::Connecting(Some(c)) if Arc::ptr_eq(c, &conn));
        if !still_connecting {
            drop(state);
            conn.shutdown(false);
            return Err(SessionError::Closed);
        }

        match outcome {
            Ok(tracker) => {
                info!(
                    endpoint = %self.endpoint,
                    version = tracker.version,
                    framerate = tracker.framerate,
                    calibrated = tracker.is_calibrated,
                    "connected to tracker"
                );
                conn.set_info(tracker);
                *state = Lifecycle::Connected(conn);
                Ok(())
            }
            Err(err) => {
                *state = Lifecycle::Disconnected;
                drop(state);
                warn!(endpoint = %self.endpoint, error = %err, "handshake failed");
                conn.shutdown(false);
                Err(err)
            }
        }
    }

    fn abandon_connect(&self) {
        let mut state = self.lifecycle();
        if matches!(&*state, Lifecycle::Connecting(_)) {
            *state = Lifecycle::Disconnected;
        }
    }

    fn connection(&self) -> Result<Arc<Connection>> {
        match &*self.lifecycle() {
            Lifecycle::Connected(conn) => Ok(Arc::clone(conn)),
            Lifecycle::Closed => Err(SessionError::ConnectionClosed),
            Lifecycle::Disconnected | Lifecycle::Connecting(_) => Err(SessionError::NotConnected),
        }
    }

    pub fn state(&self) -> SessionState {
        match &*self.lifecycle() {
            Lifecycle::Disconnected => SessionState::Disconnected,
            Lifecycle::Connecting(_) => SessionState::Connecting,
            Lifecycle::Connected(conn) if conn.link.is_closed() => SessionState::Disconnected,
            Lifecycle::Connected(conn) => SessionState::Connected(conn.mode()),
            Lifecycle::Closed => SessionState::Closed,
        }
    }

    /// Current mode, or `None` when not connected.
    pub fn mode(&self) -> Option<Mode> {
        match self.state() {
            SessionState::Connected(mode) => Some(mode),
            _ => None,
        }
    }

    /// Values the tracker reported during the handshake.
    pub fn tracker_info(&self) -> Option<TrackerInfo> {
        match &*self.lifecycle() {
            Lifecycle::Connected(conn) => conn.info().cloned(),
            _ => None,
        }
    }

    /// Ask the tracker to stream frames. No request is sent if already in push mode.
    pub fn pushmode(&self) -> Result<()> {
        self.enter_push(None)
    }

    /// Like [`Session::pushmode`], but only frames for which `filter` returns
    /// `true` are queued; `false` discards the frame. The filter selects
    /// frames to keep, it does not consume them.
    ///
    /// The filter runs on the receiver thread. Calling this while already in
    /// push mode replaces the filter without contacting the tracker.
    pub fn pushmode_with_filter<F>(&self, filter: F) -> Result<()>
    where
        F: Fn(&GazeFrame) -> bool + Send + Sync + 'static,
    {
        self.enter_push(Some(Arc::new(filter)))
    }

    fn enter_push(&self, filter: Option<FrameFilter>) -> Result<()> {
        let conn = self.connection()?;
        let _transition = conn.begin_transition();
        ensure_live(&conn)?;

        if conn.mode() == Mode::Push {
            if let Some(filter) = filter {
                conn.link.replace_filter(filter);
            }
            return Ok(());
        }

        conn.keep_alive()?;
        // Accept streamed frames before the request goes out so none racing
        // the reply are lost.
        conn.link.set_streaming(true, filter);
        let request = Request::set_push(self.next_id(), true);
        match conn.call(request, self.config.request_timeout) {
            Ok(_) => {
                conn.set_mode(Mode::Push);
                info!("push mode enabled");
                Ok(())
            }
            Err(err) => {
                conn.link.set_streaming(false, None);
                Err(err)
            }
        }
    }

    /// Ask the tracker to stop streaming. Frames already queued remain
    /// available to `next()`. No request is sent if already in pull mode.
    pub fn pullmode(&self) -> Result<()> {
        let conn = self.connection()?;
        let _transition = conn.begin_transition();
        ensure_live(&conn)?;

        if conn.mode() == Mode::Pull {
            return Ok(());
        }

        conn.keep_alive()?;
        conn.call(
            Request::set_push(self.next_id(), false),
            self.config.request_timeout,
        )?;
        conn.link.set_streaming(false, None);
        conn.set_mode(Mode::Pull);
        info!("pull mode enabled");
        Ok(())
    }

    /// Retrieve the next gaze frame.
    ///
    /// In pull mode this requests the current frame (after draining anything
    /// left over from push mode). In push mode it takes the oldest queued
    /// frame, waiting up to `frame_timeout`; after a connection loss the queue
    /// is drained before [`SessionError::ConnectionClosed`] is returned.
    pub fn next(&self) -> Result<GazeFrame> {
        let conn = self.connection()?;
        match conn.mode() {
            Mode::Push => {
                keep_alive_quietly(&conn);
                match conn.link.frames.pop_timeout(self.config.frame_timeout) {
                    Pop::Frame(frame) => Ok(frame),
                    Pop::Empty => Err(SessionError::Timeout(self.config.frame_timeout)),
                    Pop::Closed => Err(SessionError::ConnectionClosed),
                }
            }
            Mode::Pull => {
                if let Pop::Frame(frame) = conn.link.frames.try_pop() {
                    return Ok(frame);
                }
                conn.keep_alive()?;
                self.poll(&conn)
            }
        }
    }

    /// Non-blocking variant of [`Session::next`] for push mode.
    ///
    /// Returns `Ok(None)` when no frame is queued. In pull mode this is
    /// `next()` wrapped in `Some`.
    pub fn try_next(&self) -> Result<Option<GazeFrame>> {
        let conn = self.connection()?;
        match conn.mode() {
            Mode::Push => {
                keep_alive_quietly(&conn);
                match conn.link.frames.try_pop() {
                    Pop::Frame(frame) => Ok(Some(frame)),
                    Pop::Empty => Ok(None),
                    Pop::Closed => Err(SessionError::ConnectionClosed),
                }
            }
            Mode::Pull => self.next().map(Some),
        }
    }

    fn poll(&self, conn: &Connection) -> Result<GazeFrame> {
        let reply = conn.call(
            Request::get_frame(self.next_id()),
            self.config.request_timeout,
        )?;
        GazeFrame::from_message(&reply)
            .ok_or(SessionError::Protocol(ProtocolError::MissingField(VALUE_FRAME)))
    }

    /// Close the session: notify the tracker, stop the receiver and wake
    /// every blocked caller. Idempotent; the session cannot be reconnected.
    pub fn close(&self) {
        let previous = mem::replace(&mut *self.lifecycle(), Lifecycle::Closed);
        match previous {
            Lifecycle::Connected(conn) => {
                conn.shutdown(true);
                info!(endpoint = %self.endpoint, "session closed");
            }
            Lifecycle::Connecting(Some(conn)) => {
                conn.shutdown(false);
                info!(endpoint = %self.endpoint, "connect aborted by close");
            }
            Lifecycle::Connecting(None) | Lifecycle::Disconnected | Lifecycle::Closed => {}
        }
    }
}

/// Heartbeat failures in push mode surface through the queue instead.
/// Mode changes on a lost connection fail even when no request would be sent.
fn ensure_live(conn: &Connection) -> Result<()> {
    if conn.link.is_closed() {
        return Err(SessionError::ConnectionClosed);
    }
    Ok(())
}

fn keep_alive_quietly(conn: &Connection) {
    if let Err(err) = conn.keep_alive() {
        debug!(error = %err, "heartbeat not sent");
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.close();
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("endpoint", &self.endpoint)
            .field("state", &self.state())
            .finish()
    }
}
