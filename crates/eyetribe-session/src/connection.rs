use std::sync::mpsc::RecvTimeoutError;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use eyetribe_protocol::{is_ok, status_name, Notice, ProtocolMessage, Request};
use eyetribe_transport::{LineConfig, LineReader, LineWriter, TrackerStream, TransportError};
use tracing::{debug, trace, warn};

use crate::config::{Endpoint, SessionConfig};
use crate::error::{Result, SessionError};
use crate::handshake::TrackerInfo;
use crate::link::{lock, Link};
use crate::receiver;
use crate::Mode;

/// One live TCP connection: the write half, the receiver thread and the
/// state they share.
pub(crate) struct Connection {
    stream: TrackerStream,
    writer: Mutex<LineWriter<TrackerStream>>,
    pub(crate) link: Arc<Link>,
    receiver: Mutex<Option<JoinHandle<()>>>,
    info: OnceLock<TrackerInfo>,
    /// Held across a whole mode change, never by the receiver.
    transition: Mutex<()>,
    push: AtomicBool,
    heartbeats: bool,
    last_heartbeat: Mutex<Instant>,
}

impl Connection {
    /// Connect and start the receiver. No protocol traffic is sent yet.
    pub(crate) fn open(endpoint: &Endpoint, config: &SessionConfig) -> Result<Self> {
        let stream =
            TrackerStream::connect(endpoint.host(), endpoint.port(), config.connect_timeout)
                .map_err(SessionError::Connection)?;

        let line_config = LineConfig {
            max_message_size: config.max_message_size,
            read_timeout: None,
            write_timeout: Some(config.request_timeout),
        };
        let reader = LineReader::with_config_stream(stream.try_clone()?, line_config.clone())?;
        let writer = LineWriter::with_config_stream(stream.try_clone()?, line_config)?;

        let link = Arc::new(Link::new(config));
        let handle = receiver::spawn(reader, Arc::clone(&link))
            .map_err(|err| SessionError::Transport(TransportError::Io(err)))?;
        debug!(peer = %stream.peer_addr(), "receiver started");

        Ok(Self {
            stream,
            writer: Mutex::new(writer),
            link,
            receiver: Mutex::new(Some(handle)),
            info: OnceLock::new(),
            transition: Mutex::new(()),
            push: AtomicBool::new(false),
            heartbeats: config.heartbeats,
            last_heartbeat: Mutex::new(Instant::now()),
        })
    }

    pub(crate) fn mode(&self) -> Mode {
        if self.push.load(Ordering::Acquire) {
            Mode::Push
        } else {
            Mode::Pull
        }
    }

    pub(crate) fn set_mode(&self, mode: Mode) {
        self.push.store(mode == Mode::Push, Ordering::Release);
    }

    /// Serialize mode changes on this connection.
    pub(crate) fn begin_transition(&self) -> MutexGuard<'_, ()> {
        lock(&self.transition)
    }

    pub(crate) fn info(&self) -> Option<&TrackerInfo> {
        self.info.get()
    }

    pub(crate) fn set_info(&self, info: TrackerInfo) {
        let _ = self.info.set(info);
    }

    /// Send `request` and wait for the reply that answers it.
    ///
    /// Non-OK replies become [`SessionError::Device`].
    pub(crate) fn call(&self, request: Request, timeout: Duration) -> Result<ProtocolMessage> {
        let payload = request.encode()?;
        let id = request.id();
        let reply = self.link.pending.register(&request)?;

        if let Err(err) = self.write(&payload) {
            self.link.pending.cancel(id);
            return Err(err);
        }
        trace!(id, verb = request.verb(), "request sent");

        let msg = match reply.recv_timeout(timeout) {
            Ok(msg) => msg,
            Err(RecvTimeoutError::Timeout) => {
                self.link.pending.cancel(id);
                return Err(SessionError::Timeout(timeout));
            }
            Err(RecvTimeoutError::Disconnected) => return Err(SessionError::ConnectionClosed),
        };

        if !is_ok(msg.status) {
            let message = msg
                .status_message()
                .unwrap_or_else(|| status_name(msg.status))
                .to_string();
            return Err(SessionError::Device {
                code: msg.status,
                message,
            });
        }
        Ok(msg)
    }

    /// Send a message that expects no correlated reply.
    pub(crate) fn notify(&self, notice: &Notice) -> Result<()> {
        self.write(&notice.encode()?)
    }

    fn write(&self, payload: &[u8]) -> Result<()> {
        if self.link.is_closed() {
            return Err(SessionError::ConnectionClosed);
        }
        lock(&self.writer).send(payload).map_err(SessionError::from)
    }

    /// Send a heartbeat if the tracker's announced interval has elapsed.
    pub(crate) fn keep_alive(&self) -> Result<()> {
        if !self.heartbeats {
            return Ok(());
        }
        let Some(interval) = self.info().and_then(TrackerInfo::heartbeat_interval) else {
            return Ok(());
        };

        let mut last = lock(&self.last_heartbeat);
        if last.elapsed() < interval {
            return Ok(());
        }
        self.notify(&Notice::heartbeat())?;
        *last = Instant::now();
        trace!("heartbeat sent");
        Ok(())
    }

    /// Close the connection and join the receiver.
    ///
    /// With `say_goodbye`, a best-effort disconnect notice goes out first.
    /// Safe to call more than once.
    pub(crate) fn shutdown(&self, say_goodbye: bool) {
        if say_goodbye && !self.link.is_closed() {
            if let Err(err) = self.notify(&Notice::disconnect()) {
                debug!(error = %err, "disconnect notice not delivered");
            }
        }

        let pending = self.link.pending.len();
        if self.link.close() {
            debug!(
                failed_requests = pending,
                queued = self.link.frames.len(),
                "connection shut down"
            );
        }
        self.stream.shutdown();

        let handle = lock(&self.receiver).take();
        if let Some(handle) = handle {
            // A filter calling back into the session runs on the receiver itself.
            if handle.thread().id() == thread::current().id() {
                return;
            }
            if handle.join().is_err() {
                warn!("receiver thread panicked");
            }
        }
    }
}
