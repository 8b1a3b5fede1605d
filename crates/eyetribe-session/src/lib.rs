//! Client session for the Eye Tribe tracker server.
//!
//! A [`Session`] owns one TCP connection and a background receiver thread.
//! It performs the handshake, switches between pull mode (one request per
//! frame) and push mode (the tracker streams frames into a queue), and
//! correlates replies with the requests that caused them.
//!
//! Lifecycle: `Disconnected` → `connect()` → `Connected(Pull)` ⇄
//! `Connected(Push)` → `close()` → `Closed`. A lost connection returns the
//! session to `Disconnected`; there is no automatic reconnect.

pub mod config;
mod connection;
pub mod error;
pub mod handshake;
mod link;
mod pending;
mod queue;
mod receiver;
pub mod session;

pub use config::{Endpoint, SessionConfig};
pub use error::{Result, SessionError};
pub use handshake::TrackerInfo;
pub use link::FrameFilter;
pub use session::{Mode, Session, SessionState};

pub use eyetribe_protocol::{GazeFrame, Point, Side, TrackingState};
