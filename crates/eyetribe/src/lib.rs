//! Client for the Eye Tribe eye tracker.
//!
//! The tracker server speaks newline-delimited JSON over TCP (port 6555 by
//! default). A [`Session`] connects, performs the handshake and delivers
//! [`GazeFrame`]s either on request (pull mode) or as the tracker streams
//! them (push mode).
//!
//! # Crate Structure
//!
//! - [`transport`]: TCP stream and line framing
//! - [`protocol`]: message codec, status codes and the gaze frame model
//! - [`session`]: handshake, modes, receiver thread (behind `session` feature)

/// Re-export transport types.
pub mod transport {
    pub use eyetribe_transport::*;
}

/// Re-export protocol types.
pub mod protocol {
    pub use eyetribe_protocol::*;
}

/// Re-export session types (requires `session` feature).
#[cfg(feature = "session")]
pub mod session {
    pub use eyetribe_session::*;
}

#[cfg(feature = "session")]
pub use eyetribe_session::{
    Endpoint, GazeFrame, Mode, Session, SessionConfig, SessionError, SessionState, TrackerInfo,
};
