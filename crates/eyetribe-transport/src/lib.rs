//! TCP transport and message framing for Eye Tribe tracker connections.
//!
//! The tracker server speaks newline-delimited JSON over a single TCP
//! stream. This crate owns that stream and the framing:
//! - [`TrackerStream`] : a connected socket whose clones can be shut down
//!   from any thread
//! - [`LineReader`] / [`LineWriter`] : blocking, whole-message reads and writes
//! - [`JsonLineCodec`] : the same framing for `tokio_util::codec` (behind `async`)
//!
//! `eyetribe-session` drives the blocking reader and writer from its own
//! threads. `JsonLineCodec` is public API for applications that already run
//! an async runtime and want to wrap their own socket in `Framed`, with the
//! same delimiter and size limit as the blocking path.
//!
//! No protocol semantics live here.

pub mod error;
pub mod framing;
pub mod reader;
pub mod stream;
pub mod writer;

#[cfg(feature = "async")]
pub mod codec;

pub use error::{Result, TransportError};
pub use framing::{decode_message, encode_message, LineConfig, DEFAULT_MAX_MESSAGE, DELIMITER};
pub use reader::LineReader;
pub use stream::TrackerStream;
pub use writer::LineWriter;

#[cfg(feature = "async")]
pub use codec::JsonLineCodec;
