use std::io::{ErrorKind, Read};

use bytes::{Bytes, BytesMut};

use crate::error::{Result, TransportError};
use crate::framing::{decode_message, LineConfig};
use crate::stream::TrackerStream;

const INITIAL_BUFFER_CAPACITY: usize = 8 * 1024;
const READ_CHUNK_SIZE: usize = 8 * 1024;

/// Reads complete newline-delimited messages from any `Read` stream.
///
/// Handles partial reads and several messages per read internally; callers
/// always get exactly one message without its delimiter.
pub struct LineReader<T> {
    inner: T,
    buf: BytesMut,
    config: LineConfig,
}

impl<T: Read> LineReader<T> {
    /// Create a new line reader with default configuration.
    pub fn new(inner: T) -> Self {
        Self::with_config(inner, LineConfig::default())
    }

    /// Create a new line reader with explicit configuration.
    pub fn with_config(inner: T, config: LineConfig) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            config,
        }
    }

    /// Read the next complete message (blocking).
    ///
    /// Returns `Err(TransportError::ConnectionClosed)` on EOF or reset. A
    /// partial trailing message at EOF is discarded.
    pub fn read_message(&mut self) -> Result<Bytes> {
        loop {
            if let Some(msg) = decode_message(&mut self.buf, self.config.max_message_size)? {
                return Ok(msg);
            }

            let mut chunk = [0u8; READ_CHUNK_SIZE];
            let read = match self.inner.read(&mut chunk) {
                Ok(n) => n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => {
                    let err = TransportError::Io(err);
                    if err.is_disconnect() {
                        return Err(TransportError::ConnectionClosed);
                    }
                    return Err(err);
                }
            };

            if read == 0 {
                return Err(TransportError::ConnectionClosed);
            }

            self.buf.extend_from_slice(&chunk[..read]);
        }
    }

    /// Number of buffered bytes not yet returned as a message.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    /// Consume the reader and return the inner stream.
    pub fn into_inner(self) -> T {
        self.inner
    }
}

impl LineReader<TrackerStream> {
    /// Create a line reader for `TrackerStream` and apply read timeout from config.
    pub fn with_config_stream(inner: TrackerStream, config: LineConfig) -> Result<Self> {
        inner.set_read_timeout(config.read_timeout)?;
        Ok(Self::with_config(inner, config))
    }
}
