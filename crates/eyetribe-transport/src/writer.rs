use std::io::{ErrorKind, Write};

use bytes::BytesMut;

use crate::error::{Result, TransportError};
use crate::framing::{encode_message, LineConfig};
use crate::stream::TrackerStream;

const INITIAL_BUFFER_CAPACITY: usize = 1024;

/// Writes newline-delimited messages to any `Write` stream.
///
/// Each call to [`LineWriter::send`] writes one whole message; the caller is
/// responsible for not interleaving writers on the same stream.
pub struct LineWriter<T> {
    inner: T,
    buf: BytesMut,
    config: LineConfig,
}

impl<T: Write> LineWriter<T> {
    /// Create a new line writer with default configuration.
    pub fn new(inner: T) -> Self {
        Self::with_config(inner, LineConfig::default())
    }

    /// Create a new line writer with explicit configuration.
    pub fn with_config(inner: T, config: LineConfig) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            config,
        }
    }

    /// Append the delimiter to `payload` and write the whole message (blocking).
    pub fn send(&mut self, payload: &[u8]) -> Result<()> {
        if payload.len() > self.config.max_message_size {
            return Err(TransportError::MessageTooLarge {
                size: payload.len(),
                max: self.config.max_message_size,
            });
        }

        self.buf.clear();
        encode_message(payload, &mut self.buf);

        let mut offset = 0usize;
        while offset < self.buf.len() {
            match self.inner.write(&self.buf[offset..]) {
                Ok(0) => return Err(TransportError::ConnectionClosed),
                Ok(n) => offset += n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(TransportError::Io(err)),
            }
        }

        self.flush()
    }

    /// Flush the underlying stream.
    pub fn flush(&mut self) -> Result<()> {
        loop {
            match self.inner.flush() {
                Ok(()) => return Ok(()),
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(TransportError::Io(err)),
            }
        }
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    /// Consume the writer and return the inner stream.
    pub fn into_inner(self) -> T {
        self.inner
    }
}

impl LineWriter<TrackerStream> {
    /// Create a line writer for `TrackerStream` and apply write timeout from config.
    pub fn with_config_stream(inner: TrackerStream, config: LineConfig) -> Result<Self> {
        inner.set_write_timeout(config.write_timeout)?;
        Ok(Self::with_config(inner, config))
    }
}
