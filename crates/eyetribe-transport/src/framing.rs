use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{Result, TransportError};

/// Message delimiter used by the tracker server.
pub const DELIMITER: u8 = b'\n';

/// Default maximum message size: 1 MiB.
pub const DEFAULT_MAX_MESSAGE: usize = 1024 * 1024;

/// Append a message and its delimiter to `dst`.
///
/// Wire format:
/// ```text
/// {"category":"tracker","request":"get","id":1,"values":["frame"]}\n
/// ```
///
/// The payload must not itself contain a newline; serialized JSON never does.
pub fn encode_message(payload: &[u8], dst: &mut BytesMut) {
    dst.reserve(payload.len() + 1);
    dst.put_slice(payload);
    dst.put_u8(DELIMITER);
}

/// Split the next complete message off the front of `src`.
///
/// Returns `Ok(None)` if no delimiter has been buffered yet. Blank lines are
/// consumed and skipped; a trailing `\r` is stripped.
pub fn decode_message(src: &mut BytesMut, max_message: usize) -> Result<Option<Bytes>> {
    loop {
        let Some(pos) = src.iter().position(|b| *b == DELIMITER) else {
            if src.len() > max_message {
                return Err(TransportError::MessageTooLarge {
                    size: src.len(),
                    max: max_message,
                });
            }
            return Ok(None);
        };

        if pos > max_message {
            return Err(TransportError::MessageTooLarge {
                size: pos,
                max: max_message,
            });
        }

        let mut line = src.split_to(pos);
        src.advance(1);
        if line.last() == Some(&b'\r') {
            line.truncate(line.len() - 1);
        }

        if line.iter().all(u8::is_ascii_whitespace) {
            continue;
        }

        return Ok(Some(line.freeze()));
    }
}

/// Configuration for line framing.
#[derive(Debug, Clone)]
pub struct LineConfig {
    /// Maximum message size in bytes. Default: 1 MiB.
    pub max_message_size: usize,
    /// Read timeout for blocking operations.
    pub read_timeout: Option<std::time::Duration>,
    /// Write timeout for blocking operations.
    pub write_timeout: Option<std::time::Duration>,
}

impl Default for LineConfig {
    fn default() -> Self {
        Self {
            max_message_size: DEFAULT_MAX_MESSAGE,
            read_timeout: None,
            write_timeout: None,
        }
    }
}
