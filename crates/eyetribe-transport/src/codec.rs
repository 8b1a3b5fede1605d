//! `tokio_util::codec` adapter for the newline-delimited wire format.
//!
//! ```
//! use bytes::BytesMut;
//! use eyetribe_transport::JsonLineCodec;
//! use tokio_util::codec::Decoder;
//!
//! let mut codec = JsonLineCodec::new();
//! let mut buf = BytesMut::from(&b"{\"category\":\"heartbeat\"}\n{\"cat"[..]);
//! let msg = codec.decode(&mut buf).unwrap().unwrap();
//! assert_eq!(&msg[..], b"{\"category\":\"heartbeat\"}");
//! assert!(codec.decode(&mut buf).unwrap().is_none());
//! ```

use bytes::{Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::error::TransportError;
use crate::framing::{decode_message, encode_message, DEFAULT_MAX_MESSAGE};

/// Decodes and encodes newline-delimited JSON messages for `Framed` streams.
#[derive(Debug, Clone)]
pub struct JsonLineCodec {
    max_message_size: usize,
}

impl JsonLineCodec {
    pub fn new() -> Self {
        Self::with_max_message_size(DEFAULT_MAX_MESSAGE)
    }

    pub fn with_max_message_size(max_message_size: usize) -> Self {
        Self { max_message_size }
    }
}

impl Default for JsonLineCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for JsonLineCodec {
    type Item = Bytes;
    type Error = TransportError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        decode_message(src, self.max_message_size)
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match self.decode(src)? {
            Some(msg) => Ok(Some(msg)),
            None if src.iter().all(u8::is_ascii_whitespace) => {
                src.clear();
                Ok(None)
            }
            None => Err(TransportError::ConnectionClosed),
        }
    }
}

impl Encoder<&[u8]> for JsonLineCodec {
    type Error = TransportError;

    fn encode(&mut self, item: &[u8], dst: &mut BytesMut) -> Result<(), Self::Error> {
        if item.len() > self.max_message_size {
            return Err(TransportError::MessageTooLarge {
                size: item.len(),
                max: self.max_message_size,
            });
        }
        encode_message(item, dst);
        Ok(())
    }
}
