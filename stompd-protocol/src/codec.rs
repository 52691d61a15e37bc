//! Incremental frame decoder.

use crate::error::ProtocolError;
use crate::frame::Frame;
use crate::{FRAME_TERMINATOR, MAX_FRAME_SIZE};
use bytes::BytesMut;

/// Assembles STOMP frames from a raw byte stream.
///
/// Bytes are appended with [`extend`](FrameCodec::extend) in whatever chunks
/// the transport delivers; [`decode_frame`](FrameCodec::decode_frame) yields
/// a frame once a NUL terminator has arrived. Partial frames are buffered
/// across calls, so chunk boundaries never affect the decoded sequence.
#[derive(Debug, Default)]
pub struct FrameCodec {
    buffer: BytesMut,
}

impl FrameCodec {
    pub fn new() -> Self {
        Self {
            buffer: BytesMut::with_capacity(4096),
        }
    }

    /// Appends raw bytes to the internal buffer.
    pub fn extend(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Attempts to decode the next complete frame.
    ///
    /// Returns `Ok(Some(frame))` when a full frame was assembled, `Ok(None)`
    /// when more bytes are needed, or `Err` when the buffered content is
    /// malformed or exceeds [`MAX_FRAME_SIZE`] without a terminator.
    pub fn decode_frame(&mut self) -> Result<Option<Frame>, ProtocolError> {
        match self.buffer.iter().position(|&b| b == FRAME_TERMINATOR) {
            Some(pos) => {
                let content = self.buffer.split_to(pos + 1);
                let frame = Frame::parse(&content[..pos])?;
                Ok(Some(frame))
            }
            None => {
                if self.buffer.len() > MAX_FRAME_SIZE {
                    return Err(ProtocolError::FrameTooLarge {
                        size: self.buffer.len(),
                        max: MAX_FRAME_SIZE,
                    });
                }
                Ok(None)
            }
        }
    }

    /// Returns the number of bytes currently buffered.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }
}
