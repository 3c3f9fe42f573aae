use std::io::Cursor;

use crate::framing::frame_types::CLOSE;
use crate::framing::FrameHeader;
use crate::{Frame, FrameDecodeError};

/// half-close: the sender will not write any more DATA for this stream.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct StreamClose {
    stream_id: u32,
}

impl StreamClose {
    pub fn new(stream_id: u32) -> Self {
        Self { stream_id }
    }

    pub fn stream_id(&self) -> u32 {
        self.stream_id
    }
}

impl Frame for StreamClose {
    fn decode(header: &FrameHeader, _buffer: &mut Cursor<&[u8]>) -> Result<Self, FrameDecodeError> {
        Ok(Self::new(header.stream_id()))
    }

    fn encode(&self) -> Vec<u8> {
        let mut buffer = Vec::new();
        FrameHeader::new(self.stream_id, CLOSE, 0).encode(&mut buffer);

        buffer
    }
}
