use std::io::Cursor;

use crate::framing::frame_types::OPEN;
use crate::framing::FrameHeader;
use crate::{Frame, FrameDecodeError};

#[derive(Debug, PartialEq, Eq, Clone)]
pub struct StreamOpen {
    stream_id: u32,
}

impl StreamOpen {
    pub fn new(stream_id: u32) -> Self {
        Self { stream_id }
    }

    pub fn stream_id(&self) -> u32 {
        self.stream_id
    }
}

impl Frame for StreamOpen {
    fn decode(header: &FrameHeader, _buffer: &mut Cursor<&[u8]>) -> Result<Self, FrameDecodeError> {
        Ok(Self::new(header.stream_id()))
    }

    fn encode(&self) -> Vec<u8> {
        let mut buffer = Vec::new();
        FrameHeader::new(self.stream_id, OPEN, 0).encode(&mut buffer);

        buffer
    }
}
