use std::io::Cursor;
use bytes::BufMut;

use crate::framing::frame_types::WINDOW;
use crate::framing::FrameHeader;
use crate::io::get_u32;
use crate::{Frame, FrameDecodeError};

/// grants the peer `increment` more bytes of DATA on this stream.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct WindowUpdate {
    stream_id: u32,
    increment: u32,
}

impl WindowUpdate {
    pub const PAYLOAD_SIZE: u32 = 4;

    pub fn new(stream_id: u32, increment: u32) -> Self {
        Self {
            stream_id,
            increment,
        }
    }

    pub fn stream_id(&self) -> u32 {
        self.stream_id
    }

    pub fn increment(&self) -> u32 {
        self.increment
    }
}

impl Frame for WindowUpdate {
    fn decode(header: &FrameHeader, buffer: &mut Cursor<&[u8]>) -> Result<Self, FrameDecodeError> {
        let increment = get_u32(buffer)?;

        Ok(Self::new(header.stream_id(), increment))
    }

    fn encode(&self) -> Vec<u8> {
        let mut buffer = Vec::with_capacity(crate::framing::HEADER_SIZE + Self::PAYLOAD_SIZE as usize);
        FrameHeader::new(self.stream_id, WINDOW, Self::PAYLOAD_SIZE).encode(&mut buffer);
        buffer.put_u32(self.increment);

        buffer
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;
    use crate::framing::frame_types::WINDOW;
    use crate::framing::{FrameHeader, WindowUpdate};
    use crate::Frame;

    #[test]
    pub fn should_encode_increment_after_header() {
        // Arrange
        let update = WindowUpdate::new(3, 0x0102_0304);

        // Act
        let result = update.encode();

        // Assert
        assert_eq!(&result[..], &[0, 0, 0, 3, WINDOW, 0, 0, 0, 4, 1, 2, 3, 4]);
    }

    #[test]
    pub fn should_decode_increment() {
        // Arrange
        let buffer = vec![0, 0, 0, 9, WINDOW, 0, 0, 0, 4, 0, 1, 0, 0];
        let mut cursor = Cursor::new(&buffer[..]);
        let header = FrameHeader::decode(&mut cursor).unwrap();

        // Act
        let result = WindowUpdate::decode(&header, &mut cursor).unwrap();

        // Assert
        assert_eq!(result, WindowUpdate::new(9, 65536));
    }
}
