use std::io::Cursor;
use bytes::BufMut;

use crate::framing::frame_types::{CLOSE, DATA, OPEN, WINDOW};
use crate::framing::WindowUpdate;
use crate::io::{get_u32, get_u8};
use crate::FrameDecodeError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    stream_id: u32,
    opcode: u8,
    payload_len: u32,
}

impl FrameHeader {
    pub fn new(stream_id: u32, opcode: u8, payload_len: u32) -> Self {
        Self {
            stream_id,
            opcode,
            payload_len,
        }
    }

    pub fn stream_id(&self) -> u32 {
        self.stream_id
    }

    pub fn opcode(&self) -> u8 {
        self.opcode
    }

    pub fn payload_len(&self) -> u32 {
        self.payload_len
    }

    pub fn decode(buffer: &mut Cursor<&[u8]>) -> Result<Self, FrameDecodeError> {
        let stream_id = get_u32(buffer)?;
        let opcode = get_u8(buffer)?;
        let payload_len = get_u32(buffer)?;

        Ok(Self::new(stream_id, opcode, payload_len))
    }

    pub fn encode(&self, buffer: &mut Vec<u8>) {
        buffer.put_u32(self.stream_id);
        buffer.put_u8(self.opcode);
        buffer.put_u32(self.payload_len);
    }

    /// rejects headers that can never become a valid frame, before waiting
    /// for the payload to arrive.
    pub fn validate(&self, max_payload_size: u32) -> Result<(), FrameDecodeError> {
        if self.stream_id == 0 {
            return Err("stream id 0 is reserved".into());
        }

        match self.opcode {
            DATA if self.payload_len > max_payload_size => Err(format!(
                "payload length {} exceeds maximum {}",
                self.payload_len, max_payload_size
            )
            .into()),
            DATA => Ok(()),
            OPEN | CLOSE if self.payload_len != 0 => Err(format!(
                "opcode {:#04x} must not carry a payload (got {} bytes)",
                self.opcode, self.payload_len
            )
            .into()),
            OPEN | CLOSE => Ok(()),
            WINDOW if self.payload_len != WindowUpdate::PAYLOAD_SIZE => Err(format!(
                "window update must carry {} bytes (got {})",
                WindowUpdate::PAYLOAD_SIZE,
                self.payload_len
            )
            .into()),
            WINDOW => Ok(()),
            actual => Err(format!("invalid opcode {:#04x}", actual).into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;
    use crate::framing::frame_types::{CLOSE, DATA, OPEN, WINDOW};
    use crate::framing::{FrameHeader, MAX_PAYLOAD_SIZE};
    use crate::{is_type, FrameDecodeError};

    #[test]
    pub fn should_decode_header() {
        // Arrange
        let mut buffer = Vec::new();
        FrameHeader::new(7, DATA, 3).encode(&mut buffer);
        let mut cursor = Cursor::new(&buffer[..]);

        // Act
        let header = FrameHeader::decode(&mut cursor).unwrap();

        // Assert
        assert_eq!(buffer.len(), crate::framing::HEADER_SIZE);
        assert_eq!(header.stream_id(), 7);
        assert_eq!(header.opcode(), DATA);
        assert_eq!(header.payload_len(), 3);
    }

    #[test]
    pub fn decode_should_return_incomplete_on_truncated_header() {
        // Arrange
        let buffer = vec![0u8, 0, 0, 1, DATA, 0, 0];
        let mut cursor = Cursor::new(&buffer[..]);

        // Act
        let result = FrameHeader::decode(&mut cursor);

        // Assert
        assert!(is_type!(result.unwrap_err(), FrameDecodeError::Incomplete));
    }

    #[test]
    pub fn validate_should_reject_oversized_payload() {
        let header = FrameHeader::new(1, DATA, MAX_PAYLOAD_SIZE + 1);
        let result = header.validate(MAX_PAYLOAD_SIZE);

        assert!(is_type!(result.unwrap_err(), FrameDecodeError::Malformed(_)));
    }

    #[test]
    pub fn validate_should_reject_unknown_opcode() {
        let header = FrameHeader::new(1, 0x7f, 0);

        assert!(header.validate(MAX_PAYLOAD_SIZE).is_err());
    }

    #[test]
    pub fn validate_should_reject_reserved_stream_id() {
        let header = FrameHeader::new(0, OPEN, 0);

        assert!(header.validate(MAX_PAYLOAD_SIZE).is_err());
    }

    #[test]
    pub fn validate_should_reject_close_with_payload() {
        let header = FrameHeader::new(3, CLOSE, 1);

        assert!(header.validate(MAX_PAYLOAD_SIZE).is_err());
    }

    #[test]
    pub fn validate_should_require_window_increment() {
        let empty = FrameHeader::new(3, WINDOW, 0);
        let valid = FrameHeader::new(3, WINDOW, 4);

        assert!(empty.validate(MAX_PAYLOAD_SIZE).is_err());
        assert!(valid.validate(MAX_PAYLOAD_SIZE).is_ok());
    }
}
