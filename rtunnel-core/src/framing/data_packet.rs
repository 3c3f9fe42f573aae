use std::io::Cursor;
use bytes::{BufMut, Bytes};

use crate::framing::frame_types::DATA;
use crate::framing::FrameHeader;
use crate::io::get_buffer;
use crate::{Frame, FrameDecodeError};

#[derive(Debug, PartialEq, Eq, Clone)]
pub struct DataPacket {
    stream_id: u32,
    buffer: Bytes,
}

impl DataPacket {
    pub fn new(stream_id: u32, buffer: Bytes) -> Self {
        Self { stream_id, buffer }
    }

    pub fn stream_id(&self) -> u32 {
        self.stream_id
    }

    pub fn buffer(&self) -> &Bytes {
        &self.buffer
    }

    pub fn into_buffer(self) -> Bytes {
        self.buffer
    }
}

impl Frame for DataPacket {
    fn decode(header: &FrameHeader, buffer: &mut Cursor<&[u8]>) -> Result<Self, FrameDecodeError> {
        let payload = get_buffer(buffer, header.payload_len())?;

        Ok(DataPacket::new(header.stream_id(), Bytes::from(payload)))
    }

    fn encode(&self) -> Vec<u8> {
        let mut final_buff = Vec::with_capacity(crate::framing::HEADER_SIZE + self.buffer.len());
        FrameHeader::new(self.stream_id, DATA, self.buffer.len() as u32).encode(&mut final_buff);
        final_buff.put_slice(&self.buffer[..]);

        final_buff
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;
    use bytes::{BufMut, Bytes};
    use crate::framing::frame_types::DATA;
    use crate::framing::{DataPacket, FrameHeader};
    use crate::test_util::generate_random_buffer;
    use crate::{is_type, Frame, FrameDecodeError};

    #[test]
    pub fn should_decode_data_packet() {
        // Arrange
        let payload = generate_random_buffer(1024).freeze();
        let mut buffer = Vec::new();
        FrameHeader::new(12, DATA, payload.len() as u32).encode(&mut buffer);
        buffer.put_slice(&payload[..]);

        let mut cursor = Cursor::new(&buffer[..]);
        let header = FrameHeader::decode(&mut cursor).unwrap();

        // Act
        let result = DataPacket::decode(&header, &mut cursor).unwrap();

        // Assert
        assert_eq!(result.stream_id(), 12);
        assert_eq!(result.buffer(), &payload);
    }

    #[test]
    pub fn decode_should_return_incomplete_if_payload_is_missing() {
        // Arrange
        let mut buffer = Vec::new();
        FrameHeader::new(12, DATA, 10).encode(&mut buffer);
        buffer.put_slice(b"short");

        let mut cursor = Cursor::new(&buffer[..]);
        let header = FrameHeader::decode(&mut cursor).unwrap();

        // Act
        let result = DataPacket::decode(&header, &mut cursor);

        // Assert
        assert!(is_type!(result.unwrap_err(), FrameDecodeError::Incomplete));
    }

    #[test]
    pub fn should_encode_header_and_payload() {
        // Arrange
        let packet = DataPacket::new(1, Bytes::from_static(b"PING"));

        // Act
        let result = packet.encode();

        // Assert
        assert_eq!(&result[..], &[0, 0, 0, 1, DATA, 0, 0, 0, 4, b'P', b'I', b'N', b'G']);
    }
}
