use std::io::Cursor;
use bytes::{Buf, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::{debug, trace};

use crate::transport::TransportError;
use crate::{FrameDecodeError, TcpFrame};

const READ_BUFFER_SIZE: usize = 1024 * 8;

/// represents TcpFrame transport reader
/// read new frames from underlying buffer.
pub struct TransportReader {
    buffer: BytesMut,
    reader: Box<dyn AsyncRead + Send + Unpin>,
    max_payload_size: u32,
}

impl TransportReader {
    pub fn new<T>(reader: T, initial: BytesMut, max_payload_size: u32) -> Self
    where
        T: AsyncRead + Send + Unpin + 'static,
    {
        let mut buffer = BytesMut::with_capacity(READ_BUFFER_SIZE.max(initial.len()));
        buffer.extend_from_slice(&initial);

        Self {
            buffer,
            reader: Box::new(reader),
            max_payload_size,
        }
    }

    pub fn with_max_payload_size(mut self, max_payload_size: u32) -> Self {
        self.max_payload_size = max_payload_size;
        self
    }

    /// checks if underling buffer has new frame available.
    /// if does, it will parse and return available frame.
    fn parse_frame(&mut self) -> Result<Option<TcpFrame>, FrameDecodeError> {
        let mut cursor = Cursor::new(&self.buffer[..]);
        match TcpFrame::check(&mut cursor, self.max_payload_size) {
            Ok(_) => {
                let position = cursor.position() as usize;
                cursor.set_position(0);

                let frame = TcpFrame::parse(&mut cursor)?;
                self.buffer.advance(position);

                Ok(Some(frame))
            }
            Err(FrameDecodeError::Incomplete) => Ok(None),
            Err(err) => Err(err),
        }
    }

    /// tries getting next frame from underling buffer.
    pub async fn next(&mut self) -> Result<Option<TcpFrame>, TransportError> {
        loop {
            if let Some(frame) = self.parse_frame()? {
                trace!("received {}", frame);
                return Ok(Some(frame));
            }

            // when we read 0 from socket. it could mean two things.
            // if the buffer is empty, the peer disconnected gracefully.
            // if the buffer is not empty, the socket closed in the middle of a frame.
            if 0 == self.reader.read_buf(&mut self.buffer).await? {
                trace!("read 0 bytes from peer.");
                if self.buffer.is_empty() {
                    debug!("received 0 bytes from peer, and buffer is empty.");
                    return Ok(None);
                }

                return Err(TransportError::Truncated);
            }
        }
    }
}
