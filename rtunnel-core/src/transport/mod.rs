pub mod reader;
pub mod writer;

pub use reader::*;
pub use writer::*;

use bytes::BytesMut;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};

use crate::framing::MAX_PAYLOAD_SIZE;
use crate::FrameDecodeError;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error(transparent)]
    Decode(#[from] FrameDecodeError),
    #[error("connection closed in the middle of a frame")]
    Truncated,
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl TransportError {
    /// whether the error means the peer broke the framing contract,
    /// as opposed to the socket going away.
    pub fn is_protocol_error(&self) -> bool {
        !matches!(self, TransportError::Io(_))
    }
}

/// represents TcpFrame buffer transport.
/// pairs a frame reader and writer over the two halves of one connection.
pub struct TcpFrameTransport {
    reader: TransportReader,
    writer: TransportWriter,
}

impl TcpFrameTransport {
    /// creates new instance of TcpFrameTransport.
    /// `initial` holds bytes already read from the connection (e.g. after the
    /// handshake line) that belong to the frame stream.
    pub fn new<R, W>(reader: R, writer: W, initial: BytesMut) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        Self {
            writer: TransportWriter::new(writer),
            reader: TransportReader::new(reader, initial, MAX_PAYLOAD_SIZE),
        }
    }

    /// splits TcpFrameTransport into its reader and writer.
    pub fn split(self) -> (TransportReader, TransportWriter) {
        (self.reader, self.writer)
    }
}
