use tracing::trace;

use crate::TcpFrame;
use tokio::io::{AsyncWrite, AsyncWriteExt};

/// represents TcpFrame transport writer.
/// writes TcpFrames into underlying buffer.
pub struct TransportWriter {
    writer: Box<dyn AsyncWrite + Send + Unpin>,
}

impl TransportWriter {
    pub fn new<T>(writer: T) -> Self
    where
        T: AsyncWrite + Send + Unpin + 'static,
    {
        Self {
            writer: Box::new(writer),
        }
    }

    /// writes TcpFrame into underlying tcp stream.
    pub async fn send(&mut self, frame: &TcpFrame) -> std::io::Result<()> {
        let mut buffer = frame.to_buffer();
        let bytes_written = buffer.len();

        self.writer.write_all_buf(&mut buffer).await?;
        self.writer.flush().await?;
        trace!("written {} bytes to socket.", bytes_written);

        Ok(())
    }

    pub async fn shutdown(&mut self) -> std::io::Result<()> {
        self.writer.shutdown().await
    }
}
