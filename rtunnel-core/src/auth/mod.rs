//! Shared-secret handshake that precedes the frame stream.
//!
//! The client sends `<secret>\n` right after connecting. The server reads one
//! line, compares it with its own secret and either hands the connection over
//! to the multiplexer or answers with [`AUTH_FAILED_MESSAGE`] and closes.

use std::io;
use std::time::Duration;

use bytes::BytesMut;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{trace, warn};

pub const AUTH_FAILED_MESSAGE: &[u8] = b"Authentication failed\n";

/// longest authentication line the server is willing to buffer.
pub const MAX_AUTH_LINE: usize = 1024;

#[derive(Debug, Error)]
pub enum HandshakeError {
    #[error("authentication line ended without a terminator")]
    MissingTerminator,
    #[error("timed out waiting for authentication")]
    Timeout,
    #[error("shared secret did not match")]
    SecretMismatch,
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// reads the authentication line. returns the line without its terminator
/// and whatever followed it in the same reads, which already belongs to the
/// frame stream.
pub async fn read_auth_line<R>(reader: &mut R, timeout: Duration) -> Result<(String, BytesMut), HandshakeError>
where
    R: AsyncRead + Unpin,
{
    match tokio::time::timeout(timeout, read_line(reader)).await {
        Ok(result) => result,
        Err(_) => Err(HandshakeError::Timeout),
    }
}

async fn read_line<R>(reader: &mut R) -> Result<(String, BytesMut), HandshakeError>
where
    R: AsyncRead + Unpin,
{
    let mut buffer = BytesMut::with_capacity(MAX_AUTH_LINE);
    loop {
        if let Some(position) = buffer.iter().position(|byte| *byte == b'\n') {
            if position > MAX_AUTH_LINE {
                return Err(HandshakeError::MissingTerminator);
            }

            let line = buffer.split_to(position + 1);
            let line = String::from_utf8_lossy(&line[..position]).into_owned();
            return Ok((line, buffer));
        }

        if buffer.len() >= MAX_AUTH_LINE {
            return Err(HandshakeError::MissingTerminator);
        }

        if 0 == reader.read_buf(&mut buffer).await? {
            trace!("connection closed before authentication line was complete");
            return Err(HandshakeError::MissingTerminator);
        }
    }
}

pub fn verify(line: &str, secret: &str) -> Result<(), HandshakeError> {
    if line.trim() != secret {
        return Err(HandshakeError::SecretMismatch);
    }

    Ok(())
}

/// client side of the handshake. nothing is read back.
pub async fn write_auth_line<W>(writer: &mut W, secret: &str) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(format!("{}\n", secret).as_bytes()).await?;
    writer.flush().await
}

pub async fn reject<W>(writer: &mut W) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(AUTH_FAILED_MESSAGE).await?;
    writer.flush().await?;
    writer.shutdown().await
}

/// server side of the handshake. on any failure the peer is told so before
/// the error is returned; on success the bytes read past the line are
/// returned.
pub async fn authenticate<S>(stream: &mut S, secret: &str, timeout: Duration) -> Result<BytesMut, HandshakeError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let result = read_auth_line(stream, timeout)
        .await
        .and_then(|(line, remaining)| verify(&line, secret).map(|_| remaining));

    if let Err(err) = &result {
        warn!("authentication failed: {}", err);
        if let Err(err) = reject(stream).await {
            trace!("failed to send authentication failure: {}", err);
        }
    }

    result
}
