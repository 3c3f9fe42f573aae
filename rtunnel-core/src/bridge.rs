use std::io;

use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, trace};

/// bytes moved by one bridge, per direction.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BridgeStats {
    pub left_to_right: u64,
    pub right_to_left: u64,
}

/// copies bytes both ways between two streams until both directions reached
/// EOF. EOF on one side shuts down the write half of the other, so a
/// half-closed connection keeps flowing in the opposite direction.
pub async fn bridge<L, R>(left: &mut L, right: &mut R) -> io::Result<BridgeStats>
where
    L: AsyncRead + AsyncWrite + Unpin + ?Sized,
    R: AsyncRead + AsyncWrite + Unpin + ?Sized,
{
    match tokio::io::copy_bidirectional(left, right).await {
        Ok((left_to_right, right_to_left)) => {
            trace!("bridge finished, {} bytes out, {} bytes back", left_to_right, right_to_left);
            Ok(BridgeStats {
                left_to_right,
                right_to_left,
            })
        }
        Err(err) => {
            debug!("bridge aborted: {}", err);
            Err(err)
        }
    }
}

#[cfg(test)]
mod tests {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    use super::*;
    use crate::test_util::generate_random_buffer;

    #[tokio::test]
    async fn should_propagate_half_close() {
        // Arrange
        let (mut left_outer, mut left_inner) = tokio::io::duplex(1024);
        let (mut right_inner, mut right_outer) = tokio::io::duplex(1024);
        let handle = tokio::spawn(async move { bridge(&mut left_inner, &mut right_inner).await });
        let request = generate_random_buffer(4096);

        // Act
        left_outer.write_all(&request).await.unwrap();
        left_outer.shutdown().await.unwrap();

        let mut received = Vec::new();
        right_outer.read_to_end(&mut received).await.unwrap();
        right_outer.write_all(b"reply").await.unwrap();
        right_outer.shutdown().await.unwrap();

        let mut reply = Vec::new();
        left_outer.read_to_end(&mut reply).await.unwrap();

        // Assert
        assert_eq!(&received[..], &request[..]);
        assert_eq!(&reply, b"reply");
        let stats = handle.await.unwrap().unwrap();
        assert_eq!(stats.left_to_right, 4096);
        assert_eq!(stats.right_to_left, 5);
    }
}
