use std::net::SocketAddr;
use std::time::Duration;

use async_trait::async_trait;
use tokio::net::{TcpListener as TokioTcpListener, TcpStream};
use tracing::{debug, error};

use crate::tcp::SocketListener;
use crate::Result;

#[derive(Debug)]
pub struct TcpListener {
    inner: TokioTcpListener,
}

impl TcpListener {
    pub fn from_tokio(inner: TokioTcpListener) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl SocketListener for TcpListener {
    async fn bind(addr: SocketAddr) -> Result<Self>
    where
        Self: Sized,
    {
        Ok(TcpListener {
            inner: TokioTcpListener::bind(addr).await?,
        })
    }

    /// accepts the next connection. transient accept errors (e.g. running
    /// out of file descriptors) are retried with an exponential backoff.
    async fn accept(&self) -> Result<(TcpStream, SocketAddr)> {
        let mut backoff = 1;
        loop {
            match self.inner.accept().await {
                Ok((stream, addr)) => {
                    debug!("new socket {} connected", addr);
                    return Ok((stream, addr));
                }
                Err(err) => {
                    if backoff > 64 {
                        error!("failed to accept new socket. aborting.. {}", err);
                        return Err(err.into());
                    }

                    error!(
                        "failed to accept new socket at listener {}. retrying.. {}",
                        self.inner.local_addr()?,
                        err
                    );
                }
            };

            tokio::time::sleep(Duration::from_secs(backoff)).await;
            backoff *= 2;
        }
    }

    fn listen_ip(&self) -> Result<SocketAddr> {
        Ok(self.inner.local_addr()?)
    }
}
