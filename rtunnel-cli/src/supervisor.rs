use std::time::Duration;

use async_trait::async_trait;
use mockall::automock;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use rtunnel_core::control::{ControlChannel, ControlError, ControlOptions};
use rtunnel_core::mux::CloseReason;

use crate::LocalConnector;

/// how many times the client may connect and how long it waits in between.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
    /// start counting from zero again after every successful connection.
    /// off by default: sessions that end count as failures and the client
    /// gives up after `max_attempts` of them in total.
    pub reset_on_connect: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            delay: Duration::from_secs(10),
            reset_on_connect: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryState {
    attempts: u32,
    max_attempts: u32,
    delay: Duration,
}

impl RetryState {
    pub fn new(policy: &RetryPolicy) -> Self {
        Self {
            attempts: 0,
            max_attempts: policy.max_attempts,
            delay: policy.delay,
        }
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    pub fn record_failure(self) -> Self {
        Self {
            attempts: self.attempts.saturating_add(1),
            ..self
        }
    }

    pub fn reset(self) -> Self {
        Self { attempts: 0, ..self }
    }

    pub fn is_exhausted(&self) -> bool {
        self.attempts >= self.max_attempts
    }
}

#[derive(Debug, Error)]
pub enum SupervisorError {
    #[error("could not keep a connection to the server after {attempts} attempts")]
    Exhausted { attempts: u32 },
}

#[automock]
#[async_trait]
pub trait ControlDialer: Send + Sync {
    /// connects to the server and serves the session until it closes.
    /// `Ok` means the connection was established at some point.
    async fn run_session(&self) -> Result<CloseReason, ControlError>;
}

/// dials the server over TCP and forwards its streams to the local service.
#[derive(Debug)]
pub struct TcpDialer {
    server_addr: String,
    options: ControlOptions,
    connector: LocalConnector,
}

impl TcpDialer {
    pub fn new(server_addr: &str, options: ControlOptions, connector: LocalConnector) -> Self {
        Self {
            server_addr: server_addr.to_owned(),
            options,
            connector,
        }
    }
}

#[async_trait]
impl ControlDialer for TcpDialer {
    async fn run_session(&self) -> Result<CloseReason, ControlError> {
        let mut channel = ControlChannel::connect(self.server_addr.as_str(), &self.options).await?;
        info!(
            "connected to {}, forwarding to {}",
            self.server_addr,
            self.connector.target()
        );

        if let Some(incoming) = channel.take_incoming() {
            let connector = self.connector.clone();
            tokio::spawn(async move { connector.serve(incoming).await });
        }

        Ok(channel.closed().await)
    }
}

/// keeps dialing the server until the retry budget is spent.
pub struct Supervisor<D: ControlDialer> {
    dialer: D,
    policy: RetryPolicy,
}

impl<D: ControlDialer> Supervisor<D> {
    pub fn new(dialer: D, policy: RetryPolicy) -> Self {
        Self { dialer, policy }
    }

    /// runs until cancelled (`Ok`) or out of attempts.
    pub async fn run(&self, cancellation_token: CancellationToken) -> Result<(), SupervisorError> {
        let mut state = RetryState::new(&self.policy);

        loop {
            debug!(
                "dialing server, attempt {} of {}",
                state.attempts() + 1,
                self.policy.max_attempts
            );

            let outcome = tokio::select! {
                outcome = self.dialer.run_session() => outcome,
                _ = cancellation_token.cancelled() => return Ok(()),
            };

            state = self.next_state(state, outcome);
            if state.is_exhausted() {
                error!("giving up after {} attempts", state.attempts());
                return Err(SupervisorError::Exhausted {
                    attempts: state.attempts(),
                });
            }

            info!("reconnecting in {:?}", state.delay());
            tokio::select! {
                _ = tokio::time::sleep(state.delay()) => {},
                _ = cancellation_token.cancelled() => return Ok(()),
            }
        }
    }

    fn next_state(&self, state: RetryState, outcome: Result<CloseReason, ControlError>) -> RetryState {
        match outcome {
            Ok(reason) => {
                warn!("connection to server closed: {}", reason);
                let state = match self.policy.reset_on_connect {
                    true => state.reset(),
                    false => state,
                };

                state.record_failure()
            }
            Err(err) => {
                warn!("failed to connect to server: {}", err);
                state.record_failure()
            }
        }
    }
}
