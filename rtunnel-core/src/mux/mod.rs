//! Stream multiplexer running on top of one control connection.
//!
//! Two tasks own the physical connection: a reader that decodes frames and
//! routes them to the streams, and a writer that drains one bounded queue of
//! outgoing frames. Streams only ever talk to the queue, so at most one task
//! writes to the socket and a slow stream cannot hold frames of other streams
//! that were queued after it.
//!
//! Every stream has its own send window. A writer on a stream whose reader
//! falls behind runs out of credit and suspends, while the reader task keeps
//! routing frames for every other stream.

mod credit;
mod event;
mod registry;
mod stream;

pub use event::StreamEvent;
pub use stream::{IncomingStreams, LogicalStream};

use stream::StreamShared;

use std::fmt;
use std::sync::Arc;

use bytes::BytesMut;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc::{self, Receiver, UnboundedReceiver};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::framing::{StreamOpen, MAX_PAYLOAD_SIZE};
use crate::mux::event::Dispatcher;
use crate::mux::registry::StreamRegistry;
use crate::transport::{TcpFrameTransport, TransportReader, TransportWriter};
use crate::TcpFrame;

pub type StreamId = u32;

/// which end of the control connection a multiplexer runs on.
/// only the server opens streams; the client accepts them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Server,
    Client,
}

impl Side {
    pub fn opens_streams(&self) -> bool {
        matches!(self, Side::Server)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// the peer sent CLOSE for the stream.
    Remote,
    /// the stream was closed through its own handle.
    Local,
    LocalTargetUnreachable,
    /// the peer sent something that is not a valid frame.
    MultiplexerFault,
    /// the control connection went away.
    ConnectionClosed,
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            CloseReason::Remote => "closed by peer",
            CloseReason::Local => "closed locally",
            CloseReason::LocalTargetUnreachable => "local target unreachable",
            CloseReason::MultiplexerFault => "multiplexer fault",
            CloseReason::ConnectionClosed => "connection closed",
        };

        write!(f, "{}", msg)
    }
}

#[derive(Debug, Error)]
pub enum MuxError {
    #[error("multiplexer is closed: {0}")]
    Closed(CloseReason),
    #[error("only the server side may open streams")]
    OpenNotPermitted,
    #[error("stream ids exhausted")]
    StreamIdsExhausted,
    #[error("stream id {0} was already used on this connection")]
    StreamIdReused(StreamId),
    #[error("peer attempted to open stream {0}")]
    UnexpectedOpen(StreamId),
    #[error("peer sent more data on stream {0} than it was granted")]
    WindowExceeded(StreamId),
    #[error("peer granted more credit on stream {0} than a window can hold")]
    WindowOverflow(StreamId),
}

#[derive(Debug, Clone)]
pub struct MuxConfig {
    /// largest DATA payload accepted from the peer and produced locally.
    pub max_payload_size: u32,
    /// outgoing frames that may wait for the socket before writers suspend.
    pub write_queue_size: usize,
}

impl Default for MuxConfig {
    fn default() -> Self {
        Self {
            max_payload_size: MAX_PAYLOAD_SIZE,
            write_queue_size: 256,
        }
    }
}

pub struct Multiplexer {
    side: Side,
    shared: StreamShared,
    cancellation_token: CancellationToken,
}

impl Multiplexer {
    /// takes over both halves of a connection and starts the reader and
    /// writer tasks. `initial` holds frame bytes that were already read.
    pub fn start<R, W>(
        reader: R,
        writer: W,
        initial: BytesMut,
        side: Side,
        config: MuxConfig,
    ) -> (Arc<Multiplexer>, IncomingStreams)
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let (reader, writer) = TcpFrameTransport::new(reader, writer, initial).split();
        let reader = reader.with_max_payload_size(config.max_payload_size);

        let registry = Arc::new(StreamRegistry::new());
        let cancellation_token = CancellationToken::new();
        let (sender, receiver) = mpsc::channel::<TcpFrame>(config.write_queue_size.max(1));
        let (control, control_receiver) = mpsc::unbounded_channel();
        let (incoming_sender, incoming_receiver) = mpsc::unbounded_channel();

        let shared = StreamShared {
            registry: registry.clone(),
            outbound: sender,
            control,
            max_payload_size: config.max_payload_size as usize,
        };
        let dispatcher = Dispatcher::new(side, shared.clone(), incoming_sender);

        tokio::spawn(read_frames(reader, dispatcher, registry.clone(), cancellation_token.clone()));
        tokio::spawn(write_frames(
            writer,
            control_receiver,
            receiver,
            registry,
            cancellation_token.clone(),
        ));

        let multiplexer = Arc::new(Self {
            side,
            shared,
            cancellation_token,
        });

        (multiplexer, IncomingStreams::new(incoming_receiver))
    }

    pub fn side(&self) -> Side {
        self.side
    }

    /// opens a new stream with the next free id.
    pub async fn open_stream(&self) -> Result<LogicalStream, MuxError> {
        if !self.side.opens_streams() {
            return Err(MuxError::OpenNotPermitted);
        }

        let (stream_id, channels) = self.shared.registry.allocate()?;
        let frame = TcpFrame::Open(StreamOpen::new(stream_id));
        if self.shared.outbound.send(frame).await.is_err() {
            self.shared.registry.remove(stream_id);
            let reason = self.close_reason().unwrap_or(CloseReason::ConnectionClosed);
            return Err(MuxError::Closed(reason));
        }

        debug!("opened stream {}", stream_id);
        Ok(LogicalStream::new(stream_id, channels, &self.shared))
    }

    /// number of streams that are not closed in both directions yet.
    pub fn stream_count(&self) -> usize {
        self.shared.registry.len()
    }

    pub fn is_closed(&self) -> bool {
        self.cancellation_token.is_cancelled()
    }

    pub fn close_reason(&self) -> Option<CloseReason> {
        self.shared.registry.close_reason()
    }

    /// resolves once the control connection is closed.
    pub async fn closed(&self) -> CloseReason {
        self.cancellation_token.cancelled().await;
        self.close_reason().unwrap_or(CloseReason::ConnectionClosed)
    }

    /// closes the control connection and every stream on it.
    pub fn close(&self) {
        finish(&self.shared.registry, &self.cancellation_token, CloseReason::ConnectionClosed);
    }
}

impl Drop for Multiplexer {
    fn drop(&mut self) {
        self.close();
    }
}

impl fmt::Debug for Multiplexer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Multiplexer")
            .field("side", &self.side)
            .field("streams", &self.stream_count())
            .field("closed", &self.is_closed())
            .finish()
    }
}

fn finish(registry: &StreamRegistry, cancellation_token: &CancellationToken, reason: CloseReason) {
    if registry.shutdown(reason) {
        debug!("multiplexer closed: {}", reason);
    }

    cancellation_token.cancel();
}

async fn read_frames(
    mut reader: TransportReader,
    dispatcher: Dispatcher,
    registry: Arc<StreamRegistry>,
    cancellation_token: CancellationToken,
) {
    let reason = tokio::select! {
        reason = receive(&mut reader, &dispatcher) => reason,
        _ = cancellation_token.cancelled() => CloseReason::ConnectionClosed,
    };

    finish(&registry, &cancellation_token, reason);
}

async fn receive(reader: &mut TransportReader, dispatcher: &Dispatcher) -> CloseReason {
    loop {
        match reader.next().await {
            Ok(Some(frame)) => {
                if let Err(err) = dispatcher.dispatch(frame.into()) {
                    warn!("multiplexer fault: {}", err);
                    return CloseReason::MultiplexerFault;
                }
            }
            Ok(None) => {
                debug!("control connection closed by peer");
                return CloseReason::ConnectionClosed;
            }
            Err(err) if err.is_protocol_error() => {
                warn!("multiplexer fault: {}", err);
                return CloseReason::MultiplexerFault;
            }
            Err(err) => {
                debug!("control connection lost: {}", err);
                return CloseReason::ConnectionClosed;
            }
        }
    }
}

async fn write_frames(
    mut writer: TransportWriter,
    mut control: UnboundedReceiver<TcpFrame>,
    mut receiver: Receiver<TcpFrame>,
    registry: Arc<StreamRegistry>,
    cancellation_token: CancellationToken,
) {
    loop {
        // window updates jump the queue.
        let frame = tokio::select! {
            biased;
            _ = cancellation_token.cancelled() => break,
            Some(frame) = control.recv() => frame,
            frame = receiver.recv() => match frame {
                Some(frame) => frame,
                None => break,
            },
        };

        let result = tokio::select! {
            result = writer.send(&frame) => result,
            _ = cancellation_token.cancelled() => break,
        };

        if let Err(err) = result {
            debug!("failed to write frame to control connection: {}", err);
            break;
        }

        if let TcpFrame::Close(close) = &frame {
            registry.local_closed(close.stream_id());
        }
    }

    finish(&registry, &cancellation_token, CloseReason::ConnectionClosed);
    receiver.close();

    trace!("shutting down control connection writer");
    let _ = writer.shutdown().await;
}
