use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{ready, Context, Poll};

use bytes::{Buf, Bytes};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, ReadBuf};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::mpsc::{Sender, UnboundedReceiver, UnboundedSender};
use tokio_util::sync::PollSender;
use tracing::{debug, trace};

use crate::framing::{DataPacket, StreamClose};
use crate::mux::credit::{ReceiveCredit, SendCredit};
use crate::mux::registry::{StreamChannels, StreamMessage, StreamRegistry};
use crate::mux::{CloseReason, StreamId};
use crate::TcpFrame;

/// what every stream of one multiplexer is wired to.
#[derive(Clone)]
pub(crate) struct StreamShared {
    pub registry: Arc<StreamRegistry>,
    /// DATA, OPEN and CLOSE, in the order the writer task sends them.
    pub outbound: Sender<TcpFrame>,
    /// WINDOW frames, written ahead of the outbound queue.
    pub control: UnboundedSender<TcpFrame>,
    pub max_payload_size: usize,
}

/// one multiplexed, bidirectional byte stream.
///
/// Reading yields the bytes the peer wrote, in order, then EOF once the peer
/// closes its side. If the whole control connection goes away, the pending
/// read fails instead. Writing splits the input into DATA frames and queues
/// them on the connection's single writer. A write suspends while the peer
/// has not granted credit for more data on this stream or while the writer
/// queue is full; nothing is dropped. `shutdown` (or dropping the handle)
/// sends CLOSE.
pub struct LogicalStream {
    id: StreamId,
    inbound: UnboundedReceiver<StreamMessage>,
    pending: Bytes,
    outbound: PollSender<TcpFrame>,
    send_credit: SendCredit,
    receive_credit: ReceiveCredit,
    max_payload_size: usize,
    read_closed: bool,
    write_closed: bool,
    close_reason: Option<CloseReason>,
}

impl LogicalStream {
    pub(crate) fn new(id: StreamId, channels: StreamChannels, shared: &StreamShared) -> Self {
        Self {
            id,
            inbound: channels.inbound,
            pending: Bytes::new(),
            outbound: PollSender::new(shared.outbound.clone()),
            send_credit: SendCredit::new(channels.send_window),
            receive_credit: ReceiveCredit::new(id, shared.registry.clone(), shared.control.clone()),
            max_payload_size: shared.max_payload_size,
            read_closed: false,
            write_closed: false,
            close_reason: None,
        }
    }

    pub fn id(&self) -> StreamId {
        self.id
    }

    /// first reason this stream observed for closing, if any.
    pub fn close_reason(&self) -> Option<CloseReason> {
        self.close_reason
    }

    pub fn is_read_closed(&self) -> bool {
        self.read_closed
    }

    pub fn is_write_closed(&self) -> bool {
        self.write_closed
    }

    /// half-closes the stream: no more data will be sent to the peer.
    pub async fn close(&mut self) -> io::Result<()> {
        self.shutdown().await
    }

    /// closes the stream and records why.
    pub async fn close_with(&mut self, reason: CloseReason) -> io::Result<()> {
        self.close_reason.get_or_insert(reason);
        self.shutdown().await
    }

    fn record_close(&mut self, reason: CloseReason) {
        self.read_closed = true;
        self.close_reason.get_or_insert(reason);
    }
}

fn connection_gone() -> io::Error {
    io::Error::new(io::ErrorKind::BrokenPipe, "control connection closed")
}

impl AsyncRead for LogicalStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();

        loop {
            if !this.pending.is_empty() {
                let len = this.pending.len().min(buf.remaining());
                buf.put_slice(&this.pending[..len]);
                this.pending.advance(len);
                this.receive_credit.consumed(len);
                return Poll::Ready(Ok(()));
            }

            if this.read_closed {
                return Poll::Ready(Ok(()));
            }

            match ready!(this.inbound.poll_recv(cx)) {
                Some(StreamMessage::Data(buffer)) => {
                    this.pending = buffer;
                }
                Some(StreamMessage::Closed(CloseReason::Remote)) => {
                    trace!("stream {} closed by peer", this.id);
                    this.record_close(CloseReason::Remote);
                }
                Some(StreamMessage::Closed(reason)) => {
                    debug!("stream {} closed: {}", this.id, reason);
                    this.record_close(reason);
                    return Poll::Ready(Err(io::Error::new(
                        io::ErrorKind::ConnectionAborted,
                        reason.to_string(),
                    )));
                }
                None => {
                    this.record_close(CloseReason::ConnectionClosed);
                }
            }
        }
    }
}

impl AsyncWrite for LogicalStream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let this = self.get_mut();
        if this.write_closed {
            return Poll::Ready(Err(io::Error::new(
                io::ErrorKind::BrokenPipe,
                format!("stream {} is closed for writing", this.id),
            )));
        }

        if buf.is_empty() {
            return Poll::Ready(Ok(0));
        }

        let wanted = buf.len().min(this.max_payload_size);
        let Some(len) = ready!(this.send_credit.poll_reserve(cx, wanted)) else {
            return Poll::Ready(Err(connection_gone()));
        };

        ready!(this.outbound.poll_reserve(cx)).map_err(|_| connection_gone())?;

        let frame = TcpFrame::Data(DataPacket::new(this.id, Bytes::copy_from_slice(&buf[..len])));
        this.outbound.send_item(frame).map_err(|_| connection_gone())?;
        this.send_credit.spend(len);

        Poll::Ready(Ok(len))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        if this.write_closed {
            return Poll::Ready(Ok(()));
        }

        // a dead connection has nothing left to tell the peer.
        if ready!(this.outbound.poll_reserve(cx)).is_ok() {
            let _ = this.outbound.send_item(TcpFrame::Close(StreamClose::new(this.id)));
        }

        this.write_closed = true;
        trace!("stream {} closed for writing", this.id);
        Poll::Ready(Ok(()))
    }
}

impl LogicalStream {
    /// gives the peer back the credit of everything that will never be read.
    fn release_unread(&mut self) {
        if self.read_closed {
            return;
        }

        self.inbound.close();
        let mut unread = self.pending.len();
        while let Ok(message) = self.inbound.try_recv() {
            if let StreamMessage::Data(buffer) = message {
                unread += buffer.len();
            }
        }

        self.receive_credit.release(unread);
    }
}

impl Drop for LogicalStream {
    fn drop(&mut self) {
        self.release_unread();
        if self.write_closed {
            return;
        }

        let Some(sender) = self.outbound.get_ref().cloned() else {
            return;
        };

        let frame = TcpFrame::Close(StreamClose::new(self.id));
        if let Err(TrySendError::Full(frame)) = sender.try_send(frame) {
            if let Ok(handle) = tokio::runtime::Handle::try_current() {
                handle.spawn(async move {
                    let _ = sender.send(frame).await;
                });
            }
        }
    }
}

impl std::fmt::Debug for LogicalStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogicalStream")
            .field("id", &self.id)
            .field("read_closed", &self.read_closed)
            .field("write_closed", &self.write_closed)
            .field("close_reason", &self.close_reason)
            .finish()
    }
}

/// streams opened by the peer, in the order they were opened.
/// yields `None` once the control connection is closed.
pub struct IncomingStreams {
    receiver: UnboundedReceiver<LogicalStream>,
}

impl IncomingStreams {
    pub(crate) fn new(receiver: UnboundedReceiver<LogicalStream>) -> Self {
        Self { receiver }
    }

    pub async fn accept(&mut self) -> Option<LogicalStream> {
        self.receiver.recv().await
    }
}
