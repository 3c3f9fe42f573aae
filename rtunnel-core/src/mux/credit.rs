use std::sync::Arc;
use std::task::{ready, Context, Poll};

use tokio::sync::mpsc::UnboundedSender;
use tokio::sync::Semaphore;
use tokio_util::sync::PollSemaphore;
use tracing::trace;

use crate::framing::{WindowUpdate, STREAM_WINDOW_SIZE};
use crate::mux::registry::StreamRegistry;
use crate::mux::StreamId;
use crate::TcpFrame;

/// credit the peer granted for sending DATA on one stream.
///
/// Credit taken out of the window stays reserved here until it is spent, so
/// a write that has to wait for a queue slot does not give it back.
pub(crate) struct SendCredit {
    window: Arc<Semaphore>,
    poll_window: PollSemaphore,
    reserved: usize,
}

impl SendCredit {
    pub fn new(window: Arc<Semaphore>) -> Self {
        Self {
            poll_window: PollSemaphore::new(window.clone()),
            window,
            reserved: 0,
        }
    }

    /// waits for at least one byte of credit and reserves up to `wanted`.
    /// resolves with `None` once the connection is gone.
    pub fn poll_reserve(&mut self, cx: &mut Context<'_>, wanted: usize) -> Poll<Option<usize>> {
        if self.reserved == 0 {
            let Some(permit) = ready!(self.poll_window.poll_acquire(cx)) else {
                return Poll::Ready(None);
            };

            permit.forget();
            self.reserved = 1;
        }

        let extra = wanted
            .saturating_sub(self.reserved)
            .min(self.window.available_permits());

        if extra > 0 {
            // only this handle takes credit out, so what is available stays available.
            if let Ok(permits) = self.window.try_acquire_many(extra as u32) {
                permits.forget();
                self.reserved += extra;
            }
        }

        Poll::Ready(Some(self.reserved.min(wanted)))
    }

    pub fn spend(&mut self, len: usize) {
        self.reserved -= len.min(self.reserved);
    }
}

/// credit this side hands back to the peer for one stream as its reader
/// consumes data.
pub(crate) struct ReceiveCredit {
    stream_id: StreamId,
    registry: Arc<StreamRegistry>,
    control: UnboundedSender<TcpFrame>,
    consumed: u32,
}

impl ReceiveCredit {
    pub fn new(stream_id: StreamId, registry: Arc<StreamRegistry>, control: UnboundedSender<TcpFrame>) -> Self {
        Self {
            stream_id,
            registry,
            control,
            consumed: 0,
        }
    }

    /// the reader took `len` bytes. credit goes back in batches of half a window.
    pub fn consumed(&mut self, len: usize) {
        self.consumed = self.consumed.saturating_add(len as u32);
        if self.consumed >= STREAM_WINDOW_SIZE / 2 {
            self.grant();
        }
    }

    /// hands back `len` bytes that will never be read, plus anything pending.
    pub fn release(&mut self, len: usize) {
        self.consumed = self.consumed.saturating_add(len as u32);
        self.grant();
    }

    fn grant(&mut self) {
        if self.consumed == 0 {
            return;
        }

        let increment = std::mem::take(&mut self.consumed);
        self.registry.extend_receive_window(self.stream_id, increment);

        let frame = TcpFrame::Window(WindowUpdate::new(self.stream_id, increment));
        if self.control.send(frame).is_ok() {
            trace!("stream {} granted {} bytes", self.stream_id, increment);
        }
    }
}
