use bytes::Bytes;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, trace};

use crate::framing::WindowUpdate;
use crate::mux::stream::StreamShared;
use crate::mux::{LogicalStream, MuxError, Side, StreamId};
use crate::TcpFrame;

/// what a decoded frame means for the stream it names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    Opened(StreamId),
    Data(StreamId, Bytes),
    Closed(StreamId),
    /// the peer can take this many more bytes on the stream.
    WindowUpdated(StreamId, u32),
}

impl From<TcpFrame> for StreamEvent {
    fn from(frame: TcpFrame) -> Self {
        match frame {
            TcpFrame::Open(data) => StreamEvent::Opened(data.stream_id()),
            TcpFrame::Data(data) => StreamEvent::Data(data.stream_id(), data.into_buffer()),
            TcpFrame::Close(data) => StreamEvent::Closed(data.stream_id()),
            TcpFrame::Window(data) => StreamEvent::WindowUpdated(data.stream_id(), data.increment()),
        }
    }
}

/// single point where inbound events are applied to the id table.
pub(crate) struct Dispatcher {
    side: Side,
    shared: StreamShared,
    incoming: UnboundedSender<LogicalStream>,
}

impl Dispatcher {
    pub fn new(side: Side, shared: StreamShared, incoming: UnboundedSender<LogicalStream>) -> Self {
        Self {
            side,
            shared,
            incoming,
        }
    }

    /// applies one event. an error means the peer violated the protocol and
    /// the connection must not be used any further.
    pub fn dispatch(&self, event: StreamEvent) -> Result<(), MuxError> {
        let registry = &self.shared.registry;
        match event {
            StreamEvent::Opened(stream_id) => self.open_remote(stream_id),
            StreamEvent::Data(stream_id, buffer) => {
                if !registry.contains(stream_id) {
                    if registry.is_retired(stream_id) {
                        trace!("dropping {} bytes for retired stream {}", buffer.len(), stream_id);
                        return Ok(());
                    }

                    self.open_remote(stream_id)?;
                }

                if let Some(discarded) = registry.deliver(stream_id, buffer)? {
                    let frame = TcpFrame::Window(WindowUpdate::new(stream_id, discarded));
                    let _ = self.shared.control.send(frame);
                }

                Ok(())
            }
            StreamEvent::Closed(stream_id) => {
                registry.remote_closed(stream_id);
                Ok(())
            }
            StreamEvent::WindowUpdated(stream_id, increment) => registry.extend_send_window(stream_id, increment),
        }
    }

    fn open_remote(&self, stream_id: StreamId) -> Result<(), MuxError> {
        if self.side.opens_streams() {
            return Err(MuxError::UnexpectedOpen(stream_id));
        }

        let channels = self.shared.registry.register_remote(stream_id)?;
        let stream = LogicalStream::new(stream_id, channels, &self.shared);

        debug!("peer opened stream {}", stream_id);
        if let Err(err) = self.incoming.send(stream) {
            // nobody accepts streams anymore. dropping the handle closes it.
            trace!("no acceptor for stream {}", stream_id);
            drop(err);
        }

        Ok(())
    }
}
