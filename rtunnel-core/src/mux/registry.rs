use bytes::Bytes;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::sync::Semaphore;
use tracing::{trace, warn};

use crate::framing::STREAM_WINDOW_SIZE;
use crate::mux::{CloseReason, MuxError, StreamId};

/// most credit a peer may hand out for one stream.
const MAX_SEND_WINDOW: usize = u32::MAX as usize;

/// item delivered to the read side of a logical stream.
#[derive(Debug)]
pub(crate) enum StreamMessage {
    Data(Bytes),
    Closed(CloseReason),
}

/// both ends of a registered stream that belong to its handle.
pub(crate) struct StreamChannels {
    pub inbound: UnboundedReceiver<StreamMessage>,
    pub send_window: Arc<Semaphore>,
}

struct StreamEntry {
    sender: UnboundedSender<StreamMessage>,
    /// one permit per byte the peer still accepts.
    send_window: Arc<Semaphore>,
    /// bytes the peer may still send before it needs more credit.
    receive_window: u32,
    local_closed: bool,
    remote_closed: bool,
}

impl StreamEntry {
    fn new() -> (Self, StreamChannels) {
        let (sender, inbound) = mpsc::unbounded_channel();
        let send_window = Arc::new(Semaphore::new(STREAM_WINDOW_SIZE as usize));
        let entry = Self {
            sender,
            send_window: send_window.clone(),
            receive_window: STREAM_WINDOW_SIZE,
            local_closed: false,
            remote_closed: false,
        };

        (entry, StreamChannels { inbound, send_window })
    }

    fn is_finished(&self) -> bool {
        self.local_closed && self.remote_closed
    }
}

#[derive(Default)]
struct RegistryState {
    streams: HashMap<StreamId, StreamEntry>,
    highest_id: StreamId,
    closed: Option<CloseReason>,
}

/// id table of one multiplexer.
///
/// An entry lives until both directions of the stream are closed. Ids are
/// strictly increasing, so any id at or below `highest_id` that is not in the
/// table has been retired and can never be opened again.
///
/// The table also keeps the flow control state of each stream: the credit
/// left for sending and the DATA the peer may still send before it has to
/// wait for a WINDOW frame. Inbound queues never hold more than that window.
#[derive(Default)]
pub(crate) struct StreamRegistry {
    state: Mutex<RegistryState>,
}

impl StreamRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, RegistryState> {
        // a panic while holding the lock cannot leave the table half updated,
        // so a poisoned lock is still safe to use.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// reserves the next stream id for a locally opened stream.
    pub fn allocate(&self) -> Result<(StreamId, StreamChannels), MuxError> {
        let mut state = self.lock();
        if let Some(reason) = state.closed {
            return Err(MuxError::Closed(reason));
        }

        let stream_id = state
            .highest_id
            .checked_add(1)
            .ok_or(MuxError::StreamIdsExhausted)?;

        let (entry, channels) = StreamEntry::new();
        state.highest_id = stream_id;
        state.streams.insert(stream_id, entry);

        Ok((stream_id, channels))
    }

    /// registers a stream opened by the peer.
    pub fn register_remote(&self, stream_id: StreamId) -> Result<StreamChannels, MuxError> {
        let mut state = self.lock();
        if let Some(reason) = state.closed {
            return Err(MuxError::Closed(reason));
        }

        if stream_id <= state.highest_id {
            return Err(MuxError::StreamIdReused(stream_id));
        }

        let (entry, channels) = StreamEntry::new();
        state.highest_id = stream_id;
        state.streams.insert(stream_id, entry);

        Ok(channels)
    }

    pub fn contains(&self, stream_id: StreamId) -> bool {
        self.lock().streams.contains_key(&stream_id)
    }

    pub fn is_retired(&self, stream_id: StreamId) -> bool {
        let state = self.lock();
        stream_id <= state.highest_id && !state.streams.contains_key(&stream_id)
    }

    /// hands a payload to the stream's reader, charging it to the receive
    /// window. returns the credit to give straight back to the peer when the
    /// stream's reader is gone and the payload was discarded.
    pub fn deliver(&self, stream_id: StreamId, buffer: Bytes) -> Result<Option<u32>, MuxError> {
        let mut state = self.lock();
        let Some(entry) = state.streams.get_mut(&stream_id) else {
            trace!("stream {} not found in state", stream_id);
            return Ok(None);
        };

        if entry.remote_closed {
            warn!("stream {} received data after close, dropping {} bytes", stream_id, buffer.len());
            return Ok(None);
        }

        // payloads are bounded by the max payload size, far below u32::MAX.
        let len = buffer.len() as u32;
        if len > entry.receive_window {
            return Err(MuxError::WindowExceeded(stream_id));
        }

        if entry.sender.send(StreamMessage::Data(buffer)).is_err() {
            trace!("stream {} has no reader, discarding {} bytes", stream_id, len);
            return Ok(Some(len));
        }

        entry.receive_window -= len;
        Ok(None)
    }

    /// the local reader consumed `increment` bytes and a WINDOW frame for
    /// them is about to be sent.
    pub fn extend_receive_window(&self, stream_id: StreamId, increment: u32) {
        let mut state = self.lock();
        if let Some(entry) = state.streams.get_mut(&stream_id) {
            entry.receive_window = entry.receive_window.saturating_add(increment);
        }
    }

    /// the peer granted `increment` more bytes for this stream.
    pub fn extend_send_window(&self, stream_id: StreamId, increment: u32) -> Result<(), MuxError> {
        let state = self.lock();
        let Some(entry) = state.streams.get(&stream_id) else {
            trace!("window update for unknown stream {}", stream_id);
            return Ok(());
        };

        let available = entry.send_window.available_permits();
        if available + increment as usize > MAX_SEND_WINDOW {
            return Err(MuxError::WindowOverflow(stream_id));
        }

        entry.send_window.add_permits(increment as usize);
        Ok(())
    }

    /// peer will not send any more data on this stream.
    pub fn remote_closed(&self, stream_id: StreamId) {
        let mut state = self.lock();
        let Some(entry) = state.streams.get_mut(&stream_id) else {
            trace!("close for unknown stream {}", stream_id);
            return;
        };

        if entry.remote_closed {
            return;
        }

        entry.remote_closed = true;
        let _ = entry.sender.send(StreamMessage::Closed(CloseReason::Remote));

        if entry.is_finished() {
            state.streams.remove(&stream_id);
            trace!("stream {} retired", stream_id);
        }
    }

    /// CLOSE for this stream has been written to the connection.
    pub fn local_closed(&self, stream_id: StreamId) {
        let mut state = self.lock();
        let Some(entry) = state.streams.get_mut(&stream_id) else {
            return;
        };

        entry.local_closed = true;
        if entry.is_finished() {
            state.streams.remove(&stream_id);
            trace!("stream {} retired", stream_id);
        }
    }

    pub fn remove(&self, stream_id: StreamId) {
        self.lock().streams.remove(&stream_id);
    }

    /// closes every stream that is still open with `reason`, exactly once.
    /// returns false if the registry was already shut down.
    pub fn shutdown(&self, reason: CloseReason) -> bool {
        let mut state = self.lock();
        if state.closed.is_some() {
            return false;
        }

        state.closed = Some(reason);
        for (_, entry) in state.streams.drain() {
            entry.send_window.close();
            if !entry.remote_closed {
                let _ = entry.sender.send(StreamMessage::Closed(reason));
            }
        }

        true
    }

    pub fn close_reason(&self) -> Option<CloseReason> {
        self.lock().closed
    }

    pub fn len(&self) -> usize {
        self.lock().streams.len()
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;

    use super::*;
    use crate::is_type;

    #[test]
    fn allocate_should_assign_increasing_ids() {
        // Arrange
        let registry = StreamRegistry::new();

        // Act
        let (first, _first) = registry.allocate().unwrap();
        let (second, _second) = registry.allocate().unwrap();

        // Assert
        assert_eq!(first, 1);
        assert_eq!(second, 2);
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn register_remote_should_reject_reused_id() {
        // Arrange
        let registry = StreamRegistry::new();
        let _channels = registry.register_remote(4).unwrap();
        registry.remote_closed(4);
        registry.local_closed(4);

        // Act
        let result = registry.register_remote(4);

        // Assert
        assert!(is_type!(result.err().unwrap(), MuxError::StreamIdReused(4)));
        assert!(registry.is_retired(4));
    }

    #[test]
    fn entry_should_be_removed_once_both_sides_closed() {
        // Arrange
        let registry = StreamRegistry::new();
        let (stream_id, mut channels) = registry.allocate().unwrap();

        // Act
        registry.deliver(stream_id, Bytes::from_static(b"data")).unwrap();
        registry.local_closed(stream_id);
        let after_local = registry.len();
        registry.remote_closed(stream_id);

        // Assert
        assert_eq!(after_local, 1);
        assert_eq!(registry.len(), 0);
        assert!(matches!(channels.inbound.try_recv(), Ok(StreamMessage::Data(_))));
        assert!(matches!(channels.inbound.try_recv(), Ok(StreamMessage::Closed(CloseReason::Remote))));
    }

    #[test]
    fn shutdown_should_close_each_stream_once() {
        // Arrange
        let registry = StreamRegistry::new();
        let (_, mut first) = registry.allocate().unwrap();
        let (_, mut second) = registry.allocate().unwrap();

        // Act
        let initial = registry.shutdown(CloseReason::MultiplexerFault);
        let repeated = registry.shutdown(CloseReason::ConnectionClosed);

        // Assert
        assert!(initial);
        assert!(!repeated);
        assert_eq!(registry.close_reason(), Some(CloseReason::MultiplexerFault));
        for channels in [&mut first, &mut second] {
            assert!(matches!(
                channels.inbound.try_recv(),
                Ok(StreamMessage::Closed(CloseReason::MultiplexerFault))
            ));
            assert!(channels.inbound.try_recv().is_err());
            assert!(channels.send_window.is_closed());
        }
        assert!(registry.allocate().is_err());
    }

    #[test]
    fn deliver_should_fail_once_receive_window_is_spent() {
        // Arrange
        let registry = StreamRegistry::new();
        let (stream_id, _channels) = registry.allocate().unwrap();
        let chunk = Bytes::from(vec![0u8; (STREAM_WINDOW_SIZE / 4) as usize]);
        for _ in 0..4 {
            registry.deliver(stream_id, chunk.clone()).unwrap();
        }

        // Act
        let result = registry.deliver(stream_id, Bytes::from_static(b"x"));
        registry.extend_receive_window(stream_id, 1);
        let after_grant = registry.deliver(stream_id, Bytes::from_static(b"x"));

        // Assert
        assert!(is_type!(result.unwrap_err(), MuxError::WindowExceeded(_)));
        assert!(is_type!(after_grant, Ok(None)));
    }

    #[test]
    fn deliver_should_return_credit_when_reader_is_gone() {
        // Arrange
        let registry = StreamRegistry::new();
        let (stream_id, channels) = registry.allocate().unwrap();
        drop(channels);

        // Act
        let result = registry.deliver(stream_id, Bytes::from_static(b"lost")).unwrap();

        // Assert
        assert_eq!(result, Some(4));
    }

    #[test]
    fn extend_send_window_should_add_credit_up_to_limit() {
        // Arrange
        let registry = StreamRegistry::new();
        let (stream_id, channels) = registry.allocate().unwrap();
        let _spent = channels.send_window.try_acquire_many(STREAM_WINDOW_SIZE).unwrap();

        // Act
        registry.extend_send_window(stream_id, 10).unwrap();
        let overflow = registry.extend_send_window(stream_id, u32::MAX);

        // Assert
        assert_eq!(channels.send_window.available_permits(), 10);
        assert!(is_type!(overflow.unwrap_err(), MuxError::WindowOverflow(_)));
        assert!(registry.extend_send_window(99, 10).is_ok());
    }
}
