use std::fmt::Display;
use std::io::Cursor;
use bytes::BytesMut;

use crate::FrameDecodeError;
use crate::io::skip;
use crate::framing::frame_types::*;
use crate::framing::{DataPacket, FrameHeader, StreamClose, StreamOpen, WindowUpdate};


pub trait Frame {
    fn decode(header: &FrameHeader, buffer: &mut Cursor<&[u8]>) -> Result<Self, FrameDecodeError> where Self: Sized;
    fn encode(&self) -> Vec<u8>;
}

#[derive(Debug, PartialEq, Eq, Clone)]
pub enum TcpFrame {
    Open(StreamOpen),
    Data(DataPacket),
    Close(StreamClose),
    Window(WindowUpdate),
}

impl TcpFrame {
    /// checks whether the cursor holds one complete, well formed frame.
    /// on success the cursor is positioned right after it.
    pub fn check(cursor: &mut Cursor<&[u8]>, max_payload_size: u32) -> Result<(), FrameDecodeError> {
        let header = FrameHeader::decode(cursor)?;
        header.validate(max_payload_size)?;
        skip(cursor, header.payload_len())
    }

    pub fn parse(cursor: &mut Cursor<&[u8]>) -> Result<TcpFrame, FrameDecodeError> {
        let header = FrameHeader::decode(cursor)?;
        let frame = match header.opcode() {
            OPEN => TcpFrame::Open(StreamOpen::decode(&header, cursor)?),
            DATA => TcpFrame::Data(DataPacket::decode(&header, cursor)?),
            CLOSE => TcpFrame::Close(StreamClose::decode(&header, cursor)?),
            WINDOW => TcpFrame::Window(WindowUpdate::decode(&header, cursor)?),
            actual => {
                let msg = format!("invalid frame type {:#04x}", actual);
                return Err(msg.into())
            },
        };

        Ok(frame)
    }

    pub fn stream_id(&self) -> u32 {
        match self {
            TcpFrame::Open(data) => data.stream_id(),
            TcpFrame::Data(data) => data.stream_id(),
            TcpFrame::Close(data) => data.stream_id(),
            TcpFrame::Window(data) => data.stream_id(),
        }
    }

    pub fn to_buffer(&self) -> BytesMut {
        let buffer = match self {
            TcpFrame::Open(data) => data.encode(),
            TcpFrame::Data(data) => data.encode(),
            TcpFrame::Close(data) => data.encode(),
            TcpFrame::Window(data) => data.encode(),
        };

        BytesMut::from(&buffer[..])
    }
}

impl Display for TcpFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TcpFrame::Open(data) => write!(f, "tcpframe: Open ({})", data.stream_id()),
            TcpFrame::Data(data) => write!(
                f,
                "tcpframe: Data ({}, size: {})",
                data.stream_id(),
                data.buffer().len()),
            TcpFrame::Close(data) => write!(f, "tcpframe: Close ({})", data.stream_id()),
            TcpFrame::Window(data) => write!(
                f,
                "tcpframe: Window ({}, increment: {})",
                data.stream_id(),
                data.increment()),
        }
    }
}
