//! Wire format of the multiplexed control connection.
//!
//! Every frame starts with a fixed 9 byte header, big-endian:
//!
//! ```text
//! +----------------+-------------+-------------------+-----------------+
//! | stream id: u32 | opcode: u8  | payload len: u32  | payload bytes   |
//! +----------------+-------------+-------------------+-----------------+
//! ```
//!
//! Each stream carries its own credit. A sender starts with
//! [`STREAM_WINDOW_SIZE`] bytes per stream and may not put more DATA on the
//! wire than it was granted; the receiver hands credit back with WINDOW
//! frames (4 byte big-endian increment) as its reader consumes the data.

mod data_packet;
mod frame_header;
mod stream_close;
mod stream_open;
mod window_update;

pub use data_packet::DataPacket;
pub use frame_header::FrameHeader;
pub use stream_close::StreamClose;
pub use stream_open::StreamOpen;
pub use window_update::WindowUpdate;

pub const HEADER_SIZE: usize = 9;

/// largest payload a single DATA frame may carry.
pub const MAX_PAYLOAD_SIZE: u32 = 64 * 1024;

/// DATA bytes a sender may have in flight per stream before the receiver
/// grants more. both ends of a connection must use the same value.
pub const STREAM_WINDOW_SIZE: u32 = 256 * 1024;

pub mod frame_types {
    pub const OPEN: u8 = 0x01;
    pub const DATA: u8 = 0x02;
    pub const CLOSE: u8 = 0x03;
    pub const WINDOW: u8 = 0x04;
}
