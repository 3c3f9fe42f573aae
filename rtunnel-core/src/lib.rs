mod frame_error;
mod tcp_frame;

pub mod auth;
pub mod bridge;
pub mod config;
pub mod control;
pub mod framing;
pub mod io;
pub mod logging;
pub mod mux;
pub mod tcp;
pub mod transport;

pub use frame_error::*;
pub use tcp_frame::*;

pub type Error = Box<dyn std::error::Error + Sync + Send + 'static>;
pub type Result<T> = std::result::Result<T, Error>;

pub mod test_util {

    pub fn generate_random_buffer(buffer_size: i32) -> bytes::BytesMut {
        use bytes::{BufMut, BytesMut};

        let mut buffer = BytesMut::with_capacity(buffer_size as usize);
        (0..buffer_size).for_each(|_| buffer.put_u8(rand::random::<u8>()));

        buffer
    }

    pub mod macros {
        #[macro_export]
        macro_rules! is_type {
            ($value:expr, $pattern:pat) => {
                match &$value {
                    $pattern => {
                        true
                    },
                    _ => {
                        false
                    }
                }
            }
        }
    }
}
