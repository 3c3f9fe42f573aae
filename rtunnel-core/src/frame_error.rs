use std::{num::TryFromIntError, string::FromUtf8Error};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FrameDecodeError {
    #[error("stream ended early")]
    Incomplete,
    #[error("protocol error; {0}")]
    Malformed(String),
}

impl From<String> for FrameDecodeError {
    fn from(src: String) -> FrameDecodeError {
        FrameDecodeError::Malformed(src)
    }
}

impl From<&str> for FrameDecodeError {
    fn from(src: &str) -> FrameDecodeError {
        FrameDecodeError::Malformed(src.to_owned())
    }
}

impl From<FromUtf8Error> for FrameDecodeError {
    fn from(_src: FromUtf8Error) -> FrameDecodeError {
        "invalid frame format".into()
    }
}

impl From<TryFromIntError> for FrameDecodeError {
    fn from(_src: TryFromIntError) -> FrameDecodeError {
        "invalid frame format".into()
    }
}
