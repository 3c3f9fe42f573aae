use std::io::{Cursor, Read};
use bytes::Buf;
use crate::FrameDecodeError;

fn check_cursor_size(src: &Cursor<&[u8]>, size: usize) -> Result<(), FrameDecodeError> {
    if size > src.get_ref().len() - src.position() as usize {
        return Err(FrameDecodeError::Incomplete);
    }

    Ok(())
}

pub fn get_buffer(src: &mut Cursor<&[u8]>, buffer_size: u32) -> Result<Vec<u8>, FrameDecodeError> {
    let mut buffer = vec![0; buffer_size as usize];
    src.read_exact(&mut buffer).map_err(|_| FrameDecodeError::Incomplete)?;
    Ok(buffer)
}

/// advances the cursor past `size` bytes without copying them.
pub fn skip(src: &mut Cursor<&[u8]>, size: u32) -> Result<(), FrameDecodeError> {
    check_cursor_size(src, size as usize)?;
    src.advance(size as usize);
    Ok(())
}

pub fn get_u32(src: &mut Cursor<&[u8]>) -> Result<u32, FrameDecodeError> {
    check_cursor_size(src, std::mem::size_of::<u32>())?;
    Ok(src.get_u32())
}

pub fn get_u8(src: &mut Cursor<&[u8]>) -> Result<u8, FrameDecodeError> {
    check_cursor_size(src, std::mem::size_of::<u8>())?;
    Ok(src.get_u8())
}
