//! LEB128 decoding shared by class-data and code-item parsing.
//!
//! See: <https://source.android.com/docs/core/runtime/dex-format#leb128>

use winnow::binary::u8;
use winnow::error::{ContextError, ErrMode};
use winnow::prelude::*;

/// Decodes an unsigned LEB128 value, up to 5 bytes (32 bits of payload).
#[inline]
pub(crate) fn uleb128(input: &mut &[u8]) -> ModalResult<u32> {
    let mut result: u32 = 0;
    let mut shift = 0u32;

    loop {
        let byte = u8.parse_next(input)?;
        let payload = (byte & 0x7f) as u32;
        result |= payload
            .checked_shl(shift)
            .ok_or_else(|| ErrMode::Cut(ContextError::new()))?;

        if byte & 0x80 == 0 {
            return Ok(result);
        }
        shift += 7;
        if shift >= 35 {
            return Err(ErrMode::Cut(ContextError::new()));
        }
    }
}

/// Decodes a signed LEB128 value, up to 5 bytes.
#[inline]
pub(crate) fn sleb128(input: &mut &[u8]) -> ModalResult<i32> {
    let mut result: i32 = 0;
    let mut shift = 0u32;
    let mut byte: u8;

    loop {
        byte = u8.parse_next(input)?;
        result |= ((byte & 0x7f) as i32) << shift;
        shift += 7;
        if byte & 0x80 == 0 {
            break;
        }
        if shift >= 35 {
            return Err(ErrMode::Cut(ContextError::new()));
        }
    }

    if shift < 32 && (byte & 0x40) != 0 {
        result |= -1i32 << shift;
    }
    Ok(result)
}
