// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! String Out page (04h): `[4]` bit 7 asks the enclosure to echo the
//! string on its console, the text follows unterminated.

use anyhow::{Result, ensure};
use bytes::{BufMut, BytesMut};

use crate::models::common::{PAGE_SIZE_ADJUST, PageCode};

pub const STRING_OUT_HDR_LEN: usize = 5;
pub const STRING_OUT_MAX_DATA: usize = 80;

pub fn encode_string_out(text: &[u8], echo: bool) -> Result<BytesMut> {
    ensure!(
        text.len() <= STRING_OUT_MAX_DATA,
        "string out data {} exceeds {STRING_OUT_MAX_DATA} bytes",
        text.len()
    );
    ensure!(!text.contains(&0), "string out data contains NUL");
    let size = STRING_OUT_HDR_LEN + text.len();
    let mut buf = BytesMut::with_capacity(size);
    buf.put_u8(PageCode::StringOut as u8);
    buf.put_u8(0);
    buf.put_u16((size - PAGE_SIZE_ADJUST as usize) as u16);
    buf.put_u8(if echo { 0x80 } else { 0 });
    buf.put_slice(text);
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use hex_literal::hex;

    use super::*;

    #[test]
    fn echo_and_length() -> Result<()> {
        let b = encode_string_out(b"ver", true)?;
        assert_eq!(&b[..], &hex!("04 00 00 04 80 76 65 72")[..]);
        Ok(())
    }

    #[test]
    fn too_long() {
        assert!(encode_string_out(&[b'a'; 81], false).is_err());
    }
}
