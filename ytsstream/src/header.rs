//! Framing header extraction.
//!
//! The header replayed to late joiners is the ID3v2 tag at the head of the
//! converted MP3: it carries the title, artist and cover the players display.

use std::path::Path;

use bytes::Bytes;
use tokio::io::AsyncReadExt;

const ID3_HEADER_LEN: usize = 10;
const ID3_FOOTER_FLAG: u8 = 0x10;

/// Total length of the ID3v2 tag starting at `data[0]`, footer included.
///
/// Returns `None` when `data` does not start with a well-formed tag header.
pub fn id3_tag_len(data: &[u8]) -> Option<usize> {
    if data.len() < ID3_HEADER_LEN || &data[..3] != b"ID3" {
        return None;
    }
    // version bytes are never 0xFF
    if data[3] == 0xFF || data[4] == 0xFF {
        return None;
    }
    let size_bytes = &data[6..10];
    // synch-safe integer: high bit of each byte is zero
    if size_bytes.iter().any(|b| b & 0x80 != 0) {
        return None;
    }
    let size = size_bytes
        .iter()
        .fold(0usize, |acc, b| (acc << 7) | usize::from(*b));

    let footer = if data[5] & ID3_FOOTER_FLAG != 0 {
        ID3_HEADER_LEN
    } else {
        0
    };
    Some(ID3_HEADER_LEN + size + footer)
}

/// Reads the ID3v2 tag at the start of `path`, if any.
pub async fn read_framing_header(path: &Path) -> std::io::Result<Option<Bytes>> {
    let mut file = tokio::fs::File::open(path).await?;
    let mut head = [0u8; ID3_HEADER_LEN];
    let mut filled = 0;
    while filled < ID3_HEADER_LEN {
        let n = file.read(&mut head[filled..]).await?;
        if n == 0 {
            return Ok(None);
        }
        filled += n;
    }

    let Some(len) = id3_tag_len(&head) else {
        return Ok(None);
    };

    let mut tag = Vec::with_capacity(len);
    tag.extend_from_slice(&head);
    let rest = (len - ID3_HEADER_LEN) as u64;
    let read = (&mut file).take(rest).read_to_end(&mut tag).await?;
    if (read as u64) < rest {
        // truncated tag: not a usable header
        return Ok(None);
    }
    Ok(Some(Bytes::from(tag)))
}
