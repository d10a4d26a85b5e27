//! Minimal WebP container handling: canvas inspection and EXIF embedding.
//!
//! Only the RIFF chunk layer is touched; image bitstreams are copied as-is.

use thiserror::Error;

const RIFF: &[u8; 4] = b"RIFF";
const WEBP: &[u8; 4] = b"WEBP";
const VP8X: [u8; 4] = *b"VP8X";
const VP8: [u8; 4] = *b"VP8 ";
const VP8L: [u8; 4] = *b"VP8L";
const EXIF: [u8; 4] = *b"EXIF";
const XMP: [u8; 4] = *b"XMP ";
const ALPH: [u8; 4] = *b"ALPH";
const ANIM: [u8; 4] = *b"ANIM";

const FLAG_ANIMATION: u8 = 0x02;
const FLAG_XMP: u8 = 0x04;
const FLAG_EXIF: u8 = 0x08;
const FLAG_ALPHA: u8 = 0x10;

const VP8L_SIGNATURE: u8 = 0x2f;
const VP8_START_CODE: [u8; 3] = [0x9d, 0x01, 0x2a];

/// Errors raised while reading or rewriting a WebP file.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum WebpError {
    #[error("not a RIFF/WEBP file")]
    NotWebp,

    #[error("chunk {fourcc} truncated at offset {offset}")]
    Truncated { fourcc: String, offset: usize },

    #[error("no VP8X, VP8 or VP8L chunk found")]
    MissingImageData,

    #[error("malformed {0} header")]
    BadHeader(&'static str),
}

/// Canvas facts read from the container.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WebpInfo {
    pub width: u32,
    pub height: u32,
    pub has_alpha: bool,
    pub animated: bool,
}

#[derive(Debug, Clone, Copy)]
struct Chunk<'a> {
    fourcc: [u8; 4],
    data: &'a [u8],
}

fn parse_chunks(bytes: &[u8]) -> Result<Vec<Chunk<'_>>, WebpError> {
    if bytes.len() < 12 || &bytes[0..4] != RIFF || &bytes[8..12] != WEBP {
        return Err(WebpError::NotWebp);
    }

    let declared = u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]) as usize;
    let end = declared.saturating_add(8).min(bytes.len());

    let mut chunks = Vec::new();
    let mut offset = 12;
    while offset + 8 <= end {
        let mut fourcc = [0u8; 4];
        fourcc.copy_from_slice(&bytes[offset..offset + 4]);
        let size = u32::from_le_bytes([
            bytes[offset + 4],
            bytes[offset + 5],
            bytes[offset + 6],
            bytes[offset + 7],
        ]) as usize;
        let start = offset + 8;
        let stop = start
            .checked_add(size)
            .filter(|stop| *stop <= end)
            .ok_or_else(|| WebpError::Truncated {
                fourcc: String::from_utf8_lossy(&fourcc).into_owned(),
                offset,
            })?;
        chunks.push(Chunk {
            fourcc,
            data: &bytes[start..stop],
        });
        offset = stop + (size & 1);
    }

    if chunks.is_empty() {
        return Err(WebpError::MissingImageData);
    }
    Ok(chunks)
}

fn read_u24(bytes: &[u8]) -> u32 {
    u32::from(bytes[0]) | (u32::from(bytes[1]) << 8) | (u32::from(bytes[2]) << 16)
}

fn vp8_size(data: &[u8]) -> Result<(u32, u32), WebpError> {
    if data.len() < 10 || data[3..6] != VP8_START_CODE {
        return Err(WebpError::BadHeader("VP8"));
    }
    let width = u32::from(u16::from_le_bytes([data[6], data[7]]) & 0x3fff);
    let height = u32::from(u16::from_le_bytes([data[8], data[9]]) & 0x3fff);
    Ok((width, height))
}

fn vp8l_info(data: &[u8]) -> Result<(u32, u32, bool), WebpError> {
    if data.len() < 5 || data[0] != VP8L_SIGNATURE {
        return Err(WebpError::BadHeader("VP8L"));
    }
    let bits = u32::from_le_bytes([data[1], data[2], data[3], data[4]]);
    let width = (bits & 0x3fff) + 1;
    let height = ((bits >> 14) & 0x3fff) + 1;
    let alpha = (bits >> 28) & 1 == 1;
    Ok((width, height, alpha))
}

/// Reads canvas size and feature flags.
pub fn inspect(bytes: &[u8]) -> Result<WebpInfo, WebpError> {
    let chunks = parse_chunks(bytes)?;
    info_from_chunks(&chunks)
}

/// Returns the canvas `(width, height)`.
pub fn canvas_size(bytes: &[u8]) -> Result<(u32, u32), WebpError> {
    inspect(bytes).map(|info| (info.width, info.height))
}

fn info_from_chunks(chunks: &[Chunk<'_>]) -> Result<WebpInfo, WebpError> {
    let first = chunks[0];
    match first.fourcc {
        VP8X => {
            if first.data.len() < 10 {
                return Err(WebpError::BadHeader("VP8X"));
            }
            let flags = first.data[0];
            Ok(WebpInfo {
                width: read_u24(&first.data[4..7]) + 1,
                height: read_u24(&first.data[7..10]) + 1,
                has_alpha: flags & FLAG_ALPHA != 0,
                animated: flags & FLAG_ANIMATION != 0,
            })
        }
        VP8 => {
            let (width, height) = vp8_size(first.data)?;
            Ok(WebpInfo {
                width,
                height,
                has_alpha: false,
                animated: false,
            })
        }
        VP8L => {
            let (width, height, has_alpha) = vp8l_info(first.data)?;
            Ok(WebpInfo {
                width,
                height,
                has_alpha,
                animated: false,
            })
        }
        _ => Err(WebpError::MissingImageData),
    }
}

fn vp8x_payload(flags: u8, width: u32, height: u32) -> [u8; 10] {
    let w = width.saturating_sub(1);
    let h = height.saturating_sub(1);
    [
        flags,
        0,
        0,
        0,
        (w & 0xff) as u8,
        ((w >> 8) & 0xff) as u8,
        ((w >> 16) & 0xff) as u8,
        (h & 0xff) as u8,
        ((h >> 8) & 0xff) as u8,
        ((h >> 16) & 0xff) as u8,
    ]
}

/// Returns a copy of `bytes` carrying `exif` as its EXIF chunk.
///
/// Simple (`VP8 `/`VP8L`) files are promoted to the extended `VP8X` layout.
/// Any EXIF chunk already present is replaced.
pub fn embed_exif(bytes: &[u8], exif: &[u8]) -> Result<Vec<u8>, WebpError> {
    let chunks = parse_chunks(bytes)?;
    let info = info_from_chunks(&chunks)?;

    let has_chunk = |fourcc: [u8; 4]| chunks.iter().any(|c| c.fourcc == fourcc);
    let mut flags = match chunks[0].fourcc {
        VP8X => chunks[0].data[0],
        _ => 0,
    };
    flags |= FLAG_EXIF;
    if info.has_alpha || has_chunk(ALPH) {
        flags |= FLAG_ALPHA;
    }
    if has_chunk(ANIM) {
        flags |= FLAG_ANIMATION;
    }
    if has_chunk(XMP) {
        flags |= FLAG_XMP;
    }

    let header = vp8x_payload(flags, info.width, info.height);
    let mut out_chunks: Vec<Chunk<'_>> = vec![Chunk {
        fourcc: VP8X,
        data: &header,
    }];
    let exif_chunk = Chunk {
        fourcc: EXIF,
        data: exif,
    };
    let mut exif_placed = false;
    for chunk in chunks.iter().filter(|c| c.fourcc != VP8X && c.fourcc != EXIF) {
        // EXIF goes after the image data but before XMP.
        if chunk.fourcc == XMP && !exif_placed {
            out_chunks.push(exif_chunk);
            exif_placed = true;
        }
        out_chunks.push(*chunk);
    }
    if !exif_placed {
        out_chunks.push(exif_chunk);
    }

    Ok(write_riff(&out_chunks))
}

fn write_riff(chunks: &[Chunk<'_>]) -> Vec<u8> {
    let body: usize = chunks
        .iter()
        .map(|c| 8 + c.data.len() + (c.data.len() & 1))
        .sum();
    let mut out = Vec::with_capacity(12 + body);
    out.extend_from_slice(RIFF);
    out.extend_from_slice(&((4 + body) as u32).to_le_bytes());
    out.extend_from_slice(WEBP);
    for chunk in chunks {
        out.extend_from_slice(&chunk.fourcc);
        out.extend_from_slice(&(chunk.data.len() as u32).to_le_bytes());
        out.extend_from_slice(chunk.data);
        if chunk.data.len() & 1 == 1 {
            out.push(0);
        }
    }
    out
}

/// Extracts the EXIF chunk payload, if any.
pub fn exif_payload(bytes: &[u8]) -> Result<Option<Vec<u8>>, WebpError> {
    Ok(parse_chunks(bytes)?
        .into_iter()
        .find(|c| c.fourcc == EXIF)
        .map(|c| c.data.to_vec()))
}
