//! Minimal media byte strings, enough for signature detection and WebP
//! container parsing. None of them decode to real pictures or sound.

/// PNG signature plus an IHDR chunk header.
pub fn png_header() -> Vec<u8> {
    let mut bytes = vec![0x89, b'P', b'N', b'G', 0x0d, 0x0a, 0x1a, 0x0a];
    bytes.extend_from_slice(&[0, 0, 0, 13]);
    bytes.extend_from_slice(b"IHDR");
    bytes.extend_from_slice(&64u32.to_be_bytes());
    bytes.extend_from_slice(&64u32.to_be_bytes());
    bytes.extend_from_slice(&[8, 6, 0, 0, 0]);
    bytes
}

/// JPEG SOI followed by a JFIF APP0 marker.
pub fn jpeg_header() -> Vec<u8> {
    let mut bytes = vec![0xff, 0xd8, 0xff, 0xe0, 0x00, 0x10];
    bytes.extend_from_slice(b"JFIF\0");
    bytes.extend_from_slice(&[1, 1, 0, 0, 1, 0, 1, 0, 0]);
    bytes
}

pub fn gif_header() -> Vec<u8> {
    let mut bytes = b"GIF89a".to_vec();
    bytes.extend_from_slice(&[0x40, 0x00, 0x40, 0x00, 0xf0, 0x00, 0x00]);
    bytes
}

/// A small lossy WebP.
pub fn webp_header() -> Vec<u8> {
    webp_lossy(16, 16)
}

/// RIFF/WAVE header with a `fmt ` chunk and an empty `data` chunk.
pub fn wav_header() -> Vec<u8> {
    let mut fmt = Vec::new();
    fmt.extend_from_slice(&1u16.to_le_bytes()); // PCM
    fmt.extend_from_slice(&2u16.to_le_bytes());
    fmt.extend_from_slice(&44_100u32.to_le_bytes());
    fmt.extend_from_slice(&(44_100u32 * 4).to_le_bytes());
    fmt.extend_from_slice(&4u16.to_le_bytes());
    fmt.extend_from_slice(&16u16.to_le_bytes());

    let mut bytes = b"RIFF".to_vec();
    bytes.extend_from_slice(&((4 + 8 + fmt.len() + 8) as u32).to_le_bytes());
    bytes.extend_from_slice(b"WAVE");
    bytes.extend_from_slice(b"fmt ");
    bytes.extend_from_slice(&(fmt.len() as u32).to_le_bytes());
    bytes.extend_from_slice(&fmt);
    bytes.extend_from_slice(b"data");
    bytes.extend_from_slice(&0u32.to_le_bytes());
    bytes
}

/// ID3v2 tag header followed by an MPEG frame sync.
pub fn mp3_header() -> Vec<u8> {
    let mut bytes = b"ID3".to_vec();
    bytes.extend_from_slice(&[0x04, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00]);
    bytes.extend_from_slice(&[0xff, 0xfb, 0x90, 0x64, 0x00, 0x00, 0x00, 0x00]);
    bytes
}

/// ISO-BMFF `ftyp` box with an `isom` brand and an empty `free` box.
pub fn mp4_header() -> Vec<u8> {
    let mut bytes = Vec::new();
    bytes.extend_from_slice(&32u32.to_be_bytes());
    bytes.extend_from_slice(b"ftyp");
    bytes.extend_from_slice(b"isom");
    bytes.extend_from_slice(&0x200u32.to_be_bytes());
    bytes.extend_from_slice(b"isomiso2avc1mp41");
    bytes.extend_from_slice(&8u32.to_be_bytes());
    bytes.extend_from_slice(b"free");
    bytes
}

fn riff_webp(chunks: &[(&[u8; 4], Vec<u8>)]) -> Vec<u8> {
    let mut body = Vec::new();
    for (fourcc, data) in chunks {
        body.extend_from_slice(*fourcc);
        body.extend_from_slice(&(data.len() as u32).to_le_bytes());
        body.extend_from_slice(data);
        if data.len() % 2 == 1 {
            body.push(0);
        }
    }
    let mut bytes = b"RIFF".to_vec();
    bytes.extend_from_slice(&((4 + body.len()) as u32).to_le_bytes());
    bytes.extend_from_slice(b"WEBP");
    bytes.extend_from_slice(&body);
    bytes
}

/// Simple-format lossless WebP (`VP8L`) with the given canvas.
pub fn webp_lossless(width: u32, height: u32, alpha: bool) -> Vec<u8> {
    let bits = (width - 1) | ((height - 1) << 14) | (u32::from(alpha) << 28);
    let mut data = vec![0x2f];
    data.extend_from_slice(&bits.to_le_bytes());
    // Odd length exercises chunk padding.
    data.extend_from_slice(&[0x00, 0x07, 0x10, 0x00]);
    riff_webp(&[(b"VP8L", data)])
}

/// Simple-format lossy WebP (`VP8 `) with the given canvas.
pub fn webp_lossy(width: u32, height: u32) -> Vec<u8> {
    let mut data = vec![0x10, 0x02, 0x00, 0x9d, 0x01, 0x2a];
    data.extend_from_slice(&(width as u16).to_le_bytes());
    data.extend_from_slice(&(height as u16).to_le_bytes());
    data.extend_from_slice(&[0x00, 0x00, 0x00, 0x00]);
    riff_webp(&[(b"VP8 ", data)])
}

/// Extended-format animated WebP with one frame.
pub fn webp_animated(width: u32, height: u32) -> Vec<u8> {
    let (w, h) = (width - 1, height - 1);
    let vp8x = vec![
        0x12,
        0,
        0,
        0,
        w as u8,
        (w >> 8) as u8,
        (w >> 16) as u8,
        h as u8,
        (h >> 8) as u8,
        (h >> 16) as u8,
    ];
    let anim = vec![0, 0, 0, 0, 0, 0];

    let mut anmf = vec![0u8; 6];
    anmf.extend_from_slice(&vp8x[4..10]);
    anmf.extend_from_slice(&[100, 0, 0, 0]);
    let frame = webp_lossless(width, height, true);
    anmf.extend_from_slice(&frame[12..]);

    riff_webp(&[(b"VP8X", vp8x), (b"ANIM", anim), (b"ANMF", anmf)])
}
