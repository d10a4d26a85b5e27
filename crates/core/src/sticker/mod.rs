//! Sticker metadata wrapper.
//!
//! Messaging clients read sticker attribution from an EXIF block inside the
//! WebP container. The block is a tiny little-endian TIFF structure with a
//! single private tag (`0x5741`) whose value is a JSON document.

pub mod webp;

use serde::Serialize;
use uuid::Uuid;

pub use webp::{canvas_size, embed_exif, WebpError, WebpInfo};

/// Private TIFF tag carrying the sticker JSON.
const STICKER_TAG: u16 = 0x5741;
/// TIFF type UNDEFINED (raw bytes).
const TIFF_UNDEFINED: u16 = 7;
/// Offset of the JSON payload from the start of the TIFF header.
const PAYLOAD_OFFSET: u32 = 22;

/// Pack attribution embedded into a sticker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StickerMetadata {
    #[serde(rename = "sticker-pack-id")]
    pub pack_id: String,
    #[serde(rename = "sticker-pack-name")]
    pub pack: String,
    #[serde(rename = "sticker-pack-publisher")]
    pub author: String,
    pub emojis: Vec<String>,
}

impl StickerMetadata {
    /// Creates metadata with a fresh pack id.
    pub fn new(pack: impl Into<String>, author: impl Into<String>) -> Self {
        Self {
            pack_id: Uuid::new_v4().to_string(),
            pack: pack.into(),
            author: author.into(),
            emojis: Vec::new(),
        }
    }

    /// Serializes the metadata into the EXIF block.
    pub fn to_exif(&self) -> Vec<u8> {
        // Serializing a struct of strings cannot fail.
        let json = serde_json::to_vec(self).unwrap_or_default();

        let mut exif = Vec::with_capacity(PAYLOAD_OFFSET as usize + json.len());
        exif.extend_from_slice(b"II");
        exif.extend_from_slice(&42u16.to_le_bytes());
        exif.extend_from_slice(&8u32.to_le_bytes()); // first IFD
        exif.extend_from_slice(&1u16.to_le_bytes()); // one entry
        exif.extend_from_slice(&STICKER_TAG.to_le_bytes());
        exif.extend_from_slice(&TIFF_UNDEFINED.to_le_bytes());
        exif.extend_from_slice(&(json.len() as u32).to_le_bytes());
        exif.extend_from_slice(&PAYLOAD_OFFSET.to_le_bytes());
        exif.extend_from_slice(&json);
        exif
    }

    /// Returns `webp` with this metadata embedded.
    pub fn apply(&self, webp: &[u8]) -> Result<Vec<u8>, WebpError> {
        embed_exif(webp, &self.to_exif())
    }

    /// Reads metadata back out of a sticker, if present.
    pub fn read(webp: &[u8]) -> Result<Option<serde_json::Value>, WebpError> {
        let Some(exif) = webp::exif_payload(webp)? else {
            return Ok(None);
        };
        if exif.len() < PAYLOAD_OFFSET as usize {
            return Ok(None);
        }
        let len = u32::from_le_bytes([exif[14], exif[15], exif[16], exif[17]]) as usize;
        let json = exif
            .get(PAYLOAD_OFFSET as usize..PAYLOAD_OFFSET as usize + len)
            .unwrap_or_default();
        Ok(serde_json::from_slice(json).ok())
    }
}
