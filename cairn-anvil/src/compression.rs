//! Chunk payload compression and the `[length:4][scheme:1][data]` framing
//! used inside region file sectors.

use std::io::{Read, Write};

use anyhow::{Context, Result, bail};
use flate2::Compression;
use flate2::read::{GzDecoder, ZlibDecoder};
use flate2::write::{GzEncoder, ZlibEncoder};
use lz4_java_wrc::{Lz4BlockInput, Lz4BlockOutput};

/// Set on the scheme byte when the payload lives in an external `.mcc` file.
const EXTERNAL_FLAG: u8 = 0x80;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum CompressionScheme {
    Gzip = 1,
    #[default]
    Zlib = 2,
    Uncompressed = 3,
    Lz4 = 4,
}

impl CompressionScheme {
    pub fn from_id(id: u8) -> Option<Self> {
        match id {
            1 => Some(Self::Gzip),
            2 => Some(Self::Zlib),
            3 => Some(Self::Uncompressed),
            4 => Some(Self::Lz4),
            _ => None,
        }
    }

    pub fn id(self) -> u8 {
        self as u8
    }
}

pub fn compress(data: &[u8], scheme: CompressionScheme) -> Result<Vec<u8>> {
    let out = match scheme {
        CompressionScheme::Gzip => {
            let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
            encoder.write_all(data)?;
            encoder.finish()?
        }
        CompressionScheme::Zlib => {
            let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
            encoder.write_all(data)?;
            encoder.finish()?
        }
        CompressionScheme::Uncompressed => data.to_vec(),
        CompressionScheme::Lz4 => {
            let mut out = Vec::new();
            {
                let mut encoder = Lz4BlockOutput::new(&mut out);
                encoder.write_all(data)?;
                encoder.flush()?;
            }
            out
        }
    };
    Ok(out)
}

pub fn decompress(data: &[u8], scheme: CompressionScheme) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    match scheme {
        CompressionScheme::Gzip => {
            GzDecoder::new(data).read_to_end(&mut out)?;
        }
        CompressionScheme::Zlib => {
            ZlibDecoder::new(data).read_to_end(&mut out)?;
        }
        CompressionScheme::Uncompressed => out.extend_from_slice(data),
        CompressionScheme::Lz4 => {
            Lz4BlockInput::new(data).read_to_end(&mut out)?;
        }
    }
    Ok(out)
}

/// Compress NBT and prefix it with the sector framing header.
pub fn compress_and_wrap_chunk(nbt: &[u8], scheme: CompressionScheme) -> Result<Vec<u8>> {
    let compressed = compress(nbt, scheme).context("Failed to compress chunk")?;

    // Pack in MCA format: [length:4][type:1][data:N]
    let mut result = Vec::with_capacity(5 + compressed.len());
    let total_len = (compressed.len() + 1) as u32;
    result.extend_from_slice(&total_len.to_be_bytes());
    result.push(scheme.id());
    result.extend_from_slice(&compressed);
    Ok(result)
}

/// Inverse of [`compress_and_wrap_chunk`]. Trailing sector padding is ignored.
pub fn unwrap_chunk(blob: &[u8]) -> Result<Vec<u8>> {
    if blob.len() < 5 {
        bail!("Chunk blob too short ({} bytes)", blob.len());
    }
    let length = u32::from_be_bytes([blob[0], blob[1], blob[2], blob[3]]) as usize;
    if length == 0 || 4 + length > blob.len() {
        bail!("Chunk length {} exceeds stored sectors ({} bytes)", length, blob.len());
    }
    let scheme_id = blob[4];
    if scheme_id & EXTERNAL_FLAG != 0 {
        bail!("External chunk payloads are not supported");
    }
    let scheme = CompressionScheme::from_id(scheme_id)
        .with_context(|| format!("Unknown compression scheme {}", scheme_id))?;

    decompress(&blob[5..4 + length], scheme)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SCHEMES: [CompressionScheme; 4] = [
        CompressionScheme::Gzip,
        CompressionScheme::Zlib,
        CompressionScheme::Uncompressed,
        CompressionScheme::Lz4,
    ];

    #[test]
    fn test_wrap_unwrap_all_schemes() {
        let payload: Vec<u8> = (0..2000u32).map(|i| (i % 7) as u8).collect();
        for scheme in SCHEMES {
            let blob = compress_and_wrap_chunk(&payload, scheme).unwrap();
            assert_eq!(blob[4], scheme.id());
            assert_eq!(unwrap_chunk(&blob).unwrap(), payload, "scheme {:?}", scheme);
        }
    }

    #[test]
    fn test_unwrap_ignores_sector_padding() {
        let mut blob = compress_and_wrap_chunk(b"hello", CompressionScheme::Zlib).unwrap();
        blob.resize(4096, 0);
        assert_eq!(unwrap_chunk(&blob).unwrap(), b"hello");
    }

    #[test]
    fn test_unwrap_rejects_garbage() {
        assert!(unwrap_chunk(&[0, 0]).is_err());
        assert!(unwrap_chunk(&[0, 0, 0, 0, 2]).is_err());
        assert!(unwrap_chunk(&[0, 0, 0, 9, 2, 1]).is_err());
        assert!(unwrap_chunk(&[0, 0, 0, 2, 9, 1]).is_err());
        assert!(unwrap_chunk(&[0, 0, 0, 2, 0x82, 1]).is_err());
    }
}
