// SPDX-License-Identifier: AGPL-3.0-or-later
// RedSess - Redis-Backed Session Storage
// Copyright (C) 2026 Sushanth Reddy Vanagala (https://github.com/sushanthpy)
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Session payload codec
//!
//! Payloads at or above the compression threshold are stored compressed
//! with a four-byte self-describing prefix tag. Decoding dispatches on the
//! tag alone, so the configured library can change at any time without
//! breaking reads of records written under the previous one.
//!
//! Compression is best-effort: a failing compressor logs a warning and the
//! payload is stored uncompressed. A tagged payload that cannot be
//! decompressed is fatal to the read.

use std::io::{Read, Write};

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;

use redsess_core::{CompressionLibrary, RedSessError, Result};

pub const TAG_LEN: usize = 4;
const TAG_SNAPPY: &[u8] = b":sn:";
const TAG_LZF: &[u8] = b":lz:";
const TAG_LZ4: &[u8] = b":l4:";
const TAG_GZIP: &[u8] = b":gz:";

/// Transparent payload codec configured from the session handler's
/// compression knobs.
#[derive(Debug, Clone, Copy)]
pub struct Codec {
    library: CompressionLibrary,
    threshold: usize,
}

impl Codec {
    pub fn new(library: CompressionLibrary, threshold: usize) -> Self {
        Self { library, threshold }
    }

    pub fn library(&self) -> CompressionLibrary {
        self.library
    }

    /// Encode a payload for storage. Never fails: when the compressor
    /// produces nothing the original bytes are stored untagged.
    pub fn encode(&self, data: &[u8]) -> Vec<u8> {
        if self.threshold == 0
            || self.library == CompressionLibrary::None
            || data.len() < self.threshold
        {
            return data.to_vec();
        }

        let (tag, compressed) = match self.library {
            CompressionLibrary::None => unreachable!("filtered above"),
            CompressionLibrary::Gzip => (TAG_GZIP, gzip_compress(data)),
            CompressionLibrary::Lz4 => (TAG_LZ4, Some(lz4_flex::compress_prepend_size(data))),
            CompressionLibrary::Snappy => {
                (TAG_SNAPPY, snap::raw::Encoder::new().compress_vec(data).ok())
            }
            CompressionLibrary::Lzf => (TAG_LZF, lzf_compress(data)),
        };

        match compressed {
            Some(body) if !body.is_empty() => {
                let mut out = Vec::with_capacity(TAG_LEN + body.len());
                out.extend_from_slice(tag);
                out.extend_from_slice(&body);
                out
            }
            _ => {
                tracing::warn!(
                    library = self.library.as_str(),
                    len = data.len(),
                    "could not compress session data; storing uncompressed"
                );
                data.to_vec()
            }
        }
    }

    /// Decode a stored payload. Untagged input is returned unchanged.
    pub fn decode(&self, data: &[u8]) -> Result<Vec<u8>> {
        if data.len() < TAG_LEN {
            return Ok(data.to_vec());
        }
        let (tag, body) = data.split_at(TAG_LEN);
        match tag {
            t if t == TAG_SNAPPY => snap::raw::Decoder::new()
                .decompress_vec(body)
                .map_err(|e| RedSessError::Decode(format!("snappy: {e}"))),
            t if t == TAG_LZ4 => lz4_flex::decompress_size_prepended(body)
                .map_err(|e| RedSessError::Decode(format!("lz4: {e}"))),
            t if t == TAG_GZIP => gzip_decompress(body),
            t if t == TAG_LZF => lzf_decompress(body),
            _ => Ok(data.to_vec()),
        }
    }
}

fn gzip_compress(data: &[u8]) -> Option<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::fast());
    encoder.write_all(data).ok()?;
    encoder.finish().ok()
}

fn gzip_decompress(body: &[u8]) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    GzDecoder::new(body)
        .read_to_end(&mut out)
        .map_err(|e| RedSessError::Decode(format!("gzip: {e}")))?;
    Ok(out)
}

// The lzf stream carries no output length, so the tagged body embeds a
// four-byte little-endian uncompressed length ahead of the lzf bytes,
// mirroring the size-prepended lz4 framing.
#[cfg(feature = "lzf")]
fn lzf_compress(data: &[u8]) -> Option<Vec<u8>> {
    let body = lzf::compress(data).ok()?;
    let mut out = Vec::with_capacity(4 + body.len());
    out.extend_from_slice(&(data.len() as u32).to_le_bytes());
    out.extend_from_slice(&body);
    Some(out)
}

#[cfg(not(feature = "lzf"))]
fn lzf_compress(_data: &[u8]) -> Option<Vec<u8>> {
    None
}

#[cfg(feature = "lzf")]
fn lzf_decompress(body: &[u8]) -> Result<Vec<u8>> {
    if body.len() < 4 {
        return Err(RedSessError::Decode("lzf: truncated payload".into()));
    }
    let mut len_bytes = [0u8; 4];
    len_bytes.copy_from_slice(&body[..4]);
    let expected = u32::from_le_bytes(len_bytes) as usize;
    if expected == 0 {
        return Ok(Vec::new());
    }
    lzf::decompress(&body[4..], expected).map_err(|e| RedSessError::Decode(format!("lzf: {e:?}")))
}

#[cfg(not(feature = "lzf"))]
fn lzf_decompress(_body: &[u8]) -> Result<Vec<u8>> {
    Err(RedSessError::Decode(
        "payload is lzf-compressed but lzf support is not compiled in".into(),
    ))
}
