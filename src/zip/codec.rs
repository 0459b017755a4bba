//! Per-entry compression codecs.

use std::io::Write;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use flate2::write::DeflateEncoder;
use flate2::{Decompress, FlushDecompress, Status};

use super::structures::CompressionMethod;
use crate::error::{Result, ZipError};

/// Default deflate level, matching zlib's.
pub const DEFAULT_LEVEL: u32 = 6;

/// Codec applied to an entry's content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Compression {
    /// No transformation.
    #[default]
    Store,
    /// Raw deflate (RFC 1951).
    Deflate,
}

impl Compression {
    pub fn method(self) -> CompressionMethod {
        match self {
            Compression::Store => CompressionMethod::Stored,
            Compression::Deflate => CompressionMethod::Deflate,
        }
    }

    /// Maps a header method back to a codec, `None` for methods we cannot decode.
    pub fn from_method(method: CompressionMethod) -> Option<Self> {
        match method {
            CompressionMethod::Stored => Some(Compression::Store),
            CompressionMethod::Deflate => Some(Compression::Deflate),
            CompressionMethod::Unknown(_) => None,
        }
    }

    /// Compress `data`. Output is deterministic for a given level and input.
    pub fn compress(self, data: &[u8], level: u32) -> std::io::Result<Vec<u8>> {
        match self {
            Compression::Store => Ok(data.to_vec()),
            Compression::Deflate => {
                if level > 9 {
                    return Err(std::io::Error::new(
                        std::io::ErrorKind::InvalidInput,
                        format!("compression level {level} is outside 0..=9"),
                    ));
                }
                let mut encoder = DeflateEncoder::new(
                    Vec::with_capacity(data.len() / 2 + 64),
                    flate2::Compression::new(level),
                );
                encoder.write_all(data)?;
                encoder.finish()
            }
        }
    }

    /// Decompress `data`, expecting exactly `expected_len` bytes of output.
    pub fn decompress(self, data: &[u8], expected_len: usize) -> Result<Vec<u8>> {
        let (out, outcome) = self.decompress_partial(data, expected_len);
        outcome.map(|()| out)
    }

    /// Like [`decompress`](Self::decompress), but also hands back whatever
    /// was decoded before a failure.
    pub(crate) fn decompress_partial(self, data: &[u8], expected_len: usize) -> (Vec<u8>, Result<()>) {
        let (out, outcome) = match self {
            Compression::Store => (data.to_vec(), Ok(())),
            Compression::Deflate => {
                let mut out = Vec::with_capacity(expected_len.clamp(64, MAX_INITIAL_CAPACITY));
                let outcome = inflate(data, expected_len, &mut out);
                (out, outcome)
            }
        };
        if outcome.is_ok() && out.len() != expected_len {
            let mismatch = ZipError::CorruptData(format!(
                "expected {expected_len} bytes, decoded {}",
                out.len()
            ));
            return (out, Err(mismatch));
        }
        (out, outcome)
    }
}

/// Decode standard base64, ignoring ASCII whitespace such as line wrapping.
pub(crate) fn decode_base64(input: &[u8]) -> std::result::Result<Vec<u8>, base64::DecodeError> {
    let compact: Vec<u8> = input
        .iter()
        .copied()
        .filter(|b| !b.is_ascii_whitespace())
        .collect();
    STANDARD.decode(compact)
}

pub(crate) fn encode_base64(data: &[u8]) -> String {
    STANDARD.encode(data)
}

/// Header sizes are untrusted, so they only bound the output, never the
/// initial allocation.
const MAX_INITIAL_CAPACITY: usize = 16 << 20;

fn inflate(data: &[u8], expected_len: usize, out: &mut Vec<u8>) -> Result<()> {
    let mut inflater = Decompress::new(false);

    loop {
        if out.len() > expected_len {
            return Err(ZipError::CorruptData(format!(
                "deflate stream expands beyond the declared {expected_len} bytes"
            )));
        }
        if out.len() == out.capacity() {
            out.reserve(out.capacity().max(4096));
        }
        let consumed = inflater.total_in() as usize;
        let produced = inflater.total_out();

        let status = inflater
            .decompress_vec(&data[consumed..], out, FlushDecompress::Finish)
            .map_err(|e| ZipError::CorruptData(e.to_string()))?;

        match status {
            Status::StreamEnd => return Ok(()),
            Status::Ok | Status::BufError => {
                // Output space was available, so no progress means the input ran out
                if inflater.total_in() as usize == consumed && inflater.total_out() == produced {
                    return Err(ZipError::CorruptData(
                        "deflate stream ended before its final block".to_string(),
                    ));
                }
            }
        }
    }
}
