// SPDX-License-Identifier: AGPL-3.0-only

//! Lossless byte-stream kernel over zstd's bulk API.
//!
//! Applied to a lossy kernel's output to shrink its stored representation;
//! decompression is only needed when auditing reported sizes, never for
//! reconstructing floats.

use crate::codec::{CodecError, ParamBag};

const DEFAULT_LEVEL: i32 = 3;

/// zstd kernel with a fixed compression level.
#[derive(Debug, Clone, Copy)]
pub struct ZstdStream {
    level: i32,
}

impl ZstdStream {
    /// Construct from a parameter bag; understands `"level"` (optional).
    ///
    /// # Errors
    ///
    /// [`CodecError`] if `level` is present but not an integer.
    pub fn from_params(params: &ParamBag) -> Result<Self, CodecError> {
        let level = match params.get("level") {
            Some(raw) => raw.parse().map_err(|_| {
                CodecError::new(format!("zstd 'level' is not an integer: '{raw}'"))
            })?,
            None => DEFAULT_LEVEL,
        };
        Ok(Self { level })
    }

    /// Compress a byte stream.
    ///
    /// # Errors
    ///
    /// [`CodecError`] if the backend rejects the stream or returns nothing.
    pub fn compress(&self, bytes: &[u8]) -> Result<Vec<u8>, CodecError> {
        let out = zstd::bulk::compress(bytes, self.level)
            .map_err(|e| CodecError::new(format!("zstd compress: {e}")))?;
        if out.is_empty() {
            return Err(CodecError::new("zstd produced zero bytes"));
        }
        Ok(out)
    }

    /// Decompress a stream of at most `capacity` original bytes.
    ///
    /// # Errors
    ///
    /// [`CodecError`] on a malformed stream or capacity overflow.
    pub fn decompress(&self, bytes: &[u8], capacity: usize) -> Result<Vec<u8>, CodecError> {
        zstd::bulk::decompress(bytes, capacity)
            .map_err(|e| CodecError::new(format!("zstd decompress: {e}")))
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;

    #[test]
    fn default_level_round_trips() {
        let kernel = ZstdStream::from_params(&ParamBag::new()).unwrap();
        let payload: Vec<u8> = (0..2048u32).map(|i| (i % 7) as u8).collect();
        let packed = kernel.compress(&payload).unwrap();
        assert!(packed.len() < payload.len(), "repetitive stream must shrink");
        let back = kernel.decompress(&packed, payload.len()).unwrap();
        assert_eq!(back, payload);
    }

    #[test]
    fn level_param_is_honored() {
        let mut params = ParamBag::new();
        params.insert("level".into(), "9".into());
        assert!(ZstdStream::from_params(&params).is_ok());
        params.insert("level".into(), "fast".into());
        assert!(ZstdStream::from_params(&params).is_err());
    }

    #[test]
    fn garbage_stream_fails_to_decompress() {
        let kernel = ZstdStream::from_params(&ParamBag::new()).unwrap();
        assert!(kernel.decompress(&[0xDE, 0xAD, 0xBE, 0xEF], 64).is_err());
    }

    #[test]
    fn empty_input_still_produces_a_frame() {
        let kernel = ZstdStream::from_params(&ParamBag::new()).unwrap();
        let packed = kernel.compress(&[]).unwrap();
        assert!(!packed.is_empty());
        assert!(kernel.decompress(&packed, 0).unwrap().is_empty());
    }
}
