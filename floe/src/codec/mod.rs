// SPDX-License-Identifier: AGPL-3.0-only

//! Codec kernels and the name-keyed registry.
//!
//! Kernels are tagged variants rather than boxed trait objects: the set of
//! supported codecs is closed and config-driven, so a `match` per call keeps
//! dispatch transparent. Parameters travel in a string-keyed bag
//! ([`BTreeMap`]) exactly as they appear in the `compress.kernels` config
//! section; each kernel parses the keys it understands when constructed.
//!
//! One kernel instance serves one bucket: construct, compress, decompress,
//! drop.

mod bitround;
mod stream;

pub use bitround::BitRound;
pub use stream::ZstdStream;

use std::collections::BTreeMap;
use std::fmt;

/// What a kernel reports when it cannot complete an operation.
///
/// Carries only the reason; the orchestrator knows which bin and component
/// were in flight and wraps this into the pipeline error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodecError {
    /// Human-readable cause.
    pub reason: String,
}

impl CodecError {
    pub(crate) fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

impl fmt::Display for CodecError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.reason)
    }
}

impl std::error::Error for CodecError {}

/// String-keyed codec parameter bag.
pub type ParamBag = BTreeMap<String, String>;

/// A lossy float kernel selected by registry name.
pub enum LossyKernel {
    /// Most-significant-bit rounding of IEEE 754 words.
    BitRound(BitRound),
}

impl LossyKernel {
    /// Construct a kernel by name from a parameter bag.
    ///
    /// # Errors
    ///
    /// [`CodecError`] for an unknown name or unparsable parameters.
    pub fn create(name: &str, params: &ParamBag) -> Result<Self, CodecError> {
        match name {
            "bitround" => Ok(Self::BitRound(BitRound::from_params(params)?)),
            other => Err(CodecError::new(format!("unknown lossy kernel '{other}'"))),
        }
    }

    /// Compress a component slice.
    ///
    /// # Errors
    ///
    /// [`CodecError`] if the kernel produces no output.
    pub fn compress(&self, values: &[f32]) -> Result<Vec<u8>, CodecError> {
        match self {
            Self::BitRound(kernel) => kernel.compress(values),
        }
    }

    /// Decompress a stream produced by [`Self::compress`] back into exactly
    /// `count` values.
    ///
    /// # Errors
    ///
    /// [`CodecError`] on a malformed stream or count mismatch.
    pub fn decompress(&self, stream: &[u8], count: usize) -> Result<Vec<f32>, CodecError> {
        match self {
            Self::BitRound(kernel) => kernel.decompress(stream, count),
        }
    }
}

/// A lossless byte-stream kernel selected by registry name.
pub enum LosslessKernel {
    /// zstd bulk compression.
    Zstd(ZstdStream),
}

impl LosslessKernel {
    /// Construct a kernel by name from a parameter bag.
    ///
    /// # Errors
    ///
    /// [`CodecError`] for an unknown name or unparsable parameters.
    pub fn create(name: &str, params: &ParamBag) -> Result<Self, CodecError> {
        match name {
            "zstd" => Ok(Self::Zstd(ZstdStream::from_params(params)?)),
            other => Err(CodecError::new(format!("unknown lossless kernel '{other}'"))),
        }
    }

    /// Compress a byte stream.
    ///
    /// # Errors
    ///
    /// [`CodecError`] if the backend rejects the stream.
    pub fn compress(&self, bytes: &[u8]) -> Result<Vec<u8>, CodecError> {
        match self {
            Self::Zstd(kernel) => kernel.compress(bytes),
        }
    }

    /// Decompress a byte stream of at most `capacity` original bytes.
    ///
    /// # Errors
    ///
    /// [`CodecError`] on a malformed stream.
    pub fn decompress(&self, bytes: &[u8], capacity: usize) -> Result<Vec<u8>, CodecError> {
        match self {
            Self::Zstd(kernel) => kernel.decompress(bytes, capacity),
        }
    }
}

/// Whether `name` is a known lossy kernel.
#[must_use]
pub fn is_lossy_kernel(name: &str) -> bool {
    name == "bitround"
}

/// Whether `name` is a known lossless kernel.
#[must_use]
pub fn is_lossless_kernel(name: &str) -> bool {
    name == "zstd"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_rejects_unknown_names() {
        let params = ParamBag::new();
        assert!(LossyKernel::create("zfp", &params).is_err());
        assert!(LosslessKernel::create("lz4", &params).is_err());
    }

    #[test]
    fn registry_knows_shipped_kernels() {
        assert!(is_lossy_kernel("bitround"));
        assert!(!is_lossy_kernel("zstd"));
        assert!(is_lossless_kernel("zstd"));
        assert!(!is_lossless_kernel("bitround"));
    }

    #[test]
    fn lossy_create_reads_bits_param() {
        let mut params = ParamBag::new();
        params.insert("bits".into(), "24".into());
        assert!(LossyKernel::create("bitround", &params).is_ok());
    }
}
