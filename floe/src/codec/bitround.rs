// SPDX-License-Identifier: AGPL-3.0-only

//! Lossy f32 kernel: keep the `bits` most-significant bits of each IEEE 754
//! word, rounding to nearest at the cut, then bit-pack the kept prefixes.
//!
//! With `bits = 32` the kernel is exactly lossless. For `bits = b >= 10`
//! a finite value with unbiased exponent `e` round-trips within
//! `2^(e - (b - 10))` in absolute terms (half a unit in the last kept
//! mantissa place). Below 10 bits the cut eats into the exponent field;
//! the kernel stays deterministic but the precision contract no longer
//! holds, which is why bit budgets are validated upstream.
//!
//! Stream layout: `bits` (u8), count (u32 LE), then `count * bits` packed
//! bits MSB-first, zero-padded to a byte boundary.

use crate::codec::{CodecError, ParamBag};

const HEADER_BYTES: usize = 5;
const EXP_MASK: u32 = 0x7F80_0000;

/// Bit-rounding kernel with a fixed per-instance precision.
#[derive(Debug, Clone, Copy)]
pub struct BitRound {
    bits: u32,
}

impl BitRound {
    /// Construct from a parameter bag; understands `"bits"` (required).
    ///
    /// # Errors
    ///
    /// [`CodecError`] if `bits` is missing, unparsable, or outside `1..=32`.
    pub fn from_params(params: &ParamBag) -> Result<Self, CodecError> {
        let raw = params
            .get("bits")
            .ok_or_else(|| CodecError::new("bitround requires a 'bits' parameter"))?;
        let bits: u32 = raw
            .parse()
            .map_err(|_| CodecError::new(format!("bitround 'bits' is not an integer: '{raw}'")))?;
        if bits == 0 || bits > 32 {
            return Err(CodecError::new(format!(
                "bitround 'bits' must be in 1..=32 (got {bits})"
            )));
        }
        Ok(Self { bits })
    }

    /// The precision this instance preserves.
    #[must_use]
    pub const fn bits(&self) -> u32 {
        self.bits
    }

    /// Round one word to `bits` kept bits, shifted down to the low end.
    fn quantize(&self, word: u32) -> u32 {
        let drop = 32 - self.bits;
        if drop == 0 {
            return word;
        }
        let increment = 1u32 << (drop - 1);
        let rounded = word.wrapping_add(increment);
        // Rounding must not carry a finite value into the infinity encoding;
        // fall back to truncation at the boundary.
        let keep = if rounded & EXP_MASK == EXP_MASK && word & EXP_MASK != EXP_MASK {
            word
        } else {
            rounded
        };
        keep >> drop
    }

    /// Compress a slice of f32 values.
    ///
    /// # Errors
    ///
    /// [`CodecError`] if the input count does not fit the stream header.
    #[allow(clippy::cast_possible_truncation)] // count checked against u32::MAX
    pub fn compress(&self, values: &[f32]) -> Result<Vec<u8>, CodecError> {
        if u32::try_from(values.len()).is_err() {
            return Err(CodecError::new("bucket exceeds u32 element count"));
        }
        let packed_bytes = (values.len() * self.bits as usize).div_ceil(8);
        let mut out = Vec::with_capacity(HEADER_BYTES + packed_bytes);
        out.push(self.bits as u8);
        out.extend_from_slice(&(values.len() as u32).to_le_bytes());

        let mut acc: u64 = 0;
        let mut pending: u32 = 0;
        for &v in values {
            acc = (acc << self.bits) | u64::from(self.quantize(v.to_bits()));
            pending += self.bits;
            while pending >= 8 {
                pending -= 8;
                out.push((acc >> pending) as u8);
            }
        }
        if pending > 0 {
            out.push((acc << (8 - pending)) as u8);
        }
        Ok(out)
    }

    /// Decompress a stream back into exactly `count` values.
    ///
    /// # Errors
    ///
    /// [`CodecError`] on a malformed header, a count or precision mismatch,
    /// or a short stream.
    #[allow(clippy::cast_possible_truncation)]
    pub fn decompress(&self, stream: &[u8], count: usize) -> Result<Vec<f32>, CodecError> {
        if stream.len() < HEADER_BYTES {
            return Err(CodecError::new("stream shorter than header"));
        }
        let stored_bits = u32::from(stream[0]);
        if stored_bits != self.bits {
            return Err(CodecError::new(format!(
                "stream precision {stored_bits} does not match kernel precision {}",
                self.bits
            )));
        }
        let stored_count =
            u32::from_le_bytes([stream[1], stream[2], stream[3], stream[4]]) as usize;
        if stored_count != count {
            return Err(CodecError::new(format!(
                "stream holds {stored_count} values, expected {count}"
            )));
        }
        let payload = &stream[HEADER_BYTES..];
        if payload.len() * 8 < count * self.bits as usize {
            return Err(CodecError::new("stream payload truncated"));
        }

        let drop = 32 - self.bits;
        let mut values = Vec::with_capacity(count);
        let mut acc: u64 = 0;
        let mut pending: u32 = 0;
        let mut bytes = payload.iter();
        for _ in 0..count {
            while pending < self.bits {
                // Length was checked up front; the iterator cannot run dry.
                let byte = bytes.next().copied().unwrap_or(0);
                acc = (acc << 8) | u64::from(byte);
                pending += 8;
            }
            pending -= self.bits;
            let prefix = ((acc >> pending) & ((1u64 << self.bits) - 1)) as u32;
            let word = if drop == 0 { prefix } else { prefix << drop };
            values.push(f32::from_bits(word));
        }
        Ok(values)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;

    fn kernel(bits: u32) -> BitRound {
        let mut params = ParamBag::new();
        params.insert("bits".into(), bits.to_string());
        BitRound::from_params(&params).expect("valid params")
    }

    fn sample_values(n: usize) -> Vec<f32> {
        // Deterministic LCG spread over a few orders of magnitude.
        let mut seed = 0x2545_F491u64;
        (0..n)
            .map(|_| {
                seed = seed.wrapping_mul(6_364_136_223_846_793_005).wrapping_add(1);
                let mantissa = (seed >> 40) as f32 / 16_777_216.0;
                let scale = [(0.01f32), 1.0, 64.0, 4096.0][(seed % 4) as usize];
                (mantissa - 0.5) * scale
            })
            .collect()
    }

    #[test]
    fn params_require_bits() {
        assert!(BitRound::from_params(&ParamBag::new()).is_err());
        let mut params = ParamBag::new();
        params.insert("bits".into(), "forty".into());
        assert!(BitRound::from_params(&params).is_err());
        params.insert("bits".into(), "0".into());
        assert!(BitRound::from_params(&params).is_err());
        params.insert("bits".into(), "33".into());
        assert!(BitRound::from_params(&params).is_err());
    }

    #[test]
    fn full_precision_is_lossless() {
        let values = sample_values(257);
        let k = kernel(32);
        let stream = k.compress(&values).unwrap();
        let back = k.decompress(&stream, values.len()).unwrap();
        for (i, (a, b)) in values.iter().zip(&back).enumerate() {
            assert_eq!(a.to_bits(), b.to_bits(), "value {i} changed at 32 bits");
        }
    }

    #[test]
    fn error_bound_holds_at_reduced_precision() {
        let values = sample_values(500);
        for bits in [16u32, 20, 24, 28] {
            let k = kernel(bits);
            let stream = k.compress(&values).unwrap();
            let back = k.decompress(&stream, values.len()).unwrap();
            for (&v, &r) in values.iter().zip(&back) {
                let exp = f64::from(v.abs().log2().floor());
                let bound = (exp - f64::from(bits) + 10.0).exp2();
                assert!(
                    f64::from((v - r).abs()) <= bound,
                    "bits={bits}: |{v} - {r}| exceeds {bound}"
                );
            }
        }
    }

    #[test]
    fn stream_size_matches_precision() {
        let values = sample_values(64);
        let s16 = kernel(16).compress(&values).unwrap();
        let s32 = kernel(32).compress(&values).unwrap();
        assert_eq!(s16.len(), HEADER_BYTES + 64 * 2);
        assert_eq!(s32.len(), HEADER_BYTES + 64 * 4);
    }

    #[test]
    fn negative_values_round_trip_sign() {
        let values = vec![-1.5f32, -0.001, -4096.25, 3.25];
        let k = kernel(24);
        let back = k
            .decompress(&k.compress(&values).unwrap(), values.len())
            .unwrap();
        for (v, r) in values.iter().zip(&back) {
            assert_eq!(v.is_sign_negative(), r.is_sign_negative());
        }
    }

    #[test]
    fn rounding_never_produces_infinity_from_finite_input() {
        let values = vec![f32::MAX, -f32::MAX, f32::MAX * 0.999];
        let k = kernel(12);
        let back = k
            .decompress(&k.compress(&values).unwrap(), values.len())
            .unwrap();
        for r in back {
            assert!(r.is_finite(), "finite input decompressed to {r}");
        }
    }

    #[test]
    fn zero_survives_any_precision() {
        for bits in [8u32, 16, 24, 32] {
            let k = kernel(bits);
            let back = k.decompress(&k.compress(&[0.0]).unwrap(), 1).unwrap();
            assert_eq!(back[0].to_bits(), 0);
        }
    }

    #[test]
    fn count_mismatch_is_detected() {
        let k = kernel(20);
        let stream = k.compress(&[1.0, 2.0, 3.0]).unwrap();
        assert!(k.decompress(&stream, 4).is_err());
    }

    #[test]
    fn precision_mismatch_is_detected() {
        let stream = kernel(20).compress(&[1.0, 2.0]).unwrap();
        assert!(kernel(24).decompress(&stream, 2).is_err());
    }

    #[test]
    fn truncated_stream_is_detected() {
        let k = kernel(24);
        let stream = k.compress(&sample_values(32)).unwrap();
        assert!(k.decompress(&stream[..stream.len() - 4], 32).is_err());
        assert!(k.decompress(&stream[..3], 32).is_err());
    }

    #[test]
    fn empty_bucket_compresses_to_header_only() {
        let k = kernel(24);
        let stream = k.compress(&[]).unwrap();
        assert_eq!(stream.len(), HEADER_BYTES);
        assert!(k.decompress(&stream, 0).unwrap().is_empty());
    }

    #[test]
    fn compression_is_deterministic() {
        let values = sample_values(200);
        let k = kernel(22);
        assert_eq!(k.compress(&values).unwrap(), k.compress(&values).unwrap());
    }
}
