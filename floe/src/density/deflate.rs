// SPDX-License-Identifier: AGPL-3.0-only

//! Per-component codec orchestration.
//!
//! For one field component, walks the buckets in bin order: gathers the
//! component's values for each non-empty bucket, runs the lossy kernel at
//! that bin's bit budget, optionally passes the lossy stream through the
//! lossless kernel (size accounting only), then decompresses and appends
//! the reconstructed values. The output is in bucket-concatenated order
//! (bucket order first, source order within each bucket), which is the
//! order the partition writer expects for every column.

use crate::codec::{LosslessKernel, LossyKernel};
use crate::config::KernelSpec;
use crate::error::FloeError;

/// Local compressed-size accounting for one component.
#[derive(Debug, Clone, Copy, Default)]
pub struct DeflateBytes {
    /// Bytes out of the lossy kernel, summed over buckets.
    pub lossy: u64,
    /// Bytes out of the lossless kernel, if one is configured.
    pub lossless: Option<u64>,
}

/// Run the codec cascade over every non-empty bucket of one component.
///
/// `values` is the component in original particle order; `buckets` holds
/// local particle indices per bin; `bits[b]` is bin `b`'s precision budget.
///
/// # Errors
///
/// [`FloeError::CodecFailed`] when a kernel cannot be built, produces zero
/// bytes, or decompresses to the wrong count; [`FloeError::Internal`] when
/// a bucket references a particle index outside the component.
pub fn deflate_component(
    component: &str,
    values: &[f32],
    buckets: &[Vec<usize>],
    bits: &[u8],
    lossy_spec: &KernelSpec,
    lossless_spec: Option<&KernelSpec>,
) -> Result<(Vec<f32>, DeflateBytes), FloeError> {
    let codec_failed = |bin: usize, reason: String| FloeError::CodecFailed {
        bin,
        component: component.to_string(),
        reason,
    };

    let mut reconstructed = Vec::with_capacity(values.len());
    let mut bytes = DeflateBytes {
        lossy: 0,
        lossless: lossless_spec.map(|_| 0),
    };

    for (bin, bucket) in buckets.iter().enumerate() {
        if bucket.is_empty() {
            continue;
        }

        let mut gathered = Vec::with_capacity(bucket.len());
        for &p in bucket {
            let v = values.get(p).ok_or_else(|| {
                FloeError::Internal(format!(
                    "bucket {bin} references particle {p}, component '{component}' holds {}",
                    values.len()
                ))
            })?;
            gathered.push(*v);
        }

        // One kernel instance per bucket, parameterized with this bin's
        // budget through the string bag.
        let mut params = lossy_spec.params.clone();
        params.insert("bits".into(), bits[bin].to_string());
        let lossy = LossyKernel::create(&lossy_spec.name, &params)
            .map_err(|e| codec_failed(bin, e.reason))?;

        let stream = lossy
            .compress(&gathered)
            .map_err(|e| codec_failed(bin, e.reason))?;
        if stream.is_empty() {
            return Err(codec_failed(bin, "lossy kernel produced zero bytes".into()));
        }
        bytes.lossy += stream.len() as u64;

        if let Some(spec) = lossless_spec {
            // The lossy stream is treated as an opaque byte sequence here;
            // only the reported size changes, never the floats.
            let lossless = LosslessKernel::create(&spec.name, &spec.params)
                .map_err(|e| codec_failed(bin, e.reason))?;
            let packed = lossless
                .compress(&stream)
                .map_err(|e| codec_failed(bin, e.reason))?;
            if let Some(total) = bytes.lossless.as_mut() {
                *total += packed.len() as u64;
            }
        }

        let restored = lossy
            .decompress(&stream, bucket.len())
            .map_err(|e| codec_failed(bin, e.reason))?;
        if restored.len() != bucket.len() {
            return Err(codec_failed(
                bin,
                format!("decompressed {} values, expected {}", restored.len(), bucket.len()),
            ));
        }
        reconstructed.extend_from_slice(&restored);
    }

    let bucketed: usize = buckets.iter().map(Vec::len).sum();
    if reconstructed.len() != bucketed {
        return Err(FloeError::Internal(format!(
            "component '{component}' reassembled {} values from {bucketed} bucketed",
            reconstructed.len()
        )));
    }

    Ok((reconstructed, bytes))
}
