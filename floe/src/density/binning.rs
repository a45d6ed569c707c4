// SPDX-License-Identifier: AGPL-3.0-only

//! Density binning: equal-width or equiprobable (quantile) intervals.
//!
//! Global extents come first: every rank all-reduces its local min/max so
//! the bin layout agrees everywhere before any bit budget is assigned. In
//! adaptive mode the configured bin count is overridden by the equiprobable
//! rule `ceil(2 * n^(2/5))` (Prins et al., chi-square goodness-of-fit) and
//! bin lower bounds are quantiles of the locally sorted field, so every bin
//! carries roughly the same codec workload regardless of the distribution's
//! shape.

use crate::comm::Collective;
use crate::density::field::DensityField;
use crate::error::FloeError;

/// Globally reduced density extents.
///
/// # Errors
///
/// [`FloeError::InvalidRange`] when the reduced extents are non-finite or
/// degenerate (`max <= min`).
pub fn global_extents<C: Collective>(
    comm: &C,
    field: &DensityField,
) -> Result<(f64, f64), FloeError> {
    let (local_min, local_max) = field.local_extents();
    let min = comm.all_reduce_min(local_min);
    let max = comm.all_reduce_max(local_max);
    if !min.is_finite() || !max.is_finite() || max <= min {
        return Err(FloeError::InvalidRange { min, max });
    }
    Ok((min, max))
}

/// Equiprobable bin count for `n` samples: `ceil(2 * n^(2/5))`, capped at
/// `n` so every bin can hold at least one sample.
#[must_use]
#[allow(clippy::cast_possible_truncation)] // ceil of a small positive float
pub fn equiprobable_bin_count(n: usize) -> usize {
    let raw = (2.0 * (n as f64).powf(0.4)).ceil() as usize;
    raw.clamp(1, n.max(1))
}

/// A bin layout over density values, shared by histogram and bucketing.
pub enum BinLayout {
    /// Equal-width intervals over the global extents.
    Uniform {
        /// Global density minimum.
        rho_min: f64,
        /// Global density maximum.
        rho_max: f64,
        /// Number of intervals.
        nb_bins: usize,
    },
    /// Quantile intervals from the locally sorted field.
    Adaptive {
        /// Lower bound of each bin; `bin_ranges[0]` is the local minimum.
        bin_ranges: Vec<f32>,
        /// Samples per bin in the local equiprobable partitioning.
        bin_capacity: usize,
    },
}

impl BinLayout {
    /// Equal-width layout over validated global extents.
    #[must_use]
    pub const fn uniform(rho_min: f64, rho_max: f64, nb_bins: usize) -> Self {
        Self::Uniform {
            rho_min,
            rho_max,
            nb_bins,
        }
    }

    /// Quantile layout; overrides the configured bin count by the
    /// equiprobable rule and sorts a copy of the field.
    #[must_use]
    pub fn adaptive(field: &DensityField) -> Self {
        let n = field.len();
        let nb_bins = equiprobable_bin_count(n);
        let bin_capacity = (n / nb_bins).max(1);

        let mut sorted = field.values().to_vec();
        sorted.sort_unstable_by(f32::total_cmp);

        let bin_ranges = (0..nb_bins).map(|b| sorted[b * bin_capacity]).collect();
        Self::Adaptive {
            bin_ranges,
            bin_capacity,
        }
    }

    /// Number of bins in the layout.
    #[must_use]
    pub fn nb_bins(&self) -> usize {
        match self {
            Self::Uniform { nb_bins, .. } => *nb_bins,
            Self::Adaptive { bin_ranges, .. } => bin_ranges.len(),
        }
    }

    /// Bin index of a density value, clamped to `nb_bins - 1`.
    ///
    /// Uniform mode is pure integer math on the global width; adaptive mode
    /// is a binary search over the quantile lower bounds, where a value
    /// equal to a bin's lower bound belongs to that bin.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)] // floor of a clamped ratio
    pub fn bucket_index(&self, rho: f32) -> usize {
        match self {
            Self::Uniform {
                rho_min,
                rho_max,
                nb_bins,
            } => {
                let t = (f64::from(rho) - rho_min) / (rho_max - rho_min) * (*nb_bins as f64);
                let b = t.floor().max(0.0) as usize;
                b.min(nb_bins - 1)
            }
            Self::Adaptive { bin_ranges, .. } => {
                let after = bin_ranges.partition_point(|&lower| lower <= rho);
                after.saturating_sub(1)
            }
        }
    }

    /// Lower bound of a bin, in density units (for reports).
    #[must_use]
    pub fn lower_bound(&self, bin: usize) -> f64 {
        match self {
            Self::Uniform {
                rho_min,
                rho_max,
                nb_bins,
            } => {
                let width = (rho_max - rho_min) / *nb_bins as f64;
                rho_min + bin as f64 * width
            }
            Self::Adaptive { bin_ranges, .. } => f64::from(bin_ranges[bin]),
        }
    }

    /// This rank's histogram contribution.
    ///
    /// Uniform mode counts values per interval. Adaptive mode reports the
    /// local equiprobable population `[bin_capacity; nb_bins]`, an
    /// acknowledged approximation of the true global quantile histogram.
    #[must_use]
    pub fn local_histogram(&self, field: &DensityField) -> Vec<u64> {
        match self {
            Self::Uniform { nb_bins, .. } => {
                let mut histogram = vec![0u64; *nb_bins];
                for &rho in field.values() {
                    histogram[self.bucket_index(rho)] += 1;
                }
                histogram
            }
            Self::Adaptive {
                bin_ranges,
                bin_capacity,
            } => vec![*bin_capacity as u64; bin_ranges.len()],
        }
    }
}
