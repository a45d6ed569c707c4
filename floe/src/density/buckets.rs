// SPDX-License-Identifier: AGPL-3.0-only

//! Bucketing: scatter local particles into per-bin index lists.
//!
//! Each particle is located in the density sub-grid, the density of its
//! cell is looked up, and the particle index is appended to the bucket of
//! the bin that density falls in. Every local particle lands in exactly
//! one bucket; the union of all buckets is `0..local_particles`.

use crate::density::binning::BinLayout;
use crate::density::field::DensityField;
use crate::density::grid::cell_index;
use crate::error::FloeError;

/// Scatter particles into `nb_bins` buckets of local indices.
///
/// `coords` are the three position components, all of length
/// `local_particles`; `mins`/`maxs` are the per-axis coordinate extents.
///
/// # Errors
///
/// [`FloeError::OutOfDomain`] from the spatial indexer, or
/// [`FloeError::Internal`] when a computed cell or bin index escapes its
/// range (an invariant breach, not bad input).
pub fn bucket_particles(
    coords: &[Vec<f32>; 3],
    mins: [f32; 3],
    maxs: [f32; 3],
    field: &DensityField,
    layout: &BinLayout,
) -> Result<Vec<Vec<usize>>, FloeError> {
    let nb_bins = layout.nb_bins();
    let mut buckets: Vec<Vec<usize>> = vec![Vec::new(); nb_bins];

    for p in 0..coords[0].len() {
        let position = [coords[0][p], coords[1][p], coords[2][p]];
        let flat = cell_index(position, mins, maxs, field.cells_per_axis(), p)?;
        if flat >= field.len() {
            return Err(FloeError::Internal(format!(
                "cell index {flat} escapes density field of {} cells",
                field.len()
            )));
        }
        let bin = layout.bucket_index(field.value(flat));
        if bin >= nb_bins {
            return Err(FloeError::Internal(format!(
                "bin index {bin} escapes {nb_bins} bins"
            )));
        }
        buckets[bin].push(p);
    }

    Ok(buckets)
}

/// Per-bucket populations, as a reducible count table.
#[must_use]
pub fn bucket_counts(buckets: &[Vec<usize>]) -> Vec<u64> {
    buckets.iter().map(|b| b.len() as u64).collect()
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;

    /// 2x2x2 grid over [0, 8] with the ramp density 0..8.
    fn ramp_field() -> DensityField {
        DensityField::from_values(vec![0.0, 1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0], 2)
            .expect("cube of 8")
    }

    fn scattered_coords(n: usize) -> [Vec<f32>; 3] {
        let mut seed = 7u64;
        let mut next = || {
            seed = seed.wrapping_mul(6_364_136_223_846_793_005).wrapping_add(1);
            (seed >> 40) as f32 / 16_777_216.0 * 8.0
        };
        let mut coords = [Vec::new(), Vec::new(), Vec::new()];
        for _ in 0..n {
            for axis in &mut coords {
                axis.push(next());
            }
        }
        coords
    }

    #[test]
    fn buckets_partition_all_particles() {
        let field = ramp_field();
        let layout = BinLayout::uniform(0.0, 7.0, 4);
        let coords = scattered_coords(300);
        let buckets =
            bucket_particles(&coords, [0.0; 3], [8.0; 3], &field, &layout).expect("bucketing");

        let total: usize = buckets.iter().map(Vec::len).sum();
        assert_eq!(total, 300, "every particle in exactly one bucket");

        let mut seen = vec![false; 300];
        for bucket in &buckets {
            for &p in bucket {
                assert!(!seen[p], "particle {p} bucketed twice");
                seen[p] = true;
            }
        }
        assert!(seen.iter().all(|&s| s), "every particle covered");
    }

    #[test]
    fn particle_lands_in_bucket_of_its_cell_density() {
        // Particle at (5, 1, 7): cell (1, 0, 1), flat 5, rho 5.0.
        // Bins over [0, 7] with width 1.75: floor(5 / 1.75) = 2.
        let field = ramp_field();
        let layout = BinLayout::uniform(0.0, 7.0, 4);
        let coords = [vec![5.0], vec![1.0], vec![7.0]];
        let buckets =
            bucket_particles(&coords, [0.0; 3], [8.0; 3], &field, &layout).expect("bucketing");
        assert_eq!(buckets[2], vec![0]);
        assert!(buckets[0].is_empty() && buckets[1].is_empty() && buckets[3].is_empty());
    }

    #[test]
    fn out_of_domain_particle_aborts_bucketing() {
        let field = ramp_field();
        let layout = BinLayout::uniform(0.0, 7.0, 4);
        let coords = [vec![5.0, 11.0], vec![1.0, 1.0], vec![7.0, 1.0]];
        let err =
            bucket_particles(&coords, [0.0; 3], [8.0; 3], &field, &layout).unwrap_err();
        assert_eq!(err.kind(), "OutOfDomain");
    }

    #[test]
    fn empty_partition_gives_empty_buckets() {
        let field = ramp_field();
        let layout = BinLayout::uniform(0.0, 7.0, 4);
        let coords = [Vec::new(), Vec::new(), Vec::new()];
        let buckets =
            bucket_particles(&coords, [0.0; 3], [8.0; 3], &field, &layout).expect("bucketing");
        assert_eq!(buckets.len(), 4);
        assert!(buckets.iter().all(Vec::is_empty));
    }

    #[test]
    fn counts_mirror_bucket_sizes() {
        let buckets = vec![vec![3, 1], vec![0], Vec::new(), vec![2]];
        assert_eq!(bucket_counts(&buckets), vec![2, 1, 0, 1]);
    }
}
