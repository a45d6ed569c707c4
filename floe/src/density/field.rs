// SPDX-License-Identifier: AGPL-3.0-only

//! Per-rank density field loading.
//!
//! Each rank reads one or more raw little-endian f32 blobs (no header) and
//! concatenates them, in configured file order, into a flat array covering
//! this rank's `C x C x C` sub-grid.

use crate::config::DensityInput;
use crate::error::FloeError;

/// A rank-local density sub-grid, flat-indexed `i + j*C + k*C^2`.
pub struct DensityField {
    values: Vec<f32>,
    cells_per_axis: usize,
}

impl DensityField {
    /// Read and concatenate this rank's blobs.
    ///
    /// # Errors
    ///
    /// [`FloeError::IoFailed`] on a missing file or a blob whose byte length
    /// does not match its configured count; [`FloeError::ConfigInvalid`] when
    /// the concatenation does not fill the `C^3` sub-grid.
    pub fn load(inputs: &[DensityInput], cells_per_axis: usize) -> Result<Self, FloeError> {
        let expected: usize = inputs.iter().map(|input| input.count).sum();
        let mut values = Vec::with_capacity(expected);

        for input in inputs {
            let bytes = std::fs::read(&input.data).map_err(|e| FloeError::io(&input.data, &e))?;
            if bytes.len() != input.count * 4 {
                return Err(FloeError::IoFailed {
                    path: input.data.clone(),
                    reason: format!(
                        "expected {} density values ({} bytes), file holds {} bytes",
                        input.count,
                        input.count * 4,
                        bytes.len()
                    ),
                });
            }
            values.extend(
                bytes
                    .chunks_exact(4)
                    .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]])),
            );
        }

        Self::from_values(values, cells_per_axis)
    }

    /// Wrap an already-loaded array, checking it fills the sub-grid.
    ///
    /// # Errors
    ///
    /// [`FloeError::ConfigInvalid`] if `values.len() != cells_per_axis^3`.
    pub fn from_values(values: Vec<f32>, cells_per_axis: usize) -> Result<Self, FloeError> {
        let cells = cells_per_axis * cells_per_axis * cells_per_axis;
        if values.len() != cells {
            return Err(FloeError::ConfigInvalid(format!(
                "density inputs hold {} values, sub-grid of {cells_per_axis} cells per axis needs {cells}",
                values.len()
            )));
        }
        Ok(Self {
            values,
            cells_per_axis,
        })
    }

    /// Number of cells in this rank's sub-grid.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether the sub-grid is empty (degenerate configuration).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Cells per axis of the sub-grid.
    #[must_use]
    pub const fn cells_per_axis(&self) -> usize {
        self.cells_per_axis
    }

    /// Density at a flat cell index.
    #[must_use]
    pub fn value(&self, flat: usize) -> f32 {
        self.values[flat]
    }

    /// The raw flat array.
    #[must_use]
    pub fn values(&self) -> &[f32] {
        &self.values
    }

    /// Local (min, max) of the field, widened to f64 for the reduction.
    #[must_use]
    pub fn local_extents(&self) -> (f64, f64) {
        let mut min = f64::INFINITY;
        let mut max = f64::NEG_INFINITY;
        for &v in &self.values {
            let v = f64::from(v);
            min = min.min(v);
            max = max.max(v);
        }
        (min, max)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;
    use std::path::Path;

    fn blob(path: &Path, values: &[f32]) {
        std::fs::write(path, bytemuck::cast_slice(values)).expect("write blob");
    }

    #[test]
    fn concatenates_blobs_in_configured_order() {
        let dir = tempfile::tempdir().expect("tempdir");
        let a = dir.path().join("rho_a.bin");
        let b = dir.path().join("rho_b.bin");
        blob(&a, &[0.0, 1.0, 2.0, 3.0]);
        blob(&b, &[4.0, 5.0, 6.0, 7.0]);

        let inputs = vec![
            DensityInput { data: a, count: 4 },
            DensityInput { data: b, count: 4 },
        ];
        let field = DensityField::load(&inputs, 2).expect("load");
        assert_eq!(field.len(), 8);
        assert_eq!(field.values(), &[0.0, 1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0]);
        assert!((field.value(5) - 5.0).abs() < f32::EPSILON);
    }

    #[test]
    fn short_blob_is_io_failed() {
        let dir = tempfile::tempdir().expect("tempdir");
        let a = dir.path().join("rho.bin");
        blob(&a, &[1.0, 2.0]);
        let inputs = vec![DensityInput { data: a, count: 8 }];
        let err = DensityField::load(&inputs, 2).unwrap_err();
        assert_eq!(err.kind(), "IoFailed");
    }

    #[test]
    fn count_mismatch_with_grid_is_config_invalid() {
        let err = DensityField::from_values(vec![0.0; 9], 2).unwrap_err();
        assert_eq!(err.kind(), "ConfigInvalid");
    }

    #[test]
    fn extents_cover_min_and_max() {
        let field = DensityField::from_values(vec![3.0, -1.5, 8.25, 0.0, 1.0, 1.0, 1.0, 1.0], 2)
            .expect("field");
        let (min, max) = field.local_extents();
        assert!((min + 1.5).abs() < f64::EPSILON);
        assert!((max - 8.25).abs() < f64::EPSILON);
    }
}
