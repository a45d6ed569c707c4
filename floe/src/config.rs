// SPDX-License-Identifier: AGPL-3.0-only

//! JSON run configuration for the compression pipeline.
//!
//! One configuration file describes one run: the particle snapshot to read
//! and rewrite, the per-rank density blobs, the binning and bit-budget
//! policy, the report file prefixes, and the codec cascade. Parsing is
//! permissive (unknown keys belong to sibling tools and are ignored);
//! validation afterwards is strict and produces [`FloeError::ConfigInvalid`].

use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::error::FloeError;

/// Input and output paths of the particle snapshot partition.
#[derive(Debug, Clone, Deserialize)]
pub struct SnapshotPaths {
    /// Snapshot to compress.
    pub input: PathBuf,
    /// Where the reconstructed partition is written.
    pub output: PathBuf,
}

/// One raw density blob assigned to some rank.
#[derive(Debug, Clone, Deserialize)]
pub struct DensityInput {
    /// Path of the raw little-endian f32 blob (no header).
    pub data: PathBuf,
    /// Number of f32 values the blob holds.
    pub count: usize,
}

/// Inclusive cell-index extents of the density grid along one axis.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct GridExtents {
    /// First cell index.
    pub min: i64,
    /// Last cell index (inclusive).
    pub max: i64,
}

/// Density-field inputs and grid geometry.
#[derive(Debug, Clone, Deserialize)]
pub struct DensitySection {
    /// Raw blobs, dispatched to ranks in file order.
    pub inputs: Vec<DensityInput>,
    /// Inclusive cell-index extents; `cells_per_axis = 1 + max - min`.
    pub extents: GridExtents,
}

/// Binning and bit-budget policy.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct BinsSection {
    /// Number of bins (overridden by the equiprobable rule in adaptive mode).
    pub count: usize,
    /// Equiprobable (quantile) bins instead of equal-width bins.
    pub adaptive: bool,
    /// Fewest precision bits any bin may receive.
    pub min_bits: u8,
    /// Most precision bits any bin may receive.
    pub max_bits: u8,
}

/// Output prefixes for the rank-0 report files.
#[derive(Debug, Clone, Deserialize)]
pub struct PlotsSection {
    /// Prefix of the density histogram table (`<prefix>.dat`).
    pub density: PathBuf,
    /// Prefix of the bucket population table (`<prefix>.dat`).
    pub buckets: PathBuf,
}

/// One codec in the cascade, by registry name plus a string-keyed bag.
///
/// `BTreeMap` keeps parameter iteration deterministic, which keeps every
/// derived report byte-identical across runs.
#[derive(Debug, Clone, Deserialize)]
pub struct KernelSpec {
    /// Registry name ("bitround", "zstd").
    pub name: String,
    /// Codec-specific parameters.
    #[serde(default)]
    pub params: BTreeMap<String, String>,
}

/// The `compress` section: an ordered codec cascade.
#[derive(Debug, Clone, Deserialize)]
pub struct CompressSection {
    /// First entry is the lossy kernel, optional second is lossless.
    pub kernels: Vec<KernelSpec>,
}

/// A full run configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct RunConfig {
    /// Particle snapshot paths.
    pub hacc: SnapshotPaths,
    /// Density blobs and grid extents.
    pub density: DensitySection,
    /// Binning and bit budget.
    pub bins: BinsSection,
    /// Report file prefixes.
    pub plots: PlotsSection,
    /// Codec cascade; `None` selects the default lossy-only cascade.
    #[serde(default)]
    pub compress: Option<CompressSection>,
}

impl RunConfig {
    /// Parse a configuration file.
    ///
    /// # Errors
    ///
    /// [`FloeError::IoFailed`] if the file cannot be read,
    /// [`FloeError::ConfigInvalid`] if it is not the expected JSON shape.
    pub fn from_path(path: &Path) -> Result<Self, FloeError> {
        let text = std::fs::read_to_string(path).map_err(|e| FloeError::io(path, &e))?;
        serde_json::from_str(&text)
            .map_err(|e| FloeError::ConfigInvalid(format!("{}: {e}", path.display())))
    }

    /// Check every cross-field invariant against the communicator size.
    ///
    /// # Errors
    ///
    /// [`FloeError::ConfigInvalid`] naming the offending key.
    pub fn validate(&self, nb_ranks: usize) -> Result<(), FloeError> {
        let nb_inputs = self.density.inputs.len();
        if nb_inputs == 0 {
            return Err(FloeError::ConfigInvalid(
                "density.inputs must not be empty".into(),
            ));
        }
        if let Some(bad) = self.density.inputs.iter().find(|input| input.count == 0) {
            return Err(FloeError::ConfigInvalid(format!(
                "density.inputs entry '{}' has count 0",
                bad.data.display()
            )));
        }
        // Single-rank runs take every file; otherwise files must split evenly.
        if nb_ranks > 1 && (nb_inputs < nb_ranks || nb_inputs % nb_ranks != 0) {
            return Err(FloeError::ConfigInvalid(format!(
                "mismatch on number of ranks and data partition ({nb_inputs} inputs, {nb_ranks} ranks)"
            )));
        }
        if self.density.extents.max <= self.density.extents.min {
            return Err(FloeError::ConfigInvalid(format!(
                "density.extents requires max > min (got [{}, {}])",
                self.density.extents.min, self.density.extents.max
            )));
        }
        if self.bins.count == 0 {
            return Err(FloeError::ConfigInvalid("bins.count must be positive".into()));
        }
        if self.bins.min_bits == 0 {
            return Err(FloeError::ConfigInvalid("bins.min_bits must be positive".into()));
        }
        if self.bins.max_bits <= self.bins.min_bits {
            return Err(FloeError::ConfigInvalid(format!(
                "bins requires max_bits > min_bits (got {} <= {})",
                self.bins.max_bits, self.bins.min_bits
            )));
        }
        if self.bins.max_bits > 32 {
            return Err(FloeError::ConfigInvalid(format!(
                "bins.max_bits exceeds the 32-bit word ({})",
                self.bins.max_bits
            )));
        }
        if let Some(compress) = &self.compress {
            if compress.kernels.is_empty() || compress.kernels.len() > 2 {
                return Err(FloeError::ConfigInvalid(
                    "compress.kernels must list one lossy kernel and at most one lossless kernel"
                        .into(),
                ));
            }
        }
        Ok(())
    }

    /// Side length of this rank's density sub-grid, in cells.
    #[must_use]
    pub fn cells_per_axis(&self) -> usize {
        // Extents are inclusive cell indices, validated max > min.
        usize::try_from(1 + self.density.extents.max - self.density.extents.min).unwrap_or(0)
    }

    /// The density blobs assigned to one rank, in configured file order.
    #[must_use]
    pub fn density_inputs_for_rank(&self, rank: usize, nb_ranks: usize) -> &[DensityInput] {
        if nb_ranks <= 1 {
            return &self.density.inputs;
        }
        let stride = self.density.inputs.len() / nb_ranks;
        &self.density.inputs[rank * stride..(rank + 1) * stride]
    }

    /// The lossy kernel spec (configured, or the `bitround` default).
    #[must_use]
    pub fn lossy_kernel(&self) -> KernelSpec {
        self.compress
            .as_ref()
            .and_then(|c| c.kernels.first())
            .cloned()
            .unwrap_or_else(|| KernelSpec {
                name: "bitround".into(),
                params: BTreeMap::new(),
            })
    }

    /// The optional lossless kernel spec.
    #[must_use]
    pub fn lossless_kernel(&self) -> Option<&KernelSpec> {
        self.compress.as_ref().and_then(|c| c.kernels.get(1))
    }
}
