// SPDX-License-Identifier: AGPL-3.0-only

//! The density-driven adaptive-precision compression pipeline.
//!
//! A straight-line sequence with no back-edges:
//!
//! ```text
//! load particles → load density → bin → assign bits
//!     → index + bucket → compress each component → rewrite partition
//! ```
//!
//! Every collective appears at the same call site on every rank, and report
//! files are written by rank 0 only after the reduction that produced their
//! data. Any error terminates the run; there is no retry or partial
//! recovery.

pub mod binning;
pub mod bits;
pub mod buckets;
pub mod deflate;
pub mod field;
pub mod grid;
pub mod report;

use std::path::PathBuf;

use crate::codec::{is_lossless_kernel, is_lossy_kernel};
use crate::comm::{CartTopology, Collective};
use crate::config::RunConfig;
use crate::density::binning::BinLayout;
use crate::density::field::DensityField;
use crate::error::FloeError;
use crate::snapshot::{flags, rank_path, SnapshotReader, SnapshotWriter};

/// Physical field components, in processing and storage order.
const COMPONENTS: [&str; 6] = ["x", "y", "z", "vx", "vy", "vz"];

/// Bytes per stored component value.
const FLOAT_BYTES: u64 = 4;

/// What one run produced. Compressed totals are reduced to rank 0 and are
/// zero (or `None`) on other ranks.
#[derive(Debug, Clone)]
pub struct RunSummary {
    /// Particles held by this rank.
    pub local_particles: usize,
    /// Particles across all ranks.
    pub total_particles: u64,
    /// Bins actually used (after any adaptive override).
    pub nb_bins: usize,
    /// Uncompressed reference bytes over all six components.
    pub raw_bytes: u64,
    /// Global lossy output bytes over all six components.
    pub lossy_bytes: u64,
    /// Global lossless output bytes, when a lossless kernel is configured.
    pub lossless_bytes: Option<u64>,
    /// This rank's rewritten partition block.
    pub output: PathBuf,
}

fn column_extents(values: &[f32]) -> (f32, f32) {
    let mut min = f32::INFINITY;
    let mut max = f32::NEG_INFINITY;
    for &v in values {
        min = min.min(v);
        max = max.max(v);
    }
    if min > max {
        (0.0, 0.0)
    } else {
        (min, max)
    }
}

/// One run of the compression pipeline over one configuration.
pub struct DensityPipeline<C: Collective> {
    comm: C,
    config: RunConfig,

    coords: [Vec<f32>; 3],
    velocs: [Vec<f32>; 3],
    ids: Vec<i64>,
    coords_min: [f32; 3],
    coords_max: [f32; 3],
    phys_origin: [f64; 3],
    phys_scale: [f64; 3],
    rank_grid: [usize; 3],
    local_particles: usize,
    total_particles: u64,

    density: Option<DensityField>,
    layout: Option<BinLayout>,
    histogram: Vec<u64>,
    bits: Vec<u8>,
    buckets: Vec<Vec<usize>>,
    reconstructed: Vec<Vec<f32>>,

    lossy_total: u64,
    lossless_total: Option<u64>,
}

impl<C: Collective> DensityPipeline<C> {
    /// Validate the configuration against the communicator and set up a run.
    ///
    /// # Errors
    ///
    /// [`FloeError::ConfigInvalid`] on any cross-field or kernel-name
    /// violation.
    pub fn new(config: RunConfig, comm: C) -> Result<Self, FloeError> {
        config.validate(comm.size())?;
        let lossy = config.lossy_kernel();
        if !is_lossy_kernel(&lossy.name) {
            return Err(FloeError::ConfigInvalid(format!(
                "compress.kernels[0] names unknown lossy kernel '{}'",
                lossy.name
            )));
        }
        if let Some(spec) = config.lossless_kernel() {
            if !is_lossless_kernel(&spec.name) {
                return Err(FloeError::ConfigInvalid(format!(
                    "compress.kernels[1] names unknown lossless kernel '{}'",
                    spec.name
                )));
            }
        }
        let lossless_total = config.lossless_kernel().map(|_| 0);
        Ok(Self {
            comm,
            config,
            coords: Default::default(),
            velocs: Default::default(),
            ids: Vec::new(),
            coords_min: [0.0; 3],
            coords_max: [0.0; 3],
            phys_origin: [0.0; 3],
            phys_scale: [0.0; 3],
            rank_grid: [1, 1, 1],
            local_particles: 0,
            total_particles: 0,
            density: None,
            layout: None,
            histogram: Vec::new(),
            bits: Vec::new(),
            buckets: Vec::new(),
            reconstructed: Vec::new(),
            lossy_total: 0,
            lossless_total,
        })
    }

    fn master(&self) -> bool {
        self.comm.is_root()
    }

    /// Run the whole pipeline to completion.
    ///
    /// # Errors
    ///
    /// The first error of any stage; acquired resources are dropped before
    /// returning.
    pub fn run(mut self) -> Result<RunSummary, FloeError> {
        self.cache_data()?;
        self.compute_bins()?;
        self.assign_bits()?;
        self.bucket_particles()?;
        self.deflate_components()?;
        let output = self.write_partition()?;

        Ok(RunSummary {
            local_particles: self.local_particles,
            total_particles: self.total_particles,
            nb_bins: self.bits.len(),
            raw_bytes: self.total_particles * FLOAT_BYTES * COMPONENTS.len() as u64,
            lossy_bytes: self.lossy_total,
            lossless_bytes: self.lossless_total,
            output,
        })
    }

    /// Load the particle partition and the density field into memory.
    fn cache_data(&mut self) -> Result<(), FloeError> {
        let rank = self.comm.rank();
        let nb_ranks = self.comm.size();

        if self.master() {
            println!("  ── Caching particle data ──");
        }
        let input = rank_path(&self.config.hacc.input, rank, nb_ranks);
        let reader = SnapshotReader::open(&input)?;
        self.local_particles = reader.num_rows();
        self.phys_origin = reader.phys_origin();
        self.phys_scale = reader.phys_scale();
        self.rank_grid = reader.rank_grid();

        for (axis, name) in COMPONENTS.iter().take(3).enumerate() {
            let column = reader.load_f32(name)?;
            (self.coords_min[axis], self.coords_max[axis]) = column_extents(&column);
            self.coords[axis] = column;
        }
        self.total_particles = self.comm.all_reduce_sum(self.local_particles as u64);

        for (axis, name) in COMPONENTS.iter().skip(3).enumerate() {
            self.velocs[axis] = reader.load_f32(name)?;
        }
        self.ids = reader.load_i64("id")?;
        if self.ids.len() != self.local_particles {
            return Err(FloeError::Internal(format!(
                "id column holds {} rows, partition holds {}",
                self.ids.len(),
                self.local_particles
            )));
        }

        if self.master() {
            println!("    {} local particles, {} total", self.local_particles, self.total_particles);
            println!("  ── Caching density data ──");
        }
        let field = DensityField::load(
            self.config.density_inputs_for_rank(rank, nb_ranks),
            self.config.cells_per_axis(),
        )?;
        let total_cells = self.comm.all_reduce_sum(field.len() as u64);
        if self.master() {
            println!("    {} local cells, {} total", field.len(), total_cells);
        }
        self.density = Some(field);
        self.comm.barrier();
        Ok(())
    }

    /// Compute the bin layout and the global histogram.
    fn compute_bins(&mut self) -> Result<(), FloeError> {
        let field = self
            .density
            .as_ref()
            .ok_or_else(|| FloeError::Internal("binning before density load".into()))?;

        let (rho_min, rho_max) = binning::global_extents(&self.comm, field)?;

        let layout = if self.config.bins.adaptive {
            let layout = BinLayout::adaptive(field);
            // The override depends on the local sample count; equal density
            // partitions are required for the histogram reduction to line up.
            let nb = layout.nb_bins();
            let nb_max = self.comm.all_reduce_max(nb as f64);
            let nb_min = self.comm.all_reduce_min(nb as f64);
            if (nb_max - nb_min).abs() > 0.0 {
                return Err(FloeError::ConfigInvalid(
                    "adaptive bin count differs across ranks; density partitions must be equal"
                        .into(),
                ));
            }
            layout
        } else {
            BinLayout::uniform(rho_min, rho_max, self.config.bins.count)
        };

        let local = layout.local_histogram(field);
        self.histogram = self.comm.all_reduce_sum_table(&local);

        if self.master() {
            let path = report::write_density_histogram(
                &self.config.plots.density,
                &layout,
                &self.histogram,
            )?;
            println!("  ── Density binning ──");
            println!("    {} bins over [{rho_min}, {rho_max}]", layout.nb_bins());
            println!("    histogram: '{}'", path.display());
        }
        self.layout = Some(layout);
        self.comm.barrier();
        Ok(())
    }

    /// Assign per-bin precision budgets.
    fn assign_bits(&mut self) -> Result<(), FloeError> {
        let layout = self
            .layout
            .as_ref()
            .ok_or_else(|| FloeError::Internal("bit budget before binning".into()))?;
        let nb_bins = layout.nb_bins();
        let policy = &self.config.bins;

        self.bits = if policy.adaptive {
            bits::adaptive_staircase(nb_bins, policy.min_bits, policy.max_bits)
        } else {
            bits::uniform_ladder(nb_bins, policy.min_bits, policy.max_bits, bits::DEFAULT_LADDER)
        };

        if self.master() {
            let path = report::write_bits_distrib(&self.config.plots.density, layout, &self.bits)?;
            println!("  ── Bit budget ──");
            println!("    {} bins, bits in [{}, {}]", nb_bins, policy.min_bits, policy.max_bits);
            println!("    budget table: '{}'", path.display());
        }
        self.comm.barrier();
        Ok(())
    }

    /// Scatter particles into buckets and report the global populations.
    fn bucket_particles(&mut self) -> Result<(), FloeError> {
        let field = self
            .density
            .as_ref()
            .ok_or_else(|| FloeError::Internal("bucketing before density load".into()))?;
        let layout = self
            .layout
            .as_ref()
            .ok_or_else(|| FloeError::Internal("bucketing before binning".into()))?;

        if self.master() {
            println!("  ── Bucketing particles ──");
        }
        self.buckets = buckets::bucket_particles(
            &self.coords,
            self.coords_min,
            self.coords_max,
            field,
            layout,
        )?;

        let local = buckets::bucket_counts(&self.buckets);
        let global = self.comm.reduce_sum_table_to_root(&local);
        if let Some(global) = global {
            let path = report::write_bucket_distrib(&self.config.plots.buckets, &global)?;
            println!("    population table: '{}'", path.display());
        }

        // The density field is only needed for bucketing; release it now.
        self.density = None;
        self.comm.barrier();
        Ok(())
    }

    /// Run the codec cascade over all six components.
    fn deflate_components(&mut self) -> Result<(), FloeError> {
        let lossy_spec = self.config.lossy_kernel();
        let lossless_spec = self.config.lossless_kernel().cloned();

        if self.master() {
            println!("  ── Inflate and deflate components ──");
        }

        for (index, component) in COMPONENTS.iter().enumerate() {
            let values = if index < 3 {
                std::mem::take(&mut self.coords[index])
            } else {
                std::mem::take(&mut self.velocs[index - 3])
            };

            let (restored, bytes) = deflate::deflate_component(
                component,
                &values,
                &self.buckets,
                &self.bits,
                &lossy_spec,
                lossless_spec.as_ref(),
            )?;
            drop(values);
            self.reconstructed.push(restored);

            let mut local = vec![bytes.lossy];
            if let Some(lossless) = bytes.lossless {
                local.push(lossless);
            }
            let reduced = self.comm.reduce_sum_table_to_root(&local);
            if let Some(reduced) = reduced {
                let raw = self.total_particles * FLOAT_BYTES;
                let lossy = reduced[0];
                self.lossy_total += lossy;
                print!("    {component}: raw {raw} B, lossy {lossy} B (x{:.3})", ratio(raw, lossy));
                if let Some(&packed) = reduced.get(1) {
                    if let Some(total) = self.lossless_total.as_mut() {
                        *total += packed;
                    }
                    print!(", lossless {packed} B (x{:.3})", ratio(raw, packed));
                }
                println!();
            }
        }

        // Bucket lists outlive the orchestrator only for the id permutation.
        self.comm.barrier();
        Ok(())
    }

    /// Rewrite the reconstructed partition in bucket order.
    fn write_partition(&mut self) -> Result<PathBuf, FloeError> {
        let rank = self.comm.rank();
        let nb_ranks = self.comm.size();

        // The reconstructed components are already in bucket order; the id
        // column is rearranged once, by the same permutation.
        let mut uid = Vec::with_capacity(self.local_particles);
        for bucket in &self.buckets {
            for &p in bucket {
                uid.push(self.ids[p]);
            }
        }
        if uid.len() != self.local_particles {
            return Err(FloeError::Internal(format!(
                "bucket permutation covers {} of {} particles",
                uid.len(),
                self.local_particles
            )));
        }
        self.ids = Vec::new();
        self.buckets = Vec::new();

        let topology = CartTopology::layout(rank, nb_ranks, self.rank_grid)?;
        if self.master() {
            println!("  ── Writing partition ──");
            println!(
                "    Cartesian grid {}x{}x{}",
                topology.dims[0], topology.dims[1], topology.dims[2]
            );
        }

        let path = rank_path(&self.config.hacc.output, rank, nb_ranks);
        let mut writer = SnapshotWriter::new(&path, self.local_particles);
        for axis in 0..3 {
            writer.set_phys_origin(axis, self.phys_origin[axis]);
            writer.set_phys_scale(axis, self.phys_scale[axis]);
        }
        writer.set_rank_grid(self.rank_grid);

        for (index, component) in COMPONENTS.iter().enumerate() {
            let column = std::mem::take(&mut self.reconstructed[index]);
            let column_flags = if index < 3 {
                flags::EXTRA_SPACE | flags::phys_coord(index)
            } else {
                flags::EXTRA_SPACE
            };
            writer.add_f32(component, column_flags, column)?;
        }
        writer.add_i64("id", flags::EXTRA_SPACE, uid)?;
        writer.commit()?;

        if self.master() {
            println!("    partition: '{}'", path.display());
        }
        self.comm.barrier();
        Ok(path)
    }
}

fn ratio(raw: u64, compressed: u64) -> f64 {
    if compressed == 0 {
        0.0
    } else {
        raw as f64 / compressed as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn column_extents_cover_data() {
        let (min, max) = column_extents(&[1.0, -2.0, 5.5, 0.0]);
        assert!((min + 2.0).abs() < f32::EPSILON);
        assert!((max - 5.5).abs() < f32::EPSILON);
    }

    #[test]
    fn column_extents_of_empty_partition_are_zero() {
        assert_eq!(column_extents(&[]), (0.0, 0.0));
    }

    #[test]
    fn ratio_guards_division_by_zero() {
        assert!((ratio(100, 0) - 0.0).abs() < f64::EPSILON);
        assert!((ratio(100, 25) - 4.0).abs() < f64::EPSILON);
    }
}
