// SPDX-License-Identifier: AGPL-3.0-only

// Clippy pedantic/nursery and the numeric-cast allows live in
// [workspace.lints.clippy] in Cargo.toml. Library code must propagate
// errors, not panic:
#![deny(clippy::expect_used, clippy::unwrap_used)]
#![warn(missing_docs)]

//! packIce floe — density-adaptive lossy compression for N-body snapshots
//!
//! Compresses multi-field particle partitions of cosmological N-body
//! simulations, using the local spatial density as a side channel: particles
//! in dense cells (where the structure of interest lives) keep more
//! precision bits than particles in sparse cells.
//!
//! # Pipeline
//!
//! ```text
//! load particles + density → bin density → assign bit budgets
//!     → bucket particles by cell density → lossy(+lossless) codec per
//!       bucket and component → rewrite the partition in bucket order
//! ```
//!
//! # Architecture
//!
//! - **`comm`** — collectives seam: rsmpi wrappers and a single-rank stand-in
//! - **`config`** — JSON run configuration and cross-field validation
//! - **`snapshot`** — block-structured columnar particle format (read/write)
//! - **`codec`** — kernel registry: `bitround` (lossy), `zstd` (lossless)
//! - **`density`** — the pipeline itself: binning, budgets, buckets, codecs
//! - **`error`** — typed, fatal error kinds
//! - **`validation`** — pass/fail harness for validation binaries
//!
//! Parallelism is bulk-synchronous SPMD over MPI ranks: each rank is
//! single-threaded, ranks exchange only scalar reductions, and every
//! collective appears at the same call site on every rank.

/// Codec kernels and the name-keyed registry.
pub mod codec;
/// Thin wrappers over the message-passing layer, plus Cartesian layout.
pub mod comm;
/// JSON run configuration and validation.
pub mod config;
/// The density-driven compression pipeline and its stages.
pub mod density;
/// Typed errors for every pipeline failure mode.
pub mod error;
/// Block-structured columnar particle snapshots.
pub mod snapshot;
/// Pass/fail check harness for validation binaries (exit 0/1).
pub mod validation;

pub use comm::{Collective, MpiComm, SoloComm};
pub use config::RunConfig;
pub use density::{DensityPipeline, RunSummary};
pub use error::FloeError;
