// SPDX-License-Identifier: AGPL-3.0-only

//! Rank-0 report tables for external plotting.
//!
//! Plain two-column text files with a small comment header, written only
//! after the reduction that produced the data. Paths come from the
//! `plots` config section; the bit-budget table lands next to the density
//! histogram.

use std::io::Write;
use std::path::{Path, PathBuf};

use crate::density::binning::BinLayout;
use crate::error::FloeError;

fn dat_path(prefix: &Path) -> PathBuf {
    let mut name = prefix.as_os_str().to_os_string();
    name.push(".dat");
    PathBuf::from(name)
}

fn write_table(
    path: &Path,
    nb_bins: usize,
    col1: &str,
    col2: &str,
    rows: impl Iterator<Item = (String, String)>,
) -> Result<(), FloeError> {
    let file = std::fs::File::create(path).map_err(|e| FloeError::io(path, &e))?;
    let mut out = std::io::BufWriter::new(file);
    let io_err = |e: &std::io::Error| FloeError::io(path, e);

    writeln!(out, "# bins: {nb_bins}").map_err(|e| io_err(&e))?;
    writeln!(out, "# col 1: {col1}").map_err(|e| io_err(&e))?;
    writeln!(out, "# col 2: {col2}").map_err(|e| io_err(&e))?;
    for (a, b) in rows {
        writeln!(out, "{a}\t{b}").map_err(|e| io_err(&e))?;
    }
    out.flush().map_err(|e| io_err(&e))
}

/// `<prefix>.dat`: bin lower bound vs. global particle count.
///
/// # Errors
///
/// [`FloeError::IoFailed`] on any filesystem error.
pub fn write_density_histogram(
    prefix: &Path,
    layout: &BinLayout,
    histogram: &[u64],
) -> Result<PathBuf, FloeError> {
    let path = dat_path(prefix);
    write_table(
        &path,
        layout.nb_bins(),
        "density range",
        "particle count",
        histogram
            .iter()
            .enumerate()
            .map(|(b, &count)| (layout.lower_bound(b).to_string(), count.to_string())),
    )?;
    Ok(path)
}

/// `<prefix>.dat`: bin index vs. global bucket population.
///
/// # Errors
///
/// [`FloeError::IoFailed`] on any filesystem error.
pub fn write_bucket_distrib(prefix: &Path, counts: &[u64]) -> Result<PathBuf, FloeError> {
    let path = dat_path(prefix);
    write_table(
        &path,
        counts.len(),
        "bin",
        "particle count",
        counts
            .iter()
            .enumerate()
            .map(|(b, &count)| (b.to_string(), count.to_string())),
    )?;
    Ok(path)
}

/// `bits_distrib.dat` (next to the density histogram): bin lower bound vs.
/// assigned precision.
///
/// # Errors
///
/// [`FloeError::IoFailed`] on any filesystem error.
pub fn write_bits_distrib(
    density_prefix: &Path,
    layout: &BinLayout,
    bits: &[u8],
) -> Result<PathBuf, FloeError> {
    let path = density_prefix
        .parent()
        .map_or_else(|| PathBuf::from("bits_distrib.dat"), |dir| dir.join("bits_distrib.dat"));
    write_table(
        &path,
        layout.nb_bins(),
        "density",
        "bits",
        bits.iter()
            .enumerate()
            .map(|(b, &value)| (layout.lower_bound(b).to_string(), value.to_string())),
    )?;
    Ok(path)
}
