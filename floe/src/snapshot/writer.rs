// SPDX-License-Identifier: AGPL-3.0-only

//! Snapshot block writer.
//!
//! Columns are staged in memory and the whole block is committed in one
//! buffered pass, so a failed run never leaves a half-written header with
//! valid magic behind (the file is created only at commit).

use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::FloeError;
use crate::snapshot::{ColumnKind, MAGIC, VERSION};

enum ColumnData {
    F32(Vec<f32>),
    I64(Vec<i64>),
}

impl ColumnData {
    const fn kind(&self) -> ColumnKind {
        match self {
            Self::F32(_) => ColumnKind::F32,
            Self::I64(_) => ColumnKind::I64,
        }
    }

    fn len(&self) -> usize {
        match self {
            Self::F32(v) => v.len(),
            Self::I64(v) => v.len(),
        }
    }
}

struct StagedColumn {
    name: String,
    flags: u8,
    data: ColumnData,
}

/// Writer producing one rank's block of a particle partition.
pub struct SnapshotWriter {
    path: PathBuf,
    n_rows: usize,
    phys_origin: [f64; 3],
    phys_scale: [f64; 3],
    rank_grid: [usize; 3],
    columns: Vec<StagedColumn>,
}

impl SnapshotWriter {
    /// Start a block of `n_rows` particles at `path`.
    #[must_use]
    pub fn new(path: &Path, n_rows: usize) -> Self {
        Self {
            path: path.to_path_buf(),
            n_rows,
            phys_origin: [0.0; 3],
            phys_scale: [0.0; 3],
            rank_grid: [1, 1, 1],
            columns: Vec::new(),
        }
    }

    /// Record the physical origin of one dimension.
    pub fn set_phys_origin(&mut self, axis: usize, value: f64) {
        self.phys_origin[axis] = value;
    }

    /// Record the physical scale of one dimension.
    pub fn set_phys_scale(&mut self, axis: usize, value: f64) {
        self.phys_scale[axis] = value;
    }

    /// Record the Cartesian decomposition the partition belongs to.
    pub fn set_rank_grid(&mut self, grid: [usize; 3]) {
        self.rank_grid = grid;
    }

    fn stage(&mut self, name: &str, flags: u8, data: ColumnData) -> Result<(), FloeError> {
        if data.len() != self.n_rows {
            return Err(FloeError::Internal(format!(
                "column '{name}' holds {} rows, block expects {}",
                data.len(),
                self.n_rows
            )));
        }
        if self.columns.iter().any(|c| c.name == name) {
            return Err(FloeError::Internal(format!("column '{name}' staged twice")));
        }
        self.columns.push(StagedColumn {
            name: name.to_string(),
            flags,
            data,
        });
        Ok(())
    }

    /// Stage an f32 column, taking ownership of the buffer.
    ///
    /// # Errors
    ///
    /// [`FloeError::Internal`] on a row-count mismatch or duplicate name.
    pub fn add_f32(&mut self, name: &str, flags: u8, data: Vec<f32>) -> Result<(), FloeError> {
        self.stage(name, flags, ColumnData::F32(data))
    }

    /// Stage an i64 column, taking ownership of the buffer.
    ///
    /// # Errors
    ///
    /// [`FloeError::Internal`] on a row-count mismatch or duplicate name.
    pub fn add_i64(&mut self, name: &str, flags: u8, data: Vec<i64>) -> Result<(), FloeError> {
        self.stage(name, flags, ColumnData::I64(data))
    }

    /// Write the block to disk and consume the writer.
    ///
    /// # Errors
    ///
    /// [`FloeError::IoFailed`] on any filesystem error.
    #[allow(clippy::cast_possible_truncation)] // column counts and names are small
    pub fn commit(self) -> Result<(), FloeError> {
        let file = std::fs::File::create(&self.path).map_err(|e| FloeError::io(&self.path, &e))?;
        let mut out = std::io::BufWriter::new(file);
        let io_err = |e: &std::io::Error| FloeError::io(&self.path, e);

        out.write_all(&MAGIC).map_err(|e| io_err(&e))?;
        out.write_all(&VERSION.to_le_bytes()).map_err(|e| io_err(&e))?;
        out.write_all(&(self.n_rows as u64).to_le_bytes())
            .map_err(|e| io_err(&e))?;
        out.write_all(&(self.columns.len() as u32).to_le_bytes())
            .map_err(|e| io_err(&e))?;
        for v in self.phys_origin {
            out.write_all(&v.to_le_bytes()).map_err(|e| io_err(&e))?;
        }
        for v in self.phys_scale {
            out.write_all(&v.to_le_bytes()).map_err(|e| io_err(&e))?;
        }
        for v in self.rank_grid {
            out.write_all(&(v as u32).to_le_bytes()).map_err(|e| io_err(&e))?;
        }

        for column in &self.columns {
            out.write_all(&(column.name.len() as u16).to_le_bytes())
                .map_err(|e| io_err(&e))?;
            out.write_all(column.name.as_bytes()).map_err(|e| io_err(&e))?;
            out.write_all(&[column.data.kind().tag(), column.flags])
                .map_err(|e| io_err(&e))?;
            match &column.data {
                ColumnData::F32(values) => {
                    // Native layout is little-endian on every supported target.
                    out.write_all(bytemuck::cast_slice(values)).map_err(|e| io_err(&e))?;
                }
                ColumnData::I64(values) => {
                    out.write_all(bytemuck::cast_slice(values)).map_err(|e| io_err(&e))?;
                }
            }
        }
        out.flush().map_err(|e| io_err(&e))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;
    use crate::snapshot::{flags, SnapshotReader};

    #[test]
    fn block_round_trips_through_reader() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("part.floe");

        let mut writer = SnapshotWriter::new(&path, 3);
        for axis in 0..3 {
            writer.set_phys_origin(axis, 0.5 * axis as f64);
            writer.set_phys_scale(axis, 64.0);
        }
        writer.set_rank_grid([2, 1, 1]);
        writer
            .add_f32("x", flags::EXTRA_SPACE | flags::PHYS_X, vec![0.25, 1.5, -3.0])
            .unwrap();
        writer
            .add_i64("id", flags::EXTRA_SPACE, vec![11, 7, 42])
            .unwrap();
        writer.commit().unwrap();

        let reader = SnapshotReader::open(&path).expect("reopen committed block");
        assert_eq!(reader.num_rows(), 3);
        assert_eq!(reader.rank_grid(), [2, 1, 1]);
        assert!((reader.phys_origin()[1] - 0.5).abs() < f64::EPSILON);
        assert!((reader.phys_scale()[2] - 64.0).abs() < f64::EPSILON);
        assert_eq!(reader.load_f32("x").unwrap(), vec![0.25, 1.5, -3.0]);
        assert_eq!(reader.load_i64("id").unwrap(), vec![11, 7, 42]);
        assert_eq!(
            reader.column_flags("x"),
            Some(flags::EXTRA_SPACE | flags::PHYS_X)
        );
    }

    #[test]
    fn row_count_mismatch_is_internal_error() {
        let mut writer = SnapshotWriter::new(Path::new("unused.floe"), 4);
        let err = writer.add_f32("x", 0, vec![1.0, 2.0]).unwrap_err();
        assert_eq!(err.kind(), "Internal");
    }

    #[test]
    fn duplicate_column_is_rejected() {
        let mut writer = SnapshotWriter::new(Path::new("unused.floe"), 1);
        writer.add_f32("x", 0, vec![1.0]).unwrap();
        assert!(writer.add_f32("x", 0, vec![2.0]).is_err());
    }

    #[test]
    fn typed_load_rejects_kind_mismatch() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("part.floe");
        let mut writer = SnapshotWriter::new(&path, 2);
        writer.add_i64("id", 0, vec![1, 2]).unwrap();
        writer.commit().unwrap();

        let reader = SnapshotReader::open(&path).unwrap();
        assert!(reader.load_f32("id").is_err());
        assert!(reader.load_i64("missing").is_err());
    }
}
