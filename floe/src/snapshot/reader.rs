// SPDX-License-Identifier: AGPL-3.0-only

//! Snapshot block reader.
//!
//! The whole rank block is pulled into memory once (the partition must fit
//! in memory anyway) and columns are decoded on demand, one typed load per
//! call. The caller owns each returned buffer.

use std::path::{Path, PathBuf};

use crate::error::FloeError;
use crate::snapshot::{ColumnKind, MAGIC, VERSION};

struct ColumnMeta {
    name: String,
    kind: ColumnKind,
    flags: u8,
    /// Byte offset of the payload within the file image.
    offset: usize,
}

/// Reader over one rank's block of a particle partition.
pub struct SnapshotReader {
    path: PathBuf,
    data: Vec<u8>,
    n_rows: usize,
    phys_origin: [f64; 3],
    phys_scale: [f64; 3],
    rank_grid: [usize; 3],
    columns: Vec<ColumnMeta>,
}

/// Cursor over the in-memory file image with short-read detection.
struct Cursor<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn take(&mut self, len: usize) -> Option<&'a [u8]> {
        let end = self.pos.checked_add(len)?;
        let slice = self.data.get(self.pos..end)?;
        self.pos = end;
        Some(slice)
    }

    fn u16(&mut self) -> Option<u16> {
        self.take(2).map(|b| u16::from_le_bytes([b[0], b[1]]))
    }

    fn u32(&mut self) -> Option<u32> {
        self.take(4).map(|b| u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn u64(&mut self) -> Option<u64> {
        self.take(8)
            .map(|b| u64::from_le_bytes([b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]]))
    }

    fn f64(&mut self) -> Option<f64> {
        self.u64().map(f64::from_bits)
    }

    fn u8(&mut self) -> Option<u8> {
        self.take(1).map(|b| b[0])
    }
}

impl SnapshotReader {
    /// Open and index one rank block.
    ///
    /// # Errors
    ///
    /// [`FloeError::IoFailed`] if the file cannot be read or its header is
    /// malformed (bad magic, unsupported version, short read).
    pub fn open(path: &Path) -> Result<Self, FloeError> {
        let data = std::fs::read(path).map_err(|e| FloeError::io(path, &e))?;
        Self::parse(path, data)
    }

    fn bad(path: &Path, reason: &str) -> FloeError {
        FloeError::IoFailed {
            path: path.to_path_buf(),
            reason: reason.to_string(),
        }
    }

    #[allow(clippy::cast_possible_truncation)] // row counts fit usize on 64-bit targets
    fn parse(path: &Path, data: Vec<u8>) -> Result<Self, FloeError> {
        let mut cur = Cursor { data: &data, pos: 0 };

        let magic = cur.take(8).ok_or_else(|| Self::bad(path, "short header"))?;
        if magic != MAGIC {
            return Err(Self::bad(path, "not a floe snapshot block (bad magic)"));
        }
        let version = cur.u32().ok_or_else(|| Self::bad(path, "short header"))?;
        if version != VERSION {
            return Err(Self::bad(path, &format!("unsupported block version {version}")));
        }
        let n_rows = cur.u64().ok_or_else(|| Self::bad(path, "short header"))? as usize;
        let n_cols = cur.u32().ok_or_else(|| Self::bad(path, "short header"))?;

        let mut phys_origin = [0.0f64; 3];
        let mut phys_scale = [0.0f64; 3];
        for v in &mut phys_origin {
            *v = cur.f64().ok_or_else(|| Self::bad(path, "short header"))?;
        }
        for v in &mut phys_scale {
            *v = cur.f64().ok_or_else(|| Self::bad(path, "short header"))?;
        }
        let mut rank_grid = [0usize; 3];
        for v in &mut rank_grid {
            *v = cur.u32().ok_or_else(|| Self::bad(path, "short header"))? as usize;
        }

        let mut columns = Vec::with_capacity(n_cols as usize);
        for _ in 0..n_cols {
            let name_len = cur.u16().ok_or_else(|| Self::bad(path, "short column record"))?;
            let name_bytes = cur
                .take(name_len as usize)
                .ok_or_else(|| Self::bad(path, "short column record"))?;
            let name = String::from_utf8(name_bytes.to_vec())
                .map_err(|_| Self::bad(path, "column name is not UTF-8"))?;
            let kind_tag = cur.u8().ok_or_else(|| Self::bad(path, "short column record"))?;
            let kind = ColumnKind::from_tag(kind_tag)
                .ok_or_else(|| Self::bad(path, &format!("unknown column kind {kind_tag}")))?;
            let col_flags = cur.u8().ok_or_else(|| Self::bad(path, "short column record"))?;
            let offset = cur.pos;
            cur.take(n_rows * kind.elem_size())
                .ok_or_else(|| Self::bad(path, &format!("short payload for column '{name}'")))?;
            columns.push(ColumnMeta {
                name,
                kind,
                flags: col_flags,
                offset,
            });
        }

        Ok(Self {
            path: path.to_path_buf(),
            data,
            n_rows,
            phys_origin,
            phys_scale,
            rank_grid,
            columns,
        })
    }

    /// Number of particles in this block.
    #[must_use]
    pub const fn num_rows(&self) -> usize {
        self.n_rows
    }

    /// Physical origin of the simulation domain, per dimension.
    #[must_use]
    pub const fn phys_origin(&self) -> [f64; 3] {
        self.phys_origin
    }

    /// Physical scale of the simulation domain, per dimension.
    #[must_use]
    pub const fn phys_scale(&self) -> [f64; 3] {
        self.phys_scale
    }

    /// Cartesian decomposition this partition was written with.
    #[must_use]
    pub const fn rank_grid(&self) -> [usize; 3] {
        self.rank_grid
    }

    /// Names of the stored columns, in file order.
    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|c| c.name.as_str())
    }

    /// Flag byte of a column, if present.
    #[must_use]
    pub fn column_flags(&self, name: &str) -> Option<u8> {
        self.columns.iter().find(|c| c.name == name).map(|c| c.flags)
    }

    fn column(&self, name: &str, kind: ColumnKind) -> Result<&ColumnMeta, FloeError> {
        let meta = self
            .columns
            .iter()
            .find(|c| c.name == name)
            .ok_or_else(|| Self::bad(&self.path, &format!("column '{name}' not found")))?;
        if meta.kind != kind {
            return Err(Self::bad(
                &self.path,
                &format!("column '{name}' holds {:?}, not {kind:?}", meta.kind),
            ));
        }
        Ok(meta)
    }

    /// Load a named f32 column into a fresh buffer.
    ///
    /// # Errors
    ///
    /// [`FloeError::IoFailed`] if the column is missing or not f32.
    pub fn load_f32(&self, name: &str) -> Result<Vec<f32>, FloeError> {
        let meta = self.column(name, ColumnKind::F32)?;
        let bytes = &self.data[meta.offset..meta.offset + self.n_rows * 4];
        Ok(bytes
            .chunks_exact(4)
            .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .collect())
    }

    /// Load a named i64 column into a fresh buffer.
    ///
    /// # Errors
    ///
    /// [`FloeError::IoFailed`] if the column is missing or not i64.
    pub fn load_i64(&self, name: &str) -> Result<Vec<i64>, FloeError> {
        let meta = self.column(name, ColumnKind::I64)?;
        let bytes = &self.data[meta.offset..meta.offset + self.n_rows * 8];
        Ok(bytes
            .chunks_exact(8)
            .map(|b| i64::from_le_bytes([b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]]))
            .collect())
    }
}
