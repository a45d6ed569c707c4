// SPDX-License-Identifier: AGPL-3.0-only

//! Block-structured columnar particle snapshots.
//!
//! One file per rank: a little-endian header carrying the physical domain
//! (origin, scale) and the Cartesian rank grid, followed by named typed
//! columns stored back to back. Columns are tagged with coordinate flags so
//! a reader can tell physical coordinates from plain scalars.
//!
//! ```text
//! magic    [u8; 8]   "FLOEBLK\0"
//! version  u32
//! n_rows   u64
//! n_cols   u32
//! phys_origin [f64; 3]
//! phys_scale  [f64; 3]
//! rank_grid   [u32; 3]
//! column * n_cols:
//!   name_len u16, name [u8; name_len], kind u8, flags u8,
//!   payload n_rows * elem_size
//! ```

mod reader;
mod writer;

pub use reader::SnapshotReader;
pub use writer::SnapshotWriter;

use std::path::{Path, PathBuf};

pub(crate) const MAGIC: [u8; 8] = *b"FLOEBLK\0";
pub(crate) const VERSION: u32 = 1;

/// Element type of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    /// 32-bit float.
    F32,
    /// 64-bit signed integer.
    I64,
}

impl ColumnKind {
    pub(crate) const fn tag(self) -> u8 {
        match self {
            Self::F32 => 0,
            Self::I64 => 1,
        }
    }

    pub(crate) const fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(Self::F32),
            1 => Some(Self::I64),
            _ => None,
        }
    }

    pub(crate) const fn elem_size(self) -> usize {
        match self {
            Self::F32 => 4,
            Self::I64 => 8,
        }
    }
}

/// Column flag bits.
pub mod flags {
    /// Column is resized with headroom when the file is laid out.
    pub const EXTRA_SPACE: u8 = 1;
    /// Column is the physical x coordinate.
    pub const PHYS_X: u8 = 1 << 1;
    /// Column is the physical y coordinate.
    pub const PHYS_Y: u8 = 1 << 2;
    /// Column is the physical z coordinate.
    pub const PHYS_Z: u8 = 1 << 3;

    /// The physical-coordinate flag for an axis index.
    #[must_use]
    pub const fn phys_coord(axis: usize) -> u8 {
        match axis {
            0 => PHYS_X,
            1 => PHYS_Y,
            _ => PHYS_Z,
        }
    }
}

/// The on-disk path of one rank's block of a partition.
///
/// Single-rank runs use the configured path verbatim; multi-rank runs
/// append the rank index (`snapshot.floe.3`).
#[must_use]
pub fn rank_path(path: &Path, rank: usize, nb_ranks: usize) -> PathBuf {
    if nb_ranks <= 1 {
        path.to_path_buf()
    } else {
        let mut name = path.as_os_str().to_os_string();
        name.push(format!(".{rank}"));
        PathBuf::from(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rank_path_single_rank_is_verbatim() {
        let p = rank_path(Path::new("out/part.floe"), 0, 1);
        assert_eq!(p, Path::new("out/part.floe"));
    }

    #[test]
    fn rank_path_multi_rank_appends_index() {
        let p = rank_path(Path::new("out/part.floe"), 3, 4);
        assert_eq!(p, Path::new("out/part.floe.3"));
    }

    #[test]
    fn column_kind_tags_round_trip() {
        for kind in [ColumnKind::F32, ColumnKind::I64] {
            assert_eq!(ColumnKind::from_tag(kind.tag()), Some(kind));
        }
        assert_eq!(ColumnKind::from_tag(7), None);
    }

    #[test]
    fn phys_coord_flags_are_distinct() {
        assert_ne!(flags::phys_coord(0), flags::phys_coord(1));
        assert_ne!(flags::phys_coord(1), flags::phys_coord(2));
        assert_eq!(flags::phys_coord(2), flags::PHYS_Z);
    }
}
