// SPDX-License-Identifier: AGPL-3.0-only

//! Integration tests: snapshot block format across writer, reader, and the
//! per-rank path convention.

use packice_floe::snapshot::{flags, rank_path, SnapshotReader, SnapshotWriter};

#[test]
fn two_rank_partition_uses_disjoint_blocks() {
    let dir = tempfile::tempdir().expect("tempdir");
    let base = dir.path().join("part.floe");

    for rank in 0..2usize {
        let path = rank_path(&base, rank, 2);
        let mut writer = SnapshotWriter::new(&path, 2);
        writer.set_rank_grid([2, 1, 1]);
        for axis in 0..3 {
            writer.set_phys_origin(axis, 0.0);
            writer.set_phys_scale(axis, 16.0);
        }
        let offset = rank as f32 * 8.0;
        writer
            .add_f32("x", flags::EXTRA_SPACE | flags::PHYS_X, vec![offset, offset + 1.0])
            .expect("stage x");
        writer
            .add_i64("id", flags::EXTRA_SPACE, vec![rank as i64 * 2, rank as i64 * 2 + 1])
            .expect("stage id");
        writer.commit().expect("commit block");
    }

    assert!(!base.exists(), "multi-rank runs never write the bare path");
    for rank in 0..2usize {
        let reader = SnapshotReader::open(&rank_path(&base, rank, 2)).expect("reopen block");
        assert_eq!(reader.num_rows(), 2);
        assert_eq!(reader.rank_grid(), [2, 1, 1]);
        let x = reader.load_f32("x").expect("x column");
        assert!((x[0] - rank as f32 * 8.0).abs() < f32::EPSILON);
        let ids = reader.load_i64("id").expect("id column");
        assert_eq!(ids, vec![rank as i64 * 2, rank as i64 * 2 + 1]);
    }
}

#[test]
fn column_order_and_flags_survive_a_round_trip() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("cols.floe");

    let mut writer = SnapshotWriter::new(&path, 1);
    for (axis, name) in ["x", "y", "z"].iter().enumerate() {
        writer
            .add_f32(name, flags::EXTRA_SPACE | flags::phys_coord(axis), vec![0.5])
            .expect("stage coordinate");
    }
    writer.add_i64("id", flags::EXTRA_SPACE, vec![9]).expect("stage id");
    writer.commit().expect("commit block");

    let reader = SnapshotReader::open(&path).expect("reopen block");
    let names: Vec<&str> = reader.column_names().collect();
    assert_eq!(names, vec!["x", "y", "z", "id"]);
    assert_eq!(reader.column_flags("y"), Some(flags::EXTRA_SPACE | flags::PHYS_Y));
    assert_eq!(reader.column_flags("id"), Some(flags::EXTRA_SPACE));
    assert_eq!(reader.column_flags("vx"), None);
}
