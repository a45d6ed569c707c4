// SPDX-License-Identifier: AGPL-3.0-only

//! Validation suite for the compression pipeline's written-down scenarios.
//!
//! Every expected value below is hardcoded from the engine's contract:
//! uniform bucket arithmetic, the equiprobable bin override, empty-bucket
//! skipping, bucket-order permutation, the rank/partition dispatch rule,
//! and the uniform bit ladder. Exit code 0 if every check passes, 1
//! otherwise. No MPI launcher required; everything here is rank-local math.

use std::collections::BTreeMap;
use std::process;

use packice_floe::config::{KernelSpec, RunConfig};
use packice_floe::density::binning::{equiprobable_bin_count, BinLayout};
use packice_floe::density::bits::{uniform_ladder, LadderVariant};
use packice_floe::density::deflate::deflate_component;
use packice_floe::density::field::DensityField;
use packice_floe::density::grid::cell_index;
use packice_floe::validation::Harness;

fn bitround_spec() -> KernelSpec {
    KernelSpec {
        name: "bitround".into(),
        params: BTreeMap::new(),
    }
}

fn config_with_inputs(nb_inputs: usize) -> RunConfig {
    let inputs: Vec<String> = (0..nb_inputs)
        .map(|i| format!(r#"{{ "data": "rho_{i}.bin", "count": 8 }}"#))
        .collect();
    let json = format!(
        r#"{{
            "hacc": {{ "input": "in.floe", "output": "out.floe" }},
            "density": {{
                "inputs": [{}],
                "extents": {{ "min": 0, "max": 1 }}
            }},
            "bins": {{ "count": 4, "adaptive": false, "min_bits": 18, "max_bits": 28 }},
            "plots": {{ "density": "density", "buckets": "buckets" }}
        }}"#,
        inputs.join(",")
    );
    match serde_json::from_str(&json) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("validation config failed to parse: {err}");
            process::exit(1);
        }
    }
}

/// Single rank, uniform bins over the ramp field.
fn check_uniform_binning(harness: &mut Harness) {
    let field = match DensityField::from_values(
        vec![0.0, 1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0],
        2,
    ) {
        Ok(field) => field,
        Err(err) => {
            eprintln!("ramp field construction failed: {err}");
            process::exit(1);
        }
    };
    let (min, max) = field.local_extents();
    harness.check_abs("uniform: local density minimum", min, 0.0, 1e-12);
    harness.check_abs("uniform: local density maximum", max, 7.0, 1e-12);

    let layout = BinLayout::uniform(0.0, 7.0, 4);
    harness.check_abs("uniform: bin width", layout.lower_bound(1), 1.75, 1e-12);

    // The particle whose cell has flat index 3 sees rho = 3.0.
    let flat = cell_index([7.9, 7.9, 0.1], [0.0; 3], [8.0; 3], 2, 0).unwrap_or(usize::MAX);
    harness.check_eq_usize("uniform: flat cell index", flat, 3);
    harness.check_eq_usize("uniform: bucket of rho = 3.0", layout.bucket_index(3.0), 1);
}

/// The adaptive override of the configured bin count.
fn check_adaptive_override(harness: &mut Harness) {
    harness.check_eq_usize("adaptive: equiprobable bins for n=100", equiprobable_bin_count(100), 13);
    harness.check_eq_usize("adaptive: bin capacity", 100 / equiprobable_bin_count(100), 7);
}

/// An empty bucket produces no codec call and no output values.
fn check_empty_bucket_skip(harness: &mut Harness) {
    let values = vec![1.0f32, 2.0, 3.0];
    let buckets = vec![vec![0, 2], Vec::new(), vec![1]];
    let bits = vec![32u8; 3];
    match deflate_component("x", &values, &buckets, &bits, &bitround_spec(), None) {
        Ok((restored, _)) => {
            harness.check_eq_usize("empty bucket: reconstructed length", restored.len(), 3);
        }
        Err(err) => {
            eprintln!("empty-bucket deflate failed: {err}");
            harness.check_true("empty bucket: deflate succeeded", false);
        }
    }
}

/// Bucket order permutes every column the same way.
fn check_bucket_permutation(harness: &mut Harness) {
    let x = vec![10.0f32, 11.0, 12.0, 13.0];
    let ids = vec![100i64, 101, 102, 103];
    let buckets = vec![vec![3, 1], vec![0], vec![2]];
    let bits = vec![32u8; 3];

    let Ok((restored, _)) = deflate_component("x", &x, &buckets, &bits, &bitround_spec(), None)
    else {
        harness.check_true("permutation: deflate succeeded", false);
        return;
    };
    harness.check_true("permutation: x in bucket order", restored == [13.0, 11.0, 10.0, 12.0]);

    let permuted_ids: Vec<i64> = buckets.iter().flatten().map(|&p| ids[p]).collect();
    harness.check_true("permutation: id follows x", permuted_ids == [103, 101, 100, 102]);
}

/// The rank/partition dispatch rule.
fn check_rank_partition_rule(harness: &mut Harness) {
    let seven = config_with_inputs(7);
    harness.check_true("dispatch: 7 inputs on 2 ranks rejected", seven.validate(2).is_err());

    let eight = config_with_inputs(8);
    harness.check_true("dispatch: 8 inputs on 4 ranks accepted", eight.validate(4).is_ok());
    harness.check_eq_usize(
        "dispatch: files per rank",
        eight.density_inputs_for_rank(2, 4).len(),
        2,
    );
}

/// Spot values of the shipping bit ladder.
fn check_bit_ladder(harness: &mut Harness) {
    let bits = uniform_ladder(2000, 18, 28, LadderVariant::Two);
    harness.check_eq_usize("ladder: bits[0]", usize::from(bits[0]), 18);
    harness.check_eq_usize("ladder: bits[1]", usize::from(bits[1]), 22);
    harness.check_eq_usize("ladder: bits[50]", usize::from(bits[50]), 24);
    harness.check_eq_usize("ladder: bits[150]", usize::from(bits[150]), 25);
    harness.check_eq_usize("ladder: bits[1500]", usize::from(bits[1500]), 28);
}

/// Round-trip sanity at full precision.
fn check_lossless_round_trip(harness: &mut Harness) {
    let values: Vec<f32> = (0..64).map(|i| (i as f32 - 32.0) * 0.37).collect();
    let buckets = vec![(0..64).collect::<Vec<_>>()];
    match deflate_component("x", &values, &buckets, &[32], &bitround_spec(), None) {
        Ok((restored, _)) => {
            let exact = values
                .iter()
                .zip(&restored)
                .all(|(a, b)| a.to_bits() == b.to_bits());
            harness.check_true("round trip exact at 32 bits", exact);
        }
        Err(err) => {
            eprintln!("round-trip deflate failed: {err}");
            harness.check_true("round trip exact at 32 bits", false);
        }
    }
}

fn main() {
    let mut harness = Harness::new("floe Density Pipeline Validation");

    check_uniform_binning(&mut harness);
    check_adaptive_override(&mut harness);
    check_empty_bucket_skip(&mut harness);
    check_bucket_permutation(&mut harness);
    check_rank_partition_rule(&mut harness);
    check_bit_ladder(&mut harness);
    check_lossless_round_trip(&mut harness);

    process::exit(harness.summarize());
}
