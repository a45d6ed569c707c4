// SPDX-License-Identifier: AGPL-3.0-only

//! Per-bin precision budgets.
//!
//! Two policies, selected by the binning mode. Uniform bins get a
//! hand-tuned staircase (two variants, variant 2 ships); adaptive bins get
//! an even staircase where the two lowest precision steps share the
//! low-density bins and everything above runs at full precision. Both
//! policies are pure functions of `(nb_bins, min_bits, max_bits)`, so the
//! same configuration always produces the same budget on every rank.

/// Which hand-tuned staircase to use for uniform bins.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LadderVariant {
    /// Original staircase (finer low-precision steps).
    One,
    /// Shipping default.
    Two,
}

/// The staircase variant the pipeline ships with.
pub const DEFAULT_LADDER: LadderVariant = LadderVariant::Two;

fn fill(bits: &mut [u8], from: usize, to: usize, value: u8, min_bits: u8, max_bits: u8) {
    let to = to.min(bits.len());
    for slot in bits.iter_mut().take(to).skip(from.min(to)) {
        *slot = value.clamp(min_bits, max_bits);
    }
}

/// Hand-tuned budget for uniform bins.
///
/// Bin 0 (emptiest density interval) gets `min_bits`; the tail from bin
/// 1200 up gets `max_bits`; the literal steps in between are clamped into
/// `[min_bits, max_bits]` so the budget invariant holds for any valid
/// bit bounds.
#[must_use]
pub fn uniform_ladder(
    nb_bins: usize,
    min_bits: u8,
    max_bits: u8,
    variant: LadderVariant,
) -> Vec<u8> {
    let mut bits = vec![min_bits; nb_bins];
    if nb_bins == 0 {
        return bits;
    }
    let steps: &[(usize, usize, u8)] = match variant {
        LadderVariant::One => &[
            (1, 2, 20),
            (2, 5, 21),
            (5, 25, 22),
            (25, 100, 23),
            (100, 200, 24),
            (200, 500, 25),
            (500, 1200, 26),
        ],
        LadderVariant::Two => &[
            (1, 5, 22),
            (5, 25, 23),
            (25, 100, 24),
            (100, 200, 25),
            (200, 1200, 26),
        ],
    };
    bits[0] = min_bits;
    for &(from, to, value) in steps {
        fill(&mut bits, from, to, value, min_bits, max_bits);
    }
    fill(&mut bits, 1200, nb_bins, max_bits, min_bits, max_bits);
    bits
}

/// Even staircase for adaptive bins.
///
/// With `V = max_bits - min_bits + 1` precision values and `N = nb_bins / V`
/// bins per value, the two lowest steps take their fair share of
/// low-density bins and every step above runs at `max_bits`. Trailing slots
/// left over by the integer division stay at the default `min_bits`.
#[must_use]
pub fn adaptive_staircase(nb_bins: usize, min_bits: u8, max_bits: u8) -> Vec<u8> {
    let mut bits = vec![min_bits; nb_bins];
    let values_width = usize::from(max_bits - min_bits) + 1;
    let per_value = nb_bins / values_width;
    for i in 0..values_width {
        for j in 0..per_value {
            bits[i * per_value + j] = if i < 2 {
                min_bits + u8::try_from(i).unwrap_or(0)
            } else {
                max_bits
            };
        }
    }
    bits
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ladder_variant_two_matches_literal_budget() {
        // nb_bins = 2000, bits 18..28: spot values from the staircase.
        let bits = uniform_ladder(2000, 18, 28, LadderVariant::Two);
        assert_eq!(bits[0], 18);
        assert_eq!(bits[1], 22);
        assert_eq!(bits[50], 24);
        assert_eq!(bits[150], 25);
        assert_eq!(bits[1500], 28);
        assert_eq!(bits[600], 26);
        assert_eq!(bits[1199], 26);
    }

    #[test]
    fn ladder_variant_one_uses_finer_low_steps() {
        let bits = uniform_ladder(2000, 18, 28, LadderVariant::One);
        assert_eq!(bits[1], 20);
        assert_eq!(bits[3], 21);
        assert_eq!(bits[300], 25);
        assert_eq!(bits[700], 26);
        assert_eq!(bits[1500], 28);
    }

    #[test]
    fn ladder_respects_budget_bounds_for_narrow_windows() {
        let (min_bits, max_bits) = (24, 25);
        for variant in [LadderVariant::One, LadderVariant::Two] {
            let bits = uniform_ladder(2000, min_bits, max_bits, variant);
            assert!(bits.iter().all(|&b| (min_bits..=max_bits).contains(&b)));
        }
    }

    #[test]
    fn ladder_shorter_than_staircase_is_truncated() {
        let bits = uniform_ladder(10, 18, 28, LadderVariant::Two);
        assert_eq!(bits.len(), 10);
        assert_eq!(bits[0], 18);
        assert_eq!(bits[9], 23);
    }

    #[test]
    fn adaptive_staircase_shares_low_steps() {
        // 13 bins, bits 20..24: V = 5, N = 2.
        let bits = adaptive_staircase(13, 20, 24);
        assert_eq!(&bits[0..2], &[20, 20]);
        assert_eq!(&bits[2..4], &[21, 21]);
        assert_eq!(&bits[4..10], &[24; 6]);
        // 13 mod 5 = 3 trailing slots stay at the default.
        assert_eq!(&bits[10..13], &[20, 20, 20]);
    }

    #[test]
    fn adaptive_staircase_with_more_values_than_bins() {
        // V = 11 > nb_bins = 4: N = 0, everything stays at min_bits.
        let bits = adaptive_staircase(4, 18, 28);
        assert_eq!(bits, vec![18; 4]);
    }

    #[test]
    fn budget_invariant_holds_for_both_policies() {
        let (min_bits, max_bits) = (18, 28);
        for bits in [
            uniform_ladder(2000, min_bits, max_bits, DEFAULT_LADDER),
            adaptive_staircase(77, min_bits, max_bits),
        ] {
            assert!(bits.iter().all(|&b| b >= min_bits && b <= max_bits));
        }
    }

    #[test]
    fn policies_are_deterministic() {
        assert_eq!(
            uniform_ladder(321, 19, 27, DEFAULT_LADDER),
            uniform_ladder(321, 19, 27, DEFAULT_LADDER)
        );
        assert_eq!(adaptive_staircase(55, 19, 27), adaptive_staircase(55, 19, 27));
    }
}
