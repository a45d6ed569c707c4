// SPDX-License-Identifier: AGPL-3.0-only

//! Validation harness for floe binaries.
//!
//! Every validation binary follows the same pattern: hardcoded expected
//! values from the written-down scenarios, explicit pass/fail checks, exit
//! code 0 (all pass) or 1 (any fail), machine-readable summary on stdout.
//! This module is the shared infrastructure.

/// A single validation check with its observed outcome.
#[derive(Debug, Clone)]
pub struct Check {
    /// Human-readable label.
    pub label: String,
    /// Whether the check passed.
    pub passed: bool,
    /// What was observed, rendered for the summary line.
    pub observed: String,
    /// What was expected, rendered for the summary line.
    pub expected: String,
}

/// Accumulates checks and produces a summary with an exit code.
#[derive(Debug, Default)]
#[must_use]
pub struct Harness {
    /// Name of the validation binary.
    pub name: String,
    /// All checks performed, in order.
    pub checks: Vec<Check>,
}

impl Harness {
    /// Create a harness for a named validation binary.
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            checks: Vec::new(),
        }
    }

    /// Check that two integers are equal.
    pub fn check_eq_usize(&mut self, label: &str, observed: usize, expected: usize) {
        self.checks.push(Check {
            label: label.to_string(),
            passed: observed == expected,
            observed: observed.to_string(),
            expected: expected.to_string(),
        });
    }

    /// Check that two floats agree within an absolute tolerance.
    pub fn check_abs(&mut self, label: &str, observed: f64, expected: f64, tolerance: f64) {
        self.checks.push(Check {
            label: label.to_string(),
            passed: (observed - expected).abs() < tolerance,
            observed: observed.to_string(),
            expected: format!("{expected} ± {tolerance}"),
        });
    }

    /// Check a boolean condition.
    pub fn check_true(&mut self, label: &str, condition: bool) {
        self.checks.push(Check {
            label: label.to_string(),
            passed: condition,
            observed: condition.to_string(),
            expected: "true".to_string(),
        });
    }

    /// Whether every check passed so far.
    #[must_use]
    pub fn all_passed(&self) -> bool {
        self.checks.iter().all(|c| c.passed)
    }

    /// Print the per-check lines and the final verdict; return the exit code.
    #[must_use]
    pub fn summarize(&self) -> i32 {
        println!("═══════════════════════════════════════════════════════");
        println!("  {}", self.name);
        println!("═══════════════════════════════════════════════════════");
        for check in &self.checks {
            let mark = if check.passed { "PASS" } else { "FAIL" };
            println!(
                "  [{mark}] {}: observed {}, expected {}",
                check.label, check.observed, check.expected
            );
        }
        let passed = self.checks.iter().filter(|c| c.passed).count();
        println!("  {} / {} checks passed", passed, self.checks.len());
        i32::from(!self.all_passed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn passing_harness_exits_zero() {
        let mut harness = Harness::new("unit");
        harness.check_eq_usize("count", 4, 4);
        harness.check_abs("width", 1.75, 1.75, 1e-12);
        harness.check_true("flag", true);
        assert!(harness.all_passed());
        assert_eq!(harness.summarize(), 0);
    }

    #[test]
    fn failing_check_flips_exit_code() {
        let mut harness = Harness::new("unit");
        harness.check_eq_usize("count", 3, 4);
        assert!(!harness.all_passed());
        assert_eq!(harness.summarize(), 1);
    }

    #[test]
    fn tolerance_is_strict() {
        let mut harness = Harness::new("unit");
        harness.check_abs("exact", 2.0, 2.5, 0.25);
        assert!(!harness.all_passed());
    }
}
