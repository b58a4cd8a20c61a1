//! Per-element branching-ratio scale factors.
//!
//! Entries read `name: f1, f2, ...` or `name, f1, f2, ...`. K entries carry 4
//! factors, L entries 12, and L family entries 3 that fan out to the L slots of
//! each subshell.

use crate::common::{K_LINE_COUNT, L_LINE_COUNT};
use std::collections::BTreeMap;

const FAMILY_FACTOR_COUNT: usize = 3;
/// Slots scaled by the L1, L2 and L3 family factors.
const L_FAMILY_SLOTS: [&[usize]; FAMILY_FACTOR_COUNT] =
    [&[4, 5, 7, 8, 9], &[2, 6, 11], &[0, 1, 3, 10]];

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum BranchingParseError {
    #[error("branching entry '{line}' has no element name")]
    MissingElement { line: String },
    #[error("branching entry for '{element}' has invalid factor '{value}'")]
    InvalidFactor { element: String, value: String },
    #[error("branching entry for '{element}' needs {expected} factors, found {actual}")]
    TooFewFactors {
        element: String,
        expected: usize,
        actual: usize,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BranchingKind {
    FamilyL,
    RatioL,
    RatioK,
}

impl BranchingKind {
    const fn factor_count(self) -> usize {
        match self {
            Self::FamilyL => FAMILY_FACTOR_COUNT,
            Self::RatioL => L_LINE_COUNT,
            Self::RatioK => K_LINE_COUNT,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct BranchingRatioTable {
    factors: BTreeMap<String, [f64; L_LINE_COUNT]>,
}

impl BranchingRatioTable {
    /// Builds a table from raw entries, applying families first, then L ratios,
    /// then K ratios. Malformed entries are reported and skipped.
    pub fn from_entries<S: AsRef<str>>(family_l: &[S], ratio_l: &[S], ratio_k: &[S]) -> Self {
        let mut table = Self::default();
        let batches = [
            (BranchingKind::FamilyL, family_l),
            (BranchingKind::RatioL, ratio_l),
            (BranchingKind::RatioK, ratio_k),
        ];
        for (kind, entries) in batches {
            for entry in entries {
                if let Err(error) = table.apply(kind, entry.as_ref()) {
                    tracing::warn!(kind = ?kind, %error, "skipping branching entry");
                }
            }
        }
        table
    }

    pub fn apply(&mut self, kind: BranchingKind, line: &str) -> Result<(), BranchingParseError> {
        let (element, values) = parse_entry(line, kind.factor_count())?;
        let slots = self
            .factors
            .entry(element)
            .or_insert([1.0; L_LINE_COUNT]);
        match kind {
            BranchingKind::FamilyL => {
                for (factor, family) in values.iter().zip(L_FAMILY_SLOTS) {
                    for &slot in family {
                        slots[slot] = *factor;
                    }
                }
            }
            BranchingKind::RatioL | BranchingKind::RatioK => {
                slots[..values.len()].copy_from_slice(&values);
            }
        }
        Ok(())
    }

    pub fn apply_family_l(&mut self, line: &str) -> Result<(), BranchingParseError> {
        self.apply(BranchingKind::FamilyL, line)
    }

    pub fn apply_ratio_l(&mut self, line: &str) -> Result<(), BranchingParseError> {
        self.apply(BranchingKind::RatioL, line)
    }

    pub fn apply_ratio_k(&mut self, line: &str) -> Result<(), BranchingParseError> {
        self.apply(BranchingKind::RatioK, line)
    }

    pub fn factors(&self, element: &str) -> Option<&[f64; L_LINE_COUNT]> {
        self.factors.get(element)
    }

    /// Scale for `slot` of `element`; 1.0 when no override exists.
    pub fn factor(&self, element: &str, slot: usize) -> f64 {
        self.factors
            .get(element)
            .and_then(|slots| slots.get(slot))
            .copied()
            .unwrap_or(1.0)
    }

    pub fn len(&self) -> usize {
        self.factors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factors.is_empty()
    }
}

fn parse_entry(line: &str, expected: usize) -> Result<(String, Vec<f64>), BranchingParseError> {
    let (name, rest) = match line.split_once(':') {
        Some(split) => split,
        None => line.split_once(',').unwrap_or((line, "")),
    };
    let element: String = name.chars().filter(|ch| !ch.is_whitespace()).collect();
    if element.is_empty() {
        return Err(BranchingParseError::MissingElement {
            line: line.to_string(),
        });
    }

    let tokens: Vec<&str> = rest
        .split(',')
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .collect();
    if tokens.len() < expected {
        return Err(BranchingParseError::TooFewFactors {
            element,
            expected,
            actual: tokens.len(),
        });
    }

    let mut values = Vec::with_capacity(expected);
    for token in &tokens[..expected] {
        let value = token
            .parse::<f64>()
            .ok()
            .filter(|value| value.is_finite())
            .ok_or_else(|| BranchingParseError::InvalidFactor {
                element: element.clone(),
                value: (*token).to_string(),
            })?;
        values.push(value);
    }
    Ok((element, values))
}

#[cfg(test)]
mod tests {
    use super::{BranchingParseError, BranchingRatioTable};

    #[test]
    fn full_l_ratio_line_populates_every_slot() {
        let mut table = BranchingRatioTable::default();
        table
            .apply_ratio_l("Fe: 1.0,0.5,0.5,1.0,1.0,1.0,1.0,1.0,1.0,1.0,1.0,1.0")
            .expect("valid entry");

        let slots = table.factors("Fe").expect("Fe entry");
        assert_eq!(
            slots,
            &[1.0, 0.5, 0.5, 1.0, 1.0, 1.0, 1.0, 1.0, 1.0, 1.0, 1.0, 1.0]
        );
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn element_names_are_stripped_of_whitespace() {
        let mut table = BranchingRatioTable::default();
        table
            .apply_ratio_k("  P b_L , 0.9, 0.8, 0.7, 0.6")
            .expect("comma separated entry");
        assert_eq!(table.factor("Pb_L", 0), 0.9);
        assert_eq!(table.factor("Pb_L", 3), 0.6);
        assert_eq!(table.factor("Pb_L", 4), 1.0);
        assert_eq!(table.factor("Zn", 0), 1.0);
    }

    #[test]
    fn family_factors_fan_out_to_subshell_slots() {
        let mut table = BranchingRatioTable::default();
        table.apply_family_l("Pb_L: 2.0, 3.0, 4.0").expect("family");

        let slots = table.factors("Pb_L").expect("Pb_L entry");
        for slot in [4, 5, 7, 8, 9] {
            assert_eq!(slots[slot], 2.0, "slot {slot}");
        }
        for slot in [2, 6, 11] {
            assert_eq!(slots[slot], 3.0, "slot {slot}");
        }
        for slot in [0, 1, 3, 10] {
            assert_eq!(slots[slot], 4.0, "slot {slot}");
        }
    }

    #[test]
    fn later_kinds_override_families() {
        let table = BranchingRatioTable::from_entries(
            &["Pb_L: 2.0, 2.0, 2.0"],
            &["Pb_L: 0.1, 0.2, 0.3, 0.4, 0.5, 0.6, 0.7, 0.8, 0.9, 1.0, 1.1, 1.2"],
            &[] as &[&str],
        );
        assert_eq!(table.factor("Pb_L", 4), 0.5);
        assert_eq!(table.factor("Pb_L", 11), 1.2);
    }

    #[test]
    fn malformed_entries_are_rejected_and_skipped_in_batches() {
        let mut table = BranchingRatioTable::default();
        assert!(matches!(
            table.apply_ratio_k(": 1, 1, 1, 1"),
            Err(BranchingParseError::MissingElement { .. })
        ));
        assert_eq!(
            table.apply_ratio_k("Fe: 1, 1"),
            Err(BranchingParseError::TooFewFactors {
                element: "Fe".to_string(),
                expected: 4,
                actual: 2
            })
        );
        assert!(matches!(
            table.apply_ratio_k("Fe: 1, x, 1, 1"),
            Err(BranchingParseError::InvalidFactor { .. })
        ));
        assert!(table.is_empty());

        let batch = BranchingRatioTable::from_entries(
            &[] as &[&str],
            &[] as &[&str],
            &["Ca: 1, 1", "Fe: 0.5, 1, 1, 1"],
        );
        assert_eq!(batch.len(), 1);
        assert_eq!(batch.factor("Fe", 0), 0.5);
    }
}
