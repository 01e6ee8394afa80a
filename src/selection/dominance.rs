//! Pareto dominance over weighted score vectors.
//!
//! All selection code works in "maximize everything" space: raw scores are
//! multiplied by their (possibly negative) objective weights up front, so the
//! dominance relation below never needs a per-objective direction flag.

use crate::objective::ObjectiveValue;

/// One row of the weighted score matrix. `None` marks a row whose evaluation
/// failed (timeout or invalid); such a row is dominated by everything and
/// dominates nothing.
pub type WeightedRow = Option<Vec<f64>>;

/// Builds the weighted score matrix for a set of score rows.
///
/// A row containing any failure cell becomes `None`; otherwise each score is
/// multiplied by the matching weight.
pub fn weighted_rows(scores: &[&[ObjectiveValue]], weights: &[f64]) -> Vec<WeightedRow> {
    scores
        .iter()
        .map(|row| {
            row.iter()
                .zip(weights)
                .map(|(value, weight)| value.score().map(|s| s * weight))
                .collect::<Option<Vec<f64>>>()
        })
        .collect()
}

/// Returns `true` if `a` pareto-dominates `b`: at least as good on every
/// objective and strictly better on at least one.
///
/// The relation is a strict partial order: irreflexive, asymmetric, and
/// transitive.
pub fn dominates(a: &[f64], b: &[f64]) -> bool {
    debug_assert_eq!(a.len(), b.len());
    let mut strictly_better = false;
    for (x, y) in a.iter().zip(b) {
        if x < y {
            return false;
        }
        if x > y {
            strictly_better = true;
        }
    }
    strictly_better
}

/// Dominance lifted to matrix rows: a failed row is dominated by every valid
/// row and dominates nothing.
pub fn row_dominates(a: &WeightedRow, b: &WeightedRow) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => dominates(a, b),
        (Some(_), None) => true,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dominates_requires_strict_improvement() {
        assert!(dominates(&[2.0, 2.0], &[1.0, 2.0]));
        assert!(!dominates(&[2.0, 2.0], &[2.0, 2.0]));
        assert!(!dominates(&[2.0, 1.0], &[1.0, 2.0]));
    }

    #[test]
    fn test_dominance_is_irreflexive_and_asymmetric() {
        let a = vec![3.0, 1.0];
        let b = vec![1.0, 0.5];
        assert!(!dominates(&a, &a));
        assert!(dominates(&a, &b));
        assert!(!dominates(&b, &a));
    }

    #[test]
    fn test_dominance_is_transitive() {
        let a = vec![3.0, 3.0, 3.0];
        let b = vec![2.0, 2.0, 3.0];
        let c = vec![1.0, 2.0, 2.0];
        assert!(dominates(&a, &b));
        assert!(dominates(&b, &c));
        assert!(dominates(&a, &c));
    }

    #[test]
    fn test_failed_rows_are_dominated_by_everything() {
        let valid: WeightedRow = Some(vec![0.0]);
        let failed: WeightedRow = None;
        assert!(row_dominates(&valid, &failed));
        assert!(!row_dominates(&failed, &valid));
        assert!(!row_dominates(&failed, &failed));
    }

    #[test]
    fn test_weighted_rows_applies_weights_and_flags_failures() {
        let row_a = vec![ObjectiveValue::Score(2.0), ObjectiveValue::Score(4.0)];
        let row_b = vec![ObjectiveValue::Score(1.0), ObjectiveValue::Timeout];
        let rows = weighted_rows(&[&row_a, &row_b], &[1.0, -0.5]);

        assert_eq!(rows[0], Some(vec![2.0, -2.0]));
        assert_eq!(rows[1], None);
    }
}
