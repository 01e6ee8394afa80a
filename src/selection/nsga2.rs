use crate::error::{EvolveError, Result};
use crate::rng::RandomNumberGenerator;
use crate::selection::dominance::{dominates, WeightedRow};
use crate::selection::strategy::SurvivalSelector;

/// Partitions `indices` (which must reference valid rows) into non-dominated
/// fronts. Front 0 is the non-dominated set; each later front is
/// non-dominated once the earlier fronts are removed.
pub fn fast_non_dominated_sort(rows: &[WeightedRow], indices: &[usize]) -> Vec<Vec<usize>> {
    let n = indices.len();
    let mut domination_count = vec![0usize; n];
    let mut dominated_by: Vec<Vec<usize>> = vec![Vec::new(); n];
    let mut fronts: Vec<Vec<usize>> = Vec::new();
    let mut current_front: Vec<usize> = Vec::new();

    let row = |slot: usize| -> &[f64] {
        rows[indices[slot]]
            .as_deref()
            .expect("non-dominated sort requires valid rows")
    };

    for i in 0..n {
        for j in 0..n {
            if i == j {
                continue;
            }
            if dominates(row(i), row(j)) {
                dominated_by[i].push(j);
            } else if dominates(row(j), row(i)) {
                domination_count[i] += 1;
            }
        }
        if domination_count[i] == 0 {
            current_front.push(i);
        }
    }

    while !current_front.is_empty() {
        let mut next_front = Vec::new();
        for &i in &current_front {
            for &j in &dominated_by[i] {
                domination_count[j] -= 1;
                if domination_count[j] == 0 {
                    next_front.push(j);
                }
            }
        }
        fronts.push(current_front.iter().map(|&slot| indices[slot]).collect());
        current_front = next_front;
    }

    fronts
}

/// Computes the crowding distance of every member of one front: the sum of
/// normalized per-objective gaps to the nearest neighbors on that front.
/// Boundary points get infinite distance so they always survive a split.
pub fn crowding_distances(rows: &[WeightedRow], front: &[usize]) -> Vec<f64> {
    let size = front.len();
    if size <= 2 {
        return vec![f64::INFINITY; size];
    }

    let n_objectives = rows[front[0]]
        .as_ref()
        .map(|r| r.len())
        .unwrap_or_default();
    let mut distances = vec![0.0; size];

    let value = |slot: usize, obj: usize| -> f64 {
        rows[front[slot]]
            .as_ref()
            .expect("crowding distance requires valid rows")[obj]
    };

    for obj in 0..n_objectives {
        let mut order: Vec<usize> = (0..size).collect();
        order.sort_by(|&a, &b| {
            value(a, obj)
                .partial_cmp(&value(b, obj))
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        distances[order[0]] = f64::INFINITY;
        distances[order[size - 1]] = f64::INFINITY;

        let range = value(order[size - 1], obj) - value(order[0], obj);
        if range > 0.0 {
            for slot in 1..size - 1 {
                let gap = value(order[slot + 1], obj) - value(order[slot - 1], obj);
                distances[order[slot]] += gap / range;
            }
        }
    }

    distances
}

/// NSGA-II style survival selection: fill the surviving set front by front,
/// splitting the boundary front by descending crowding distance to preserve
/// diversity along it.
///
/// Failed rows (timeouts, invalid evaluations) are only admitted after every
/// valid row, so they never displace a scored individual.
#[derive(Debug, Clone, Default)]
pub struct NsgaIISurvival;

impl NsgaIISurvival {
    pub fn new() -> Self {
        Self
    }
}

impl SurvivalSelector for NsgaIISurvival {
    fn select(
        &self,
        rows: &[WeightedRow],
        num_to_select: usize,
        _rng: &mut RandomNumberGenerator,
    ) -> Result<Vec<usize>> {
        if rows.is_empty() {
            return Err(EvolveError::EmptyPopulation);
        }

        let valid: Vec<usize> = (0..rows.len()).filter(|&i| rows[i].is_some()).collect();
        let mut selected = Vec::with_capacity(num_to_select.min(rows.len()));

        for front in fast_non_dominated_sort(rows, &valid) {
            let remaining = num_to_select.saturating_sub(selected.len());
            if remaining == 0 {
                break;
            }
            if front.len() <= remaining {
                selected.extend(front);
            } else {
                // Split the boundary front: keep the most isolated members.
                let distances = crowding_distances(rows, &front);
                let mut order: Vec<usize> = (0..front.len()).collect();
                order.sort_by(|&a, &b| {
                    distances[b]
                        .partial_cmp(&distances[a])
                        .unwrap_or(std::cmp::Ordering::Equal)
                });
                selected.extend(order.into_iter().take(remaining).map(|slot| front[slot]));
            }
        }

        // Failed rows fill out the population only when nothing valid is
        // left to take.
        if selected.len() < num_to_select {
            selected.extend(
                (0..rows.len())
                    .filter(|&i| rows[i].is_none())
                    .take(num_to_select - selected.len()),
            );
        }

        Ok(selected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rows_from(scores: &[&[f64]]) -> Vec<WeightedRow> {
        scores.iter().map(|s| Some(s.to_vec())).collect()
    }

    #[test]
    fn test_mutually_nondominated_vectors_share_front_zero() {
        // No vector is strictly better on both axes, so all four are front 0.
        let rows = rows_from(&[&[1.0, 5.0], &[2.0, 4.0], &[3.0, 3.0], &[4.0, 2.0]]);
        let valid: Vec<usize> = (0..rows.len()).collect();

        let fronts = fast_non_dominated_sort(&rows, &valid);
        assert_eq!(fronts.len(), 1);
        assert_eq!(fronts[0].len(), 4);
    }

    #[test]
    fn test_dominated_vectors_land_in_later_fronts() {
        let rows = rows_from(&[
            &[3.0, 3.0], // front 0
            &[2.0, 2.0], // front 1
            &[1.0, 1.0], // front 2
            &[3.0, 1.0], // front 1, dominated only by [3, 3]
        ]);
        let valid: Vec<usize> = (0..rows.len()).collect();

        let fronts = fast_non_dominated_sort(&rows, &valid);
        assert_eq!(fronts[0], vec![0]);
        assert_eq!(fronts[1], vec![1, 3]);
        assert_eq!(fronts[2], vec![2]);
    }

    #[test]
    fn test_survival_never_exceeds_requested_count() {
        let rows = rows_from(&[&[1.0, 5.0], &[2.0, 4.0], &[3.0, 3.0], &[4.0, 2.0]]);
        let mut rng = RandomNumberGenerator::from_seed(1);

        let survival = NsgaIISurvival::new();
        for k in 0..=6 {
            let selected = survival.select(&rows, k, &mut rng).unwrap();
            assert!(selected.len() <= k);
        }
    }

    #[test]
    fn test_survivors_come_from_earlier_fronts() {
        let rows = rows_from(&[
            &[1.0, 1.0], // dominated by everything else
            &[3.0, 3.0],
            &[2.0, 4.0],
            &[4.0, 2.0],
        ]);
        let mut rng = RandomNumberGenerator::from_seed(1);

        let survival = NsgaIISurvival::new();
        let selected = survival.select(&rows, 3, &mut rng).unwrap();

        assert_eq!(selected.len(), 3);
        assert!(!selected.contains(&0));
    }

    #[test]
    fn test_crowding_split_keeps_boundary_points() {
        // A single front of four points; selecting three must keep both
        // extremes (infinite crowding distance).
        let rows = rows_from(&[&[1.0, 5.0], &[2.0, 4.0], &[3.0, 3.0], &[4.0, 2.0]]);
        let mut rng = RandomNumberGenerator::from_seed(1);

        let survival = NsgaIISurvival::new();
        let selected = survival.select(&rows, 3, &mut rng).unwrap();

        assert!(selected.contains(&0));
        assert!(selected.contains(&3));
    }

    #[test]
    fn test_failed_rows_survive_only_after_valid_rows() {
        let rows: Vec<WeightedRow> = vec![None, Some(vec![1.0]), Some(vec![2.0]), None];
        let mut rng = RandomNumberGenerator::from_seed(1);

        let survival = NsgaIISurvival::new();
        let selected = survival.select(&rows, 2, &mut rng).unwrap();
        assert_eq!(selected.len(), 2);
        assert!(selected.contains(&1));
        assert!(selected.contains(&2));

        let selected = survival.select(&rows, 3, &mut rng).unwrap();
        assert_eq!(selected.len(), 3);
        assert!(selected.contains(&0) || selected.contains(&3));
    }

    #[test]
    fn test_empty_population_is_rejected() {
        let rows: Vec<WeightedRow> = Vec::new();
        let mut rng = RandomNumberGenerator::from_seed(1);
        assert!(NsgaIISurvival::new().select(&rows, 1, &mut rng).is_err());
    }
}
