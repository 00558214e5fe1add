//! Maximum (or minimum) weight bipartite assignment via Kuhn-Munkres.
//!
//! Drivers are rows and orders columns of a sparse weight matrix. Missing
//! entries are filled one unit worse than any observed weight and pairs that
//! land on a filler are dropped from the result.

use std::collections::HashMap;

use pathfinding::kuhn_munkres::{kuhn_munkres, Weights};

use crate::ids::{DriverId, OrderId};

use super::types::DispatchAssignment;

/// Scale factor to convert f64 weights to i64 for the solver.
const SCALE: f64 = 1_000_000.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Objective {
    #[default]
    Maximize,
    Minimize,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AssignmentEdge {
    pub driver: DriverId,
    pub order: OrderId,
    pub weight: f64,
}

/// Dense i64 matrix implementing the solver's weight interface.
struct I64Weights(Vec<Vec<i64>>);

impl Weights<i64> for I64Weights {
    fn rows(&self) -> usize {
        self.0.len()
    }

    fn columns(&self) -> usize {
        self.0.first().map_or(0, |r| r.len())
    }

    fn at(&self, row: usize, col: usize) -> i64 {
        self.0[row][col]
    }

    fn neg(&self) -> Self {
        I64Weights(
            self.0
                .iter()
                .map(|r| r.iter().map(|&x| x.saturating_neg()).collect())
                .collect(),
        )
    }
}

fn to_weight(value: f64) -> i64 {
    let scaled = value * SCALE;
    if scaled >= i64::MAX as f64 {
        i64::MAX
    } else if scaled <= i64::MIN as f64 {
        i64::MIN
    } else {
        scaled as i64
    }
}

fn better(objective: Objective, candidate: f64, current: f64) -> bool {
    match objective {
        Objective::Maximize => candidate > current,
        Objective::Minimize => candidate < current,
    }
}

/// Optimal one-to-one assignment over `edges`. Duplicate (driver, order)
/// edges keep the better weight. An empty or all-zero matrix is not solved.
pub fn solve_assignment(edges: &[AssignmentEdge], objective: Objective) -> Vec<DispatchAssignment> {
    let mut drivers: Vec<DriverId> = Vec::new();
    let mut orders: Vec<OrderId> = Vec::new();
    let mut driver_index: HashMap<DriverId, usize> = HashMap::new();
    let mut order_index: HashMap<OrderId, usize> = HashMap::new();
    let mut weights: HashMap<(usize, usize), f64> = HashMap::new();

    for edge in edges.iter().filter(|edge| edge.weight.is_finite()) {
        let row = *driver_index.entry(edge.driver).or_insert_with(|| {
            drivers.push(edge.driver);
            drivers.len() - 1
        });
        let col = *order_index.entry(edge.order).or_insert_with(|| {
            orders.push(edge.order);
            orders.len() - 1
        });
        weights
            .entry((row, col))
            .and_modify(|current| {
                if better(objective, edge.weight, *current) {
                    *current = edge.weight;
                }
            })
            .or_insert(edge.weight);
    }

    if weights.values().all(|weight| *weight == 0.0) {
        return Vec::new();
    }

    let (min, max) = weights
        .values()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), w| {
            (lo.min(*w), hi.max(*w))
        });
    let (filler, sign) = match objective {
        Objective::Maximize => (min - 1.0, 1.0),
        Objective::Minimize => (max + 1.0, -1.0),
    };

    let transposed = drivers.len() > orders.len();
    let (rows, cols) = if transposed {
        (orders.len(), drivers.len())
    } else {
        (drivers.len(), orders.len())
    };
    let matrix: Vec<Vec<i64>> = (0..rows)
        .map(|r| {
            (0..cols)
                .map(|c| {
                    let key = if transposed { (c, r) } else { (r, c) };
                    to_weight(sign * weights.get(&key).copied().unwrap_or(filler))
                })
                .collect()
        })
        .collect();

    let (_, assignment) = kuhn_munkres(&I64Weights(matrix));

    let mut result: Vec<DispatchAssignment> = assignment
        .into_iter()
        .enumerate()
        .filter_map(|(r, c)| {
            let (driver_row, order_col) = if transposed { (c, r) } else { (r, c) };
            weights
                .contains_key(&(driver_row, order_col))
                .then(|| DispatchAssignment {
                    order_id: orders[order_col],
                    driver_id: drivers[driver_row],
                })
        })
        .collect();
    result.sort_by_key(|pair| (pair.order_id, pair.driver_id));
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    fn edge(driver: u64, order: u64, weight: f64) -> AssignmentEdge {
        AssignmentEdge {
            driver: DriverId(driver),
            order: OrderId(order),
            weight,
        }
    }

    fn pair(driver: u64, order: u64) -> DispatchAssignment {
        DispatchAssignment {
            order_id: OrderId(order),
            driver_id: DriverId(driver),
        }
    }

    fn total(edges: &[AssignmentEdge], chosen: &[DispatchAssignment]) -> f64 {
        chosen
            .iter()
            .map(|p| {
                edges
                    .iter()
                    .find(|e| e.driver == p.driver_id && e.order == p.order_id)
                    .map(|e| e.weight)
                    .unwrap_or(0.0)
            })
            .sum()
    }

    #[test]
    fn two_by_two_beats_both_permutations() {
        let edges = [edge(1, 1, 5.0), edge(1, 2, 4.0), edge(2, 1, 4.0), edge(2, 2, 1.0)];
        let chosen = solve_assignment(&edges, Objective::Maximize);
        let identity = 5.0 + 1.0;
        let swapped = 4.0 + 4.0;
        assert_eq!(total(&edges, &chosen), f64::max(identity, swapped));
        assert_eq!(chosen, vec![pair(2, 1), pair(1, 2)]);
    }

    #[test]
    fn minimize_prefers_the_cheaper_permutation() {
        let edges = [edge(1, 1, 5.0), edge(1, 2, 4.0), edge(2, 1, 4.0), edge(2, 2, 1.0)];
        let chosen = solve_assignment(&edges, Objective::Minimize);
        assert_eq!(total(&edges, &chosen), 6.0);
    }

    #[test]
    fn missing_entries_are_never_selected() {
        let edges = [edge(1, 1, 3.0), edge(2, 1, 2.0), edge(2, 2, 1.0)];
        let chosen = solve_assignment(&edges, Objective::Maximize);
        assert_eq!(chosen, vec![pair(1, 1), pair(2, 2)]);

        let lonely = [edge(1, 1, 3.0), edge(2, 1, 2.0)];
        let chosen = solve_assignment(&lonely, Objective::Maximize);
        assert_eq!(chosen, vec![pair(1, 1)]);
    }

    #[test]
    fn more_drivers_than_orders_is_transposed() {
        let edges = [edge(1, 1, 1.0), edge(2, 1, 7.0), edge(3, 1, 3.0)];
        assert_eq!(solve_assignment(&edges, Objective::Maximize), vec![pair(2, 1)]);
    }

    #[test]
    fn negative_weights_still_match() {
        let edges = [edge(1, 1, -5.0)];
        assert_eq!(solve_assignment(&edges, Objective::Maximize), vec![pair(1, 1)]);
    }

    #[test]
    fn empty_and_all_zero_inputs_are_not_solved() {
        assert!(solve_assignment(&[], Objective::Maximize).is_empty());
        let zeros = [edge(1, 1, 0.0), edge(2, 2, 0.0)];
        assert!(solve_assignment(&zeros, Objective::Maximize).is_empty());
    }

    #[test]
    fn each_driver_and_order_used_once() {
        let edges: Vec<_> = (0..6)
            .flat_map(|d| (0..4).map(move |o| edge(d, o, ((d * 7 + o * 3) % 11) as f64 + 1.0)))
            .collect();
        let chosen = solve_assignment(&edges, Objective::Maximize);
        assert_eq!(chosen.len(), 4);
        let drivers: std::collections::HashSet<_> = chosen.iter().map(|p| p.driver_id).collect();
        assert_eq!(drivers.len(), 4);
    }
}
