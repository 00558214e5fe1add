//! Time-annotated cell sequence consumed front-first as the clock advances.

use std::collections::VecDeque;

use h3o::CellIndex;

/// Ordered `(absolute second, cell)` steps with strictly increasing seconds.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Route {
    steps: VecDeque<(u64, CellIndex)>,
}

impl Route {
    pub(crate) fn from_steps(steps: Vec<(u64, CellIndex)>) -> Self {
        debug_assert!(
            steps.windows(2).all(|w| w[0].0 < w[1].0),
            "route seconds must be strictly increasing"
        );
        Self {
            steps: steps.into(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn first_second(&self) -> Option<u64> {
        self.steps.front().map(|(second, _)| *second)
    }

    pub fn last_second(&self) -> Option<u64> {
        self.steps.back().map(|(second, _)| *second)
    }

    /// Final cell of the route, if any steps remain.
    pub fn destination(&self) -> Option<CellIndex> {
        self.steps.back().map(|(_, cell)| *cell)
    }

    pub fn steps(&self) -> impl Iterator<Item = &(u64, CellIndex)> {
        self.steps.iter()
    }

    /// Pops every step due at or before `now` and returns the latest one.
    pub fn pop_due(&mut self, now: u64) -> Option<CellIndex> {
        let mut reached = None;
        while let Some(&(second, cell)) = self.steps.front() {
            if second > now {
                break;
            }
            self.steps.pop_front();
            reached = Some(cell);
        }
        reached
    }

    pub fn clear(&mut self) {
        self.steps.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{test_cell, test_neighbor_cell};

    #[test]
    fn pop_due_consumes_front_entries_only() {
        let a = test_cell();
        let b = test_neighbor_cell();
        let mut route = Route::from_steps(vec![(10, a), (12, b)]);

        assert_eq!(route.pop_due(9), None);
        assert_eq!(route.pop_due(10), Some(a));
        assert_eq!(route.len(), 1);
        assert_eq!(route.pop_due(11), None);
        assert_eq!(route.pop_due(12), Some(b));
        assert!(route.is_empty());
    }

    #[test]
    fn pop_due_catches_up_on_skipped_seconds() {
        let a = test_cell();
        let b = test_neighbor_cell();
        let mut route = Route::from_steps(vec![(10, a), (12, b)]);
        assert_eq!(route.pop_due(20), Some(b));
        assert!(route.is_empty());
    }
}
