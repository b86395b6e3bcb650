//! Recompute stock aggregates from movement history.
//!
//! Used by the consistency audit and by property tests: folding the committed
//! movements of a product in commit order must reproduce the stored counters.

use std::collections::BTreeMap;

use crate::movement::Movement;

/// Aggregates rebuilt from a sequence of movements of a single product.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StockReplay {
    current_stock: i64,
    locations: BTreeMap<String, i64>,
    applied: u64,
}

impl StockReplay {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_movements<'a>(movements: impl IntoIterator<Item = &'a Movement>) -> Self {
        let mut replay = Self::new();
        for m in movements {
            replay.apply(m);
        }
        replay
    }

    pub fn apply(&mut self, movement: &Movement) {
        let effects = movement.effects();
        self.current_stock += effects.global_delta;

        if let (Some(delta), Some(location)) = (effects.from_location_delta, &movement.from_location) {
            *self.locations.entry(location.clone()).or_insert(0) += delta;
        }
        if let (Some(delta), Some(location)) = (effects.to_location_delta, &movement.to_location) {
            *self.locations.entry(location.clone()).or_insert(0) += delta;
        }

        self.applied += 1;
    }

    pub fn current_stock(&self) -> i64 {
        self.current_stock
    }

    /// Expected `quantity` per location, keyed by location name.
    pub fn locations(&self) -> &BTreeMap<String, i64> {
        &self.locations
    }

    pub fn applied(&self) -> u64 {
        self.applied
    }
}
