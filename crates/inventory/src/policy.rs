//! Movement type policy: how each movement kind moves the stock counters.
//!
//! Pure lookup, no IO. The transaction coordinator consults this table before
//! touching any aggregate, so an unknown kind never reaches storage.

use serde::{Deserialize, Serialize};

use crate::movement_type::MovementType;

/// Signed effects of one movement on the global and per-location counters.
///
/// `None` means the side is not touched at all (no location record is upserted).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MovementEffects {
    pub global_delta: i64,
    pub from_location_delta: Option<i64>,
    pub to_location_delta: Option<i64>,
}

impl MovementEffects {
    pub fn affects_from_location(&self) -> bool {
        self.from_location_delta.is_some()
    }

    pub fn affects_to_location(&self) -> bool {
        self.to_location_delta.is_some()
    }
}

/// Compute the effects of a movement of `magnitude` units.
///
/// `magnitude` is the positive quantity carried by the movement; direction comes
/// from the type alone.
pub fn effects_for(movement_type: MovementType, magnitude: i64) -> MovementEffects {
    let m = magnitude;
    match movement_type {
        MovementType::Purchase | MovementType::ProductionOutput | MovementType::Return => {
            MovementEffects {
                global_delta: m,
                from_location_delta: None,
                to_location_delta: Some(m),
            }
        }
        MovementType::Adjustment => MovementEffects {
            global_delta: m,
            from_location_delta: None,
            to_location_delta: None,
        },
        MovementType::AdjustmentOut => MovementEffects {
            global_delta: -m,
            from_location_delta: None,
            to_location_delta: None,
        },
        MovementType::Sale
        | MovementType::ProductionInput
        | MovementType::SaleConsumption
        | MovementType::Damage => MovementEffects {
            global_delta: -m,
            from_location_delta: Some(-m),
            to_location_delta: None,
        },
        MovementType::Transfer => MovementEffects {
            global_delta: 0,
            from_location_delta: Some(-m),
            to_location_delta: Some(m),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn effects_table() {
        use MovementType::*;

        // (type, global, from, to) for magnitude 7
        let table: [(MovementType, i64, Option<i64>, Option<i64>); 10] = [
            (Purchase, 7, None, Some(7)),
            (ProductionOutput, 7, None, Some(7)),
            (Return, 7, None, Some(7)),
            (Adjustment, 7, None, None),
            (AdjustmentOut, -7, None, None),
            (Sale, -7, Some(-7), None),
            (ProductionInput, -7, Some(-7), None),
            (SaleConsumption, -7, Some(-7), None),
            (Damage, -7, Some(-7), None),
            (Transfer, 0, Some(-7), Some(7)),
        ];

        for (t, global, from, to) in table {
            let e = effects_for(t, 7);
            assert_eq!(e.global_delta, global, "{t} global");
            assert_eq!(e.from_location_delta, from, "{t} from");
            assert_eq!(e.to_location_delta, to, "{t} to");
        }
    }

    #[test]
    fn transfer_is_stock_neutral_across_locations() {
        let e = effects_for(MovementType::Transfer, 5);
        let location_sum = e.from_location_delta.unwrap_or(0) + e.to_location_delta.unwrap_or(0);
        assert_eq!(location_sum, 0);
        assert_eq!(e.global_delta, 0);
    }

    #[test]
    fn location_effects_never_contradict_global_direction() {
        for t in MovementType::ALL {
            let e = effects_for(t, 3);
            if let Some(to) = e.to_location_delta {
                assert!(to > 0, "{t}");
            }
            if let Some(from) = e.from_location_delta {
                assert!(from < 0, "{t}");
            }
        }
    }
}
