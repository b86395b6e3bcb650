use core::str::FromStr;
use serde::{Deserialize, Serialize};

use stockledger_core::DomainError;

/// Closed set of stock movement kinds.
///
/// The wire/storage representation is the SCREAMING_SNAKE_CASE name
/// (e.g. `PRODUCTION_OUTPUT`). Anything else is rejected during validation.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MovementType {
    Purchase,
    ProductionOutput,
    Return,
    Adjustment,
    AdjustmentOut,
    Sale,
    ProductionInput,
    SaleConsumption,
    Damage,
    Transfer,
}

impl MovementType {
    pub const ALL: [MovementType; 10] = [
        MovementType::Purchase,
        MovementType::ProductionOutput,
        MovementType::Return,
        MovementType::Adjustment,
        MovementType::AdjustmentOut,
        MovementType::Sale,
        MovementType::ProductionInput,
        MovementType::SaleConsumption,
        MovementType::Damage,
        MovementType::Transfer,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MovementType::Purchase => "PURCHASE",
            MovementType::ProductionOutput => "PRODUCTION_OUTPUT",
            MovementType::Return => "RETURN",
            MovementType::Adjustment => "ADJUSTMENT",
            MovementType::AdjustmentOut => "ADJUSTMENT_OUT",
            MovementType::Sale => "SALE",
            MovementType::ProductionInput => "PRODUCTION_INPUT",
            MovementType::SaleConsumption => "SALE_CONSUMPTION",
            MovementType::Damage => "DAMAGE",
            MovementType::Transfer => "TRANSFER",
        }
    }
}

impl core::fmt::Display for MovementType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MovementType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        MovementType::ALL
            .into_iter()
            .find(|t| t.as_str() == wanted)
            .ok_or_else(|| DomainError::validation(format!("unknown movement type '{wanted}'")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_type_parses_from_its_wire_name() {
        for t in MovementType::ALL {
            assert_eq!(t.as_str().parse::<MovementType>().unwrap(), t);
        }
    }

    #[test]
    fn serde_uses_wire_names() {
        let json = serde_json::to_value(MovementType::SaleConsumption).unwrap();
        assert_eq!(json, serde_json::json!("SALE_CONSUMPTION"));
    }

    #[test]
    fn unknown_type_is_a_validation_error() {
        let err = "FOO".parse::<MovementType>().unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn parsing_is_case_sensitive() {
        assert!("purchase".parse::<MovementType>().is_err());
    }
}
