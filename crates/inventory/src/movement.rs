use chrono::{DateTime, SubsecRound, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use stockledger_core::{ActorId, DomainError, DomainResult, MovementId, ProductId, SupplierId, TenantId};

use crate::movement_type::MovementType;
use crate::policy::{MovementEffects, effects_for};

pub const MAX_LOCATION_LEN: usize = 100;
pub const MAX_NOTES_LEN: usize = 2000;
pub const MAX_REFERENCE_LEN: usize = 100;
/// Decimal places kept for `cost` (`NUMERIC(14, 4)`).
pub const COST_SCALE: u32 = 4;
/// Integer digits kept for `cost`.
pub const COST_INTEGER_DIGITS: u32 = 10;

/// A recorded stock movement (immutable, append-only).
///
/// Once persisted a movement is never changed or removed; corrections are new,
/// offsetting movements.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Movement {
    pub id: MovementId,
    pub tenant_id: TenantId,
    #[serde(rename = "type")]
    pub movement_type: MovementType,
    pub product_id: ProductId,
    /// Positive magnitude; the direction comes from `movement_type`.
    pub quantity: i64,
    pub from_location: Option<String>,
    pub to_location: Option<String>,
    pub supplier_id: Option<SupplierId>,
    pub recorded_by: Option<ActorId>,
    pub delivered_by: Option<ActorId>,
    pub cost: Option<Decimal>,
    pub notes: Option<String>,
    pub reference_type: Option<String>,
    pub reference_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Movement {
    pub fn effects(&self) -> MovementEffects {
        effects_for(self.movement_type, self.quantity)
    }
}

/// Request to record a movement, as received from a caller.
///
/// The type is kept as raw text so that an unknown kind is reported as a
/// validation failure instead of a decoding error.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordMovement {
    #[serde(rename = "type")]
    pub movement_type: String,
    pub product_id: Option<ProductId>,
    pub quantity: i64,
    pub from_location: Option<String>,
    pub to_location: Option<String>,
    pub supplier_id: Option<SupplierId>,
    pub delivered_by: Option<ActorId>,
    pub cost: Option<Decimal>,
    pub notes: Option<String>,
    pub reference_type: Option<String>,
    pub reference_id: Option<String>,
}

/// A request that passed shape validation; effects are resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedMovement {
    pub movement_type: MovementType,
    pub product_id: ProductId,
    pub quantity: i64,
    pub from_location: Option<String>,
    pub to_location: Option<String>,
    pub supplier_id: Option<SupplierId>,
    pub delivered_by: Option<ActorId>,
    pub cost: Option<Decimal>,
    pub notes: Option<String>,
    pub reference_type: Option<String>,
    pub reference_id: Option<String>,
    pub effects: MovementEffects,
}

impl RecordMovement {
    /// Validate the request shape.
    ///
    /// Checks run in a fixed order: type, product, quantity, locations, free text.
    /// Nothing here touches storage; product existence is checked by the caller.
    pub fn validate(self) -> DomainResult<ValidatedMovement> {
        if self.movement_type.trim().is_empty() {
            return Err(DomainError::validation("movement type is required"));
        }
        let movement_type: MovementType = self.movement_type.parse()?;

        let product_id = self
            .product_id
            .ok_or_else(|| DomainError::validation("product_id is required"))?;

        if self.quantity <= 0 {
            return Err(DomainError::validation(format!(
                "quantity must be greater than zero (got {})",
                self.quantity
            )));
        }

        let effects = effects_for(movement_type, self.quantity);

        let from_location = normalize_text("from_location", self.from_location, MAX_LOCATION_LEN)?;
        let to_location = normalize_text("to_location", self.to_location, MAX_LOCATION_LEN)?;

        if from_location.is_some() && !effects.affects_from_location() {
            return Err(DomainError::validation(format!(
                "{movement_type} movements do not take a from_location"
            )));
        }
        if to_location.is_some() && !effects.affects_to_location() {
            return Err(DomainError::validation(format!(
                "{movement_type} movements do not take a to_location"
            )));
        }

        if movement_type == MovementType::Transfer {
            match (&from_location, &to_location) {
                (Some(from), Some(to)) if from == to => {
                    return Err(DomainError::validation(
                        "transfer source and destination must differ",
                    ));
                }
                (Some(_), Some(_)) => {}
                _ => {
                    return Err(DomainError::validation(
                        "transfer requires both from_location and to_location",
                    ));
                }
            }
        }

        let cost = self.cost.map(validate_cost).transpose()?;

        let notes = normalize_text("notes", self.notes, MAX_NOTES_LEN)?;
        let reference_type = normalize_text("reference_type", self.reference_type, MAX_REFERENCE_LEN)?;
        let reference_id = normalize_text("reference_id", self.reference_id, MAX_REFERENCE_LEN)?;
        if reference_id.is_some() && reference_type.is_none() {
            return Err(DomainError::validation(
                "reference_id requires a reference_type",
            ));
        }

        Ok(ValidatedMovement {
            movement_type,
            product_id,
            quantity: self.quantity,
            from_location,
            to_location,
            supplier_id: self.supplier_id,
            delivered_by: self.delivered_by,
            cost,
            notes,
            reference_type,
            reference_id,
            effects,
        })
    }
}

impl ValidatedMovement {
    /// Stamp the validated request into a movement ready to append.
    ///
    /// `created_at` is truncated to microseconds, the precision storage keeps.
    pub fn into_movement(
        self,
        id: MovementId,
        tenant_id: TenantId,
        recorded_by: Option<ActorId>,
        created_at: DateTime<Utc>,
    ) -> Movement {
        Movement {
            id,
            tenant_id,
            movement_type: self.movement_type,
            product_id: self.product_id,
            quantity: self.quantity,
            from_location: self.from_location,
            to_location: self.to_location,
            supplier_id: self.supplier_id,
            recorded_by,
            delivered_by: self.delivered_by,
            cost: self.cost,
            notes: self.notes,
            reference_type: self.reference_type,
            reference_id: self.reference_id,
            created_at: created_at.trunc_subsecs(6),
        }
    }
}

/// Non-negative, at most `COST_SCALE` decimals, below `10^COST_INTEGER_DIGITS`.
fn validate_cost(cost: Decimal) -> DomainResult<Decimal> {
    if cost.is_sign_negative() && !cost.is_zero() {
        return Err(DomainError::validation("cost cannot be negative"));
    }
    let cost = cost.normalize();
    if cost.scale() > COST_SCALE {
        return Err(DomainError::validation(format!(
            "cost allows at most {COST_SCALE} decimal places"
        )));
    }
    if cost >= Decimal::from(10_i64.pow(COST_INTEGER_DIGITS)) {
        return Err(DomainError::validation(format!(
            "cost must be below 10^{COST_INTEGER_DIGITS}"
        )));
    }
    Ok(cost)
}

/// Trim, map blank to `None`, enforce a character limit.
fn normalize_text(field: &str, value: Option<String>, max_len: usize) -> DomainResult<Option<String>> {
    let Some(raw) = value else {
        return Ok(None);
    };
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    if trimmed.chars().count() > max_len {
        return Err(DomainError::validation(format!(
            "{field} exceeds {max_len} characters"
        )));
    }
    Ok(Some(trimmed.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(movement_type: &str, quantity: i64) -> RecordMovement {
        RecordMovement {
            movement_type: movement_type.to_string(),
            product_id: Some(ProductId::new()),
            quantity,
            ..Default::default()
        }
    }

    fn validation_message(req: RecordMovement) -> String {
        match req.validate() {
            Err(DomainError::Validation(msg)) => msg,
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn purchase_with_destination_is_valid() {
        let mut req = request("PURCHASE", 10);
        req.to_location = Some("  Main Warehouse ".to_string());
        let v = req.validate().unwrap();
        assert_eq!(v.movement_type, MovementType::Purchase);
        assert_eq!(v.to_location.as_deref(), Some("Main Warehouse"));
        assert_eq!(v.effects.global_delta, 10);
    }

    #[test]
    fn location_is_optional_for_single_sided_types() {
        let v = request("SALE", 2).validate().unwrap();
        assert_eq!(v.from_location, None);
        assert_eq!(v.effects.global_delta, -2);
    }

    #[test]
    fn blank_location_is_treated_as_absent() {
        let mut req = request("DAMAGE", 1);
        req.from_location = Some("   ".to_string());
        assert_eq!(req.validate().unwrap().from_location, None);
    }

    #[test]
    fn unknown_type_is_rejected_first() {
        let mut req = request("FOO", 0);
        req.product_id = None;
        assert!(validation_message(req).contains("unknown movement type"));
    }

    #[test]
    fn missing_type_is_rejected() {
        assert!(validation_message(request("", 1)).contains("required"));
    }

    #[test]
    fn missing_product_is_rejected() {
        let mut req = request("PURCHASE", 1);
        req.product_id = None;
        assert!(validation_message(req).contains("product_id"));
    }

    #[test]
    fn non_positive_quantity_is_rejected() {
        assert!(validation_message(request("PURCHASE", 0)).contains("quantity"));
        assert!(validation_message(request("ADJUSTMENT", -4)).contains("quantity"));
    }

    #[test]
    fn transfer_requires_both_locations() {
        let mut req = request("TRANSFER", 5);
        req.from_location = Some("A".to_string());
        assert!(validation_message(req).contains("both"));
    }

    #[test]
    fn transfer_locations_must_differ() {
        let mut req = request("TRANSFER", 5);
        req.from_location = Some("A".to_string());
        req.to_location = Some("A ".to_string());
        assert!(validation_message(req).contains("differ"));
    }

    #[test]
    fn location_on_untouched_side_is_rejected() {
        let mut req = request("PURCHASE", 5);
        req.from_location = Some("A".to_string());
        assert!(validation_message(req).contains("from_location"));

        let mut req = request("ADJUSTMENT", 5);
        req.to_location = Some("A".to_string());
        assert!(validation_message(req).contains("to_location"));
    }

    #[test]
    fn negative_cost_is_rejected() {
        let mut req = request("PURCHASE", 5);
        req.cost = Some(Decimal::new(-150, 2));
        assert!(validation_message(req).contains("cost"));
    }

    #[test]
    fn cost_must_fit_storage_precision() {
        let mut req = request("PURCHASE", 5);
        req.cost = Some(Decimal::new(123_456_789, 5));
        assert!(validation_message(req).contains("decimal places"));

        let mut req = request("PURCHASE", 5);
        req.cost = Some(Decimal::new(123_456_789_015, 1));
        assert!(validation_message(req).contains("below"));

        let mut req = request("PURCHASE", 5);
        req.cost = Some(Decimal::new(99_999_999_999_999, 4));
        assert!(req.validate().is_ok());
    }

    #[test]
    fn trailing_zeros_do_not_count_as_decimal_places() {
        let mut req = request("PURCHASE", 5);
        req.cost = Some(Decimal::new(1_250_000, 5));
        let v = req.validate().unwrap();
        assert_eq!(v.cost, Some(Decimal::new(125, 1)));
    }

    #[test]
    fn created_at_is_truncated_to_microseconds() {
        let at = DateTime::from_timestamp(1_700_000_000, 123_456_789).unwrap();
        let m = request("PURCHASE", 1)
            .validate()
            .unwrap()
            .into_movement(MovementId::new(), TenantId::new(), None, at);
        assert_eq!(m.created_at.timestamp_subsec_nanos(), 123_456_000);
    }

    #[test]
    fn overlong_notes_are_rejected() {
        let mut req = request("RETURN", 1);
        req.notes = Some("x".repeat(MAX_NOTES_LEN + 1));
        assert!(validation_message(req).contains("notes"));
    }

    #[test]
    fn reference_id_needs_reference_type() {
        let mut req = request("SALE", 1);
        req.reference_id = Some("INV-42".to_string());
        assert!(validation_message(req).contains("reference_type"));
    }

    #[test]
    fn into_movement_carries_every_field() {
        let tenant_id = TenantId::new();
        let actor = ActorId::new();
        let supplier = SupplierId::new();
        let mut req = request("PURCHASE", 3);
        req.to_location = Some("Dock".to_string());
        req.supplier_id = Some(supplier);
        req.cost = Some(Decimal::new(1999, 2));
        req.reference_type = Some("PURCHASE_ORDER".to_string());
        req.reference_id = Some("PO-7".to_string());
        let product_id = req.product_id.unwrap();

        let id = MovementId::new();
        let at = Utc::now().trunc_subsecs(6);
        let m = req.validate().unwrap().into_movement(id, tenant_id, Some(actor), at);

        assert_eq!(m.id, id);
        assert_eq!(m.tenant_id, tenant_id);
        assert_eq!(m.product_id, product_id);
        assert_eq!(m.recorded_by, Some(actor));
        assert_eq!(m.supplier_id, Some(supplier));
        assert_eq!(m.cost, Some(Decimal::new(1999, 2)));
        assert_eq!(m.reference_id.as_deref(), Some("PO-7"));
        assert_eq!(m.created_at, at);
        assert_eq!(m.effects().to_location_delta, Some(3));
    }

    #[test]
    fn request_deserializes_type_field() {
        let json = serde_json::json!({
            "type": "TRANSFER",
            "product_id": ProductId::new().to_string(),
            "quantity": 5,
            "from_location": "A",
            "to_location": "B"
        });
        let req: RecordMovement = serde_json::from_value(json).unwrap();
        assert_eq!(req.movement_type, "TRANSFER");
        assert!(req.validate().is_ok());
    }
}
