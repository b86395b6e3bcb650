use std::str::FromStr;

use axum::http::StatusCode;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::json;

use stockledger_core::{ActorId, ProductId, SupplierId};
use stockledger_infra::ledger_store::MovementFilter;
use stockledger_inventory::{MovementType, RecordMovement, StockSnapshot};

use crate::app::errors;

// -------------------------
// Request DTOs
// -------------------------

/// Body of `POST /movements`.
///
/// Ids arrive as strings so a malformed id is reported as a validation error
/// instead of a body rejection.
#[derive(Debug, Deserialize)]
pub struct RecordMovementRequest {
    #[serde(rename = "type", default)]
    pub movement_type: Option<String>,
    pub product_id: Option<String>,
    #[serde(default)]
    pub quantity: i64,
    pub from_location: Option<String>,
    pub to_location: Option<String>,
    pub supplier_id: Option<String>,
    pub delivered_by: Option<String>,
    pub cost: Option<Decimal>,
    pub notes: Option<String>,
    pub reference_type: Option<String>,
    pub reference_id: Option<String>,
}

impl RecordMovementRequest {
    pub fn into_command(self) -> Result<RecordMovement, axum::response::Response> {
        Ok(RecordMovement {
            movement_type: self.movement_type.unwrap_or_default(),
            product_id: parse_optional_id::<ProductId>("product_id", self.product_id)?,
            quantity: self.quantity,
            from_location: self.from_location,
            to_location: self.to_location,
            supplier_id: parse_optional_id::<SupplierId>("supplier_id", self.supplier_id)?,
            delivered_by: parse_optional_id::<ActorId>("delivered_by", self.delivered_by)?,
            cost: self.cost,
            notes: self.notes,
            reference_type: self.reference_type,
            reference_id: self.reference_id,
        })
    }
}

/// Query string of `GET /movements`.
#[derive(Debug, Default, Deserialize)]
pub struct ListMovementsQuery {
    pub product_id: Option<String>,
    #[serde(rename = "type")]
    pub movement_type: Option<String>,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

impl ListMovementsQuery {
    pub fn filter(&self) -> Result<MovementFilter, axum::response::Response> {
        let movement_type = match self.movement_type.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            Some(raw) => Some(
                MovementType::from_str(raw)
                    .map_err(|e| errors::json_error(StatusCode::BAD_REQUEST, "validation_error", e.to_string()))?,
            ),
            None => None,
        };

        Ok(MovementFilter {
            product_id: parse_optional_id::<ProductId>("product_id", self.product_id.clone())?,
            movement_type,
        })
    }
}

// -------------------------
// Response mapping
// -------------------------

pub fn stock_to_json(product_id: ProductId, snapshot: StockSnapshot) -> serde_json::Value {
    json!({
        "product_id": product_id.to_string(),
        "current_stock": snapshot.current_stock,
        "locations": snapshot.locations,
    })
}

pub fn parse_id<T: FromStr>(field: &'static str, raw: &str) -> Result<T, axum::response::Response> {
    raw.parse::<T>()
        .map_err(|_| errors::json_error(StatusCode::BAD_REQUEST, "validation_error", format!("invalid {field}")))
}

fn parse_optional_id<T: FromStr>(field: &'static str, raw: Option<String>) -> Result<Option<T>, axum::response::Response> {
    match raw.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        Some(raw) => parse_id(field, raw).map(Some),
        None => Ok(None),
    }
}
