//! Inventory movement domain.
//!
//! This crate contains the business rules of the stock ledger, implemented
//! purely as deterministic domain logic (no IO, no HTTP, no storage):
//! movement kinds, their effect policy, request validation, the aggregate
//! record shapes and history replay.

pub mod movement;
pub mod movement_type;
pub mod policy;
pub mod replay;
pub mod stock;

pub use movement::{Movement, RecordMovement, ValidatedMovement};
pub use movement_type::MovementType;
pub use policy::{MovementEffects, effects_for};
pub use replay::StockReplay;
pub use stock::{LocationInventoryRecord, ProductStock, RecordedMovement, StockSnapshot};
