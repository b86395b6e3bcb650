//! Infrastructure layer: ledger storage, transaction coordination, config.

pub mod audit;
pub mod config;
pub mod directory;
pub mod ledger_store;
pub mod recorder;


pub use audit::{ConsistencyReport, LocationDrift, audit_product};
pub use config::{ConfigError, LedgerConfig, StorageBackend};
pub use directory::InMemoryDirectory;
pub use recorder::{LedgerError, MovementRecorder};
