//! Inventory ledger domain module.
//!
//! This crate contains the business rules of the stock ledger implemented as
//! deterministic domain logic (no IO, no storage): catalog documents, movement
//! requests and journal entries, stock records, and the low-stock alert
//! decision function.

pub mod alert;
pub mod event;
pub mod location;
pub mod movement;
pub mod pending;
pub mod product;
pub mod quantity;
pub mod stock;

pub use alert::{Alert, AlertDecision, AlertStatus, AlertType, evaluate_alert};
pub use event::LedgerEvent;
pub use location::{Location, LocationPatch, LocationType, NewLocation};
pub use movement::{ActorType, Movement, MovementKind, MovementRequest, MovementType};
pub use pending::{NewPendingProduct, PendingProduct, PendingStatus};
pub use product::{NewProduct, Product, ProductPatch, UnitOfMeasure};
pub use quantity::Quantity;
pub use stock::{StockKey, StockRecord};
