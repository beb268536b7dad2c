//! HTTP handlers, one module per resource.

pub mod goods;
pub mod health;
pub mod inventory;
pub mod metrics;
pub mod orders;
pub mod users;
