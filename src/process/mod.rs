// src/process/mod.rs

pub mod persist;
pub mod price;
pub mod table;

pub use persist::{OutputFile, Persisted, Persister, Role, HELPER_COLUMN, PRICE_COLUMN};
pub use price::normalize_price;
pub use table::{Row, Table};
