//! SQLite backend for the tally vote warehouse.
//!
//! The warehouse file is attached to the connection under the namespace
//! name, so every object is addressed as `"namespace"."object"`.

mod schema;
mod store;

pub mod error;

pub use error::{Error, Result};
pub use store::SqliteWarehouse;

#[cfg(test)]
mod tests;
