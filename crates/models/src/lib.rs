//! Data model shared by the service layer: items and keys, queries, collection
//! schemas, and the system tables the service writes to directly.

pub mod errors;
pub mod db;
pub mod item;
pub mod query;
pub mod schema;
pub mod role;
pub mod user;
pub mod revision;

pub use item::{Item, PrimaryKey};
