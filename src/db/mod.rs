#[cfg(test)]
pub mod memory;
pub mod models;
pub mod store;

pub use store::{SnapshotStore, SqliteStore};
