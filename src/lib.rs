//! Offline mutation queue and replay engine for observation records.
//!
//! Local edits are stored as records with sync metadata, handed to a durable
//! primary queue of parent requests, and once a parent succeeds its photos,
//! field values and project linkage are replayed from a dependent queue.

pub mod config;
pub mod database;
pub mod error;
pub mod models;
pub mod services;

#[cfg(test)]
mod test_support;

pub use config::SyncConfig;
pub use error::AppError;
pub use services::{BackgroundSync, SyncEngine};
