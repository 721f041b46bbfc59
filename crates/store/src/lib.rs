//! Persistence for bondwatch subscriptions and notification channels.
//!
//! This crate provides:
//! - SQLite-backed storage behind the `bondwatch-core` store traits
//! - An in-memory store for tests

pub mod db;
pub mod memory;

pub use db::Database;
pub use memory::MemoryStore;
