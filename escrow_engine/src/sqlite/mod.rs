//! SQLite backend for the escrow engine.
//!
//! [`db`] holds the low-level, connection-scoped queries. [`SqliteDatabase`] composes them into the atomic units of
//! work the storage traits require.
mod sqlite_impl;

pub mod db;
pub use sqlite_impl::SqliteDatabase;
