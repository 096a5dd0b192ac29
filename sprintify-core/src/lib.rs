//! Core library for Sprintify.
//!
//! This crate provides the domain models, quota rules and database operations
//! for Sprintify, independent of any transport layer.
//!
//! # Usage
//!
//! ```no_run
//! use sprintify_core::db::Database;
//!
//! let db = Database::open_default()?;
//! db.migrate()?;
//!
//! let sprints = db.list_sprints("some-user", None)?;
//! # Ok::<(), sprintify_core::StoreError>(())
//! ```

pub mod db;
pub mod deps;
pub mod error;
pub mod models;
pub mod quota;

// Re-export commonly used types at crate root
pub use db::Database;
pub use error::{Result, StoreError};
