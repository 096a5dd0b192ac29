//! Sprintify HTTP service.
//!
//! The storage layer lives in `sprintify-core`; this crate adds the REST API,
//! the AI plan generator, push delivery and the scheduled maintenance jobs.

pub mod ai;
pub mod api;
pub mod config;
pub mod jobs;
pub mod push;

pub use sprintify_core::{db, models, quota};
