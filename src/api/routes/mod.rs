pub mod ai;
pub mod auth;
pub mod notifications;
pub mod sprints;
pub mod stats;
pub mod upgrade_requests;
pub mod users;
