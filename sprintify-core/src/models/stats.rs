use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::{Sprint, Task};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserOverview {
    /// Sprint count keyed by status name; every status is present.
    pub sprints_by_status: BTreeMap<String, u64>,
    pub total_sprints: u64,
    pub total_tasks: u64,
    pub completed_tasks: u64,
    /// Completed tasks over all tasks, as a percentage.
    pub completion_rate: u8,
    pub completed_milestones: u64,
    pub ai_calls_today: u32,
    pub ai_calls_this_month: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SprintReport {
    pub sprint: Sprint,
    pub tasks_by_status: BTreeMap<String, u64>,
    pub tasks_by_priority: BTreeMap<String, u64>,
    pub overdue_tasks: Vec<Task>,
    /// Negative once the end date has passed.
    pub days_remaining: i64,
    pub total_estimated_hours: f64,
    pub as_of: NaiveDate,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdminOverview {
    pub users_by_role: BTreeMap<String, u64>,
    pub total_users: u64,
    pub disabled_users: u64,
    pub sprints_by_status: BTreeMap<String, u64>,
    pub pending_upgrade_requests: u64,
    pub ai_calls_today: u64,
}
