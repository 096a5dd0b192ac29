use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rusqlite::Connection;
use uuid::Uuid;

use super::sprints::load_sprint;
use super::tasks::load_tasks;
use super::Database;
use crate::error::Result;
use crate::models::*;

/// Run a `SELECT key, COUNT(*) ... GROUP BY key` query into a map.
fn grouped_counts(conn: &Connection, sql: &str, params: impl rusqlite::Params) -> Result<BTreeMap<String, u64>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map(params, |row| {
        Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
    })?;
    let mut counts = BTreeMap::new();
    for row in rows {
        let (key, count) = row?;
        counts.insert(key, count as u64);
    }
    Ok(counts)
}

fn with_all_statuses(mut counts: BTreeMap<String, u64>) -> BTreeMap<String, u64> {
    for status in SprintStatus::ALL {
        counts.entry(status.as_str().to_string()).or_insert(0);
    }
    counts
}

fn percent(part: u64, whole: u64) -> u8 {
    if whole == 0 {
        0
    } else {
        ((part * 100) / whole).min(100) as u8
    }
}

impl Database {
    pub fn user_overview(&self, user_id: &str, now: DateTime<Utc>) -> Result<UserOverview> {
        // Normalizes the counters before taking the conn lock below.
        let usage = self.get_ai_usage(user_id, now)?;

        let conn = self.conn();
        let sprints_by_status = with_all_statuses(grouped_counts(
            &conn,
            "SELECT status, COUNT(*) FROM sprints WHERE user_id = ?1 GROUP BY status",
            [user_id],
        )?);
        let total_sprints = sprints_by_status.values().sum();

        let (total_tasks, completed_tasks): (i64, i64) = conn.query_row(
            "SELECT COUNT(*), COALESCE(SUM(t.status = 'done'), 0)
             FROM tasks t JOIN sprints s ON s.id = t.sprint_id
             WHERE s.user_id = ?1",
            [user_id],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;
        let completed_milestones: i64 = conn.query_row(
            "SELECT COUNT(*) FROM milestones m JOIN sprints s ON s.id = m.sprint_id
             WHERE s.user_id = ?1 AND m.completed = 1",
            [user_id],
            |row| row.get(0),
        )?;

        Ok(UserOverview {
            sprints_by_status,
            total_sprints,
            total_tasks: total_tasks as u64,
            completed_tasks: completed_tasks as u64,
            completion_rate: percent(completed_tasks as u64, total_tasks as u64),
            completed_milestones: completed_milestones as u64,
            ai_calls_today: usage.daily_count,
            ai_calls_this_month: usage.monthly_count,
        })
    }

    pub fn sprint_report(&self, user_id: &str, sprint_id: Uuid, now: DateTime<Utc>) -> Result<Option<SprintReport>> {
        let conn = self.conn();
        let Some(sprint) = load_sprint(&conn, user_id, sprint_id)? else {
            return Ok(None);
        };
        let tasks = load_tasks(&conn, sprint_id)?;
        let today = now.date_naive();

        let mut tasks_by_status: BTreeMap<String, u64> = [TaskStatus::Todo, TaskStatus::InProgress, TaskStatus::Done]
            .iter()
            .map(|s| (s.as_str().to_string(), 0))
            .collect();
        let mut tasks_by_priority: BTreeMap<String, u64> = [Priority::Low, Priority::Medium, Priority::High]
            .iter()
            .map(|p| (p.as_str().to_string(), 0))
            .collect();
        let mut total_estimated_hours = 0.0;
        for task in &tasks {
            *tasks_by_status.entry(task.status.as_str().to_string()).or_default() += 1;
            *tasks_by_priority.entry(task.priority.as_str().to_string()).or_default() += 1;
            total_estimated_hours += task.estimated_hours.unwrap_or(0.0);
        }
        let overdue_tasks = tasks
            .into_iter()
            .filter(|t| t.status != TaskStatus::Done && t.due_date.is_some_and(|d| d < today))
            .collect();

        Ok(Some(SprintReport {
            days_remaining: (sprint.end_date - today).num_days(),
            sprint,
            tasks_by_status,
            tasks_by_priority,
            overdue_tasks,
            total_estimated_hours,
            as_of: today,
        }))
    }

    pub fn admin_overview(&self, now: DateTime<Utc>) -> Result<AdminOverview> {
        let conn = self.conn();
        let mut users_by_role = grouped_counts(&conn, "SELECT role, COUNT(*) FROM users GROUP BY role", [])?;
        for role in [Role::Normal, Role::Premium, Role::Admin] {
            users_by_role.entry(role.as_str().to_string()).or_insert(0);
        }
        let total_users = users_by_role.values().sum();
        let disabled_users: i64 =
            conn.query_row("SELECT COUNT(*) FROM users WHERE disabled = 1", [], |row| row.get(0))?;
        let sprints_by_status = with_all_statuses(grouped_counts(
            &conn,
            "SELECT status, COUNT(*) FROM sprints GROUP BY status",
            [],
        )?);
        let pending_upgrade_requests: i64 = conn.query_row(
            "SELECT COUNT(*) FROM upgrade_requests WHERE status = 'pending'",
            [],
            |row| row.get(0),
        )?;
        // Rows not touched today hold a stale daily count.
        let ai_calls_today: i64 = conn.query_row(
            "SELECT COALESCE(SUM(daily_count), 0) FROM ai_usage WHERE last_daily_reset = ?1",
            [super::fmt_date(now.date_naive())],
            |row| row.get(0),
        )?;

        Ok(AdminOverview {
            users_by_role,
            total_users,
            disabled_users: disabled_users as u64,
            sprints_by_status,
            pending_upgrade_requests: pending_upgrade_requests as u64,
            ai_calls_today: ai_calls_today as u64,
        })
    }
}
