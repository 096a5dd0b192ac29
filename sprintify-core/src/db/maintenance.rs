//! Bulk operations run by the scheduled jobs. Each runs as one transaction.

use chrono::{DateTime, Days, NaiveDate, Utc};
use rusqlite::params;
use serde::Serialize;
use uuid::Uuid;

use super::notifications::insert_notification;
use super::sprints::{refresh_stats, row_to_sprint, SPRINT_COLUMNS};
use super::{fmt_date, fmt_ts, now_ts, parse_uuid, Database};
use crate::error::Result;
use crate::models::*;

#[derive(Debug, Clone, Serialize)]
pub struct ExpiredSprint {
    pub sprint: Sprint,
    pub previous_status: SprintStatus,
    pub notification: Notification,
}

#[derive(Debug, Clone, Serialize)]
pub struct SprintReminder {
    pub sprint: Sprint,
    pub notification: Notification,
}

impl Database {
    /// Zero daily counters not yet reset for `today`. Returns rows touched.
    pub fn reset_daily_ai_counters(&self, today: NaiveDate) -> Result<usize> {
        let changed = self.conn().execute(
            "UPDATE ai_usage SET daily_count = 0, last_daily_reset = ?1, updated_at = ?2
             WHERE last_daily_reset != ?1",
            params![fmt_date(today), now_ts()],
        )?;
        Ok(changed)
    }

    pub fn reset_monthly_ai_counters(&self, today: NaiveDate) -> Result<usize> {
        let changed = self.conn().execute(
            "UPDATE ai_usage SET monthly_count = 0, last_monthly_reset = ?1, updated_at = ?2
             WHERE last_monthly_reset != ?1",
            params![month_key(today), now_ts()],
        )?;
        Ok(changed)
    }

    /// Close active or paused sprints whose end date is before `today` and notify their owners.
    pub fn expire_sprints(&self, today: NaiveDate) -> Result<Vec<ExpiredSprint>> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;

        let due: Vec<Sprint> = {
            let mut stmt = tx.prepare(&format!(
                "SELECT {SPRINT_COLUMNS} FROM sprints
                 WHERE status IN ('active', 'paused') AND end_date < ?1"
            ))?;
            let rows = stmt.query_map([fmt_date(today)], row_to_sprint)?;
            rows.collect::<rusqlite::Result<Vec<_>>>()?
        };

        let now = now_ts();
        let mut expired = Vec::with_capacity(due.len());
        for mut sprint in due {
            let previous_status = sprint.status;
            tx.execute(
                "UPDATE sprints SET status = 'completed', updated_at = ?2 WHERE id = ?1",
                params![sprint.id.to_string(), now],
            )?;
            sprint.stats = refresh_stats(&tx, sprint.id)?;
            sprint.status = SprintStatus::Completed;

            let body = format!(
                "\"{}\" reached its end date and was closed at {}% progress.",
                sprint.title, sprint.stats.progress
            );
            let notification = insert_notification(
                &tx,
                &CreateNotificationInput::new(&sprint.user_id, NotificationKind::Sprint, "Sprint ended", body)
                    .with_link(format!("/sprints/{}", sprint.id)),
            )?;
            expired.push(ExpiredSprint {
                sprint,
                previous_status,
                notification,
            });
        }
        tx.commit()?;

        if !expired.is_empty() {
            tracing::info!(count = expired.len(), "expired sprints closed");
        }
        Ok(expired)
    }

    /// Recount stats for every open sprint. Returns how many were refreshed.
    pub fn recompute_all_open_stats(&self) -> Result<usize> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        let ids: Vec<Uuid> = {
            let mut stmt =
                tx.prepare("SELECT id FROM sprints WHERE status IN ('draft', 'active', 'paused')")?;
            let rows = stmt.query_map([], |row| {
                let id: String = row.get(0)?;
                parse_uuid(0, &id)
            })?;
            rows.collect::<rusqlite::Result<Vec<_>>>()?
        };
        for id in &ids {
            refresh_stats(&tx, *id)?;
        }
        tx.commit()?;
        Ok(ids.len())
    }

    /// Notify owners of active sprints ending today or tomorrow, at most once per sprint per day.
    pub fn send_deadline_reminders(&self, now: DateTime<Utc>) -> Result<Vec<SprintReminder>> {
        let today = now.date_naive();
        let horizon = today.checked_add_days(Days::new(1)).unwrap_or(today);

        let mut conn = self.conn();
        let tx = conn.transaction()?;
        let due: Vec<Sprint> = {
            let mut stmt = tx.prepare(&format!(
                "SELECT {SPRINT_COLUMNS} FROM sprints
                 WHERE status = 'active' AND end_date BETWEEN ?1 AND ?2
                   AND (last_reminded_on IS NULL OR last_reminded_on != ?1)"
            ))?;
            let rows = stmt.query_map(params![fmt_date(today), fmt_date(horizon)], row_to_sprint)?;
            rows.collect::<rusqlite::Result<Vec<_>>>()?
        };

        let mut reminders = Vec::with_capacity(due.len());
        for sprint in due {
            tx.execute(
                "UPDATE sprints SET last_reminded_on = ?2 WHERE id = ?1",
                params![sprint.id.to_string(), fmt_date(today)],
            )?;
            let when = if sprint.end_date == today { "today" } else { "tomorrow" };
            let body = format!(
                "\"{}\" ends {}. {} of {} tasks done.",
                sprint.title, when, sprint.stats.completed_tasks, sprint.stats.total_tasks
            );
            let notification = insert_notification(
                &tx,
                &CreateNotificationInput::new(&sprint.user_id, NotificationKind::Sprint, "Sprint ending soon", body)
                    .with_link(format!("/sprints/{}", sprint.id)),
            )?;
            reminders.push(SprintReminder { sprint, notification });
        }
        tx.commit()?;
        Ok(reminders)
    }

    /// Delete read notifications created before `before`.
    pub fn purge_read_notifications(&self, before: DateTime<Utc>) -> Result<usize> {
        let changed = self.conn().execute(
            "DELETE FROM notifications WHERE read = 1 AND created_at < ?1",
            [fmt_ts(before)],
        )?;
        Ok(changed)
    }
}
