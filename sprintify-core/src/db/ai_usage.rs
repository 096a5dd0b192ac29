use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row, TransactionBehavior};

use super::{fmt_date, fmt_ts, parse_date, parse_ts, Database};
use crate::error::Result;
use crate::models::AiUsage;
use crate::quota::{self, QuotaLimits, QuotaStatus};

fn row_to_usage(row: &Row<'_>) -> rusqlite::Result<AiUsage> {
    let last_daily_reset: String = row.get(4)?;
    let updated_at: String = row.get(6)?;
    Ok(AiUsage {
        user_id: row.get(0)?,
        daily_count: row.get(1)?,
        monthly_count: row.get(2)?,
        total_count: row.get::<_, i64>(3)?.max(0) as u64,
        last_daily_reset: parse_date(4, &last_daily_reset)?,
        last_monthly_reset: row.get(5)?,
        updated_at: parse_ts(6, &updated_at)?,
    })
}

/// Read the user's record with stale windows already zeroed (not yet persisted).
fn load_normalized(conn: &Connection, user_id: &str, now: DateTime<Utc>) -> Result<(AiUsage, bool)> {
    let stored = conn
        .query_row(
            "SELECT user_id, daily_count, monthly_count, total_count, last_daily_reset, last_monthly_reset, updated_at
             FROM ai_usage WHERE user_id = ?1",
            [user_id],
            row_to_usage,
        )
        .optional()?;

    Ok(match stored {
        Some(mut usage) => {
            let changed = quota::normalize(&mut usage, now);
            (usage, changed)
        }
        None => (AiUsage::fresh(user_id, now), true),
    })
}

fn save(conn: &Connection, usage: &AiUsage) -> Result<()> {
    conn.execute(
        "INSERT INTO ai_usage (user_id, daily_count, monthly_count, total_count, last_daily_reset, last_monthly_reset, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
         ON CONFLICT(user_id) DO UPDATE SET
             daily_count = excluded.daily_count,
             monthly_count = excluded.monthly_count,
             total_count = excluded.total_count,
             last_daily_reset = excluded.last_daily_reset,
             last_monthly_reset = excluded.last_monthly_reset,
             updated_at = excluded.updated_at",
        params![
            usage.user_id,
            usage.daily_count,
            usage.monthly_count,
            usage.total_count as i64,
            fmt_date(usage.last_daily_reset),
            usage.last_monthly_reset,
            fmt_ts(usage.updated_at)
        ],
    )?;
    Ok(())
}

impl Database {
    /// Current usage, resetting stale counters on read.
    pub fn get_ai_usage(&self, user_id: &str, now: DateTime<Utc>) -> Result<AiUsage> {
        let conn = self.conn();
        let (usage, changed) = load_normalized(&conn, user_id, now)?;
        if changed {
            save(&conn, &usage)?;
        }
        Ok(usage)
    }

    /// Fails with `StoreError::QuotaExceeded` when one more call would not fit.
    pub fn check_ai_quota(&self, user_id: &str, limits: QuotaLimits, now: DateTime<Utc>) -> Result<QuotaStatus> {
        let usage = self.get_ai_usage(user_id, now)?;
        Ok(quota::check(&usage, limits)?)
    }

    /// Count one AI call. The limit is re-checked inside the transaction so that
    /// concurrent requests cannot overshoot it.
    pub fn record_ai_usage(&self, user_id: &str, limits: QuotaLimits, now: DateTime<Utc>) -> Result<QuotaStatus> {
        let mut conn = self.conn();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let (mut usage, _) = load_normalized(&tx, user_id, now)?;
        quota::check(&usage, limits)?;
        quota::increment(&mut usage, now);
        save(&tx, &usage)?;
        tx.commit()?;

        tracing::debug!(
            user_id,
            daily = usage.daily_count,
            monthly = usage.monthly_count,
            "AI usage recorded"
        );
        Ok(quota::status(&usage, limits))
    }
}
