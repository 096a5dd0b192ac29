use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AiUsage {
    pub user_id: String,
    pub daily_count: u32,
    pub monthly_count: u32,
    pub total_count: u64,
    pub last_daily_reset: NaiveDate,
    /// `YYYY-MM` of the month the monthly counter belongs to.
    pub last_monthly_reset: String,
    pub updated_at: DateTime<Utc>,
}

impl AiUsage {
    pub fn fresh(user_id: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            user_id: user_id.into(),
            daily_count: 0,
            monthly_count: 0,
            total_count: 0,
            last_daily_reset: now.date_naive(),
            last_monthly_reset: month_key(now.date_naive()),
            updated_at: now,
        }
    }
}

pub fn month_key(date: NaiveDate) -> String {
    date.format("%Y-%m").to_string()
}
