//! AI usage quota rules.
//!
//! Counters are reset lazily: whenever a usage record is read, a stale daily
//! or monthly window is zeroed before the limit is checked. The nightly job
//! performs the same reset in bulk so that idle accounts read back clean.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::{month_key, AiUsage, Role};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct QuotaLimits {
    /// `None` means unlimited.
    pub daily: Option<u32>,
    pub monthly: Option<u32>,
}

impl QuotaLimits {
    pub const UNLIMITED: QuotaLimits = QuotaLimits {
        daily: None,
        monthly: None,
    };

    pub fn new(daily: u32, monthly: u32) -> Self {
        Self {
            daily: Some(daily),
            monthly: Some(monthly),
        }
    }
}

/// Per-role limits.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct QuotaPolicy {
    pub normal: QuotaLimits,
    pub premium: QuotaLimits,
    pub admin: QuotaLimits,
}

impl QuotaPolicy {
    pub fn limits_for(&self, role: Role) -> QuotaLimits {
        match role {
            Role::Normal => self.normal,
            Role::Premium => self.premium,
            Role::Admin => self.admin,
        }
    }
}

impl Default for QuotaPolicy {
    fn default() -> Self {
        Self {
            normal: QuotaLimits::new(5, 50),
            premium: QuotaLimits::new(50, 1000),
            admin: QuotaLimits::UNLIMITED,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum QuotaScope {
    Daily,
    Monthly,
}

impl std::fmt::Display for QuotaScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Daily => f.write_str("daily"),
            Self::Monthly => f.write_str("monthly"),
        }
    }
}

#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
#[error("{scope} AI quota exhausted ({used}/{limit})")]
pub struct QuotaExceeded {
    pub scope: QuotaScope,
    pub used: u32,
    pub limit: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WindowStatus {
    pub used: u32,
    pub limit: Option<u32>,
    pub remaining: Option<u32>,
}

impl WindowStatus {
    fn new(used: u32, limit: Option<u32>) -> Self {
        Self {
            used,
            limit,
            remaining: limit.map(|l| l.saturating_sub(used)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct QuotaStatus {
    pub daily: WindowStatus,
    pub monthly: WindowStatus,
    pub total: u64,
}

/// Zero any counter whose window has rolled over. Returns true if the record changed.
pub fn normalize(usage: &mut AiUsage, now: DateTime<Utc>) -> bool {
    let today = now.date_naive();
    let month = month_key(today);
    let mut changed = false;

    if usage.last_daily_reset != today {
        usage.daily_count = 0;
        usage.last_daily_reset = today;
        changed = true;
    }
    if usage.last_monthly_reset != month {
        usage.monthly_count = 0;
        usage.last_monthly_reset = month;
        changed = true;
    }
    if changed {
        usage.updated_at = now;
    }
    changed
}

/// Check a normalized record against limits. One more call must fit in both windows.
pub fn check(usage: &AiUsage, limits: QuotaLimits) -> Result<QuotaStatus, QuotaExceeded> {
    if let Some(limit) = limits.daily {
        if usage.daily_count >= limit {
            return Err(QuotaExceeded {
                scope: QuotaScope::Daily,
                used: usage.daily_count,
                limit,
            });
        }
    }
    if let Some(limit) = limits.monthly {
        if usage.monthly_count >= limit {
            return Err(QuotaExceeded {
                scope: QuotaScope::Monthly,
                used: usage.monthly_count,
                limit,
            });
        }
    }
    Ok(status(usage, limits))
}

pub fn status(usage: &AiUsage, limits: QuotaLimits) -> QuotaStatus {
    QuotaStatus {
        daily: WindowStatus::new(usage.daily_count, limits.daily),
        monthly: WindowStatus::new(usage.monthly_count, limits.monthly),
        total: usage.total_count,
    }
}

pub fn increment(usage: &mut AiUsage, now: DateTime<Utc>) {
    usage.daily_count = usage.daily_count.saturating_add(1);
    usage.monthly_count = usage.monthly_count.saturating_add(1);
    usage.total_count = usage.total_count.saturating_add(1);
    usage.updated_at = now;
}
