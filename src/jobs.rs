//! Scheduled maintenance: a daily run at 01:00 UTC and an hourly run.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Datelike, Days, NaiveTime, TimeZone, Utc};
use serde::Serialize;
use sprintify_core::Database;
use tokio::task::JoinHandle;
use tokio::time::interval;
use tracing::{error, info};

use crate::push::{self, PushSender};

pub const DAILY_RUN_HOUR: u32 = 1;
pub const READ_NOTIFICATION_RETENTION_DAYS: u64 = 30;
const HOURLY_PERIOD: Duration = Duration::from_secs(60 * 60);

#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct DailyReport {
    pub daily_counters_reset: usize,
    pub monthly_counters_reset: usize,
    pub sprints_expired: usize,
    pub notifications_purged: usize,
}

#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct HourlyReport {
    pub stats_recomputed: usize,
    pub reminders_sent: usize,
}

/// Log a failed step and carry on with the rest of the run.
fn step<T: Default>(name: &str, result: sprintify_core::Result<T>) -> T {
    result.unwrap_or_else(|e| {
        error!(step = name, error = %e, "maintenance step failed");
        T::default()
    })
}

pub async fn run_daily(db: &Database, push: &dyn PushSender, now: DateTime<Utc>) -> DailyReport {
    let today = now.date_naive();
    let mut report = DailyReport {
        daily_counters_reset: step("reset daily AI counters", db.reset_daily_ai_counters(today)),
        ..Default::default()
    };

    if today.day() == 1 {
        report.monthly_counters_reset =
            step("reset monthly AI counters", db.reset_monthly_ai_counters(today));
    }

    let expired = step("expire sprints", db.expire_sprints(today));
    report.sprints_expired = expired.len();
    for closed in &expired {
        push::deliver(db, push, &closed.notification).await;
    }

    let cutoff = now
        .checked_sub_days(Days::new(READ_NOTIFICATION_RETENTION_DAYS))
        .unwrap_or(now);
    report.notifications_purged = step(
        "purge read notifications",
        db.purge_read_notifications(cutoff),
    );

    info!(
        daily_reset = report.daily_counters_reset,
        monthly_reset = report.monthly_counters_reset,
        expired = report.sprints_expired,
        purged = report.notifications_purged,
        "daily maintenance finished"
    );
    report
}

pub async fn run_hourly(db: &Database, push: &dyn PushSender, now: DateTime<Utc>) -> HourlyReport {
    let stats_recomputed = step("recompute sprint stats", db.recompute_all_open_stats());

    let reminders = step("deadline reminders", db.send_deadline_reminders(now));
    for reminder in &reminders {
        push::deliver(db, push, &reminder.notification).await;
    }

    let report = HourlyReport {
        stats_recomputed,
        reminders_sent: reminders.len(),
    };
    info!(
        recomputed = report.stats_recomputed,
        reminders = report.reminders_sent,
        "hourly maintenance finished"
    );
    report
}

/// The first 01:00 UTC strictly after `now`.
pub fn next_daily_run(now: DateTime<Utc>) -> DateTime<Utc> {
    let run_time = NaiveTime::from_hms_opt(DAILY_RUN_HOUR, 0, 0).unwrap_or_default();
    let today_run = Utc.from_utc_datetime(&now.date_naive().and_time(run_time));
    if today_run > now {
        today_run
    } else {
        today_run
            .checked_add_days(Days::new(1))
            .unwrap_or(today_run)
    }
}

/// Background runner for both maintenance jobs.
pub struct Scheduler {
    db: Database,
    push: Arc<dyn PushSender>,
}

impl Scheduler {
    pub fn new(db: Database, push: Arc<dyn PushSender>) -> Self {
        Self { db, push }
    }

    pub fn spawn(self) -> Vec<JoinHandle<()>> {
        let daily = {
            let db = self.db.clone();
            let push = self.push.clone();
            tokio::spawn(async move {
                info!("daily maintenance scheduled for {DAILY_RUN_HOUR:02}:00 UTC");
                loop {
                    let now = Utc::now();
                    let next = next_daily_run(now);
                    let wait = (next - now).to_std().unwrap_or(Duration::from_secs(60));
                    tokio::time::sleep(wait).await;
                    run_daily(&db, push.as_ref(), Utc::now()).await;
                }
            })
        };

        let hourly = tokio::spawn(async move {
            let mut ticker = interval(HOURLY_PERIOD);
            loop {
                ticker.tick().await;
                run_hourly(&self.db, self.push.as_ref(), Utc::now()).await;
            }
        });

        vec![daily, hourly]
    }
}
