use rusqlite::{params, Connection, OptionalExtension, Row};
use uuid::Uuid;

use super::{enum_error, now_ts, parse_ts, parse_uuid, Database};
use crate::error::{Result, StoreError};
use crate::models::*;

const NOTIFICATION_COLUMNS: &str = "id, user_id, kind, title, body, link, read, created_at";

const NOTIFICATIONS_DEFAULT_LIMIT: u32 = 50;
const NOTIFICATIONS_LIMIT_MAX: u32 = 200;

fn row_to_notification(row: &Row<'_>) -> rusqlite::Result<Notification> {
    let id: String = row.get(0)?;
    let kind: String = row.get(2)?;
    let created_at: String = row.get(7)?;
    Ok(Notification {
        id: parse_uuid(0, &id)?,
        user_id: row.get(1)?,
        kind: NotificationKind::from_str(&kind).ok_or_else(|| enum_error(2, &kind))?,
        title: row.get(3)?,
        body: row.get(4)?,
        link: row.get(5)?,
        read: row.get(6)?,
        created_at: parse_ts(7, &created_at)?,
    })
}

/// Insert inside an existing transaction.
pub(crate) fn insert_notification(conn: &Connection, input: &CreateNotificationInput) -> Result<Notification> {
    if input.title.trim().is_empty() {
        return Err(StoreError::invalid("notification title is required"));
    }
    let id = Uuid::new_v4();
    conn.execute(
        "INSERT INTO notifications (id, user_id, kind, title, body, link, read, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, 0, ?7)",
        params![
            id.to_string(),
            input.user_id,
            input.kind.as_str(),
            input.title.trim(),
            input.body,
            input.link,
            now_ts()
        ],
    )?;
    let notification = conn.query_row(
        &format!("SELECT {NOTIFICATION_COLUMNS} FROM notifications WHERE id = ?1"),
        [id.to_string()],
        row_to_notification,
    )?;
    Ok(notification)
}

impl Database {
    pub fn create_notification(&self, input: CreateNotificationInput) -> Result<Notification> {
        insert_notification(&self.conn(), &input)
    }

    /// Newest first.
    pub fn list_notifications(&self, user_id: &str, unread_only: bool, limit: Option<u32>) -> Result<Vec<Notification>> {
        let limit = limit
            .unwrap_or(NOTIFICATIONS_DEFAULT_LIMIT)
            .clamp(1, NOTIFICATIONS_LIMIT_MAX);
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {NOTIFICATION_COLUMNS} FROM notifications
             WHERE user_id = ?1 AND (?2 = 0 OR read = 0)
             ORDER BY created_at DESC
             LIMIT ?3"
        ))?;
        let notifications = stmt
            .query_map(params![user_id, unread_only, limit], row_to_notification)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(notifications)
    }

    pub fn unread_count(&self, user_id: &str) -> Result<u64> {
        let count: i64 = self.conn().query_row(
            "SELECT COUNT(*) FROM notifications WHERE user_id = ?1 AND read = 0",
            [user_id],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    pub fn mark_read(&self, user_id: &str, id: Uuid) -> Result<Option<Notification>> {
        let conn = self.conn();
        let changed = conn.execute(
            "UPDATE notifications SET read = 1 WHERE id = ?1 AND user_id = ?2",
            params![id.to_string(), user_id],
        )?;
        if changed == 0 {
            return Ok(None);
        }
        let notification = conn
            .query_row(
                &format!("SELECT {NOTIFICATION_COLUMNS} FROM notifications WHERE id = ?1"),
                [id.to_string()],
                row_to_notification,
            )
            .optional()?;
        Ok(notification)
    }

    /// Returns how many notifications were flipped to read.
    pub fn mark_all_read(&self, user_id: &str) -> Result<u64> {
        let changed = self.conn().execute(
            "UPDATE notifications SET read = 1 WHERE user_id = ?1 AND read = 0",
            [user_id],
        )?;
        Ok(changed as u64)
    }

    pub fn delete_notification(&self, user_id: &str, id: Uuid) -> Result<bool> {
        let changed = self.conn().execute(
            "DELETE FROM notifications WHERE id = ?1 AND user_id = ?2",
            params![id.to_string(), user_id],
        )?;
        Ok(changed > 0)
    }
}
