use rusqlite::{params, Connection, OptionalExtension, Row};
use uuid::Uuid;

use super::notifications::insert_notification;
use super::users::load_user;
use super::{enum_error, is_unique_violation, now_ts, parse_opt_ts, parse_ts, parse_uuid, Database};
use crate::error::{Result, StoreError};
use crate::models::*;

const UPGRADE_COLUMNS: &str = "id, user_id, reason, status, admin_note, reviewed_by, created_at, reviewed_at";

const REASON_MAX_CHARS: usize = 500;

fn row_to_request(row: &Row<'_>) -> rusqlite::Result<UpgradeRequest> {
    let id: String = row.get(0)?;
    let status: String = row.get(3)?;
    let created_at: String = row.get(6)?;
    Ok(UpgradeRequest {
        id: parse_uuid(0, &id)?,
        user_id: row.get(1)?,
        reason: row.get(2)?,
        status: UpgradeStatus::from_str(&status).ok_or_else(|| enum_error(3, &status))?,
        admin_note: row.get(4)?,
        reviewed_by: row.get(5)?,
        created_at: parse_ts(6, &created_at)?,
        reviewed_at: parse_opt_ts(7, row.get(7)?)?,
    })
}

fn load_request(conn: &Connection, id: Uuid) -> Result<Option<UpgradeRequest>> {
    let request = conn
        .query_row(
            &format!("SELECT {UPGRADE_COLUMNS} FROM upgrade_requests WHERE id = ?1"),
            [id.to_string()],
            row_to_request,
        )
        .optional()?;
    Ok(request)
}

fn clean_note(note: Option<String>) -> Option<String> {
    note.map(|n| n.trim().to_string()).filter(|n| !n.is_empty())
}

impl Database {
    pub fn create_upgrade_request(&self, user_id: &str, input: CreateUpgradeRequestInput) -> Result<UpgradeRequest> {
        let reason = clean_note(input.reason);
        if reason.as_ref().is_some_and(|r| r.chars().count() > REASON_MAX_CHARS) {
            return Err(StoreError::invalid(format!(
                "reason must be at most {REASON_MAX_CHARS} characters"
            )));
        }

        let mut conn = self.conn();
        let tx = conn.transaction()?;
        let user = load_user(&tx, user_id)?.ok_or_else(|| StoreError::not_found("user not found"))?;
        if user.role.at_least(Role::Premium) {
            return Err(StoreError::conflict("account already has premium access"));
        }

        let id = Uuid::new_v4();
        let inserted = tx.execute(
            "INSERT INTO upgrade_requests (id, user_id, reason, status, created_at)
             VALUES (?1, ?2, ?3, 'pending', ?4)",
            params![id.to_string(), user_id, reason, now_ts()],
        );
        match inserted {
            Ok(_) => {}
            Err(e) if is_unique_violation(&e) => {
                return Err(StoreError::conflict("an upgrade request is already pending"));
            }
            Err(e) => return Err(e.into()),
        }

        let request = load_request(&tx, id)?.ok_or_else(|| StoreError::not_found("request not found"))?;
        tx.commit()?;
        tracing::info!(request_id = %id, user_id, "upgrade requested");
        Ok(request)
    }

    pub fn get_upgrade_request(&self, id: Uuid) -> Result<Option<UpgradeRequest>> {
        load_request(&self.conn(), id)
    }

    /// Oldest first so that reviewers work the queue in order.
    pub fn list_upgrade_requests(&self, status: Option<UpgradeStatus>) -> Result<Vec<UpgradeRequest>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {UPGRADE_COLUMNS} FROM upgrade_requests
             WHERE ?1 IS NULL OR status = ?1
             ORDER BY created_at"
        ))?;
        let requests = stmt
            .query_map([status.map(|s| s.as_str())], row_to_request)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(requests)
    }

    pub fn list_user_upgrade_requests(&self, user_id: &str) -> Result<Vec<UpgradeRequest>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {UPGRADE_COLUMNS} FROM upgrade_requests WHERE user_id = ?1 ORDER BY created_at DESC"
        ))?;
        let requests = stmt
            .query_map([user_id], row_to_request)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(requests)
    }

    /// Approve a pending request: mark it, grant premium and notify, all in one transaction.
    pub fn approve_upgrade_request(&self, id: Uuid, admin_uid: &str, note: Option<String>) -> Result<Option<UpgradeReview>> {
        self.review_upgrade_request(id, admin_uid, clean_note(note), UpgradeStatus::Approved)
    }

    pub fn reject_upgrade_request(&self, id: Uuid, admin_uid: &str, note: Option<String>) -> Result<Option<UpgradeReview>> {
        self.review_upgrade_request(id, admin_uid, clean_note(note), UpgradeStatus::Rejected)
    }

    fn review_upgrade_request(
        &self,
        id: Uuid,
        admin_uid: &str,
        note: Option<String>,
        outcome: UpgradeStatus,
    ) -> Result<Option<UpgradeReview>> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        let Some(request) = load_request(&tx, id)? else {
            return Ok(None);
        };
        if request.status != UpgradeStatus::Pending {
            return Err(StoreError::conflict(format!(
                "request was already {}",
                request.status.as_str()
            )));
        }

        let now = now_ts();
        tx.execute(
            "UPDATE upgrade_requests SET status = ?2, admin_note = ?3, reviewed_by = ?4, reviewed_at = ?5
             WHERE id = ?1",
            params![id.to_string(), outcome.as_str(), note, admin_uid, now],
        )?;

        let notification = match outcome {
            UpgradeStatus::Approved => {
                // Never downgrade someone who became admin in the meantime.
                tx.execute(
                    "UPDATE users SET role = 'premium', updated_at = ?2 WHERE uid = ?1 AND role = 'normal'",
                    params![request.user_id, now],
                )?;
                let body = match &note {
                    Some(n) => format!("Your account has been upgraded to premium. Note: {n}"),
                    None => "Your account has been upgraded to premium.".to_string(),
                };
                CreateNotificationInput::new(&request.user_id, NotificationKind::Upgrade, "Upgrade approved", body)
            }
            _ => {
                let body = match &note {
                    Some(n) => format!("Your upgrade request was declined. Reason: {n}"),
                    None => "Your upgrade request was declined.".to_string(),
                };
                CreateNotificationInput::new(&request.user_id, NotificationKind::Upgrade, "Upgrade declined", body)
            }
        };
        let notification = insert_notification(&tx, &notification.with_link("/upgrade"))?;

        let request = load_request(&tx, id)?.ok_or_else(|| StoreError::not_found("request not found"))?;
        tx.commit()?;

        tracing::info!(
            request_id = %id,
            user_id = %request.user_id,
            reviewer = admin_uid,
            outcome = outcome.as_str(),
            "upgrade request reviewed"
        );
        Ok(Some(UpgradeReview { request, notification }))
    }
}
