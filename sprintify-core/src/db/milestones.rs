use rusqlite::{params, Connection, OptionalExtension, Row};
use uuid::Uuid;

use super::sprints::{load_sprint, refresh_stats};
use super::{fmt_date, now_ts, parse_json, parse_opt_date, parse_opt_ts, parse_ts, parse_uuid, Database};
use crate::error::{Result, StoreError};
use crate::models::*;

const MILESTONE_COLUMNS: &str =
    "id, sprint_id, title, description, target_date, criteria, completed, completed_at, created_at, updated_at";

fn row_to_milestone(row: &Row<'_>) -> rusqlite::Result<Milestone> {
    let id: String = row.get(0)?;
    let sprint_id: String = row.get(1)?;
    let criteria: String = row.get(5)?;
    let created_at: String = row.get(8)?;
    let updated_at: String = row.get(9)?;
    Ok(Milestone {
        id: parse_uuid(0, &id)?,
        sprint_id: parse_uuid(1, &sprint_id)?,
        title: row.get(2)?,
        description: row.get(3)?,
        target_date: parse_opt_date(4, row.get(4)?)?,
        criteria: parse_json(5, &criteria)?,
        completed: row.get(6)?,
        completed_at: parse_opt_ts(7, row.get(7)?)?,
        created_at: parse_ts(8, &created_at)?,
        updated_at: parse_ts(9, &updated_at)?,
    })
}

pub(crate) fn load_milestones(conn: &Connection, sprint_id: Uuid) -> Result<Vec<Milestone>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {MILESTONE_COLUMNS} FROM milestones WHERE sprint_id = ?1
         ORDER BY target_date IS NULL, target_date, created_at"
    ))?;
    let milestones = stmt
        .query_map([sprint_id.to_string()], row_to_milestone)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(milestones)
}

fn load_milestone(conn: &Connection, sprint_id: Uuid, id: Uuid) -> Result<Option<Milestone>> {
    let milestone = conn
        .query_row(
            &format!("SELECT {MILESTONE_COLUMNS} FROM milestones WHERE id = ?1 AND sprint_id = ?2"),
            params![id.to_string(), sprint_id.to_string()],
            row_to_milestone,
        )
        .optional()?;
    Ok(milestone)
}

fn clean_criteria(criteria: Vec<String>) -> Vec<String> {
    criteria
        .into_iter()
        .map(|c| c.trim().to_string())
        .filter(|c| !c.is_empty())
        .collect()
}

pub(crate) fn normalize_milestone_title(title: &str) -> Result<String> {
    let title = title.trim();
    if title.is_empty() {
        return Err(StoreError::invalid("milestone title is required"));
    }
    if title.chars().count() > MILESTONE_TITLE_MAX_CHARS {
        return Err(StoreError::invalid(format!(
            "milestone title must be at most {MILESTONE_TITLE_MAX_CHARS} characters"
        )));
    }
    Ok(title.to_string())
}

pub(crate) fn insert_milestone(conn: &Connection, sprint_id: Uuid, input: CreateMilestoneInput) -> Result<Milestone> {
    let title = normalize_milestone_title(&input.title)?;
    let id = Uuid::new_v4();
    let now = now_ts();
    conn.execute(
        "INSERT INTO milestones (id, sprint_id, title, description, target_date, criteria, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)",
        params![
            id.to_string(),
            sprint_id.to_string(),
            title,
            input.description,
            input.target_date.map(fmt_date),
            serde_json::to_string(&clean_criteria(input.criteria))?,
            now
        ],
    )?;
    load_milestone(conn, sprint_id, id)?.ok_or_else(|| StoreError::not_found("milestone not found"))
}

impl Database {
    pub fn list_milestones(&self, user_id: &str, sprint_id: Uuid) -> Result<Option<Vec<Milestone>>> {
        let conn = self.conn();
        if load_sprint(&conn, user_id, sprint_id)?.is_none() {
            return Ok(None);
        }
        load_milestones(&conn, sprint_id).map(Some)
    }

    pub fn create_milestone(
        &self,
        user_id: &str,
        sprint_id: Uuid,
        input: CreateMilestoneInput,
    ) -> Result<Option<Milestone>> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        if load_sprint(&tx, user_id, sprint_id)?.is_none() {
            return Ok(None);
        }
        let milestone = insert_milestone(&tx, sprint_id, input)?;
        refresh_stats(&tx, sprint_id)?;
        tx.commit()?;
        Ok(Some(milestone))
    }

    pub fn update_milestone(
        &self,
        user_id: &str,
        sprint_id: Uuid,
        id: Uuid,
        input: UpdateMilestoneInput,
    ) -> Result<Option<Milestone>> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        if load_sprint(&tx, user_id, sprint_id)?.is_none() {
            return Ok(None);
        }
        let Some(existing) = load_milestone(&tx, sprint_id, id)? else {
            return Ok(None);
        };

        let title = match input.title {
            Some(t) => normalize_milestone_title(&t)?,
            None => existing.title,
        };
        let criteria = input.criteria.map(clean_criteria).unwrap_or(existing.criteria);
        let completed = input.completed.unwrap_or(existing.completed);
        let completed_at = match (existing.completed, completed) {
            (true, true) => existing.completed_at.map(super::fmt_ts),
            (false, true) => Some(now_ts()),
            _ => None,
        };

        tx.execute(
            "UPDATE milestones SET title = ?3, description = ?4, target_date = ?5, criteria = ?6,
                 completed = ?7, completed_at = ?8, updated_at = ?9
             WHERE id = ?1 AND sprint_id = ?2",
            params![
                id.to_string(),
                sprint_id.to_string(),
                title,
                input.description.unwrap_or(existing.description),
                input.target_date.unwrap_or(existing.target_date).map(fmt_date),
                serde_json::to_string(&criteria)?,
                completed,
                completed_at,
                now_ts()
            ],
        )?;
        refresh_stats(&tx, sprint_id)?;
        let milestone = load_milestone(&tx, sprint_id, id)?;
        tx.commit()?;
        Ok(milestone)
    }

    pub fn set_milestone_completed(
        &self,
        user_id: &str,
        sprint_id: Uuid,
        id: Uuid,
        completed: bool,
    ) -> Result<Option<Milestone>> {
        self.update_milestone(
            user_id,
            sprint_id,
            id,
            UpdateMilestoneInput {
                completed: Some(completed),
                ..Default::default()
            },
        )
    }

    pub fn delete_milestone(&self, user_id: &str, sprint_id: Uuid, id: Uuid) -> Result<bool> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        if load_sprint(&tx, user_id, sprint_id)?.is_none() {
            return Ok(false);
        }
        let changed = tx.execute(
            "DELETE FROM milestones WHERE id = ?1 AND sprint_id = ?2",
            params![id.to_string(), sprint_id.to_string()],
        )?;
        if changed > 0 {
            refresh_stats(&tx, sprint_id)?;
        }
        tx.commit()?;
        Ok(changed > 0)
    }
}
