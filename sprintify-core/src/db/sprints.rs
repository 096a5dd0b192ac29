use chrono::NaiveDate;
use rusqlite::{params, Connection, OptionalExtension, Row};
use uuid::Uuid;

use super::milestones::{insert_milestone, load_milestones, normalize_milestone_title};
use super::tasks::{check_hours, insert_task, load_tasks, normalize_task_title};
use super::{enum_error, fmt_date, is_unique_violation, now_ts, parse_date, parse_ts, parse_uuid, Database};
use crate::error::{Result, StoreError};
use crate::models::*;

pub(crate) const SPRINT_COLUMNS: &str = "id, user_id, title, description, goal, status, start_date, end_date, \
     total_tasks, completed_tasks, total_milestones, completed_milestones, progress, ai_generated, created_at, updated_at";

const TITLE_MAX_CHARS: usize = SPRINT_TITLE_MAX_CHARS;

pub(crate) fn row_to_sprint(row: &Row<'_>) -> rusqlite::Result<Sprint> {
    let id: String = row.get(0)?;
    let status: String = row.get(5)?;
    let start_date: String = row.get(6)?;
    let end_date: String = row.get(7)?;
    let created_at: String = row.get(14)?;
    let updated_at: String = row.get(15)?;
    Ok(Sprint {
        id: parse_uuid(0, &id)?,
        user_id: row.get(1)?,
        title: row.get(2)?,
        description: row.get(3)?,
        goal: row.get(4)?,
        status: SprintStatus::from_str(&status).ok_or_else(|| enum_error(5, &status))?,
        start_date: parse_date(6, &start_date)?,
        end_date: parse_date(7, &end_date)?,
        stats: SprintStats {
            total_tasks: row.get(8)?,
            completed_tasks: row.get(9)?,
            total_milestones: row.get(10)?,
            completed_milestones: row.get(11)?,
            progress: row.get(12)?,
        },
        ai_generated: row.get(13)?,
        created_at: parse_ts(14, &created_at)?,
        updated_at: parse_ts(15, &updated_at)?,
    })
}

/// Load a sprint owned by `user_id`.
pub(crate) fn load_sprint(conn: &Connection, user_id: &str, id: Uuid) -> Result<Option<Sprint>> {
    let sprint = conn
        .query_row(
            &format!("SELECT {SPRINT_COLUMNS} FROM sprints WHERE id = ?1 AND user_id = ?2"),
            params![id.to_string(), user_id],
            row_to_sprint,
        )
        .optional()?;
    Ok(sprint)
}

pub(crate) fn load_sprint_by_id(conn: &Connection, id: Uuid) -> Result<Option<Sprint>> {
    let sprint = conn
        .query_row(
            &format!("SELECT {SPRINT_COLUMNS} FROM sprints WHERE id = ?1"),
            [id.to_string()],
            row_to_sprint,
        )
        .optional()?;
    Ok(sprint)
}

/// Recount tasks and milestones. The sprint row is only written when the counts moved.
pub(crate) fn refresh_stats(conn: &Connection, sprint_id: Uuid) -> Result<SprintStats> {
    let id = sprint_id.to_string();
    let (total_tasks, completed_tasks): (u32, u32) = conn.query_row(
        "SELECT COUNT(*), COALESCE(SUM(status = 'done'), 0) FROM tasks WHERE sprint_id = ?1",
        [&id],
        |row| Ok((row.get(0)?, row.get(1)?)),
    )?;
    let (total_milestones, completed_milestones): (u32, u32) = conn.query_row(
        "SELECT COUNT(*), COALESCE(SUM(completed), 0) FROM milestones WHERE sprint_id = ?1",
        [&id],
        |row| Ok((row.get(0)?, row.get(1)?)),
    )?;
    let stats = SprintStats::compute(total_tasks, completed_tasks, total_milestones, completed_milestones);

    conn.execute(
        "UPDATE sprints SET total_tasks = ?2, completed_tasks = ?3, total_milestones = ?4,
             completed_milestones = ?5, progress = ?6, updated_at = ?7
         WHERE id = ?1
           AND (total_tasks != ?2 OR completed_tasks != ?3 OR total_milestones != ?4
                OR completed_milestones != ?5 OR progress != ?6)",
        params![
            id,
            stats.total_tasks,
            stats.completed_tasks,
            stats.total_milestones,
            stats.completed_milestones,
            stats.progress,
            now_ts()
        ],
    )?;
    Ok(stats)
}

fn normalize_title(title: &str) -> Result<String> {
    let title = title.trim();
    if title.is_empty() {
        return Err(StoreError::invalid("sprint title is required"));
    }
    if title.chars().count() > TITLE_MAX_CHARS {
        return Err(StoreError::invalid(format!(
            "sprint title must be at most {TITLE_MAX_CHARS} characters"
        )));
    }
    Ok(title.to_string())
}

/// Check everything `create_sprint` checks that does not need the database.
pub fn validate_new_sprint(input: &CreateSprintInput) -> Result<()> {
    normalize_title(&input.title)?;
    check_dates(input.start_date, input.end_date)?;
    if !matches!(
        input.status.unwrap_or(SprintStatus::Draft),
        SprintStatus::Draft | SprintStatus::Active
    ) {
        return Err(StoreError::invalid("a new sprint must start as draft or active"));
    }
    if input.tasks.iter().any(|t| !t.depends_on.is_empty()) {
        return Err(StoreError::invalid(
            "initial tasks cannot declare dependencies; add them after creation",
        ));
    }
    for task in &input.tasks {
        normalize_task_title(&task.title)?;
        check_hours(task.estimated_hours)?;
    }
    for milestone in &input.milestones {
        normalize_milestone_title(&milestone.title)?;
    }
    Ok(())
}

fn title_key(title: &str) -> String {
    title.trim().to_lowercase()
}

fn title_taken(conn: &Connection, user_id: &str, title: &str, except: Option<Uuid>) -> Result<bool> {
    let except = except.map(|id| id.to_string()).unwrap_or_default();
    let taken = conn
        .query_row(
            "SELECT 1 FROM sprints WHERE user_id = ?1 AND title_key = ?2 AND id != ?3",
            params![user_id, title_key(title), except],
            |_| Ok(()),
        )
        .optional()?
        .is_some();
    Ok(taken)
}

fn check_dates(start: NaiveDate, end: NaiveDate) -> Result<()> {
    if end < start {
        return Err(StoreError::invalid("end date must not be before start date"));
    }
    Ok(())
}

fn map_title_conflict(e: rusqlite::Error) -> StoreError {
    if is_unique_violation(&e) {
        StoreError::conflict("a sprint with this title already exists")
    } else {
        e.into()
    }
}

impl Database {
    /// Create a sprint with its initial tasks and milestones in one transaction.
    pub fn create_sprint(&self, user_id: &str, input: CreateSprintInput) -> Result<Sprint> {
        validate_new_sprint(&input)?;
        let title = normalize_title(&input.title)?;
        let status = input.status.unwrap_or(SprintStatus::Draft);

        let mut conn = self.conn();
        let tx = conn.transaction()?;

        if title_taken(&tx, user_id, &title, None)? {
            return Err(StoreError::conflict("a sprint with this title already exists"));
        }

        let id = Uuid::new_v4();
        let now = now_ts();
        tx.execute(
            "INSERT INTO sprints (id, user_id, title, title_key, description, goal, status, start_date, end_date,
                                  ai_generated, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?11)",
            params![
                id.to_string(),
                user_id,
                title,
                title_key(&title),
                input.description,
                input.goal,
                status.as_str(),
                fmt_date(input.start_date),
                fmt_date(input.end_date),
                input.ai_generated,
                now
            ],
        )
        .map_err(map_title_conflict)?;

        for (position, task) in input.tasks.into_iter().enumerate() {
            insert_task(&tx, id, task, position as i64)?;
        }
        for milestone in input.milestones {
            insert_milestone(&tx, id, milestone)?;
        }
        refresh_stats(&tx, id)?;

        let sprint = load_sprint(&tx, user_id, id)?
            .ok_or_else(|| StoreError::not_found("sprint not found"))?;
        tx.commit()?;

        tracing::info!(
            sprint_id = %sprint.id,
            user_id,
            tasks = sprint.stats.total_tasks,
            milestones = sprint.stats.total_milestones,
            "sprint created"
        );
        Ok(sprint)
    }

    pub fn get_sprint(&self, user_id: &str, id: Uuid) -> Result<Option<Sprint>> {
        load_sprint(&self.conn(), user_id, id)
    }

    pub fn get_sprint_detail(&self, user_id: &str, id: Uuid) -> Result<Option<SprintDetail>> {
        let conn = self.conn();
        let Some(sprint) = load_sprint(&conn, user_id, id)? else {
            return Ok(None);
        };
        let tasks = load_tasks(&conn, id)?;
        let milestones = load_milestones(&conn, id)?;
        Ok(Some(SprintDetail {
            sprint,
            tasks,
            milestones,
        }))
    }

    pub fn list_sprints(&self, user_id: &str, status: Option<SprintStatus>) -> Result<Vec<Sprint>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {SPRINT_COLUMNS} FROM sprints
             WHERE user_id = ?1 AND (?2 IS NULL OR status = ?2)
             ORDER BY created_at DESC"
        ))?;
        let sprints = stmt
            .query_map(params![user_id, status.map(|s| s.as_str())], row_to_sprint)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(sprints)
    }

    pub fn update_sprint(&self, user_id: &str, id: Uuid, input: UpdateSprintInput) -> Result<Option<Sprint>> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        let Some(existing) = load_sprint(&tx, user_id, id)? else {
            return Ok(None);
        };

        let title = match input.title {
            Some(title) => {
                let title = normalize_title(&title)?;
                if title_taken(&tx, user_id, &title, Some(id))? {
                    return Err(StoreError::conflict("a sprint with this title already exists"));
                }
                title
            }
            None => existing.title,
        };

        let status = match input.status {
            Some(next) if !existing.status.can_transition_to(next) => {
                return Err(StoreError::conflict(format!(
                    "cannot change sprint status from {} to {}",
                    existing.status.as_str(),
                    next.as_str()
                )));
            }
            Some(next) => next,
            None => existing.status,
        };

        let start_date = input.start_date.unwrap_or(existing.start_date);
        let end_date = input.end_date.unwrap_or(existing.end_date);
        check_dates(start_date, end_date)?;

        tx.execute(
            "UPDATE sprints SET title = ?2, title_key = ?3, description = ?4, goal = ?5, status = ?6,
                 start_date = ?7, end_date = ?8, updated_at = ?9
             WHERE id = ?1",
            params![
                id.to_string(),
                title,
                title_key(&title),
                input.description.unwrap_or(existing.description),
                input.goal.unwrap_or(existing.goal),
                status.as_str(),
                fmt_date(start_date),
                fmt_date(end_date),
                now_ts()
            ],
        )
        .map_err(map_title_conflict)?;

        let sprint = load_sprint(&tx, user_id, id)?;
        tx.commit()?;

        if status != existing.status {
            tracing::info!(
                sprint_id = %id,
                from = existing.status.as_str(),
                to = status.as_str(),
                "sprint status changed"
            );
        }
        Ok(sprint)
    }

    /// Delete a sprint; tasks and milestones cascade.
    pub fn delete_sprint(&self, user_id: &str, id: Uuid) -> Result<bool> {
        let changed = self.conn().execute(
            "DELETE FROM sprints WHERE id = ?1 AND user_id = ?2",
            params![id.to_string(), user_id],
        )?;
        Ok(changed > 0)
    }

    /// Sprints in draft, active or paused status.
    pub fn count_open_sprints(&self, user_id: &str) -> Result<u32> {
        let count = self.conn().query_row(
            "SELECT COUNT(*) FROM sprints WHERE user_id = ?1 AND status IN ('draft', 'active', 'paused')",
            [user_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    pub fn recompute_sprint_stats(&self, id: Uuid) -> Result<Option<SprintStats>> {
        let conn = self.conn();
        if load_sprint_by_id(&conn, id)?.is_none() {
            return Ok(None);
        }
        refresh_stats(&conn, id).map(Some)
    }

    /// First free title among `base`, `base (2)`, `base (3)`, ...
    pub fn unique_sprint_title(&self, user_id: &str, base: &str) -> Result<String> {
        let base = normalize_title(base)?;
        let conn = self.conn();
        if !title_taken(&conn, user_id, &base, None)? {
            return Ok(base);
        }
        for n in 2.. {
            let suffix = format!(" ({n})");
            let mut stem: String = base.clone();
            while stem.chars().count() + suffix.chars().count() > TITLE_MAX_CHARS {
                stem.pop();
            }
            let candidate = format!("{}{}", stem.trim_end(), suffix);
            if !title_taken(&conn, user_id, &candidate, None)? {
                return Ok(candidate);
            }
        }
        unreachable!("title suffixes are unbounded")
    }
}
