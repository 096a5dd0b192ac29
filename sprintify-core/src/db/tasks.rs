use std::collections::HashMap;

use rusqlite::{params, Connection, OptionalExtension, Row};
use uuid::Uuid;

use super::sprints::{load_sprint, refresh_stats};
use super::{enum_error, fmt_date, now_ts, parse_json, parse_opt_date, parse_opt_ts, parse_ts, parse_uuid, Database};
use crate::deps::{self, DependencyError};
use crate::error::{Result, StoreError};
use crate::models::*;

const TASK_COLUMNS: &str = "id, sprint_id, title, description, status, priority, due_date, estimated_hours, \
     depends_on, position, completed_at, created_at, updated_at";

const TITLE_MAX_CHARS: usize = TASK_TITLE_MAX_CHARS;

fn row_to_task(row: &Row<'_>) -> rusqlite::Result<Task> {
    let id: String = row.get(0)?;
    let sprint_id: String = row.get(1)?;
    let status: String = row.get(4)?;
    let priority: String = row.get(5)?;
    let depends_on: String = row.get(8)?;
    let created_at: String = row.get(11)?;
    let updated_at: String = row.get(12)?;
    Ok(Task {
        id: parse_uuid(0, &id)?,
        sprint_id: parse_uuid(1, &sprint_id)?,
        title: row.get(2)?,
        description: row.get(3)?,
        status: TaskStatus::from_str(&status).ok_or_else(|| enum_error(4, &status))?,
        priority: Priority::from_str(&priority).ok_or_else(|| enum_error(5, &priority))?,
        due_date: parse_opt_date(6, row.get(6)?)?,
        estimated_hours: row.get(7)?,
        depends_on: parse_json(8, &depends_on)?,
        position: row.get(9)?,
        completed_at: parse_opt_ts(10, row.get(10)?)?,
        created_at: parse_ts(11, &created_at)?,
        updated_at: parse_ts(12, &updated_at)?,
    })
}

pub(crate) fn load_tasks(conn: &Connection, sprint_id: Uuid) -> Result<Vec<Task>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {TASK_COLUMNS} FROM tasks WHERE sprint_id = ?1 ORDER BY position, created_at"
    ))?;
    let tasks = stmt
        .query_map([sprint_id.to_string()], row_to_task)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(tasks)
}

fn load_task(conn: &Connection, sprint_id: Uuid, task_id: Uuid) -> Result<Option<Task>> {
    let task = conn
        .query_row(
            &format!("SELECT {TASK_COLUMNS} FROM tasks WHERE id = ?1 AND sprint_id = ?2"),
            params![task_id.to_string(), sprint_id.to_string()],
            row_to_task,
        )
        .optional()?;
    Ok(task)
}

fn dependency_graph(tasks: &[Task]) -> HashMap<Uuid, Vec<Uuid>> {
    tasks.iter().map(|t| (t.id, t.depends_on.clone())).collect()
}

fn map_dependency_error(e: DependencyError) -> StoreError {
    match e {
        DependencyError::SelfReference => StoreError::invalid("a task cannot depend on itself"),
        DependencyError::Unknown(id) => {
            StoreError::invalid(format!("dependency {id} is not a task in this sprint"))
        }
        DependencyError::Cycle => StoreError::conflict("dependency would create a cycle"),
    }
}

pub(crate) fn normalize_task_title(title: &str) -> Result<String> {
    let title = title.trim();
    if title.is_empty() {
        return Err(StoreError::invalid("task title is required"));
    }
    if title.chars().count() > TITLE_MAX_CHARS {
        return Err(StoreError::invalid(format!(
            "task title must be at most {TITLE_MAX_CHARS} characters"
        )));
    }
    Ok(title.to_string())
}

pub(crate) fn check_hours(hours: Option<f64>) -> Result<()> {
    match hours {
        Some(h) if !h.is_finite() || h < 0.0 => {
            Err(StoreError::invalid("estimated hours must be a non-negative number"))
        }
        _ => Ok(()),
    }
}

/// A task may only be done once everything it depends on is done.
fn check_dependencies_done(tasks: &[Task], depends_on: &[Uuid]) -> Result<()> {
    let open: Vec<&str> = tasks
        .iter()
        .filter(|t| depends_on.contains(&t.id) && t.status != TaskStatus::Done)
        .map(|t| t.title.as_str())
        .collect();
    if open.is_empty() {
        Ok(())
    } else {
        Err(StoreError::conflict(format!(
            "finish the tasks this one depends on first: {}",
            open.join(", ")
        )))
    }
}

/// Insert without touching sprint stats; callers refresh them once per transaction.
pub(crate) fn insert_task(
    conn: &Connection,
    sprint_id: Uuid,
    input: CreateTaskInput,
    position: i64,
) -> Result<Task> {
    let title = normalize_task_title(&input.title)?;
    check_hours(input.estimated_hours)?;

    let id = Uuid::new_v4();
    let status = input.status.unwrap_or(TaskStatus::Todo);
    let priority = input.priority.unwrap_or(Priority::Medium);
    let now = now_ts();
    let completed_at = (status == TaskStatus::Done).then(|| now.clone());

    conn.execute(
        "INSERT INTO tasks (id, sprint_id, title, description, status, priority, due_date, estimated_hours,
                            depends_on, position, completed_at, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?12)",
        params![
            id.to_string(),
            sprint_id.to_string(),
            title,
            input.description,
            status.as_str(),
            priority.as_str(),
            input.due_date.map(fmt_date),
            input.estimated_hours,
            serde_json::to_string(&deps::dedup(&input.depends_on))?,
            position,
            completed_at,
            now
        ],
    )?;

    load_task(conn, sprint_id, id)?.ok_or_else(|| StoreError::not_found("task not found"))
}

impl Database {
    /// Tasks of a sprint in board order. `None` if the sprint is not the user's.
    pub fn list_tasks(&self, user_id: &str, sprint_id: Uuid) -> Result<Option<Vec<Task>>> {
        let conn = self.conn();
        if load_sprint(&conn, user_id, sprint_id)?.is_none() {
            return Ok(None);
        }
        load_tasks(&conn, sprint_id).map(Some)
    }

    pub fn create_task(&self, user_id: &str, sprint_id: Uuid, input: CreateTaskInput) -> Result<Option<Task>> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        if load_sprint(&tx, user_id, sprint_id)?.is_none() {
            return Ok(None);
        }

        let existing = load_tasks(&tx, sprint_id)?;
        let depends_on = deps::dedup(&input.depends_on);
        // The new task has no id yet, so no existing task can depend on it.
        deps::validate_dependencies(&dependency_graph(&existing), Uuid::nil(), &depends_on)
            .map_err(map_dependency_error)?;
        if input.status == Some(TaskStatus::Done) {
            check_dependencies_done(&existing, &depends_on)?;
        }

        let position = existing.iter().map(|t| t.position).max().map_or(0, |p| p + 1);
        let task = insert_task(&tx, sprint_id, CreateTaskInput { depends_on, ..input }, position)?;
        refresh_stats(&tx, sprint_id)?;
        tx.commit()?;

        tracing::debug!(task_id = %task.id, sprint_id = %sprint_id, "task created");
        Ok(Some(task))
    }

    pub fn update_task(
        &self,
        user_id: &str,
        sprint_id: Uuid,
        task_id: Uuid,
        input: UpdateTaskInput,
    ) -> Result<Option<Task>> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        if load_sprint(&tx, user_id, sprint_id)?.is_none() {
            return Ok(None);
        }
        let all = load_tasks(&tx, sprint_id)?;
        let Some(existing) = all.iter().find(|t| t.id == task_id).cloned() else {
            return Ok(None);
        };

        let title = match input.title {
            Some(title) => normalize_task_title(&title)?,
            None => existing.title.clone(),
        };
        check_hours(input.estimated_hours.flatten())?;

        let depends_on = match input.depends_on {
            Some(new_deps) => {
                let new_deps = deps::dedup(&new_deps);
                deps::validate_dependencies(&dependency_graph(&all), task_id, &new_deps)
                    .map_err(map_dependency_error)?;
                new_deps
            }
            None => existing.depends_on.clone(),
        };

        let status = input.status.unwrap_or(existing.status);
        if status == TaskStatus::Done {
            check_dependencies_done(&all, &depends_on)?;
        }
        let completed_at = match (existing.status, status) {
            (TaskStatus::Done, TaskStatus::Done) => existing.completed_at.map(super::fmt_ts),
            (_, TaskStatus::Done) => Some(now_ts()),
            _ => None,
        };

        tx.execute(
            "UPDATE tasks SET title = ?3, description = ?4, status = ?5, priority = ?6, due_date = ?7,
                 estimated_hours = ?8, depends_on = ?9, completed_at = ?10, updated_at = ?11
             WHERE id = ?1 AND sprint_id = ?2",
            params![
                task_id.to_string(),
                sprint_id.to_string(),
                title,
                input.description.unwrap_or(existing.description),
                status.as_str(),
                input.priority.unwrap_or(existing.priority).as_str(),
                input.due_date.unwrap_or(existing.due_date).map(fmt_date),
                input.estimated_hours.unwrap_or(existing.estimated_hours),
                serde_json::to_string(&depends_on)?,
                completed_at,
                now_ts()
            ],
        )?;
        refresh_stats(&tx, sprint_id)?;
        let task = load_task(&tx, sprint_id, task_id)?;
        tx.commit()?;
        Ok(task)
    }

    /// Delete a task and drop it from the dependency lists of its siblings.
    pub fn delete_task(&self, user_id: &str, sprint_id: Uuid, task_id: Uuid) -> Result<bool> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        if load_sprint(&tx, user_id, sprint_id)?.is_none() {
            return Ok(false);
        }
        let changed = tx.execute(
            "DELETE FROM tasks WHERE id = ?1 AND sprint_id = ?2",
            params![task_id.to_string(), sprint_id.to_string()],
        )?;
        if changed == 0 {
            return Ok(false);
        }

        let now = now_ts();
        for task in load_tasks(&tx, sprint_id)? {
            if task.depends_on.contains(&task_id) {
                let remaining: Vec<Uuid> = task.depends_on.into_iter().filter(|d| *d != task_id).collect();
                tx.execute(
                    "UPDATE tasks SET depends_on = ?2, updated_at = ?3 WHERE id = ?1",
                    params![task.id.to_string(), serde_json::to_string(&remaining)?, now],
                )?;
            }
        }
        refresh_stats(&tx, sprint_id)?;
        tx.commit()?;
        Ok(true)
    }

    /// Reassign positions: listed ids first in the given order, the rest after in their old order.
    pub fn reorder_tasks(&self, user_id: &str, sprint_id: Uuid, order: &[Uuid]) -> Result<Option<Vec<Task>>> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        if load_sprint(&tx, user_id, sprint_id)?.is_none() {
            return Ok(None);
        }
        let tasks = load_tasks(&tx, sprint_id)?;
        if let Some(unknown) = order.iter().find(|id| !tasks.iter().any(|t| t.id == **id)) {
            return Err(StoreError::invalid(format!("task {unknown} is not in this sprint")));
        }

        let order = deps::dedup(order);
        let rest = tasks.iter().map(|t| t.id).filter(|id| !order.contains(id));
        let now = now_ts();
        for (position, id) in order.iter().copied().chain(rest).enumerate() {
            tx.execute(
                "UPDATE tasks SET position = ?2, updated_at = ?3 WHERE id = ?1",
                params![id.to_string(), position as i64, now],
            )?;
        }
        let tasks = load_tasks(&tx, sprint_id)?;
        tx.commit()?;
        Ok(Some(tasks))
    }
}
