use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};

use super::{enum_error, is_unique_violation, now_ts, parse_json, parse_opt_ts, parse_ts, Database};
use crate::error::{Result, StoreError};
use crate::models::*;

const USER_COLUMNS: &str = "uid, email, display_name, role, disabled, fcm_tokens, preferences, created_at, updated_at, last_login_at";

const USERS_DEFAULT_LIMIT: u32 = 20;
const USERS_LIMIT_MAX: u32 = 100;
const MAX_FCM_TOKENS: usize = 10;

fn row_to_user(row: &Row<'_>) -> rusqlite::Result<User> {
    let role: String = row.get(3)?;
    let fcm_tokens: String = row.get(5)?;
    let preferences: String = row.get(6)?;
    let created_at: String = row.get(7)?;
    let updated_at: String = row.get(8)?;
    Ok(User {
        uid: row.get(0)?,
        email: row.get(1)?,
        display_name: row.get(2)?,
        role: Role::from_str(&role).ok_or_else(|| enum_error(3, &role))?,
        disabled: row.get(4)?,
        fcm_tokens: parse_json(5, &fcm_tokens)?,
        preferences: parse_json(6, &preferences)?,
        created_at: parse_ts(7, &created_at)?,
        updated_at: parse_ts(8, &updated_at)?,
        last_login_at: parse_opt_ts(9, row.get(9)?)?,
    })
}

pub(crate) fn load_user(conn: &Connection, uid: &str) -> Result<Option<User>> {
    let user = conn
        .query_row(
            &format!("SELECT {USER_COLUMNS} FROM users WHERE uid = ?1"),
            [uid],
            row_to_user,
        )
        .optional()?;
    Ok(user)
}

impl Database {
    pub fn create_user(&self, input: CreateUserInput) -> Result<User> {
        let uid = input.uid.trim();
        let email = input.email.trim().to_lowercase();
        if uid.is_empty() {
            return Err(StoreError::invalid("uid is required"));
        }
        if email.is_empty() || !email.contains('@') {
            return Err(StoreError::invalid("a valid email is required"));
        }
        let display_name = input
            .display_name
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty());
        let role = input.role.unwrap_or_default();
        let now = now_ts();

        let conn = self.conn();
        let inserted = conn.execute(
            "INSERT INTO users (uid, email, display_name, role, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?5)",
            params![uid, email, display_name, role.as_str(), now],
        );
        match inserted {
            Ok(_) => {}
            Err(e) if is_unique_violation(&e) => {
                return Err(StoreError::conflict("user already exists"));
            }
            Err(e) => return Err(e.into()),
        }

        tracing::info!(uid, role = role.as_str(), "user created");
        load_user(&conn, uid)?.ok_or_else(|| StoreError::not_found("user not found"))
    }

    pub fn get_user(&self, uid: &str) -> Result<Option<User>> {
        load_user(&self.conn(), uid)
    }

    pub fn list_users(&self, filter: &UserFilter) -> Result<UserPage> {
        let mut clauses = Vec::new();
        let mut values: Vec<Value> = Vec::new();

        if let Some(role) = filter.role {
            values.push(Value::Text(role.as_str().to_string()));
            clauses.push(format!("role = ?{}", values.len()));
        }
        if let Some(search) = filter.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            values.push(Value::Text(format!("%{}%", search.to_lowercase())));
            let idx = values.len();
            clauses.push(format!(
                "(lower(email) LIKE ?{idx} OR lower(coalesce(display_name, '')) LIKE ?{idx})"
            ));
        }
        let where_sql = if clauses.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", clauses.join(" AND "))
        };

        let conn = self.conn();
        let total: i64 = conn.query_row(
            &format!("SELECT COUNT(*) FROM users {where_sql}"),
            params_from_iter(values.iter()),
            |row| row.get(0),
        )?;

        let limit = filter
            .limit
            .unwrap_or(USERS_DEFAULT_LIMIT)
            .clamp(1, USERS_LIMIT_MAX);
        values.push(Value::Integer(limit as i64));
        values.push(Value::Integer(filter.offset as i64));
        let sql = format!(
            "SELECT {USER_COLUMNS} FROM users {where_sql}
             ORDER BY created_at DESC, uid
             LIMIT ?{} OFFSET ?{}",
            values.len() - 1,
            values.len()
        );
        let mut stmt = conn.prepare(&sql)?;
        let users = stmt
            .query_map(params_from_iter(values.iter()), row_to_user)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(UserPage {
            users,
            total: total as u64,
        })
    }

    pub fn update_profile(&self, uid: &str, input: UpdateProfileInput) -> Result<Option<User>> {
        let conn = self.conn();
        let Some(existing) = load_user(&conn, uid)? else {
            return Ok(None);
        };

        let display_name = match input.display_name {
            Some(name) => {
                let name = name.trim().to_string();
                if name.chars().count() > 50 {
                    return Err(StoreError::invalid("display name must be at most 50 characters"));
                }
                if name.is_empty() {
                    None
                } else {
                    Some(name)
                }
            }
            None => existing.display_name,
        };
        let preferences = match input.preferences {
            Some(prefs) if !prefs.is_object() => {
                return Err(StoreError::invalid("preferences must be a JSON object"));
            }
            Some(prefs) => prefs,
            None => existing.preferences,
        };

        conn.execute(
            "UPDATE users SET display_name = ?2, preferences = ?3, updated_at = ?4 WHERE uid = ?1",
            params![uid, display_name, serde_json::to_string(&preferences)?, now_ts()],
        )?;
        load_user(&conn, uid)
    }

    pub fn set_role(&self, uid: &str, role: Role) -> Result<bool> {
        let changed = self.conn().execute(
            "UPDATE users SET role = ?2, updated_at = ?3 WHERE uid = ?1",
            params![uid, role.as_str(), now_ts()],
        )?;
        if changed > 0 {
            tracing::info!(uid, role = role.as_str(), "user role changed");
        }
        Ok(changed > 0)
    }

    pub fn set_disabled(&self, uid: &str, disabled: bool) -> Result<bool> {
        let changed = self.conn().execute(
            "UPDATE users SET disabled = ?2, updated_at = ?3 WHERE uid = ?1",
            params![uid, disabled, now_ts()],
        )?;
        Ok(changed > 0)
    }

    pub fn touch_login(&self, uid: &str) -> Result<bool> {
        let now = now_ts();
        let changed = self.conn().execute(
            "UPDATE users SET last_login_at = ?2 WHERE uid = ?1",
            params![uid, now],
        )?;
        Ok(changed > 0)
    }

    /// Register a device token. Re-registering moves it to the newest slot.
    pub fn add_fcm_token(&self, uid: &str, token: &str) -> Result<Option<Vec<String>>> {
        let token = token.trim();
        if token.is_empty() {
            return Err(StoreError::invalid("token is required"));
        }
        let conn = self.conn();
        let Some(user) = load_user(&conn, uid)? else {
            return Ok(None);
        };

        let mut tokens: Vec<String> = user.fcm_tokens.into_iter().filter(|t| t != token).collect();
        tokens.push(token.to_string());
        if tokens.len() > MAX_FCM_TOKENS {
            let excess = tokens.len() - MAX_FCM_TOKENS;
            tokens.drain(..excess);
        }

        conn.execute(
            "UPDATE users SET fcm_tokens = ?2, updated_at = ?3 WHERE uid = ?1",
            params![uid, serde_json::to_string(&tokens)?, now_ts()],
        )?;
        Ok(Some(tokens))
    }

    pub fn remove_fcm_token(&self, uid: &str, token: &str) -> Result<Option<Vec<String>>> {
        let conn = self.conn();
        let Some(user) = load_user(&conn, uid)? else {
            return Ok(None);
        };
        let tokens: Vec<String> = user.fcm_tokens.into_iter().filter(|t| t != token).collect();
        conn.execute(
            "UPDATE users SET fcm_tokens = ?2, updated_at = ?3 WHERE uid = ?1",
            params![uid, serde_json::to_string(&tokens)?, now_ts()],
        )?;
        Ok(Some(tokens))
    }

    /// Delete a user and everything they own.
    pub fn delete_user(&self, uid: &str) -> Result<bool> {
        let changed = self.conn().execute("DELETE FROM users WHERE uid = ?1", [uid])?;
        if changed > 0 {
            tracing::info!(uid, "user deleted");
        }
        Ok(changed > 0)
    }
}
