//! Users, role groups and login sessions

use crate::auth::{hash_password, verify_password};
use crate::db::models::{Role, User};
use crate::{Error, Result};
use sqlx::{Row, SqlitePool};
use tracing::info;
use uuid::Uuid;

/// Create a user with the given roles; returns the new id
pub async fn create_user(
    pool: &SqlitePool,
    username: &str,
    password: &str,
    is_superuser: bool,
    roles: &[Role],
) -> Result<i64> {
    let username = username.trim();
    if username.is_empty() {
        return Err(Error::InvalidInput("Username is required".to_string()));
    }
    if password.is_empty() {
        return Err(Error::InvalidInput("Password is required".to_string()));
    }

    let existing: Option<i64> = sqlx::query_scalar("SELECT id FROM users WHERE username = ?")
        .bind(username)
        .fetch_optional(pool)
        .await?;
    if existing.is_some() {
        return Err(Error::InvalidInput(format!("User '{}' already exists", username)));
    }

    let password_hash = hash_password(password)?;
    let id = sqlx::query("INSERT INTO users (username, password_hash, is_superuser) VALUES (?, ?, ?)")
        .bind(username)
        .bind(&password_hash)
        .bind(is_superuser)
        .execute(pool)
        .await?
        .last_insert_rowid();

    set_roles(pool, id, roles).await?;
    info!(user_id = id, username, "Created user");
    Ok(id)
}

/// Replace a user's role groups
pub async fn set_roles(pool: &SqlitePool, user_id: i64, roles: &[Role]) -> Result<()> {
    let mut tx = pool.begin().await?;
    sqlx::query("DELETE FROM user_groups WHERE user_id = ?")
        .bind(user_id)
        .execute(&mut *tx)
        .await?;
    for role in roles {
        sqlx::query("INSERT OR IGNORE INTO user_groups (user_id, group_name) VALUES (?, ?)")
            .bind(user_id)
            .bind(role.group_name())
            .execute(&mut *tx)
            .await?;
    }
    tx.commit().await?;
    Ok(())
}

pub async fn find_user_id(pool: &SqlitePool, username: &str) -> Result<Option<i64>> {
    let id = sqlx::query_scalar("SELECT id FROM users WHERE username = ?")
        .bind(username.trim())
        .fetch_optional(pool)
        .await?;
    Ok(id)
}

/// Load a user with its roles
pub async fn load_user(pool: &SqlitePool, user_id: i64) -> Result<Option<User>> {
    let row = sqlx::query("SELECT id, username, is_superuser FROM users WHERE id = ?")
        .bind(user_id)
        .fetch_optional(pool)
        .await?;
    let Some(row) = row else {
        return Ok(None);
    };

    let groups: Vec<String> =
        sqlx::query_scalar("SELECT group_name FROM user_groups WHERE user_id = ? ORDER BY group_name")
            .bind(user_id)
            .fetch_all(pool)
            .await?;
    let mut roles: Vec<Role> = groups.iter().filter_map(|g| Role::from_group_name(g)).collect();
    roles.sort();

    Ok(Some(User {
        id: row.get("id"),
        username: row.get("username"),
        is_superuser: row.get("is_superuser"),
        roles,
    }))
}

/// Check a username/password pair; `None` on any mismatch
pub async fn verify_credentials(pool: &SqlitePool, username: &str, password: &str) -> Result<Option<User>> {
    let row = sqlx::query("SELECT id, password_hash FROM users WHERE username = ?")
        .bind(username.trim())
        .fetch_optional(pool)
        .await?;
    let Some(row) = row else {
        return Ok(None);
    };

    let hash: String = row.get("password_hash");
    if !verify_password(password, &hash) {
        return Ok(None);
    }
    load_user(pool, row.get("id")).await
}

/// Open a session for a user; returns the cookie token
pub async fn create_session(pool: &SqlitePool, user_id: i64) -> Result<String> {
    let token = Uuid::new_v4().to_string();
    sqlx::query("INSERT INTO sessions (token, user_id, created_at) VALUES (?, ?, ?)")
        .bind(&token)
        .bind(user_id)
        .bind(chrono::Utc::now().timestamp())
        .execute(pool)
        .await?;
    Ok(token)
}

/// Resolve a session token, expiring sessions older than `timeout_seconds`
pub async fn session_user(pool: &SqlitePool, token: &str, timeout_seconds: i64) -> Result<Option<User>> {
    let row = sqlx::query("SELECT user_id, created_at FROM sessions WHERE token = ?")
        .bind(token)
        .fetch_optional(pool)
        .await?;
    let Some(row) = row else {
        return Ok(None);
    };

    let created_at: i64 = row.get("created_at");
    if chrono::Utc::now().timestamp() - created_at > timeout_seconds {
        delete_session(pool, token).await?;
        return Ok(None);
    }
    load_user(pool, row.get("user_id")).await
}

pub async fn delete_session(pool: &SqlitePool, token: &str) -> Result<()> {
    sqlx::query("DELETE FROM sessions WHERE token = ?")
        .bind(token)
        .execute(pool)
        .await?;
    Ok(())
}

/// Usernames by id, for attribution columns
pub async fn username(pool: &SqlitePool, user_id: i64) -> Result<Option<String>> {
    let name = sqlx::query_scalar("SELECT username FROM users WHERE id = ?")
        .bind(user_id)
        .fetch_optional(pool)
        .await?;
    Ok(name)
}
