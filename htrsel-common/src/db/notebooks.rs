//! Notebook queries

use crate::db::models::Notebook;
use crate::{Error, Result};
use sqlx::SqlitePool;

pub async fn insert_notebook(pool: &SqlitePool, name: &str, file: Option<&str>) -> Result<i64> {
    let name = name.trim();
    if name.is_empty() {
        return Err(Error::InvalidInput("Notebook name is required".to_string()));
    }
    if name.chars().count() > 250 {
        return Err(Error::InvalidInput(
            "Notebook name is limited to 250 characters".to_string(),
        ));
    }

    let id = sqlx::query("INSERT INTO notebooks (name, file) VALUES (?, ?)")
        .bind(name)
        .bind(file)
        .execute(pool)
        .await?
        .last_insert_rowid();

    Ok(id)
}

pub async fn get_notebook(pool: &SqlitePool, id: i64) -> Result<Option<Notebook>> {
    let notebook = sqlx::query_as::<_, Notebook>("SELECT id, name, file FROM notebooks WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await?;
    Ok(notebook)
}

pub async fn count_notebooks(pool: &SqlitePool) -> Result<i64> {
    let count = sqlx::query_scalar("SELECT COUNT(*) FROM notebooks")
        .fetch_one(pool)
        .await?;
    Ok(count)
}

/// One page of notebooks ordered by name
pub async fn list_notebooks(pool: &SqlitePool, limit: i64, offset: i64) -> Result<Vec<Notebook>> {
    let notebooks = sqlx::query_as::<_, Notebook>(
        "SELECT id, name, file FROM notebooks ORDER BY name, id LIMIT ? OFFSET ?",
    )
    .bind(limit)
    .bind(offset)
    .fetch_all(pool)
    .await?;
    Ok(notebooks)
}

/// All notebooks, for select widgets
pub async fn all_notebooks(pool: &SqlitePool) -> Result<Vec<Notebook>> {
    let notebooks = sqlx::query_as::<_, Notebook>("SELECT id, name, file FROM notebooks ORDER BY name, id")
        .fetch_all(pool)
        .await?;
    Ok(notebooks)
}

pub async fn get_notebooks(pool: &SqlitePool, ids: &[i64]) -> Result<Vec<Notebook>> {
    let mut notebooks = Vec::with_capacity(ids.len());
    for id in ids {
        if let Some(nb) = get_notebook(pool, *id).await? {
            notebooks.push(nb);
        }
    }
    Ok(notebooks)
}

/// Delete a notebook; its documents keep existing with `notebook_id = NULL`
pub async fn delete_notebook(pool: &SqlitePool, id: i64) -> Result<bool> {
    let affected = sqlx::query("DELETE FROM notebooks WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await?
        .rows_affected();
    Ok(affected > 0)
}
