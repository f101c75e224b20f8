use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, SubsecRound, Utc};
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow},
    Pool, Row, Sqlite,
};
use std::{
    fs,
    path::{Path, PathBuf},
    str::FromStr,
};
use tracing::debug;
use uuid::Uuid;

use shared::domain::{Item, ItemId, UserId};

#[derive(Clone)]
pub struct Storage {
    pool: Pool<Sqlite>,
}

impl Storage {
    pub async fn new(database_url: &str) -> Result<Self> {
        ensure_sqlite_parent_dir_exists(database_url)?;

        let connect_options = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(connect_options)
            .await?;
        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(Self { pool })
    }

    pub async fn health_check(&self) -> Result<()> {
        let _: i64 = sqlx::query_scalar("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .context("sqlite ping failed")?;
        Ok(())
    }

    /// Returns the id of the user registered under `email`, creating the
    /// user on first sight. Emails are compared case-insensitively.
    pub async fn upsert_user(&self, email: &str) -> Result<UserId> {
        let email = email.trim().to_ascii_lowercase();
        if email.is_empty() {
            return Err(anyhow!("email must not be empty"));
        }

        let rec = sqlx::query(
            "INSERT INTO users (id, email, created_at) VALUES (?, ?, ?)
             ON CONFLICT(email) DO UPDATE SET email=excluded.email
             RETURNING id",
        )
        .bind(Uuid::new_v4().to_string())
        .bind(&email)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await?;
        let raw: String = rec.get(0);
        Ok(UserId(parse_uuid(&raw, "users.id")?))
    }

    /// Items owned by `owner`, newest first. Rows created in the same instant
    /// keep insertion order reversed.
    pub async fn list_items(&self, owner: UserId) -> Result<Vec<Item>> {
        let rows = sqlx::query(
            "SELECT id, user_id, name, completed, created_at
             FROM shopping_items
             WHERE user_id = ?
             ORDER BY created_at DESC, rowid DESC",
        )
        .bind(owner.0.to_string())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(item_from_row).collect()
    }

    pub async fn insert_item(&self, owner: UserId, name: &str) -> Result<Item> {
        let item = Item {
            id: ItemId::new_random(),
            owner,
            name: name.to_string(),
            completed: false,
            // Microsecond precision, as in the hosted table.
            created_at: Utc::now().trunc_subsecs(6),
        };

        sqlx::query(
            "INSERT INTO shopping_items (id, user_id, name, completed, created_at)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(item.id.0.to_string())
        .bind(owner.0.to_string())
        .bind(&item.name)
        .bind(item.completed)
        .bind(item.created_at)
        .execute(&self.pool)
        .await
        .with_context(|| format!("failed to insert item for user {owner}"))?;

        debug!(item_id = %item.id, user_id = %owner, "stored shopping item");
        Ok(item)
    }

    /// Applies the present fields to the owner's row. Returns `false` when no
    /// row with that id belongs to `owner`.
    pub async fn update_item(
        &self,
        owner: UserId,
        item_id: ItemId,
        name: Option<&str>,
        completed: Option<bool>,
    ) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE shopping_items
             SET name = COALESCE(?, name), completed = COALESCE(?, completed)
             WHERE id = ? AND user_id = ?",
        )
        .bind(name)
        .bind(completed)
        .bind(item_id.0.to_string())
        .bind(owner.0.to_string())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn delete_item(&self, owner: UserId, item_id: ItemId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM shopping_items WHERE id = ? AND user_id = ?")
            .bind(item_id.0.to_string())
            .bind(owner.0.to_string())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

fn item_from_row(row: &SqliteRow) -> Result<Item> {
    let id: String = row.try_get("id")?;
    let owner: String = row.try_get("user_id")?;
    let created_at: DateTime<Utc> = row.try_get("created_at")?;
    Ok(Item {
        id: ItemId(parse_uuid(&id, "shopping_items.id")?),
        owner: UserId(parse_uuid(&owner, "shopping_items.user_id")?),
        name: row.try_get("name")?,
        completed: row.try_get("completed")?,
        created_at,
    })
}

fn parse_uuid(raw: &str, column: &str) -> Result<Uuid> {
    Uuid::parse_str(raw).with_context(|| format!("invalid uuid '{raw}' in column {column}"))
}

fn ensure_sqlite_parent_dir_exists(database_url: &str) -> Result<()> {
    let Some(path) = sqlite_path(database_url) else {
        return Ok(());
    };

    let Some(parent) = path.parent() else {
        return Ok(());
    };
    if parent.as_os_str().is_empty() {
        return Ok(());
    }

    fs::create_dir_all(parent).with_context(|| {
        format!(
            "failed to create parent directory '{}' for database url '{database_url}'",
            parent.display()
        )
    })?;

    Ok(())
}

fn sqlite_path(database_url: &str) -> Option<PathBuf> {
    if database_url.starts_with("sqlite::memory:") || !database_url.starts_with("sqlite:") {
        return None;
    }

    let path = database_url
        .trim_start_matches("sqlite://")
        .trim_start_matches("sqlite:")
        .split('?')
        .next()
        .unwrap_or_default();

    if path.is_empty() {
        return None;
    }

    Some(Path::new(path).to_path_buf())
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
