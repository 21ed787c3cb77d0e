use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::mysql::{MySqlConnection, MySqlRow};
use sqlx::{MySqlPool, Row};
use uuid::Uuid;

use super::backend::{Backend, DirectoryRow};
use super::error::DbError;
use crate::model::{NewsEntry, PlayerRecord, PlayerUpdate, Preferences};

const PLAYER_COLUMNS: &str = "`id`, `uuid`, `username`, `firstseen`, `lastseen`, \
     `timezone`, `chat_account`, `forum_account`, `preferences`";

/// sqlx/MariaDB implementation of [`Backend`].
///
/// Each statement borrows a connection from the pool for its own duration;
/// the guard returns it on every exit path, error or not.
#[derive(Clone, Debug)]
pub struct MySqlBackend {
    pool: MySqlPool,
}

impl MySqlBackend {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }
}

fn player_from_row(row: &MySqlRow) -> Result<PlayerRecord, DbError> {
    let uuid: String = row.try_get("uuid")?;
    Ok(PlayerRecord {
        uuid: Uuid::parse_str(&uuid)?,
        row_id: row.try_get("id")?,
        name: row.try_get("username")?,
        first_seen: row.try_get("firstseen")?,
        last_seen: row.try_get("lastseen")?,
        timezone: row.try_get("timezone")?,
        chat_account: row.try_get("chat_account")?,
        forum_account: row.try_get("forum_account")?,
        preferences: Preferences(row.try_get("preferences")?),
    })
}

fn parse_optional_uuid(s: Option<String>) -> Result<Option<Uuid>, DbError> {
    s.map(|s| Uuid::parse_str(&s)).transpose().map_err(DbError::from)
}

/// Take `account` away from every player but `keep`. No-op for 0 (unlinked).
async fn clear_chat_account(conn: &mut MySqlConnection, keep: Uuid, account: u64) -> Result<Vec<Uuid>, DbError> {
    if account == 0 {
        return Ok(Vec::new());
    }
    let keep = keep.to_string();
    let holders: Vec<(String,)> = sqlx::query_as(
        "SELECT `uuid` FROM `players` WHERE `chat_account` = ? AND `uuid` <> ?"
    )
    .bind(account)
    .bind(&keep)
    .fetch_all(&mut *conn)
    .await?;

    sqlx::query("UPDATE `players` SET `chat_account` = 0 WHERE `chat_account` = ? AND `uuid` <> ?")
        .bind(account)
        .bind(&keep)
        .execute(&mut *conn)
        .await?;

    holders
        .into_iter()
        .map(|(holder,)| Uuid::parse_str(&holder).map_err(DbError::from))
        .collect()
}

/// Row ids are BIGINT; an AUTO_INCREMENT past i64::MAX means a broken table.
fn row_id(raw: u64) -> Result<i64, DbError> {
    i64::try_from(raw).map_err(|_| DbError::Decode(format!("row id {} out of range", raw)))
}

#[async_trait]
impl Backend for MySqlBackend {
    async fn ping(&self) -> Result<(), DbError> {
        sqlx::query("/* ping */ SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    async fn select_player(&self, uuid: Uuid) -> Result<Option<PlayerRecord>, DbError> {
        let row = sqlx::query(&format!(
            "SELECT {PLAYER_COLUMNS} FROM `players` WHERE `uuid` = ? LIMIT 1"
        ))
        .bind(uuid.to_string())
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(player_from_row).transpose()
    }

    async fn insert_player(&self, uuid: Uuid, name: &str, now: DateTime<Utc>) -> Result<i64, DbError> {
        let res = sqlx::query(
            "INSERT INTO `players` (`uuid`, `username`, `firstseen`, `lastseen`) VALUES (?, ?, ?, ?)"
        )
        .bind(uuid.to_string())
        .bind(name)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;
        row_id(res.last_insert_id())
    }

    async fn update_name_and_last_seen(&self, uuid: Uuid, name: &str, now: DateTime<Utc>) -> Result<(), DbError> {
        sqlx::query("UPDATE `players` SET `username` = ?, `lastseen` = ? WHERE `uuid` = ?")
            .bind(name)
            .bind(now)
            .bind(uuid.to_string())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn update_last_seen(&self, uuid: Uuid, now: DateTime<Utc>) -> Result<(), DbError> {
        sqlx::query("UPDATE `players` SET `lastseen` = ? WHERE `uuid` = ?")
            .bind(now)
            .bind(uuid.to_string())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn update_player(&self, update: &PlayerUpdate, now: DateTime<Utc>) -> Result<Vec<Uuid>, DbError> {
        let mut conn = self.pool.acquire().await?;
        let evicted = clear_chat_account(&mut conn, update.uuid, update.chat_account).await?;

        sqlx::query(
            "UPDATE `players` SET `lastseen` = ?, `preferences` = ?, `timezone` = ?, \
             `chat_account` = ?, `forum_account` = ? WHERE `uuid` = ?"
        )
        .bind(now)
        .bind(update.preferences.bits())
        .bind(update.timezone.as_deref())
        .bind(update.chat_account)
        .bind(update.forum_account.as_deref())
        .bind(update.uuid.to_string())
        .execute(&mut *conn)
        .await?;
        Ok(evicted)
    }

    async fn relink_chat_account(&self, uuid: Uuid, account: u64) -> Result<Vec<Uuid>, DbError> {
        // Both steps share one pooled connection; it goes back when `conn` drops.
        let mut conn = self.pool.acquire().await?;
        let evicted = clear_chat_account(&mut conn, uuid, account).await?;

        sqlx::query("UPDATE `players` SET `chat_account` = ? WHERE `uuid` = ?")
            .bind(account)
            .bind(uuid.to_string())
            .execute(&mut *conn)
            .await?;
        Ok(evicted)
    }

    async fn update_forum_account(&self, uuid: Uuid, handle: Option<&str>) -> Result<(), DbError> {
        sqlx::query("UPDATE `players` SET `forum_account` = ? WHERE `uuid` = ?")
            .bind(handle)
            .bind(uuid.to_string())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn update_timezone(&self, uuid: Uuid, tz: Option<&str>) -> Result<(), DbError> {
        sqlx::query("UPDATE `players` SET `timezone` = ? WHERE `uuid` = ?")
            .bind(tz)
            .bind(uuid.to_string())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn update_preferences(&self, uuid: Uuid, prefs: Preferences) -> Result<(), DbError> {
        sqlx::query("UPDATE `players` SET `preferences` = ? WHERE `uuid` = ?")
            .bind(prefs.bits())
            .bind(uuid.to_string())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn select_directory(&self) -> Result<Vec<DirectoryRow>, DbError> {
        let rows: Vec<(String, String, u64)> = sqlx::query_as(
            "SELECT `username`, `uuid`, `chat_account` FROM `players`"
        )
        .fetch_all(&self.pool)
        .await?;

        let mut out = Vec::with_capacity(rows.len());
        for (name, uuid, chat_account) in rows {
            match Uuid::parse_str(&uuid) {
                Ok(uuid) => out.push(DirectoryRow { uuid, name, chat_account }),
                // One bad row should not keep everyone else out of the directory.
                Err(e) => tracing::warn!("[db] [directory] skipping row uuid={:?}: {}", uuid, e),
            }
        }
        Ok(out)
    }

    async fn insert_news(&self, author: Option<Uuid>, content: &str, now: DateTime<Utc>) -> Result<i64, DbError> {
        let res = sqlx::query("INSERT INTO `news` (`content`, `author`, `created_at`) VALUES (?, ?, ?)")
            .bind(content)
            .bind(author.map(|u| u.to_string()))
            .bind(now)
            .execute(&self.pool)
            .await?;
        row_id(res.last_insert_id())
    }

    async fn select_latest_news(&self) -> Result<Option<NewsEntry>, DbError> {
        let row: Option<(i64, String, DateTime<Utc>, Option<String>)> = sqlx::query_as(
            "SELECT `id`, `content`, `created_at`, `author` FROM `news` ORDER BY `id` DESC LIMIT 1"
        )
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some((id, content, created_at, author)) => Ok(Some(NewsEntry {
                id,
                content,
                created_at,
                author: parse_optional_uuid(author)?,
            })),
            None => Ok(None),
        }
    }

    async fn update_report(&self, id: i64, priority: i32, now: DateTime<Utc>) -> Result<(), DbError> {
        sqlx::query("UPDATE `reports` SET `priority` = ?, `last_touched` = ? WHERE `id` = ?")
            .bind(priority)
            .bind(now)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
