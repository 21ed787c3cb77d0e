//! The statements the stores need, as one seam.
//!
//! [`super::mysql::MySqlBackend`] is the production implementation; the
//! stores only ever see `Arc<dyn Backend>`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::error::DbError;
use crate::model::{NewsEntry, PlayerRecord, PlayerUpdate, Preferences};

/// The cached projection of one player row: (name, uuid, linked chat account).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryRow {
    pub uuid: Uuid,
    pub name: String,
    pub chat_account: u64,
}

#[async_trait]
pub trait Backend: Send + Sync + 'static {
    /// `/* ping */ SELECT 1`
    async fn ping(&self) -> Result<(), DbError>;

    async fn select_player(&self, uuid: Uuid) -> Result<Option<PlayerRecord>, DbError>;

    /// Insert a first-contact row with first/last seen = `now`; returns the new row id.
    async fn insert_player(&self, uuid: Uuid, name: &str, now: DateTime<Utc>) -> Result<i64, DbError>;

    /// Rename and refresh last seen in one statement.
    async fn update_name_and_last_seen(&self, uuid: Uuid, name: &str, now: DateTime<Utc>) -> Result<(), DbError>;

    async fn update_last_seen(&self, uuid: Uuid, now: DateTime<Utc>) -> Result<(), DbError>;

    /// Write last seen, preferences, timezone, chat and forum links together.
    /// A non-zero chat account is first cleared from any other player;
    /// returns the uuids that lost it.
    async fn update_player(&self, update: &PlayerUpdate, now: DateTime<Utc>) -> Result<Vec<Uuid>, DbError>;

    /// Clear `account` from whoever holds it, then give it to `uuid`.
    /// Returns the uuids that lost the link.
    async fn relink_chat_account(&self, uuid: Uuid, account: u64) -> Result<Vec<Uuid>, DbError>;

    async fn update_forum_account(&self, uuid: Uuid, handle: Option<&str>) -> Result<(), DbError>;
    async fn update_timezone(&self, uuid: Uuid, tz: Option<&str>) -> Result<(), DbError>;
    async fn update_preferences(&self, uuid: Uuid, prefs: Preferences) -> Result<(), DbError>;

    /// Full scan used to warm the directory.
    async fn select_directory(&self) -> Result<Vec<DirectoryRow>, DbError>;

    async fn insert_news(&self, author: Option<Uuid>, content: &str, now: DateTime<Utc>) -> Result<i64, DbError>;
    async fn select_latest_news(&self) -> Result<Option<NewsEntry>, DbError>;

    async fn update_report(&self, id: i64, priority: i32, now: DateTime<Utc>) -> Result<(), DbError>;
}
