#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use playerbase::database::{Backend, DbError, DirectoryRow, Dispatcher, ProbePolicy};
use playerbase::model::{NewsEntry, PlayerRecord, PlayerUpdate, Preferences};
use playerbase::Database;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportRow {
    pub priority: i32,
    pub last_touched: Option<DateTime<Utc>>,
}

#[derive(Default)]
struct Tables {
    players: HashMap<Uuid, PlayerRecord>,
    next_player_id: i64,
    news: Vec<NewsEntry>,
    reports: HashMap<i64, ReportRow>,
}

/// Mirrors the MySQL statements against plain maps, with knobs for failures.
#[derive(Default)]
pub struct MemoryBackend {
    tables: Mutex<Tables>,
    /// Statement log, e.g. "update_name", "insert_player".
    pub statements: Mutex<Vec<&'static str>>,
    pub fail_queries: AtomicBool,
    pub ping_error: Mutex<Option<fn() -> sqlx::Error>>,
    pub ping_delay: Mutex<Option<Duration>>,
    pub pings: AtomicUsize,
    /// Held inside every player select, to widen join races.
    pub select_delay: Mutex<Option<Duration>>,
    /// Applied once, to the next news insert, after its id is assigned.
    pub news_insert_delay: Mutex<Option<Duration>>,
    pub fail_last_seen: AtomicBool,
}

impl MemoryBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn log(&self, stmt: &'static str) -> Result<(), DbError> {
        self.statements.lock().unwrap().push(stmt);
        if self.fail_queries.load(Ordering::SeqCst) {
            return Err(DbError::from(sqlx::Error::Protocol(format!("injected failure in {stmt}"))));
        }
        Ok(())
    }

    pub fn count(&self, stmt: &str) -> usize {
        self.statements.lock().unwrap().iter().filter(|s| **s == stmt).count()
    }

    pub fn seed_player(&self, uuid: Uuid, name: &str, seen: DateTime<Utc>, chat_account: u64) {
        let mut t = self.tables.lock().unwrap();
        t.next_player_id += 1;
        let mut rec = PlayerRecord::first_contact(uuid, t.next_player_id, name, seen);
        rec.chat_account = chat_account;
        t.players.insert(uuid, rec);
    }

    pub fn seed_news(&self, content: &str, author: Option<Uuid>) {
        let mut t = self.tables.lock().unwrap();
        let id = t.news.len() as i64 + 1;
        t.news.push(NewsEntry { id, content: content.to_string(), created_at: Utc::now(), author });
    }

    pub fn seed_report(&self, id: i64) {
        self.tables
            .lock()
            .unwrap()
            .reports
            .insert(id, ReportRow { priority: 1, last_touched: None });
    }

    pub fn player(&self, uuid: Uuid) -> Option<PlayerRecord> {
        self.tables.lock().unwrap().players.get(&uuid).cloned()
    }

    pub fn report(&self, id: i64) -> Option<ReportRow> {
        self.tables.lock().unwrap().reports.get(&id).cloned()
    }

    pub fn news_count(&self) -> usize {
        self.tables.lock().unwrap().news.len()
    }
}

fn clear_chat_account(t: &mut Tables, keep: Uuid, account: u64) -> Vec<Uuid> {
    let mut evicted = Vec::new();
    if account == 0 {
        return evicted;
    }
    for p in t.players.values_mut() {
        if p.chat_account == account && p.uuid != keep {
            p.chat_account = 0;
            evicted.push(p.uuid);
        }
    }
    evicted
}

#[async_trait]
impl Backend for MemoryBackend {
    async fn ping(&self) -> Result<(), DbError> {
        self.pings.fetch_add(1, Ordering::SeqCst);
        let delay = *self.ping_delay.lock().unwrap();
        if let Some(d) = delay {
            tokio::time::sleep(d).await;
        }
        let err = *self.ping_error.lock().unwrap();
        match err {
            Some(make) => Err(DbError::from(make())),
            None => Ok(()),
        }
    }

    async fn select_player(&self, uuid: Uuid) -> Result<Option<PlayerRecord>, DbError> {
        self.log("select_player")?;
        let delay = *self.select_delay.lock().unwrap();
        if let Some(d) = delay {
            tokio::time::sleep(d).await;
        }
        Ok(self.player(uuid))
    }

    async fn insert_player(&self, uuid: Uuid, name: &str, now: DateTime<Utc>) -> Result<i64, DbError> {
        self.log("insert_player")?;
        let mut t = self.tables.lock().unwrap();
        if t.players.contains_key(&uuid) {
            return Err(DbError::Conflict(format!("Duplicate entry '{uuid}' for key 'players_uuid'")));
        }
        t.next_player_id += 1;
        let id = t.next_player_id;
        t.players.insert(uuid, PlayerRecord::first_contact(uuid, id, name, now));
        Ok(id)
    }

    async fn update_name_and_last_seen(&self, uuid: Uuid, name: &str, now: DateTime<Utc>) -> Result<(), DbError> {
        self.log("update_name")?;
        if let Some(p) = self.tables.lock().unwrap().players.get_mut(&uuid) {
            p.name = name.to_string();
            p.last_seen = now;
        }
        Ok(())
    }

    async fn update_last_seen(&self, uuid: Uuid, now: DateTime<Utc>) -> Result<(), DbError> {
        self.log("update_last_seen")?;
        if self.fail_last_seen.load(Ordering::SeqCst) {
            return Err(DbError::from(sqlx::Error::Protocol("injected last seen failure".into())));
        }
        if let Some(p) = self.tables.lock().unwrap().players.get_mut(&uuid) {
            p.last_seen = now;
        }
        Ok(())
    }

    async fn update_player(&self, update: &PlayerUpdate, now: DateTime<Utc>) -> Result<Vec<Uuid>, DbError> {
        self.log("update_player")?;
        let mut t = self.tables.lock().unwrap();
        let evicted = clear_chat_account(&mut t, update.uuid, update.chat_account);
        if let Some(p) = t.players.get_mut(&update.uuid) {
            p.last_seen = now;
            p.preferences = update.preferences;
            p.timezone = update.timezone.clone();
            p.chat_account = update.chat_account;
            p.forum_account = update.forum_account.clone();
        }
        Ok(evicted)
    }

    async fn relink_chat_account(&self, uuid: Uuid, account: u64) -> Result<Vec<Uuid>, DbError> {
        self.log("relink_chat_account")?;
        let mut t = self.tables.lock().unwrap();
        let evicted = clear_chat_account(&mut t, uuid, account);
        if let Some(p) = t.players.get_mut(&uuid) {
            p.chat_account = account;
        }
        Ok(evicted)
    }

    async fn update_forum_account(&self, uuid: Uuid, handle: Option<&str>) -> Result<(), DbError> {
        self.log("update_forum_account")?;
        if let Some(p) = self.tables.lock().unwrap().players.get_mut(&uuid) {
            p.forum_account = handle.map(str::to_string);
        }
        Ok(())
    }

    async fn update_timezone(&self, uuid: Uuid, tz: Option<&str>) -> Result<(), DbError> {
        self.log("update_timezone")?;
        if let Some(p) = self.tables.lock().unwrap().players.get_mut(&uuid) {
            p.timezone = tz.map(str::to_string);
        }
        Ok(())
    }

    async fn update_preferences(&self, uuid: Uuid, prefs: Preferences) -> Result<(), DbError> {
        self.log("update_preferences")?;
        if let Some(p) = self.tables.lock().unwrap().players.get_mut(&uuid) {
            p.preferences = prefs;
        }
        Ok(())
    }

    async fn select_directory(&self) -> Result<Vec<DirectoryRow>, DbError> {
        self.log("select_directory")?;
        Ok(self
            .tables
            .lock()
            .unwrap()
            .players
            .values()
            .map(|p| DirectoryRow { uuid: p.uuid, name: p.name.clone(), chat_account: p.chat_account })
            .collect())
    }

    async fn insert_news(&self, author: Option<Uuid>, content: &str, now: DateTime<Utc>) -> Result<i64, DbError> {
        self.log("insert_news")?;
        let id = {
            let mut t = self.tables.lock().unwrap();
            let id = t.news.len() as i64 + 1;
            t.news.push(NewsEntry { id, content: content.to_string(), created_at: now, author });
            id
        };
        let delay = self.news_insert_delay.lock().unwrap().take();
        if let Some(d) = delay {
            tokio::time::sleep(d).await;
        }
        Ok(id)
    }

    async fn select_latest_news(&self) -> Result<Option<NewsEntry>, DbError> {
        self.log("select_latest_news")?;
        Ok(self.tables.lock().unwrap().news.iter().max_by_key(|n| n.id).cloned())
    }

    async fn update_report(&self, id: i64, priority: i32, now: DateTime<Utc>) -> Result<(), DbError> {
        self.log("update_report")?;
        if let Some(r) = self.tables.lock().unwrap().reports.get_mut(&id) {
            r.priority = priority;
            r.last_touched = Some(now);
        }
        Ok(())
    }
}

pub fn fast_probe() -> ProbePolicy {
    ProbePolicy {
        slow_threshold: Duration::from_millis(1000),
        attempts: 3,
        retry_delay: Duration::from_millis(1),
    }
}

pub async fn open(backend: &Arc<MemoryBackend>) -> Database {
    let dyn_backend: Arc<dyn Backend> = backend.clone();
    Database::start(dyn_backend, Dispatcher::current(), fast_probe()).await
}
