//! In-memory name/uuid/chat-account directory.
//!
//! One task owns every mutation: stores send it a [`DirectoryEvent`] when a
//! write completes and wait for the ack before resolving their own future,
//! so a caller that has seen the write resolve will also see it here.
//! Lookups never wait on the task; they read the latest applied state.

use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard};

use tokio::runtime::Handle;
use tokio::sync::{mpsc, oneshot};
use uuid::Uuid;

use crate::database::backend::DirectoryRow;

/// A committed write that touched a cached field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DirectoryEvent {
    /// Startup scan. Entries already updated by live writes are left alone.
    Loaded(Vec<DirectoryRow>),
    /// Player joined under `name` (new player or rename).
    Seen { uuid: Uuid, name: String },
    /// `account` now belongs to `uuid`; 0 unlinks.
    ChatLinked { uuid: Uuid, account: u64 },
}

#[derive(Debug, Default)]
struct Maps {
    /// lowercased name -> uuid
    by_name: HashMap<String, Uuid>,
    names: HashMap<Uuid, String>,
    chat: HashMap<Uuid, u64>,
    by_chat: HashMap<u64, Uuid>,
}

impl Maps {
    fn apply(&mut self, event: DirectoryEvent) {
        match event {
            DirectoryEvent::Loaded(rows) => {
                for row in rows {
                    if !self.names.contains_key(&row.uuid) {
                        self.set_name(row.uuid, row.name);
                    }
                    if row.chat_account != 0 && !self.chat.contains_key(&row.uuid) {
                        self.set_chat(row.uuid, row.chat_account);
                    }
                }
            }
            DirectoryEvent::Seen { uuid, name } => self.set_name(uuid, name),
            DirectoryEvent::ChatLinked { uuid, account } => self.set_chat(uuid, account),
        }
    }

    fn set_name(&mut self, uuid: Uuid, name: String) {
        if let Some(old) = self.names.remove(&uuid) {
            let key = old.to_lowercase();
            if self.by_name.get(&key) == Some(&uuid) {
                self.by_name.remove(&key);
            }
        }
        self.by_name.insert(name.to_lowercase(), uuid);
        self.names.insert(uuid, name);
    }

    fn set_chat(&mut self, uuid: Uuid, account: u64) {
        if let Some(old) = self.chat.remove(&uuid) {
            if self.by_chat.get(&old) == Some(&uuid) {
                self.by_chat.remove(&old);
            }
        }
        if account == 0 {
            return;
        }
        if let Some(prev) = self.by_chat.insert(account, uuid) {
            if prev != uuid {
                self.chat.remove(&prev);
            }
        }
        self.chat.insert(uuid, account);
    }
}

struct Command {
    event: DirectoryEvent,
    ack: oneshot::Sender<()>,
}

/// Cheap to clone; every clone talks to the same owning task.
#[derive(Clone)]
pub struct Directory {
    maps: Arc<RwLock<Maps>>,
    tx: mpsc::UnboundedSender<Command>,
}

impl Directory {
    /// Start the owning task on `handle`.
    pub fn spawn(handle: &Handle) -> Self {
        let maps = Arc::new(RwLock::new(Maps::default()));
        let (tx, rx) = mpsc::unbounded_channel();
        handle.spawn(run(rx, Arc::clone(&maps)));
        Self { maps, tx }
    }

    /// Queue `event` and wait until it is visible to lookups.
    pub async fn apply(&self, event: DirectoryEvent) {
        let (ack, done) = oneshot::channel();
        if self.tx.send(Command { event, ack }).is_err() {
            tracing::warn!("[directory] owner task gone, dropping update");
            return;
        }
        let _ = done.await;
    }

    fn read(&self) -> RwLockReadGuard<'_, Maps> {
        // A poisoned lock still holds the last fully applied state.
        self.maps.read().unwrap_or_else(|e| e.into_inner())
    }

    /// Case-insensitive.
    pub fn uuid_of(&self, name: &str) -> Option<Uuid> {
        self.read().by_name.get(&name.to_lowercase()).copied()
    }

    pub fn name_of(&self, uuid: Uuid) -> Option<String> {
        self.read().names.get(&uuid).cloned()
    }

    /// None when the player is unknown or unlinked.
    pub fn chat_account_of(&self, uuid: Uuid) -> Option<u64> {
        self.read().chat.get(&uuid).copied()
    }

    pub fn uuid_of_chat_account(&self, account: u64) -> Option<Uuid> {
        self.read().by_chat.get(&account).copied()
    }

    /// Number of known players.
    pub fn len(&self) -> usize {
        self.read().names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Every cached (uuid, name, chat account) triple, sorted by uuid.
    pub fn snapshot(&self) -> Vec<DirectoryRow> {
        let maps = self.read();
        let mut rows: Vec<DirectoryRow> = maps
            .names
            .iter()
            .map(|(uuid, name)| DirectoryRow {
                uuid: *uuid,
                name: name.clone(),
                chat_account: maps.chat.get(uuid).copied().unwrap_or(0),
            })
            .collect();
        rows.sort_by_key(|r| r.uuid);
        rows
    }
}

async fn run(mut rx: mpsc::UnboundedReceiver<Command>, maps: Arc<RwLock<Maps>>) {
    while let Some(cmd) = rx.recv().await {
        {
            let mut guard = maps.write().unwrap_or_else(|e| e.into_inner());
            guard.apply(cmd.event);
        }
        let _ = cmd.ack.send(());
    }
    tracing::debug!("[directory] owner task stopped");
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(uuid: Uuid, name: &str, chat_account: u64) -> DirectoryRow {
        DirectoryRow { uuid, name: name.to_string(), chat_account }
    }

    #[tokio::test]
    async fn test_loaded_populates_all_maps() {
        let dir = Directory::spawn(&Handle::current());
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        dir.apply(DirectoryEvent::Loaded(vec![row(a, "Ash", 0), row(b, "Birch", 77)])).await;

        assert_eq!(dir.len(), 2);
        assert_eq!(dir.uuid_of("ash"), Some(a));
        assert_eq!(dir.uuid_of("BIRCH"), Some(b));
        assert_eq!(dir.name_of(b).as_deref(), Some("Birch"));
        assert_eq!(dir.chat_account_of(a), None);
        assert_eq!(dir.chat_account_of(b), Some(77));
        assert_eq!(dir.uuid_of_chat_account(77), Some(b));
    }

    #[tokio::test]
    async fn test_rename_drops_old_name() {
        let dir = Directory::spawn(&Handle::current());
        let u = Uuid::new_v4();
        dir.apply(DirectoryEvent::Seen { uuid: u, name: "Ash".into() }).await;
        dir.apply(DirectoryEvent::Seen { uuid: u, name: "Ash2".into() }).await;

        assert_eq!(dir.uuid_of("Ash"), None);
        assert_eq!(dir.uuid_of("Ash2"), Some(u));
        assert_eq!(dir.len(), 1);
    }

    #[tokio::test]
    async fn test_name_taken_over_keeps_new_owner() {
        let dir = Directory::spawn(&Handle::current());
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        dir.apply(DirectoryEvent::Seen { uuid: a, name: "Ash".into() }).await;
        dir.apply(DirectoryEvent::Seen { uuid: b, name: "Ash".into() }).await;
        // a renames away; must not remove b's claim on "ash"
        dir.apply(DirectoryEvent::Seen { uuid: a, name: "Oak".into() }).await;

        assert_eq!(dir.uuid_of("ash"), Some(b));
        assert_eq!(dir.uuid_of("oak"), Some(a));
    }

    #[tokio::test]
    async fn test_chat_link_moves_between_players() {
        let dir = Directory::spawn(&Handle::current());
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        dir.apply(DirectoryEvent::ChatLinked { uuid: a, account: 5 }).await;
        dir.apply(DirectoryEvent::ChatLinked { uuid: b, account: 5 }).await;

        assert_eq!(dir.chat_account_of(a), None);
        assert_eq!(dir.chat_account_of(b), Some(5));
        assert_eq!(dir.uuid_of_chat_account(5), Some(b));
    }

    #[tokio::test]
    async fn test_unlink_with_zero() {
        let dir = Directory::spawn(&Handle::current());
        let a = Uuid::new_v4();
        dir.apply(DirectoryEvent::ChatLinked { uuid: a, account: 5 }).await;
        dir.apply(DirectoryEvent::ChatLinked { uuid: a, account: 0 }).await;

        assert_eq!(dir.chat_account_of(a), None);
        assert_eq!(dir.uuid_of_chat_account(5), None);
    }

    #[tokio::test]
    async fn test_live_write_beats_late_scan() {
        let dir = Directory::spawn(&Handle::current());
        let a = Uuid::new_v4();
        dir.apply(DirectoryEvent::Seen { uuid: a, name: "Fresh".into() }).await;
        dir.apply(DirectoryEvent::Loaded(vec![row(a, "Stale", 0)])).await;

        assert_eq!(dir.name_of(a).as_deref(), Some("Fresh"));
        assert_eq!(dir.uuid_of("stale"), None);
    }

    #[tokio::test]
    async fn test_snapshot_matches_loaded_rows() {
        let dir = Directory::spawn(&Handle::current());
        let mut rows = vec![row(Uuid::new_v4(), "A", 1), row(Uuid::new_v4(), "B", 0)];
        dir.apply(DirectoryEvent::Loaded(rows.clone())).await;

        rows.sort_by_key(|r| r.uuid);
        assert_eq!(dir.snapshot(), rows);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_lookups_during_population() {
        let dir = Directory::spawn(&Handle::current());
        let rows: Vec<DirectoryRow> = (0..500)
            .map(|i| row(Uuid::new_v4(), &format!("p{i}"), i as u64 + 1))
            .collect();

        let reader = {
            let dir = dir.clone();
            tokio::spawn(async move {
                for _ in 0..1000 {
                    // must never panic or observe a torn entry
                    if let Some(u) = dir.uuid_of("p10") {
                        assert_eq!(dir.name_of(u).as_deref(), Some("p10"));
                    }
                    tokio::task::yield_now().await;
                }
            })
        };
        dir.apply(DirectoryEvent::Loaded(rows)).await;
        reader.await.unwrap();
        assert_eq!(dir.len(), 500);
    }
}
