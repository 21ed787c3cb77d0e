//! Player Record Store: everything that reads or writes the player table.
//!
//! Writes resolve only after the directory has applied their effect.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::backend::Backend;
use super::dispatcher::Pending;
use super::error::DbError;
use super::{now, Shared};
use crate::directory::DirectoryEvent;
use crate::model::{PlayerRecord, PlayerUpdate, Preferences};

#[derive(Clone)]
pub struct PlayerStore {
    shared: Arc<Shared>,
}

impl PlayerStore {
    pub(crate) fn new(shared: Arc<Shared>) -> Self {
        Self { shared }
    }

    fn backend(&self) -> Option<Arc<dyn Backend>> {
        self.shared.backend.clone()
    }

    /// First contact or reconnect of `uuid` under `name`.
    ///
    /// Unknown players get a fresh row (first seen = last seen = now).
    /// Known players get last seen refreshed and, if `name` differs from
    /// the stored one, a rename; the resolved record carries `name` either way.
    /// Two first contacts racing on one uuid both resolve to the same row.
    /// Resolves `Ok(None)` only on a disabled layer.
    pub fn join(&self, uuid: Uuid, name: &str) -> Pending<Option<PlayerRecord>> {
        let Some(backend) = self.backend() else {
            return Pending::ready(None);
        };
        let shared = Arc::clone(&self.shared);
        let name = name.to_string();

        self.shared.dispatcher.submit(async move {
            let now = now();
            let existing = backend.select_player(uuid).await.map_err(|e| {
                tracing::error!("[players] [join] fetch failed uuid={}: {}", uuid, e);
                e
            })?;

            let record = match existing {
                Some(record) => reconnect(backend.as_ref(), record, name, now).await?,
                None => match backend.insert_player(uuid, &name, now).await {
                    Ok(row_id) => {
                        tracing::info!("[players] [first_join] uuid={} name={} id={}", uuid, name, row_id);
                        PlayerRecord::first_contact(uuid, row_id, &name, now)
                    }
                    Err(e) if e.is_conflict() => {
                        tracing::debug!("[players] [join] concurrent first join uuid={}, reusing row", uuid);
                        match backend.select_player(uuid).await? {
                            Some(record) => reconnect(backend.as_ref(), record, name, now).await?,
                            None => return Err(e),
                        }
                    }
                    Err(e) => {
                        tracing::error!("[players] [join] insert failed uuid={} name={}: {}", uuid, name, e);
                        return Err(e);
                    }
                },
            };

            shared
                .directory
                .apply(DirectoryEvent::Seen { uuid, name: record.name.clone() })
                .await;
            Ok(Some(record))
        })
    }

    /// Resolves `Ok(None)` if `uuid` never joined.
    pub fn fetch(&self, uuid: Uuid) -> Pending<Option<PlayerRecord>> {
        let Some(backend) = self.backend() else {
            return Pending::ready(None);
        };
        self.shared.dispatcher.submit(async move {
            backend.select_player(uuid).await.map_err(|e| {
                tracing::error!("[players] [fetch] uuid={}: {}", uuid, e);
                e
            })
        })
    }

    /// Write last seen (stamped now), preferences, timezone and both links
    /// in one statement. A non-zero chat account is taken from whoever else
    /// holds it first, as in [`Self::set_linked_chat_account`].
    pub fn update(&self, update: PlayerUpdate) -> Pending<()> {
        let Some(backend) = self.backend() else {
            return Pending::ready(());
        };
        let shared = Arc::clone(&self.shared);
        self.shared.dispatcher.fire("players.update", async move {
            let evicted = backend.update_player(&update, now()).await?;
            for other in &evicted {
                tracing::info!(
                    "[players] [update] chat account={} moved from {} to {}",
                    update.chat_account,
                    other,
                    update.uuid
                );
            }
            shared
                .directory
                .apply(DirectoryEvent::ChatLinked { uuid: update.uuid, account: update.chat_account })
                .await;
            Ok(())
        })
    }

    /// Give chat `account` to `uuid`, clearing it from any other player first.
    ///
    /// The two steps are not a transaction. Repeating the call with the same
    /// arguments always converges on the same state, so a crash between them
    /// is repaired by the next call. `account == 0` unlinks.
    pub fn set_linked_chat_account(&self, uuid: Uuid, account: u64) -> Pending<()> {
        let Some(backend) = self.backend() else {
            return Pending::ready(());
        };
        let shared = Arc::clone(&self.shared);
        self.shared.dispatcher.fire("players.set_chat_account", async move {
            let evicted = backend.relink_chat_account(uuid, account).await?;
            for other in &evicted {
                tracing::info!("[players] [chat_link] account={} moved from {} to {}", account, other, uuid);
            }
            shared.directory.apply(DirectoryEvent::ChatLinked { uuid, account }).await;
            Ok(())
        })
    }

    pub fn set_linked_forum_account(&self, uuid: Uuid, handle: Option<String>) -> Pending<()> {
        let Some(backend) = self.backend() else {
            return Pending::ready(());
        };
        self.shared.dispatcher.fire("players.set_forum_account", async move {
            backend.update_forum_account(uuid, handle.as_deref()).await
        })
    }

    pub fn set_timezone(&self, uuid: Uuid, tz: Option<String>) -> Pending<()> {
        let Some(backend) = self.backend() else {
            return Pending::ready(());
        };
        self.shared.dispatcher.fire("players.set_timezone", async move {
            backend.update_timezone(uuid, tz.as_deref()).await
        })
    }

    pub fn set_preferences(&self, uuid: Uuid, prefs: Preferences) -> Pending<()> {
        let Some(backend) = self.backend() else {
            return Pending::ready(());
        };
        self.shared.dispatcher.fire("players.set_preferences", async move {
            backend.update_preferences(uuid, prefs).await
        })
    }

    /// Single-field read: `absent` when the player has no row; query
    /// failures still come back as `Err`.
    fn read_field<T, F>(&self, op: &'static str, uuid: Uuid, absent: T, project: F) -> Pending<T>
    where
        T: Send + 'static,
        F: FnOnce(PlayerRecord) -> T + Send + 'static,
    {
        let Some(backend) = self.backend() else {
            return Pending::ready(absent);
        };
        self.shared.dispatcher.submit(async move {
            match backend.select_player(uuid).await {
                Ok(Some(record)) => Ok(project(record)),
                Ok(None) => Ok(absent),
                Err(e) => {
                    tracing::warn!("[players] [{}] uuid={}: {}", op, uuid, e);
                    Err::<T, DbError>(e)
                }
            }
        })
    }

    pub fn get_first_seen(&self, uuid: Uuid) -> Pending<Option<DateTime<Utc>>> {
        self.read_field("first_seen", uuid, None, |r| Some(r.first_seen))
    }

    pub fn get_last_seen(&self, uuid: Uuid) -> Pending<Option<DateTime<Utc>>> {
        self.read_field("last_seen", uuid, None, |r| Some(r.last_seen))
    }

    pub fn get_timezone(&self, uuid: Uuid) -> Pending<Option<String>> {
        self.read_field("timezone", uuid, None, |r| r.timezone)
    }

    /// 0 when unlinked or unknown.
    pub fn get_linked_chat_account(&self, uuid: Uuid) -> Pending<u64> {
        self.read_field("chat_account", uuid, 0, |r| r.chat_account)
    }

    pub fn get_linked_forum_account(&self, uuid: Uuid) -> Pending<Option<String>> {
        self.read_field("forum_account", uuid, None, |r| r.forum_account)
    }

    /// Unset and unknown both read as [`Preferences::NONE`].
    pub fn get_preferences(&self, uuid: Uuid) -> Pending<Preferences> {
        self.read_field("preferences", uuid, Preferences::NONE, |r| r.preferences)
    }
}

/// Existing-record half of `join`: rename if needed and refresh last seen.
async fn reconnect(
    backend: &dyn Backend,
    mut record: PlayerRecord,
    name: String,
    now: DateTime<Utc>,
) -> Result<PlayerRecord, DbError> {
    let uuid = record.uuid;
    if record.name != name {
        backend.update_name_and_last_seen(uuid, &name, now).await.map_err(|e| {
            tracing::error!("[players] [join] rename failed uuid={}: {}", uuid, e);
            e
        })?;
        tracing::info!("[players] [rename] uuid={} old={} new={}", uuid, record.name, name);
        record.name = name;
        record.last_seen = now;
    } else {
        match backend.update_last_seen(uuid, now).await {
            Ok(()) => record.last_seen = now,
            // record keeps the stored last seen; the next update() catches up
            Err(e) => tracing::warn!("[players] [join] last seen refresh failed uuid={}: {}", uuid, e),
        }
    }
    Ok(record)
}
