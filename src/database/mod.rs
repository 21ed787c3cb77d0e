use std::sync::{Arc, RwLock};

use chrono::{DateTime, SubsecRound, Utc};

pub mod backend;
pub mod dispatcher;
pub mod error;
pub mod mysql;
pub mod news;
pub mod players;
pub mod pool;
pub mod reports;

pub use backend::{Backend, DirectoryRow};
pub use dispatcher::{Dispatcher, Pending};
pub use error::DbError;
pub use news::NewsStore;
pub use players::PlayerStore;
pub use pool::ProbePolicy;
pub use reports::{Priority, ReportStore};

use crate::config::DatabaseConfig;
use crate::directory::{Directory, DirectoryEvent};
use crate::model::NewsEntry;

/// Timestamps are stored with whole-second precision.
pub(crate) fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(0)
}

pub(crate) struct Shared {
    /// None when the layer is disabled.
    pub(crate) backend: Option<Arc<dyn Backend>>,
    pub(crate) dispatcher: Dispatcher,
    pub(crate) directory: Directory,
    pub(crate) latest_news: RwLock<Option<NewsEntry>>,
}

impl Shared {
    /// Replace the cached latest entry unless it already holds a newer one.
    /// Publishes can finish out of id order.
    pub(crate) fn offer_latest_news(&self, entry: NewsEntry) -> bool {
        let mut slot = self.latest_news.write().unwrap_or_else(|e| e.into_inner());
        match slot.as_ref() {
            Some(current) if current.id >= entry.id => false,
            _ => {
                *slot = Some(entry);
                true
            }
        }
    }
}

/// The process's data layer. Build one at startup and hand clones to
/// whoever needs it; clones share the pool, dispatcher and directory.
///
/// A disabled `Database` (no connectivity at startup, or `enabled: false`)
/// still answers every call: writes do nothing and reads come back absent.
#[derive(Clone)]
pub struct Database {
    shared: Arc<Shared>,
}

impl Database {
    /// Connect using `config`, probe, and warm the directory.
    ///
    /// Never fails: if the store cannot be reached the returned layer is
    /// disabled for the life of the process.
    pub async fn open(config: &DatabaseConfig, dispatcher: Dispatcher) -> Database {
        if !config.enabled {
            tracing::info!("[db] [disabled] database features turned off in config");
            return Database::disabled(dispatcher);
        }

        let pool = match pool::build_pool(config) {
            Ok(pool) => pool,
            Err(e) => {
                tracing::error!("[db] [disabled] bad connection settings: {}", e);
                return Database::disabled(dispatcher);
            }
        };

        let backend: Arc<dyn Backend> = Arc::new(mysql::MySqlBackend::new(pool));
        Database::start(backend, dispatcher, ProbePolicy::from_config(config)).await
    }

    /// Probe `backend`, then load the directory and latest news before
    /// returning. A failed probe yields a disabled layer.
    pub async fn start(backend: Arc<dyn Backend>, dispatcher: Dispatcher, policy: ProbePolicy) -> Database {
        if let Err(e) = pool::probe(backend.as_ref(), policy).await {
            if e.is_connection() && !e.is_transient() {
                tracing::error!("[db] [disabled] cannot connect to database, check configuration: {}", e);
            } else {
                tracing::error!("[db] [disabled] startup probe failed: {}", e);
            }
            return Database::disabled(dispatcher);
        }

        let db = Database::with_backend(Some(backend), dispatcher);
        db.warm().await;
        tracing::info!("[db] [ready] players={}", db.directory().len());
        db
    }

    /// Layer with no store behind it.
    pub fn disabled(dispatcher: Dispatcher) -> Database {
        Database::with_backend(None, dispatcher)
    }

    fn with_backend(backend: Option<Arc<dyn Backend>>, dispatcher: Dispatcher) -> Database {
        let directory = Directory::spawn(dispatcher.handle());
        Database {
            shared: Arc::new(Shared {
                backend,
                dispatcher,
                directory,
                latest_news: RwLock::new(None),
            }),
        }
    }

    async fn warm(&self) {
        let Some(backend) = self.shared.backend.clone() else {
            return;
        };

        let scan = self.shared.dispatcher.submit({
            let backend = Arc::clone(&backend);
            async move { backend.select_directory().await }
        });
        match scan.await {
            Ok(rows) => self.shared.directory.apply(DirectoryEvent::Loaded(rows)).await,
            Err(e) => tracing::error!("[db] [warm] directory scan failed: {}", e),
        }

        match self.news().latest().await {
            Ok(Some(entry)) => {
                self.shared.offer_latest_news(entry);
            }
            Ok(None) => {}
            Err(e) => tracing::error!("[db] [warm] latest news failed: {}", e),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.shared.backend.is_some()
    }

    pub fn players(&self) -> PlayerStore {
        PlayerStore::new(Arc::clone(&self.shared))
    }

    pub fn news(&self) -> NewsStore {
        NewsStore::new(Arc::clone(&self.shared))
    }

    pub fn reports(&self) -> ReportStore {
        ReportStore::new(Arc::clone(&self.shared))
    }

    pub fn directory(&self) -> &Directory {
        &self.shared.directory
    }

    /// Highest-id news entry seen at startup or published since.
    pub fn latest_news(&self) -> Option<NewsEntry> {
        self.shared
            .latest_news
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}
