use std::sync::Arc;

use uuid::Uuid;

use super::dispatcher::Pending;
use super::{now, Shared};
use crate::model::NewsEntry;

/// Append-only news feed.
#[derive(Clone)]
pub struct NewsStore {
    shared: Arc<Shared>,
}

impl NewsStore {
    pub(crate) fn new(shared: Arc<Shared>) -> Self {
        Self { shared }
    }

    /// Append an entry; `author` is None for system announcements.
    /// On success the entry becomes [`super::Database::latest_news`] unless
    /// a higher-id entry is already cached.
    pub fn publish(&self, author: Option<Uuid>, content: &str) -> Pending<()> {
        let Some(backend) = self.shared.backend.clone() else {
            return Pending::ready(());
        };
        let shared = Arc::clone(&self.shared);
        let content = content.to_string();

        self.shared.dispatcher.fire("news.publish", async move {
            let created_at = now();
            let id = backend.insert_news(author, &content, created_at).await?;
            tracing::info!("[news] [published] id={} author={:?}", id, author);
            if !shared.offer_latest_news(NewsEntry { id, content, created_at, author }) {
                tracing::debug!("[news] [published] id={} finished after a newer entry", id);
            }
            Ok(())
        })
    }

    /// Highest-id entry, or None on an empty feed.
    pub fn latest(&self) -> Pending<Option<NewsEntry>> {
        let Some(backend) = self.shared.backend.clone() else {
            return Pending::ready(None);
        };
        self.shared.dispatcher.submit(async move {
            backend.select_latest_news().await.map_err(|e| {
                tracing::warn!("[news] [latest] {}", e);
                e
            })
        })
    }
}
