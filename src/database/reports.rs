use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use super::dispatcher::Pending;
use super::{now, Shared};

/// Moderation report urgency, ordered lowest to highest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Priority {
    Low,
    Normal,
    High,
    Urgent,
}

impl Priority {
    pub const ALL: [Priority; 4] = [Priority::Low, Priority::Normal, Priority::High, Priority::Urgent];

    /// Value stored in the `priority` column.
    pub fn value(self) -> i32 {
        match self {
            Priority::Low => 0,
            Priority::Normal => 1,
            Priority::High => 2,
            Priority::Urgent => 3,
        }
    }

    pub fn from_value(v: i32) -> Option<Priority> {
        Priority::ALL.into_iter().find(|p| p.value() == v)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Normal => "normal",
            Priority::High => "high",
            Priority::Urgent => "urgent",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown priority {0:?} (expected low, normal, high or urgent)")]
pub struct ParsePriorityError(String);

impl FromStr for Priority {
    type Err = ParsePriorityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_ascii_lowercase();
        Priority::ALL
            .into_iter()
            .find(|p| p.as_str() == lower)
            .ok_or_else(|| ParsePriorityError(s.to_string()))
    }
}

/// Priority updates for moderation reports. Report bodies live elsewhere.
#[derive(Clone)]
pub struct ReportStore {
    shared: Arc<Shared>,
}

impl ReportStore {
    pub(crate) fn new(shared: Arc<Shared>) -> Self {
        Self { shared }
    }

    /// Set `priority` on report `id` and stamp it as touched now.
    pub fn touch(&self, id: i64, priority: Priority) -> Pending<()> {
        let Some(backend) = self.shared.backend.clone() else {
            return Pending::ready(());
        };
        self.shared.dispatcher.fire("reports.touch", async move {
            backend.update_report(id, priority.value(), now()).await?;
            tracing::debug!("[reports] [touch] id={} priority={}", id, priority);
            Ok(())
        })
    }
}
