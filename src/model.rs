//! Records handed across the data-layer boundary.

use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Per-player boolean settings packed into one integer column.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Preferences(pub u32);

impl Preferences {
    pub const NONE: Preferences = Preferences(0);

    pub fn bits(self) -> u32 {
        self.0
    }

    /// `bit` is an index (0..32), not a mask.
    pub fn get(self, bit: u8) -> bool {
        bit < 32 && self.0 & (1 << bit) != 0
    }

    pub fn with(self, bit: u8, on: bool) -> Preferences {
        if bit >= 32 {
            return self;
        }
        if on {
            Preferences(self.0 | (1 << bit))
        } else {
            Preferences(self.0 & !(1 << bit))
        }
    }
}

/// One row of the player table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayerRecord {
    /// Stable platform identity; the key for every store operation.
    pub uuid: Uuid,
    /// Auto-increment row number assigned by the store.
    pub row_id: i64,
    pub name: String,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    pub timezone: Option<String>,
    /// 0 means unlinked.
    pub chat_account: u64,
    pub forum_account: Option<String>,
    pub preferences: Preferences,
}

impl PlayerRecord {
    /// Record minted on a player's first contact: first and last seen are both `now`.
    pub fn first_contact(uuid: Uuid, row_id: i64, name: &str, now: DateTime<Utc>) -> Self {
        Self {
            uuid,
            row_id,
            name: name.to_string(),
            first_seen: now,
            last_seen: now,
            timezone: None,
            chat_account: 0,
            forum_account: None,
            preferences: Preferences::NONE,
        }
    }

    /// Snapshot of the fields the bulk `update` write refreshes.
    pub fn to_update(&self) -> PlayerUpdate {
        PlayerUpdate {
            uuid: self.uuid,
            preferences: self.preferences,
            timezone: self.timezone.clone(),
            chat_account: self.chat_account,
            forum_account: self.forum_account.clone(),
        }
    }
}

/// Full set of fields written by `PlayerStore::update`.
///
/// There is no partial form: every field is written, so build it from
/// the complete current record with [`PlayerRecord::to_update`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayerUpdate {
    pub uuid: Uuid,
    pub preferences: Preferences,
    pub timezone: Option<String>,
    pub chat_account: u64,
    pub forum_account: Option<String>,
}

/// One row of the news table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewsEntry {
    pub id: i64,
    pub content: String,
    pub created_at: DateTime<Utc>,
    /// None for system-authored entries.
    pub author: Option<Uuid>,
}
