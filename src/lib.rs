//! Playerbase - persistence and identity resolution for a game network
//!
//! Player identity records, the news feed and moderation-report priorities,
//! stored in MariaDB behind one pooled, asynchronous data layer.

/// Data-layer configuration
pub mod config;
/// Store operations, connection pool and dispatcher
pub mod database;
/// In-memory name/uuid/chat-account lookups
pub mod directory;
/// Records passed in and out of the stores
pub mod model;

pub use database::{Database, DbError, Pending};
