//! macOS 14 Sonoma `chat.db` layout.

use super::{COMMON_INDEXES, COMMON_TABLES, TRIGGERS};

/// `_ClientVersion` written to `_SqliteDatabaseProperties`
pub const CLIENT_VERSION: &str = "14001";

/// Sonoma `message` table, before the satellite and scheduling columns
pub const MESSAGE_TABLE: &str = include_str!("sql/sonoma_message.sql");

/// DDL batches in execution order
#[must_use]
pub fn ddl() -> Vec<&'static str> {
    vec![COMMON_TABLES, MESSAGE_TABLE, COMMON_INDEXES, TRIGGERS]
}
