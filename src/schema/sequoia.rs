//! macOS 15 Sequoia `chat.db` layout.
//!
//! Adds satellite messaging, scheduled sends and message recovery columns to
//! the `message` table.

use super::{COMMON_INDEXES, COMMON_TABLES, TRIGGERS};

/// `_ClientVersion` written to `_SqliteDatabaseProperties`
pub const CLIENT_VERSION: &str = "15001";

/// Sequoia `message` table
pub const MESSAGE_TABLE: &str = include_str!("sql/sequoia_message.sql");

/// Indexes over the columns Sequoia introduced
pub const MESSAGE_INDEXES: &str = include_str!("sql/sequoia_indexes.sql");

/// DDL batches in execution order
#[must_use]
pub fn ddl() -> Vec<&'static str> {
    vec![COMMON_TABLES, MESSAGE_TABLE, COMMON_INDEXES, MESSAGE_INDEXES, TRIGGERS]
}
