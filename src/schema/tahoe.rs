//! macOS 26 Tahoe `chat.db` layout.
//!
//! Tables match Sequoia; only the client version differs.

/// `_ClientVersion` written to `_SqliteDatabaseProperties`
pub const CLIENT_VERSION: &str = "26001";

/// DDL batches in execution order
#[must_use]
pub fn ddl() -> Vec<&'static str> {
    super::sequoia::ddl()
}
