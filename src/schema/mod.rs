//! Database schema definitions
//!
//! This module provides the versioned `chat.db` DDL applied by the database
//! writer, plus constants for the table and column names the writer touches.

pub mod sequoia;
pub mod sonoma;
pub mod tahoe;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::debug;

/// Tables shared by every supported version
pub const COMMON_TABLES: &str = include_str!("sql/common_tables.sql");

/// Indexes shared by every supported version
pub const COMMON_INDEXES: &str = include_str!("sql/common_indexes.sql");

/// Cascade and sync bookkeeping triggers
pub const TRIGGERS: &str = include_str!("sql/triggers.sql");

/// Major macOS version to schema mapping
pub const VERSION_MAP: [(u32, SchemaVersion); 3] = [
    (14, SchemaVersion::Sonoma),
    (15, SchemaVersion::Sequoia),
    (26, SchemaVersion::Tahoe),
];

/// Supported macOS `chat.db` layouts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SchemaVersion {
    /// macOS 14
    Sonoma,
    /// macOS 15
    #[default]
    Sequoia,
    /// macOS 26
    Tahoe,
}

impl SchemaVersion {
    /// Lowercase version name
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Sonoma => "sonoma",
            Self::Sequoia => "sequoia",
            Self::Tahoe => "tahoe",
        }
    }

    /// Resolve a version name (`"sonoma"`) or a macOS version string (`"15.1"`).
    ///
    /// Unknown input maps to Sequoia.
    #[must_use]
    pub fn parse(value: &str) -> Self {
        let value = value.trim().to_lowercase();
        match value.as_str() {
            "sonoma" => Self::Sonoma,
            "sequoia" => Self::Sequoia,
            "tahoe" => Self::Tahoe,
            _ => Self::from_major(major_version(&value)),
        }
    }

    /// Schema for a major macOS version, Sequoia when unknown
    #[must_use]
    pub fn from_major(major: u32) -> Self {
        VERSION_MAP
            .iter()
            .find(|(m, _)| *m == major)
            .map_or(Self::Sequoia, |(_, version)| *version)
    }

    /// Detect the schema matching the running macOS, Sequoia elsewhere
    #[must_use]
    pub fn detect() -> Self {
        let detected = macos_version().map_or(Self::Sequoia, |v| Self::parse(&v));
        debug!(schema = %detected, "Detected schema version");
        detected
    }

    /// `_ClientVersion` metadata value
    #[must_use]
    pub const fn client_version(&self) -> &'static str {
        match self {
            Self::Sonoma => sonoma::CLIENT_VERSION,
            Self::Sequoia => sequoia::CLIENT_VERSION,
            Self::Tahoe => tahoe::CLIENT_VERSION,
        }
    }

    /// DDL batches (tables, indexes, triggers) in execution order
    #[must_use]
    pub fn ddl(&self) -> Vec<&'static str> {
        match self {
            Self::Sonoma => sonoma::ddl(),
            Self::Sequoia => sequoia::ddl(),
            Self::Tahoe => tahoe::ddl(),
        }
    }

    /// Rows for `_SqliteDatabaseProperties`
    #[must_use]
    pub fn metadata(&self) -> Vec<(&'static str, String)> {
        vec![
            ("_ClientVersion", self.client_version().to_string()),
            ("__CSDBRecordSequenceNumber", "0".to_string()),
            ("counter_in_all", "0".to_string()),
            ("counter_out_all", "0".to_string()),
            ("counter_in_add", "0".to_string()),
            ("counter_out_add", "0".to_string()),
            ("counter_last_all_update", "0".to_string()),
        ]
    }
}

impl fmt::Display for SchemaVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SchemaVersion {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::parse(s))
    }
}

/// Leading integer of a dotted version string, 0 when absent
#[must_use]
pub fn major_version(version: &str) -> u32 {
    version
        .split('.')
        .next()
        .and_then(|major| major.trim().parse().ok())
        .unwrap_or(0)
}

fn macos_version() -> Option<String> {
    if !cfg!(target_os = "macos") {
        return None;
    }
    let output = std::process::Command::new("sw_vers")
        .arg("-productVersion")
        .output()
        .ok()?;
    if !output.status.success() {
        return None;
    }
    let version = String::from_utf8_lossy(&output.stdout).trim().to_string();
    (!version.is_empty()).then_some(version)
}

/// Handle table schema
pub mod handle {
    /// Table name
    pub const TABLE: &str = "handle";
    /// Row id column
    pub const ROWID: &str = "ROWID";
    /// Phone number or email
    pub const ID: &str = "id";
    /// Country code column
    pub const COUNTRY: &str = "country";
    /// Service column
    pub const SERVICE: &str = "service";
    /// Identifier as originally typed
    pub const UNCANONICALIZED_ID: &str = "uncanonicalized_id";
}

/// Chat table schema
pub mod chat {
    /// Table name
    pub const TABLE: &str = "chat";
    /// Row id column
    pub const ROWID: &str = "ROWID";
    /// Chat GUID column
    pub const GUID: &str = "guid";
    /// Style column (43 direct, 45 group)
    pub const STYLE: &str = "style";
    /// State column
    pub const STATE: &str = "state";
    /// Chat identifier column
    pub const CHAT_IDENTIFIER: &str = "chat_identifier";
    /// Service name column
    pub const SERVICE_NAME: &str = "service_name";
    /// Display name column
    pub const DISPLAY_NAME: &str = "display_name";
}

/// Message table schema
pub mod message {
    /// Table name
    pub const TABLE: &str = "message";
    /// Row id column
    pub const ROWID: &str = "ROWID";
    /// Message GUID column
    pub const GUID: &str = "guid";
    /// Text column
    pub const TEXT: &str = "text";
    /// Sender handle column, 0 for outgoing
    pub const HANDLE_ID: &str = "handle_id";
    /// Service column
    pub const SERVICE: &str = "service";
    /// Apple-epoch nanoseconds
    pub const DATE: &str = "date";
    /// Read timestamp column
    pub const DATE_READ: &str = "date_read";
    /// Delivery timestamp column
    pub const DATE_DELIVERED: &str = "date_delivered";
    /// Outgoing flag
    pub const IS_FROM_ME: &str = "is_from_me";
    /// Sent flag
    pub const IS_SENT: &str = "is_sent";
    /// Delivered flag
    pub const IS_DELIVERED: &str = "is_delivered";
    /// Read flag
    pub const IS_READ: &str = "is_read";
    /// Finished flag
    pub const IS_FINISHED: &str = "is_finished";
    /// Attachment cache flag
    pub const CACHE_HAS_ATTACHMENTS: &str = "cache_has_attachments";
}

/// Attachment table schema
pub mod attachment {
    /// Table name
    pub const TABLE: &str = "attachment";
    /// Row id column
    pub const ROWID: &str = "ROWID";
    /// Attachment GUID column
    pub const GUID: &str = "guid";
    /// GUID before any transcoding
    pub const ORIGINAL_GUID: &str = "original_guid";
    /// Creation timestamp column
    pub const CREATED_DATE: &str = "created_date";
    /// File name column
    pub const FILENAME: &str = "filename";
    /// Uniform Type Identifier column
    pub const UTI: &str = "uti";
    /// MIME type column
    pub const MIME_TYPE: &str = "mime_type";
    /// Transfer state column
    pub const TRANSFER_STATE: &str = "transfer_state";
    /// Outgoing flag
    pub const IS_OUTGOING: &str = "is_outgoing";
    /// Size column
    pub const TOTAL_BYTES: &str = "total_bytes";
}

/// `chat_handle_join` schema
pub mod chat_handle_join {
    /// Table name
    pub const TABLE: &str = "chat_handle_join";
    /// Chat foreign key
    pub const CHAT_ID: &str = "chat_id";
    /// Handle foreign key
    pub const HANDLE_ID: &str = "handle_id";
}

/// `chat_message_join` schema
pub mod chat_message_join {
    /// Table name
    pub const TABLE: &str = "chat_message_join";
    /// Chat foreign key
    pub const CHAT_ID: &str = "chat_id";
    /// Message foreign key
    pub const MESSAGE_ID: &str = "message_id";
    /// Copy of the message date
    pub const MESSAGE_DATE: &str = "message_date";
}

/// `message_attachment_join` schema
pub mod message_attachment_join {
    /// Table name
    pub const TABLE: &str = "message_attachment_join";
    /// Message foreign key
    pub const MESSAGE_ID: &str = "message_id";
    /// Attachment foreign key
    pub const ATTACHMENT_ID: &str = "attachment_id";
}

/// `_SqliteDatabaseProperties` schema
pub mod properties {
    /// Table name
    pub const TABLE: &str = "_SqliteDatabaseProperties";
    /// Key column
    pub const KEY: &str = "key";
    /// Value column
    pub const VALUE: &str = "value";
    /// Key of the per-database unique identifier row
    pub const UNIQUE_IDENTIFIER: &str = "_UniqueIdentifier";
}
