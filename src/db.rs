//! `chat.db` writer.
//!
//! [`DatabaseBuilder`] owns one output database from creation to finalization.
//! It assigns every ROWID itself, tracks GUID uniqueness, and opens its SQLite
//! connection lazily so a run that fails validation leaves nothing on disk.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use rusqlite::backup::Backup;
use rusqlite::{params, Connection, Transaction};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{FoundryError, Result};
use crate::models::{ChatType, Persona, ServiceType};
use crate::schema::{
    attachment, chat, chat_handle_join, chat_message_join, handle, message, message_attachment_join, properties,
    SchemaVersion,
};

/// `chat.state` written for every generated chat
pub const CHAT_STATE: i64 = 3;

/// `attachment.transfer_state` for a completed transfer
pub const TRANSFER_STATE_FINISHED: i64 = 5;

const BACKUP_PAGES_PER_STEP: i32 = 256;

/// New message GUID, `p:0/<uuid>`
#[must_use]
pub fn message_guid() -> String {
    format!("p:0/{}", Uuid::new_v4())
}

/// New attachment GUID, `at_0_<uuid>`
#[must_use]
pub fn attachment_guid() -> String {
    format!("at_0_{}", Uuid::new_v4())
}

/// Chat GUID, `service;-;identifier` or `service;+;identifier`
#[must_use]
pub fn chat_guid(service: ServiceType, chat_type: ChatType, identifier: &str) -> String {
    let separator = match chat_type {
        ChatType::Direct => '-',
        ChatType::Group => '+',
    };
    format!("{service};{separator};{identifier}")
}

/// `(is_sent, is_delivered, is_read)` for a message direction
#[must_use]
pub const fn message_flags(is_from_me: bool) -> (bool, bool, bool) {
    if is_from_me {
        (true, true, false)
    } else {
        (false, true, true)
    }
}

/// Options for a [`DatabaseBuilder`]
#[derive(Debug, Clone)]
pub struct BuilderOptions {
    /// Final database location
    pub output_path: PathBuf,
    /// Schema layout, detected from the host when `None`
    pub schema_version: Option<SchemaVersion>,
    /// Build in memory and copy to `output_path` on finalize
    pub in_memory: bool,
}

impl BuilderOptions {
    /// File-backed options with an autodetected schema
    pub fn new(output_path: impl Into<PathBuf>) -> Self {
        Self {
            output_path: output_path.into(),
            schema_version: None,
            in_memory: false,
        }
    }

    /// Pin the schema version
    #[must_use]
    pub const fn with_schema(mut self, version: SchemaVersion) -> Self {
        self.schema_version = Some(version);
        self
    }

    /// Build in memory until finalize
    #[must_use]
    pub const fn in_memory(mut self, in_memory: bool) -> Self {
        self.in_memory = in_memory;
        self
    }
}

/// A single message insert
#[derive(Debug, Clone)]
pub struct NewMessage {
    /// Sender handle; ignored for outgoing messages
    pub handle_id: Option<i64>,
    /// Message body
    pub text: String,
    /// True when sent by the database owner
    pub is_from_me: bool,
    /// Apple-epoch nanoseconds
    pub date: i64,
    /// Service the message went over
    pub service: ServiceType,
    /// Explicit GUID, generated when `None`
    pub guid: Option<String>,
    /// Read timestamp
    pub date_read: Option<i64>,
    /// Delivery timestamp
    pub date_delivered: Option<i64>,
}

impl NewMessage {
    /// iMessage message with a generated GUID
    pub fn new(handle_id: Option<i64>, text: impl Into<String>, is_from_me: bool, date: i64) -> Self {
        Self {
            handle_id,
            text: text.into(),
            is_from_me,
            date,
            service: ServiceType::IMessage,
            guid: None,
            date_read: None,
            date_delivered: None,
        }
    }
}

/// One row of [`DatabaseBuilder::add_messages_batch`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchMessage {
    /// Sender handle; ignored for outgoing messages
    pub handle_id: Option<i64>,
    /// Message body
    pub text: String,
    /// True when sent by the database owner
    pub is_from_me: bool,
    /// Apple-epoch nanoseconds
    pub date: i64,
}

/// Attachment metadata insert
#[derive(Debug, Clone, Default)]
pub struct NewAttachment {
    /// File name
    pub filename: Option<String>,
    /// Uniform Type Identifier
    pub uti: Option<String>,
    /// MIME type
    pub mime_type: Option<String>,
    /// Size in bytes
    pub total_bytes: i64,
    /// True when sent by the database owner
    pub is_outgoing: bool,
    /// Apple-epoch nanoseconds
    pub created_date: Option<i64>,
    /// Explicit GUID, generated when `None`
    pub guid: Option<String>,
}

struct MessageRow<'a> {
    rowid: i64,
    guid: &'a str,
    chat_id: i64,
    handle_id: Option<i64>,
    text: &'a str,
    is_from_me: bool,
    date: i64,
    service: ServiceType,
    date_read: Option<i64>,
    date_delivered: Option<i64>,
}

fn insert_message(tx: &Transaction<'_>, row: &MessageRow<'_>) -> rusqlite::Result<()> {
    let handle_id = if row.is_from_me { 0 } else { row.handle_id.unwrap_or(0) };
    let (is_sent, is_delivered, is_read) = message_flags(row.is_from_me);

    tx.prepare_cached(&format!(
        "INSERT INTO {} ({}, {}, {}, {}, {}, {}, {}, {}, {}, {}, {}, {}, {}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 1)",
        message::TABLE,
        message::ROWID,
        message::GUID,
        message::TEXT,
        message::HANDLE_ID,
        message::SERVICE,
        message::DATE,
        message::DATE_READ,
        message::DATE_DELIVERED,
        message::IS_FROM_ME,
        message::IS_SENT,
        message::IS_DELIVERED,
        message::IS_READ,
        message::IS_FINISHED,
    ))?
    .execute(params![
        row.rowid,
        row.guid,
        row.text,
        handle_id,
        row.service.as_str(),
        row.date,
        row.date_read,
        row.date_delivered,
        row.is_from_me,
        is_sent,
        is_delivered,
        is_read,
    ])?;

    tx.prepare_cached(&format!(
        "INSERT INTO {} ({}, {}, {}) VALUES (?, ?, ?)",
        chat_message_join::TABLE,
        chat_message_join::CHAT_ID,
        chat_message_join::MESSAGE_ID,
        chat_message_join::MESSAGE_DATE,
    ))?
    .execute(params![row.chat_id, row.rowid, row.date])?;

    Ok(())
}

/// Writer for one `chat.db` file
pub struct DatabaseBuilder {
    output_path: PathBuf,
    version: SchemaVersion,
    in_memory: bool,
    conn: Option<Connection>,
    finalized: bool,
    closed: bool,

    next_handle_rowid: i64,
    next_chat_rowid: i64,
    next_message_rowid: i64,
    next_attachment_rowid: i64,

    message_guids: HashSet<String>,
    chat_guids: HashSet<String>,
    attachment_guids: HashSet<String>,

    handle_ids: HashMap<(String, ServiceType), i64>,
    chat_rowids: HashSet<i64>,
}

impl DatabaseBuilder {
    /// Create a builder. Nothing touches the filesystem until the first write.
    #[must_use]
    pub fn new(options: BuilderOptions) -> Self {
        let version = options.schema_version.unwrap_or_else(SchemaVersion::detect);
        Self {
            output_path: options.output_path,
            version,
            in_memory: options.in_memory,
            conn: None,
            finalized: false,
            closed: false,
            next_handle_rowid: 1,
            next_chat_rowid: 1,
            next_message_rowid: 1,
            next_attachment_rowid: 1,
            message_guids: HashSet::new(),
            chat_guids: HashSet::new(),
            attachment_guids: HashSet::new(),
            handle_ids: HashMap::new(),
            chat_rowids: HashSet::new(),
        }
    }

    /// Run `f` against a fresh builder, finalizing on success and closing on every path.
    pub fn scoped<T, F>(options: BuilderOptions, f: F) -> Result<T>
    where
        F: FnOnce(&mut Self) -> Result<T>,
    {
        let mut builder = Self::new(options);
        let outcome = f(&mut builder);
        builder.finish_with(outcome)
    }

    /// Settle a unit of work: finalize if it succeeded and the builder is not yet
    /// finalized, then close. The work's own error wins over a close error.
    pub fn finish_with<T>(&mut self, outcome: Result<T>) -> Result<T> {
        let result = match outcome {
            Ok(value) if self.finalized => Ok(value),
            Ok(value) => self.finalize().map(|_| value),
            Err(err) => Err(err),
        };
        let closed = self.close();
        match (result, closed) {
            (Ok(value), Ok(())) => Ok(value),
            (Err(err), _) | (Ok(_), Err(err)) => Err(err),
        }
    }

    /// Final database location
    #[must_use]
    pub fn output_path(&self) -> &Path {
        &self.output_path
    }

    /// Schema layout in use
    #[must_use]
    pub const fn schema_version(&self) -> SchemaVersion {
        self.version
    }

    /// True once `finalize()` succeeded
    #[must_use]
    pub const fn is_finalized(&self) -> bool {
        self.finalized
    }

    /// Number of handles added
    #[must_use]
    pub fn handle_count(&self) -> usize {
        self.handle_ids.len()
    }

    /// Number of chats created
    #[must_use]
    pub fn chat_count(&self) -> usize {
        self.chat_rowids.len()
    }

    /// Number of messages added
    #[must_use]
    pub fn message_count(&self) -> usize {
        self.message_guids.len()
    }

    /// Number of attachments added
    #[must_use]
    pub fn attachment_count(&self) -> usize {
        self.attachment_guids.len()
    }

    fn open(&self) -> Result<Connection> {
        let conn = if self.in_memory {
            Connection::open_in_memory()?
        } else {
            if let Some(parent) = self.output_path.parent().filter(|p| !p.as_os_str().is_empty()) {
                fs::create_dir_all(parent)?;
            }
            if self.output_path.exists() {
                fs::remove_file(&self.output_path)?;
            }
            Connection::open(&self.output_path)?
        };

        for batch in self.version.ddl() {
            conn.execute_batch(batch)?;
        }

        let insert = format!(
            "INSERT INTO {} ({}, {}) VALUES (?, ?)",
            properties::TABLE,
            properties::KEY,
            properties::VALUE
        );
        for (key, value) in self.version.metadata() {
            conn.execute(&insert, params![key, value])?;
        }
        conn.execute(
            &insert,
            params![properties::UNIQUE_IDENTIFIER, Uuid::new_v4().to_string().to_uppercase()],
        )?;

        info!(
            path = %self.output_path.display(),
            schema = %self.version,
            in_memory = self.in_memory,
            "Initialized chat database"
        );
        Ok(conn)
    }

    fn conn(&mut self) -> Result<&mut Connection> {
        if self.closed {
            return Err(FoundryError::Closed);
        }
        if self.conn.is_none() {
            self.conn = Some(self.open()?);
        }
        self.conn.as_mut().ok_or(FoundryError::Closed)
    }

    /// Add a handle, returning the existing ROWID for a known (identifier, service)
    pub fn add_handle(
        &mut self,
        identifier: &str,
        service: ServiceType,
        country: Option<&str>,
        uncanonicalized_id: Option<&str>,
    ) -> Result<i64> {
        let key = (identifier.to_string(), service);
        if let Some(rowid) = self.handle_ids.get(&key) {
            return Ok(*rowid);
        }

        let rowid = self.next_handle_rowid;
        self.conn()?.execute(
            &format!(
                "INSERT INTO {} ({}, {}, {}, {}, {}) VALUES (?, ?, ?, ?, ?)",
                handle::TABLE,
                handle::ROWID,
                handle::ID,
                handle::COUNTRY,
                handle::SERVICE,
                handle::UNCANONICALIZED_ID
            ),
            params![rowid, identifier, country, service.as_str(), uncanonicalized_id],
        )?;

        self.next_handle_rowid += 1;
        self.handle_ids.insert(key, rowid);
        debug!(rowid, identifier, %service, "Added handle");
        Ok(rowid)
    }

    /// Add the handle for a persona's identifier
    pub fn add_handle_from_persona(&mut self, persona: &Persona, service: ServiceType) -> Result<i64> {
        self.add_handle(
            &persona.identifier,
            service,
            persona.country_code.as_deref(),
            Some(&persona.identifier),
        )
    }

    fn handle_identifier(&self, rowid: i64) -> Option<String> {
        self.handle_ids
            .iter()
            .find(|(_, id)| **id == rowid)
            .map(|((identifier, _), _)| identifier.clone())
    }

    /// Create a chat linked to `handle_ids`
    pub fn create_chat(
        &mut self,
        handle_ids: &[i64],
        chat_type: ChatType,
        service: ServiceType,
        display_name: Option<&str>,
        identifier: Option<&str>,
    ) -> Result<i64> {
        let rowid = self.next_chat_rowid;
        let identifier = match (identifier, chat_type) {
            (Some(identifier), _) => identifier.to_string(),
            (None, ChatType::Direct) => handle_ids
                .first()
                .and_then(|h| self.handle_identifier(*h))
                .unwrap_or_else(|| format!("unknown-{rowid}")),
            (None, ChatType::Group) => format!("chat{}", &Uuid::new_v4().simple().to_string()[..12]),
        };

        let guid = chat_guid(service, chat_type, &identifier);
        if self.chat_guids.contains(&guid) {
            return Err(FoundryError::DuplicateGuid { kind: "chat", guid });
        }

        let tx = self.conn()?.transaction()?;
        tx.execute(
            &format!(
                "INSERT INTO {} ({}, {}, {}, {}, {}, {}, {}) VALUES (?, ?, ?, ?, ?, ?, ?)",
                chat::TABLE,
                chat::ROWID,
                chat::GUID,
                chat::STYLE,
                chat::STATE,
                chat::CHAT_IDENTIFIER,
                chat::SERVICE_NAME,
                chat::DISPLAY_NAME
            ),
            params![rowid, guid, chat_type.style(), CHAT_STATE, identifier, service.as_str(), display_name],
        )?;
        for handle_id in handle_ids {
            tx.execute(
                &format!(
                    "INSERT INTO {} ({}, {}) VALUES (?, ?)",
                    chat_handle_join::TABLE,
                    chat_handle_join::CHAT_ID,
                    chat_handle_join::HANDLE_ID
                ),
                params![rowid, handle_id],
            )?;
        }
        tx.commit()?;

        self.next_chat_rowid += 1;
        self.chat_rowids.insert(rowid);
        debug!(rowid, guid = %guid, handles = handle_ids.len(), "Created chat");
        self.chat_guids.insert(guid);
        Ok(rowid)
    }

    fn ensure_chat(&self, chat_id: i64) -> Result<()> {
        if self.chat_rowids.contains(&chat_id) {
            Ok(())
        } else {
            Err(FoundryError::validation(format!("Unknown chat ROWID {chat_id}")))
        }
    }

    /// Add one message and its `chat_message_join` row
    pub fn add_message(&mut self, chat_id: i64, new_message: NewMessage) -> Result<i64> {
        self.ensure_chat(chat_id)?;
        let guid = new_message.guid.clone().unwrap_or_else(message_guid);
        if self.message_guids.contains(&guid) {
            return Err(FoundryError::DuplicateGuid { kind: "message", guid });
        }

        let rowid = self.next_message_rowid;
        let tx = self.conn()?.transaction()?;
        insert_message(
            &tx,
            &MessageRow {
                rowid,
                guid: &guid,
                chat_id,
                handle_id: new_message.handle_id,
                text: &new_message.text,
                is_from_me: new_message.is_from_me,
                date: new_message.date,
                service: new_message.service,
                date_read: new_message.date_read,
                date_delivered: new_message.date_delivered,
            },
        )?;
        tx.commit()?;

        self.next_message_rowid += 1;
        self.message_guids.insert(guid);
        Ok(rowid)
    }

    /// Add many messages in one transaction.
    ///
    /// On failure nothing from this batch is kept and the builder's counters are
    /// unchanged; earlier batches stay committed.
    pub fn add_messages_batch(
        &mut self,
        chat_id: i64,
        messages: &[BatchMessage],
        service: ServiceType,
    ) -> Result<Vec<i64>> {
        self.ensure_chat(chat_id)?;
        let mut guids = Vec::with_capacity(messages.len());
        let mut batch_guids = HashSet::with_capacity(messages.len());
        for _ in messages {
            let guid = message_guid();
            if self.message_guids.contains(&guid) || !batch_guids.insert(guid.clone()) {
                return Err(FoundryError::DuplicateGuid { kind: "message", guid });
            }
            guids.push(guid);
        }

        let first_rowid = self.next_message_rowid;
        let rowids: Vec<i64> = (first_rowid..).take(messages.len()).collect();

        let tx = self.conn()?.transaction()?;
        for ((msg, guid), rowid) in messages.iter().zip(&guids).zip(&rowids) {
            insert_message(
                &tx,
                &MessageRow {
                    rowid: *rowid,
                    guid,
                    chat_id,
                    handle_id: msg.handle_id,
                    text: &msg.text,
                    is_from_me: msg.is_from_me,
                    date: msg.date,
                    service,
                    date_read: None,
                    date_delivered: None,
                },
            )?;
        }
        tx.commit()?;

        self.next_message_rowid += rowids.len() as i64;
        self.message_guids.extend(guids);
        debug!(chat_id, count = rowids.len(), first_rowid, "Inserted message batch");
        Ok(rowids)
    }

    /// Add attachment metadata linked to a message
    pub fn add_attachment(&mut self, message_id: i64, new_attachment: NewAttachment) -> Result<i64> {
        if !(1..self.next_message_rowid).contains(&message_id) {
            return Err(FoundryError::validation(format!("Unknown message ROWID {message_id}")));
        }
        let guid = new_attachment.guid.clone().unwrap_or_else(attachment_guid);
        if self.attachment_guids.contains(&guid) {
            return Err(FoundryError::DuplicateGuid { kind: "attachment", guid });
        }

        let rowid = self.next_attachment_rowid;
        let tx = self.conn()?.transaction()?;
        tx.execute(
            &format!(
                "INSERT INTO {} ({}, {}, {}, {}, {}, {}, {}, {}, {}, {}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
                attachment::TABLE,
                attachment::ROWID,
                attachment::GUID,
                attachment::ORIGINAL_GUID,
                attachment::FILENAME,
                attachment::UTI,
                attachment::MIME_TYPE,
                attachment::TOTAL_BYTES,
                attachment::IS_OUTGOING,
                attachment::CREATED_DATE,
                attachment::TRANSFER_STATE
            ),
            params![
                rowid,
                guid,
                guid,
                new_attachment.filename,
                new_attachment.uti,
                new_attachment.mime_type,
                new_attachment.total_bytes,
                new_attachment.is_outgoing,
                new_attachment.created_date,
                TRANSFER_STATE_FINISHED
            ],
        )?;
        tx.execute(
            &format!(
                "INSERT INTO {} ({}, {}) VALUES (?, ?)",
                message_attachment_join::TABLE,
                message_attachment_join::MESSAGE_ID,
                message_attachment_join::ATTACHMENT_ID
            ),
            params![message_id, rowid],
        )?;
        tx.execute(
            &format!(
                "UPDATE {} SET {} = 1 WHERE {} = ?",
                message::TABLE,
                message::CACHE_HAS_ATTACHMENTS,
                message::ROWID
            ),
            params![message_id],
        )?;
        tx.commit()?;

        self.next_attachment_rowid += 1;
        self.attachment_guids.insert(guid);
        Ok(rowid)
    }

    /// Commit and, for in-memory builds, copy the database to `output_path`.
    pub fn finalize(&mut self) -> Result<PathBuf> {
        if self.finalized {
            return Err(FoundryError::AlreadyFinalized);
        }

        let in_memory = self.in_memory;
        let output_path = self.output_path.clone();
        let conn = self.conn()?;
        if in_memory {
            if let Some(parent) = output_path.parent().filter(|p| !p.as_os_str().is_empty()) {
                fs::create_dir_all(parent)?;
            }
            if output_path.exists() {
                fs::remove_file(&output_path)?;
            }
            let mut target = Connection::open(&output_path)?;
            Backup::new(conn, &mut target)?.run_to_completion(BACKUP_PAGES_PER_STEP, Duration::ZERO, None)?;
        }

        self.finalized = true;
        info!(
            path = %output_path.display(),
            handles = self.handle_count(),
            chats = self.chat_count(),
            messages = self.message_count(),
            attachments = self.attachment_count(),
            "Finalized chat database"
        );
        Ok(output_path)
    }

    /// Release the connection. Later writes fail with [`FoundryError::Closed`].
    pub fn close(&mut self) -> Result<()> {
        self.closed = true;
        match self.conn.take() {
            Some(conn) => conn.close().map_err(|(_, err)| FoundryError::Database(err)),
            None => Ok(()),
        }
    }
}

impl Drop for DatabaseBuilder {
    fn drop(&mut self) {
        if self.conn.is_some() && !self.finalized {
            warn!(path = %self.output_path.display(), "Dropping chat database builder without finalizing");
        }
    }
}
