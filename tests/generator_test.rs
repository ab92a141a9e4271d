mod common;

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Duration;
use common::{conversation, count_rows, personas, ScriptedProvider};
use imessage_foundry::db::{BuilderOptions, DatabaseBuilder};
use imessage_foundry::error::FoundryError;
use imessage_foundry::generator::{ConversationGenerator, GenerationPhase, GenerationProgress, GeneratorOptions};
use imessage_foundry::schema::SchemaVersion;
use imessage_foundry::utils::datetime_to_apple_ns;
use rusqlite::Connection;
use tempfile::tempdir;
use tokio_util::sync::CancellationToken;

fn options(dir: &std::path::Path) -> BuilderOptions {
    BuilderOptions::new(dir.join("out").join("chat.db")).with_schema(SchemaVersion::Sequoia)
}

#[tokio::test]
async fn test_direct_conversation_end_to_end() {
    let dir = tempdir().expect("Failed to create temp dir");
    let people = personas(1);
    let config = conversation(&people, 50, 7).with_seed("weekend trip").with_random_seed(42);
    let start_ns = datetime_to_apple_ns(config.time_range_start);
    let end_ns = datetime_to_apple_ns(config.time_range_end);

    let generator = ConversationGenerator::new(Arc::new(ScriptedProvider::new()), GeneratorOptions::default());
    let mut builder = DatabaseBuilder::new(options(dir.path()));
    let outcome = generator.generate_to_database(&people, &config, &mut builder, None).await;
    let result = builder.finish_with(outcome).expect("Generation failed");

    assert_eq!(result.messages.len(), 50);
    assert_eq!(result.llm_provider_used, "Scripted (test)");
    assert_eq!(result.metrics.batches, 2);

    let path = builder.output_path().to_path_buf();
    assert_eq!(count_rows(&path, "chat"), 1);
    assert_eq!(count_rows(&path, "handle"), 2);
    assert_eq!(count_rows(&path, "message"), 50);
    assert_eq!(count_rows(&path, "chat_message_join"), 50);

    let conn = Connection::open(&path).expect("Failed to open output");
    let style: i64 = conn
        .query_row("SELECT style FROM chat", [], |row| row.get(0))
        .expect("Failed to read chat style");
    assert_eq!(style, 43);

    let orphans: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM message m WHERE (SELECT COUNT(*) FROM chat_message_join j \
             WHERE j.message_id = m.ROWID AND j.chat_id = ?) != 1",
            [result.chat_id],
            |row| row.get(0),
        )
        .expect("Failed to check joins");
    assert_eq!(orphans, 0);

    let mut stmt = conn
        .prepare("SELECT guid, date FROM message ORDER BY ROWID")
        .expect("Failed to prepare");
    let rows: Vec<(String, i64)> = stmt
        .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))
        .expect("Failed to query")
        .collect::<Result<_, _>>()
        .expect("Failed to read rows");
    let guids: HashSet<&String> = rows.iter().map(|(guid, _)| guid).collect();
    assert_eq!(guids.len(), 50);
    assert!(rows.iter().all(|(guid, _)| guid.starts_with("p:0/")));
    assert!(rows.windows(2).all(|w| w[0].1 <= w[1].1));
    assert!(rows.iter().all(|(_, date)| *date >= start_ns && *date < end_ns));
}

#[tokio::test]
async fn test_outgoing_messages_use_sentinel_handle() {
    let dir = tempdir().expect("Failed to create temp dir");
    let people = personas(1);
    let config = conversation(&people, 20, 2).with_random_seed(1);

    let generator = ConversationGenerator::new(Arc::new(ScriptedProvider::new()), GeneratorOptions::default());
    let mut builder = DatabaseBuilder::new(options(dir.path()));
    let outcome = generator.generate_to_database(&people, &config, &mut builder, None).await;
    builder.finish_with(outcome).expect("Generation failed");

    let conn = Connection::open(builder.output_path()).expect("Failed to open output");
    let bad_outgoing: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM message WHERE is_from_me = 1 \
             AND (handle_id != 0 OR is_sent != 1 OR is_delivered != 1 OR is_read != 0)",
            [],
            |row| row.get(0),
        )
        .expect("Failed to query");
    let bad_incoming: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM message WHERE is_from_me = 0 \
             AND (handle_id = 0 OR is_delivered != 1 OR is_read != 1)",
            [],
            |row| row.get(0),
        )
        .expect("Failed to query");
    let outgoing: i64 = conn
        .query_row("SELECT COUNT(*) FROM message WHERE is_from_me = 1", [], |row| row.get(0))
        .expect("Failed to query");
    assert_eq!(bad_outgoing, 0);
    assert_eq!(bad_incoming, 0);
    assert_eq!(outgoing, 10);
}

#[tokio::test]
async fn test_group_conversation_links_every_handle() {
    let dir = tempdir().expect("Failed to create temp dir");
    let people = personas(2);
    let config = conversation(&people, 30, 3);

    let generator = ConversationGenerator::new(Arc::new(ScriptedProvider::new()), GeneratorOptions::default());
    let mut builder = DatabaseBuilder::new(options(dir.path()));
    let outcome = generator.generate_to_database(&people, &config, &mut builder, None).await;
    let result = builder.finish_with(outcome).expect("Generation failed");

    let conn = Connection::open(builder.output_path()).expect("Failed to open output");
    let (style, guid): (i64, String) = conn
        .query_row("SELECT style, guid FROM chat", [], |row| Ok((row.get(0)?, row.get(1)?)))
        .expect("Failed to read chat");
    assert_eq!(style, 45);
    assert!(guid.starts_with("iMessage;+;chat"));

    let links: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM chat_handle_join WHERE chat_id = ?",
            [result.chat_id],
            |row| row.get(0),
        )
        .expect("Failed to count links");
    assert_eq!(links, 3);
}

#[tokio::test]
async fn test_short_window_fails_before_any_write() {
    let dir = tempdir().expect("Failed to create temp dir");
    let people = personas(1);
    let mut config = conversation(&people, 100_000, 1);
    config.time_range_start = config.time_range_end - Duration::seconds(1);

    let provider = Arc::new(ScriptedProvider::new());
    let generator = ConversationGenerator::new(provider.clone(), GeneratorOptions::default());
    let mut builder = DatabaseBuilder::new(options(dir.path()));
    let err = generator
        .generate_to_database(&people, &config, &mut builder, None)
        .await
        .expect_err("Expected validation failure");

    assert!(matches!(err, FoundryError::Validation(_)));
    assert_eq!(provider.calls(), 0);
    assert!(!builder.output_path().exists());
    builder.close().expect("Failed to close");
}

#[tokio::test]
async fn test_shared_identifier_rejected_before_any_write() {
    let dir = tempdir().expect("Failed to create temp dir");
    let mut people = personas(2);
    people[2].identifier = people[1].identifier.clone();
    let config = conversation(&people, 10, 1);

    let provider = Arc::new(ScriptedProvider::new());
    let generator = ConversationGenerator::new(provider.clone(), GeneratorOptions::default());
    let mut builder = DatabaseBuilder::new(options(dir.path()));
    let err = generator
        .generate_to_database(&people, &config, &mut builder, None)
        .await
        .expect_err("Expected validation failure");

    assert!(matches!(err, FoundryError::Validation(_)));
    assert!(err.to_string().contains(&people[1].identifier));
    assert_eq!(provider.calls(), 0);
    assert!(!builder.output_path().exists());
    builder.close().expect("Failed to close");
}

#[tokio::test]
async fn test_generating_reported_before_first_batch() {
    let people = personas(1);
    let config = conversation(&people, 20, 1);
    let provider = Arc::new(ScriptedProvider::new());
    let generator = ConversationGenerator::new(
        provider.clone(),
        GeneratorOptions {
            batch_size: 10,
            context_window_size: 10,
        },
    );

    let observer = provider.clone();
    let mut seen: Vec<(GenerationPhase, usize)> = Vec::new();
    let mut record = |p: &GenerationProgress| seen.push((p.phase, observer.calls()));
    generator
        .generate_conversation(&people, &config, Some(&mut record))
        .await
        .expect("Generation failed");

    let first = seen
        .iter()
        .find(|(phase, _)| *phase == GenerationPhase::Generating)
        .expect("Missing generating phase");
    assert_eq!(first.1, 0);
    assert_eq!(provider.calls(), 2);
}

#[tokio::test]
async fn test_unavailable_provider_is_distinct() {
    let dir = tempdir().expect("Failed to create temp dir");
    let people = personas(1);
    let config = conversation(&people, 10, 1);

    let mut provider = ScriptedProvider::new();
    provider.available = false;
    let generator = ConversationGenerator::new(Arc::new(provider), GeneratorOptions::default());
    let mut builder = DatabaseBuilder::new(options(dir.path()));
    let err = generator
        .generate_to_database(&people, &config, &mut builder, None)
        .await
        .expect_err("Expected provider failure");

    assert!(err.is_provider_unavailable());
    assert!(!builder.output_path().exists());
}

#[tokio::test]
async fn test_cancellation_stops_between_batches() {
    let dir = tempdir().expect("Failed to create temp dir");
    let people = personas(1);
    let config = conversation(&people, 100, 7);

    let token = CancellationToken::new();
    let mut provider = ScriptedProvider::new();
    provider.cancel_after = Some((2, token.clone()));
    let provider = Arc::new(provider);
    let generator = ConversationGenerator::new(
        provider.clone(),
        GeneratorOptions {
            batch_size: 10,
            context_window_size: 5,
        },
    )
    .with_cancellation(token);

    let mut builder = DatabaseBuilder::new(options(dir.path()));
    let err = generator
        .generate_to_database(&people, &config, &mut builder, None)
        .await
        .expect_err("Expected cancellation");

    assert!(matches!(err, FoundryError::Cancelled));
    assert_eq!(provider.calls(), 2);
    assert!(!builder.is_finalized());
    assert_eq!(builder.message_count(), 0);
    builder.close().expect("Failed to close");
}

#[tokio::test]
async fn test_attachment_hints_are_written() {
    let dir = tempdir().expect("Failed to create temp dir");
    let people = personas(1);
    let config = conversation(&people, 20, 2);

    let mut provider = ScriptedProvider::new();
    provider.attachment_every = Some(5);
    let generator = ConversationGenerator::new(Arc::new(provider), GeneratorOptions::default());
    let mut builder = DatabaseBuilder::new(options(dir.path()));
    let outcome = generator.generate_to_database(&people, &config, &mut builder, None).await;
    builder.finish_with(outcome).expect("Generation failed");

    let path = builder.output_path().to_path_buf();
    assert_eq!(count_rows(&path, "attachment"), 4);
    assert_eq!(count_rows(&path, "message_attachment_join"), 4);
    let conn = Connection::open(&path).expect("Failed to open output");
    let flagged: i64 = conn
        .query_row("SELECT COUNT(*) FROM message WHERE cache_has_attachments = 1", [], |row| row.get(0))
        .expect("Failed to query");
    assert_eq!(flagged, 4);
}

#[tokio::test]
async fn test_progress_percent_never_decreases() {
    let people = personas(1);
    let config = conversation(&people, 40, 3);
    let generator = ConversationGenerator::new(
        Arc::new(ScriptedProvider::new()),
        GeneratorOptions {
            batch_size: 10,
            context_window_size: 10,
        },
    );

    let mut seen: Vec<(GenerationPhase, f64, usize)> = Vec::new();
    let mut record = |p: &GenerationProgress| seen.push((p.phase, p.percent_complete(), p.total_batches));
    let messages = generator
        .generate_conversation(&people, &config, Some(&mut record))
        .await
        .expect("Generation failed");

    assert_eq!(messages.len(), 40);
    assert!(seen.windows(2).all(|w| w[0].1 <= w[1].1));
    assert_eq!(seen.last().map(|s| s.0), Some(GenerationPhase::Complete));
    assert!(seen.iter().all(|s| s.2 == 4));
}

#[tokio::test]
async fn test_unknown_senders_still_alternate() {
    let people = personas(2);
    let config = conversation(&people, 12, 1);
    let mut provider = ScriptedProvider::new();
    provider.anonymous = true;
    let generator = ConversationGenerator::new(Arc::new(provider), GeneratorOptions::default());

    let messages = generator
        .generate_conversation(&people, &config, None)
        .await
        .expect("Generation failed");

    let ids: HashSet<&str> = people.iter().map(|p| p.id.as_str()).collect();
    assert!(messages.iter().all(|m| ids.contains(m.message.sender_id.as_str())));
    assert!(messages.iter().any(|m| m.message.sender_id == people[1].id));
    assert!(messages.iter().any(|m| m.message.sender_id == people[2].id));
    assert!(messages
        .iter()
        .filter(|m| m.message.is_from_me)
        .all(|m| m.message.sender_id == people[0].id));
}
