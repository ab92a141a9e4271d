//! Tests for LLM response parsing and provider selection

use imessage_foundry::config::LlmConfig;
use imessage_foundry::llm::parsing::{extract_json, parse_messages, parse_personas};
use imessage_foundry::llm::{LlmProvider, LocalProvider, OpenAiProvider, ProviderKind, ProviderManager};
use imessage_foundry::FoundryError;
use std::sync::Arc;

#[test]
fn test_bare_array_of_messages() {
    let raw = r#"[
        {"sender_id": "p1", "text": "hey!", "is_from_me": false},
        {"sender_id": "me", "text": "hi 👋", "is_from_me": true}
    ]"#;
    let messages = parse_messages(raw).expect("Failed to parse messages");
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[1].text, "hi 👋");
    assert!(messages[1].is_from_me);
    assert!(messages[0].attachment.is_none());
}

#[test]
fn test_chatter_around_json() {
    let raw = "Here are the messages you asked for:\n[{\"sender_id\": \"p1\", \"text\": \"ok\"}]\nLet me know!";
    let messages = parse_messages(raw).expect("Failed to parse messages");
    assert_eq!(messages.len(), 1);
    assert!(!messages[0].is_from_me);
}

#[test]
fn test_attachment_hint_is_parsed() {
    let raw = r#"{"messages": [{
        "sender_id": "p1",
        "text": "look at this",
        "attachment": {"filename": "IMG_4411.HEIC", "mime_type": "image/heic", "total_bytes": 1843200}
    }]}"#;
    let messages = parse_messages(raw).expect("Failed to parse messages");
    let attachment = messages[0].attachment.as_ref().expect("Missing attachment");
    assert_eq!(attachment.filename.as_deref(), Some("IMG_4411.HEIC"));
    assert_eq!(attachment.total_bytes, 1_843_200);
    assert_eq!(attachment.uti, None);
}

#[test]
fn test_message_missing_text_is_malformed() {
    let raw = r#"[{"sender_id": "p1"}]"#;
    assert!(matches!(
        parse_messages(raw),
        Err(FoundryError::MalformedResponse { .. })
    ));
}

#[test]
fn test_truncated_json_is_malformed() {
    let raw = r#"```json
[{"sender_id": "p1", "text": "this got cut o
```"#;
    match parse_messages(raw) {
        Err(err @ FoundryError::MalformedResponse { .. }) => {
            assert!(err.to_string().contains("invalid JSON"));
        }
        other => panic!("expected malformed response, got {other:?}"),
    }
}

#[test]
fn test_personas_wrapped_and_bare() {
    let wrapped = r#"{"personas": [{"name": "Ana"}, {"name": "Ben", "topics_of_interest": ["chess"]}]}"#;
    let drafts = parse_personas(wrapped).expect("Failed to parse personas");
    assert_eq!(drafts.len(), 2);
    assert_eq!(drafts[1].topics_of_interest, vec!["chess"]);
    assert_eq!(drafts[0].emoji_usage, "");

    let bare = r#"[{"name": "Cleo", "emoji_usage": "moderate"}]"#;
    assert_eq!(parse_personas(bare).expect("Failed to parse personas")[0].name, "Cleo");
}

#[test]
fn test_personas_number_is_malformed() {
    assert!(matches!(
        parse_personas("42"),
        Err(FoundryError::MalformedResponse { .. })
    ));
}

#[test]
fn test_extract_json_from_fence_without_language() {
    let value = extract_json("```\n{\"a\": 1}\n```").expect("Failed to extract JSON");
    assert_eq!(value["a"], 1);
}

#[test]
fn test_malformed_snippet_is_bounded() {
    let raw = "no json here ".repeat(200);
    match parse_messages(&raw) {
        Err(FoundryError::MalformedResponse { snippet, .. }) => {
            assert!(snippet.len() < raw.len());
        }
        other => panic!("expected malformed response, got {other:?}"),
    }
}

fn unreachable_local() -> LlmConfig {
    LlmConfig {
        local_base_url: "http://127.0.0.1:9".to_string(),
        ..LlmConfig::default()
    }
}

#[tokio::test]
async fn test_unreachable_local_runtime_is_unavailable() {
    let provider = LocalProvider::new(&unreachable_local());
    assert!(!provider.requires_api_key());
    assert!(!provider.is_available().await);
}

#[tokio::test]
async fn test_configured_key_makes_openai_available() {
    let config = LlmConfig {
        openai_api_key: Some("sk-test".to_string()),
        ..LlmConfig::default()
    };
    let provider = OpenAiProvider::new(&config);
    assert!(provider.requires_api_key());
    assert!(provider.is_available().await);
    assert_eq!(provider.name(), "OpenAI (gpt-4o-mini)");
}

#[tokio::test]
async fn test_manager_falls_back_to_keyed_provider() {
    let config = LlmConfig {
        openai_api_key: Some("sk-test".to_string()),
        ..unreachable_local()
    };
    let manager = ProviderManager::with_providers(
        ProviderKind::Local,
        vec![
            (ProviderKind::Local, Arc::new(LocalProvider::new(&config)) as Arc<dyn LlmProvider>),
            (ProviderKind::OpenAi, Arc::new(OpenAiProvider::new(&config)) as Arc<dyn LlmProvider>),
        ],
    );

    let provider = manager.get_provider(None).await.expect("Failed to pick provider");
    assert!(provider.name().starts_with("OpenAI"));

    let err = manager
        .get_provider(Some(ProviderKind::Local))
        .await
        .err()
        .expect("Local should be unavailable");
    assert!(err.is_provider_unavailable());
    assert!(err.to_string().contains("ollama serve"));
}
