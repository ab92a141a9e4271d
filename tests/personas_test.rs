use std::fs;

use imessage_foundry::models::{EmojiUsage, Persona};
use imessage_foundry::personas::PersonaStore;
use imessage_foundry::FoundryError;
use tempfile::tempdir;

fn persona_with_id(id: &str, name: &str, identifier: &str) -> Persona {
    let mut persona = Persona::new(name, identifier);
    persona.id = id.to_string();
    persona
}

#[test]
fn test_missing_file_is_empty_store() {
    let dir = tempdir().expect("Failed to create temp dir");
    let store = PersonaStore::load(dir.path().join("personas.json")).expect("Failed to load store");
    assert!(store.is_empty());
    assert!(store.get_self().is_none());
}

#[test]
fn test_json_save_and_reload() {
    let dir = tempdir().expect("Failed to create temp dir");
    let path = dir.path().join("nested").join("personas.json");

    let mut store = PersonaStore::load(&path).expect("Failed to load store");
    let mut me = Persona::new("Me", "+15550000000");
    me.is_self = true;
    let mut sam = Persona::new("Sam", "sam@example.com");
    sam.emoji_usage = EmojiUsage::Heavy;
    sam.topics_of_interest = vec!["climbing".to_string(), "ramen".to_string()];
    store.add(me.clone()).expect("Failed to add persona");
    store.add(sam.clone()).expect("Failed to add persona");
    store.save().expect("Failed to save store");

    let reloaded = PersonaStore::load(&path).expect("Failed to reload store");
    assert_eq!(reloaded.len(), 2);
    assert_eq!(reloaded.get(&sam.id), Some(&sam));
    assert_eq!(reloaded.get_self().map(|p| p.id.as_str()), Some(me.id.as_str()));
}

#[test]
fn test_yaml_save_and_reload() {
    let dir = tempdir().expect("Failed to create temp dir");
    let path = dir.path().join("personas.yaml");

    let mut store = PersonaStore::load(&path).expect("Failed to load store");
    let dana = Persona::new("Dana", "+15551112222");
    store.add(dana.clone()).expect("Failed to add persona");
    store.save().expect("Failed to save store");

    let raw = fs::read_to_string(&path).expect("Failed to read persona file");
    assert!(raw.contains("name: Dana"));
    assert!(!raw.trim_start().starts_with('['));

    let reloaded = PersonaStore::load(&path).expect("Failed to reload store");
    assert_eq!(reloaded.list(), &[dana]);
}

#[test]
fn test_minimal_json_fills_defaults() {
    let dir = tempdir().expect("Failed to create temp dir");
    let path = dir.path().join("personas.json");
    fs::write(
        &path,
        r#"[{"id": "abc", "name": "Lee", "identifier": "+15553334444"}]"#,
    )
    .expect("Failed to write persona file");

    let store = PersonaStore::load(&path).expect("Failed to load store");
    let lee = store.get("abc").expect("Missing persona");
    assert_eq!(lee.writing_style, "casual");
    assert_eq!(lee.relationship, "friend");
    assert_eq!(lee.emoji_usage, EmojiUsage::Light);
    assert_eq!(lee.country_code.as_deref(), Some("US"));
    assert!(!lee.is_self);
}

#[test]
fn test_corrupt_file_is_an_error() {
    let dir = tempdir().expect("Failed to create temp dir");
    let path = dir.path().join("personas.json");
    fs::write(&path, "{ not json").expect("Failed to write persona file");
    assert!(matches!(
        PersonaStore::load(&path),
        Err(FoundryError::Serialization(_))
    ));
}

#[test]
fn test_prefix_lookup() {
    let dir = tempdir().expect("Failed to create temp dir");
    let mut store = PersonaStore::load(dir.path().join("p.json")).expect("Failed to load store");
    store
        .add(persona_with_id("a1b2c3", "Ana", "+15550000001"))
        .expect("Failed to add persona");
    store
        .add(persona_with_id("a1ffff", "Ben", "+15550000002"))
        .expect("Failed to add persona");
    store
        .add(persona_with_id("a1", "Cy", "+15550000003"))
        .expect("Failed to add persona");

    assert_eq!(store.find_by_prefix("a1b").expect("Failed to resolve").name, "Ana");
    assert_eq!(store.find_by_prefix(" a1f ").expect("Failed to resolve").name, "Ben");
    // exact id wins over the prefix ambiguity
    assert_eq!(store.find_by_prefix("a1").expect("Failed to resolve").name, "Cy");

    let err = store.find_by_prefix("zz").unwrap_err();
    assert!(err.to_string().contains("No persona found"));
    assert!(store.find_by_prefix("").is_err());
}

#[test]
fn test_ambiguous_prefix_lists_matches() {
    let dir = tempdir().expect("Failed to create temp dir");
    let mut store = PersonaStore::load(dir.path().join("p.json")).expect("Failed to load store");
    store
        .add(persona_with_id("beef0001", "Ana", "+15550000001"))
        .expect("Failed to add persona");
    store
        .add(persona_with_id("beef0002", "Ben", "+15550000002"))
        .expect("Failed to add persona");

    let err = store.find_by_prefix("beef").unwrap_err();
    let message = err.to_string();
    assert!(message.contains("Ambiguous"));
    assert!(message.contains("Ana") && message.contains("Ben"));

    let selected = store.select(&["beef0002", "beef0001"]).expect("Failed to select");
    assert_eq!(selected[0].name, "Ben");
    assert!(store.select(&["beef0001", "beef"]).is_err());
}

#[test]
fn test_add_rejects_duplicates_and_invalid() {
    let dir = tempdir().expect("Failed to create temp dir");
    let mut store = PersonaStore::load(dir.path().join("p.json")).expect("Failed to load store");
    let ana = persona_with_id("id-1", "Ana", "+15550000001");
    store.add(ana.clone()).expect("Failed to add persona");

    assert!(matches!(store.add(ana), Err(FoundryError::Validation(_))));
    assert!(store.add(Persona::new("Bad", "not-a-number")).is_err());
    assert_eq!(store.len(), 1);
}

#[test]
fn test_remove_by_prefix() {
    let dir = tempdir().expect("Failed to create temp dir");
    let mut store = PersonaStore::load(dir.path().join("p.json")).expect("Failed to load store");
    store
        .add(persona_with_id("cafe1234", "Ana", "+15550000001"))
        .expect("Failed to add persona");

    let removed = store.remove("cafe").expect("Failed to remove persona");
    assert_eq!(removed.name, "Ana");
    assert!(store.is_empty());
    assert!(store.remove("cafe").is_err());
}
