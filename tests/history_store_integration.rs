//! Integration tests for the history store
//!
//! Exercises the store over a real `sled` database (persistence across
//! reopen, export and import between databases) and over a quota-limited
//! in-memory store (eviction under pressure).

mod common;

use chatpane::history::{HistorySettings, HistoryStore};
use chatpane::storage::{Chat, ChatFilter, MemoryStore, Message};
use tempfile::TempDir;

#[test]
fn test_first_message_creates_titled_focused_chat_that_survives_reopen() {
    let tmp = TempDir::new().expect("Failed to create temp dir");
    let db_path = tmp.path().join("history.sled");

    let chat_id = {
        let history = common::open_history_at(&db_path, HistorySettings::default());
        let id = history
            .append(None, Message::user("Hello world"))
            .expect("append should create a chat");
        history
            .append(Some(&id), Message::bot("Hi! How can I help?"))
            .expect("append to existing chat");
        id
    };

    let history = common::open_history_at(&db_path, HistorySettings::default());
    assert_eq!(history.current_chat_id().as_deref(), Some(chat_id.as_str()));

    let chat = history.get(&chat_id).expect("chat persisted");
    assert_eq!(chat.title, "Hello world...");
    assert!(!chat.archived);
    assert_eq!(chat.messages.len(), 2);
    assert!(chat.messages[0].is_user);
    assert!(!chat.messages[1].is_user);
}

#[test]
fn test_pages_partition_the_message_list() {
    let (history, _tmp) = common::create_temp_history();
    let id = history.append(None, Message::user("message 0")).unwrap();
    for i in 1..120 {
        let message = if i % 2 == 0 {
            Message::user(format!("message {}", i))
        } else {
            Message::bot(format!("message {}", i))
        };
        history.append(Some(&id), message).unwrap();
    }

    let mut collected = Vec::new();
    let mut flags = Vec::new();
    for page in 1..=3 {
        let window = history.page(&id, page).unwrap();
        flags.push(window.has_more);
        collected.extend(window.messages);
    }

    assert_eq!(flags, vec![true, true, false]);
    assert_eq!(collected, history.get(&id).unwrap().messages);
    assert!(history.page(&id, 4).unwrap().messages.is_empty());
}

#[test]
fn test_export_then_import_into_fresh_database_is_identical() {
    let (source, _src_tmp) = common::create_temp_history();
    let first = source.append(None, Message::user("first chat")).unwrap();
    source
        .append(
            Some(&first),
            Message::bot("with an image").with_image(common::PNG_1X1),
        )
        .unwrap();
    let second = source.append(None, Message::user("second chat")).unwrap();
    source.toggle_archive(&second).unwrap();
    source.relabel(&first, "Renamed");

    let snapshot = source.export();

    let (target, _dst_tmp) = common::create_temp_history();
    target.append(None, Message::user("to be replaced")).unwrap();
    assert_eq!(target.import(&snapshot).unwrap(), 2);

    assert_eq!(target.export(), snapshot);
    assert_eq!(
        target.list(ChatFilter::Active),
        source.list(ChatFilter::Active)
    );
    assert_eq!(
        target.list(ChatFilter::Archived),
        source.list(ChatFilter::Archived)
    );
    assert_eq!(target.get(&first).unwrap().title, "Renamed");
}

#[test]
fn test_export_uses_camel_case_fields() {
    let (history, _tmp) = common::create_temp_history();
    let id = history.append(None, Message::user("hi")).unwrap();
    history
        .append(Some(&id), Message::bot("pic").with_image("aGk="))
        .unwrap();

    let value: serde_json::Value = serde_json::from_str(&history.export()).unwrap();
    let message = &value[0]["messages"][1];
    assert_eq!(message["isUser"], false);
    assert_eq!(message["imageData"], "aGk=");
    assert!(value[0]["timestamp"].is_string());
}

#[test]
fn test_invalid_import_leaves_history_untouched() {
    let (history, _tmp) = common::create_temp_history();
    history.append(None, Message::user("keep me")).unwrap();
    let before = history.export();

    assert!(history.import("{\"not\": \"a list\"}").is_err());
    assert!(history.import("garbage").is_err());
    assert_eq!(history.export(), before);
}

#[test]
fn test_deleting_an_image_clears_it_everywhere_in_the_chat() {
    let tmp = TempDir::new().unwrap();
    let db_path = tmp.path().join("history.sled");

    let id = {
        let history = common::open_history_at(&db_path, HistorySettings::default());
        let id = history.append(None, Message::user("draw")).unwrap();
        history
            .append(Some(&id), Message::bot("one").with_image(common::PNG_1X1))
            .unwrap();
        history
            .append(Some(&id), Message::bot("other").with_image("aGk="))
            .unwrap();
        assert_eq!(history.clear_image(&id, common::PNG_1X1), Some(1));
        id
    };

    let history = common::open_history_at(&db_path, HistorySettings::default());
    let messages = history.get(&id).unwrap().messages;
    assert_eq!(messages[1].image_data, None);
    assert_eq!(messages[1].content, "one");
    assert_eq!(messages[2].image_data.as_deref(), Some("aGk="));
}

#[test]
fn test_quota_pressure_evicts_oldest_chats_and_keeps_writing() {
    let settings = HistorySettings {
        page_size: 50,
        eviction_batch: 3,
    };
    let history = HistoryStore::with_settings(MemoryStore::with_quota(4_000), settings);

    let filler = "x".repeat(300);
    let mut ids = Vec::new();
    for _ in 0..20 {
        let id = history
            .append(None, Message::user(filler.clone()))
            .expect("append should succeed after eviction");
        ids.push(id);
    }

    let listed: Vec<String> = history
        .list(ChatFilter::Active)
        .into_iter()
        .map(|c| c.id)
        .collect();

    assert!(listed.len() < ids.len());
    assert_eq!(listed.first(), ids.last());
    assert!(!listed.contains(&ids[0]));
    assert_eq!(history.current_chat_id().as_ref(), ids.last());

    // survivors are the newest chats, in order
    let expected: Vec<String> = ids.iter().rev().take(listed.len()).cloned().collect();
    assert_eq!(listed, expected);
}

#[test]
fn test_store_at_capacity_drops_default_batch_on_next_append() {
    let source = HistoryStore::new(MemoryStore::new());
    let mut ids = Vec::new();
    for i in 0..25 {
        ids.push(
            source
                .append(None, Message::user(format!("chat number {:02}", i)))
                .unwrap(),
        );
    }
    let snapshot = source.export();
    let chats: Vec<Chat> = serde_json::from_str(&snapshot).unwrap();
    let newest = ids.last().unwrap();

    // collection plus focus pointer, with less slack than one more chat needs
    let quota = serde_json::to_string(&chats).unwrap().len() + newest.len() + 20;
    let history = HistoryStore::new(MemoryStore::with_quota(quota));
    assert_eq!(history.import(&snapshot).unwrap(), 25);
    assert!(history.set_current_chat(Some(newest)));
    let before = history.list(ChatFilter::Active).len();

    let appended = history
        .append(None, Message::user("one more conversation"))
        .expect("append should succeed on retry");

    let listed: Vec<String> = history
        .list(ChatFilter::Active)
        .into_iter()
        .map(|c| c.id)
        .collect();
    assert_eq!(listed.len(), before - 10 + 1);
    assert_eq!(listed[0], appended);
    assert_eq!(history.current_chat_id(), Some(appended));
    // the ten oldest chats are gone, the rest keep their order
    let survivors: Vec<String> = ids[10..].iter().rev().cloned().collect();
    assert_eq!(&listed[1..], survivors.as_slice());
}

#[test]
fn test_message_larger_than_quota_is_not_persisted() {
    let history = HistoryStore::new(MemoryStore::with_quota(200));
    assert!(history.append(None, Message::user("y".repeat(500))).is_none());
    assert!(history.list(ChatFilter::Active).is_empty());
    assert_eq!(history.current_chat_id(), None);
}

#[test]
fn test_archive_and_delete_manage_focus() {
    let (history, _tmp) = common::create_temp_history();
    let older = history.append(None, Message::user("older")).unwrap();
    let newer = history.append(None, Message::user("newer")).unwrap();
    assert_eq!(history.current_chat_id().as_deref(), Some(newer.as_str()));

    assert_eq!(history.toggle_archive(&newer), Some(true));
    assert_eq!(history.current_chat_id(), None);
    assert_eq!(history.list(ChatFilter::Active).len(), 1);
    assert_eq!(history.list(ChatFilter::Archived)[0].id, newer);

    assert!(history.set_current_chat(Some(&older)));
    assert!(history.delete(&newer));
    assert_eq!(history.current_chat_id().as_deref(), Some(older.as_str()));

    assert!(history.clear_all());
    assert!(history.list(ChatFilter::Active).is_empty());
    assert_eq!(history.current_chat_id(), None);
}
