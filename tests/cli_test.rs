#![allow(deprecated)]

//! Command-line integration tests
//!
//! Runs the `chatpane` binary against throwaway databases. Every test
//! points `--storage-path` into its own temp dir and `--config` at a
//! missing file, so defaults apply and nothing touches the user's data.

use assert_cmd::Command;
use predicates::prelude::*;
use std::path::Path;
use tempfile::TempDir;

mod common;

fn chatpane(tmp: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("chatpane").unwrap();
    cmd.env_remove("CHATPANE_STORAGE_PATH")
        .env_remove("CHATPANE_BASE_URL")
        .arg("--config")
        .arg(tmp.path().join("missing.yaml"))
        .arg("--storage-path")
        .arg(tmp.path().join("history.sled"));
    cmd
}

fn write_snapshot(path: &Path) {
    let snapshot = r#"[
  {
    "id": "chat_01HZZZZZZZZZZZZZZZZZZZZZZZ",
    "title": "Imported chat...",
    "messages": [
      {"content": "Hello", "isUser": true, "timestamp": "2024-01-01T00:00:00Z", "imageData": null},
      {"content": "**Hi**", "isUser": false, "timestamp": "2024-01-01T00:00:01Z", "imageData": null}
    ],
    "archived": false,
    "timestamp": "2024-01-01T00:00:00Z"
  }
]"#;
    std::fs::write(path, snapshot).unwrap();
}

#[test]
fn test_render_response_markup_from_stdin() {
    let tmp = TempDir::new().unwrap();
    chatpane(&tmp)
        .arg("render")
        .arg("--html")
        .write_stdin("Hello **world** <b>")
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "<p>Hello <strong>world</strong> &lt;b&gt;</p>",
        ));
}

#[test]
fn test_render_user_plain_text_from_stdin() {
    let tmp = TempDir::new().unwrap();
    chatpane(&tmp)
        .arg("render")
        .arg("--user")
        .write_stdin("visit https://example.com\nbye")
        .assert()
        .success()
        .stdout(predicate::str::contains("visit https://example.com\nbye"));
}

#[test]
fn test_history_list_empty() {
    let tmp = TempDir::new().unwrap();
    chatpane(&tmp)
        .arg("history")
        .arg("list")
        .assert()
        .success()
        .stdout(predicate::str::contains("No conversation history found."));
}

#[test]
fn test_import_then_list_show_and_export() {
    let tmp = TempDir::new().unwrap();
    let input = tmp.path().join("in.json");
    write_snapshot(&input);

    chatpane(&tmp)
        .arg("import")
        .arg(&input)
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "Chat history imported successfully",
        ));

    chatpane(&tmp)
        .args(["history", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("chat_01HZZZZZZZZZZZZZZZZZZZZZZZ"))
        .stdout(predicate::str::contains("Imported chat..."));

    chatpane(&tmp)
        .args([
            "history",
            "show",
            "chat_01HZZZZZZZZZZZZZZZZZZZZZZZ",
            "--html",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("<p><strong>Hi</strong></p>"));

    let output = tmp.path().join("out.json");
    chatpane(&tmp)
        .arg("export")
        .arg("-o")
        .arg(&output)
        .assert()
        .success();

    let exported: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&output).unwrap()).unwrap();
    assert_eq!(exported[0]["id"], "chat_01HZZZZZZZZZZZZZZZZZZZZZZZ");
    assert_eq!(exported[0]["messages"][1]["content"], "**Hi**");
}

#[test]
fn test_invalid_import_fails_and_keeps_history() {
    let tmp = TempDir::new().unwrap();
    let good = tmp.path().join("good.json");
    write_snapshot(&good);
    chatpane(&tmp).arg("import").arg(&good).assert().success();

    let bad = tmp.path().join("bad.json");
    std::fs::write(&bad, "not json").unwrap();
    chatpane(&tmp)
        .arg("import")
        .arg(&bad)
        .assert()
        .failure()
        .stdout(predicate::str::contains("Error importing chat history").not())
        .stderr(predicate::str::contains("Error importing chat history"));

    chatpane(&tmp)
        .args(["history", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Imported chat..."));
}

#[test]
fn test_history_archive_rename_delete() {
    let tmp = TempDir::new().unwrap();
    let input = tmp.path().join("in.json");
    write_snapshot(&input);
    chatpane(&tmp).arg("import").arg(&input).assert().success();

    let id = "chat_01HZZZZZZZZZZZZZZZZZZZZZZZ";

    chatpane(&tmp)
        .args(["history", "rename", id, "Project notes"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Chat label updated"));

    chatpane(&tmp)
        .args(["history", "archive", id])
        .assert()
        .success()
        .stdout(predicate::str::contains("Chat archived"));

    chatpane(&tmp)
        .args(["history", "list", "--archived"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Project notes"));

    chatpane(&tmp)
        .args(["history", "delete", id])
        .assert()
        .success();

    chatpane(&tmp)
        .args(["history", "delete", id])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Chat not found"));
}

#[test]
fn test_history_clear_with_yes() {
    let tmp = TempDir::new().unwrap();
    let input = tmp.path().join("in.json");
    write_snapshot(&input);
    chatpane(&tmp).arg("import").arg(&input).assert().success();

    chatpane(&tmp)
        .args(["history", "clear", "--yes"])
        .assert()
        .success()
        .stdout(predicate::str::contains("All conversations cleared"));

    chatpane(&tmp)
        .args(["history", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("No conversation history found."));
}

#[test]
fn test_settings_rejects_unknown_theme() {
    let tmp = TempDir::new().unwrap();
    chatpane(&tmp)
        .args(["settings", "--theme", "sepia"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Unknown theme"));
}

#[test]
fn test_settings_theme_is_persisted() {
    let tmp = TempDir::new().unwrap();
    chatpane(&tmp)
        .args(["settings", "--theme", "dark"])
        .assert()
        .success();

    chatpane(&tmp)
        .arg("settings")
        .assert()
        .success()
        .stdout(predicate::str::contains("DARK"))
        .stdout(predicate::str::contains("(not set)"));
}

#[test]
fn test_invalid_config_is_rejected() {
    let tmp = TempDir::new().unwrap();
    let (_cfg_dir, config_path) =
        common::temp_config_file("endpoint:\n  base_url: not a url\n");

    let mut cmd = Command::cargo_bin("chatpane").unwrap();
    cmd.arg("--config")
        .arg(config_path)
        .arg("--storage-path")
        .arg(tmp.path().join("history.sled"))
        .args(["history", "list"]);

    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("Invalid endpoint.base_url"));
}
