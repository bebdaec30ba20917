//! Config filtering, load error-message, atomic-write and init integration tests.

use assert_fs::prelude::*;
use boardhub_core::{
    config,
    types::{BoardId, HubConfig},
    ConfigError,
};
use predicates::prelude::predicate;
use rstest::rstest;
use serde_json::json;
use std::fs;

fn config_from(value: serde_json::Value) -> HubConfig {
    serde_json::from_value(value).expect("config")
}

// ---------------------------------------------------------------------------
// 1. Entry filtering
// ---------------------------------------------------------------------------

#[rstest]
#[case::array(json!([1, 2, 3]))]
#[case::placeholder(json!("_"))]
#[case::string(json!("uno"))]
#[case::number(json!(42))]
#[case::boolean(json!(true))]
#[case::null(json!(null))]
fn non_object_entries_are_dropped(#[case] junk: serde_json::Value) {
    let cfg = config_from(json!({ "boards": { "a": { "type": "x" }, "junk": junk } }));
    let resolved = config::resolve_boards(&cfg).expect("resolve");
    let ids: Vec<&str> = resolved.entries.iter().map(|(id, _)| id.as_str()).collect();
    assert_eq!(ids, ["a"]);
}

#[test]
fn mixed_boards_yaml_yields_only_object_entries() {
    let yaml = r#"
boards:
  a:
    type: x
  junk: [1, 2, 3]
  b: "_"
  c:
    type: y
"#;
    let cfg: HubConfig = serde_yaml::from_str(yaml).expect("parse");
    let resolved = config::resolve_boards(&cfg).expect("resolve");
    let ids: Vec<&str> = resolved.entries.iter().map(|(id, _)| id.as_str()).collect();
    assert_eq!(ids, ["a", "c"]);
    for (id, definition) in &resolved.entries {
        assert_eq!(definition.id(), Some(id.as_str()), "definition must carry its id");
    }
}

#[rstest]
#[case(Some("cand"), json!({}), Some("cand"))]
#[case(Some("cand"), json!({"id": "own"}), Some("cand"))]
#[case(Some(""), json!({"id": "own"}), Some("own"))]
#[case(None, json!({"id": "own"}), Some("own"))]
#[case(None, json!({"id": ""}), None)]
#[case(None, json!({}), None)]
fn id_resolution_order(
    #[case] candidate: Option<&str>,
    #[case] definition: serde_json::Value,
    #[case] expected: Option<&str>,
) {
    let definition = serde_json::from_value(definition).expect("definition");
    assert_eq!(
        config::resolve_id(candidate, &definition),
        expected.map(BoardId::from)
    );
}

// ---------------------------------------------------------------------------
// 2. Load error messages
// ---------------------------------------------------------------------------

#[test]
fn load_missing_config_returns_not_found() {
    let home = assert_fs::TempDir::new().expect("tempdir");
    let err = config::load_at(home.path()).unwrap_err();
    assert!(matches!(err, ConfigError::ConfigNotFound { .. }), "got: {err}");
    assert!(err.to_string().contains("config not found"));
    assert!(err.to_string().contains("boards.yaml"));
}

#[test]
fn load_corrupt_yaml_returns_parse_error_with_path() {
    let home = assert_fs::TempDir::new().expect("tempdir");
    let file = home.child(".boardhub/boards.yaml");
    file.write_str(": : corrupt : yaml : !!!\n  - broken: [unclosed")
        .expect("write");

    let err = config::load_at(home.path()).unwrap_err();
    assert!(matches!(err, ConfigError::Parse { .. }), "got: {err}");
    assert!(err.to_string().contains("boards.yaml"));
}

#[test]
fn load_wrong_type_boards_returns_parse_error() {
    let home = assert_fs::TempDir::new().expect("tempdir");
    home.child(".boardhub/boards.yaml")
        .write_str("boards:\n  - this is a list, not a mapping\n")
        .expect("write");

    let err = config::load_at(home.path()).unwrap_err();
    assert!(matches!(err, ConfigError::Parse { .. }), "got: {err}");
}

// ---------------------------------------------------------------------------
// 3. Save + init
// ---------------------------------------------------------------------------

#[test]
fn save_cleans_up_tmp_file() {
    let home = assert_fs::TempDir::new().expect("tempdir");
    let path = config::save_at(home.path(), &HubConfig::default()).expect("save");
    assert!(path.exists());
    home.child(".boardhub/boards.yaml.tmp")
        .assert(predicate::path::missing());
}

#[test]
fn init_writes_sample_config_with_broker_socket() {
    let home = assert_fs::TempDir::new().expect("tempdir");
    let cfg = config::init_at(home.path()).expect("init");

    home.child(".boardhub/boards.yaml")
        .assert(predicate::path::exists());
    home.child(".boardhub/boards.yaml")
        .assert(predicate::str::contains("uno"));

    let socket = cfg
        .broker
        .and_then(|b| b.socket)
        .expect("sample config has broker socket");
    assert_eq!(socket, config::broker_socket_at(home.path()));
}

#[test]
fn init_is_idempotent() {
    let home = assert_fs::TempDir::new().expect("tempdir");
    config::init_at(home.path()).expect("first init");

    let path = config::config_path_at(home.path());
    fs::write(&path, "boards:\n  custom:\n    type: virtual\n").expect("edit");

    let cfg = config::init_at(home.path()).expect("second init");
    let boards = cfg.boards.expect("boards");
    assert!(boards.contains_key("custom"), "existing config must be kept");
    assert!(!boards.contains_key("uno"));
}
