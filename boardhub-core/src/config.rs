//! Board configuration normalization and YAML persistence.
//!
//! # Storage layout
//!
//! ```text
//! ~/.boardhub/
//!   boards.yaml    (hub config: mode 0600, created by `init`)
//!   broker.sock    (default broker endpoint, owned by the runtime)
//! ```
//!
//! # API pattern
//!
//! Every function touching the filesystem has two forms:
//! - `fn_at(home: &Path, …)`: explicit home; used in tests with `TempDir`
//! - `fn(…)`: derives home from `dirs::home_dir()`, delegates to `_at`

use std::path::{Path, PathBuf};

use serde_json::{Map, Value};

use crate::error::ConfigError;
use crate::types::{BoardDefinition, BoardId, BrokerConfig, HubConfig};

pub const HUB_DIR: &str = ".boardhub";
pub const CONFIG_FILE: &str = "boards.yaml";
pub const BROKER_SOCKET: &str = "broker.sock";

// ---------------------------------------------------------------------------
// 1. Entry filtering
// ---------------------------------------------------------------------------

/// True if `value` can describe a board.
///
/// Only key-value objects qualify. Arrays, the `"_"` placeholder and every
/// other scalar are stray metadata and are skipped, never reported.
pub fn is_board_value(value: &Value) -> bool {
    value.is_object()
}

/// The config's board entries that survive filtering, in file order.
///
/// An absent `boards` mapping is treated as empty.
pub fn board_entries(config: &HubConfig) -> Vec<(String, BoardDefinition)> {
    let Some(boards) = config.boards.as_ref() else {
        return vec![];
    };
    boards
        .iter()
        .filter_map(|(key, value)| match value {
            Value::Object(map) => Some((key.clone(), BoardDefinition::from(map.clone()))),
            _ => None,
        })
        .collect()
}

// ---------------------------------------------------------------------------
// 2. Id resolution
// ---------------------------------------------------------------------------

/// First non-empty of `candidate` and the definition's own `id` field.
pub fn resolve_id(candidate: Option<&str>, definition: &BoardDefinition) -> Option<BoardId> {
    candidate
        .filter(|c| !c.is_empty())
        .or_else(|| definition.id())
        .map(BoardId::from)
}

/// Returns a new definition carrying the resolved id, or `None` when no id
/// can be resolved.
pub fn normalize(
    definition: &BoardDefinition,
    candidate: Option<&str>,
) -> Option<(BoardId, BoardDefinition)> {
    let id = resolve_id(candidate, definition)?;
    let normalized = definition.with_id(&id);
    Some((id, normalized))
}

/// Normalized board entries ready to be turned into controllers.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResolvedBoards {
    /// Unique ids in first-seen order; a duplicate replaces the earlier
    /// definition in place.
    pub entries: Vec<(BoardId, BoardDefinition)>,
    /// Ids that appeared more than once.
    pub duplicates: Vec<BoardId>,
    /// Object entries dropped because no id could be resolved.
    pub unnamed: usize,
}

/// Filters, normalizes and de-duplicates the config's board entries.
///
/// Duplicate resolved ids are last-write-wins unless `config.strict_ids` is
/// set, in which case the first duplicate is an error.
pub fn resolve_boards(config: &HubConfig) -> Result<ResolvedBoards, ConfigError> {
    let mut resolved = ResolvedBoards::default();
    for (key, definition) in board_entries(config) {
        let Some((id, normalized)) = normalize(&definition, Some(&key)) else {
            resolved.unnamed += 1;
            continue;
        };
        match resolved.entries.iter_mut().find(|(existing, _)| *existing == id) {
            Some(slot) => {
                if config.strict_ids {
                    return Err(ConfigError::DuplicateBoardId { id: id.0 });
                }
                slot.1 = normalized;
                resolved.duplicates.push(id);
            }
            None => resolved.entries.push((id, normalized)),
        }
    }
    Ok(resolved)
}

// ---------------------------------------------------------------------------
// 3. Paths
// ---------------------------------------------------------------------------

/// `<home>/.boardhub/`
///
/// Creates the directory (mode `0700`) if it does not yet exist.
pub fn hub_dir_at(home: &Path) -> Result<PathBuf, ConfigError> {
    let dir = home.join(HUB_DIR);
    if !dir.exists() {
        std::fs::create_dir_all(&dir)?;
        set_dir_permissions(&dir)?;
    }
    Ok(dir)
}

/// `<home>/.boardhub/boards.yaml`: pure, no I/O.
pub fn config_path_at(home: &Path) -> PathBuf {
    home.join(HUB_DIR).join(CONFIG_FILE)
}

/// `config_path_at` convenience wrapper.
pub fn config_path() -> Result<PathBuf, ConfigError> {
    Ok(config_path_at(&home()?))
}

/// `<home>/.boardhub/broker.sock`: pure, no I/O.
pub fn broker_socket_at(home: &Path) -> PathBuf {
    home.join(HUB_DIR).join(BROKER_SOCKET)
}

// ---------------------------------------------------------------------------
// 4. Load
// ---------------------------------------------------------------------------

/// Load a config file from an explicit path.
///
/// Returns `ConfigError::ConfigNotFound` if absent,
/// `ConfigError::Parse` (with path + line context) if malformed YAML.
pub fn load_from(path: &Path) -> Result<HubConfig, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::ConfigNotFound {
            path: path.to_path_buf(),
        });
    }
    let contents = std::fs::read_to_string(path)?;
    serde_yaml::from_str(&contents).map_err(|e| ConfigError::Parse {
        path: path.to_path_buf(),
        source: e,
    })
}

/// Load `<home>/.boardhub/boards.yaml`.
pub fn load_at(home: &Path) -> Result<HubConfig, ConfigError> {
    load_from(&config_path_at(home))
}

/// `load_at` convenience wrapper.
pub fn load() -> Result<HubConfig, ConfigError> {
    load_at(&home()?)
}

// ---------------------------------------------------------------------------
// 5. Save (atomic)
// ---------------------------------------------------------------------------

/// Atomically save a config to `<home>/.boardhub/boards.yaml`.
///
/// Write flow: serialize → `.yaml.tmp` sibling → `chmod 0600` → `rename`.
pub fn save_at(home: &Path, config: &HubConfig) -> Result<PathBuf, ConfigError> {
    hub_dir_at(home)?;
    let path = config_path_at(home);
    let tmp_path = path.with_file_name(format!("{CONFIG_FILE}.tmp"));

    let yaml = serde_yaml::to_string(config)?;
    std::fs::write(&tmp_path, yaml)?;
    set_file_permissions(&tmp_path)?;
    std::fs::rename(&tmp_path, &path)?;
    Ok(path)
}

// ---------------------------------------------------------------------------
// 6. Init
// ---------------------------------------------------------------------------

/// Sample config written by `init`: two virtual boards and a broker socket
/// under `<home>/.boardhub/`.
pub fn sample_config(home: &Path) -> HubConfig {
    let mut boards = Map::new();
    boards.insert(
        "uno".to_string(),
        serde_json::json!({ "type": "virtual", "delay_ms": 50 }),
    );
    boards.insert("mega".to_string(), serde_json::json!({ "type": "virtual" }));
    HubConfig {
        boards: Some(boards),
        broker: Some(BrokerConfig {
            socket: Some(broker_socket_at(home)),
        }),
        ..HubConfig::default()
    }
}

/// Create `<home>/.boardhub/boards.yaml` from [`sample_config`].
///
/// Idempotent: if the file already exists, loads and returns it unchanged.
pub fn init_at(home: &Path) -> Result<HubConfig, ConfigError> {
    let path = config_path_at(home);
    if path.exists() {
        return load_from(&path);
    }
    let config = sample_config(home);
    save_at(home, &config)?;
    Ok(config)
}

/// `init_at` convenience wrapper.
pub fn init() -> Result<HubConfig, ConfigError> {
    init_at(&home()?)
}

// ---------------------------------------------------------------------------
// Private helpers
// ---------------------------------------------------------------------------

fn home() -> Result<PathBuf, ConfigError> {
    dirs::home_dir().ok_or(ConfigError::HomeNotFound)
}

#[cfg(unix)]
fn set_dir_permissions(path: &Path) -> Result<(), ConfigError> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o700))?;
    Ok(())
}
#[cfg(not(unix))]
fn set_dir_permissions(_path: &Path) -> Result<(), ConfigError> {
    Ok(())
}

#[cfg(unix)]
fn set_file_permissions(path: &Path) -> Result<(), ConfigError> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
    Ok(())
}
#[cfg(not(unix))]
fn set_file_permissions(_path: &Path) -> Result<(), ConfigError> {
    Ok(())
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
