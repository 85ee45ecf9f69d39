//! `$XDG_CONFIG_HOME/<app>/config.toml`: an `[env]` table plus typed sections such as `[search]`.

use std::collections::HashMap;
use std::path::PathBuf;

use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::LoadError;

/// Base config directory: `$XDG_CONFIG_HOME` when set to an absolute path,
/// else the platform default from `dirs`.
fn config_home() -> Result<PathBuf, LoadError> {
    if let Some(dir) = std::env::var_os("XDG_CONFIG_HOME").map(PathBuf::from) {
        if dir.is_absolute() {
            return Ok(dir);
        }
    }
    dirs::config_dir().ok_or_else(|| LoadError::ConfigPath("no config directory for this platform".into()))
}

/// Location of the app's `config.toml`, whether or not it exists.
pub fn config_path(app_name: &str) -> Result<PathBuf, LoadError> {
    Ok(config_home()?.join(app_name).join("config.toml"))
}

/// Parsed file as a TOML table; `None` when the file does not exist.
fn load_table(app_name: &str) -> Result<Option<toml::Table>, LoadError> {
    let path = config_path(app_name)?;
    if !path.is_file() {
        return Ok(None);
    }
    let content = std::fs::read_to_string(&path).map_err(LoadError::ConfigRead)?;
    Ok(Some(toml::from_str(&content)?))
}

#[derive(Deserialize, Default)]
struct EnvTable {
    #[serde(default)]
    env: HashMap<String, String>,
}

/// `[env]` entries; empty when the file or the table is missing.
pub fn load_env_map(app_name: &str) -> Result<HashMap<String, String>, LoadError> {
    let Some(table) = load_table(app_name)? else {
        return Ok(HashMap::new());
    };
    let parsed: EnvTable = toml::Value::Table(table).try_into()?;
    Ok(parsed.env)
}

/// Deserializes table `[section]`; `None` when the file or the table is missing.
pub fn load_section<T: DeserializeOwned>(app_name: &str, section: &str) -> Result<Option<T>, LoadError> {
    let Some(mut table) = load_table(app_name)? else {
        return Ok(None);
    };
    match table.remove(section) {
        Some(value) => Ok(Some(value.try_into()?)),
        None => Ok(None),
    }
}
