//! Configuration for optiform: project `.env`, then `$XDG_CONFIG_HOME/<app>/config.toml`.
//!
//! [`load_and_apply`] exports environment values with priority
//! **existing env > .env > config.toml `[env]`**. [`load_section`] reads other
//! tables (for example `[search]`) into typed structs.

mod dotenv;
mod file;

use std::collections::HashSet;
use std::path::Path;

use thiserror::Error;

pub use file::{config_path, load_section};

#[derive(Error, Debug)]
pub enum LoadError {
    #[error("config path: {0}")]
    ConfigPath(String),
    #[error("read config.toml: {0}")]
    ConfigRead(std::io::Error),
    #[error("parse config.toml: {0}")]
    ConfigParse(#[from] toml::de::Error),
    #[error("read .env: {0}")]
    DotenvRead(std::io::Error),
}

/// Sets environment variables from `.env` and the `[env]` table, skipping keys
/// that are already set.
///
/// * `app_name`: directory under the config home, e.g. `"optiform"`.
/// * `override_dir`: look for `.env` here instead of the current directory.
pub fn load_and_apply(app_name: &str, override_dir: Option<&Path>) -> Result<(), LoadError> {
    let file_map = file::load_env_map(app_name)?;
    let dotenv_map = dotenv::load_env_map(override_dir).map_err(LoadError::DotenvRead)?;

    let keys: HashSet<&String> = file_map.keys().chain(dotenv_map.keys()).collect();
    for key in keys {
        if std::env::var_os(key).is_some() {
            continue;
        }
        if let Some(v) = dotenv_map.get(key).or_else(|| file_map.get(key)) {
            std::env::set_var(key, v);
        }
    }
    Ok(())
}
