//! Layered configuration loading

use crate::{Error, Result};
use figment::{
    providers::{Env, Format, Json, Serialized, Toml, Yaml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Default configuration directory
pub const CONFIG_DIR: &str = "config";

/// Load configuration for `name` from `./config` and the environment
///
/// Priority (highest to lowest):
/// 1. Environment variables prefixed `{NAME}_`, nested keys split on `__`
/// 2. Tool-specific file (`config/{name}.toml`, `config/{name}.yaml`)
/// 3. Default config file (`config/default.{toml,yaml,json}`)
/// 4. `T::default()`
pub fn load_config<T>(name: &str) -> Result<T>
where
    T: for<'de> Deserialize<'de> + Serialize + Default,
{
    load_config_in(CONFIG_DIR, name)
}

/// [`load_config`] with an explicit configuration directory
pub fn load_config_in<T, P>(dir: P, name: &str) -> Result<T>
where
    T: for<'de> Deserialize<'de> + Serialize + Default,
    P: AsRef<Path>,
{
    let dir = dir.as_ref();
    let prefix = format!("{}_", name.to_uppercase().replace('-', "_"));

    Figment::from(Serialized::defaults(T::default()))
        .merge(Toml::file(dir.join("default.toml")))
        .merge(Yaml::file(dir.join("default.yaml")))
        .merge(Json::file(dir.join("default.json")))
        .merge(Toml::file(dir.join(format!("{}.toml", name))))
        .merge(Yaml::file(dir.join(format!("{}.yaml", name))))
        .merge(Env::prefixed(&prefix).split("__"))
        .extract()
        .map_err(|e| Error::Config(format!("Failed to load configuration: {}", e)))
}

/// Load configuration from a specific file over `T::default()`
pub fn load_config_from_file<T, P>(path: P) -> Result<T>
where
    T: for<'de> Deserialize<'de> + Serialize + Default,
    P: AsRef<Path>,
{
    let path = path.as_ref();
    if !path.exists() {
        return Err(Error::Config(format!(
            "Config file not found: {}",
            path.display()
        )));
    }

    let figment = Figment::from(Serialized::defaults(T::default()));
    let figment = match extension(path)? {
        "toml" => figment.merge(Toml::file(path)),
        "yaml" | "yml" => figment.merge(Yaml::file(path)),
        "json" => figment.merge(Json::file(path)),
        other => {
            return Err(Error::Config(format!(
                "Unsupported config file format: {}",
                other
            )))
        },
    };

    figment
        .extract()
        .map_err(|e| Error::Config(format!("Failed to load configuration from file: {}", e)))
}

/// Save configuration to a file, format chosen by extension
pub fn save_config_to_file<T, P>(config: &T, path: P) -> Result<()>
where
    T: Serialize,
    P: AsRef<Path>,
{
    let path = path.as_ref();
    let content = match extension(path)? {
        "toml" => toml::to_string_pretty(config)?,
        "yaml" | "yml" => serde_yaml::to_string(config)?,
        "json" => serde_json::to_string_pretty(config)?,
        other => {
            return Err(Error::Config(format!(
                "Unsupported config file format: {}",
                other
            )))
        },
    };

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, content)?;
    Ok(())
}

fn extension(path: &Path) -> Result<&str> {
    path.extension()
        .and_then(|s| s.to_str())
        .ok_or_else(|| Error::Config("Config file must have an extension".to_string()))
}
