//! Finding, reading and scaffolding rule configuration files.
//!
//! A workspace's rules live in `linksmith.config.<ext>` at its root, where
//! `<ext>` is one of [`CONFIG_EXTENSIONS`] (first existing wins). The file is
//! parsed with the `config` crate into an untyped JSON value; validation is
//! left to [`crate::schema::validate`].

use std::future::Future;
use std::io;
use std::path::{Path, PathBuf};

use config::{Config, File, FileFormat};
use serde_json::Value;

pub const CONFIG_FILE_STEM: &str = "linksmith.config";
pub const CONFIG_EXTENSIONS: [&str; 4] = ["yaml", "yml", "json", "toml"];

#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("Failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Failed to parse {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: config::ConfigError,
    },
}

/// Turns a workspace's configuration file into a raw value.
pub trait ConfigLoader: Send + Sync {
    /// `Ok(None)` when the workspace has no configuration file.
    fn load(&self, root: &Path) -> impl Future<Output = Result<Option<Value>, LoadError>> + Send;
}

/// Loads `linksmith.config.*` from the workspace root on disk.
#[derive(Debug, Default, Clone, Copy)]
pub struct FileConfigLoader;

impl ConfigLoader for FileConfigLoader {
    async fn load(&self, root: &Path) -> Result<Option<Value>, LoadError> {
        let Some(path) = find_config_file(root) else {
            return Ok(None);
        };

        let content = tokio::fs::read_to_string(&path)
            .await
            .map_err(|source| LoadError::Io {
                path: path.clone(),
                source,
            })?;

        parse_config(&path, &content).map(Some)
    }
}

fn parse_config(path: &Path, content: &str) -> Result<Value, LoadError> {
    let format = match path.extension().and_then(|ext| ext.to_str()) {
        Some("json") => FileFormat::Json,
        Some("toml") => FileFormat::Toml,
        _ => FileFormat::Yaml,
    };

    Config::builder()
        .add_source(File::from_str(content, format))
        .build()
        .and_then(|config| config.try_deserialize::<Value>())
        .map_err(|source| LoadError::Parse {
            path: path.to_path_buf(),
            source,
        })
}

pub fn find_config_file(root: &Path) -> Option<PathBuf> {
    CONFIG_EXTENSIONS
        .iter()
        .map(|ext| root.join(format!("{CONFIG_FILE_STEM}.{ext}")))
        .find(|path| path.is_file())
}

/// Whether a changed path is a rule configuration file, for watchers.
pub fn is_config_file(path: &Path) -> bool {
    let Some(name) = path.file_name().and_then(|name| name.to_str()) else {
        return false;
    };
    name.strip_prefix(CONFIG_FILE_STEM)
        .and_then(|rest| rest.strip_prefix('.'))
        .is_some_and(|ext| CONFIG_EXTENSIONS.contains(&ext))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    Yaml,
    Json,
    Toml,
}

impl ConfigFormat {
    pub fn extension(self) -> &'static str {
        match self {
            ConfigFormat::Yaml => "yaml",
            ConfigFormat::Json => "json",
            ConfigFormat::Toml => "toml",
        }
    }
}

/// Starter configuration. It refers to a handler named `readme`, which the
/// host application is expected to register.
pub fn base_config(format: ConfigFormat) -> &'static str {
    match format {
        ConfigFormat::Yaml => {
            r#"# Each entry turns text matching `pattern` into a link.
# `handle` names a handler registered by the host application.
links:
  - include: "**/*"
    pattern: "linksmith"
    handle: readme
"#
        }
        ConfigFormat::Json => {
            r#"{
  "links": [
    {
      "include": "**/*",
      "pattern": "linksmith",
      "handle": "readme"
    }
  ]
}
"#
        }
        ConfigFormat::Toml => {
            r#"# Each entry turns text matching `pattern` into a link.
# `handle` names a handler registered by the host application.
[[links]]
include = "**/*"
pattern = "linksmith"
handle = "readme"
"#
        }
    }
}

/// Writes a starter configuration unless the workspace already has one.
/// Returns the path of the workspace's configuration file either way.
pub fn create_base_config(root: &Path, format: ConfigFormat) -> io::Result<PathBuf> {
    if let Some(existing) = find_config_file(root) {
        return Ok(existing);
    }

    let path = root.join(format!("{CONFIG_FILE_STEM}.{}", format.extension()));
    std::fs::write(&path, base_config(format))?;
    Ok(path)
}
