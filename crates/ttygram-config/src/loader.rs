// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::Config;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("config file not found: {0}")]
    NotFound(PathBuf),
    #[error("reading {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("parsing {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_yaml::Error,
    },
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Ordered list of config file locations searched from lowest to highest priority.
/// Later files override earlier ones.
fn config_search_paths() -> Vec<PathBuf> {
    let mut paths = Vec::new();

    // 1. System-wide default
    paths.push(PathBuf::from("/etc/ttygram/config.yaml"));
    paths.push(PathBuf::from("/etc/ttygram/config.yml"));

    // 2. XDG / home
    if let Some(home) = dirs::home_dir() {
        paths.push(home.join(".config/ttygram/config.yaml"));
        paths.push(home.join(".config/ttygram/config.yml"));
    }
    if let Some(cfg) = dirs::config_dir() {
        paths.push(cfg.join("ttygram/config.yaml"));
        paths.push(cfg.join("ttygram/config.yml"));
    }

    // 3. Workspace-local
    paths.push(PathBuf::from("ttygram.yaml"));
    paths.push(PathBuf::from("ttygram.yml"));

    paths
}

/// Load configuration by merging all discovered YAML files.
/// The `extra` argument may provide an explicit path (e.g. `--config` CLI flag).
pub fn load(extra: Option<&Path>) -> Result<Config, ConfigError> {
    let mut merged = serde_yaml::Value::Mapping(serde_yaml::Mapping::new());

    for path in config_search_paths() {
        if path.is_file() {
            debug!(path = %path.display(), "loading config layer");
            merge_file(&mut merged, &path)?;
        }
    }

    if let Some(p) = extra {
        if !p.is_file() {
            return Err(ConfigError::NotFound(p.to_path_buf()));
        }
        debug!(path = %p.display(), "loading explicit config");
        merge_file(&mut merged, p)?;
    }

    let config: Config = serde_yaml::from_value(merged).map_err(|e| ConfigError::Parse {
        path: extra.map(Path::to_path_buf).unwrap_or_default(),
        source: e,
    })?;
    validate(&config)?;
    Ok(config)
}

fn merge_file(dst: &mut serde_yaml::Value, path: &Path) -> Result<(), ConfigError> {
    let text = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
        path: path.to_path_buf(),
        source: e,
    })?;
    let layer: serde_yaml::Value =
        serde_yaml::from_str(&text).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            source: e,
        })?;
    merge_yaml(dst, layer);
    Ok(())
}

/// Required-field validation.  The gateway refuses to start without a bot
/// token, an allowlist, and a project root.
fn validate(config: &Config) -> Result<(), ConfigError> {
    if config.telegram.bot_token.trim().is_empty() {
        return Err(ConfigError::Invalid("telegram.bot_token is required".into()));
    }
    if config.telegram.authorized_users.is_empty() {
        return Err(ConfigError::Invalid(
            "telegram.authorized_users must not be empty".into(),
        ));
    }
    if config.projects.root.as_os_str().is_empty() {
        return Err(ConfigError::Invalid("projects.root is required".into()));
    }
    Ok(())
}

/// Deep-merge `src` into `dst`; src wins on scalar conflicts.
fn merge_yaml(dst: &mut serde_yaml::Value, src: serde_yaml::Value) {
    match (dst, src) {
        (serde_yaml::Value::Mapping(d), serde_yaml::Value::Mapping(s)) => {
            for (k, v) in s {
                let entry = d
                    .entry(k)
                    .or_insert(serde_yaml::Value::Mapping(serde_yaml::Mapping::new()));
                merge_yaml(entry, v);
            }
        }
        (dst, src) => *dst = src,
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
