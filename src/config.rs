#![forbid(unsafe_code)]

use anyhow::{Context, Result, anyhow};
use serde::Deserialize;
use std::{
    collections::HashMap,
    env, fs,
    path::{Path, PathBuf},
};

use crate::api::{ApiSettings, DEFAULT_API_BASE, DEFAULT_UPLOAD_BASE};
use crate::upload::{DEFAULT_MAX_RETRIES, RetryPolicy, round_chunk_size};

pub const DEFAULT_ENV_PATH: &str = ".env";

/// Everything needed to talk to the remote account.
#[derive(Debug, Clone)]
pub struct RuntimeSettings {
    pub access_token: String,
    pub token_file: Option<PathBuf>,
    pub api_base: String,
    pub upload_base: String,
    pub max_retries: u32,
    pub chunk_size: usize,
}

impl RuntimeSettings {
    pub fn api_settings(&self) -> ApiSettings {
        let mut settings = ApiSettings::new(self.access_token.clone());
        settings.api_base = self.api_base.clone();
        settings.upload_base = self.upload_base.clone();
        settings.chunk_size = self.chunk_size;
        settings
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            ..RetryPolicy::default()
        }
        .with_chunk_size(self.chunk_size)
    }
}

#[derive(Debug, Clone, Default)]
pub struct RuntimeOverrides {
    pub access_token: Option<String>,
    pub token_file: Option<PathBuf>,
    pub env_path: Option<PathBuf>,
}

pub fn resolve_runtime_settings(overrides: RuntimeOverrides) -> Result<RuntimeSettings> {
    let env_path = overrides
        .env_path
        .as_deref()
        .unwrap_or_else(|| Path::new(DEFAULT_ENV_PATH));
    let file_vars = read_env_file(env_path)?;
    build_runtime_settings(&file_vars, env_var_string, overrides)
}

/// The JSON file left behind by an earlier OAuth exchange. Only the access
/// token is used; refreshing it is someone else's job.
#[derive(Debug, Deserialize)]
struct TokenFile {
    access_token: Option<String>,
    token: Option<String>,
}

pub fn read_token_file(path: &Path) -> Result<String> {
    let raw = fs::read_to_string(path).with_context(|| format!("Reading {}", path.display()))?;
    let parsed: TokenFile =
        serde_json::from_str(&raw).with_context(|| format!("Parsing {}", path.display()))?;
    parsed
        .access_token
        .or(parsed.token)
        .map(|token| token.trim().to_string())
        .filter(|token| !token.is_empty())
        .ok_or_else(|| anyhow!("{} has no access_token", path.display()))
}

fn build_runtime_settings(
    file_vars: &HashMap<String, String>,
    env_lookup: impl Fn(&str) -> Option<String>,
    overrides: RuntimeOverrides,
) -> Result<RuntimeSettings> {
    let token_file = overrides
        .token_file
        .or_else(|| lookup_value("YOUTUBE_TOKEN_FILE", file_vars, &env_lookup).map(PathBuf::from));
    let access_token = match overrides
        .access_token
        .filter(|token| !token.trim().is_empty())
        .or_else(|| lookup_value("YOUTUBE_ACCESS_TOKEN", file_vars, &env_lookup))
    {
        Some(token) => token,
        None => {
            let path = token_file
                .as_deref()
                .ok_or_else(|| anyhow!("YOUTUBE_ACCESS_TOKEN or YOUTUBE_TOKEN_FILE must be set"))?;
            read_token_file(path)?
        }
    };
    let api_base = lookup_value("YOUTUBE_API_BASE", file_vars, &env_lookup)
        .unwrap_or_else(|| DEFAULT_API_BASE.to_string());
    let upload_base = lookup_value("YOUTUBE_UPLOAD_BASE", file_vars, &env_lookup)
        .unwrap_or_else(|| DEFAULT_UPLOAD_BASE.to_string());
    let max_retries = lookup_value("UPLOAD_MAX_RETRIES", file_vars, &env_lookup)
        .and_then(|value| value.parse::<u32>().ok())
        .unwrap_or(DEFAULT_MAX_RETRIES);
    let chunk_size = lookup_value("UPLOAD_CHUNK_SIZE", file_vars, &env_lookup)
        .and_then(|value| value.parse::<usize>().ok())
        .map(round_chunk_size)
        .unwrap_or(0);
    Ok(RuntimeSettings {
        access_token,
        token_file,
        api_base,
        upload_base,
        max_retries,
        chunk_size,
    })
}

fn env_var_string(key: &str) -> Option<String> {
    env::var(key).ok().and_then(|value| {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}

fn lookup_value(
    key: &str,
    file_vars: &HashMap<String, String>,
    env_lookup: &impl Fn(&str) -> Option<String>,
) -> Option<String> {
    env_lookup(key)
        .or_else(|| file_vars.get(key).cloned())
        .filter(|value| !value.trim().is_empty())
}

pub fn read_env_file(path: &Path) -> Result<HashMap<String, String>> {
    let mut vars = HashMap::new();
    if !path.exists() {
        return Ok(vars);
    }
    let content =
        fs::read_to_string(path).with_context(|| format!("Reading {}", path.display()))?;
    for line in content.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let line = trimmed.strip_prefix("export ").unwrap_or(trimmed);
        let Some((key, value_raw)) = line.split_once('=') else {
            continue;
        };
        let key = key.trim();
        if key.is_empty() {
            continue;
        }
        let value = value_raw.trim();
        let value = value
            .strip_prefix('"')
            .and_then(|value| value.strip_suffix('"'))
            .or_else(|| {
                value
                    .strip_prefix('\'')
                    .and_then(|value| value.strip_suffix('\''))
            })
            .unwrap_or(value);
        vars.insert(key.to_string(), value.to_string());
    }
    Ok(vars)
}
