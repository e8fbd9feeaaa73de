use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, ensure};
use ferry_source::{S3Options, StoreSource};
use serde::Deserialize;

const DEFAULT_CREDENTIALS: &str = "credentials.toml";

fn default_tick_secs() -> u64 { 10 }

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Config {
    /// Upload endpoint; status is queried at `{endpoint_url}/{id}/status`.
    pub endpoint_url: String,
    /// State file. Relative paths are taken from the config file's directory.
    pub status_file:  PathBuf,
    #[serde(default = "default_tick_secs")]
    pub tick_secs:    u64,
    pub source:       SourceConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum SourceConfig {
    S3 {
        bucket:            String,
        region:            String,
        endpoint:          Option<String>,
        access_key_id:     Option<String>,
        secret_access_key: Option<String>,
    },
    Local {
        root: PathBuf,
    },
}

/// Static keys kept out of the main config file.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Credentials {
    access_key_id:     Option<String>,
    secret_access_key: Option<String>,
}

impl Config {
    /// Read `path`, then apply `credentials` (or `credentials.toml` next to
    /// it when that exists).
    pub fn load(path: &Path, credentials: Option<&Path>) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        let base = path.parent().unwrap_or(Path::new(""));
        let mut config = Self::parse(&text, base)
            .with_context(|| format!("invalid config {}", path.display()))?;

        let (credentials, required) = match credentials {
            Some(path) => (path.to_path_buf(), true),
            None => (base.join(DEFAULT_CREDENTIALS), false),
        };
        if required || credentials.exists() {
            let text = fs::read_to_string(&credentials)
                .with_context(|| format!("failed to read credentials {}", credentials.display()))?;
            let parsed: Credentials = toml::from_str(&text)
                .with_context(|| format!("invalid credentials {}", credentials.display()))?;
            config.apply_credentials(parsed);
        }
        Ok(config)
    }

    pub fn parse(text: &str, base: &Path) -> Result<Self> {
        let mut config: Self = toml::from_str(text)?;
        ensure!(config.tick_secs > 0, "tick_secs must be > 0");

        config.status_file = base.join(&config.status_file);
        if let SourceConfig::Local { root } = &mut config.source {
            *root = base.join(&*root);
        }
        Ok(config)
    }

    /// Override S3 keys, but only with a complete pair.
    pub fn apply_credentials(&mut self, credentials: Credentials) {
        let (Some(key_id), Some(secret)) = (credentials.access_key_id, credentials.secret_access_key)
        else {
            return;
        };
        if let SourceConfig::S3 {
            access_key_id,
            secret_access_key,
            ..
        } = &mut self.source
        {
            *access_key_id = Some(key_id);
            *secret_access_key = Some(secret);
        }
    }

    pub fn tick(&self) -> Duration { Duration::from_secs(self.tick_secs) }
}

impl SourceConfig {
    pub fn open(&self) -> Result<StoreSource> {
        let source = match self {
            Self::S3 {
                bucket,
                region,
                endpoint,
                access_key_id,
                secret_access_key,
            } => StoreSource::s3(&S3Options {
                bucket:            bucket.clone(),
                region:            region.clone(),
                endpoint:          endpoint.clone(),
                access_key_id:     access_key_id.clone(),
                secret_access_key: secret_access_key.clone(),
            })?,
            Self::Local { root } => StoreSource::local(root)?,
        };
        Ok(source)
    }
}
