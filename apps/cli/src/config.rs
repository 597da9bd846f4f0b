//! CLI configuration.
//!
//! Configuration is stored as TOML:
//! - Linux: `~/.config/fileup/config.toml`
//! - Windows: `%APPDATA%/fileup/config.toml`
//!
//! ```toml
//! server = "http://nas.local:8080"
//! token = "..."
//! timeout_secs = 300
//!
//! [upload]
//! batch_size = 50
//! max_concurrent_batches = 5
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use fileup_transfer::HttpTransportConfig;
use fileup_upload::UploadPolicy;
use serde::{Deserialize, Serialize};

/// Contents of the config file. Every field is optional.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    /// Base URL of the file server.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server: Option<String>,

    /// Bearer token sent with every upload.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,

    /// Per-request timeout. Unset means no timeout.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,

    pub upload: UploadPolicy,
}

/// Values given on the command line, which win over the file.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub server: Option<String>,
    pub batch_size: Option<usize>,
    pub max_batches: Option<usize>,
    pub max_transfers: Option<usize>,
}

/// Everything a run needs, after merging file and flags.
#[derive(Debug, Clone)]
pub struct Settings {
    pub transport: HttpTransportConfig,
    pub policy: UploadPolicy,
}

impl CliConfig {
    /// Loads `explicit` if given, else the default path if it exists.
    ///
    /// A missing default file is not an error; a missing explicit one is.
    pub fn load(explicit: Option<&Path>) -> anyhow::Result<Self> {
        match explicit {
            Some(path) => Self::read(path),
            None => {
                let path = config_path();
                if path.exists() {
                    Self::read(&path)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }

    fn read(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("cannot read config {}", path.display()))?;
        let config: CliConfig = toml::from_str(&content)
            .with_context(|| format!("invalid config {}", path.display()))?;
        tracing::debug!(path = %path.display(), "configuration loaded");
        Ok(config)
    }

    pub fn resolve(mut self, overrides: &Overrides) -> anyhow::Result<Settings> {
        let server = overrides
            .server
            .clone()
            .or(self.server)
            .context("no server configured: pass --server or set `server` in the config file")?;

        if let Some(n) = overrides.batch_size {
            self.upload.batch_size = n;
        }
        if let Some(n) = overrides.max_batches {
            self.upload.max_concurrent_batches = n;
        }
        if let Some(n) = overrides.max_transfers {
            self.upload.max_concurrent_transfers = n;
        }
        self.upload.validate()?;

        let mut transport = HttpTransportConfig::new(server);
        transport.bearer_token = self.token;
        transport.timeout = self.timeout_secs.map(Duration::from_secs);

        Ok(Settings {
            transport,
            policy: self.upload,
        })
    }
}

/// Returns the platform-specific configuration file path.
pub fn config_path() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        let appdata =
            std::env::var("APPDATA").unwrap_or_else(|_| "C:\\Users\\Default\\AppData".into());
        PathBuf::from(appdata).join("fileup").join("config.toml")
    }

    #[cfg(not(target_os = "windows"))]
    {
        let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".into());
        PathBuf::from(home)
            .join(".config")
            .join("fileup")
            .join("config.toml")
    }
}
