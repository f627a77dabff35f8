//! # Configuration
//!
//! This module defines [`Settings`], the runtime configuration of chartsmith,
//! and the logic for loading it from a YAML file.
//!
//! Every field is optional in the file; missing fields fall back to the
//! values in [`crate::defaults`]. The CLI layers flags and `CHARTSMITH_*`
//! environment variables on top of the loaded file, so the effective
//! precedence is flag > environment > file > default.
//!
//! ## Example
//!
//! ```yaml
//! access_token: ghp_example
//! workspace_root: /var/lib/chartsmith
//! idle_threshold_secs: 900
//! commit:
//!   name: release-bot
//!   email: release-bot@example.com
//!   message: add ingress
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::defaults;
use crate::error::{Error, Result};
use crate::hosting::Credential;

/// Identity recorded on every commit the tree/commit builder creates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CommitIdentity {
    /// Author and committer name.
    pub name: String,
    /// Author and committer email.
    pub email: String,
    /// Commit message.
    pub message: String,
}

impl Default for CommitIdentity {
    fn default() -> Self {
        Self {
            name: defaults::COMMIT_AUTHOR_NAME.to_string(),
            email: defaults::COMMIT_AUTHOR_EMAIL.to_string(),
            message: defaults::COMMIT_MESSAGE.to_string(),
        }
    }
}

/// Runtime configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    /// Credential passed through to the hosting service and clone URLs.
    pub access_token: Credential,
    /// Directory holding workspace mirrors. `None` means the platform default.
    pub workspace_root: Option<PathBuf>,
    pub sweep_interval_secs: u64,
    pub idle_threshold_secs: u64,
    pub shutdown_grace_secs: u64,
    pub git_binary: String,
    pub helm_binary: String,
    pub api_base_url: String,
    pub clone_host: String,
    pub commit: CommitIdentity,
    pub branch_prefix: String,
    pub branch_suffix_len: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            access_token: Credential::default(),
            workspace_root: None,
            sweep_interval_secs: defaults::SWEEP_INTERVAL.as_secs(),
            idle_threshold_secs: defaults::IDLE_THRESHOLD.as_secs(),
            shutdown_grace_secs: defaults::SHUTDOWN_GRACE.as_secs(),
            git_binary: defaults::GIT_BINARY.to_string(),
            helm_binary: defaults::HELM_BINARY.to_string(),
            api_base_url: defaults::API_BASE_URL.to_string(),
            clone_host: defaults::CLONE_HOST.to_string(),
            commit: CommitIdentity::default(),
            branch_prefix: defaults::BRANCH_PREFIX.to_string(),
            branch_suffix_len: defaults::BRANCH_SUFFIX_LEN,
        }
    }
}

impl Settings {
    /// Effective workspace root.
    pub fn workspace_root(&self) -> PathBuf {
        self.workspace_root
            .clone()
            .unwrap_or_else(defaults::default_workspace_root)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    pub fn idle_threshold(&self) -> Duration {
        Duration::from_secs(self.idle_threshold_secs)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }

    /// Reject values that would make the cache or branch naming misbehave.
    pub fn validate(&self) -> Result<()> {
        if self.sweep_interval_secs == 0 {
            return Err(Error::Config {
                message: "sweep_interval_secs must be greater than zero".to_string(),
                hint: Some("remove the key to use the 300 second default".to_string()),
            });
        }
        if self.idle_threshold_secs == 0 {
            return Err(Error::Config {
                message: "idle_threshold_secs must be greater than zero".to_string(),
                hint: Some("remove the key to use the 600 second default".to_string()),
            });
        }
        if self.branch_prefix.is_empty() {
            return Err(Error::Config {
                message: "branch_prefix must not be empty".to_string(),
                hint: None,
            });
        }
        if self.branch_suffix_len == 0 {
            return Err(Error::Config {
                message: "branch_suffix_len must be greater than zero".to_string(),
                hint: None,
            });
        }
        url::Url::parse(&self.api_base_url)?;
        Ok(())
    }
}

/// Parses and validates a YAML string into [`Settings`].
///
/// An empty document yields the defaults.
pub fn parse(yaml_content: &str) -> Result<Settings> {
    let settings = if yaml_content.trim().is_empty() {
        Settings::default()
    } else {
        serde_yaml::from_str::<Settings>(yaml_content).map_err(|e| Error::Config {
            message: e.to_string(),
            hint: None,
        })?
    };
    settings.validate()?;
    Ok(settings)
}

/// Parse [`Settings`] from a YAML file path
pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Settings> {
    let content = std::fs::read_to_string(path).map_err(Error::Io)?;
    parse(&content)
}
