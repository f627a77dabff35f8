//! Version-control client used to populate workspaces.

use std::path::Path;

use async_trait::async_trait;
use log::debug;
use tokio::process::Command;
use url::Url;

use crate::error::{Error, Result};
use crate::hosting::Credential;

/// Trait for git operations - allows substituting a fake in tests
#[async_trait]
pub trait GitRunner: Send + Sync {
    /// Clone `branch` of `url` into `target_dir`.
    ///
    /// `target_dir` must not exist yet; its parent must.
    async fn clone_branch(&self, url: &str, branch: &str, target_dir: &Path) -> Result<()>;
}

/// [`GitRunner`] backed by the system `git` binary.
#[derive(Debug, Clone)]
pub struct GitCli {
    binary: String,
}

impl GitCli {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }
}

impl Default for GitCli {
    fn default() -> Self {
        Self::new(crate::defaults::GIT_BINARY)
    }
}

#[async_trait]
impl GitRunner for GitCli {
    async fn clone_branch(&self, url: &str, branch: &str, target_dir: &Path) -> Result<()> {
        debug!(
            "{} clone --depth=1 --branch {} {} {}",
            self.binary,
            branch,
            redact_url(url),
            target_dir.display()
        );

        // Never block on an interactive credential prompt.
        let output = Command::new(&self.binary)
            .args(["clone", "--depth=1", "--branch", branch, url])
            .arg(target_dir)
            .env("GIT_TERMINAL_PROMPT", "0")
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| Error::Clone {
                url: redact_url(url),
                branch: branch.to_string(),
                message: e.to_string(),
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::Clone {
                url: redact_url(url),
                branch: branch.to_string(),
                message: redact_text(stderr.trim(), url),
            });
        }

        Ok(())
    }
}

/// Build the HTTPS clone URL for `owner/repo` on `host`, embedding the
/// credential as the user component when one is given.
pub fn clone_url(host: &str, credential: &Credential, owner: &str, repo: &str) -> Result<String> {
    let mut url = Url::parse(&format!("https://{}/{}/{}.git", host, owner, repo))?;
    if !credential.is_empty() {
        url.set_username(credential.expose())
            .map_err(|_| Error::invalid(format!("cannot embed credential into clone URL for {host}")))?;
    }
    Ok(url.to_string())
}

/// Replace any user info in `url` with `***`.
///
/// Strings that do not parse as URLs are returned unchanged.
pub fn redact_url(url: &str) -> String {
    match Url::parse(url) {
        Ok(mut parsed) if !parsed.username().is_empty() || parsed.password().is_some() => {
            let _ = parsed.set_password(None);
            let _ = parsed.set_username("***");
            parsed.to_string()
        }
        _ => url.to_string(),
    }
}

/// git echoes the remote URL in its error output; scrub the credential.
fn redact_text(text: &str, url: &str) -> String {
    match Url::parse(url) {
        Ok(parsed) if !parsed.username().is_empty() => text.replace(parsed.username(), "***"),
        _ => text.to_string(),
    }
}
