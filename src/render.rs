//! # Manifest Rendering
//!
//! Produces the YAML documents of an application, either by running the
//! templating tool against a chart inside a cached workspace, or by
//! collecting statically committed manifests from the remote tree.
//!
//! Chart rendering holds a [`WorkspaceLease`](crate::cache::WorkspaceLease)
//! for the duration of the templating run, refreshes the workspace's
//! last-access time and caches the combined output on the entry.
//!
//! Static rendering tolerates partial failure: a blob that cannot be fetched
//! or decoded is logged and skipped.

use std::future::Future;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use log::{debug, info, warn};
use tokio::process::Command;

use crate::cache::{checked_relative_path, WorkspaceCache, WorkspaceId};
use crate::error::{Error, Result};
use crate::hosting::TreeEntry;
use crate::manifest::split_documents;

/// Directory marker identifying statically committed manifests.
pub const MANIFESTS_MARKER: &str = "manifests/";

/// Templating tool capability.
#[async_trait]
pub trait Templater: Send + Sync {
    /// Render `chart_dir` as release `release_name`, returning the combined YAML.
    async fn template(&self, release_name: &str, chart_dir: &Path) -> Result<String>;
}

/// [`Templater`] backed by the `helm` binary.
#[derive(Debug, Clone)]
pub struct HelmCli {
    binary: String,
}

impl HelmCli {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }
}

impl Default for HelmCli {
    fn default() -> Self {
        Self::new(crate::defaults::HELM_BINARY)
    }
}

#[async_trait]
impl Templater for HelmCli {
    async fn template(&self, release_name: &str, chart_dir: &Path) -> Result<String> {
        debug!(
            "{} template {} {}",
            self.binary,
            release_name,
            chart_dir.display()
        );

        let output = Command::new(&self.binary)
            .arg("template")
            .arg(release_name)
            .arg(chart_dir)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| Error::Render {
                chart: chart_dir.display().to_string(),
                stderr: format!("failed to run {}: {}", self.binary, e),
            })?;

        if !output.status.success() {
            return Err(Error::Render {
                chart: chart_dir.display().to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        String::from_utf8(output.stdout).map_err(|e| Error::Render {
            chart: chart_dir.display().to_string(),
            stderr: format!("output is not UTF-8: {e}"),
        })
    }
}

/// Renders manifests from charts or static manifest trees.
#[derive(Clone)]
pub struct ManifestRenderer {
    templater: Arc<dyn Templater>,
}

impl ManifestRenderer {
    pub fn new(templater: Arc<dyn Templater>) -> Self {
        Self { templater }
    }

    /// Render the chart at `chart_path` (relative to the workspace root; empty
    /// for a chart at the root) and split the output into documents.
    ///
    /// Requires a prior successful `ensure_local_mirror` for `id`.
    pub async fn render_from_chart(
        &self,
        cache: &WorkspaceCache,
        id: &WorkspaceId,
        chart_path: &str,
        release_name: &str,
    ) -> Result<Vec<String>> {
        let chart_path = chart_path.trim_end_matches('/');
        let mut lease = cache.lease(id).await?;
        let chart_dir = if chart_path.is_empty() {
            lease.path.clone()
        } else {
            lease.path.join(checked_relative_path(chart_path)?)
        };

        let manifest = self.templater.template(release_name, &chart_dir).await?;
        lease.touch();
        let documents = split_documents(&manifest);
        lease.manifest = Some(manifest);

        info!(
            "rendered {} documents from {} in {}",
            documents.len(),
            if chart_path.is_empty() { "." } else { chart_path },
            id
        );
        Ok(documents)
    }
}

/// Whether a tree entry is a statically committed manifest.
pub fn is_static_manifest(entry: &TreeEntry) -> bool {
    entry.is_blob()
        && entry.path.contains(MANIFESTS_MARKER)
        && (entry.path.ends_with(".yaml") || entry.path.ends_with(".yml"))
}

/// Decode a base64 blob as delivered by the hosting service (line-wrapped).
pub fn decode_blob(content: &str) -> Result<String> {
    let compact: String = content
        .chars()
        .filter(|c| !c.is_ascii_whitespace())
        .collect();
    let bytes = STANDARD.decode(compact)?;
    String::from_utf8(bytes).map_err(|e| Error::invalid(format!("blob is not UTF-8: {e}")))
}

/// Collect the documents of every static manifest in `listing`.
///
/// `fetch_blob` receives a blob SHA and returns its base64 content. Blobs
/// that fail to fetch or decode are skipped.
pub async fn render_from_static_tree<F, Fut>(
    listing: &[TreeEntry],
    fetch_blob: F,
) -> Result<Vec<String>>
where
    F: Fn(String) -> Fut,
    Fut: Future<Output = Result<String>>,
{
    let mut documents = Vec::new();
    for entry in listing.iter().filter(|e| is_static_manifest(e)) {
        let content = match fetch_blob(entry.sha.clone()).await {
            Ok(content) => content,
            Err(e) => {
                warn!("skipping manifest {}: {}", entry.path, e);
                continue;
            }
        };
        match decode_blob(&content) {
            Ok(text) => documents.extend(split_documents(&text)),
            Err(e) => warn!("failed to decode manifest {}: {}", entry.path, e),
        }
    }
    Ok(documents)
}
