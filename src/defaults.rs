//! Default values for chartsmith configuration.
//!
//! This module provides centralized default values used by [`crate::config`]
//! and the CLI, ensuring consistency and avoiding duplication.

use std::path::PathBuf;
use std::time::Duration;

/// How often the eviction sweep scans the workspace cache.
pub const SWEEP_INTERVAL: Duration = Duration::from_secs(5 * 60);

/// Workspaces idle for longer than this are evicted by the sweep.
pub const IDLE_THRESHOLD: Duration = Duration::from_secs(10 * 60);

/// Time in-flight work is given to finish after a shutdown signal.
pub const SHUTDOWN_GRACE: Duration = Duration::from_secs(15);

/// Version-control client used for clones.
pub const GIT_BINARY: &str = "git";

/// Templating tool used to render charts.
pub const HELM_BINARY: &str = "helm3";

/// Base URL of the hosting service REST API.
pub const API_BASE_URL: &str = "https://api.github.com";

/// Host used to build clone URLs.
pub const CLONE_HOST: &str = "github.com";

/// Literal prefix of generated branch names.
pub const BRANCH_PREFIX: &str = "bot-test-branch-";

/// Number of random characters appended to [`BRANCH_PREFIX`].
pub const BRANCH_SUFFIX_LEN: usize = 5;

/// Author name recorded on generated commits.
pub const COMMIT_AUTHOR_NAME: &str = "chartsmith-bot";

/// Author email recorded on generated commits.
pub const COMMIT_AUTHOR_EMAIL: &str = "chartsmith-bot@users.noreply.github.com";

/// Message recorded on generated commits.
pub const COMMIT_MESSAGE: &str = "k8s-ingress-extension";

/// Returns the default workspace root directory.
///
/// Uses the platform-appropriate cache directory:
/// - Linux: `~/.cache/chartsmith/workspaces` (XDG Base Directory)
/// - macOS: `~/Library/Caches/chartsmith/workspaces`
/// - Windows: `{FOLDERID_LocalAppData}\chartsmith\workspaces`
///
/// Falls back to `.chartsmith-workspaces` in the current directory if the
/// platform cache directory cannot be determined.
pub fn default_workspace_root() -> PathBuf {
    dirs::cache_dir()
        .map(|dir| dir.join("chartsmith").join("workspaces"))
        .unwrap_or_else(|| PathBuf::from(".chartsmith-workspaces"))
}
