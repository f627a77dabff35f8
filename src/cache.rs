//! # Workspace Cache
//!
//! On-disk mirrors of remote branches, cloned on demand and evicted when idle.
//!
//! ## Identity
//!
//! A workspace is identified by `(owner, repo, branch)`. Its directory under
//! the cache root is named by [`identity_hash`], and is owned exclusively by
//! the cache: nothing outside this module reads or writes it except through a
//! [`WorkspaceLease`].
//!
//! ## Locking
//!
//! The identity map is guarded by one mutex that is only held for lookups,
//! inserts and removals, never across an `.await`. Each identity owns a slot
//! with its own async mutex:
//!
//! - `ensure_local_mirror` holds the slot lock while cloning, so concurrent
//!   callers for the same identity wait and then reuse the clone. Different
//!   identities never contend.
//! - `lease` hands out the slot lock for the duration of a render or write.
//! - `sweep` takes the slot lock before inspecting an entry and re-reads the
//!   last-access time under it, so an entry that became active between the
//!   scan and the delete survives.
//!
//! A change flow holds one lease from its first write until its pull request
//! is open. Two flows against the same identity therefore run one after the
//! other instead of overwriting each other's staged files.
//!
//! ## Process lifetime
//!
//! Registrations live in memory only. A short-lived process calls
//! [`WorkspaceCache::prune_orphans`] on startup to drop directories left by
//! earlier processes, and [`WorkspaceCache::clear`] before it exits.
//!
//! Cache hits are never revalidated against the remote.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::path::{Component, Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, SystemTime};

use base64::engine::general_purpose::URL_SAFE;
use base64::Engine;
use log::{debug, info, warn};
use sha1::{Digest, Sha1};
use tokio::sync::{Mutex as AsyncMutex, OwnedMappedMutexGuard, OwnedMutexGuard};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::defaults;
use crate::error::{Error, Result};
use crate::git::{self, GitRunner};
use crate::hosting::Credential;

/// Directory name for a workspace.
///
/// SHA-1 over `owner/repo/branch`, URL-safe base64 encoded. Owner and
/// repository names cannot contain `/`, so the input is unambiguous.
pub fn identity_hash(owner: &str, repo: &str, branch: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(owner.as_bytes());
    hasher.update(b"/");
    hasher.update(repo.as_bytes());
    hasher.update(b"/");
    hasher.update(branch.as_bytes());
    URL_SAFE.encode(hasher.finalize())
}

/// Identity of a workspace: one branch of one repository.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct WorkspaceId {
    owner: String,
    repo: String,
    branch: String,
    hash: String,
}

impl WorkspaceId {
    pub fn new(owner: &str, repo: &str, branch: &str) -> Self {
        Self {
            owner: owner.to_string(),
            repo: repo.to_string(),
            branch: branch.to_string(),
            hash: identity_hash(owner, repo, branch),
        }
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn repo(&self) -> &str {
        &self.repo
    }

    pub fn branch(&self) -> &str {
        &self.branch
    }

    pub fn hash(&self) -> &str {
        &self.hash
    }

    fn not_found(&self) -> Error {
        Error::WorkspaceNotFound {
            owner: self.owner.clone(),
            repo: self.repo.clone(),
            branch: self.branch.clone(),
        }
    }
}

impl fmt::Display for WorkspaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}@{}", self.owner, self.repo, self.branch)
    }
}

/// A registered workspace.
#[derive(Debug, Clone)]
pub struct WorkspaceEntry {
    pub id: WorkspaceId,
    /// Absolute path of the clone.
    pub path: PathBuf,
    pub cloned_at: Instant,
    pub last_access: Instant,
    /// Most recent rendering output, if any.
    pub manifest: Option<String>,
}

impl WorkspaceEntry {
    /// Mark the workspace as used now.
    pub fn touch(&mut self) {
        self.last_access = Instant::now();
    }

    pub fn idle_for(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.last_access)
    }
}

type Slot = Arc<AsyncMutex<Option<WorkspaceEntry>>>;

/// Exclusive access to one workspace.
///
/// The sweep cannot evict the workspace while a lease is alive.
pub struct WorkspaceLease {
    guard: OwnedMappedMutexGuard<Option<WorkspaceEntry>, WorkspaceEntry>,
}

impl Deref for WorkspaceLease {
    type Target = WorkspaceEntry;

    fn deref(&self) -> &WorkspaceEntry {
        &self.guard
    }
}

impl DerefMut for WorkspaceLease {
    fn deref_mut(&mut self) -> &mut WorkspaceEntry {
        &mut self.guard
    }
}

impl WorkspaceLease {
    /// Write `contents` to `relative_path` inside the leased workspace and
    /// return the absolute path written.
    ///
    /// Parent directories are created as needed. Paths that are absolute or
    /// climb out of the workspace are rejected.
    pub async fn write_file(&mut self, relative_path: &str, contents: &[u8]) -> Result<PathBuf> {
        let target = self.path.join(checked_relative_path(relative_path)?);
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&target, contents).await?;
        self.touch();

        debug!("wrote {} in {}", relative_path, self.id);
        Ok(target)
    }
}

/// Cache of on-disk workspace mirrors.
pub struct WorkspaceCache {
    root: PathBuf,
    clone_host: String,
    idle_threshold: Duration,
    git: Arc<dyn GitRunner>,
    slots: Mutex<HashMap<WorkspaceId, Slot>>,
}

impl fmt::Debug for WorkspaceCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkspaceCache")
            .field("root", &self.root)
            .field("clone_host", &self.clone_host)
            .field("idle_threshold", &self.idle_threshold)
            .finish_non_exhaustive()
    }
}

impl WorkspaceCache {
    /// Create a cache rooted at `root`, cloning through `git`.
    ///
    /// `root` is made absolute against the current directory; it is created
    /// lazily on the first clone.
    pub fn new(root: impl AsRef<Path>, git: Arc<dyn GitRunner>) -> Result<Self> {
        Ok(Self {
            root: std::path::absolute(root.as_ref())?,
            clone_host: defaults::CLONE_HOST.to_string(),
            idle_threshold: defaults::IDLE_THRESHOLD,
            git,
            slots: Mutex::new(HashMap::new()),
        })
    }

    pub fn with_idle_threshold(mut self, idle_threshold: Duration) -> Self {
        self.idle_threshold = idle_threshold;
        self
    }

    pub fn with_clone_host(mut self, clone_host: impl Into<String>) -> Self {
        self.clone_host = clone_host.into();
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn idle_threshold(&self) -> Duration {
        self.idle_threshold
    }

    fn slots(&self) -> MutexGuard<'_, HashMap<WorkspaceId, Slot>> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn existing_slot(&self, id: &WorkspaceId) -> Option<Slot> {
        self.slots().get(id).cloned()
    }

    /// Make sure a local mirror of `owner/repo@branch` exists.
    ///
    /// On a hit the entry is returned without contacting the remote. On a
    /// miss the branch is cloned into a fresh directory; if the clone fails
    /// nothing is registered and the error is returned.
    pub async fn ensure_local_mirror(
        &self,
        credential: &Credential,
        owner: &str,
        repo: &str,
        branch: &str,
    ) -> Result<WorkspaceEntry> {
        if owner.is_empty() || repo.is_empty() || branch.is_empty() {
            return Err(Error::invalid(
                "owner, repository and branch are all required",
            ));
        }

        let id = WorkspaceId::new(owner, repo, branch);
        let slot = Arc::clone(self.slots().entry(id.clone()).or_default());
        let mut guard = slot.lock().await;

        if let Some(entry) = guard.as_mut() {
            debug!("workspace {} already present", id);
            entry.touch();
            return Ok(entry.clone());
        }

        let path = self.root.join(id.hash());
        let url = git::clone_url(&self.clone_host, credential, owner, repo)?;

        // Leftovers from an earlier process are not registered; start clean.
        if tokio::fs::try_exists(&path).await? {
            tokio::fs::remove_dir_all(&path).await?;
        }
        tokio::fs::create_dir_all(&self.root).await?;

        info!("cloning {} into {}", id, path.display());
        if let Err(e) = self.git.clone_branch(&url, branch, &path).await {
            warn!("failed to clone {}: {}", id, e);
            if let Err(cleanup) = remove_path(&path).await {
                warn!(
                    "failed to remove partial clone {}: {}",
                    path.display(),
                    cleanup
                );
            }
            return Err(e);
        }

        let now = Instant::now();
        let entry = WorkspaceEntry {
            id,
            path,
            cloned_at: now,
            last_access: now,
            manifest: None,
        };
        info!("cloned {}", entry.id);
        *guard = Some(entry.clone());
        Ok(entry)
    }

    /// Take exclusive access to an existing workspace.
    pub async fn lease(&self, id: &WorkspaceId) -> Result<WorkspaceLease> {
        let slot = self.existing_slot(id).ok_or_else(|| id.not_found())?;
        let guard: OwnedMutexGuard<Option<WorkspaceEntry>> = slot.lock_owned().await;
        OwnedMutexGuard::try_map(guard, Option::as_mut)
            .map(|guard| WorkspaceLease { guard })
            .map_err(|_| id.not_found())
    }

    /// Write a single file under a short-lived lease.
    ///
    /// See [`WorkspaceLease::write_file`]. Callers that go on to publish the
    /// file should hold their own lease instead.
    pub async fn write_file(
        &self,
        id: &WorkspaceId,
        relative_path: &str,
        contents: &[u8],
    ) -> Result<PathBuf> {
        checked_relative_path(relative_path)?;
        self.lease(id)
            .await?
            .write_file(relative_path, contents)
            .await
    }

    /// Snapshot of the entry for `id`, if registered.
    pub async fn get(&self, id: &WorkspaceId) -> Option<WorkspaceEntry> {
        let slot = self.existing_slot(id)?;
        let guard = slot.lock().await;
        guard.clone()
    }

    pub async fn contains(&self, id: &WorkspaceId) -> bool {
        self.get(id).await.is_some()
    }

    /// Last manifest rendered in the workspace.
    pub async fn cached_manifest(&self, id: &WorkspaceId) -> Option<String> {
        self.get(id).await.and_then(|entry| entry.manifest)
    }

    /// Refresh the last-access time of `id`.
    pub async fn touch(&self, id: &WorkspaceId) -> Result<()> {
        self.lease(id).await?.touch();
        Ok(())
    }

    /// Number of registered workspaces.
    pub async fn len(&self) -> usize {
        let snapshot: Vec<Slot> = self.slots().values().cloned().collect();
        let mut count = 0;
        for slot in snapshot {
            if slot.lock().await.is_some() {
                count += 1;
            }
        }
        count
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Evict every workspace idle for longer than the threshold.
    ///
    /// Returns the number of workspaces evicted. A workspace whose directory
    /// cannot be removed stays registered and is retried on the next sweep.
    pub async fn sweep(&self) -> usize {
        let evicted = self.evict(false).await;
        if evicted > 0 {
            info!("sweep evicted {} workspaces", evicted);
        }
        evicted
    }

    /// Evict every registered workspace regardless of idle time.
    ///
    /// Waits for outstanding leases. Returns the number of workspaces removed.
    pub async fn clear(&self) -> usize {
        let evicted = self.evict(true).await;
        if evicted > 0 {
            info!("removed {} workspaces", evicted);
        }
        evicted
    }

    async fn evict(&self, all: bool) -> usize {
        let snapshot: Vec<(WorkspaceId, Slot)> = self
            .slots()
            .iter()
            .map(|(id, slot)| (id.clone(), Arc::clone(slot)))
            .collect();
        debug!("sweeping {} workspace slots", snapshot.len());

        let mut evicted = 0;
        for (id, slot) in snapshot {
            let mut guard = slot.lock().await;

            if let Some(entry) = guard.as_ref() {
                let idle = entry.idle_for(Instant::now());
                if !all && idle < self.idle_threshold {
                    continue;
                }
                if let Err(e) = remove_path(&entry.path).await {
                    warn!(
                        "failed to remove workspace {} at {}: {}",
                        id,
                        entry.path.display(),
                        e
                    );
                    continue;
                }
                info!("evicted workspace {} after {:?} idle", id, idle);
                *guard = None;
                evicted += 1;
            }

            // Drop the empty slot unless another task is already waiting on it.
            let mut slots = self.slots();
            if slots
                .get(&id)
                .is_some_and(|current| Arc::ptr_eq(current, &slot) && Arc::strong_count(&slot) == 2)
            {
                slots.remove(&id);
            }
        }

        evicted
    }

    /// Remove workspace directories under the root that no entry owns and
    /// that have not been modified for the idle threshold.
    ///
    /// Only directories named like an [`identity_hash`] are considered.
    /// Returns the number of directories removed; a missing root counts as
    /// empty.
    pub async fn prune_orphans(&self) -> Result<usize> {
        let mut dir = match tokio::fs::read_dir(&self.root).await {
            Ok(dir) => dir,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e.into()),
        };
        let owned: HashSet<String> = self
            .slots()
            .keys()
            .map(|id| id.hash().to_string())
            .collect();

        let now = SystemTime::now();
        let mut removed = 0;
        while let Some(child) = dir.next_entry().await? {
            let name = child.file_name().to_string_lossy().into_owned();
            if !is_identity_hash(&name) || owned.contains(&name) {
                continue;
            }
            let metadata = child.metadata().await?;
            if !metadata.is_dir() {
                continue;
            }
            let age = metadata
                .modified()
                .ok()
                .and_then(|modified| now.duration_since(modified).ok())
                .unwrap_or_default();
            if age < self.idle_threshold {
                debug!("keeping recent workspace directory {}", name);
                continue;
            }

            match remove_path(&child.path()).await {
                Ok(()) => {
                    debug!("removed orphaned workspace directory {}", name);
                    removed += 1;
                }
                Err(e) => warn!(
                    "failed to remove orphaned workspace {}: {}",
                    child.path().display(),
                    e
                ),
            }
        }

        if removed > 0 {
            info!("pruned {} orphaned workspaces", removed);
        }
        Ok(removed)
    }

    /// Run [`Self::sweep`] every `interval` until `shutdown` is cancelled.
    pub fn spawn_sweeper(
        self: &Arc<Self>,
        interval: Duration,
        shutdown: CancellationToken,
    ) -> JoinHandle<()> {
        let cache = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => {
                        debug!("workspace sweeper stopped");
                        break;
                    }
                    _ = ticker.tick() => {
                        cache.sweep().await;
                    }
                }
            }
        })
    }
}

/// Remove a workspace path. A path that is already gone counts as removed.
async fn remove_path(path: &Path) -> std::io::Result<()> {
    match tokio::fs::remove_dir_all(path).await {
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        other => other,
    }
}

fn is_identity_hash(name: &str) -> bool {
    name.len() == 28
        && name.ends_with('=')
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '='))
}

pub(crate) fn checked_relative_path(relative_path: &str) -> Result<&Path> {
    let path = Path::new(relative_path);
    let mut components = path.components().peekable();
    if components.peek().is_none() {
        return Err(Error::invalid("file path must not be empty"));
    }
    if components.all(|c| matches!(c, Component::Normal(_) | Component::CurDir)) {
        Ok(path)
    } else {
        Err(Error::invalid(format!(
            "file path {relative_path:?} must be relative and stay inside the workspace"
        )))
    }
}
