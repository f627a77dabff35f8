//! Common test utilities for integration tests
//!
//! Provides an in-memory hosting service that keeps real refs, trees and
//! commits, plus fake `git` and templating runners, so the full change flow
//! can be exercised without network access.

#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;

use chartsmith::error::{Error, Result};
use chartsmith::git::GitRunner;
use chartsmith::hosting::{
    Blob, Branch, Commit, Credential, EntryKind, HostingClient, NewCommit, NewPullRequest,
    NewTreeEntry, PullRequest, Reference, RepoSlug, Repository, Tree, TreeEntry,
};
use chartsmith::render::Templater;

/// Re-export commonly used testing utilities
pub mod prelude {
    pub use assert_cmd::cargo::cargo_bin_cmd;
    pub use assert_fs::prelude::*;
    pub use assert_fs::TempDir;
    pub use predicates::prelude::*;
}

/// Path to content.
pub type Files = BTreeMap<String, String>;

#[derive(Default)]
struct Store {
    refs: HashMap<String, String>,
    commits: HashMap<String, Commit>,
    trees: HashMap<String, Files>,
    blobs: HashMap<String, String>,
    pull_requests: Vec<(RepoSlug, NewPullRequest)>,
    next_id: usize,
}

impl Store {
    fn next(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{prefix}{:04}", self.next_id)
    }

    fn store_tree(&mut self, files: Files) -> String {
        let sha = self.next("tree-");
        self.trees.insert(sha.clone(), files);
        sha
    }

    fn blob_sha(&mut self, content: &str) -> String {
        if let Some((sha, _)) = self.blobs.iter().find(|(_, c)| c.as_str() == content) {
            return sha.clone();
        }
        let sha = self.next("blob-");
        self.blobs.insert(sha.clone(), content.to_string());
        sha
    }

    fn resolve_tree(&self, tree_ish: &str) -> Option<&Files> {
        let commit_sha = self
            .refs
            .get(&format!("refs/heads/{tree_ish}"))
            .map(String::as_str)
            .unwrap_or(tree_ish);
        let tree_sha = self
            .commits
            .get(commit_sha)
            .map(|c| c.tree_sha.as_str())
            .unwrap_or(tree_ish);
        self.trees.get(tree_sha)
    }

    fn is_ancestor(&self, ancestor: &str, of: &str) -> bool {
        let mut pending = vec![of.to_string()];
        while let Some(sha) = pending.pop() {
            if sha == ancestor {
                return true;
            }
            if let Some(commit) = self.commits.get(&sha) {
                pending.extend(commit.parents.iter().cloned());
            }
        }
        false
    }
}

/// Hosting service kept entirely in memory.
#[derive(Default)]
pub struct MemoryHosting {
    store: Mutex<Store>,
    calls: Mutex<Vec<String>>,
    latency: Option<Duration>,
}

impl MemoryHosting {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every ref lookup by `latency`, as a remote service would.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Create `branch` with a single root commit holding `files`.
    pub fn with_branch(self, branch: &str, files: &[(&str, &str)]) -> Self {
        {
            let mut store = self.store.lock().unwrap();
            let files: Files = files
                .iter()
                .map(|(path, content)| (path.to_string(), content.to_string()))
                .collect();
            for content in files.values() {
                store.blob_sha(content);
            }
            let tree_sha = store.store_tree(files);
            let commit_sha = store.next("commit-");
            store.commits.insert(
                commit_sha.clone(),
                Commit {
                    sha: commit_sha.clone(),
                    tree_sha,
                    parents: vec![],
                },
            );
            store.refs.insert(format!("refs/heads/{branch}"), commit_sha);
        }
        self
    }

    /// Files on the tip of `branch`.
    pub fn files_on(&self, branch: &str) -> Option<Files> {
        let store = self.store.lock().unwrap();
        let sha = store.refs.get(&format!("refs/heads/{branch}"))?;
        let commit = store.commits.get(sha)?;
        store.trees.get(&commit.tree_sha).cloned()
    }

    /// Tip commit of `branch`.
    pub fn tip(&self, branch: &str) -> Option<Commit> {
        let store = self.store.lock().unwrap();
        let sha = store.refs.get(&format!("refs/heads/{branch}"))?;
        store.commits.get(sha).cloned()
    }

    pub fn branch_names(&self) -> Vec<String> {
        let store = self.store.lock().unwrap();
        let mut names: Vec<String> = store
            .refs
            .keys()
            .filter_map(|r| r.strip_prefix("refs/heads/"))
            .map(str::to_string)
            .collect();
        names.sort();
        names
    }

    pub fn pull_requests(&self) -> Vec<(RepoSlug, NewPullRequest)> {
        self.store.lock().unwrap().pull_requests.clone()
    }

    pub fn count(&self, method: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.as_str() == method)
            .count()
    }

    fn record(&self, method: &str) {
        self.calls.lock().unwrap().push(method.to_string());
    }
}

#[async_trait]
impl HostingClient for MemoryHosting {
    async fn list_repositories(&self, _: &Credential, owner: &str) -> Result<Vec<Repository>> {
        self.record("list_repositories");
        Ok(vec![Repository {
            id: 1,
            name: "web".to_string(),
            owner: owner.to_string(),
            description: "memory".to_string(),
        }])
    }

    async fn list_branches(&self, _: &Credential, _: &RepoSlug) -> Result<Vec<Branch>> {
        self.record("list_branches");
        let store = self.store.lock().unwrap();
        let mut branches: Vec<Branch> = store
            .refs
            .iter()
            .filter_map(|(name, sha)| {
                name.strip_prefix("refs/heads/").map(|n| Branch {
                    name: n.to_string(),
                    sha: sha.clone(),
                })
            })
            .collect();
        branches.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(branches)
    }

    async fn list_tree(
        &self,
        _: &Credential,
        repo: &RepoSlug,
        tree_ish: &str,
    ) -> Result<Vec<TreeEntry>> {
        self.record("list_tree");
        let mut store = self.store.lock().unwrap();
        let files = store
            .resolve_tree(tree_ish)
            .cloned()
            .ok_or_else(|| Error::hosting("list_tree", format!("404 Not Found - {repo}@{tree_ish}")))?;

        let mut dirs = std::collections::BTreeSet::new();
        for path in files.keys() {
            let mut parent = Path::new(path).parent();
            while let Some(dir) = parent.filter(|d| !d.as_os_str().is_empty()) {
                dirs.insert(dir.to_string_lossy().into_owned());
                parent = dir.parent();
            }
        }

        let mut entries: Vec<TreeEntry> = dirs
            .into_iter()
            .map(|dir| TreeEntry::new(dir.clone(), format!("dir-{dir}"), EntryKind::Tree))
            .collect();
        for (path, content) in files {
            let sha = store.blob_sha(&content);
            entries.push(TreeEntry::new(path, sha, EntryKind::Blob));
        }
        entries.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(entries)
    }

    async fn get_blob(&self, _: &Credential, _: &RepoSlug, sha: &str) -> Result<Blob> {
        self.record("get_blob");
        let store = self.store.lock().unwrap();
        let content = store
            .blobs
            .get(sha)
            .ok_or_else(|| Error::hosting("get_blob", "404 Not Found"))?;
        Ok(Blob {
            sha: sha.to_string(),
            content: STANDARD.encode(content),
        })
    }

    async fn get_ref(&self, _: &Credential, _: &RepoSlug, name: &str) -> Result<Option<Reference>> {
        self.record("get_ref");
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        let store = self.store.lock().unwrap();
        Ok(store.refs.get(name).map(|sha| Reference {
            name: name.to_string(),
            sha: sha.clone(),
        }))
    }

    async fn create_ref(
        &self,
        _: &Credential,
        _: &RepoSlug,
        name: &str,
        sha: &str,
    ) -> Result<Reference> {
        self.record("create_ref");
        let mut store = self.store.lock().unwrap();
        if store.refs.contains_key(name) {
            return Err(Error::hosting("create_ref", "422 Reference already exists"));
        }
        if !store.commits.contains_key(sha) {
            return Err(Error::hosting("create_ref", "422 Object does not exist"));
        }
        store.refs.insert(name.to_string(), sha.to_string());
        Ok(Reference {
            name: name.to_string(),
            sha: sha.to_string(),
        })
    }

    async fn update_ref(
        &self,
        _: &Credential,
        _: &RepoSlug,
        name: &str,
        sha: &str,
        force: bool,
    ) -> Result<Reference> {
        self.record("update_ref");
        let mut store = self.store.lock().unwrap();
        let current = store
            .refs
            .get(name)
            .cloned()
            .ok_or_else(|| Error::hosting("update_ref", "422 Reference does not exist"))?;
        if !force && !store.is_ancestor(&current, sha) {
            return Err(Error::hosting("update_ref", "422 Update is not a fast forward"));
        }
        store.refs.insert(name.to_string(), sha.to_string());
        Ok(Reference {
            name: name.to_string(),
            sha: sha.to_string(),
        })
    }

    async fn get_commit(&self, _: &Credential, _: &RepoSlug, sha: &str) -> Result<Commit> {
        self.record("get_commit");
        let store = self.store.lock().unwrap();
        store
            .commits
            .get(sha)
            .cloned()
            .ok_or_else(|| Error::hosting("get_commit", "404 Not Found"))
    }

    async fn create_tree(
        &self,
        _: &Credential,
        _: &RepoSlug,
        base_tree: &str,
        entries: &[NewTreeEntry],
    ) -> Result<Tree> {
        self.record("create_tree");
        let mut store = self.store.lock().unwrap();
        let mut files = store
            .trees
            .get(base_tree)
            .cloned()
            .ok_or_else(|| Error::hosting("create_tree", "422 base_tree does not exist"))?;
        for entry in entries {
            store.blob_sha(&entry.content);
            files.insert(entry.path.clone(), entry.content.clone());
        }
        Ok(Tree {
            sha: store.store_tree(files),
        })
    }

    async fn create_commit(
        &self,
        _: &Credential,
        _: &RepoSlug,
        commit: &NewCommit,
    ) -> Result<Commit> {
        self.record("create_commit");
        let mut store = self.store.lock().unwrap();
        if !store.trees.contains_key(&commit.tree_sha) {
            return Err(Error::hosting("create_commit", "422 tree does not exist"));
        }
        let sha = store.next("commit-");
        let created = Commit {
            sha: sha.clone(),
            tree_sha: commit.tree_sha.clone(),
            parents: commit.parents.clone(),
        };
        store.commits.insert(sha, created.clone());
        Ok(created)
    }

    async fn create_pull_request(
        &self,
        _: &Credential,
        repo: &RepoSlug,
        pull_request: &NewPullRequest,
    ) -> Result<PullRequest> {
        self.record("create_pull_request");
        let mut store = self.store.lock().unwrap();
        let branch = pull_request
            .head
            .rsplit(':')
            .next()
            .unwrap_or(&pull_request.head);
        if !store.refs.contains_key(&format!("refs/heads/{branch}")) {
            return Err(Error::hosting(
                "create_pull_request",
                "422 Validation Failed - head does not exist",
            ));
        }
        store
            .pull_requests
            .push((repo.clone(), pull_request.clone()));
        let number = store.pull_requests.len() as u64;
        Ok(PullRequest {
            number,
            html_url: format!("https://github.com/{repo}/pull/{number}"),
        })
    }
}

/// Fake git that materialises a fixed set of files as the clone.
pub struct FixtureGit {
    files: Vec<(String, String)>,
    clones: AtomicUsize,
}

impl FixtureGit {
    pub fn new(files: &[(&str, &str)]) -> Self {
        Self {
            files: files
                .iter()
                .map(|(p, c)| (p.to_string(), c.to_string()))
                .collect(),
            clones: AtomicUsize::new(0),
        }
    }

    pub fn clone_count(&self) -> usize {
        self.clones.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl GitRunner for FixtureGit {
    async fn clone_branch(&self, _url: &str, _branch: &str, target_dir: &Path) -> Result<()> {
        self.clones.fetch_add(1, Ordering::SeqCst);
        // Give concurrent callers a chance to pile up on the same identity.
        tokio::task::yield_now().await;
        tokio::fs::create_dir_all(target_dir).await?;
        for (path, content) in &self.files {
            let full = target_dir.join(path);
            if let Some(parent) = full.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            tokio::fs::write(full, content).await?;
        }
        Ok(())
    }
}

/// Templating fake returning a fixed manifest stream.
pub struct StaticTemplater(pub String);

#[async_trait]
impl Templater for StaticTemplater {
    async fn template(&self, _release_name: &str, chart_dir: &Path) -> Result<String> {
        if !chart_dir.is_dir() {
            return Err(Error::Render {
                chart: chart_dir.display().to_string(),
                stderr: "Error: chart directory does not exist".to_string(),
            });
        }
        Ok(self.0.clone())
    }
}
