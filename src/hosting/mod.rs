//! # Hosting Service Capability
//!
//! The hosting service (GitHub in the reference deployment) is consumed
//! through the [`HostingClient`] trait. The rest of the crate only ever talks
//! to this trait, which keeps the tree/commit builder and the pull request
//! publisher testable with in-memory fakes.
//!
//! Every call takes a caller-scoped [`Credential`]; the crate never stores,
//! refreshes or validates credentials beyond passing them through.
//!
//! [`github::GitHubClient`] is the default implementation, speaking the
//! GitHub REST API over `reqwest`.

pub mod github;

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Opaque access token supplied by the caller.
///
/// The `Debug` output never contains the token.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Credential(String);

impl Credential {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// The raw token, for building request headers and clone URLs.
    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            f.write_str("Credential(<none>)")
        } else {
            f.write_str("Credential(***)")
        }
    }
}

/// An `owner/name` repository coordinate.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RepoSlug {
    pub owner: String,
    pub name: String,
}

impl RepoSlug {
    pub fn new(owner: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for RepoSlug {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

/// Kind of object a tree entry points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    Blob,
    Tree,
    Commit,
}

/// One entry of a recursive tree listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeEntry {
    pub path: String,
    pub sha: String,
    #[serde(rename = "type")]
    pub kind: EntryKind,
}

impl TreeEntry {
    pub fn new(path: impl Into<String>, sha: impl Into<String>, kind: EntryKind) -> Self {
        Self {
            path: path.into(),
            sha: sha.into(),
            kind,
        }
    }

    pub fn is_blob(&self) -> bool {
        self.kind == EntryKind::Blob
    }

    pub fn is_tree(&self) -> bool {
        self.kind == EntryKind::Tree
    }
}

/// Blob contents as returned by the hosting service (base64 encoded).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Blob {
    pub sha: String,
    pub content: String,
}

/// A named pointer to a commit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Reference {
    /// Fully qualified name, e.g. `refs/heads/main`.
    pub name: String,
    pub sha: String,
}

/// A commit as far as this crate cares about it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Commit {
    pub sha: String,
    pub tree_sha: String,
    pub parents: Vec<String>,
}

/// A file staged into a new tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTreeEntry {
    pub path: String,
    pub mode: String,
    pub content: String,
}

/// A tree created on the hosting service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Tree {
    pub sha: String,
}

/// Author or committer of a new commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature {
    pub name: String,
    pub email: String,
}

/// A commit to be created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewCommit {
    pub message: String,
    pub tree_sha: String,
    pub parents: Vec<String>,
    pub author: Signature,
}

/// A pull request to be opened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewPullRequest {
    pub title: String,
    /// `branch` or `owner:branch` for cross-fork pull requests.
    pub head: String,
    pub base: String,
    pub body: String,
    pub maintainer_can_modify: bool,
}

/// A created pull request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PullRequest {
    pub number: u64,
    pub html_url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Branch {
    pub name: String,
    pub sha: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Repository {
    pub id: u64,
    pub name: String,
    pub owner: String,
    pub description: String,
}

/// Operations the hosting service must provide.
#[async_trait]
pub trait HostingClient: Send + Sync {
    async fn list_repositories(&self, credential: &Credential, owner: &str)
        -> Result<Vec<Repository>>;

    async fn list_branches(&self, credential: &Credential, repo: &RepoSlug)
        -> Result<Vec<Branch>>;

    /// Recursive listing of the tree at `tree_ish` (branch name or SHA).
    async fn list_tree(
        &self,
        credential: &Credential,
        repo: &RepoSlug,
        tree_ish: &str,
    ) -> Result<Vec<TreeEntry>>;

    async fn get_blob(&self, credential: &Credential, repo: &RepoSlug, sha: &str) -> Result<Blob>;

    /// Fetch a reference by fully qualified name. `Ok(None)` means it does not exist.
    async fn get_ref(
        &self,
        credential: &Credential,
        repo: &RepoSlug,
        name: &str,
    ) -> Result<Option<Reference>>;

    async fn create_ref(
        &self,
        credential: &Credential,
        repo: &RepoSlug,
        name: &str,
        sha: &str,
    ) -> Result<Reference>;

    /// Move a reference. Non-fast-forward moves are rejected unless `force`.
    async fn update_ref(
        &self,
        credential: &Credential,
        repo: &RepoSlug,
        name: &str,
        sha: &str,
        force: bool,
    ) -> Result<Reference>;

    async fn get_commit(&self, credential: &Credential, repo: &RepoSlug, sha: &str)
        -> Result<Commit>;

    async fn create_tree(
        &self,
        credential: &Credential,
        repo: &RepoSlug,
        base_tree: &str,
        entries: &[NewTreeEntry],
    ) -> Result<Tree>;

    async fn create_commit(
        &self,
        credential: &Credential,
        repo: &RepoSlug,
        commit: &NewCommit,
    ) -> Result<Commit>;

    async fn create_pull_request(
        &self,
        credential: &Credential,
        repo: &RepoSlug,
        pull_request: &NewPullRequest,
    ) -> Result<PullRequest>;
}

/// Fully qualified branch reference name.
pub fn branch_ref(branch: &str) -> String {
    format!("refs/heads/{}", branch)
}
