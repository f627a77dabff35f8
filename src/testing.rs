//! Hand-written fakes for the capability traits, shared by unit tests.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Barrier;

use crate::error::{Error, Result};
use crate::git::GitRunner;
use crate::hosting::{
    Blob, Branch, Commit, Credential, EntryKind, HostingClient, NewCommit, NewPullRequest,
    NewTreeEntry, PullRequest, Reference, RepoSlug, Repository, Tree, TreeEntry,
};
use crate::render::Templater;

/// Fake git that creates the clone directory and records every call.
pub struct FakeGit {
    calls: Mutex<Vec<(String, String, PathBuf)>>,
    failure: Option<String>,
    delay: Option<Duration>,
    rendezvous: Option<Barrier>,
    as_file: bool,
    files: Vec<(String, String)>,
}

impl FakeGit {
    pub fn new() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            failure: None,
            delay: None,
            rendezvous: None,
            as_file: false,
            files: Vec::new(),
        }
    }

    pub fn failing(message: &str) -> Self {
        Self {
            failure: Some(message.to_string()),
            ..Self::new()
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Every clone waits until `n` clones are in flight.
    pub fn with_rendezvous(mut self, n: usize) -> Self {
        self.rendezvous = Some(Barrier::new(n));
        self
    }

    pub fn writing_file_instead_of_dir(mut self) -> Self {
        self.as_file = true;
        self
    }

    pub fn with_file(mut self, path: &str, content: &str) -> Self {
        self.files.push((path.to_string(), content.to_string()));
        self
    }

    pub fn calls(&self) -> Vec<(String, String, PathBuf)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn clone_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl GitRunner for FakeGit {
    async fn clone_branch(&self, url: &str, branch: &str, target_dir: &Path) -> Result<()> {
        self.calls
            .lock()
            .unwrap()
            .push((url.to_string(), branch.to_string(), target_dir.to_path_buf()));

        if let Some(barrier) = &self.rendezvous {
            barrier.wait().await;
        }
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(message) = &self.failure {
            return Err(Error::Clone {
                url: crate::git::redact_url(url),
                branch: branch.to_string(),
                message: message.clone(),
            });
        }

        if self.as_file {
            std::fs::write(target_dir, b"not a directory")?;
            return Ok(());
        }
        std::fs::create_dir_all(target_dir)?;
        for (path, content) in &self.files {
            let full = target_dir.join(path);
            if let Some(parent) = full.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(full, content)?;
        }
        Ok(())
    }
}

/// Fake templating tool returning a canned manifest.
pub struct FakeTemplater {
    output: std::result::Result<String, String>,
    calls: Mutex<Vec<(String, PathBuf)>>,
}

impl FakeTemplater {
    pub fn rendering(output: &str) -> Self {
        Self {
            output: Ok(output.to_string()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(stderr: &str) -> Self {
        Self {
            output: Err(stderr.to_string()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<(String, PathBuf)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Templater for FakeTemplater {
    async fn template(&self, release_name: &str, chart_dir: &Path) -> Result<String> {
        self.calls
            .lock()
            .unwrap()
            .push((release_name.to_string(), chart_dir.to_path_buf()));
        self.output.clone().map_err(|stderr| Error::Render {
            chart: chart_dir.display().to_string(),
            stderr,
        })
    }
}

/// Hosting fake with canned responses and a call log.
#[derive(Default)]
pub struct RecordingHosting {
    pub refs: Mutex<HashMap<String, String>>,
    pub commits: Mutex<HashMap<String, Commit>>,
    pub blobs: HashMap<String, String>,
    pub listing: Vec<TreeEntry>,
    pub fail_on: Option<&'static str>,
    pub calls: Mutex<Vec<String>>,
    pub trees: Mutex<Vec<(String, Vec<NewTreeEntry>)>>,
    pub new_commits: Mutex<Vec<NewCommit>>,
    pub pull_requests: Mutex<Vec<(RepoSlug, NewPullRequest)>>,
}

impl RecordingHosting {
    /// A repository with `base` pointing at commit `c0` whose tree is `t0`.
    pub fn with_branch(base: &str) -> Self {
        let hosting = Self::default();
        hosting
            .refs
            .lock()
            .unwrap()
            .insert(format!("refs/heads/{base}"), "c0".to_string());
        hosting.commits.lock().unwrap().insert(
            "c0".to_string(),
            Commit {
                sha: "c0".to_string(),
                tree_sha: "t0".to_string(),
                parents: vec![],
            },
        );
        hosting
    }

    pub fn failing_on(mut self, method: &'static str) -> Self {
        self.fail_on = Some(method);
        self
    }

    pub fn with_blob(mut self, path: &str, sha: &str, content_base64: &str) -> Self {
        self.listing
            .push(TreeEntry::new(path, sha, EntryKind::Blob));
        self.blobs.insert(sha.to_string(), content_base64.to_string());
        self
    }

    pub fn with_entry(mut self, path: &str, sha: &str, kind: EntryKind) -> Self {
        self.listing.push(TreeEntry::new(path, sha, kind));
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, method: &str) -> usize {
        self.calls().iter().filter(|c| c.as_str() == method).count()
    }

    fn record(&self, method: &'static str) -> Result<()> {
        self.calls.lock().unwrap().push(method.to_string());
        if self.fail_on == Some(method) {
            return Err(Error::hosting(method, "injected failure"));
        }
        Ok(())
    }
}

#[async_trait]
impl HostingClient for RecordingHosting {
    async fn list_repositories(&self, _: &Credential, owner: &str) -> Result<Vec<Repository>> {
        self.record("list_repositories")?;
        Ok(vec![Repository {
            id: 1,
            name: "web".to_string(),
            owner: owner.to_string(),
            description: String::new(),
        }])
    }

    async fn list_branches(&self, _: &Credential, _: &RepoSlug) -> Result<Vec<Branch>> {
        self.record("list_branches")?;
        Ok(self
            .refs
            .lock()
            .unwrap()
            .iter()
            .filter_map(|(name, sha)| {
                name.strip_prefix("refs/heads/").map(|b| Branch {
                    name: b.to_string(),
                    sha: sha.clone(),
                })
            })
            .collect())
    }

    async fn list_tree(&self, _: &Credential, _: &RepoSlug, _: &str) -> Result<Vec<TreeEntry>> {
        self.record("list_tree")?;
        Ok(self.listing.clone())
    }

    async fn get_blob(&self, _: &Credential, _: &RepoSlug, sha: &str) -> Result<Blob> {
        self.record("get_blob")?;
        self.blobs
            .get(sha)
            .map(|content| Blob {
                sha: sha.to_string(),
                content: content.clone(),
            })
            .ok_or_else(|| Error::hosting("get_blob", "404 Not Found"))
    }

    async fn get_ref(&self, _: &Credential, _: &RepoSlug, name: &str) -> Result<Option<Reference>> {
        self.record("get_ref")?;
        Ok(self.refs.lock().unwrap().get(name).map(|sha| Reference {
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
        self.record("create_ref")?;
        self.refs
            .lock()
            .unwrap()
            .insert(name.to_string(), sha.to_string());
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
        _force: bool,
    ) -> Result<Reference> {
        self.record("update_ref")?;
        self.refs
            .lock()
            .unwrap()
            .insert(name.to_string(), sha.to_string());
        Ok(Reference {
            name: name.to_string(),
            sha: sha.to_string(),
        })
    }

    async fn get_commit(&self, _: &Credential, _: &RepoSlug, sha: &str) -> Result<Commit> {
        self.record("get_commit")?;
        self.commits
            .lock()
            .unwrap()
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
        self.record("create_tree")?;
        let mut trees = self.trees.lock().unwrap();
        trees.push((base_tree.to_string(), entries.to_vec()));
        Ok(Tree {
            sha: format!("t{}", trees.len()),
        })
    }

    async fn create_commit(&self, _: &Credential, _: &RepoSlug, commit: &NewCommit) -> Result<Commit> {
        self.record("create_commit")?;
        let mut new_commits = self.new_commits.lock().unwrap();
        new_commits.push(commit.clone());
        Ok(Commit {
            sha: format!("c{}", new_commits.len()),
            tree_sha: commit.tree_sha.clone(),
            parents: commit.parents.clone(),
        })
    }

    async fn create_pull_request(
        &self,
        _: &Credential,
        repo: &RepoSlug,
        pull_request: &NewPullRequest,
    ) -> Result<PullRequest> {
        self.record("create_pull_request")?;
        let mut prs = self.pull_requests.lock().unwrap();
        prs.push((repo.clone(), pull_request.clone()));
        Ok(PullRequest {
            number: prs.len() as u64,
            html_url: format!("https://github.com/{}/pull/{}", repo, prs.len()),
        })
    }
}
