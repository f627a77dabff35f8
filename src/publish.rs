//! # Tree/Commit Builder
//!
//! Turns files staged in a workspace into a commit on a fresh branch of the
//! remote repository. The pipeline is strictly sequential:
//!
//! 1. resolve the branch reference, creating it from the base branch tip
//!    when it does not exist yet,
//! 2. read every local file and submit one new tree on top of the tip's tree,
//! 3. commit that tree with the tip as sole parent and advance the branch.
//!
//! The first failure aborts the pipeline. Nothing created by an earlier step
//! is rolled back, so a failure after step 1 can leave an orphan branch.
//!
//! ## Text only
//!
//! File contents travel inline in the tree request, which carries UTF-8 text.
//! A local file that is not valid UTF-8 fails step 2 with [`Error::Tree`]
//! instead of being committed with altered bytes. Binary files are not
//! supported.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::{debug, info};
use rand::Rng;
use serde::Serialize;

use crate::config::CommitIdentity;
use crate::defaults;
use crate::error::{Error, Result};
use crate::hosting::{
    branch_ref, Commit, Credential, HostingClient, NewCommit, NewTreeEntry, Reference, RepoSlug,
    Signature, Tree,
};

/// Git file mode for a regular, non-executable file.
pub const FILE_MODE: &str = "100644";

/// The repository and branch a change is proposed against.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Target {
    pub owner: String,
    pub repo: String,
    pub base_branch: String,
}

impl Target {
    pub fn new(
        owner: impl Into<String>,
        repo: impl Into<String>,
        base_branch: impl Into<String>,
    ) -> Self {
        Self {
            owner: owner.into(),
            repo: repo.into(),
            base_branch: base_branch.into(),
        }
    }

    pub fn slug(&self) -> RepoSlug {
        RepoSlug::new(&self.owner, &self.repo)
    }
}

/// One local file and the path it is committed to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileMapping {
    pub local: PathBuf,
    pub remote: String,
}

impl FileMapping {
    pub fn new(local: impl Into<PathBuf>, remote: impl Into<String>) -> Self {
        Self {
            local: local.into(),
            remote: remote.into(),
        }
    }
}

/// Artifacts produced by a successful [`TreeCommitBuilder::publish_files`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Publication {
    pub reference: Reference,
    pub tree: Tree,
    pub commit: Commit,
}

/// Everything needed to propose one change as a pull request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeRequest {
    pub target: Target,
    pub branch: String,
    pub files: Vec<FileMapping>,
    /// Overrides the configured commit message when set.
    pub commit_message: Option<String>,
    pub title: String,
    pub body: String,
}

impl ChangeRequest {
    pub fn new(target: Target, branch: impl Into<String>) -> Self {
        Self {
            target,
            branch: branch.into(),
            files: Vec::new(),
            commit_message: None,
            title: String::new(),
            body: String::new(),
        }
    }

    pub fn with_file(mut self, local: impl Into<PathBuf>, remote: impl Into<String>) -> Self {
        self.files.push(FileMapping::new(local, remote));
        self
    }

    pub fn with_commit_message(mut self, message: impl Into<String>) -> Self {
        self.commit_message = Some(message.into());
        self
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self
    }
}

/// Generates branch names as a fixed prefix plus a random lowercase suffix.
///
/// Uniqueness is a heuristic only: two calls may return the same name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BranchNamer {
    prefix: String,
    suffix_len: usize,
}

impl BranchNamer {
    pub fn new(prefix: impl Into<String>, suffix_len: usize) -> Self {
        Self {
            prefix: prefix.into(),
            suffix_len,
        }
    }

    pub fn generate(&self) -> String {
        let mut rng = rand::thread_rng();
        let suffix: String = (0..self.suffix_len)
            .map(|_| char::from(rng.gen_range(b'a'..=b'z')))
            .collect();
        format!("{}{}", self.prefix, suffix)
    }
}

impl Default for BranchNamer {
    fn default() -> Self {
        Self::new(defaults::BRANCH_PREFIX, defaults::BRANCH_SUFFIX_LEN)
    }
}

/// Stages local files into a new remote tree and commits it.
#[derive(Clone)]
pub struct TreeCommitBuilder {
    hosting: Arc<dyn HostingClient>,
    identity: CommitIdentity,
}

impl TreeCommitBuilder {
    pub fn new(hosting: Arc<dyn HostingClient>, identity: CommitIdentity) -> Self {
        Self { hosting, identity }
    }

    pub fn identity(&self) -> &CommitIdentity {
        &self.identity
    }

    /// Commit `mappings` to `new_branch`, creating the branch from
    /// `target.base_branch` when needed.
    pub async fn publish_files(
        &self,
        credential: &Credential,
        target: &Target,
        new_branch: &str,
        mappings: &[FileMapping],
    ) -> Result<Publication> {
        self.run(credential, target, new_branch, mappings, &self.identity.message)
            .await
    }

    /// Run the pipeline for a [`ChangeRequest`].
    pub async fn publish(
        &self,
        credential: &Credential,
        request: &ChangeRequest,
    ) -> Result<Publication> {
        let message = request
            .commit_message
            .as_deref()
            .unwrap_or(self.identity.message.as_str());
        self.run(
            credential,
            &request.target,
            &request.branch,
            &request.files,
            message,
        )
        .await
    }

    async fn run(
        &self,
        credential: &Credential,
        target: &Target,
        new_branch: &str,
        mappings: &[FileMapping],
        message: &str,
    ) -> Result<Publication> {
        if mappings.is_empty() {
            return Err(Error::invalid("no files to publish"));
        }
        let repo = target.slug();

        let reference = self
            .resolve_reference(credential, &repo, &target.base_branch, new_branch)
            .await?;
        let tip = self
            .hosting
            .get_commit(credential, &repo, &reference.sha)
            .await?;

        let entries = stage_entries(mappings).await?;
        let tree = self
            .hosting
            .create_tree(credential, &repo, &tip.tree_sha, &entries)
            .await?;
        debug!("created tree {} with {} entries", tree.sha, entries.len());

        let commit = self
            .hosting
            .create_commit(
                credential,
                &repo,
                &NewCommit {
                    message: message.to_string(),
                    tree_sha: tree.sha.clone(),
                    parents: vec![tip.sha.clone()],
                    author: Signature {
                        name: self.identity.name.clone(),
                        email: self.identity.email.clone(),
                    },
                },
            )
            .await?;

        let reference = self
            .hosting
            .update_ref(credential, &repo, &reference.name, &commit.sha, false)
            .await
            .map_err(|e| Error::Update {
                reference: reference.name.clone(),
                message: e.to_string(),
            })?;

        info!(
            "committed {} files to {}:{} as {}",
            entries.len(),
            repo,
            new_branch,
            commit.sha
        );
        Ok(Publication {
            reference,
            tree,
            commit,
        })
    }

    async fn resolve_reference(
        &self,
        credential: &Credential,
        repo: &RepoSlug,
        base_branch: &str,
        new_branch: &str,
    ) -> Result<Reference> {
        if new_branch.is_empty() {
            return Err(Error::Reference {
                reference: branch_ref(new_branch),
                message: "branch name is empty".to_string(),
            });
        }
        if base_branch.is_empty() {
            return Err(Error::Reference {
                reference: branch_ref(new_branch),
                message: "base branch is empty".to_string(),
            });
        }

        let name = branch_ref(new_branch);
        if let Some(existing) = self.hosting.get_ref(credential, repo, &name).await? {
            debug!("reusing existing reference {}", name);
            return Ok(existing);
        }
        if new_branch == base_branch {
            return Err(Error::Reference {
                reference: name,
                message: "new branch equals the base branch, which does not exist".to_string(),
            });
        }

        let base_name = branch_ref(base_branch);
        let base = self
            .hosting
            .get_ref(credential, repo, &base_name)
            .await?
            .ok_or_else(|| Error::Reference {
                reference: base_name.clone(),
                message: format!("base branch {base_branch} not found in {repo}"),
            })?;

        let created = self
            .hosting
            .create_ref(credential, repo, &name, &base.sha)
            .await?;
        info!("created {} at {} from {}", name, base.sha, base_branch);
        Ok(created)
    }
}

async fn stage_entries(mappings: &[FileMapping]) -> Result<Vec<NewTreeEntry>> {
    let mut entries = Vec::with_capacity(mappings.len());
    for mapping in mappings {
        let remote = mapping.remote.trim_start_matches('/');
        if remote.is_empty() {
            return Err(Error::invalid(format!(
                "remote path for {} is empty",
                mapping.local.display()
            )));
        }
        entries.push(NewTreeEntry {
            path: remote.to_string(),
            mode: FILE_MODE.to_string(),
            content: read_local(&mapping.local).await?,
        });
    }
    Ok(entries)
}

async fn read_local(path: &Path) -> Result<String> {
    let tree_error = |message: String| Error::Tree {
        path: path.display().to_string(),
        message,
    };
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|e| tree_error(e.to_string()))?;
    String::from_utf8(bytes).map_err(|_| tree_error("file is not valid UTF-8".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::RecordingHosting;
    use proptest::prelude::*;
    use tempfile::TempDir;

    fn builder(hosting: &Arc<RecordingHosting>) -> TreeCommitBuilder {
        TreeCommitBuilder::new(hosting.clone(), CommitIdentity::default())
    }

    fn staged(temp: &TempDir, name: &str, content: &str) -> PathBuf {
        let path = temp.path().join(name);
        std::fs::write(&path, content).unwrap();
        path
    }

    #[tokio::test]
    async fn test_publish_creates_branch_tree_and_commit() {
        let temp = TempDir::new().unwrap();
        let local = staged(&temp, "ingress.yaml", "kind: Ingress\n");
        let hosting = Arc::new(RecordingHosting::with_branch("main"));

        let publication = builder(&hosting)
            .publish_files(
                &Credential::new("t"),
                &Target::new("acme", "web", "main"),
                "bot-test-branch-abcde",
                &[FileMapping::new(&local, "deploy/ingress.yaml")],
            )
            .await
            .unwrap();

        assert_eq!(
            hosting.calls(),
            vec![
                "get_ref",
                "get_ref",
                "create_ref",
                "get_commit",
                "create_tree",
                "create_commit",
                "update_ref"
            ]
        );
        assert_eq!(publication.reference.name, "refs/heads/bot-test-branch-abcde");
        assert_eq!(publication.reference.sha, "c1");
        assert_eq!(publication.tree.sha, "t1");

        let trees = hosting.trees.lock().unwrap();
        assert_eq!(trees[0].0, "t0");
        assert_eq!(
            trees[0].1,
            vec![NewTreeEntry {
                path: "deploy/ingress.yaml".to_string(),
                mode: FILE_MODE.to_string(),
                content: "kind: Ingress\n".to_string(),
            }]
        );

        let commits = hosting.new_commits.lock().unwrap();
        assert_eq!(commits[0].parents, vec!["c0".to_string()]);
        assert_eq!(commits[0].message, defaults::COMMIT_MESSAGE);
        assert_eq!(commits[0].author.name, defaults::COMMIT_AUTHOR_NAME);
    }

    #[tokio::test]
    async fn test_missing_base_branch_has_no_side_effects() {
        let temp = TempDir::new().unwrap();
        let local = staged(&temp, "a.yaml", "a");
        let hosting = Arc::new(RecordingHosting::with_branch("main"));

        let err = builder(&hosting)
            .publish_files(
                &Credential::default(),
                &Target::new("acme", "web", "does-not-exist"),
                "feature",
                &[FileMapping::new(&local, "a.yaml")],
            )
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Reference { .. }));
        assert_eq!(hosting.count("create_ref"), 0);
        assert_eq!(hosting.count("create_tree"), 0);
        assert_eq!(hosting.count("create_commit"), 0);
    }

    #[tokio::test]
    async fn test_empty_base_branch_is_reference_error() {
        let temp = TempDir::new().unwrap();
        let local = staged(&temp, "a.yaml", "a");
        let hosting = Arc::new(RecordingHosting::with_branch("main"));

        let err = builder(&hosting)
            .publish_files(
                &Credential::default(),
                &Target::new("acme", "web", ""),
                "feature",
                &[FileMapping::new(&local, "a.yaml")],
            )
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Reference { .. }));
        assert!(hosting.calls().is_empty());
    }

    #[tokio::test]
    async fn test_new_branch_equal_to_missing_base_is_reference_error() {
        let temp = TempDir::new().unwrap();
        let local = staged(&temp, "a.yaml", "a");
        let hosting = Arc::new(RecordingHosting::default());

        let err = builder(&hosting)
            .publish_files(
                &Credential::default(),
                &Target::new("acme", "web", "release"),
                "release",
                &[FileMapping::new(&local, "a.yaml")],
            )
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Reference { .. }));
        assert_eq!(hosting.calls(), vec!["get_ref"]);
    }

    #[tokio::test]
    async fn test_existing_branch_is_reused() {
        let temp = TempDir::new().unwrap();
        let local = staged(&temp, "a.yaml", "a");
        let hosting = Arc::new(RecordingHosting::with_branch("main"));
        hosting
            .refs
            .lock()
            .unwrap()
            .insert("refs/heads/feature".to_string(), "c0".to_string());

        builder(&hosting)
            .publish_files(
                &Credential::default(),
                &Target::new("acme", "web", "main"),
                "feature",
                &[FileMapping::new(&local, "a.yaml")],
            )
            .await
            .unwrap();

        assert_eq!(hosting.count("get_ref"), 1);
        assert_eq!(hosting.count("create_ref"), 0);
    }

    #[tokio::test]
    async fn test_unreadable_local_file_is_tree_error() {
        let temp = TempDir::new().unwrap();
        let hosting = Arc::new(RecordingHosting::with_branch("main"));

        let err = builder(&hosting)
            .publish_files(
                &Credential::default(),
                &Target::new("acme", "web", "main"),
                "feature",
                &[FileMapping::new(temp.path().join("missing.yaml"), "a.yaml")],
            )
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Tree { .. }));
        assert_eq!(hosting.count("create_tree"), 0);
        assert_eq!(hosting.count("create_commit"), 0);
    }

    #[tokio::test]
    async fn test_binary_local_file_is_tree_error() {
        let temp = TempDir::new().unwrap();
        let local = temp.path().join("logo.png");
        std::fs::write(&local, [0x89, b'P', b'N', b'G', 0xff, 0xfe]).unwrap();
        let hosting = Arc::new(RecordingHosting::with_branch("main"));

        let err = builder(&hosting)
            .publish_files(
                &Credential::default(),
                &Target::new("acme", "web", "main"),
                "feature",
                &[FileMapping::new(&local, "assets/logo.png")],
            )
            .await
            .unwrap_err();

        match err {
            Error::Tree { path, message } => {
                assert!(path.ends_with("logo.png"));
                assert!(message.contains("UTF-8"));
            }
            other => panic!("unexpected error {other:?}"),
        }
        assert_eq!(hosting.count("create_tree"), 0);
        assert_eq!(hosting.count("create_commit"), 0);
    }

    #[tokio::test]
    async fn test_rejected_ref_update_is_update_error() {
        let temp = TempDir::new().unwrap();
        let local = staged(&temp, "a.yaml", "a");
        let hosting = Arc::new(RecordingHosting::with_branch("main").failing_on("update_ref"));

        let err = builder(&hosting)
            .publish_files(
                &Credential::default(),
                &Target::new("acme", "web", "main"),
                "feature",
                &[FileMapping::new(&local, "a.yaml")],
            )
            .await
            .unwrap_err();

        match err {
            Error::Update { reference, .. } => assert_eq!(reference, "refs/heads/feature"),
            other => panic!("expected update error, got {other:?}"),
        }
        assert_eq!(hosting.count("create_commit"), 1);
    }

    #[tokio::test]
    async fn test_commit_failure_is_hosting_error() {
        let temp = TempDir::new().unwrap();
        let local = staged(&temp, "a.yaml", "a");
        let hosting = Arc::new(RecordingHosting::with_branch("main").failing_on("create_commit"));

        let err = builder(&hosting)
            .publish_files(
                &Credential::default(),
                &Target::new("acme", "web", "main"),
                "feature",
                &[FileMapping::new(&local, "a.yaml")],
            )
            .await
            .unwrap_err();

        assert!(matches!(err, Error::HostingApi { .. }));
        assert_eq!(hosting.count("update_ref"), 0);
    }

    #[tokio::test]
    async fn test_empty_mappings_rejected() {
        let hosting = Arc::new(RecordingHosting::with_branch("main"));
        let err = builder(&hosting)
            .publish_files(
                &Credential::default(),
                &Target::new("acme", "web", "main"),
                "feature",
                &[],
            )
            .await
            .unwrap_err();
        assert!(err.is_client_error());
        assert!(hosting.calls().is_empty());
    }

    #[tokio::test]
    async fn test_change_request_commit_message_override() {
        let temp = TempDir::new().unwrap();
        let local = staged(&temp, "a.yaml", "a");
        let hosting = Arc::new(RecordingHosting::with_branch("main"));
        let request = ChangeRequest::new(Target::new("acme", "web", "main"), "feature")
            .with_file(&local, "/a.yaml")
            .with_commit_message("custom message");

        builder(&hosting)
            .publish(&Credential::default(), &request)
            .await
            .unwrap();

        let commits = hosting.new_commits.lock().unwrap();
        assert_eq!(commits[0].message, "custom message");
        assert_eq!(hosting.trees.lock().unwrap()[0].1[0].path, "a.yaml");
    }

    #[test]
    fn test_default_branch_namer() {
        let name = BranchNamer::default().generate();
        assert!(name.starts_with(defaults::BRANCH_PREFIX));
        assert_eq!(
            name.len(),
            defaults::BRANCH_PREFIX.len() + defaults::BRANCH_SUFFIX_LEN
        );
    }

    proptest! {
        #[test]
        fn test_branch_names_have_prefix_and_lowercase_suffix(
            prefix in "[a-z-]{1,20}",
            len in 1usize..16,
        ) {
            let name = BranchNamer::new(prefix.clone(), len).generate();
            prop_assert!(name.starts_with(&prefix));
            let suffix = &name[prefix.len()..];
            prop_assert_eq!(suffix.len(), len);
            prop_assert!(suffix.chars().all(|c| c.is_ascii_lowercase()));
        }
    }
}
