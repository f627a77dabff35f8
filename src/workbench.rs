//! # Workbench
//!
//! Wires the workspace cache, renderer, tree/commit builder and pull request
//! publisher together and exposes the operations a front end needs:
//! repository browsing, service discovery and the change flows that end in a
//! pull request.
//!
//! Every change flow follows the same shape: ensure the workspace mirror,
//! lease it, write the new files into it, generate a branch name, publish the
//! files and open the pull request. The lease is held from the first write
//! until the pull request is open, so concurrent flows against one workspace
//! take turns and the sweep cannot remove files that are still being
//! published. The credential is supplied per call and never stored.

use std::path::Path;
use std::sync::Arc;

use log::{debug, info};
use serde::Serialize;

use crate::cache::{WorkspaceCache, WorkspaceId, WorkspaceLease};
use crate::catalog::{self, Action, WorkflowDefinition, CHART_FILE};
use crate::config::{CommitIdentity, Settings};
use crate::error::{Error, Result};
use crate::git::GitCli;
use crate::hosting::github::GitHubClient;
use crate::hosting::{Branch, Credential, HostingClient, RepoSlug, Repository, TreeEntry};
use crate::manifest::{extract_by_kind, NamedObject};
use crate::publish::{BranchNamer, ChangeRequest, Publication, Target, TreeCommitBuilder};
use crate::pull_request::PullRequestPublisher;
use crate::render::{decode_blob, render_from_static_tree, HelmCli, ManifestRenderer, Templater};

pub const INGRESS_PR_TITLE: &str = "Ingress Addition";
pub const INGRESS_PR_BODY: &str = "Adding ingress definition";
pub const INGRESS_WITH_WORKFLOW_PR_BODY: &str =
    "Adding ingress definition and deployment to workflow";
pub const WORKFLOW_PR_TITLE: &str = "Updating Workflow";
pub const ACTION_PR_TITLE: &str = "Action Workflow Addition";
pub const ACTION_PR_BODY: &str = "Adding action to workflow";

/// A file to add or replace, given by its repository path and contents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileChange {
    pub path: String,
    pub contents: String,
}

impl FileChange {
    pub fn new(path: impl Into<String>, contents: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            contents: contents.into(),
        }
    }
}

/// Request to add an ingress definition, optionally with a workflow change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngressChange {
    pub target: Target,
    pub definition: String,
    /// Repository directory the ingress file is committed to.
    pub directory: String,
    pub file_name: String,
    pub workflow: Option<FileChange>,
}

/// Result of a change flow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChangeOutcome {
    pub branch: String,
    pub pull_request_url: String,
    pub commit: String,
}

#[derive(Clone)]
pub struct Workbench {
    cache: Arc<WorkspaceCache>,
    hosting: Arc<dyn HostingClient>,
    renderer: ManifestRenderer,
    builder: TreeCommitBuilder,
    publisher: PullRequestPublisher,
    namer: BranchNamer,
}

impl Workbench {
    pub fn new(
        cache: Arc<WorkspaceCache>,
        hosting: Arc<dyn HostingClient>,
        templater: Arc<dyn Templater>,
        identity: CommitIdentity,
        namer: BranchNamer,
    ) -> Self {
        Self {
            cache,
            renderer: ManifestRenderer::new(templater),
            builder: TreeCommitBuilder::new(hosting.clone(), identity),
            publisher: PullRequestPublisher::new(hosting.clone()),
            hosting,
            namer,
        }
    }

    /// Build a workbench backed by the system `git`/`helm` binaries and the
    /// GitHub API, as configured by `settings`.
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let git = Arc::new(GitCli::new(&settings.git_binary));
        let cache = WorkspaceCache::new(settings.workspace_root(), git)?
            .with_idle_threshold(settings.idle_threshold())
            .with_clone_host(&settings.clone_host);
        let hosting = Arc::new(GitHubClient::with_base_url(&settings.api_base_url)?);
        let templater = Arc::new(HelmCli::new(&settings.helm_binary));

        Ok(Self::new(
            Arc::new(cache),
            hosting,
            templater,
            settings.commit.clone(),
            BranchNamer::new(&settings.branch_prefix, settings.branch_suffix_len),
        ))
    }

    pub fn cache(&self) -> &Arc<WorkspaceCache> {
        &self.cache
    }

    pub async fn list_repositories(
        &self,
        credential: &Credential,
        owner: &str,
    ) -> Result<Vec<Repository>> {
        self.hosting.list_repositories(credential, owner).await
    }

    pub async fn list_branches(
        &self,
        credential: &Credential,
        owner: &str,
        repo: &str,
    ) -> Result<Vec<Branch>> {
        self.hosting
            .list_branches(credential, &RepoSlug::new(owner, repo))
            .await
    }

    async fn listing(
        &self,
        credential: &Credential,
        repo: &RepoSlug,
        tree_ish: &str,
    ) -> Result<Vec<TreeEntry>> {
        if tree_ish.is_empty() {
            return Err(Error::invalid("branch or tree SHA must not be empty"));
        }
        self.hosting.list_tree(credential, repo, tree_ish).await
    }

    /// Charts and manifest directories on `branch`.
    pub async fn manifest_options(
        &self,
        credential: &Credential,
        owner: &str,
        repo: &str,
        branch: &str,
    ) -> Result<Vec<TreeEntry>> {
        let repo = RepoSlug::new(owner, repo);
        let listing = self.listing(credential, &repo, branch).await?;
        Ok(catalog::manifest_options(&listing))
    }

    pub async fn workflow_files(
        &self,
        credential: &Credential,
        owner: &str,
        repo: &str,
        branch: &str,
    ) -> Result<Vec<TreeEntry>> {
        let repo = RepoSlug::new(owner, repo);
        let listing = self.listing(credential, &repo, branch).await?;
        catalog::workflow_files(&listing)
    }

    pub async fn workflow_definitions(
        &self,
        credential: &Credential,
        owner: &str,
        repo: &str,
        tree_ish: &str,
    ) -> Result<Vec<WorkflowDefinition>> {
        let repo = RepoSlug::new(owner, repo);
        let listing = self.listing(credential, &repo, tree_ish).await?;
        let (hosting, repo) = (self.hosting.as_ref(), &repo);
        catalog::workflow_definitions(&listing, |sha| async move {
            hosting
                .get_blob(credential, repo, &sha)
                .await
                .map(|blob| blob.content)
        })
        .await
    }

    pub async fn chart_directories(
        &self,
        credential: &Credential,
        owner: &str,
        repo: &str,
        tree_ish: &str,
        chart_path: &str,
    ) -> Result<Vec<TreeEntry>> {
        let repo = RepoSlug::new(owner, repo);
        let listing = self.listing(credential, &repo, tree_ish).await?;
        Ok(catalog::chart_directories(&listing, chart_path))
    }

    pub async fn action_metadata(
        &self,
        credential: &Credential,
        owner: &str,
        repo: &str,
        branch: &str,
    ) -> Result<Action> {
        let repo = RepoSlug::new(owner, repo);
        let listing = self.listing(credential, &repo, branch).await?;
        let (hosting, repo) = (self.hosting.as_ref(), &repo);
        catalog::action_metadata(&listing, |sha| async move {
            hosting
                .get_blob(credential, repo, &sha)
                .await
                .map(|blob| blob.content)
        })
        .await
    }

    /// Decoded text of the blob `sha`.
    pub async fn workflow_contents(
        &self,
        credential: &Credential,
        owner: &str,
        repo: &str,
        sha: &str,
    ) -> Result<String> {
        let blob = self
            .hosting
            .get_blob(credential, &RepoSlug::new(owner, repo), sha)
            .await?;
        decode_blob(&blob.content)
    }

    /// Render the manifests behind `option_path` and return their Services.
    ///
    /// A path containing `Chart.yaml` is rendered with the templating tool,
    /// using the repository name as release name. A path containing
    /// `manifests` collects every static manifest on the branch.
    pub async fn discover_services(
        &self,
        credential: &Credential,
        target: &Target,
        option_path: &str,
    ) -> Result<Vec<NamedObject>> {
        let documents = if option_path.contains(CHART_FILE) {
            let entry = self.ensure_mirror(credential, target).await?;
            self.renderer
                .render_from_chart(
                    &self.cache,
                    &entry,
                    catalog::chart_dir(option_path),
                    &target.repo,
                )
                .await?
        } else if option_path.contains("manifests") {
            let entry = self.ensure_mirror(credential, target).await?;
            let repo = target.slug();
            let listing = self.listing(credential, &repo, &target.base_branch).await?;
            let (hosting, repo) = (self.hosting.as_ref(), &repo);
            let documents = render_from_static_tree(&listing, |sha| async move {
                hosting
                    .get_blob(credential, repo, &sha)
                    .await
                    .map(|blob| blob.content)
            })
            .await?;

            let mut lease = self.cache.lease(&entry).await?;
            lease.touch();
            lease.manifest = Some(documents.join("---\n"));
            documents
        } else {
            return Err(Error::invalid(format!(
                "{option_path} is neither a chart nor a manifests directory"
            )));
        };

        let services = extract_by_kind(&documents, "Service");
        info!(
            "found {} services in {} documents for {}/{}",
            services.len(),
            documents.len(),
            target.owner,
            target.repo
        );
        Ok(services)
    }

    async fn ensure_mirror(&self, credential: &Credential, target: &Target) -> Result<WorkspaceId> {
        let entry = self
            .cache
            .ensure_local_mirror(credential, &target.owner, &target.repo, &target.base_branch)
            .await?;
        Ok(entry.id)
    }

    /// Publish a prepared [`ChangeRequest`] and open its pull request.
    ///
    /// Every local file must already exist inside the target's workspace. The
    /// workspace is leased for the whole publication.
    pub async fn submit(
        &self,
        credential: &Credential,
        request: &ChangeRequest,
    ) -> Result<ChangeOutcome> {
        validate_request(request)?;
        let target = &request.target;
        let id = WorkspaceId::new(&target.owner, &target.repo, &target.base_branch);
        let mut lease = self.cache.lease(&id).await?;
        self.publish_leased(credential, request, &mut lease).await
    }

    async fn publish_leased(
        &self,
        credential: &Credential,
        request: &ChangeRequest,
        lease: &mut WorkspaceLease,
    ) -> Result<ChangeOutcome> {
        for file in &request.files {
            ensure_staged(&lease.path, &file.local).await?;
        }

        let target = &request.target;
        let Publication { commit, .. } = self.builder.publish(credential, request).await?;
        let url = self
            .publisher
            .open(
                credential,
                target,
                &target.owner,
                &request.branch,
                &request.title,
                &request.body,
            )
            .await?;
        lease.touch();

        Ok(ChangeOutcome {
            branch: request.branch.clone(),
            pull_request_url: url,
            commit: commit.sha,
        })
    }

    /// Add an ingress definition (and optionally a workflow) in a new PR.
    pub async fn create_ingress_pr(
        &self,
        credential: &Credential,
        change: &IngressChange,
    ) -> Result<ChangeOutcome> {
        if change.file_name.trim().is_empty() {
            return Err(Error::invalid("ingress file name must not be empty"));
        }
        if change.definition.trim().is_empty() {
            return Err(Error::invalid("ingress definition must not be empty"));
        }
        if let Some(workflow) = &change.workflow {
            validate_file_change(workflow)?;
        }

        let id = self.ensure_mirror(credential, &change.target).await?;
        let mut lease = self.cache.lease(&id).await?;
        let local = lease
            .write_file(&change.file_name, change.definition.as_bytes())
            .await?;
        let mut request = ChangeRequest::new(change.target.clone(), self.namer.generate())
            .with_file(local, join_remote(&change.directory, &change.file_name))
            .with_title(INGRESS_PR_TITLE)
            .with_body(INGRESS_PR_BODY);

        if let Some(workflow) = &change.workflow {
            let local = lease
                .write_file(&workflow.path, workflow.contents.as_bytes())
                .await?;
            request = request
                .with_file(local, workflow.path.as_str())
                .with_body(INGRESS_WITH_WORKFLOW_PR_BODY);
        }

        self.publish_leased(credential, &request, &mut lease).await
    }

    /// Replace a workflow file in a new PR.
    pub async fn update_workflow_pr(
        &self,
        credential: &Credential,
        target: &Target,
        workflow: &FileChange,
    ) -> Result<ChangeOutcome> {
        self.workflow_change(credential, target, workflow, WORKFLOW_PR_TITLE, WORKFLOW_PR_TITLE)
            .await
    }

    /// Add a workflow that uses the repository's action, in a new PR.
    pub async fn create_action_pr(
        &self,
        credential: &Credential,
        target: &Target,
        workflow: &FileChange,
    ) -> Result<ChangeOutcome> {
        self.workflow_change(credential, target, workflow, ACTION_PR_TITLE, ACTION_PR_BODY)
            .await
    }

    async fn workflow_change(
        &self,
        credential: &Credential,
        target: &Target,
        workflow: &FileChange,
        title: &str,
        body: &str,
    ) -> Result<ChangeOutcome> {
        validate_file_change(workflow)?;

        let id = self.ensure_mirror(credential, target).await?;
        let mut lease = self.cache.lease(&id).await?;
        let local = lease
            .write_file(&workflow.path, workflow.contents.as_bytes())
            .await?;
        let request = ChangeRequest::new(target.clone(), self.namer.generate())
            .with_file(local, workflow.path.as_str())
            .with_title(title)
            .with_body(body);

        self.publish_leased(credential, &request, &mut lease).await
    }
}

fn validate_request(request: &ChangeRequest) -> Result<()> {
    if request.title.trim().is_empty() {
        return Err(Error::invalid("pull request title must not be empty"));
    }
    if request.files.is_empty() {
        return Err(Error::invalid("change request has no files"));
    }
    Ok(())
}

fn validate_file_change(change: &FileChange) -> Result<()> {
    if change.path.trim().is_empty() || change.contents.trim().is_empty() {
        return Err(Error::invalid(
            "missing workflow file path or workflow definition",
        ));
    }
    Ok(())
}

fn join_remote(directory: &str, file_name: &str) -> String {
    let directory = directory.trim_matches('/');
    if directory.is_empty() {
        file_name.to_string()
    } else {
        format!("{directory}/{file_name}")
    }
}

async fn ensure_staged(workspace: &Path, local: &Path) -> Result<()> {
    if !local.starts_with(workspace) {
        return Err(Error::invalid(format!(
            "{} is outside the workspace",
            local.display()
        )));
    }
    match tokio::fs::metadata(local).await {
        Ok(metadata) if metadata.is_file() => {
            debug!("staged {}", local.display());
            Ok(())
        }
        _ => Err(Error::invalid(format!(
            "{} has not been written to the workspace",
            local.display()
        ))),
    }
}
