//! GitHub REST implementation of [`HostingClient`].

use async_trait::async_trait;
use log::debug;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, USER_AGENT};
use reqwest::{Method, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use super::{
    Blob, Branch, Commit, Credential, HostingClient, NewCommit, NewPullRequest, NewTreeEntry,
    PullRequest, Reference, RepoSlug, Repository, Tree, TreeEntry,
};
use crate::defaults;
use crate::error::{Error, Result};

/// GitHub API client.
#[derive(Debug, Clone)]
pub struct GitHubClient {
    client: reqwest::Client,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct WireOwner {
    login: String,
}

#[derive(Debug, Deserialize)]
struct WireRepository {
    id: u64,
    name: String,
    owner: WireOwner,
    #[serde(default)]
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireSha {
    sha: String,
}

#[derive(Debug, Deserialize)]
struct WireBranch {
    name: String,
    commit: WireSha,
}

#[derive(Debug, Deserialize)]
struct WireTree {
    sha: String,
    #[serde(default)]
    tree: Vec<TreeEntry>,
    #[serde(default)]
    truncated: bool,
}

#[derive(Debug, Deserialize)]
struct WireBlob {
    sha: String,
    #[serde(default)]
    content: String,
}

#[derive(Debug, Deserialize)]
struct WireReference {
    #[serde(rename = "ref")]
    name: String,
    object: WireSha,
}

#[derive(Debug, Deserialize)]
struct WireCommit {
    sha: String,
    tree: WireSha,
    #[serde(default)]
    parents: Vec<WireSha>,
}

#[derive(Debug, Deserialize)]
struct WirePullRequest {
    number: u64,
    html_url: String,
}

#[derive(Debug, Serialize)]
struct CreateRefRequest<'a> {
    #[serde(rename = "ref")]
    name: &'a str,
    sha: &'a str,
}

#[derive(Debug, Serialize)]
struct UpdateRefRequest<'a> {
    sha: &'a str,
    force: bool,
}

#[derive(Debug, Serialize)]
struct CreateTreeEntry<'a> {
    path: &'a str,
    mode: &'a str,
    #[serde(rename = "type")]
    kind: &'static str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct CreateTreeRequest<'a> {
    base_tree: &'a str,
    tree: Vec<CreateTreeEntry<'a>>,
}

#[derive(Debug, Serialize)]
struct CreateCommitAuthor<'a> {
    name: &'a str,
    email: &'a str,
}

#[derive(Debug, Serialize)]
struct CreateCommitRequest<'a> {
    message: &'a str,
    tree: &'a str,
    parents: &'a [String],
    author: CreateCommitAuthor<'a>,
}

#[derive(Debug, Serialize)]
struct CreatePullRequestRequest<'a> {
    title: &'a str,
    head: &'a str,
    base: &'a str,
    body: &'a str,
    maintainer_can_modify: bool,
}

impl From<WireCommit> for Commit {
    fn from(wire: WireCommit) -> Self {
        Commit {
            sha: wire.sha,
            tree_sha: wire.tree.sha,
            parents: wire.parents.into_iter().map(|p| p.sha).collect(),
        }
    }
}

impl From<WireReference> for Reference {
    fn from(wire: WireReference) -> Self {
        Reference {
            name: wire.name,
            sha: wire.object.sha,
        }
    }
}

impl GitHubClient {
    /// Create a client for the public GitHub API.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be created.
    pub fn new() -> Result<Self> {
        Self::with_base_url(defaults::API_BASE_URL)
    }

    /// Create a client for a GitHub-compatible API at `base_url`.
    pub fn with_base_url(base_url: &str) -> Result<Self> {
        url::Url::parse(base_url)?;

        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("application/vnd.github+json"),
        );
        headers.insert(
            "X-GitHub-Api-Version",
            HeaderValue::from_static("2022-11-28"),
        );
        headers.insert(
            USER_AGENT,
            HeaderValue::from_static(concat!("chartsmith/", env!("CARGO_PKG_VERSION"))),
        );

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .build()
            .map_err(|e| Error::hosting("client", e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn request(&self, method: Method, path: &str, credential: &Credential) -> RequestBuilder {
        let url = format!("{}{}", self.base_url, path);
        debug!("{} {}", method, url);
        let builder = self.client.request(method, url);
        if credential.is_empty() {
            builder
        } else {
            builder.header(AUTHORIZATION, format!("Bearer {}", credential.expose()))
        }
    }

    async fn send<T: DeserializeOwned>(&self, operation: &str, request: RequestBuilder) -> Result<T> {
        self.send_optional(operation, request)
            .await?
            .ok_or_else(|| Error::hosting(operation, "404 Not Found"))
    }

    /// Like [`Self::send`] but maps 404 to `Ok(None)`.
    async fn send_optional<T: DeserializeOwned>(
        &self,
        operation: &str,
        request: RequestBuilder,
    ) -> Result<Option<T>> {
        let response = request
            .send()
            .await
            .map_err(|e| Error::hosting(operation, e.to_string()))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::hosting(operation, format!("{status} - {body}")));
        }

        response
            .json()
            .await
            .map(Some)
            .map_err(|e| Error::hosting(operation, format!("failed to parse response: {e}")))
    }
}

/// `refs/heads/x` -> `heads/x`, the form the refs endpoints expect in the path.
fn ref_path(name: &str) -> &str {
    name.strip_prefix("refs/").unwrap_or(name)
}

#[async_trait]
impl HostingClient for GitHubClient {
    async fn list_repositories(
        &self,
        credential: &Credential,
        owner: &str,
    ) -> Result<Vec<Repository>> {
        let path = if owner.is_empty() {
            "/user/repos?per_page=100".to_string()
        } else {
            format!("/users/{owner}/repos?per_page=100")
        };
        let request = self.request(Method::GET, &path, credential);
        let repos: Vec<WireRepository> = self.send("list_repositories", request).await?;

        Ok(repos
            .into_iter()
            .map(|r| Repository {
                id: r.id,
                name: r.name,
                owner: r.owner.login,
                description: r.description.unwrap_or_default(),
            })
            .collect())
    }

    async fn list_branches(&self, credential: &Credential, repo: &RepoSlug) -> Result<Vec<Branch>> {
        let path = format!("/repos/{repo}/branches?per_page=100");
        let request = self.request(Method::GET, &path, credential);
        let branches: Vec<WireBranch> = self.send("list_branches", request).await?;

        Ok(branches
            .into_iter()
            .map(|b| Branch {
                name: b.name,
                sha: b.commit.sha,
            })
            .collect())
    }

    async fn list_tree(
        &self,
        credential: &Credential,
        repo: &RepoSlug,
        tree_ish: &str,
    ) -> Result<Vec<TreeEntry>> {
        let path = format!("/repos/{repo}/git/trees/{tree_ish}?recursive=1");
        let request = self.request(Method::GET, &path, credential);
        let tree: WireTree = self.send("list_tree", request).await?;
        if tree.truncated {
            log::warn!("tree listing for {} ({}) was truncated", repo, tree.sha);
        }
        Ok(tree.tree)
    }

    async fn get_blob(&self, credential: &Credential, repo: &RepoSlug, sha: &str) -> Result<Blob> {
        let path = format!("/repos/{repo}/git/blobs/{sha}");
        let request = self.request(Method::GET, &path, credential);
        let blob: WireBlob = self.send("get_blob", request).await?;
        Ok(Blob {
            sha: blob.sha,
            content: blob.content,
        })
    }

    async fn get_ref(
        &self,
        credential: &Credential,
        repo: &RepoSlug,
        name: &str,
    ) -> Result<Option<Reference>> {
        let path = format!("/repos/{repo}/git/ref/{}", ref_path(name));
        let request = self.request(Method::GET, &path, credential);
        let reference: Option<WireReference> = self.send_optional("get_ref", request).await?;
        Ok(reference.map(Reference::from))
    }

    async fn create_ref(
        &self,
        credential: &Credential,
        repo: &RepoSlug,
        name: &str,
        sha: &str,
    ) -> Result<Reference> {
        let path = format!("/repos/{repo}/git/refs");
        let request = self
            .request(Method::POST, &path, credential)
            .json(&CreateRefRequest { name, sha });
        let reference: WireReference = self.send("create_ref", request).await?;
        Ok(reference.into())
    }

    async fn update_ref(
        &self,
        credential: &Credential,
        repo: &RepoSlug,
        name: &str,
        sha: &str,
        force: bool,
    ) -> Result<Reference> {
        let path = format!("/repos/{repo}/git/refs/{}", ref_path(name));
        let request = self
            .request(Method::PATCH, &path, credential)
            .json(&UpdateRefRequest { sha, force });
        let reference: WireReference = self.send("update_ref", request).await?;
        Ok(reference.into())
    }

    async fn get_commit(&self, credential: &Credential, repo: &RepoSlug, sha: &str) -> Result<Commit> {
        let path = format!("/repos/{repo}/git/commits/{sha}");
        let request = self.request(Method::GET, &path, credential);
        let commit: WireCommit = self.send("get_commit", request).await?;
        Ok(commit.into())
    }

    async fn create_tree(
        &self,
        credential: &Credential,
        repo: &RepoSlug,
        base_tree: &str,
        entries: &[NewTreeEntry],
    ) -> Result<Tree> {
        let path = format!("/repos/{repo}/git/trees");
        let body = CreateTreeRequest {
            base_tree,
            tree: entries
                .iter()
                .map(|e| CreateTreeEntry {
                    path: &e.path,
                    mode: &e.mode,
                    kind: "blob",
                    content: &e.content,
                })
                .collect(),
        };
        let request = self.request(Method::POST, &path, credential).json(&body);
        let tree: WireTree = self.send("create_tree", request).await?;
        Ok(Tree { sha: tree.sha })
    }

    async fn create_commit(
        &self,
        credential: &Credential,
        repo: &RepoSlug,
        commit: &NewCommit,
    ) -> Result<Commit> {
        let path = format!("/repos/{repo}/git/commits");
        let body = CreateCommitRequest {
            message: &commit.message,
            tree: &commit.tree_sha,
            parents: &commit.parents,
            author: CreateCommitAuthor {
                name: &commit.author.name,
                email: &commit.author.email,
            },
        };
        let request = self.request(Method::POST, &path, credential).json(&body);
        let created: WireCommit = self.send("create_commit", request).await?;
        Ok(created.into())
    }

    async fn create_pull_request(
        &self,
        credential: &Credential,
        repo: &RepoSlug,
        pull_request: &NewPullRequest,
    ) -> Result<PullRequest> {
        let path = format!("/repos/{repo}/pulls");
        let body = CreatePullRequestRequest {
            title: &pull_request.title,
            head: &pull_request.head,
            base: &pull_request.base,
            body: &pull_request.body,
            maintainer_can_modify: pull_request.maintainer_can_modify,
        };
        let request = self.request(Method::POST, &path, credential).json(&body);
        let created: WirePullRequest = self.send("create_pull_request", request).await?;
        Ok(PullRequest {
            number: created.number,
            html_url: created.html_url,
        })
    }
}
