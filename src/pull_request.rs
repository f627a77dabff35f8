//! Opens pull requests from a published branch back to its base.

use std::sync::Arc;

use log::info;

use crate::error::{Error, Result};
use crate::hosting::{Credential, HostingClient, NewPullRequest};
use crate::publish::Target;

#[derive(Clone)]
pub struct PullRequestPublisher {
    hosting: Arc<dyn HostingClient>,
}

impl PullRequestPublisher {
    pub fn new(hosting: Arc<dyn HostingClient>) -> Self {
        Self { hosting }
    }

    /// Open a pull request merging `branch` of `head_owner` into
    /// `target.base_branch` and return its URL.
    ///
    /// The head is qualified as `head_owner:branch` when `head_owner` is not
    /// the target owner.
    pub async fn open(
        &self,
        credential: &Credential,
        target: &Target,
        head_owner: &str,
        branch: &str,
        title: &str,
        body: &str,
    ) -> Result<String> {
        if title.trim().is_empty() {
            return Err(Error::invalid("pull request title must not be empty"));
        }
        if branch.is_empty() {
            return Err(Error::invalid("pull request head branch must not be empty"));
        }

        let repo = target.slug();
        let request = NewPullRequest {
            title: title.to_string(),
            head: head_ref(&target.owner, head_owner, branch),
            base: target.base_branch.clone(),
            body: body.to_string(),
            maintainer_can_modify: true,
        };

        let pull_request = self
            .hosting
            .create_pull_request(credential, &repo, &request)
            .await?;
        info!(
            "opened pull request #{} {} -> {} on {}",
            pull_request.number, request.head, request.base, repo
        );
        Ok(pull_request.html_url)
    }
}

fn head_ref(target_owner: &str, head_owner: &str, branch: &str) -> String {
    if head_owner.is_empty() || head_owner == target_owner {
        branch.to_string()
    } else {
        format!("{head_owner}:{branch}")
    }
}
