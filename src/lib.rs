//! # Chartsmith Library
//!
//! Browse a hosted repository's charts and workflows, render its Kubernetes
//! manifests, and propose ingress or workflow changes as pull requests.
//!
//! ## Quick Example
//!
//! ```
//! use chartsmith::manifest::{extract_by_kind, split_documents};
//!
//! let rendered = "---\napiVersion: v1\nkind: Service\nmetadata:\n  name: web\n---\napiVersion: apps/v1\nkind: Deployment\nmetadata:\n  name: web\n";
//! let documents = split_documents(rendered);
//! assert_eq!(documents.len(), 2);
//!
//! let services = extract_by_kind(&documents, "Service");
//! assert_eq!(services[0].name, "web");
//! ```
//!
//! ## Core Concepts
//!
//! - **Workspace cache (`cache`)**: on-disk mirrors of `(owner, repo, branch)`
//!   cloned on first use through a [`git::GitRunner`], shared safely between
//!   concurrent callers and evicted by a background sweep once idle.
//! - **Rendering (`render`, `manifest`)**: runs the templating tool against a
//!   chart in a workspace, or collects static manifests from the remote tree,
//!   then extracts typed Kubernetes objects by kind.
//! - **Publishing (`publish`, `pull_request`)**: stages workspace files into a
//!   new remote tree and commit on a fresh branch, then opens a pull request.
//! - **Hosting (`hosting`)**: the [`hosting::HostingClient`] capability and its
//!   GitHub REST implementation.
//! - **Workbench (`workbench`)**: wires everything together into the browse,
//!   discovery and change-flow operations used by the CLI.
//!
//! ## Change Flow
//!
//! 1.  **Mirror**: ensure the base branch is cloned into the workspace cache.
//! 2.  **Stage**: write the new files into the workspace.
//! 3.  **Reference**: reuse or create the new branch from the base tip.
//! 4.  **Tree and commit**: upload the staged files as one tree and commit it.
//! 5.  **Pull request**: open the PR and return its URL.
//!
//! A failure at any step is returned as-is; nothing is rolled back.

pub mod cache;
pub mod catalog;
pub mod config;
pub mod defaults;
pub mod error;
pub mod git;
pub mod hosting;
pub mod manifest;
pub mod output;
pub mod publish;
pub mod pull_request;
pub mod render;
pub mod workbench;

#[cfg(test)]
mod testing;
