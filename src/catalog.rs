//! # Repository Catalog
//!
//! Read-only views over a recursive tree listing: where the charts and
//! manifest directories are, which workflow files exist, and what a
//! composite action declares as inputs.
//!
//! Nothing here touches the workspace cache. Functions that need file
//! contents take a `fetch_blob` closure returning the base64 content of a
//! blob SHA, so they work against any [`HostingClient`](crate::hosting::HostingClient).

use std::future::Future;

use log::warn;
use regex::Regex;
use serde::Serialize;
use serde_yaml::Value;

use crate::error::{Error, Result};
use crate::hosting::TreeEntry;
use crate::render::decode_blob;

/// File name marking a Helm chart root.
pub const CHART_FILE: &str = "Chart.yaml";

const WORKFLOW_PATTERN: &str = r"\.github/workflows/.+\.ya?ml$";
const ACTION_PATTERN: &str = r"(^|/)action\.ya?ml$";

/// A workflow file together with its decoded contents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WorkflowDefinition {
    pub sha: String,
    pub path: String,
    pub contents: String,
}

/// Metadata of a composite or JavaScript action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Action {
    pub name: String,
    pub description: String,
    pub inputs: Vec<ActionInput>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActionInput {
    pub name: String,
    pub description: String,
    pub required: bool,
}

fn is_yaml(path: &str) -> bool {
    path.ends_with(".yaml") || path.ends_with(".yml")
}

/// Entries a user can pick manifests from: chart files, and directories
/// whose path mentions `manifests`.
pub fn manifest_options(listing: &[TreeEntry]) -> Vec<TreeEntry> {
    listing
        .iter()
        .filter(|entry| {
            entry.path.contains(CHART_FILE) || (entry.path.contains("manifests") && entry.is_tree())
        })
        .cloned()
        .collect()
}

/// Workflow files under `.github/workflows/`.
pub fn workflow_files(listing: &[TreeEntry]) -> Result<Vec<TreeEntry>> {
    let pattern = Regex::new(WORKFLOW_PATTERN)?;
    Ok(listing
        .iter()
        .filter(|entry| entry.is_blob() && pattern.is_match(&entry.path))
        .cloned()
        .collect())
}

/// Directory containing the chart whose `Chart.yaml` is at `chart_path`.
///
/// Returns an empty string for a chart at the repository root.
pub fn chart_dir(chart_path: &str) -> &str {
    chart_path.strip_suffix(CHART_FILE).unwrap_or(chart_path)
}

/// Directories belonging to the chart at `chart_path`.
pub fn chart_directories(listing: &[TreeEntry], chart_path: &str) -> Vec<TreeEntry> {
    let dir = chart_dir(chart_path);
    listing
        .iter()
        .filter(|entry| entry.is_tree() && entry.path.contains(dir))
        .cloned()
        .collect()
}

/// Every YAML blob under `.github/`, decoded.
///
/// A fetch failure aborts; a blob that does not decode is skipped.
pub async fn workflow_definitions<F, Fut>(
    listing: &[TreeEntry],
    fetch_blob: F,
) -> Result<Vec<WorkflowDefinition>>
where
    F: Fn(String) -> Fut,
    Fut: Future<Output = Result<String>>,
{
    let mut definitions = Vec::new();
    for entry in listing
        .iter()
        .filter(|e| e.is_blob() && e.path.contains(".github/") && is_yaml(&e.path))
    {
        let content = fetch_blob(entry.sha.clone()).await?;
        match decode_blob(&content) {
            Ok(contents) => definitions.push(WorkflowDefinition {
                sha: entry.sha.clone(),
                path: entry.path.clone(),
                contents,
            }),
            Err(e) => warn!("skipping workflow {}: {}", entry.path, e),
        }
    }
    Ok(definitions)
}

/// Parse the first `action.yml`/`action.yaml` in the listing.
pub async fn action_metadata<F, Fut>(listing: &[TreeEntry], fetch_blob: F) -> Result<Action>
where
    F: Fn(String) -> Fut,
    Fut: Future<Output = Result<String>>,
{
    let pattern = Regex::new(ACTION_PATTERN)?;
    let entry = listing
        .iter()
        .find(|e| e.is_blob() && pattern.is_match(&e.path))
        .ok_or_else(|| Error::invalid("repository has no action.yml"))?;

    let content = fetch_blob(entry.sha.clone()).await?;
    parse_action(&decode_blob(&content)?)
}

#[derive(serde::Deserialize, Default)]
#[serde(default)]
struct ActionFile {
    name: String,
    description: String,
    inputs: serde_yaml::Mapping,
}

/// Parse action metadata. Inputs keep their declaration order.
pub fn parse_action(yaml: &str) -> Result<Action> {
    let file: ActionFile = serde_yaml::from_str(yaml)?;
    let inputs = file
        .inputs
        .iter()
        .filter_map(|(name, input)| {
            let name = name.as_str()?;
            Some(ActionInput {
                name: name.to_string(),
                description: input
                    .get("description")
                    .and_then(scalar_string)
                    .unwrap_or_default(),
                required: input.get("required").is_some_and(parse_required),
            })
        })
        .collect();

    Ok(Action {
        name: file.name,
        description: file.description,
        inputs,
    })
}

fn scalar_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Boolean spellings accepted for `required`. Anything else means false.
fn parse_required(value: &Value) -> bool {
    match scalar_string(value).as_deref() {
        Some("1" | "t" | "T" | "true" | "TRUE" | "True") => true,
        _ => false,
    }
}
