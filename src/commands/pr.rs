//! # Pull Request Commands
//!
//! `ingress-pr` and `workflow-pr` read the new file contents from local
//! files, stage them in the workspace mirror of the base branch, and open a
//! pull request from a freshly generated branch.

use std::path::{Path, PathBuf};

use anyhow::{Context as _, Result};
use clap::Args;

use chartsmith::output::emoji;
use chartsmith::publish::Target;
use chartsmith::workbench::{ChangeOutcome, FileChange, IngressChange};

use super::browse::RepoArgs;
use crate::cli::Context;

#[derive(Args, Debug)]
pub struct IngressPrArgs {
    #[command(flatten)]
    pub repo: RepoArgs,
    /// Base branch of the pull request
    pub branch: String,

    /// Local file holding the ingress definition
    #[arg(long, value_name = "FILE")]
    pub definition: PathBuf,

    /// Repository directory to place the ingress file in
    #[arg(long, value_name = "DIR", default_value = "")]
    pub directory: String,

    /// File name in the repository. Defaults to the local file name.
    #[arg(long, value_name = "NAME")]
    pub file_name: Option<String>,

    /// Repository path of a workflow to add alongside the ingress
    #[arg(long, value_name = "PATH", requires = "workflow_file")]
    pub workflow_path: Option<String>,

    /// Local file holding the workflow definition
    #[arg(long, value_name = "FILE", requires = "workflow_path")]
    pub workflow_file: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct WorkflowPrArgs {
    #[command(flatten)]
    pub repo: RepoArgs,
    /// Base branch of the pull request
    pub branch: String,
    /// Repository path of the workflow file
    pub path: String,

    /// Local file holding the workflow definition
    #[arg(long, value_name = "FILE")]
    pub definition: PathBuf,

    /// Propose the workflow as an action addition rather than an update
    #[arg(long)]
    pub action: bool,
}

fn read(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))
}

fn report(ctx: &Context, outcome: &ChangeOutcome) -> Result<()> {
    let text = ctx.output.render(outcome, |o| {
        format!(
            "{} Opened {} from {}",
            emoji(&ctx.output, "✅", "[OK]"),
            ctx.output.label(&o.pull_request_url),
            o.branch
        )
    })?;
    println!("{text}");
    Ok(())
}

pub async fn ingress(args: IngressPrArgs, ctx: &Context) -> Result<()> {
    let file_name = match args.file_name {
        Some(name) => name,
        None => args
            .definition
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .context("--definition has no file name; pass --file-name")?,
    };
    let workflow = match (&args.workflow_path, &args.workflow_file) {
        (Some(path), Some(file)) => Some(FileChange::new(path, read(file)?)),
        _ => None,
    };

    let change = IngressChange {
        target: Target::new(args.repo.owner, args.repo.repo, args.branch),
        definition: read(&args.definition)?,
        directory: args.directory,
        file_name,
        workflow,
    };
    let outcome = ctx
        .workbench
        .create_ingress_pr(&ctx.credential, &change)
        .await?;
    report(ctx, &outcome)
}

pub async fn workflow(args: WorkflowPrArgs, ctx: &Context) -> Result<()> {
    let target = Target::new(args.repo.owner, args.repo.repo, args.branch);
    let change = FileChange::new(args.path, read(&args.definition)?);

    let outcome = if args.action {
        ctx.workbench
            .create_action_pr(&ctx.credential, &target, &change)
            .await?
    } else {
        ctx.workbench
            .update_workflow_pr(&ctx.credential, &target, &change)
            .await?
    };
    report(ctx, &outcome)
}
