//! # Browse Commands
//!
//! Read-only subcommands that inspect a repository through the hosting API:
//! `repos`, `branches`, `charts`, `chart-dirs`, `workflows`, `show` and
//! `action`. None of them touch the workspace cache.

use anyhow::Result;
use clap::Args;

use chartsmith::hosting::TreeEntry;
use chartsmith::output::OutputConfig;

use crate::cli::Context;

/// Owner and repository name.
#[derive(Args, Debug, Clone)]
pub struct RepoArgs {
    /// Repository owner (user or organisation)
    pub owner: String,
    /// Repository name
    pub repo: String,
}

#[derive(Args, Debug)]
pub struct ReposArgs {
    /// User or organisation whose repositories to list
    pub owner: String,
}

#[derive(Args, Debug)]
pub struct BranchesArgs {
    #[command(flatten)]
    pub repo: RepoArgs,
}

#[derive(Args, Debug)]
pub struct ChartsArgs {
    #[command(flatten)]
    pub repo: RepoArgs,
    /// Branch to inspect
    pub branch: String,
}

#[derive(Args, Debug)]
pub struct ChartDirsArgs {
    #[command(flatten)]
    pub repo: RepoArgs,
    /// Branch name or tree SHA
    pub tree: String,
    /// Path of the chart's Chart.yaml
    pub chart_path: String,
}

#[derive(Args, Debug)]
pub struct WorkflowsArgs {
    #[command(flatten)]
    pub repo: RepoArgs,
    /// Branch name or tree SHA
    pub tree: String,
    /// Include every YAML file under .github/ with its decoded contents
    #[arg(long)]
    pub contents: bool,
}

#[derive(Args, Debug)]
pub struct ShowArgs {
    #[command(flatten)]
    pub repo: RepoArgs,
    /// Blob SHA
    pub sha: String,
}

#[derive(Args, Debug)]
pub struct ActionArgs {
    #[command(flatten)]
    pub repo: RepoArgs,
    /// Branch to inspect
    pub branch: String,
}

fn entry_lines(output: &OutputConfig, entries: &[TreeEntry]) -> String {
    entries
        .iter()
        .map(|entry| format!("{}  {}", output.dim(&entry.sha), entry.path))
        .collect::<Vec<_>>()
        .join("\n")
}

fn print(text: String) {
    if !text.is_empty() {
        println!("{text}");
    }
}

pub async fn repos(args: ReposArgs, ctx: &Context) -> Result<()> {
    let repos = ctx
        .workbench
        .list_repositories(&ctx.credential, &args.owner)
        .await?;
    print(ctx.output.render(&repos, |repos| {
        repos
            .iter()
            .map(|r| {
                if r.description.is_empty() {
                    format!("{}/{}", r.owner, ctx.output.label(&r.name))
                } else {
                    format!("{}/{}  {}", r.owner, ctx.output.label(&r.name), r.description)
                }
            })
            .collect::<Vec<_>>()
            .join("\n")
    })?);
    Ok(())
}

pub async fn branches(args: BranchesArgs, ctx: &Context) -> Result<()> {
    let branches = ctx
        .workbench
        .list_branches(&ctx.credential, &args.repo.owner, &args.repo.repo)
        .await?;
    print(ctx.output.render(&branches, |branches| {
        branches
            .iter()
            .map(|b| format!("{}  {}", ctx.output.dim(&b.sha), b.name))
            .collect::<Vec<_>>()
            .join("\n")
    })?);
    Ok(())
}

pub async fn charts(args: ChartsArgs, ctx: &Context) -> Result<()> {
    let options = ctx
        .workbench
        .manifest_options(&ctx.credential, &args.repo.owner, &args.repo.repo, &args.branch)
        .await?;
    print(ctx.output.render(&options, |o| entry_lines(&ctx.output, o))?);
    Ok(())
}

pub async fn chart_dirs(args: ChartDirsArgs, ctx: &Context) -> Result<()> {
    let dirs = ctx
        .workbench
        .chart_directories(
            &ctx.credential,
            &args.repo.owner,
            &args.repo.repo,
            &args.tree,
            &args.chart_path,
        )
        .await?;
    print(ctx.output.render(&dirs, |d| entry_lines(&ctx.output, d))?);
    Ok(())
}

pub async fn workflows(args: WorkflowsArgs, ctx: &Context) -> Result<()> {
    let (owner, repo) = (&args.repo.owner, &args.repo.repo);
    if args.contents {
        let definitions = ctx
            .workbench
            .workflow_definitions(&ctx.credential, owner, repo, &args.tree)
            .await?;
        print(ctx.output.render(&definitions, |definitions| {
            definitions
                .iter()
                .map(|d| format!("{}\n{}", ctx.output.label(&format!("# {}", d.path)), d.contents))
                .collect::<Vec<_>>()
                .join("\n")
        })?);
    } else {
        let files = ctx
            .workbench
            .workflow_files(&ctx.credential, owner, repo, &args.tree)
            .await?;
        print(ctx.output.render(&files, |f| entry_lines(&ctx.output, f))?);
    }
    Ok(())
}

pub async fn show(args: ShowArgs, ctx: &Context) -> Result<()> {
    let contents = ctx
        .workbench
        .workflow_contents(&ctx.credential, &args.repo.owner, &args.repo.repo, &args.sha)
        .await?;
    if ctx.output.json {
        println!("{}", serde_json::json!({ "contents": contents }));
    } else {
        print!("{contents}");
    }
    Ok(())
}

pub async fn action(args: ActionArgs, ctx: &Context) -> Result<()> {
    let action = ctx
        .workbench
        .action_metadata(&ctx.credential, &args.repo.owner, &args.repo.repo, &args.branch)
        .await?;
    print(ctx.output.render(&action, |action| {
        let mut lines = vec![ctx.output.label(&action.name)];
        if !action.description.is_empty() {
            lines.push(action.description.clone());
        }
        for input in &action.inputs {
            let marker = if input.required { " (required)" } else { "" };
            lines.push(format!("  {}{}  {}", input.name, marker, input.description));
        }
        lines.join("\n")
    })?);
    Ok(())
}
