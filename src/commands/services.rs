//! # Services Command
//!
//! Renders the manifests behind a chart or manifests directory and lists the
//! Services they define. The branch is mirrored into the workspace cache
//! first, so the first run for a branch performs a clone.

use anyhow::Result;
use clap::Args;

use chartsmith::publish::Target;

use super::browse::RepoArgs;
use crate::cli::Context;

#[derive(Args, Debug)]
pub struct ServicesArgs {
    #[command(flatten)]
    pub repo: RepoArgs,
    /// Branch to render
    pub branch: String,
    /// Chart.yaml path or manifests directory, as listed by `charts`
    pub option_path: String,
}

pub async fn execute(args: ServicesArgs, ctx: &Context) -> Result<()> {
    let target = Target::new(args.repo.owner, args.repo.repo, args.branch);
    let services = ctx
        .workbench
        .discover_services(&ctx.credential, &target, &args.option_path)
        .await?;

    let text = ctx.output.render(&services, |services| {
        services
            .iter()
            .map(|s| match &s.namespace {
                Some(namespace) => format!("{}/{}", namespace, s.name),
                None => s.name.clone(),
            })
            .collect::<Vec<_>>()
            .join("\n")
    })?;
    if !text.is_empty() {
        println!("{text}");
    }
    Ok(())
}
