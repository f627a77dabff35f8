//! CLI argument parsing and command dispatch

use std::future::Future;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{anyhow, Context as _, Result};
use clap::{Parser, Subcommand};
use log::{debug, warn};
use tokio_util::sync::CancellationToken;

use chartsmith::config::{self, Settings};
use chartsmith::hosting::Credential;
use chartsmith::output::OutputConfig;
use chartsmith::workbench::Workbench;

use crate::commands;

/// Chartsmith - render Helm charts and propose ingress changes as pull requests
#[derive(Parser, Debug)]
#[command(name = "chartsmith")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    command: Commands,

    /// Path to a YAML settings file
    #[arg(long, global = true, value_name = "FILE", env = "CHARTSMITH_CONFIG")]
    config: Option<PathBuf>,

    /// Access token for the hosting service
    #[arg(long, global = true, value_name = "TOKEN", env = "CHARTSMITH_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// Directory holding workspace mirrors
    #[arg(long, global = true, value_name = "DIR", env = "CHARTSMITH_WORKSPACE")]
    workspace_root: Option<PathBuf>,

    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Colorize output (always, never, auto)
    #[arg(long, global = true, value_name = "WHEN", default_value = "auto")]
    color: String,

    /// Set log level (error, warn, info, debug, trace)
    #[arg(long, global = true, value_name = "LEVEL", default_value = "warn")]
    log_level: String,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List repositories of an owner
    Repos(commands::browse::ReposArgs),
    /// List branches of a repository
    Branches(commands::browse::BranchesArgs),
    /// List charts and manifest directories on a branch
    Charts(commands::browse::ChartsArgs),
    /// List the directories of a chart
    ChartDirs(commands::browse::ChartDirsArgs),
    /// List workflow files on a branch
    Workflows(commands::browse::WorkflowsArgs),
    /// Print the decoded contents of a blob
    Show(commands::browse::ShowArgs),
    /// Show the inputs declared by the repository's action.yml
    Action(commands::browse::ActionArgs),
    /// Render manifests and list the Services they define
    Services(commands::services::ServicesArgs),
    /// Open a pull request adding an ingress definition
    IngressPr(commands::pr::IngressPrArgs),
    /// Open a pull request replacing or adding a workflow file
    WorkflowPr(commands::pr::WorkflowPrArgs),
    /// Generate shell completion scripts
    Completions(commands::completions::CompletionsArgs),
}

/// Shared state handed to every command.
pub struct Context {
    pub settings: Settings,
    pub credential: Credential,
    pub workbench: Workbench,
    pub output: OutputConfig,
}

impl Cli {
    /// Execute the CLI command
    pub async fn execute(self) -> Result<()> {
        init_logging(&self.log_level);

        if let Commands::Completions(args) = &self.command {
            return commands::completions::execute(args);
        }

        let settings = self.settings()?;
        let output = OutputConfig::from_env_and_flag(&self.color, self.json);
        let workbench = Workbench::from_settings(&settings)
            .context("failed to initialise the workbench")?;
        let ctx = Context {
            credential: settings.access_token.clone(),
            settings,
            workbench,
            output,
        };

        let cache = ctx.workbench.cache();
        if let Err(e) = cache.prune_orphans().await {
            warn!("failed to prune workspaces under {}: {}", cache.root().display(), e);
        }

        let shutdown = CancellationToken::new();
        let sweeper = cache.spawn_sweeper(ctx.settings.sweep_interval(), shutdown.clone());

        let grace = ctx.settings.shutdown_grace();
        let result = run_until_interrupted(dispatch(self.command, &ctx), grace).await;

        shutdown.cancel();
        if let Err(e) = sweeper.await {
            debug!("sweeper task ended abnormally: {}", e);
        }
        // Nothing is reused across runs, so leave no mirrors behind.
        cache.clear().await;
        result
    }

    /// Resolve settings: flag > environment > file > default.
    fn settings(&self) -> Result<Settings> {
        let mut settings = match &self.config {
            Some(path) => config::from_file(path)
                .with_context(|| format!("failed to load settings from {}", path.display()))?,
            None => Settings::default(),
        };
        if let Some(token) = &self.token {
            settings.access_token = Credential::new(token);
        }
        if let Some(root) = &self.workspace_root {
            settings.workspace_root = Some(root.clone());
        }
        settings.validate()?;
        Ok(settings)
    }
}

async fn dispatch(command: Commands, ctx: &Context) -> Result<()> {
    match command {
        Commands::Repos(args) => commands::browse::repos(args, ctx).await,
        Commands::Branches(args) => commands::browse::branches(args, ctx).await,
        Commands::Charts(args) => commands::browse::charts(args, ctx).await,
        Commands::ChartDirs(args) => commands::browse::chart_dirs(args, ctx).await,
        Commands::Workflows(args) => commands::browse::workflows(args, ctx).await,
        Commands::Show(args) => commands::browse::show(args, ctx).await,
        Commands::Action(args) => commands::browse::action(args, ctx).await,
        Commands::Services(args) => commands::services::execute(args, ctx).await,
        Commands::IngressPr(args) => commands::pr::ingress(args, ctx).await,
        Commands::WorkflowPr(args) => commands::pr::workflow(args, ctx).await,
        Commands::Completions(_) => Ok(()),
    }
}

/// Run `command`; on Ctrl-C give it `grace` to finish before giving up.
async fn run_until_interrupted<F>(command: F, grace: Duration) -> Result<()>
where
    F: Future<Output = Result<()>>,
{
    tokio::pin!(command);
    tokio::select! {
        result = &mut command => result,
        _ = tokio::signal::ctrl_c() => {
            warn!("interrupted, waiting up to {:?} for the running command", grace);
            match tokio::time::timeout(grace, command).await {
                Ok(result) => result.and(Err(anyhow!("interrupted"))),
                Err(_) => Err(anyhow!("interrupted: command did not finish within {:?}", grace)),
            }
        }
    }
}

fn init_logging(level: &str) {
    let env = env_logger::Env::default().default_filter_or(level);
    // A second initialisation only happens in tests.
    let _ = env_logger::Builder::from_env(env)
        .format_timestamp(None)
        .try_init();
}
