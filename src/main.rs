use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, trace};

use cfn_alias::config::ServiceConfig;
use cfn_alias::deploy::{Deployer, StackAction};
use cfn_alias::orchestrator::{FileOrchestrator, StackOrchestrator};
use cfn_alias::remove::{AliasRemover, RemovalOutcome, StackServiceRemoval};
use cfn_alias::snapshot::SnapshotLoader;
use cfn_alias::template::Template;
use cfn_alias::AliasError;

/// Deploy and remove serverless aliases as separate CloudFormation stacks
#[derive(Parser)]
#[command(name = "cfn-alias")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Enable verbose output (-v for debug, -vv for trace, -vvv for all)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Path to the service configuration
    #[arg(short = 'c', long, default_value = "cfn-alias.yml", global = true)]
    config: PathBuf,

    /// Keep stacks in this directory instead of talking to CloudFormation
    #[arg(long, global = true)]
    state_dir: Option<PathBuf>,

    /// Override the configured stage
    #[arg(short, long, global = true)]
    stage: Option<String>,

    /// Override the configured region
    #[arg(short, long, global = true)]
    region: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Deploy an alias from a compiled stage template
    Deploy {
        /// Compiled stage template (JSON or YAML)
        #[arg(short, long)]
        template: PathBuf,

        /// Custom `Resources`/`Outputs` declared by the service
        #[arg(long)]
        resources: Option<PathBuf>,

        /// Alias to deploy (default: the stage)
        #[arg(short, long)]
        alias: Option<String>,

        /// Only write the alias template
        #[arg(long)]
        no_deploy: bool,
    },
    /// Remove a deployed alias
    Remove {
        #[arg(short, long)]
        alias: String,

        /// Do nothing
        #[arg(long)]
        no_deploy: bool,
    },
    /// Remove the stage alias together with the whole service
    RemoveService,
    /// List deployed aliases
    List,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let log_level = match cli.verbose {
        0 => "info",
        1 => "debug",
        2 => "trace",
        _ => "trace,hyper=debug,aws_smithy_runtime=debug",
    };

    tracing_subscriber::fmt()
        .with_env_filter(log_level)
        .with_writer(std::io::stderr)
        .with_target(cli.verbose >= 2)
        .with_thread_ids(cli.verbose >= 3)
        .with_line_number(cli.verbose >= 3)
        .init();

    debug!("cfn-alias started with verbosity level: {}", cli.verbose);
    trace!("Full CLI args: {:?}", std::env::args().collect::<Vec<_>>());

    if let Err(e) = run(cli).await {
        error!("Fatal error: {}", e);
        eprintln!("Error: {e:#}");
        let code = e
            .downcast_ref::<AliasError>()
            .map_or(1, AliasError::exit_code);
        std::process::exit(code);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let mut config = ServiceConfig::load(&cli.config).await?;
    if let Some(stage) = &cli.stage {
        config.stage = stage.clone();
    }
    if let Some(region) = &cli.region {
        config.region = Some(region.clone());
    }

    match cli.command {
        Commands::Deploy {
            template,
            resources,
            alias,
            no_deploy,
        } => {
            if alias.is_some() {
                config.alias = alias;
            }
            let compiled = read_template(&template).await?;
            let user_resources = match resources {
                Some(path) => read_template(&path).await?,
                None => Template::default(),
            };
            let orchestrator = open_backend(cli.state_dir.as_deref(), &config).await?;
            let outcome = Deployer::new(orchestrator.as_ref(), &config)
                .deploy(compiled, user_resources, no_deploy)
                .await?;
            info!(
                "Stage stack {}, alias stack {}",
                describe(outcome.stage),
                describe(outcome.alias)
            );
            println!(
                "Alias {} of {}: {}",
                config.alias(),
                config.stack_name(),
                describe(outcome.alias)
            );
            println!("Alias template: {}", outcome.alias_template_path.display());
        }
        Commands::Remove { alias, no_deploy } => {
            config.alias = Some(alias);
            let orchestrator = open_backend(cli.state_dir.as_deref(), &config).await?;
            let removal = StackServiceRemoval::new(orchestrator.as_ref(), config.stack_name());
            let outcome = AliasRemover::new(orchestrator.as_ref(), &config, &removal)
                .with_no_deploy(no_deploy)
                .remove_alias()
                .await?;
            if let RemovalOutcome::Alias(changes) = outcome {
                for resource in &changes.removed_resources {
                    debug!("  * {}", resource);
                }
                println!("Removed alias {}", config.alias());
            }
        }
        Commands::RemoveService => {
            config.alias = None;
            let orchestrator = open_backend(cli.state_dir.as_deref(), &config).await?;
            let removal = StackServiceRemoval::new(orchestrator.as_ref(), config.stack_name());
            AliasRemover::new(orchestrator.as_ref(), &config, &removal)
                .remove_service()
                .await?;
            println!("Removed service {}", config.stack_name());
        }
        Commands::List => {
            let orchestrator = open_backend(cli.state_dir.as_deref(), &config).await?;
            let stack_name = config.stack_name();
            let aliases = SnapshotLoader::new(orchestrator.as_ref(), &stack_name)
                .deployed_aliases()
                .await?;
            for alias in aliases {
                println!("{alias}");
            }
        }
    }
    Ok(())
}

fn describe(action: StackAction) -> &'static str {
    match action {
        StackAction::Created => "created",
        StackAction::Updated => "updated",
        StackAction::Unchanged => "unchanged",
        StackAction::Skipped => "skipped",
    }
}

/// Read a template from JSON, or from YAML for any other extension
async fn read_template(path: &Path) -> anyhow::Result<Template> {
    let content = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Cannot read {}", path.display()))?;
    let is_json = path.extension().is_some_and(|ext| ext == "json");
    let value: serde_json::Value = if is_json {
        serde_json::from_str(&content).map_err(AliasError::from)?
    } else {
        serde_yaml::from_str(&content).map_err(AliasError::from)?
    };
    Ok(Template::from_value(value).map_err(AliasError::from)?)
}

async fn open_backend(
    state_dir: Option<&Path>,
    config: &ServiceConfig,
) -> anyhow::Result<Box<dyn StackOrchestrator>> {
    match state_dir {
        Some(dir) => {
            debug!("Using stack state in {}", dir.display());
            let backend = FileOrchestrator::open(dir).await.map_err(AliasError::from)?;
            Ok(Box::new(backend))
        }
        None => cloud_backend(config).await,
    }
}

#[cfg(feature = "aws")]
async fn cloud_backend(config: &ServiceConfig) -> anyhow::Result<Box<dyn StackOrchestrator>> {
    use cfn_alias::orchestrator::CloudFormationOrchestrator;

    let backend =
        CloudFormationOrchestrator::new(config.region.as_deref(), config.poll_interval).await;
    Ok(Box::new(backend))
}

#[cfg(not(feature = "aws"))]
async fn cloud_backend(_config: &ServiceConfig) -> anyhow::Result<Box<dyn StackOrchestrator>> {
    anyhow::bail!("No stack backend available: pass --state-dir or build with the `aws` feature")
}
