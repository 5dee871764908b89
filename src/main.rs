use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use colored::*;
use eyre::{Context, Result};
use log::info;

use agentr::config::Config;
use agentr::llm::OpenAiProvider;
use agentr::runner::{AgentRunner, AutoContinue, ConsoleIntervention, LogTraceSink, RunStatus};
use agentr::tools::{ToolContext, ToolRegistry};

#[derive(Parser)]
#[command(name = "agentr", about = "Autonomous task-execution agent", version)]
struct Cli {
    /// Path to a config file (defaults to .agentr.yml, then user config)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a task to completion
    Run {
        /// The task description
        task: Vec<String>,

        /// Working directory for tool execution
        #[arg(short, long)]
        workdir: Option<PathBuf>,

        /// Skip the planning phase
        #[arg(long)]
        unplanned: bool,

        /// Never pause for intervention (headless)
        #[arg(long)]
        auto: bool,
    },

    /// List the registered tools
    Tools,

    /// Print the effective configuration
    Config,
}

fn setup_logging() {
    env_logger::Builder::from_default_env().init();
}

#[tokio::main]
async fn main() -> Result<()> {
    setup_logging();

    let cli = Cli::parse();
    let mut config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;
    config.validate().context("Invalid configuration")?;

    match cli.command {
        Commands::Run {
            task,
            workdir,
            unplanned,
            auto,
        } => {
            let task = task.join(" ");
            if task.trim().is_empty() {
                eyre::bail!("no task given");
            }
            if unplanned {
                config.agent.planning_enabled = false;
            }
            run_task(&task, config, workdir, auto).await
        }
        Commands::Tools => {
            let registry = build_registry(&config, None)?;
            for (name, description, _) in registry.catalog() {
                println!("{}  {}", name.bold(), description);
            }
            Ok(())
        }
        Commands::Config => {
            let yaml = serde_yaml::to_string(&config).context("Failed to render configuration")?;
            println!("{yaml}");
            Ok(())
        }
    }
}

fn build_registry(config: &Config, workdir: Option<PathBuf>) -> Result<Arc<ToolRegistry>> {
    let workdir = match workdir {
        Some(dir) => dir,
        None => std::env::current_dir().context("Failed to resolve current directory")?,
    };
    let ctx = ToolContext::new(&config.tools, workdir);
    Ok(Arc::new(ToolRegistry::standard(ctx)))
}

async fn run_task(
    task: &str,
    config: Config,
    workdir: Option<PathBuf>,
    auto: bool,
) -> Result<()> {
    let provider = Arc::new(
        OpenAiProvider::new(&config.llm).map_err(|e| eyre::eyre!("LLM provider setup: {e}"))?,
    );
    let registry = build_registry(&config, workdir)?;

    info!(
        "starting run against {} with model {}",
        config.llm.base_url, config.llm.model
    );
    println!("{} {}", "Task:".bold(), task);

    let runner = if auto {
        AgentRunner::new(config, provider, registry, Arc::new(AutoContinue))
    } else {
        AgentRunner::new(config, provider, registry, Arc::new(ConsoleIntervention))
    }
    .with_trace_sink(Arc::new(LogTraceSink));

    let result = runner
        .run(task)
        .await
        .map_err(|e| eyre::eyre!("run failed: {e}"))?;

    let status = match result.status {
        RunStatus::Completed => result.status.to_string().green().bold(),
        RunStatus::Aborted => result.status.to_string().yellow().bold(),
        RunStatus::Failed => result.status.to_string().red().bold(),
    };
    println!(
        "\n{status} after {} iteration(s)\n\n{}",
        result.iterations_used, result.summary
    );
    if !result.sources.is_empty() {
        println!("\n{}", "Sources:".bold());
        for source in &result.sources {
            println!("  - {source}");
        }
    }

    Ok(())
}
