mod chat_cmd;
mod config;
mod evolve_cmd;
#[cfg(test)]
mod test_util;

use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use evolver_core::client::{AgentClient, ClaudeCodeClient};
use evolver_core::task::EvolveSpec;

use chat_cmd::PromptArgs;
use config::{EvolverConfig, LogFormat, LoggingSection, Overrides};
use evolve_cmd::TargetArgs;

#[derive(Parser)]
#[command(
    name = "evolver",
    about = "Drive the claude coding agent through conversations and code-evolution cycles"
)]
struct Cli {
    /// Agent binary (overrides EVOLVER_CLAUDE_BINARY env var)
    #[arg(long, global = true)]
    binary: Option<String>,

    /// Model to use (overrides EVOLVER_MODEL env var)
    #[arg(long, global = true)]
    model: Option<String>,

    /// Agent timeout in seconds (overrides EVOLVER_TIMEOUT_SECS env var)
    #[arg(long, global = true)]
    timeout: Option<u64>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Write a default evolver config file
    Init {
        /// Overwrite existing config file
        #[arg(long)]
        force: bool,
    },
    /// Send one prompt and print the agent's answer
    Chat {
        #[command(flatten)]
        args: PromptArgs,
        /// Print the whole response as JSON
        #[arg(long)]
        json: bool,
    },
    /// Send one prompt and print agent events as JSON lines
    Stream {
        #[command(flatten)]
        args: PromptArgs,
        /// Ask the agent for partial messages as well
        #[arg(long)]
        partial: bool,
    },
    /// Analyze a target read-only and print recommendations
    Analyze {
        #[command(flatten)]
        target: TargetArgs,
    },
    /// Iteratively improve a target until the objective is met
    Evolve {
        #[command(flatten)]
        target: TargetArgs,
        /// Command the agent runs to test each iteration
        #[arg(long)]
        test_command: Option<String>,
        /// Iteration budget (1-20)
        #[arg(long, default_value_t = EvolveSpec::DEFAULT_MAX_ITERATIONS)]
        max_iterations: u32,
    },
    /// Check that the agent binary is installed and runs
    Health,
}

/// Execute the `evolver init` command: write the default config file.
fn cmd_init(force: bool) -> anyhow::Result<()> {
    let path = config::config_path();

    if path.exists() && !force {
        anyhow::bail!(
            "config file already exists at {}\nUse --force to overwrite.",
            path.display()
        );
    }

    let cfg = config::ConfigFile::default();
    config::save_config(&cfg)?;

    println!("Config written to {}", path.display());
    println!("  claude.binary = {}", cfg.claude.binary);
    println!("  claude.model = {}", cfg.claude.model);
    println!("  claude.timeout_secs = {}", cfg.claude.timeout_secs);
    println!();
    println!("Next: run `evolver health` to check the agent binary.");

    Ok(())
}

fn init_tracing(logging: &LoggingSection) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    match logging.format {
        LogFormat::Console => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

/// Resolve config, install logging, and build the agent client.
fn connect(overrides: Overrides) -> anyhow::Result<ClaudeCodeClient> {
    let resolved = EvolverConfig::resolve(&overrides)?;
    init_tracing(&resolved.logging);
    Ok(ClaudeCodeClient::new(resolved.client))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let overrides = Overrides {
        binary: cli.binary,
        model: cli.model,
        timeout_secs: cli.timeout,
    };

    match cli.command {
        // Needs no resolved config, so a broken config file can be replaced.
        Commands::Init { force } => {
            cmd_init(force)?;
        }
        Commands::Chat { args, json } => {
            let client = connect(overrides)?;
            chat_cmd::run_chat(&client, args, json).await?;
        }
        Commands::Stream { args, partial } => {
            let client = connect(overrides)?;
            chat_cmd::run_stream(&client, args, partial).await?;
        }
        Commands::Analyze { target } => {
            let client: Arc<dyn AgentClient> = Arc::new(connect(overrides)?);
            evolve_cmd::run_analyze(client, target).await?;
        }
        Commands::Evolve {
            target,
            test_command,
            max_iterations,
        } => {
            let client: Arc<dyn AgentClient> = Arc::new(connect(overrides)?);
            let spec = EvolveSpec {
                test_command,
                max_iterations,
                ..target.spec()
            };
            evolve_cmd::run_evolve(client, spec).await?;
        }
        Commands::Health => {
            let client = connect(overrides)?;
            let binary = &client.config().binary;
            if !client.health_check().await {
                anyhow::bail!("agent binary '{binary}' is not available");
            }
            println!("Agent binary '{binary}' is available.");
        }
    }

    Ok(())
}
