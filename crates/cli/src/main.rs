mod cmd;
mod handover;
mod output;
mod prompts;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use crate::output::OutputFormat;

/// deployer - deploy versioned bundles into managed directories
#[derive(Parser)]
#[command(name = "deployer")]
#[command(author, version, about, long_about = None)]
struct Cli {
  /// Enable verbose output
  #[arg(short, long, global = true)]
  verbose: bool,

  #[command(subcommand)]
  command: Commands,
}

#[derive(Subcommand)]
enum Commands {
  /// Deploy a bundle into a destination directory
  Deploy(DeployArgs),

  /// Show what a deployment would change without touching the destination
  Plan(DeployArgs),

  /// Parse and validate a recipe
  Validate {
    /// Recipe file, or a packaged bundle zip
    recipe: PathBuf,

    /// Output format
    #[arg(long, value_enum, default_value_t)]
    format: OutputFormat,
  },

  /// Show the deployment recorded in a destination directory
  Status {
    /// Destination directory
    #[arg(long)]
    deploy_dir: PathBuf,

    /// Output format
    #[arg(long, value_enum, default_value_t)]
    format: OutputFormat,
  },

  /// Remove the deployment recorded in a destination directory
  Purge {
    /// Destination directory
    #[arg(long)]
    deploy_dir: PathBuf,

    /// Do not ask for confirmation
    #[arg(short, long)]
    force: bool,

    /// Output format
    #[arg(long, value_enum, default_value_t)]
    format: OutputFormat,
  },
}

#[derive(Args)]
pub struct DeployArgs {
  /// Recipe file, or a packaged bundle zip
  recipe: PathBuf,

  /// Directory holding the bundle files (default: the recipe's directory)
  #[arg(long)]
  bundle_dir: Option<PathBuf>,

  /// Destination directory
  #[arg(long)]
  deploy_dir: PathBuf,

  /// Deployment id (default: current id + 1)
  #[arg(long)]
  deploy_id: Option<u64>,

  /// Human readable deployment name
  #[arg(long)]
  name: Option<String>,

  /// Input property, repeatable
  #[arg(short = 'D', value_name = "KEY=VALUE", value_parser = parse_define)]
  define: Vec<(String, String)>,

  /// Properties file (path or URL) merged under the input properties
  #[arg(long)]
  properties_file: Option<String>,

  /// Restore the files backed up by the current deployment
  #[arg(long)]
  revert: bool,

  /// Wipe the destination before deploying
  #[arg(long)]
  clean: bool,

  /// Compute and report the changes without applying them
  #[arg(long)]
  dry_run: bool,

  /// Accept handed-over content by copying it into DIR/<action>/<file>
  #[arg(long, value_name = "DIR")]
  handover_dir: Option<PathBuf>,

  /// Output format
  #[arg(long, value_enum, default_value_t)]
  format: OutputFormat,
}

fn parse_define(s: &str) -> Result<(String, String), String> {
  match s.split_once('=') {
    Some((key, value)) if !key.trim().is_empty() => Ok((key.trim().to_string(), value.to_string())),
    _ => Err(format!("expected KEY=VALUE, got '{s}'")),
  }
}

fn main() -> Result<()> {
  let cli = Cli::parse();

  let filter = if cli.verbose {
    EnvFilter::new("debug")
  } else {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
  };
  tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_writer(std::io::stderr)
    .without_time()
    .init();

  match cli.command {
    Commands::Deploy(args) => cmd::cmd_deploy(args, cli.verbose),
    Commands::Plan(mut args) => {
      args.dry_run = true;
      cmd::cmd_deploy(args, cli.verbose)
    }
    Commands::Validate { recipe, format } => cmd::cmd_validate(&recipe, cli.verbose, format),
    Commands::Status { deploy_dir, format } => cmd::cmd_status(&deploy_dir, cli.verbose, format),
    Commands::Purge {
      deploy_dir,
      force,
      format,
    } => cmd::cmd_purge(&deploy_dir, force, format),
  }
}
