use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

#[derive(Parser)]
#[command(name = "graphsync")]
#[command(about = "Reconcile declarative resources against an OData API")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Config file (defaults to ~/.graphsync/config.toml)
    #[arg(short, long, global = true, env = "GRAPHSYNC_CONFIG")]
    pub config: Option<PathBuf>,

    /// API base URL (overrides config)
    #[arg(long, global = true, env = "GRAPHSYNC_BASE_URL")]
    pub base_url: Option<String>,

    /// Bearer token (overrides config)
    #[arg(long, global = true, env = "GRAPHSYNC_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// Per-request timeout in milliseconds (overrides config)
    #[arg(long, global = true)]
    pub timeout: Option<u64>,

    /// Output format
    #[arg(short, long, global = true)]
    pub format: Option<OutputFormat>,
}

#[derive(Clone, Copy, ValueEnum, Default)]
pub enum OutputFormat {
    #[default]
    Json,
    Table,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Check a resource file without contacting the API
    Validate(ResourceArgs),
    /// Read one object
    Read(TargetArgs),
    /// List the collection a resource lives in
    List(ListArgs),
    /// Show the requests a create or update would send
    Plan(PlanArgs),
    /// Create an object from a desired-state file
    Create(WriteArgs),
    /// Update an object from a desired-state file
    Update(UpdateArgs),
    /// Delete an object
    Delete(TargetArgs),
}

#[derive(clap::Args)]
pub struct ResourceArgs {
    /// Path to the resource file (descriptor and hooks)
    #[arg(short, long)]
    pub resource: PathBuf,
}

#[derive(clap::Args)]
pub struct TargetArgs {
    #[command(flatten)]
    pub resource: ResourceArgs,
    /// Object id (omit for singletons)
    pub id: Option<String>,
    /// Parent object id, for child resources
    #[arg(long)]
    pub parent: Option<String>,
}

#[derive(clap::Args)]
pub struct ListArgs {
    #[command(flatten)]
    pub resource: ResourceArgs,
    /// Parent object id, for child resources
    #[arg(long)]
    pub parent: Option<String>,
    /// OData $filter expression
    #[arg(long)]
    pub filter: Option<String>,
    /// Maximum number of items
    #[arg(long)]
    pub top: Option<u32>,
    /// OData $orderby expression
    #[arg(long)]
    pub order_by: Option<String>,
}

#[derive(clap::Args)]
pub struct WriteArgs {
    #[command(flatten)]
    pub resource: ResourceArgs,
    /// Parent object id, for child resources
    #[arg(long)]
    pub parent: Option<String>,
    /// Path to the desired-state JSON file (reads from stdin if omitted)
    #[arg(long)]
    pub file: Option<PathBuf>,
}

#[derive(clap::Args)]
pub struct UpdateArgs {
    #[command(flatten)]
    pub target: TargetArgs,
    /// Path to the desired-state JSON file (reads from stdin if omitted)
    #[arg(long)]
    pub file: Option<PathBuf>,
}

#[derive(clap::Args)]
pub struct PlanArgs {
    #[command(flatten)]
    pub target: TargetArgs,
    /// Path to the desired-state JSON file (reads from stdin if omitted)
    #[arg(long)]
    pub file: Option<PathBuf>,
    /// Plan an update of the given id instead of a create
    #[arg(long)]
    pub update: bool,
}
