//! # gemdflow CLI Module
//!
//! ## Available Commands
//!
//! - `init` - Create the template and spec store layout
//! - `status` - Show registry and file counts of the stores
//! - `watch` - Run the rule engine over a files folder
//! - `graph` - Build a provenance graph from a gemd folder

mod commands;

use clap::{Args, Parser, Subcommand};
use gemdflow_core::GemdError;
use gemdflow_core::graph::{GraphScope, Layout};
use std::path::PathBuf;

pub use commands::*;

// =============================================================================
// CLI STRUCTURE
// =============================================================================

/// gemdflow - ingest lab files into a materials provenance graph
#[derive(Parser, Debug)]
#[command(name = "gemdflow")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress banner output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Root folder of the template and spec stores
    #[arg(short = 'S', long, global = true, default_value = "gemd_store")]
    pub store: PathBuf,

    /// Id the local stores are registered and designated under
    #[arg(long, global = true, default_value = "local")]
    pub store_id: String,

    /// Output in JSON format (for programmatic access)
    #[arg(long, global = true)]
    pub json_mode: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Initialize the store layout
    Init {
        /// Recreate the registries and variant folders if they exist
        #[arg(short, long)]
        force: bool,
    },

    /// Show store status
    Status,

    /// Watch a files folder and write gemd documents for matching files
    Watch {
        /// TOML file declaring templates and rules
        #[arg(short, long)]
        config: PathBuf,

        /// Folder receiving lab files
        #[arg(long)]
        files_folder: PathBuf,

        /// Folder receiving gemd documents
        #[arg(long)]
        gemd_folder: PathBuf,

        /// Process files already present before watching
        #[arg(long)]
        instantiate_build: bool,

        /// Replay existing files and exit
        #[arg(long)]
        once: bool,

        /// Deduplicate specs through the spec store before writing
        #[arg(long)]
        intern_specs: bool,
    },

    /// Build a provenance graph from gemd documents
    Graph(GraphArgs),
}

/// Arguments of the `graph` command.
#[derive(Args, Debug, Clone)]
pub struct GraphArgs {
    /// Folder of gemd documents
    #[arg(long)]
    pub gemd_folder: PathBuf,

    /// Only keep the neighbourhood of this uid
    #[arg(long)]
    pub uid: Option<String>,

    /// Neighbourhood depth for --uid
    #[arg(short, long, default_value = "3")]
    pub depth: usize,

    /// Representation level: spec, run, template or all
    #[arg(short, long, default_value = "run", value_parser = parse_scope)]
    pub which: GraphScope,

    /// Attribute rendering: visualization or raw
    #[arg(short, long, default_value = "visualization", value_parser = parse_layout)]
    pub layout: Layout,

    /// Attach attribute values
    #[arg(long)]
    pub attributes: bool,

    /// Attach tags
    #[arg(long)]
    pub tags: bool,

    /// Attach file links
    #[arg(long)]
    pub file_links: bool,

    /// Attribute values as separate nodes
    #[arg(long)]
    pub separate_node: bool,

    /// Add every edge in both directions
    #[arg(long)]
    pub bidirectional: bool,

    /// Leave out ingredient -> material edges
    #[arg(long)]
    pub no_ingredient_material: bool,

    /// Write the node-link JSON dump here
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

fn parse_scope(s: &str) -> Result<GraphScope, String> {
    s.parse().map_err(|e: GemdError| e.to_string())
}

fn parse_layout(s: &str) -> Result<Layout, String> {
    s.parse().map_err(|e: GemdError| e.to_string())
}

// =============================================================================
// COMMAND EXECUTION
// =============================================================================

/// Execute the CLI with parsed arguments.
pub async fn execute(cli: Cli) -> Result<(), GemdError> {
    let json_mode = cli.json_mode;

    match cli.command {
        Some(Commands::Init { force }) => cmd_init(&cli.store, force),
        Some(Commands::Status) => cmd_status(&cli.store, json_mode),
        Some(Commands::Watch {
            config,
            files_folder,
            gemd_folder,
            instantiate_build,
            once,
            intern_specs,
        }) => {
            let options = WatchCommand {
                config,
                files_folder,
                gemd_folder,
                instantiate_build,
                once,
                intern_specs,
                verbose: cli.verbose,
            };
            cmd_watch(&cli.store, &cli.store_id, &options).await
        }
        Some(Commands::Graph(args)) => cmd_graph(&args, json_mode).map(|_| ()),
        None => {
            // No subcommand - show status by default
            cmd_status(&cli.store, json_mode)
        }
    }
}
