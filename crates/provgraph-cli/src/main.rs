//! Provenance graph closure CLI.
//!
//! Provides the `provgraph` binary for editing links in a SQLite-backed
//! store and querying the transitive closure kept alongside them. Every
//! command prints JSON on stdout; errors go to stderr with a non-zero exit
//! code.

use std::process;

use clap::{Parser, Subcommand};
use serde::Serialize;

use provgraph_core::{Link, LinkId, LinkType, NodeId};
use provgraph_storage::{LinkStore, SqliteStore, StorageError, StoreConfig};

/// Provenance graph closure tools.
#[derive(Parser)]
#[command(name = "provgraph", about = "Provenance graph transitive-closure tools")]
struct Cli {
    /// Path to the database file (default: $PROVGRAPH_DB_PATH or provgraph.db).
    #[arg(long, global = true)]
    db: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

/// Available subcommands.
#[derive(Debug, Subcommand)]
enum Commands {
    /// Add, remove or list direct links.
    Link {
        #[command(subcommand)]
        action: LinkCommand,
    },
    /// List every ancestor of a node.
    Ancestors {
        node: i64,
        /// Only follow routes of at most this closure depth.
        #[arg(long)]
        max_depth: Option<u32>,
    },
    /// List every descendant of a node.
    Descendants {
        node: i64,
        #[arg(long)]
        max_depth: Option<u32>,
    },
    /// Check whether one node is an ancestor of another.
    IsAncestor { ancestor: i64, descendant: i64 },
    /// List every closure row between two nodes.
    Paths { ancestor: i64, descendant: i64 },
    /// Show link and closure row counts.
    Stats,
    /// Check the closure against the stored links.
    Verify,
    /// Recompute the closure from the stored links.
    Rebuild,
}

#[derive(Debug, Subcommand)]
enum LinkCommand {
    /// Store a link and propagate it into the closure.
    Add {
        #[arg(long)]
        input: i64,
        #[arg(long)]
        output: i64,
        #[arg(long)]
        label: String,
        /// create, input, call or return.
        #[arg(long, default_value = "input")]
        link_type: LinkType,
        /// Store the link without tracking it in the closure.
        #[arg(long)]
        no_closure: bool,
    },
    /// Delete a link and every closure row that depended on it.
    Rm { id: i64 },
    /// List all links.
    List,
}

/// JSON to print and the exit code to return with it.
struct Output {
    json: String,
    code: i32,
}

impl Output {
    fn ok<T: Serialize>(value: &T) -> Self {
        Output {
            json: render(value),
            code: 0,
        }
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let db_path = cli.db.unwrap_or_else(|| {
        std::env::var("PROVGRAPH_DB_PATH").unwrap_or_else(|_| "provgraph.db".to_string())
    });
    process::exit(run(&db_path, cli.command));
}

/// Execute one command against the database at `db_path`.
///
/// Returns exit code: 0 = success, 1 = usage or integrity error,
/// 2 = link rejected (cycle or duplicate), 3 = I/O or database error.
fn run(db_path: &str, command: Commands) -> i32 {
    let mut store = match SqliteStore::with_config(db_path, StoreConfig::from_env()) {
        Ok(s) => s,
        Err(e) => {
            tracing::error!(db = db_path, error = %e, "failed to open database");
            eprintln!("Error: failed to open database '{}': {}", db_path, e);
            return 3;
        }
    };

    match execute(&mut store, command) {
        Ok(output) => {
            println!("{}", output.json);
            output.code
        }
        Err(e) => {
            let code = exit_code(&e);
            tracing::error!(error = %e, code, "command failed");
            eprintln!("Error: {}", e);
            code
        }
    }
}

fn execute(store: &mut dyn LinkStore, command: Commands) -> Result<Output, StorageError> {
    tracing::debug!(?command, "dispatching command");
    let output = match command {
        Commands::Link { action } => match action {
            LinkCommand::Add {
                input,
                output,
                label,
                link_type,
                no_closure,
            } => {
                let mut link = Link::new(NodeId(input), NodeId(output), label, link_type);
                if no_closure {
                    link = link.with_closure(false);
                }
                let id = store.insert_link(&link)?;
                Output::ok(&store.get_link(id)?)
            }
            LinkCommand::Rm { id } => {
                store.delete_link(LinkId(id))?;
                Output::ok(&serde_json::json!({ "deleted": id }))
            }
            LinkCommand::List => Output::ok(&store.list_links()?),
        },
        Commands::Ancestors { node, max_depth } => {
            Output::ok(&store.ancestors(NodeId(node), max_depth)?)
        }
        Commands::Descendants { node, max_depth } => {
            Output::ok(&store.descendants(NodeId(node), max_depth)?)
        }
        Commands::IsAncestor {
            ancestor,
            descendant,
        } => Output::ok(&store.is_ancestor(NodeId(ancestor), NodeId(descendant))?),
        Commands::Paths {
            ancestor,
            descendant,
        } => Output::ok(&store.paths_between(NodeId(ancestor), NodeId(descendant))?),
        Commands::Stats => Output::ok(&store.stats()?),
        Commands::Verify => {
            let report = store.verify_closure()?;
            let code = if report.is_consistent() { 0 } else { 1 };
            Output {
                json: render(&report),
                code,
            }
        }
        Commands::Rebuild => {
            let rows = store.rebuild_closure()?;
            Output::ok(&serde_json::json!({ "closure_rows": rows }))
        }
    };
    Ok(output)
}

fn render<T: Serialize>(value: &T) -> String {
    serde_json::to_string_pretty(value)
        .unwrap_or_else(|e| format!("{{\"error\": \"failed to serialize result: {}\"}}", e))
}

fn exit_code(error: &StorageError) -> i32 {
    match error {
        StorageError::Cycle { .. } | StorageError::DuplicateLink { .. } => 2,
        StorageError::Sqlite(_) | StorageError::Migration(_) => 3,
        StorageError::Core(_)
        | StorageError::LinkNotFound(_)
        | StorageError::IntegrityError { .. }
        | StorageError::Inconsistent { .. } => 1,
    }
}
