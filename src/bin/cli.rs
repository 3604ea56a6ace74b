//! Memento CLI
//!
//! Local smoke-testing against a database file without going through the
//! MCP wire protocol.

use clap::{Parser, Subcommand};

use memento::error::Result;
use memento::search::hybrid_search;
use memento::storage::queries::{
    delete_memory, get_evolution_chain, get_memory, list_memories, restore_memory, store_memory,
};
use memento::storage::Storage;
use memento::types::{CreateMemoryInput, ListOptions};

#[derive(Parser)]
#[command(name = "memento")]
#[command(about = "Memento memory store CLI")]
#[command(version)]
struct Cli {
    /// Database path (a single connection; use memento-server for the
    /// multi-connection registry)
    #[arg(
        long,
        env = "MEMENTO_DB_PATH",
        default_value = "~/.local/share/memento/general.db"
    )]
    db_path: String,

    /// Connection (domain) name new memories are stored under
    #[arg(long, default_value = "general")]
    connection: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Store a new memory
    Store {
        /// Content to remember
        content: String,
        /// Tags (comma-separated)
        #[arg(short, long)]
        tags: Option<String>,
    },
    /// Recall a memory by id
    Get {
        /// Memory id (`mem:<connection>:<hex>`)
        id: String,
    },
    /// List memories
    List {
        #[arg(short, long, default_value = "20")]
        limit: u32,
        #[arg(long)]
        include_deleted: bool,
    },
    /// Hybrid full-text search
    Search {
        query: String,
        #[arg(short, long, default_value = "10")]
        limit: u32,
    },
    /// Soft-delete a memory
    Forget { id: String },
    /// Undo a soft-delete
    Restore { id: String },
    /// Show a memory's evolution chain
    History { id: String },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let db_path = shellexpand::tilde(&cli.db_path).to_string();
    let storage = Storage::open(&db_path)?;

    match cli.command {
        Commands::Store { content, tags } => {
            let tags: Vec<String> = tags
                .map(|t| t.split(',').map(|s| s.trim().to_string()).collect())
                .unwrap_or_default();

            let input = CreateMemoryInput {
                content,
                domain: Some(cli.connection.clone()),
                tags,
                ..Default::default()
            };

            let outcome = storage.with_transaction(|conn| store_memory(conn, &input))?;
            if outcome.duplicate {
                println!("Duplicate of existing memory {}", outcome.memory.id);
            } else {
                println!("Stored {}", outcome.memory.id);
            }
            println!("{}", serde_json::to_string_pretty(&outcome.memory)?);
        }

        Commands::Get { id } => {
            let memory = storage.with_connection(|conn| get_memory(conn, &id))?;
            match memory {
                Some(memory) => println!("{}", serde_json::to_string_pretty(&memory)?),
                None => println!("not found"),
            }
        }

        Commands::List {
            limit,
            include_deleted,
        } => {
            let options = ListOptions {
                domain: Some(cli.connection.clone()),
                limit,
                include_deleted,
                ..Default::default()
            };
            let memories = storage.with_connection(|conn| list_memories(conn, &options))?;
            for memory in memories {
                println!(
                    "{} [{}] {}",
                    memory.id,
                    memory.tags.join(", "),
                    truncate(&memory.content, 60)
                );
            }
        }

        Commands::Search { query, limit } => {
            let results =
                storage.with_connection(|conn| hybrid_search(conn, &query, &[], limit, 0))?;
            for result in results {
                println!(
                    "{} (score: {:.4}) - {}",
                    result.memory.id,
                    result.score,
                    truncate(&result.memory.content, 60)
                );
            }
        }

        Commands::Forget { id } => {
            storage.with_transaction(|conn| delete_memory(conn, &id))?;
            println!("Forgot {id}");
        }

        Commands::Restore { id } => {
            storage.with_transaction(|conn| restore_memory(conn, &id))?;
            println!("Restored {id}");
        }

        Commands::History { id } => {
            let chain = storage.with_connection(|conn| get_evolution_chain(conn, &id))?;
            for memory in chain {
                println!(
                    "{} ({}) - {}",
                    memory.id,
                    memory.created_at.format("%Y-%m-%d %H:%M"),
                    truncate(&memory.content, 60)
                );
            }
        }
    }

    Ok(())
}

fn truncate(s: &str, max: usize) -> String {
    let first_line = s.lines().next().unwrap_or(s);
    if first_line.len() <= max {
        first_line.to_string()
    } else {
        format!("{}...", &first_line[..max])
    }
}
