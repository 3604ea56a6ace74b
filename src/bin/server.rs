//! Memento MCP server
//!
//! Run with: memento-server

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use memento::enrichment::EnrichmentQueue;
use memento::error::Result;
use memento::mcp::{Dispatcher, McpServer};
use memento::registry::ConnectionRegistry;

#[derive(Parser, Debug)]
#[command(name = "memento-server")]
#[command(about = "Memento MCP server: persistent, content-addressed memory for AI agents")]
struct Args {
    /// Directory holding one SQLite database per connection
    /// (`<connection>.db`). Omit to keep every connection in memory.
    #[arg(long, env = "MEMENTO_DB_DIR")]
    db_dir: Option<String>,

    /// Default connection name used when a request omits `connection_id`.
    #[arg(long, env = "MEMENTO_DEFAULT_CONNECTION", default_value = "general")]
    default_connection: String,

    /// Enrichment queue capacity.
    #[arg(long, env = "MEMENTO_ENRICHMENT_CAPACITY", default_value = "1024")]
    enrichment_capacity: usize,
}

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_ansi(false),
        )
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();

    let db_dir = args
        .db_dir
        .map(|dir| std::path::PathBuf::from(shellexpand::tilde(&dir).to_string()));

    let registry = ConnectionRegistry::new(db_dir, Some(args.default_connection));
    let enrichment = EnrichmentQueue::new(args.enrichment_capacity);

    // Eagerly open the default connection so a misconfigured db path fails
    // fast instead of on the first request.
    registry.get_or_open(registry.default_connection_name())?;

    tracing::info!(
        default_connection = registry.default_connection_name(),
        "memento-server starting"
    );

    let dispatcher = Dispatcher::new(registry, enrichment);
    McpServer::new(dispatcher).run()
}
