use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use doctor_tools::rpc::McpServer;
use doctor_tools::{Catalog, Db};

#[derive(Parser)]
#[command(
    name = "dbdoctor-mcp",
    version,
    about = "Read-only database diagnostics served over stdio (MCP)"
)]
struct Cli {
    /// Postgres DSN for the database under diagnosis
    #[arg(long, env = "DATABASE_URL")]
    database_url: String,
}

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    // stdout carries the protocol; logs go to stderr only.
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "doctor_tools=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let server = McpServer::new(Catalog::new(Db::new(cli.database_url)));
    if let Err(err) = server.serve_stdio().await {
        tracing::error!("MCP server terminated: {err}");
        std::process::exit(1);
    }
}
