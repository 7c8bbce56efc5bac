use clap::{Parser, Subcommand};
use serde_json::{Value, json};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use doctor_agent::{OpenAiChatModel, Orchestrator};
use doctor_core::config::Config;
use doctor_core::dispatch::ToolDispatch;
use doctor_tools::{Catalog, Db};

#[derive(Parser)]
#[command(
    name = "dbdoctor",
    version,
    about = "Ask natural-language diagnostic questions about a misbehaving database"
)]
struct Cli {
    /// Postgres DSN (only needed by tool/health; ask reads full config)
    #[arg(long, env = "DATABASE_URL")]
    database_url: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Ask a diagnostic question; prints the answer and every tool result
    Ask {
        /// The question, e.g. "why are my queries stuck?"
        question: String,
        /// Override the round-trip budget for this question
        #[arg(long)]
        max_round_trips: Option<u32>,
        /// Override the end-to-end timeout in seconds
        #[arg(long)]
        timeout_secs: Option<u64>,
    },
    /// Direct access to the diagnostic operation catalog
    Tool {
        #[command(subcommand)]
        command: ToolCommands,
    },
    /// Check database connectivity
    Health,
}

#[derive(Subcommand)]
enum ToolCommands {
    /// List the catalog with parameter schemas
    List,
    /// Invoke one operation by name
    Run {
        /// Operation name (e.g. "blocking_sessions")
        name: String,
        /// Arguments as a JSON object
        #[arg(long, default_value = "{}")]
        args: String,
    },
}

fn exit_error(message: &str, docs_hint: Option<&str>) -> ! {
    let mut err = json!({
        "error": "cli_error",
        "message": message
    });
    if let Some(hint) = docs_hint {
        err["docs_hint"] = json!(hint);
    }
    eprintln!("{}", serde_json::to_string_pretty(&err).unwrap());
    std::process::exit(1);
}

fn require_database_url(cli_value: Option<String>) -> String {
    cli_value.unwrap_or_else(|| {
        exit_error(
            "database_url is required",
            Some("Set --database-url or the DATABASE_URL env var"),
        )
    })
}

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "doctor_agent=info,doctor_tools=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Ask {
            question,
            max_round_trips,
            timeout_secs,
        } => {
            let mut config = match Config::from_env() {
                Ok(config) => config,
                Err(err) => exit_error(
                    &err.to_string(),
                    Some("Set DATABASE_URL, MODEL_NAME, MODEL_API_KEY, and MODEL_BASE_URL (or GENAI_REGION)."),
                ),
            };
            if let Some(budget) = max_round_trips {
                config.limits.max_round_trips = budget;
            }
            if let Some(secs) = timeout_secs {
                config.limits.question_timeout = std::time::Duration::from_secs(secs);
            }

            let catalog = Catalog::new(Db::new(config.database_url.clone()));
            let model = OpenAiChatModel::new(config.model.clone());
            let orchestrator = Orchestrator::new(model, catalog, config.limits);

            match orchestrator.ask(&question).await {
                Ok(exchange) => {
                    println!("{}", serde_json::to_string_pretty(&exchange).unwrap());
                }
                Err(err) => exit_error(&err.to_string(), None),
            }
        }
        Commands::Tool { command } => match command {
            ToolCommands::List => {
                let catalog = Catalog::new(Db::new(require_database_url(cli.database_url)));
                let specs: Vec<Value> = catalog
                    .specs()
                    .into_iter()
                    .map(|spec| {
                        json!({
                            "name": spec.name,
                            "description": spec.description,
                            "parameters": spec.parameters,
                        })
                    })
                    .collect();
                println!("{}", serde_json::to_string_pretty(&json!({ "tools": specs })).unwrap());
            }
            ToolCommands::Run { name, args } => {
                let arguments = match serde_json::from_str::<Value>(&args) {
                    Ok(Value::Object(map)) => map,
                    Ok(_) => exit_error("--args must be a JSON object", None),
                    Err(e) => exit_error(&format!("--args is not valid JSON: {e}"), None),
                };
                let catalog = Catalog::new(Db::new(require_database_url(cli.database_url)));
                let outcome = catalog.dispatch(&name, &arguments).await;
                println!("{}", serde_json::to_string_pretty(&outcome.payload).unwrap());
                if outcome.is_error() {
                    std::process::exit(1);
                }
            }
        },
        Commands::Health => {
            let db = Db::new(require_database_url(cli.database_url));
            match db.ping().await {
                Ok(()) => println!("{}", json!({ "status": "ok" })),
                Err(err) => exit_error(err.message(), None),
            }
        }
    }
}
