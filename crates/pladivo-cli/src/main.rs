mod config;
mod outbox_cmd;
mod serve;
mod token_cmd;

use clap::{Parser, Subcommand};

use pladivo_core::auth::Role;
use pladivo_db::pool;

use config::PladivoConfig;

#[derive(Parser)]
#[command(name = "pladivo", about = "Event plan workflow and contract payment service")]
struct Cli {
    /// Database URL (overrides PLADIVO_DATABASE_URL env var)
    #[arg(long, global = true)]
    database_url: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a pladivo config file (no database required)
    Init {
        /// PostgreSQL connection URL
        #[arg(long, default_value = "postgresql://localhost:5432/pladivo")]
        db_url: String,
        /// Overwrite existing config file
        #[arg(long)]
        force: bool,
    },
    /// Create and migrate the pladivo database
    DbInit,
    /// Run the HTTP API, webhook receiver and email outbox worker
    Serve {
        /// Address to bind (overrides server.bind)
        #[arg(long)]
        bind: Option<String>,
        /// Port to listen on (overrides server.port)
        #[arg(long)]
        port: Option<u16>,
    },
    /// API token management
    Token {
        #[command(subcommand)]
        command: TokenCommands,
    },
    /// Email outbox maintenance
    Outbox {
        #[command(subcommand)]
        command: OutboxCommands,
    },
}

#[derive(Subcommand)]
enum TokenCommands {
    /// Issue a bearer token for a manager, staff member or customer
    Issue {
        /// manager, staff or customer
        #[arg(long)]
        role: Role,
        /// Identifier recorded as the actor (e.g. staff id)
        #[arg(long)]
        subject: String,
    },
}

#[derive(Subcommand)]
enum OutboxCommands {
    /// Show queued, sent and dead messages
    List,
    /// Put dead messages back in the queue with a fresh attempt budget
    RetryDead,
}

/// Execute the `pladivo init` command: write config file.
fn cmd_init(db_url: &str, force: bool) -> anyhow::Result<()> {
    let path = config::config_path();

    if path.exists() && !force {
        anyhow::bail!(
            "config file already exists at {}\nUse --force to overwrite.",
            path.display()
        );
    }

    let token_secret = config::generate_token_secret();
    let api_key = config::generate_api_key();

    let cfg = config::ConfigFile {
        database: config::DatabaseSection {
            url: db_url.to_string(),
            max_connections: pladivo_db::config::DbConfig::DEFAULT_MAX_CONNECTIONS,
            acquire_timeout_secs: pladivo_db::config::DbConfig::DEFAULT_ACQUIRE_TIMEOUT.as_secs(),
        },
        auth: config::AuthSection {
            token_secret: token_secret.clone(),
        },
        sepay: config::SepaySection {
            api_key: api_key.clone(),
        },
        bank: Default::default(),
        email: Default::default(),
        outbox: Default::default(),
        server: Default::default(),
    };

    config::save_config(&cfg)?;

    println!("Config written to {}", path.display());
    println!("  database.url = {db_url}");
    println!("  auth.token_secret = {}...{}", &token_secret[..8], &token_secret[56..]);
    println!("  sepay.api_key = {api_key}");
    println!();
    println!("Fill in [bank] before issuing contracts, and paste sepay.api_key into");
    println!("the Sepay webhook settings (Authorization: Apikey <key>).");
    println!("Next: run `pladivo db-init` to create and migrate the database.");

    Ok(())
}

/// Execute the `pladivo db-init` command: create database and run migrations.
async fn cmd_db_init(cli_db_url: Option<&str>) -> anyhow::Result<()> {
    let resolved = PladivoConfig::resolve(cli_db_url)?;

    println!("Initializing pladivo database...");

    if pool::ensure_database_exists(&resolved.db_config).await? {
        println!("Created database.");
    }
    let db_pool = pool::create_pool(&resolved.db_config).await?;
    pool::run_migrations(&db_pool).await?;

    let counts = pool::table_counts(&db_pool).await?;
    println!("Database ready. Tables:");
    for (table, count) in &counts {
        println!("  {table}: {count} rows");
    }

    db_pool.close().await;

    println!("pladivo db-init complete.");
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Init { db_url, force } => {
            cmd_init(&db_url, force)?;
        }
        Commands::DbInit => {
            cmd_db_init(cli.database_url.as_deref()).await?;
        }
        Commands::Serve { bind, port } => {
            let resolved = PladivoConfig::resolve(cli.database_url.as_deref())?;
            let db_pool = pool::create_pool(&resolved.db_config).await?;
            pool::run_migrations(&db_pool).await?;
            let result = serve::run_serve(db_pool.clone(), resolved, bind, port).await;
            db_pool.close().await;
            result?;
        }
        Commands::Token { command } => {
            let resolved = PladivoConfig::resolve(cli.database_url.as_deref())?;
            match command {
                TokenCommands::Issue { role, subject } => {
                    token_cmd::run_issue(&resolved.token_config, role, &subject)?;
                }
            }
        }
        Commands::Outbox { command } => {
            let resolved = PladivoConfig::resolve(cli.database_url.as_deref())?;
            let db_pool = pool::create_pool(&resolved.db_config).await?;
            let result = match command {
                OutboxCommands::List => outbox_cmd::run_list(&db_pool).await,
                OutboxCommands::RetryDead => outbox_cmd::run_retry_dead(&db_pool).await,
            };
            db_pool.close().await;
            result?;
        }
    }

    Ok(())
}
