use anyhow::{Context, Result};
use sqlx::postgres::PgPoolOptions;
use sqlx::{Executor, PgPool};
use tracing::{debug, info};

use crate::config::DbConfig;

/// Migrations embedded at compile time from `crates/pladivo-db/migrations/`.
pub static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!();

/// Pool options carrying the configured size and acquire timeout.
fn pool_options(config: &DbConfig) -> PgPoolOptions {
    PgPoolOptions::new()
        .max_connections(config.max_connections)
        .acquire_timeout(config.acquire_timeout)
}

pub async fn create_pool(config: &DbConfig) -> Result<PgPool> {
    let pool = pool_options(config)
        .connect(&config.database_url)
        .await
        .with_context(|| format!("failed to connect to database at {}", config.database_url))?;
    debug!(
        max_connections = config.max_connections,
        acquire_timeout_secs = config.acquire_timeout.as_secs(),
        "database pool ready"
    );
    Ok(pool)
}

pub async fn run_migrations(pool: &PgPool) -> Result<()> {
    MIGRATOR
        .run(pool)
        .await
        .context("failed to run database migrations")?;
    info!(count = MIGRATOR.iter().count(), "pladivo migrations applied");
    Ok(())
}

/// Quote a database name for use in `CREATE DATABASE`.
///
/// Control characters and empty names are refused.
pub fn quote_identifier(name: &str) -> Result<String> {
    if name.is_empty() || name.chars().any(char::is_control) {
        anyhow::bail!("database name {name:?} is not a valid identifier");
    }
    Ok(format!("\"{}\"", name.replace('"', "\"\"")))
}

/// Create the database named in `config` on its server when absent.
///
/// Returns `true` when the database was created by this call. The
/// maintenance connection uses the configured acquire timeout and a single
/// connection regardless of the pool size.
pub async fn ensure_database_exists(config: &DbConfig) -> Result<bool> {
    let db_name = config
        .database_name()
        .context("could not determine database name from URL")?;
    let maintenance_url = config.maintenance_url();

    let maint_pool = pool_options(config)
        .max_connections(1)
        .connect(&maintenance_url)
        .await
        .with_context(|| format!("failed to connect to maintenance database at {maintenance_url}"))?;

    let result = create_if_missing(&maint_pool, db_name).await;
    maint_pool.close().await;
    result
}

async fn create_if_missing(maint_pool: &PgPool, db_name: &str) -> Result<bool> {
    let exists: bool =
        sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM pg_database WHERE datname = $1)")
            .bind(db_name)
            .fetch_one(maint_pool)
            .await
            .context("failed to query pg_database")?;
    if exists {
        info!(db = db_name, "pladivo database already exists");
        return Ok(false);
    }

    let stmt = format!("CREATE DATABASE {}", quote_identifier(db_name)?);
    maint_pool
        .execute(stmt.as_str())
        .await
        .with_context(|| format!("failed to create database {db_name}"))?;
    info!(db = db_name, "pladivo database created");
    Ok(true)
}

/// Row counts of the application tables, skipping the migration ledger.
///
/// Printed by `pladivo db-init` once migrations have run.
pub async fn table_counts(pool: &PgPool) -> Result<Vec<(String, i64)>> {
    let tables: Vec<String> = sqlx::query_scalar(
        "SELECT tablename::text FROM pg_tables \
         WHERE schemaname = 'public' AND tablename <> '_sqlx_migrations' \
         ORDER BY tablename",
    )
    .fetch_all(pool)
    .await
    .context("failed to list tables")?;

    let mut counts = Vec::with_capacity(tables.len());
    for table in tables {
        let query = format!("SELECT COUNT(*) FROM {}", quote_identifier(&table)?);
        let count: i64 = sqlx::query_scalar(&query)
            .fetch_one(pool)
            .await
            .with_context(|| format!("failed to count rows in {table}"))?;
        counts.push((table, count));
    }
    Ok(counts)
}
