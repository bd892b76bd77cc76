//! Metadata store: `function` and `deployment` rows, backed by SQLite.
//!
//! Every connection enables foreign keys explicitly — SQLite defaults
//! them off per-connection, so the cascade/set-null behavior in the
//! schema only holds if every pool member turns them on.

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{FromRow, SqlitePool};
use thiserror::Error;

use crate::config::Config;
use crate::id::{new_deployment_id, new_function_id};

/// Failures talking to the metadata store.
#[derive(Error, Debug)]
pub enum StorageError {
    /// A query or connection failure from the underlying database driver.
    #[error("storage error: {0}")]
    Database(#[from] sqlx::Error),
    /// Applying pending schema migrations at startup failed.
    #[error("storage error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

/// Result type for metadata store operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// A persisted function: its identity and a pointer to its live deployment.
#[derive(Debug, Clone, FromRow, serde::Serialize)]
pub struct FunctionRow {
    /// Function id, `fn-<ulid>`.
    pub id: String,
    /// Function name.
    pub name: String,
    /// Id of the deployment currently answering this function's invocations, if any.
    pub live_deployment_id: Option<String>,
    /// Creation timestamp, ISO-8601 UTC.
    pub created_at: String,
    /// Last-updated timestamp, ISO-8601 UTC.
    pub updated_at: String,
}

/// A persisted, immutable deployment of a function's source.
#[derive(Debug, Clone, FromRow, serde::Serialize)]
pub struct DeploymentRow {
    /// Deployment id, `dp-<ulid>`.
    pub id: String,
    /// Id of the function this deployment belongs to.
    pub function_id: String,
    /// The deployed ES module source.
    pub source: String,
    /// Creation timestamp, ISO-8601 UTC.
    pub created_at: String,
    /// Last-updated timestamp, ISO-8601 UTC.
    pub updated_at: String,
}

/// Open the database (creating the file if missing), enable foreign keys
/// on every pooled connection, and apply pending migrations.
pub async fn connect(config: &Config) -> StorageResult<SqlitePool> {
    let options: SqliteConnectOptions = config.db_url().parse::<SqliteConnectOptions>()?.foreign_keys(true);

    let pool = SqlitePoolOptions::new().connect_with(options).await?;

    sqlx::migrate!("./migrations").run(&pool).await?;

    Ok(pool)
}

/// Insert a new function row with the given name.
pub async fn create_function(pool: &SqlitePool, name: &str) -> StorageResult<FunctionRow> {
    let id = new_function_id();
    sqlx::query("INSERT INTO function (id, name) VALUES (?, ?)")
        .bind(&id)
        .bind(name)
        .execute(pool)
        .await?;

    get_function(pool, &id)
        .await?
        .ok_or_else(|| StorageError::Database(sqlx::Error::RowNotFound))
}

/// List every function, most recently created first.
pub async fn list_functions(pool: &SqlitePool) -> StorageResult<Vec<FunctionRow>> {
    let rows = sqlx::query_as::<_, FunctionRow>(
        "SELECT id, name, live_deployment_id, created_at, updated_at FROM function ORDER BY created_at DESC",
    )
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

/// Fetch a function by id, if it exists.
pub async fn get_function(pool: &SqlitePool, id: &str) -> StorageResult<Option<FunctionRow>> {
    let row = sqlx::query_as::<_, FunctionRow>(
        "SELECT id, name, live_deployment_id, created_at, updated_at FROM function WHERE id = ?",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

/// Create a new deployment for `function_id` and make it the function's
/// live deployment. Returns `None` if the function does not exist.
pub async fn create_deployment(
    pool: &SqlitePool,
    function_id: &str,
    source: &str,
) -> StorageResult<Option<DeploymentRow>> {
    if get_function(pool, function_id).await?.is_none() {
        return Ok(None);
    }

    let id = new_deployment_id();
    let mut tx = pool.begin().await?;

    sqlx::query("INSERT INTO deployment (id, function_id, source) VALUES (?, ?, ?)")
        .bind(&id)
        .bind(function_id)
        .bind(source)
        .execute(&mut *tx)
        .await?;

    sqlx::query(
        "UPDATE function SET live_deployment_id = ?, updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now') WHERE id = ?",
    )
    .bind(&id)
    .bind(function_id)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;

    let row = get_deployment(pool, &id).await?;
    Ok(row)
}

/// Fetch a deployment by id, if it exists.
pub async fn get_deployment(pool: &SqlitePool, id: &str) -> StorageResult<Option<DeploymentRow>> {
    let row = sqlx::query_as::<_, DeploymentRow>(
        "SELECT id, function_id, source, created_at, updated_at FROM deployment WHERE id = ?",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

/// Fetch the live deployment for a function, if it has one deployed.
pub async fn get_live_deployment(
    pool: &SqlitePool,
    function_id: &str,
) -> StorageResult<Option<DeploymentRow>> {
    let row = sqlx::query_as::<_, DeploymentRow>(
        "SELECT d.id, d.function_id, d.source, d.created_at, d.updated_at
         FROM function f JOIN deployment d ON d.id = f.live_deployment_id
         WHERE f.id = ?",
    )
    .bind(function_id)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}
