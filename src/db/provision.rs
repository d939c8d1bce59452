use crate::db::models::PacsStudy;
use crate::db::postgres::{self, PacsStorage};
use crate::db::schema::{self, INDEXES};
use crate::error::SetupError;
use crate::instance::InstanceConfig;
use sqlx::Connection;
use std::time::Duration;
use tracing::{debug, info, warn};

/// What `provision_schema` found and changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProvisionReport {
    pub database_existed: bool,
    pub rows_before: i64,
    pub sample_inserted: bool,
    pub rows_after: i64,
    /// `idx_*` indexes found on the table after provisioning.
    pub indexes: usize,
}

/// Re-tag a storage error with the step that raised it.
fn at<'a>(step: &'a str, user: &'a str) -> impl FnOnce(SetupError) -> SetupError + 'a {
    move |e| match e {
        SetupError::Database(source) => SetupError::at_step(step, source, user),
        other => other,
    }
}

/// Create the target database if missing, then the extension, schema, table
/// and indexes, and seed one row into an empty table. Safe to re-run.
pub async fn provision_schema(
    config: &InstanceConfig,
    settle_delay: Duration,
) -> Result<ProvisionReport, SetupError> {
    let user = config.user.as_str();
    let database = config.database.as_str();
    info!("Starting database setup");

    debug!(host = %config.host, port = config.port, "Connecting to default postgres database");
    let mut admin = postgres::connect(&config.admin_connect_options())
        .await
        .map_err(|e| SetupError::at_step("connect to postgres database", e, user))?;
    info!("Connected to PostgreSQL");

    let database_existed: bool =
        sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM pg_database WHERE datname = $1)")
            .bind(database)
            .fetch_one(&mut admin)
            .await
            .map_err(|e| SetupError::at_step("check for existing database", e, user))?;

    if database_existed {
        info!(database, "Database already exists");
        admin.close().await?;
    } else {
        info!(database, "Creating database");
        let ddl = schema::create_database(database, user)?;
        sqlx::query(&ddl)
            .execute(&mut admin)
            .await
            .map_err(|e| SetupError::at_step("create database", e, user))?;
        admin.close().await?;
        info!(database, delay = ?settle_delay, "Database created; waiting for it to be ready");
        tokio::time::sleep(settle_delay).await;
    }

    let conn = postgres::connect(&config.target_connect_options())
        .await
        .map_err(|e| SetupError::at_step("connect to target database", e, user))?;
    info!(database, "Connected to target database");

    let mut storage = PacsStorage::new(conn, &config.schema, &config.table);
    let report = seed(&mut storage, user, database_existed).await?;
    storage.close().await.map_err(at("close connection", user))?;

    info!(
        rows = report.rows_after,
        sample_inserted = report.sample_inserted,
        "Database setup complete"
    );
    Ok(report)
}

async fn seed(
    storage: &mut PacsStorage,
    user: &str,
    database_existed: bool,
) -> Result<ProvisionReport, SetupError> {
    storage
        .create_extension()
        .await
        .map_err(at("create citext extension", user))?;
    info!("Extensions created");

    storage
        .create_schema()
        .await
        .map_err(at("create schema", user))?;
    info!("Schema created");

    storage
        .create_table()
        .await
        .map_err(at("create table", user))?;
    info!("Table created");

    for (index, column) in INDEXES {
        debug!(index, "Creating index");
        let step = format!("create index {index}");
        storage
            .create_index(index, column)
            .await
            .map_err(at(&step, user))?;
    }
    info!(count = INDEXES.len(), "All indexes created");

    let rows_before = storage.count().await.map_err(at("count rows", user))?;
    let sample_inserted = if rows_before == 0 {
        let inserted = storage
            .insert_if_absent(&PacsStudy::sample())
            .await
            .map_err(at("insert sample data", user))?;
        info!(inserted, "Sample data added");
        inserted
    } else {
        info!(rows = rows_before, "Table already populated; skipping sample data");
        false
    };

    let rows_after = storage.count().await.map_err(at("verify data", user))?;
    info!(rows = rows_after, "Verified records in database");

    let indexes = storage
        .index_names()
        .await
        .map_err(at("verify indexes", user))?;
    if indexes.len() < INDEXES.len() {
        warn!(found = ?indexes, expected = INDEXES.len(), "Missing indexes on table");
    } else {
        info!(count = indexes.len(), "Verified indexes");
    }

    Ok(ProvisionReport {
        database_existed,
        rows_before,
        sample_inserted,
        rows_after,
        indexes: indexes.len(),
    })
}
