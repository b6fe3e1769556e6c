use anyhow::{Context, Result};

/// Initialize the event schema in the database
pub async fn initialize_schema(db_url: &str) -> Result<()> {
    use sqlx::postgres::PgPoolOptions;

    // Connect to database
    let pool = PgPoolOptions::new()
        .max_connections(1)
        .connect(db_url)
        .await
        .context("Failed to connect to database for schema initialization")?;

    // Create schema if it doesn't exist
    sqlx::query("CREATE SCHEMA IF NOT EXISTS volgres")
        .execute(&pool)
        .await
        .context("Failed to create volgres schema")?;

    // Enum types; CREATE TYPE has no IF NOT EXISTS
    sqlx::query(
        "DO $$ BEGIN
             CREATE TYPE volume_role AS ENUM ('data', 'wal', 'tablespace');
         EXCEPTION WHEN duplicate_object THEN NULL;
         END $$",
    )
    .execute(&pool)
    .await
    .context("Failed to create volume_role type")?;

    sqlx::query(
        "DO $$ BEGIN
             CREATE TYPE resize_result AS ENUM ('success', 'failed', 'blocked');
         EXCEPTION WHEN duplicate_object THEN NULL;
         END $$",
    )
    .execute(&pool)
    .await
    .context("Failed to create resize_result type")?;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS volgres.resize_events (
             id BIGSERIAL PRIMARY KEY,
             cluster TEXT NOT NULL,
             instance TEXT NOT NULL,
             pvc_name TEXT NOT NULL,
             role volume_role NOT NULL,
             tablespace TEXT,
             old_size_bytes BIGINT NOT NULL,
             new_size_bytes BIGINT NOT NULL,
             reason TEXT NOT NULL,
             result resize_result NOT NULL,
             occurred_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
         )",
    )
    .execute(&pool)
    .await
    .context("Failed to create resize_events table")?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS resize_events_cluster_time
         ON volgres.resize_events (cluster, occurred_at DESC)",
    )
    .execute(&pool)
    .await
    .context("Failed to create resize_events index")?;

    tracing::info!("✓ Event schema ready");

    Ok(())
}

/// Verify that the event table exists
pub async fn verify_tables(db_url: &str) -> Result<()> {
    use sqlx::postgres::PgPoolOptions;

    // Connect to database
    let pool = PgPoolOptions::new()
        .max_connections(1)
        .connect(db_url)
        .await
        .context("Failed to connect to database for table verification")?;

    // Check if the events table exists
    let result: Option<(bool,)> = sqlx::query_as(
        "SELECT EXISTS (
            SELECT FROM information_schema.tables
            WHERE table_schema = 'volgres'
            AND table_name = 'resize_events'
        )",
    )
    .fetch_optional(&pool)
    .await
    .context("Failed to check if event tables exist")?;

    match result {
        Some((true,)) => {
            tracing::info!("✓ Event tables verified");
            Ok(())
        }
        _ => {
            anyhow::bail!(
                "Event tables not found. Run 'volgres-server serve' once with a \
                 DATABASE_URL that permits DDL, or create the volgres schema manually."
            )
        }
    }
}
