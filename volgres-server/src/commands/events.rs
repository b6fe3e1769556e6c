use anyhow::Result;
use sqlx::postgres::PgPoolOptions;

use volgres_engine::EventStore;
use volgres_models::quantity::format_bytes;

use crate::config::Config;

pub async fn run_events(cluster: String, limit: i64, output: String) -> Result<()> {
    let config = Config::load()?;

    let pool = PgPoolOptions::new()
        .max_connections(1)
        .connect(&config.database_url)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to connect to database: {}", e))?;

    let store = EventStore::new(pool);
    let events = store.load_latest(&cluster, limit).await?;

    if output == "json" {
        println!("{}", serde_json::to_string_pretty(&events)?);
        return Ok(());
    }

    // Table format
    println!(
        "{:<22} {:<28} {:<9} {:<18} {}",
        "TIME", "VOLUME", "RESULT", "SIZE", "REASON"
    );
    println!("{}", "-".repeat(110));

    for event in &events {
        let size = if event.result == volgres_models::ResizeResult::Blocked {
            format_bytes(event.old_size_bytes.max(0) as u64)
        } else {
            format!(
                "{} -> {}",
                format_bytes(event.old_size_bytes.max(0) as u64),
                format_bytes(event.new_size_bytes.max(0) as u64)
            )
        };

        println!(
            "{:<22} {:<28} {:<9} {:<18} {}",
            event.occurred_at.format("%Y-%m-%d %H:%M:%S"),
            event.identity().to_string(),
            event.result.to_string(),
            size,
            event.reason
        );
    }

    println!();
    println!("{} event(s) found", events.len());

    Ok(())
}
