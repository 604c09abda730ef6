use std::env;

use anyhow::{Context, Result};
use club_api::build_app;
use club_observability::init_tracing;

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing("club_api");

    let catalog_path =
        env::var("CLUB_CATALOG_PATH").unwrap_or_else(|_| "data/catalog.json".to_string());
    let bind = env::var("CLUB_BIND").unwrap_or_else(|_| "0.0.0.0:8080".to_string());

    let app = build_app(&catalog_path).await?;

    let listener = tokio::net::TcpListener::bind(&bind)
        .await
        .with_context(|| format!("failed to bind {bind}"))?;
    tracing::info!(bind = %bind, catalog = %catalog_path, "motion design club api started");

    axum::serve(listener, app).await?;
    Ok(())
}
