use std::sync::Arc;

use anyhow::Context;

use bloodline_api::app::{self, services::AppServices};
use bloodline_api::config::ApiConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = ApiConfig::from_env()?;
    bloodline_observability::tracing::init(config.log_format);

    let jwt_secret = config.jwt_secret.clone().unwrap_or_else(|| {
        tracing::warn!("JWT_SECRET not set; using insecure dev default");
        "dev-secret".to_string()
    });

    let services = match &config.database_url {
        Some(url) => AppServices::postgres(url, config.default_bank_units)
            .await
            .context("failed to initialise Postgres store")?,
        None => {
            tracing::info!("DATABASE_URL not set; using in-memory store");
            AppServices::in_memory(config.default_bank_units)
        }
    };

    let app = app::build_app(jwt_secret, Arc::new(services));

    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr))?;

    tracing::info!("listening on {}", listener.local_addr()?);

    axum::serve(listener, app).await?;
    Ok(())
}
