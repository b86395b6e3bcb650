use std::sync::Arc;

use anyhow::Context;

use stockledger_infra::LedgerConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    stockledger_observability::init();

    let config = LedgerConfig::from_env().context("invalid configuration")?;

    let services = stockledger_api::app::services::build_services(&config)
        .await
        .context("failed to initialise ledger storage")?;
    let app = stockledger_api::app::build_app(Arc::new(services));

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr))?;

    tracing::info!("listening on {}", listener.local_addr()?);

    axum::serve(listener, app).await?;
    Ok(())
}
