use anyhow::Context;

use dbadmin_infra::AppConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::from_env().context("invalid configuration")?;
    dbadmin_observability::init(config.log_format);

    let services = dbadmin_api::app::build_services(&config)
        .await
        .context("failed to build services")?;
    let app = dbadmin_api::app::build_app(services);

    let listener = tokio::net::TcpListener::bind(config.bind)
        .await
        .with_context(|| format!("failed to bind {}", config.bind))?;

    tracing::info!("listening on {}", listener.local_addr()?);

    axum::serve(listener, app).await?;
    Ok(())
}
