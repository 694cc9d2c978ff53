use std::sync::Arc;

use anyhow::Context;
use warden_api::ServerConfig;
use warden_auth::{AuthConfig, AuthorizationGuard};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    warden_observability::init();

    let auth = AuthConfig::from_env().context("invalid AUTH_* configuration")?;
    let server = ServerConfig::from_env().context("invalid SERVER_* configuration")?;

    tracing::info!(
        domain = %auth.domain,
        audience = %auth.audience,
        jwks_url = %auth.jwks_url(),
        algorithms = ?auth.algorithms,
        "authorization gate configured"
    );

    let guard = Arc::new(AuthorizationGuard::from_config(&auth));

    // Warm the key cache; a failure here is retried on the first request.
    if let Err(err) = guard.key_store().refresh().await {
        tracing::warn!(error = %err, "initial key set fetch failed");
    }

    let app = warden_api::app::build_app(guard);

    let listener = tokio::net::TcpListener::bind(&server.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", server.bind_addr))?;

    tracing::info!("listening on {}", listener.local_addr()?);

    axum::serve(listener, app).await?;
    Ok(())
}
