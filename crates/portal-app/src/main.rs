use std::sync::Arc;

use portal_cache::{build_store, LocalCache};
use portal_client::RemoteOrderGateway;
use portal_sync::application::portal::PortalService;
use portal_sync::config::Config;
use portal_sync::inbound::http::{HttpServer, HttpServerConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env for ORDERS_ENDPOINT_URL / SERVER_PORT when present.
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt()
        .with_env_filter(std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()))
        .init();

    let config = Config::from_env()?;
    let store = build_store(config.cache_url.as_deref()).await?;
    tracing::info!(backend = store.backend(), "order snapshot store ready");
    let cache = Arc::new(LocalCache::new(store));

    let mut builder = RemoteOrderGateway::builder(&config.orders_endpoint_url)?
        .with_timeout(config.request_timeout())
        .with_jsonp_timeout(config.jsonp_timeout())
        .with_order_limit(config.order_limit)
        .with_cache(cache);
    if let Some(proxy) = &config.proxy_url {
        builder = builder.with_proxy(proxy)?;
    }
    if let Some(secret) = &config.api_secret {
        builder = builder.with_header("X-API-Secret", secret)?;
    }
    if let Some(token) = &config.auth_token {
        builder = builder.with_header("Authorization", format!("Bearer {token}"))?;
    }
    let gateway = Arc::new(builder.build()?);

    let service = Arc::new(PortalService::new(gateway, config.sync_settings()));
    if !service.start().await {
        tracing::info!("background polling disabled");
    }

    let server_cfg = HttpServerConfig {
        port: config.server_port.clone(),
    };

    let http = HttpServer::new(service, server_cfg).await?;
    http.run().await
}
