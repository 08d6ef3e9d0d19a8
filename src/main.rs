#[cfg(feature = "ssr")]
#[tokio::main]
async fn main() {
    use std::net::SocketAddr;
    use std::sync::Arc;

    use taskauth::core::config::Config;
    use taskauth::core::db::InMemoryUserStore;
    use taskauth::core::server::{auth_service_from_config, build_router};
    use tracing_subscriber::EnvFilter;

    // Load .env file (if exists)
    let _ = dotenvy::dotenv();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Invalid configuration: {}", e);
            std::process::exit(1);
        }
    };

    // RUST_LOG wins over LOG_LEVEL
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_level.as_str()));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    if let Err(e) = config.validate() {
        tracing::error!("Refusing to start: {}", e);
        std::process::exit(1);
    }

    tracing::info!(
        "Config loaded: environment={:?}, access_ttl={}s, refresh_ttl={}s, rotation={}",
        config.environment,
        config.jwt.access_ttl.num_seconds(),
        config.jwt.refresh_ttl.num_seconds(),
        config.enforce_refresh_rotation
    );

    let auth_service = auth_service_from_config(&config, Arc::new(InMemoryUserStore::new()));
    let app = build_router(&config, auth_service);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!("Failed to bind {}: {}", addr, e);
            std::process::exit(1);
        }
    };

    tracing::info!("listening on http://{}", addr);

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for shutdown signal: {}", e);
        }
        tracing::info!("Shutting down");
    };

    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
    {
        tracing::error!("Server error: {}", e);
        std::process::exit(1);
    }
}

#[cfg(not(feature = "ssr"))]
pub fn main() {
    // the server binary needs the `ssr` feature; the library's `client` module
    // is usable on its own
}
