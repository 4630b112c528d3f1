//! rainsd binary
//!
//! A caching RAINS resolver daemon.

use rainsd::{Server, ServerConfig};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "rainsd=info,rains_engine=info,rains_cache=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting rainsd");

    let config = ServerConfig::from_env();
    let server = Server::new(config);
    server.run().await?;

    Ok(())
}
