use std::net::SocketAddr;

use tracing::info;

use campuslink_relay::dispatcher::Dispatcher;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "campuslink_relay=debug,tower_http=debug".into()),
        )
        .init();

    // Config
    let host = std::env::var("CAMPUSLINK_RELAY_HOST").unwrap_or_else(|_| "127.0.0.1".into());
    let port: u16 = std::env::var("CAMPUSLINK_RELAY_PORT")
        .unwrap_or_else(|_| "8000".into())
        .parse()?;

    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("CampusLink relay listening on ws://{}/ws/chat/{{conversation_id}}/", addr);

    campuslink_relay::serve(listener, Dispatcher::new()).await?;

    Ok(())
}
