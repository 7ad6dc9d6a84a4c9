use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), std::io::Error> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let port = std::env::var("PORT").unwrap_or_else(|_| "3000".to_string());
    let quota_bytes = std::env::var("MOCK_QUOTA_BYTES")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(mock_server::DEFAULT_QUOTA_BYTES);
    let addr = format!("127.0.0.1:{port}");
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!(
        %addr,
        anon_key = mock_server::ANON_KEY,
        service_key = mock_server::SERVICE_KEY,
        "mock WowSQL API listening"
    );
    mock_server::run_with(listener, mock_server::MockConfig { quota_bytes }).await
}
