use std::io;

use mock_graph::{MockConfig, MockGraph};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

fn lag_from_env(key: &str) -> io::Result<u32> {
    match std::env::var(key) {
        Ok(raw) => raw
            .parse()
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, format!("{key}={raw}: {e}"))),
        Err(_) => Ok(0),
    }
}

#[tokio::main]
async fn main() -> Result<(), io::Error> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = MockConfig {
        create_lag: lag_from_env("MOCK_CREATE_LAG")?,
        update_lag: lag_from_env("MOCK_UPDATE_LAG")?,
        ..MockConfig::default()
    };
    let port = std::env::var("PORT").unwrap_or_else(|_| "3000".to_string());
    let addr = format!("127.0.0.1:{port}");
    let listener = TcpListener::bind(&addr).await?;
    MockGraph::with_default_templates(config).run(listener).await
}
