//! Dairy Logistics - Axum Server

use anyhow::{Context, Result};
use tracing_subscriber::EnvFilter;

use dairy_logistics::config::Config;
use dairy_logistics::{api, console};

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env().context("failed to load configuration")?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("dairy_logistics=info")),
        )
        .init();

    if config.console_output {
        console::print_banner();
    }

    let addr = config.bind_addr;
    let app = api::create_router(config);
    println!("Server listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    axum::serve(listener, app).await.context("server error")?;
    Ok(())
}
