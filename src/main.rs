//! `cidx-serverd`: process entry point. Config loading and the HTTP/CLI
//! adaptor layer are out of scope (§1); this binary wires up `tracing`,
//! bootstraps the default [`cidx_server_core::server::Server`], and blocks
//! on graceful shutdown.

use cidx_server_core::config::ServerConfig;
use cidx_server_core::server::Server;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = ServerConfig::default();
    let server = Server::bootstrap(config).await?;

    tracing::info!(target: "server", "cidx-serverd ready");
    server.run_until_shutdown().await;

    Ok(())
}
