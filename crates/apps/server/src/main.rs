//! REST backend for saved maps, their drawn features and markers.

mod auth;
mod config;
mod error;
mod repo;
mod routes;

use std::io;

use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use crate::config::ServerConfig;
use crate::routes::AppState;

#[tokio::main]
async fn main() -> io::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let config = ServerConfig::from_env().map_err(|err| {
        error!("{err}");
        io::Error::new(io::ErrorKind::InvalidInput, err)
    })?;
    let addr = config.addr;
    let app = routes::router(AppState::new(config));

    info!("topomap server listening on http://{addr}");
    axum::serve(tokio::net::TcpListener::bind(addr).await?, app).await
}
