//! Static host for the built single-page bundle.
//!
//! Existing files under the asset directory are served as-is; every other
//! path gets `index.html`, so client-side routes resolve on reload.

use crate::error::{Error, Result};
use axum::Router;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use tower_http::services::{ServeDir, ServeFile};
use tower_http::trace::TraceLayer;
use tracing::info;

/// Host configuration.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServerConfig {
    /// Asset directory holding `index.html`.
    pub dir: PathBuf,
    pub addr: SocketAddr,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("./dist"),
            addr: SocketAddr::from(([0, 0, 0, 0], 3000)),
        }
    }
}

impl ServerConfig {
    /// Read configuration from environment variables.
    ///
    /// - `SWITCHBOARD_STATIC_DIR`: asset directory (default: "./dist")
    /// - `SWITCHBOARD_ADDR`: listen address (default: "0.0.0.0:3000")
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        let dir = std::env::var("SWITCHBOARD_STATIC_DIR")
            .map(PathBuf::from)
            .unwrap_or(defaults.dir);

        let addr = match std::env::var("SWITCHBOARD_ADDR") {
            Ok(addr) => addr
                .parse()
                .map_err(|e| Error::Config(format!("SWITCHBOARD_ADDR {addr:?}: {e}")))?,
            Err(_) => defaults.addr,
        };

        Ok(Self { dir, addr })
    }
}

/// Router serving `dir`, falling back to `dir/index.html`.
pub fn router(dir: impl AsRef<Path>) -> Router {
    let dir = dir.as_ref();
    let serve_dir = ServeDir::new(dir).fallback(ServeFile::new(dir.join("index.html")));

    Router::new()
        .fallback_service(serve_dir)
        .layer(TraceLayer::new_for_http())
}

/// Bind `config.addr` and serve until the task is dropped.
pub async fn serve(config: ServerConfig) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(config.addr).await?;
    info!(
        "Serving {} on {}",
        config.dir.display(),
        listener.local_addr()?
    );
    axum::serve(listener, router(&config.dir)).await
}
