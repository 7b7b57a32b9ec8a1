//! Gateway HTTP server

use crate::callback::router;
use portability_core::application::{OauthCallbackHandler, ShutdownToken};
use portability_core::error::Result;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tracing::{error, info};

const DEFAULT_GATEWAY_HOST: &str = "127.0.0.1";
const DEFAULT_GATEWAY_PORT: u16 = 8080;

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub host: String,
    pub port: u16,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_GATEWAY_HOST.to_string(),
            port: DEFAULT_GATEWAY_PORT,
        }
    }
}

pub struct GatewayServer {
    config: GatewayConfig,
    handler: Arc<OauthCallbackHandler>,
}

impl GatewayServer {
    pub fn new(config: GatewayConfig, handler: Arc<OauthCallbackHandler>) -> Self {
        Self { config, handler }
    }

    /// Bind and serve until `shutdown` is raised
    ///
    /// Returns the bound address (useful with port 0) and the serving task.
    pub async fn start(self, mut shutdown: ShutdownToken) -> Result<(SocketAddr, JoinHandle<()>)> {
        let listener =
            TcpListener::bind((self.config.host.as_str(), self.config.port)).await?;
        let addr = listener.local_addr()?;
        info!(addr = %addr, "Gateway listening");

        let app = router(self.handler);
        let handle = tokio::spawn(async move {
            let served = axum::serve(listener, app)
                .with_graceful_shutdown(async move { shutdown.wait().await })
                .await;
            match served {
                Ok(()) => info!("Gateway stopped"),
                Err(e) => error!(error = %e, "Gateway server error"),
            }
        });

        Ok((addr, handle))
    }
}
