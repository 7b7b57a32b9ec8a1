//! JSON-RPC Server
//!
//! Serves the control plane over HTTP/WebSocket via jsonrpsee.

use crate::handler::RpcHandler;
use crate::types::{CancelRequest, CreateTransferRequest, GetJobRequest, InitiateAuthRequest};
use jsonrpsee::server::Server;
pub use jsonrpsee::server::ServerHandle;
use jsonrpsee::RpcModule;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::info;

const DEFAULT_RPC_HOST: &str = "127.0.0.1";
const DEFAULT_RPC_PORT: u16 = 9527;

/// RPC Server Configuration
#[derive(Debug, Clone)]
pub struct RpcServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for RpcServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_RPC_HOST.to_string(),
            port: DEFAULT_RPC_PORT,
        }
    }
}

/// RPC Server
pub struct RpcServer {
    config: RpcServerConfig,
    handler: Arc<RpcHandler>,
}

impl RpcServer {
    pub fn new(config: RpcServerConfig, handler: Arc<RpcHandler>) -> Self {
        Self { config, handler }
    }

    /// Register every control plane method
    pub fn module(handler: Arc<RpcHandler>) -> Result<RpcModule<()>, String> {
        let mut module = RpcModule::new(());

        let h = handler.clone();
        module
            .register_async_method("transfer.create.v1", move |params, _, _| {
                let handler = h.clone();
                async move {
                    let req: CreateTransferRequest = params.parse()?;
                    handler.create_transfer(req).await
                }
            })
            .map_err(|e| e.to_string())?;

        let h = handler.clone();
        module
            .register_async_method("auth.initiate.v1", move |params, _, _| {
                let handler = h.clone();
                async move {
                    let req: InitiateAuthRequest = params.parse()?;
                    handler.initiate_auth(req).await
                }
            })
            .map_err(|e| e.to_string())?;

        let h = handler.clone();
        module
            .register_async_method("job.get.v1", move |params, _, _| {
                let handler = h.clone();
                async move {
                    let req: GetJobRequest = params.parse()?;
                    handler.get_job(req).await
                }
            })
            .map_err(|e| e.to_string())?;

        let h = handler;
        module
            .register_async_method("job.cancel.v1", move |params, _, _| {
                let handler = h.clone();
                async move {
                    let req: CancelRequest = params.parse()?;
                    handler.cancel(req).await
                }
            })
            .map_err(|e| e.to_string())?;

        Ok(module)
    }

    /// Start the JSON-RPC server
    ///
    /// Returns the bound address (useful with port 0) and the server handle.
    pub async fn start(self) -> Result<(SocketAddr, ServerHandle), String> {
        let addr = format!("{}:{}", self.config.host, self.config.port);

        info!(
            host = %self.config.host,
            port = %self.config.port,
            "Starting JSON-RPC server"
        );

        let server = Server::builder()
            .build(&addr)
            .await
            .map_err(|e| format!("Failed to build server on {}: {}", addr, e))?;

        let local_addr = server
            .local_addr()
            .map_err(|e| format!("Failed to read bound address: {}", e))?;
        let module = Self::module(self.handler)?;
        let handle = server.start(module);

        info!(addr = %local_addr, "JSON-RPC server started successfully");
        Ok((local_addr, handle))
    }
}
