//! Dependency wiring and lifecycle of the running services

use crate::settings::Settings;
use anyhow::{anyhow, Result};
use portability_api_rpc::server::{RpcServerConfig, ServerHandle};
use portability_api_rpc::{RpcHandler, RpcServer};
use portability_core::application::worker::constants::CANCEL_POLL_INTERVAL;
use portability_core::application::{
    signal_channel, ExtensionContext, ExtensionFactory, ExtensionRegistry, JobLifecycleService,
    OauthCallbackHandler, RecoveryService, SignalSender, TransferPipeline, Worker,
};
use portability_core::port::app_credentials::EnvAppCredentialStore;
use portability_core::port::id_provider::UuidProvider;
use portability_core::port::time_provider::SystemTimeProvider;
use portability_gateway::{GatewayConfig, GatewayServer};
use portability_infra_sqlite::{create_pool, run_migrations, SqliteStore};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

const WORKER_STOP_TIMEOUT: Duration = Duration::from_secs(5);

/// Handles to everything `start` spawned
pub struct RunningApp {
    pub rpc_addr: SocketAddr,
    pub gateway_addr: SocketAddr,
    store: Arc<SqliteStore>,
    shutdown: SignalSender,
    rpc_handle: ServerHandle,
    gateway_handle: JoinHandle<()>,
    worker_handles: Vec<JoinHandle<()>>,
}

impl RunningApp {
    pub fn store(&self) -> Arc<SqliteStore> {
        self.store.clone()
    }

    /// Stop accepting requests, let running transfers finish, then return
    pub async fn shutdown(self) -> Result<()> {
        info!("Shutting down");
        self.shutdown.raise();
        self.rpc_handle
            .stop()
            .map_err(|e| anyhow!("RPC server stop failed: {}", e))?;
        if let Err(e) = self.gateway_handle.await {
            warn!(error = %e, "Gateway task ended abnormally");
        }
        for handle in self.worker_handles {
            if tokio::time::timeout(WORKER_STOP_TIMEOUT, handle).await.is_err() {
                warn!("Worker did not stop in time");
            }
        }
        info!("Shutdown complete");
        Ok(())
    }
}

/// Open the store, initialize extensions and start every service
///
/// One daemon per database: transfers found TRANSFER_IN_PROGRESS at startup
/// are treated as orphaned by a crash and resumed.
pub async fn start(settings: &Settings, extensions: Vec<Box<dyn ExtensionFactory>>) -> Result<RunningApp> {
    info!(db_path = %settings.db_path, "Initializing database");
    if !settings.db_path.contains(":memory:") {
        if let Some(parent) = std::path::Path::new(&settings.db_path).parent() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let pool = create_pool(&settings.db_path)
        .await
        .map_err(|e| anyhow!("DB pool creation failed: {}", e))?;
    run_migrations(&pool)
        .await
        .map_err(|e| anyhow!("Migration failed: {}", e))?;

    let time_provider = Arc::new(SystemTimeProvider);
    let id_provider = Arc::new(UuidProvider);
    let store = Arc::new(SqliteStore::new(pool, time_provider.clone()));

    let registry = Arc::new(ExtensionRegistry::new(extensions));
    registry.initialize(&ExtensionContext {
        temp_store: store.clone(),
        app_credentials: Arc::new(EnvAppCredentialStore),
        base_url: settings.base_url.clone(),
        base_api_url: settings.base_api_url.clone(),
    });
    let services = registry.services();
    if services.is_empty() {
        warn!("No extensions registered; job creation will be rejected");
    } else {
        info!(services = ?services, "Extensions registered");
    }

    let retry_library = Arc::new(settings.retry_library()?);
    let pipeline = Arc::new(TransferPipeline::new(
        store.clone(),
        registry.clone(),
        store.clone(),
        retry_library,
        time_provider.clone(),
        CANCEL_POLL_INTERVAL,
    ));

    let (shutdown_tx, shutdown_rx) = signal_channel();

    let workers: Vec<Arc<Worker>> = (0..settings.workers.max(1))
        .map(|i| {
            Arc::new(
                Worker::new(
                    format!("worker-{}", i),
                    store.clone(),
                    pipeline.clone(),
                    time_provider.clone(),
                )
                .with_idle_sleep(settings.poll_interval),
            )
        })
        .collect();

    // Runs beside the workers, which only claim IMPORT_AUTH_COMPLETE jobs
    let recovery = RecoveryService::new(store.clone(), workers[0].clone());
    let recovery_handle = tokio::spawn(async move {
        match recovery.resume_interrupted_jobs().await {
            Ok(count) => info!(resumed_jobs = count, "Crash recovery completed"),
            Err(e) => error!(error = %e, "Crash recovery failed"),
        }
    });

    let mut worker_handles = Vec::with_capacity(workers.len() + 1);
    worker_handles.push(recovery_handle);
    for worker in workers {
        let shutdown = shutdown_rx.clone();
        worker_handles.push(tokio::spawn(async move {
            if let Err(e) = worker.run(shutdown).await {
                error!(error = %e, "Worker failed");
            }
        }));
    }

    let lifecycle = Arc::new(JobLifecycleService::new(
        store.clone(),
        registry.clone(),
        id_provider,
        time_provider.clone(),
        settings.base_api_url.clone(),
    ));
    let (rpc_addr, rpc_handle) = RpcServer::new(
        RpcServerConfig {
            host: settings.rpc_host.clone(),
            port: settings.rpc_port,
        },
        Arc::new(RpcHandler::new(lifecycle)),
    )
    .start()
    .await
    .map_err(|e| anyhow!("RPC server start failed: {}", e))?;

    let callback = Arc::new(OauthCallbackHandler::new(
        store.clone(),
        registry,
        time_provider,
        settings.base_url.clone(),
        settings.base_api_url.clone(),
    ));
    let (gateway_addr, gateway_handle) = GatewayServer::new(
        GatewayConfig {
            host: settings.gateway_host.clone(),
            port: settings.gateway_port,
        },
        callback,
    )
    .start(shutdown_rx)
    .await
    .map_err(|e| anyhow!("Gateway start failed: {}", e))?;

    Ok(RunningApp {
        rpc_addr,
        gateway_addr,
        store,
        shutdown: shutdown_tx,
        rpc_handle,
        gateway_handle,
        worker_handles,
    })
}
