//! Host runtime orchestration.
//!
//! [`ScribeRuntime`] wires the security manager, event bus, loaders,
//! repository client, registry store, and plugin manager together from a
//! [`HostConfig`], serves the gRPC surface, and drives startup and shutdown.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::signal;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use scribe_bus::EventBus;
use scribe_core::{PluginError, PluginResult, RegistryStore};
use scribe_grpc::PluginGrpcService;
use scribe_loader::{RemoteLoader, RemoteLoaderConfig};
use scribe_manager::{FileRegistryStore, ManagerConfig, MemoryRegistryStore, PluginManager};
use scribe_repository::RepositoryClient;
use scribe_security::SecurityManager;

use crate::config::HostConfig;
use crate::logging::LoggingBuilder;

/// Global flag to track if logging has been initialized.
static LOGGING_INITIALIZED: AtomicBool = AtomicBool::new(false);

/// The Scribe host runtime.
///
/// ```rust,ignore
/// let config = scribe_runtime::config::load_config()?;
/// let runtime = ScribeRuntime::new(config)?;
/// runtime.run().await?;
/// ```
pub struct ScribeRuntime {
    config: HostConfig,
    bus: Arc<EventBus>,
    security: Arc<SecurityManager>,
    manager: Arc<PluginManager>,
    repository: Arc<RepositoryClient>,
    grpc_shutdown: CancellationToken,
    running: Arc<RwLock<bool>>,
}

impl ScribeRuntime {
    /// Builds a runtime from the host configuration.
    pub fn new(config: HostConfig) -> PluginResult<Self> {
        Self::init_logging(&config.logging.level);

        let security = Arc::new(SecurityManager::new());
        let bus = Arc::new(EventBus::new());

        let remote = Arc::new(RemoteLoader::new(
            RemoteLoaderConfig {
                cache_root: config.loader.cache_root.clone(),
                max_bundle_size: config.loader.max_bundle_size_bytes,
                connect_timeout: Duration::from_millis(config.loader.connect_timeout_ms),
                read_timeout: Duration::from_millis(config.loader.read_timeout_ms),
                blocked_host_patterns: config.loader.blocked_host_patterns.clone(),
            },
            Arc::clone(&security),
        )?);

        let store: Arc<dyn RegistryStore> = match &config.registry.path {
            Some(path) => Arc::new(FileRegistryStore::open(path)?),
            None => Arc::new(MemoryRegistryStore::new()),
        };

        let manager = Arc::new(PluginManager::new(
            ManagerConfig {
                install_timeout: Duration::from_millis(config.lifecycle.install_timeout_ms),
                start_timeout: Duration::from_millis(config.lifecycle.install_timeout_ms),
                stop_timeout: Duration::from_millis(config.lifecycle.stop_timeout_ms),
            },
            Arc::clone(&bus),
            Arc::clone(&security),
            remote,
            store,
        ));

        let repository = Arc::new(RepositoryClient::new(
            config.repositories.default_repositories.clone(),
        )?);

        Ok(Self {
            config,
            bus,
            security,
            manager,
            repository,
            grpc_shutdown: CancellationToken::new(),
            running: Arc::new(RwLock::new(false)),
        })
    }

    fn init_logging(level: &str) {
        if LOGGING_INITIALIZED
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            if LoggingBuilder::new().with_level(level).try_init().is_ok() {
                info!(level = %level, "Logging initialized");
            }
        }
    }

    /// The plugin manager.
    pub fn manager(&self) -> &Arc<PluginManager> {
        &self.manager
    }

    /// The event bus.
    pub fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    /// The security manager.
    pub fn security(&self) -> &Arc<SecurityManager> {
        &self.security
    }

    /// The repository client.
    pub fn repository(&self) -> &Arc<RepositoryClient> {
        &self.repository
    }

    /// Whether the runtime is currently running.
    pub async fn is_running(&self) -> bool {
        *self.running.read().await
    }

    /// Restores previously active plugins and starts the gRPC surface.
    pub async fn start(&self) -> PluginResult<()> {
        {
            let mut running = self.running.write().await;
            if *running {
                warn!("Runtime is already running");
                return Ok(());
            }
            *running = true;
        }

        info!("Starting Scribe plugin runtime");
        self.manager.bootstrap().await?;

        if self.config.grpc.enabled {
            self.serve_grpc()?;
        }

        info!("Runtime started");
        Ok(())
    }

    fn serve_grpc(&self) -> PluginResult<()> {
        let addr: SocketAddr = self
            .config
            .grpc
            .listen_addr
            .parse()
            .map_err(|e| PluginError::invalid("grpc.listen-addr", format!("{e}")))?;
        let service = PluginGrpcService::new(Arc::clone(&self.manager)).into_server();
        let token = self.grpc_shutdown.clone();

        tokio::spawn(async move {
            let shutdown = async move { token.cancelled().await };
            if let Err(e) = tonic::transport::Server::builder()
                .add_service(service)
                .serve_with_shutdown(addr, shutdown)
                .await
            {
                error!(error = %e, "Plugin gRPC server exited with error");
            }
        });
        info!(addr = %addr, "Serving plugin gRPC surface");
        Ok(())
    }

    /// Stops the gRPC surface, every active plugin, and the event bus.
    pub async fn stop(&self) -> PluginResult<()> {
        {
            let mut running = self.running.write().await;
            if !*running {
                warn!("Runtime is not running");
                return Ok(());
            }
            *running = false;
        }

        info!("Stopping Scribe plugin runtime");
        self.grpc_shutdown.cancel();
        self.manager.shutdown().await;
        self.bus
            .shutdown(Duration::from_millis(self.config.lifecycle.stop_timeout_ms))
            .await;
        info!("Runtime stopped");
        Ok(())
    }

    /// Runs the runtime until a shutdown signal is received.
    pub async fn run(&self) -> PluginResult<()> {
        self.start().await?;

        info!("Scribe runtime is now running. Press Ctrl+C to stop.");
        self.wait_for_shutdown().await;

        self.stop().await
    }

    /// Runs the runtime with a custom shutdown future.
    pub async fn run_until<F>(&self, shutdown: F) -> PluginResult<()>
    where
        F: std::future::Future<Output = ()>,
    {
        self.start().await?;
        shutdown.await;
        self.stop().await
    }

    /// Waits for shutdown signals (Ctrl+C or SIGTERM).
    async fn wait_for_shutdown(&self) {
        #[cfg(unix)]
        {
            let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate())
                .expect("Failed to register SIGTERM handler");

            tokio::select! {
                _ = signal::ctrl_c() => {
                    info!("Received Ctrl+C, shutting down");
                }
                _ = sigterm.recv() => {
                    info!("Received SIGTERM, shutting down");
                }
            }
        }

        #[cfg(not(unix))]
        {
            signal::ctrl_c().await.expect("Failed to listen for Ctrl+C");
            info!("Received Ctrl+C, shutting down");
        }
    }
}
