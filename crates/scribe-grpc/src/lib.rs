//! gRPC surface for the Scribe plugin runtime.
//!
//! [`PluginGrpcService`] exposes the plugin manager's operations as unary
//! RPCs for out-of-process plugins. Failures never surface as transport
//! errors: every response carries a `success` flag and a message naming the
//! error kind, so a misbehaving plugin cannot distinguish host bugs from its
//! own bad requests by status code.
//!
//! Authentication is not performed here; callers present their token in
//! request metadata and verification happens upstream via the security
//! manager.

use std::collections::HashMap;
use std::sync::Arc;

use tonic::{Request, Response, Status};
use tracing::debug;

use scribe_core::{PluginConfig, PluginError};
use scribe_manager::PluginManager;

/// Generated protobuf and service types.
pub mod proto {
    tonic::include_proto!("scribe.plugin.v1");
}

use proto::plugin_service_server::PluginService;
pub use proto::plugin_service_server::PluginServiceServer;
use proto::{
    CapabilitiesResponse, ConfigurationResponse, ConfigureRequest, ExecuteRequest,
    ExecuteResponse, HealthResponse, InfoResponse, InitializeRequest, PluginOpResponse,
    PluginRequest, ShutdownRequest, StatusResponse,
};

/// The manager-backed implementation of `PluginService`.
pub struct PluginGrpcService {
    manager: Arc<PluginManager>,
}

impl PluginGrpcService {
    /// Wraps a manager for serving.
    pub fn new(manager: Arc<PluginManager>) -> Self {
        Self { manager }
    }

    /// Convenience constructor for a ready-to-mount tonic service.
    pub fn into_server(self) -> PluginServiceServer<Self> {
        PluginServiceServer::new(self)
    }
}

/// In-band failure message: the error kind tag plus a safe description.
fn failure(e: &PluginError) -> String {
    format!("{}: {e}", e.kind())
}

/// String→string wire config to the runtime's config map.
fn config_from_wire(config: HashMap<String, String>) -> PluginConfig {
    config
        .into_iter()
        .map(|(k, v)| (k, serde_json::Value::String(v)))
        .collect()
}

/// Runtime config map to the flat wire form. Non-string values are rendered
/// as JSON text.
fn config_to_wire(config: PluginConfig) -> HashMap<String, String> {
    config
        .into_iter()
        .map(|(k, v)| {
            let rendered = match v {
                serde_json::Value::String(s) => s,
                other => other.to_string(),
            };
            (k, rendered)
        })
        .collect()
}

#[tonic::async_trait]
impl PluginService for PluginGrpcService {
    async fn initialize(
        &self,
        request: Request<InitializeRequest>,
    ) -> Result<Response<PluginOpResponse>, Status> {
        let req = request.into_inner();
        debug!(plugin = %req.plugin_id, "gRPC initialize");
        let response = match self
            .manager
            .initialize(&req.plugin_id, config_from_wire(req.config))
            .await
        {
            Ok(()) => PluginOpResponse {
                success: true,
                message: String::new(),
            },
            Err(e) => PluginOpResponse {
                success: false,
                message: failure(&e),
            },
        };
        Ok(Response::new(response))
    }

    async fn start(
        &self,
        request: Request<PluginRequest>,
    ) -> Result<Response<PluginOpResponse>, Status> {
        let req = request.into_inner();
        debug!(plugin = %req.plugin_id, "gRPC start");
        let response = match self.manager.start(&req.plugin_id).await {
            Ok(()) => PluginOpResponse {
                success: true,
                message: String::new(),
            },
            Err(e) => PluginOpResponse {
                success: false,
                message: failure(&e),
            },
        };
        Ok(Response::new(response))
    }

    async fn stop(
        &self,
        request: Request<PluginRequest>,
    ) -> Result<Response<PluginOpResponse>, Status> {
        let req = request.into_inner();
        debug!(plugin = %req.plugin_id, "gRPC stop");
        let response = match self.manager.stop(&req.plugin_id).await {
            Ok(()) => PluginOpResponse {
                success: true,
                message: String::new(),
            },
            Err(e) => PluginOpResponse {
                success: false,
                message: failure(&e),
            },
        };
        Ok(Response::new(response))
    }

    async fn shutdown(
        &self,
        _request: Request<ShutdownRequest>,
    ) -> Result<Response<PluginOpResponse>, Status> {
        debug!("gRPC shutdown");
        self.manager.shutdown().await;
        Ok(Response::new(PluginOpResponse {
            success: true,
            message: String::new(),
        }))
    }

    async fn get_status(
        &self,
        request: Request<PluginRequest>,
    ) -> Result<Response<StatusResponse>, Status> {
        let req = request.into_inner();
        let state = self.manager.status(&req.plugin_id);
        Ok(Response::new(StatusResponse {
            success: true,
            message: String::new(),
            state: state.to_string(),
        }))
    }

    async fn health_check(
        &self,
        request: Request<PluginRequest>,
    ) -> Result<Response<HealthResponse>, Status> {
        let req = request.into_inner();
        let report = self.manager.health(&req.plugin_id).await;
        Ok(Response::new(HealthResponse {
            success: true,
            message: String::new(),
            status: format!("{:?}", report.status).to_lowercase(),
            detail: report.message,
        }))
    }

    async fn get_info(
        &self,
        request: Request<PluginRequest>,
    ) -> Result<Response<InfoResponse>, Status> {
        let req = request.into_inner();
        let response = match self.manager.descriptor(&req.plugin_id) {
            Ok(descriptor) => InfoResponse {
                success: true,
                message: String::new(),
                name: descriptor.name,
                version: descriptor.version.to_string(),
                kind: format!("{:?}", descriptor.kind).to_lowercase(),
                author: descriptor.author,
                description: descriptor.description,
            },
            Err(e) => InfoResponse {
                success: false,
                message: failure(&e),
                name: String::new(),
                version: String::new(),
                kind: String::new(),
                author: String::new(),
                description: String::new(),
            },
        };
        Ok(Response::new(response))
    }

    async fn get_capabilities(
        &self,
        request: Request<PluginRequest>,
    ) -> Result<Response<CapabilitiesResponse>, Status> {
        let req = request.into_inner();
        let response = match self.manager.capabilities(&req.plugin_id) {
            Ok(capabilities) => CapabilitiesResponse {
                success: true,
                message: String::new(),
                capabilities,
            },
            Err(e) => CapabilitiesResponse {
                success: false,
                message: failure(&e),
                capabilities: vec![],
            },
        };
        Ok(Response::new(response))
    }

    async fn configure(
        &self,
        request: Request<ConfigureRequest>,
    ) -> Result<Response<PluginOpResponse>, Status> {
        let req = request.into_inner();
        let response = match self
            .manager
            .configure(&req.plugin_id, config_from_wire(req.config))
            .await
        {
            Ok(()) => PluginOpResponse {
                success: true,
                message: String::new(),
            },
            Err(e) => PluginOpResponse {
                success: false,
                message: failure(&e),
            },
        };
        Ok(Response::new(response))
    }

    async fn get_configuration(
        &self,
        request: Request<PluginRequest>,
    ) -> Result<Response<ConfigurationResponse>, Status> {
        let req = request.into_inner();
        let response = match self.manager.get_configuration(&req.plugin_id) {
            Ok(config) => ConfigurationResponse {
                success: true,
                message: String::new(),
                config: config_to_wire(config),
            },
            Err(e) => ConfigurationResponse {
                success: false,
                message: failure(&e),
                config: HashMap::new(),
            },
        };
        Ok(Response::new(response))
    }

    async fn execute(
        &self,
        request: Request<ExecuteRequest>,
    ) -> Result<Response<ExecuteResponse>, Status> {
        let req = request.into_inner();
        debug!(plugin = %req.plugin_id, operation = %req.operation, "gRPC execute");
        let response = match self
            .manager
            .execute(&req.plugin_id, &req.operation, &req.parameters)
            .await
        {
            Ok(result) => ExecuteResponse {
                success: true,
                message: String::new(),
                result,
            },
            Err(e) => ExecuteResponse {
                success: false,
                message: failure(&e),
                result: String::new(),
            },
        };
        Ok(Response::new(response))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use async_trait::async_trait;
    use linkme::distributed_slice;
    use tempfile::TempDir;

    use scribe_bus::EventBus;
    use scribe_core::builtin::{BUILTIN_ENTRIES, BuiltinEntry};
    use scribe_core::{
        OperationParams, PluginDescriptor, PluginEntry, PluginKind, PluginResult, RegistryStore,
        RuntimeHint,
    };
    use scribe_loader::RemoteLoader;
    use scribe_manager::{ManagerConfig, MemoryRegistryStore};
    use scribe_security::SecurityManager;

    struct EchoEntry;

    #[async_trait]
    impl PluginEntry for EchoEntry {
        fn info(&self) -> PluginDescriptor {
            PluginDescriptor {
                name: "echo".into(),
                version: semver::Version::new(1, 0, 0),
                kind: PluginKind::External,
                runtime: RuntimeHint::Service,
                author: "tests".into(),
                description: "echoes operations".into(),
                capabilities: vec!["echo".into()],
                required_permissions: vec![],
                subscribed_events: vec![],
                published_events: vec![],
            }
        }

        async fn initialize(&self, _config: &scribe_core::PluginConfig) -> PluginResult<()> {
            Ok(())
        }

        async fn start(&self) -> PluginResult<()> {
            Ok(())
        }

        async fn stop(&self) -> PluginResult<()> {
            Ok(())
        }

        async fn execute(
            &self,
            operation: &str,
            params: &OperationParams,
        ) -> PluginResult<String> {
            Ok(format!("{operation}:{}", params.len()))
        }
    }

    #[distributed_slice(BUILTIN_ENTRIES)]
    static ECHO: BuiltinEntry = BuiltinEntry {
        name: "echo",
        create: || Arc::new(EchoEntry),
    };

    async fn service_with_installed_echo() -> (PluginGrpcService, TempDir) {
        let tmp = TempDir::new().unwrap();
        std::fs::write(
            tmp.path().join("plugin.yaml"),
            "name: echo\nversion: 1.0.0\napi-version: 1.0.0\nentry:\n  - echo\n",
        )
        .unwrap();

        let security = Arc::new(SecurityManager::new());
        let remote = Arc::new(RemoteLoader::with_defaults(Arc::clone(&security)).unwrap());
        let store: Arc<dyn RegistryStore> = Arc::new(MemoryRegistryStore::new());
        let manager = Arc::new(PluginManager::new(
            ManagerConfig::default(),
            Arc::new(EventBus::new()),
            security,
            remote,
            store,
        ));
        manager
            .install(&tmp.path().to_string_lossy(), Default::default())
            .await
            .unwrap();
        (PluginGrpcService::new(manager), tmp)
    }

    #[tokio::test]
    async fn status_info_capabilities_health() {
        let (service, _tmp) = service_with_installed_echo().await;

        let status = service
            .get_status(Request::new(PluginRequest {
                plugin_id: "echo".into(),
            }))
            .await
            .unwrap()
            .into_inner();
        assert!(status.success);
        assert_eq!(status.state, "active");

        let info = service
            .get_info(Request::new(PluginRequest {
                plugin_id: "echo".into(),
            }))
            .await
            .unwrap()
            .into_inner();
        assert!(info.success);
        assert_eq!(info.name, "echo");
        assert_eq!(info.version, "1.0.0");
        assert_eq!(info.kind, "external");

        let capabilities = service
            .get_capabilities(Request::new(PluginRequest {
                plugin_id: "echo".into(),
            }))
            .await
            .unwrap()
            .into_inner();
        assert_eq!(capabilities.capabilities, vec!["echo".to_string()]);

        let health = service
            .health_check(Request::new(PluginRequest {
                plugin_id: "echo".into(),
            }))
            .await
            .unwrap()
            .into_inner();
        assert_eq!(health.status, "healthy");
    }

    #[tokio::test]
    async fn lifecycle_and_configuration_round_trip() {
        let (service, _tmp) = service_with_installed_echo().await;

        let stop = service
            .stop(Request::new(PluginRequest {
                plugin_id: "echo".into(),
            }))
            .await
            .unwrap()
            .into_inner();
        assert!(stop.success);

        let start = service
            .start(Request::new(PluginRequest {
                plugin_id: "echo".into(),
            }))
            .await
            .unwrap()
            .into_inner();
        assert!(start.success);

        let mut config = HashMap::new();
        config.insert("level".to_string(), "debug".to_string());
        let configure = service
            .configure(Request::new(ConfigureRequest {
                plugin_id: "echo".into(),
                config: config.clone(),
            }))
            .await
            .unwrap()
            .into_inner();
        assert!(configure.success);

        let configuration = service
            .get_configuration(Request::new(PluginRequest {
                plugin_id: "echo".into(),
            }))
            .await
            .unwrap()
            .into_inner();
        assert_eq!(configuration.config, config);
    }

    #[tokio::test]
    async fn execute_round_trip() {
        let (service, _tmp) = service_with_installed_echo().await;

        let mut parameters = HashMap::new();
        parameters.insert("a".to_string(), "1".to_string());
        let response = service
            .execute(Request::new(ExecuteRequest {
                plugin_id: "echo".into(),
                operation: "reindex".into(),
                parameters,
            }))
            .await
            .unwrap()
            .into_inner();
        assert!(response.success);
        assert_eq!(response.result, "reindex:1");
    }

    #[tokio::test]
    async fn failures_are_in_band_not_transport_errors() {
        let (service, _tmp) = service_with_installed_echo().await;

        let response = service
            .start(Request::new(PluginRequest {
                plugin_id: "ghost".into(),
            }))
            .await
            .unwrap()
            .into_inner();
        assert!(!response.success);
        assert!(response.message.contains("NotFound"));

        let info = service
            .get_info(Request::new(PluginRequest {
                plugin_id: "ghost".into(),
            }))
            .await
            .unwrap()
            .into_inner();
        assert!(!info.success);
        assert!(info.message.contains("NotFound"));
    }
}
