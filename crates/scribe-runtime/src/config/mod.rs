//! Host configuration: schema, loading, and validation.

pub mod error;
pub mod loader;
pub mod schema;
pub mod validation;

pub use error::{ConfigError, ConfigResult};
pub use loader::{CONFIG_PATH_VAR, load_config, load_config_from_file, parse_config};
pub use schema::{
    GrpcConfig, HostConfig, LifecycleConfig, LoaderConfig, LoggingConfig, RegistryConfig,
    RepositoriesConfig,
};
pub use validation::validate_config;
