pub mod config;
pub mod converter;
pub mod error;
pub mod metrics;
pub mod orchestrator;
pub mod registry;
pub mod retention;
pub mod sandbox;
pub mod testing;
pub mod upload;

pub use config::{
    load_config, load_config_from_env, load_config_from_str, validate_config, Config, ConfigError,
};
pub use converter::{ConversionContext, Converter, ConverterError};
pub use error::{ConversionError, ErrorKind, FailureReason};
pub use orchestrator::{
    Artifact, BackendStatus, ConversionJob, ConversionResult, DeliveryGuard, JobState, Orchestrator,
};
pub use registry::{
    builtin_registry, Arity, BackendKind, ConversionSpec, FormatRegistry, OutputKind,
    RegisteredConversion, RegistryError,
};
pub use retention::{create_retention_system, RetentionHandle, RetentionPolicy, RetentionWorker};
pub use sandbox::{ProcessSandbox, SandboxCommand, SandboxError, SandboxOutput};
pub use upload::{ClientFilename, UploadManager, UploadedAsset};
