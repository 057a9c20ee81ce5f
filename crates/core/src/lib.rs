pub mod cache_key;
pub mod config;
pub mod engine;
pub mod fetcher;
pub mod metrics;
pub mod proxy;
pub mod report;
pub mod storage;
pub mod testing;
pub mod validation;

pub use cache_key::{CacheKey, KeyInputs, KeyScheme};
pub use config::{
    load_config, load_config_from_str, validate_config, ClientConfig, Config, ConfigError,
    EngineConfig, FetcherConfig, ProxyConfig, ServerConfig, StorageConfig,
};
pub use engine::{EngineError, EngineRequest, HttpValidationEngine, ValidationEngine};
pub use fetcher::{
    FetchError, FetchProfile, FetchRequest, FetchedPayload, HostAllowList, HttpFetcher,
    RemoteFetcher,
};
pub use proxy::{PackageError, PackageStore, Proxy, ProxyError, PACKAGE_MAGIC};
pub use report::{Report, ReportFormat};
pub use storage::{Namespace, NamespaceStore, ReportCache, StorageError};
pub use validation::{
    InputKind, ValidationError, ValidationOutcome, ValidationRequest, ValidationService,
};
