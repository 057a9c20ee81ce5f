use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::path::PathBuf;

use crate::cache_key::KeyScheme;

/// Root configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub fetcher: FetcherConfig,
    #[serde(default)]
    pub proxy: ProxyConfig,
    #[serde(default)]
    pub client: ClientConfig,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: IpAddr,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> IpAddr {
    IpAddr::V4(std::net::Ipv4Addr::UNSPECIFIED)
}

fn default_port() -> u16 {
    3000
}

/// Persistent storage for per-project namespaces.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
    /// Root under which one directory per project is created.
    #[serde(default = "default_uploads_dir")]
    pub uploads_dir: PathBuf,
    /// How cache keys are derived from request metadata.
    #[serde(default)]
    pub key_scheme: KeyScheme,
    /// Remove fetched model/spec files once the report is persisted.
    #[serde(default = "default_true")]
    pub delete_inputs_after_validation: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            uploads_dir: default_uploads_dir(),
            key_scheme: KeyScheme::default(),
            delete_inputs_after_validation: true,
        }
    }
}

fn default_uploads_dir() -> PathBuf {
    PathBuf::from("uploads")
}

fn default_true() -> bool {
    true
}

/// External validation engine
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EngineConfig {
    /// Endpoint accepting validation requests (e.g., "http://ifctester/ifctester")
    #[serde(default = "default_engine_url")]
    pub url: String,
    /// Upper bound for a single engine call in seconds (default: 600)
    #[serde(default = "default_engine_timeout")]
    pub timeout_secs: u64,
    /// Specification used when the request carries no specification file.
    /// Resolved by the engine relative to the project namespace.
    #[serde(default = "default_ids_filename")]
    pub default_ids_filename: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            url: default_engine_url(),
            timeout_secs: default_engine_timeout(),
            default_ids_filename: default_ids_filename(),
        }
    }
}

fn default_engine_url() -> String {
    "http://ifctester/ifctester".to_string()
}

fn default_engine_timeout() -> u64 {
    600
}

fn default_ids_filename() -> String {
    "ARK.ids".to_string()
}

/// Remote file acquisition
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FetcherConfig {
    /// Timeout for interactive downloads in seconds (default: 300)
    #[serde(default = "default_download_timeout")]
    pub download_timeout_secs: u64,
    /// Timeout for large package downloads in seconds (default: 600)
    #[serde(default = "default_package_timeout")]
    pub package_timeout_secs: u64,
    /// TCP connect timeout in seconds (default: 10)
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
    /// Largest payload accepted from a remote host (default: 1 GiB)
    #[serde(default = "default_max_download_bytes")]
    pub max_download_bytes: u64,
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            download_timeout_secs: default_download_timeout(),
            package_timeout_secs: default_package_timeout(),
            connect_timeout_secs: default_connect_timeout(),
            max_download_bytes: default_max_download_bytes(),
        }
    }
}

fn default_download_timeout() -> u64 {
    300
}

fn default_package_timeout() -> u64 {
    600
}

fn default_connect_timeout() -> u64 {
    10
}

fn default_max_download_bytes() -> u64 {
    1024 * 1024 * 1024
}

/// Download and package proxy
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ProxyConfig {
    /// User agent sent upstream by the package proxy.
    #[serde(default = "default_package_user_agent")]
    pub package_user_agent: String,
    /// Directories searched, in order, for pre-fetched package files.
    #[serde(default = "default_package_dirs")]
    pub package_dirs: Vec<PathBuf>,
    /// Hosts the proxy may contact. Empty allows any host.
    #[serde(default)]
    pub allowed_hosts: Vec<String>,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            package_user_agent: default_package_user_agent(),
            package_dirs: default_package_dirs(),
            allowed_hosts: Vec::new(),
        }
    }
}

fn default_package_user_agent() -> String {
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0 Safari/537.36"
        .to_string()
}

fn default_package_dirs() -> Vec<PathBuf> {
    vec![PathBuf::from("wheels"), PathBuf::from("static/wheels")]
}

/// Browser-facing settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ClientConfig {
    /// JSON document served verbatim at /config.json
    #[serde(default = "default_client_config_path")]
    pub config_path: PathBuf,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            config_path: default_client_config_path(),
        }
    }
}

fn default_client_config_path() -> PathBuf {
    PathBuf::from("config.json")
}
