use std::path::Path;
use std::sync::Arc;

use idswidget_core::{
    Config, PackageStore, Proxy, RemoteFetcher, ValidationEngine, ValidationService,
};

/// Shared application state
pub struct AppState {
    config: Config,
    validation: ValidationService,
    proxy: Proxy,
    packages: PackageStore,
}

impl AppState {
    /// State with one fetcher shared by validation and the proxy.
    pub fn new(
        config: Config,
        fetcher: Arc<dyn RemoteFetcher>,
        engine: Arc<dyn ValidationEngine>,
    ) -> Self {
        Self::with_fetchers(config, Arc::clone(&fetcher), fetcher, engine)
    }

    /// State whose proxy downloads go through `proxy_fetcher`.
    pub fn with_fetchers(
        config: Config,
        fetcher: Arc<dyn RemoteFetcher>,
        proxy_fetcher: Arc<dyn RemoteFetcher>,
        engine: Arc<dyn ValidationEngine>,
    ) -> Self {
        let validation = ValidationService::new(&config.storage, &config.engine, fetcher, engine);
        let proxy = Proxy::new(proxy_fetcher, &config.proxy);
        let packages = PackageStore::new(config.proxy.package_dirs.clone());

        Self {
            config,
            validation,
            proxy,
            packages,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn validation(&self) -> &ValidationService {
        &self.validation
    }

    pub fn proxy(&self) -> &Proxy {
        &self.proxy
    }

    pub fn packages(&self) -> &PackageStore {
        &self.packages
    }

    /// Location of the JSON document served to the browser client.
    pub fn client_config_path(&self) -> &Path {
        &self.config.client.config_path
    }
}
