use super::{types::Config, ConfigError};

/// Validate configuration
/// Currently validates:
/// - Server port is not 0
/// - Engine URL is an http(s) URL
/// - Timeouts are non-zero
/// - Package directories are not empty paths
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.server.port == 0 {
        return Err(ConfigError::ValidationError(
            "server.port cannot be 0".to_string(),
        ));
    }

    match reqwest::Url::parse(&config.engine.url) {
        Ok(url) if matches!(url.scheme(), "http" | "https") => {}
        Ok(url) => {
            return Err(ConfigError::ValidationError(format!(
                "engine.url must use http or https, got {}",
                url.scheme()
            )))
        }
        Err(e) => {
            return Err(ConfigError::ValidationError(format!(
                "engine.url is not a valid URL: {}",
                e
            )))
        }
    }

    if config.engine.timeout_secs == 0 {
        return Err(ConfigError::ValidationError(
            "engine.timeout_secs cannot be 0".to_string(),
        ));
    }

    if config.fetcher.download_timeout_secs == 0 || config.fetcher.package_timeout_secs == 0 {
        return Err(ConfigError::ValidationError(
            "fetcher timeouts cannot be 0".to_string(),
        ));
    }

    if config
        .proxy
        .package_dirs
        .iter()
        .any(|dir| dir.as_os_str().is_empty())
    {
        return Err(ConfigError::ValidationError(
            "proxy.package_dirs cannot contain empty paths".to_string(),
        ));
    }

    Ok(())
}
