use crate::config::types::{CatalogConfig, Config, CrawlerConfig, OutputConfig};
use crate::crawler::CompiledSelectors;
use crate::ConfigError;
use url::Url;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_catalog_config(&config.catalog)?;
    validate_crawler_config(&config.crawler)?;
    validate_output_config(&config.output)?;
    // Compiling is the only reliable way to reject a selector
    CompiledSelectors::compile(&config.selectors)?;
    Ok(())
}

/// Validates the catalog entry point
fn validate_catalog_config(config: &CatalogConfig) -> Result<(), ConfigError> {
    let url = Url::parse(&config.listing_url)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid listing-url: {}", e)))?;

    if url.scheme() != "https" && url.scheme() != "http" {
        return Err(ConfigError::InvalidUrl(format!(
            "listing-url '{}' must use http or https",
            config.listing_url
        )));
    }

    Ok(())
}

/// Validates crawler pacing
fn validate_crawler_config(config: &CrawlerConfig) -> Result<(), ConfigError> {
    if config.max_extract_attempts < 1 {
        return Err(ConfigError::Validation(format!(
            "max-extract-attempts must be >= 1, got {}",
            config.max_extract_attempts
        )));
    }

    if config.watchdog_timeout == 0 {
        return Err(ConfigError::Validation(
            "watchdog-timeout must be greater than 0".to_string(),
        ));
    }

    if config.max_consecutive_open_failures < 1 {
        return Err(ConfigError::Validation(
            "max-consecutive-open-failures must be >= 1".to_string(),
        ));
    }

    if config.close_grace > config.watchdog_timeout {
        tracing::warn!(
            "close-grace ({}ms) exceeds watchdog-timeout ({}ms)",
            config.close_grace,
            config.watchdog_timeout
        );
    }

    Ok(())
}

/// Validates output configuration
fn validate_output_config(config: &OutputConfig) -> Result<(), ConfigError> {
    if config.database_path.is_empty() {
        return Err(ConfigError::Validation(
            "database-path cannot be empty".to_string(),
        ));
    }

    if config.covers_dir.is_empty() {
        return Err(ConfigError::Validation(
            "covers-dir cannot be empty".to_string(),
        ));
    }

    if config.export_path.is_empty() {
        return Err(ConfigError::Validation(
            "export-path cannot be empty".to_string(),
        ));
    }

    Ok(())
}
