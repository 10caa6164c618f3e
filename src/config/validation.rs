use crate::config::types::{
    CacheConfig, ClientConfig, Config, CrawlConfig, RulesConfig, MAX_STALE_PERIOD_HOURS,
};
use crate::ConfigError;
use url::Url;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_cache_config(&config.cache)?;
    validate_client_config(&config.client)?;
    validate_crawl_config(&config.crawl)?;
    validate_rules_config(&config.rules)?;
    Ok(())
}

/// Validates cache configuration
fn validate_cache_config(config: &CacheConfig) -> Result<(), ConfigError> {
    if config.database_path.is_empty() {
        return Err(ConfigError::Validation(
            "database-path cannot be empty".to_string(),
        ));
    }

    if config.stale_period_hours == 0 {
        return Err(ConfigError::Validation(
            "stale-period-hours must be >= 1".to_string(),
        ));
    }

    if config.stale_period_hours > MAX_STALE_PERIOD_HOURS {
        return Err(ConfigError::Validation(format!(
            "stale-period-hours must be <= {}, got {}",
            MAX_STALE_PERIOD_HOURS, config.stale_period_hours
        )));
    }

    Ok(())
}

/// Validates outbound client configuration
fn validate_client_config(config: &ClientConfig) -> Result<(), ConfigError> {
    let url = Url::parse(&config.base_url)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid base-url: {}", e)))?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(ConfigError::Validation(format!(
            "base-url '{}' must use http or https",
            config.base_url
        )));
    }

    if url.host_str().is_none() {
        return Err(ConfigError::Validation(format!(
            "base-url '{}' has no host",
            config.base_url
        )));
    }

    if config.user_agent.trim().is_empty() {
        return Err(ConfigError::Validation(
            "user-agent cannot be empty".to_string(),
        ));
    }

    if config.timeout_secs < 1 || config.timeout_secs > 300 {
        return Err(ConfigError::Validation(format!(
            "timeout-secs must be between 1 and 300, got {}",
            config.timeout_secs
        )));
    }

    if config.max_concurrency < 1 || config.max_concurrency > 100 {
        return Err(ConfigError::Validation(format!(
            "max-concurrency must be between 1 and 100, got {}",
            config.max_concurrency
        )));
    }

    Ok(())
}

/// Validates crawl range and filters
fn validate_crawl_config(config: &CrawlConfig) -> Result<(), ConfigError> {
    if config.first_id == 0 {
        return Err(ConfigError::Validation(
            "first-id must be >= 1".to_string(),
        ));
    }

    if config.first_id >= config.last_id {
        return Err(ConfigError::Validation(format!(
            "id range is empty: first-id {} must be below last-id {}",
            config.first_id, config.last_id
        )));
    }

    for pattern in &config.categories {
        validate_category_pattern(pattern)?;
    }

    if config.process_workers > 256 {
        return Err(ConfigError::Validation(format!(
            "process-workers must be <= 256, got {}",
            config.process_workers
        )));
    }

    Ok(())
}

/// Validates a category pattern: "*", "slug", or "slug/*"
fn validate_category_pattern(pattern: &str) -> Result<(), ConfigError> {
    if pattern == "*" {
        return Ok(());
    }

    let base = pattern.strip_suffix("/*").unwrap_or(pattern);
    if base.is_empty() {
        return Err(ConfigError::Validation(
            "Category pattern cannot be empty".to_string(),
        ));
    }

    if base.starts_with('/') || base.ends_with('/') || base.contains('*') {
        return Err(ConfigError::Validation(format!(
            "Invalid category pattern '{}'",
            pattern
        )));
    }

    Ok(())
}

/// Validates rule engine configuration
fn validate_rules_config(config: &RulesConfig) -> Result<(), ConfigError> {
    if config.path.is_empty() {
        return Err(ConfigError::Validation(
            "rules path cannot be empty".to_string(),
        ));
    }

    if config.context.trim().is_empty() {
        return Err(ConfigError::Validation(
            "rules context cannot be empty".to_string(),
        ));
    }

    Ok(())
}
