use super::{AppConfig, ConfigError};

/// Validate the full application config, returning an error if any rule is violated.
///
/// # Errors
///
/// Returns [`ConfigError::Validation`] when any configuration invariant is violated.
pub fn validate_config(config: &AppConfig) -> Result<(), ConfigError> {
    validate_server_config(config)?;
    validate_allowed_keys(config)?;
    validate_upstream(config)?;
    Ok(())
}

fn validation_err(msg: impl Into<String>) -> ConfigError {
    ConfigError::Validation(msg.into())
}

fn validate_server_config(config: &AppConfig) -> Result<(), ConfigError> {
    if config.server.http_pool_max_idle_per_host == 0 {
        return Err(validation_err(
            "server.http_pool_max_idle_per_host must be greater than 0",
        ));
    }
    if config.server.connect_timeout_secs == 0 {
        return Err(validation_err(
            "server.connect_timeout_secs must be greater than 0",
        ));
    }
    Ok(())
}

fn validate_allowed_keys(config: &AppConfig) -> Result<(), ConfigError> {
    if config.client_authentication.allowed_keys.is_empty() {
        return Err(validation_err("allowed_keys cannot be empty"));
    }
    for key in &config.client_authentication.allowed_keys {
        if key.trim().is_empty() {
            return Err(validation_err("allowed_keys contains an empty key"));
        }
    }
    Ok(())
}

fn validate_upstream(config: &AppConfig) -> Result<(), ConfigError> {
    let upstream = &config.upstream;
    let origin = url::Url::parse(&upstream.origin)
        .map_err(|e| validation_err(format!("upstream.origin is not a valid URL: {e}")))?;
    if origin.scheme() != "http" && origin.scheme() != "https" {
        return Err(validation_err(
            "upstream.origin must use the http or https scheme",
        ));
    }

    let sampling = &upstream.sampling;
    if !(0.0..=2.0).contains(&sampling.temperature) {
        return Err(validation_err(
            "upstream.sampling.temperature must be within [0.0, 2.0]",
        ));
    }
    if !(0.0..=1.0).contains(&sampling.top_p) {
        return Err(validation_err(
            "upstream.sampling.top_p must be within [0.0, 1.0]",
        ));
    }
    if sampling.max_tokens == 0 {
        return Err(validation_err(
            "upstream.sampling.max_tokens must be greater than 0",
        ));
    }
    Ok(())
}
