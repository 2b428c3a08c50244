use crate::error::ConfigError;

/// Read an env var, treating unset and blank values the same.
pub(crate) fn optional_env(key: &str) -> Result<Option<String>, ConfigError> {
    match std::env::var(key) {
        Ok(value) if value.trim().is_empty() => Ok(None),
        Ok(value) => Ok(Some(value.trim().to_string())),
        Err(std::env::VarError::NotPresent) => Ok(None),
        Err(std::env::VarError::NotUnicode(_)) => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            message: "value is not valid UTF-8".to_string(),
        }),
    }
}

/// Parse an optional numeric env var, falling back to `default`.
pub(crate) fn parse_u64_env(
    key: &str,
    fallback: Option<u64>,
    default: u64,
) -> Result<u64, ConfigError> {
    optional_env(key)?
        .map(|s| s.parse::<u64>())
        .transpose()
        .map_err(|e| ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("must be a non-negative integer: {e}"),
        })
        .map(|v| v.or(fallback).unwrap_or(default))
}

/// Validate an `http(s)` URL.
pub(crate) fn validate_http_url(key: &str, value: &str) -> Result<(), ConfigError> {
    let parsed = url::Url::parse(value).map_err(|e| ConfigError::InvalidValue {
        key: key.to_string(),
        message: format!("invalid URL '{value}': {e}"),
    })?;
    match parsed.scheme() {
        "http" | "https" => Ok(()),
        other => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("expected http or https URL, got scheme '{other}'"),
        }),
    }
}

/// Validate a `0x`-prefixed 20-byte hex address.
pub(crate) fn validate_address(key: &str, value: &str) -> Result<(), ConfigError> {
    let hex = value
        .strip_prefix("0x")
        .or_else(|| value.strip_prefix("0X"))
        .unwrap_or("");
    if hex.len() == 40 && hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return Ok(());
    }
    Err(ConfigError::InvalidValue {
        key: key.to_string(),
        message: format!("expected a 0x-prefixed 40 hex digit address, got '{value}'"),
    })
}
