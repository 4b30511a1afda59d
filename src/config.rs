use ::config::Config;
use std::time::Duration;

/// Default sliding expiry of cached queue handles (20 minutes).
pub(crate) const DEFAULT_QUEUE_CACHE_TTL_SECS: u64 = 20 * 60;

/// Default poll interval of a [`Worker`](crate::Worker).
pub(crate) const DEFAULT_POLL_INTERVAL_MS: u64 = 100;

pub(crate) fn get_namespaced_value<T, F>(
    config: &Config,
    name: &str,
    key: &str,
    getter: F,
) -> Result<T, config::ConfigError>
where
    F: Fn(&Config, &str) -> Result<T, config::ConfigError>,
{
    if name.is_empty() {
        getter(config, key)
    } else {
        getter(config, &format!("{name}.{key}")).or_else(|_| getter(config, key))
    }
}

pub(crate) fn get_namespaced_u64(
    config: &Config,
    name: &str,
    key: &str,
) -> Result<u64, config::ConfigError> {
    get_namespaced_value(config, name, key, |cfg, key| cfg.get::<u64>(key))
}

pub(crate) fn get_namespaced_string(
    config: &Config,
    name: &str,
    key: &str,
) -> Result<String, config::ConfigError> {
    get_namespaced_value(config, name, key, Config::get_string)
}

// ============================================================================
// Typed Lookups
// ============================================================================

/// Missing keys fall back to the default; a present but malformed key is an
/// error.
fn or_default<T>(result: Result<T, config::ConfigError>, default: T) -> Result<T, config::ConfigError> {
    match result {
        Ok(value) => Ok(value),
        Err(config::ConfigError::NotFound(_)) => Ok(default),
        Err(e) => Err(e),
    }
}

pub(crate) fn queue_cache_ttl(config: &Config, name: &str) -> Result<Duration, config::ConfigError> {
    let secs = or_default(
        get_namespaced_u64(config, name, "queue_cache_ttl_secs"),
        DEFAULT_QUEUE_CACHE_TTL_SECS,
    )?;
    Ok(Duration::from_secs(secs))
}

pub(crate) fn poll_interval(config: &Config, name: &str) -> Result<Duration, config::ConfigError> {
    let ms = or_default(
        get_namespaced_u64(config, name, "poll_interval_ms"),
        DEFAULT_POLL_INTERVAL_MS,
    )?;
    Ok(Duration::from_millis(ms))
}

/// Name used for the local machine when rendering `.` hosts as URIs.
pub(crate) fn machine_name(config: &Config, name: &str) -> Result<String, config::ConfigError> {
    let fallback = std::env::var("COMPUTERNAME")
        .or_else(|_| std::env::var("HOSTNAME"))
        .unwrap_or_else(|_| "localhost".to_string());
    or_default(get_namespaced_string(config, name, "machine_name"), fallback)
}

pub(crate) fn optional_string(
    config: &Config,
    name: &str,
    key: &str,
) -> Result<Option<String>, config::ConfigError> {
    or_default(get_namespaced_string(config, name, key).map(Some), None)
}
