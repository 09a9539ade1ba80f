//! config-rs/lib.rs
//! Shared configuration utilities for the feedback service
//! Provides `.env` loading, typed environment lookups and bind address resolution

use std::env;
use std::net::{Ipv4Addr, SocketAddr};
use std::str::FromStr;

/// Load variables from a `.env` file in the working directory, if one exists.
///
/// Variables already present in the process environment win over the file.
pub fn load_env() {
    match dotenv::dotenv() {
        Ok(path) => log::debug!("Loaded environment from {}", path.display()),
        Err(_) => log::debug!("No .env file found, using process environment only"),
    }
}

/// Read a non-empty, trimmed string variable.
///
/// Returns `None` when the variable is unset or only whitespace.
pub fn get_env_string(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Read an environment variable and parse it, falling back to `default`.
///
/// # Arguments
/// * `name` - The variable name (e.g., "LLM_TIMEOUT_SECS")
/// * `default` - Value used when the variable is unset or does not parse
pub fn get_env_var<T: FromStr>(name: &str, default: T) -> T {
    match get_env_string(name) {
        Some(raw) => raw.parse::<T>().unwrap_or_else(|_| {
            log::warn!("Invalid value '{}' in {}, using default", raw, name);
            default
        }),
        None => default,
    }
}

/// Get service port from environment variables with proper fallback
///
/// # Arguments
/// * `service_name` - The name of the service (e.g., "FEEDBACK")
/// * `default_port` - The default port to use if not specified in environment
pub fn get_service_port(service_name: &str, default_port: u16) -> u16 {
    let var_name = format!("{}_SERVICE_PORT", service_name.to_uppercase());
    get_env_var(&var_name, default_port)
}

/// Create a SocketAddr for binding a service
///
/// `<SERVICE>_SERVICE_ADDR` takes precedence and may be given either as
/// `host:port` or `http://host:port`. Otherwise the service binds on all
/// interfaces using the port from [`get_service_port`].
pub fn get_bind_address(service_name: &str, default_port: u16) -> SocketAddr {
    let var_name = format!("{}_SERVICE_ADDR", service_name.to_uppercase());

    if let Some(addr_str) = get_env_string(&var_name) {
        let stripped = addr_str
            .strip_prefix("http://")
            .or_else(|| addr_str.strip_prefix("https://"))
            .unwrap_or(&addr_str);

        match stripped.parse::<SocketAddr>() {
            Ok(addr) => return addr,
            Err(_) => log::warn!("Invalid address format in {}, using default", var_name),
        }
    }

    let port = get_service_port(service_name, default_port);
    SocketAddr::from((Ipv4Addr::UNSPECIFIED, port))
}
