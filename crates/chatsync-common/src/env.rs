//! Environment variable lookups
//!
//! Every chatsync setting comes from the process environment. A `.env` file in the
//! working directory is honoured for local runs, with real variables taking precedence.

use crate::error::{CommonError, Result};
use std::str::FromStr;

/// Load `.env` into the process environment if one exists.
pub fn load_dotenv() {
    if let Ok(path) = dotenvy::dotenv() {
        tracing::debug!(path = %path.display(), "Loaded .env file");
    }
}

/// Value of `name`, treating an empty string as unset.
pub fn var_opt(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

/// Value of `name`, or `default` when unset.
pub fn var_or(name: &str, default: &str) -> String {
    var_opt(name).unwrap_or_else(|| default.to_string())
}

/// Value of `name`, failing when unset.
pub fn var_required(name: &str) -> Result<String> {
    var_opt(name).ok_or_else(|| CommonError::config(format!("{} must be set", name)))
}

/// Parse `name` as `T`, or return `default` when unset.
///
/// A value that is set but does not parse is an error rather than a silent fallback.
pub fn parse_or<T>(name: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match var_opt(name) {
        Some(raw) => raw.trim().parse::<T>().map_err(|e| {
            CommonError::config(format!("{} has invalid value '{}': {}", name, raw, e))
        }),
        None => Ok(default),
    }
}
