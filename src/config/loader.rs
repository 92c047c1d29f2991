//! Configuration loading from disk and the environment.

use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::config::schema::GatewayConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error reading {}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation failed: {}", join_errors(.0))]
    Validation(Vec<ValidationError>),

    #[error("Invalid public key: {0}")]
    Key(String),

    #[error("Invalid route {name}: {reason}")]
    InvalidRoute { name: String, reason: String },

    #[error("Invalid identity header: {0}")]
    IdentityHeader(String),
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Load and validate configuration from a TOML file, applying environment
/// overrides on top.
pub fn load_config(path: &Path) -> Result<GatewayConfig, ConfigError> {
    let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let mut config = parse_config(&content)?;
    let mut errors = apply_overrides(&mut config, |key| std::env::var(key).ok());

    if let Err(mut invalid) = validate_config(&config) {
        errors.append(&mut invalid);
    }
    if !errors.is_empty() {
        return Err(ConfigError::Validation(errors));
    }

    Ok(config)
}

/// Parse TOML without validating.
pub fn parse_config(content: &str) -> Result<GatewayConfig, ConfigError> {
    Ok(toml::from_str(content)?)
}

/// Apply `GATEWAY_*` overrides read through `lookup`.
///
/// - `GATEWAY_BIND_ADDRESS`
/// - `GATEWAY_JWT_PUBLIC_KEY` (PEM text; replaces any key path)
/// - `GATEWAY_ALLOW_UNSIGNED_TOKENS` (`true`/`false`)
///
/// Values that cannot be applied come back as validation errors.
pub fn apply_overrides<F>(config: &mut GatewayConfig, lookup: F) -> Vec<ValidationError>
where
    F: Fn(&str) -> Option<String>,
{
    let mut errors = Vec::new();

    if let Some(addr) = lookup("GATEWAY_BIND_ADDRESS") {
        config.listener.bind_address = addr;
    }

    if let Some(pem) = lookup("GATEWAY_JWT_PUBLIC_KEY") {
        config.auth.public_key_pem = Some(pem);
        config.auth.public_key_path = None;
    }

    if let Some(raw) = lookup("GATEWAY_ALLOW_UNSIGNED_TOKENS") {
        match parse_flag(&raw) {
            Some(flag) => config.auth.allow_unsigned = flag,
            None => errors.push(ValidationError::new(
                "GATEWAY_ALLOW_UNSIGNED_TOKENS",
                format!("'{}' is not a boolean", raw),
            )),
        }
    }

    errors
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Read the configured public key, inline PEM first.
pub fn read_public_key(config: &crate::config::AuthConfig) -> Result<Option<String>, ConfigError> {
    if let Some(pem) = &config.public_key_pem {
        return Ok(Some(pem.clone()));
    }
    match &config.public_key_path {
        Some(path) => fs::read_to_string(path)
            .map(Some)
            .map_err(|source| ConfigError::Io {
                path: PathBuf::from(path),
                source,
            }),
        None => Ok(None),
    }
}
