//! Environment-driven configuration.
//!
//! | Variable | Field |
//! |----------|-------|
//! | `AKI_API_KEY` | `api_key` |
//! | `AKI_API_SERVER` | `api_server` (default `https://aki.io`) |
//! | `AKI_OUTPUT_BINARY_FORMAT` | `output_binary_format` (`encoded`/`base64` or `raw-bytes`/`byte_string`) |
//!
//! Unset or empty variables keep the defaults.

use aki_protocol::{AkiError, ApiKey, ClientConfig, EndpointName, OutputBinaryFormat};

pub const API_KEY_VAR: &str = "AKI_API_KEY";
pub const API_SERVER_VAR: &str = "AKI_API_SERVER";
pub const OUTPUT_BINARY_FORMAT_VAR: &str = "AKI_OUTPUT_BINARY_FORMAT";

/// Builds the configuration for `endpoint` from the process environment.
pub fn load_config_from_env(endpoint: &str) -> Result<ClientConfig, AkiError> {
    config_from_lookup(endpoint, |name| std::env::var(name).ok())
}

/// Builds the configuration for `endpoint`, reading variables through `lookup`.
pub fn config_from_lookup<F>(endpoint: &str, lookup: F) -> Result<ClientConfig, AkiError>
where
    F: Fn(&str) -> Option<String>,
{
    let endpoint =
        EndpointName::new(endpoint).ok_or_else(|| AkiError::configuration("endpoint name must not be empty"))?;
    let value = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

    let mut config = ClientConfig::new(endpoint);
    if let Some(key) = value(API_KEY_VAR).and_then(ApiKey::new) {
        config = config.with_api_key(key);
    }
    if let Some(server) = value(API_SERVER_VAR) {
        config = config.with_api_server(server.trim());
    }
    if let Some(format) = value(OUTPUT_BINARY_FORMAT_VAR) {
        let format = format
            .parse::<OutputBinaryFormat>()
            .map_err(|e| AkiError::configuration(format!("{OUTPUT_BINARY_FORMAT_VAR}: {e}")))?;
        config = config.with_output_binary_format(format);
    }
    Ok(config)
}
