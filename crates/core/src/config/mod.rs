//! Keeper configuration.
//!
//! Loaded from a TOML file with `${VAR}` environment expansion, optionally
//! overridden from the command line, then validated into typed
//! [`EngineSettings`] and [`KeystoreSettings`] before anything connects.

mod keeper;

pub use keeper::{
    BackfillConfig, ConfigOverrides, ContractsConfig, EngineConfig, EngineSettings, GasConfig,
    KeystoreConfig, KeystoreSettings, LiquidatorConfig, ReconcilerMode, RpcConfig,
    DEFAULT_CONFIG_PATH,
};

use thiserror::Error;

/// Configuration loading and validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("{field}: invalid address {value:?}")]
    InvalidAddress { field: &'static str, value: String },

    #[error("{field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// Expand `${VAR_NAME}` patterns with environment variable values.
///
/// Unset variables are left as written.
pub(crate) fn expand_env(s: &str) -> String {
    let Ok(re) = regex_lite::Regex::new(r"\$\{([^}]+)\}") else {
        return s.to_string();
    };

    re.replace_all(s, |caps: &regex_lite::Captures<'_>| {
        std::env::var(&caps[1]).unwrap_or_else(|_| caps[0].to_string())
    })
    .into_owned()
}
