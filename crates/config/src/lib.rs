//! Configuration loading, validation, and env substitution.
//!
//! Config files: `parley.toml`, `parley.yaml`, or `parley.json`
//! Searched in `./` then `~/.config/parley/`.
//!
//! Supports `${ENV_VAR}` and `${ENV_VAR:-default}` substitution in the raw file.

pub mod env_subst;
pub mod error;
pub mod loader;
pub mod schema;
pub mod validate;

pub use {
    error::{Error, Result},
    loader::{
        config_dir, discover_and_load, find_config_file, find_or_default_config_path, load_config,
        to_toml_string,
    },
    schema::{DispatchConfig, MetricsConfig, ParleyConfig, ReplyConfig, SessionConfig},
    validate::{Diagnostic, Severity, ValidationResult, validate, validate_file},
};
