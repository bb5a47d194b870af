//! Configuration management
//!
//! Precedence, lowest first: built-in defaults, TOML file, environment
//! variables, command-line flags (applied by the binary).

mod env;
mod file;
mod settings;

use std::path::Path;

pub use env::apply_overrides;
pub use settings::{
    EdgeSettings, IdpSettings, OrchestratorSettings, ResourceSettings, ServiceKind, Settings,
    TelemetryConfig,
};

use crate::Result;

/// Load settings from `path` (or the first default location that exists),
/// then apply environment overrides.
pub fn load_settings(path: Option<&Path>) -> Result<Settings> {
    let found;
    let path = match path {
        Some(p) => Some(p),
        None => {
            found = file::find_config_file();
            found.as_deref()
        }
    };

    let mut settings = match path {
        Some(p) => {
            tracing::info!("Loading configuration from {}", p.display());
            file::load_from_file(p)?
        }
        None => Settings::default(),
    };

    env::load_from_env(&mut settings);
    Ok(settings)
}
