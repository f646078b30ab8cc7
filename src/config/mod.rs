//! Configuration module for catalog-dr
//!
//! Handles loading and validating configuration from TOML files. Backup
//! rules declared under `[rules.<name>]` become the backup plan guarding the
//! configured table; schedule expressions are validated at load time.

mod loader;
mod types;

pub use loader::{build_plan, load_config, ConfigError, Result};
pub use types::*;
