//! CLI configuration file.
//!
//! A small TOML document supplies defaults for values an operator would
//! otherwise repeat on every invocation.  Command-line flags always win over
//! file values.
//!
//! Example:
//! ```toml
//! db = "/var/lib/custodia/audit.db"
//!
//! [verify]
//! batch_size = 1024
//! report_all_breaks = true
//! ```

use std::path::{Path, PathBuf};

use serde::Deserialize;

use custodia_contracts::error::{CustodiaError, CustodiaResult};

/// The path probed when no `--config` flag is given.
const DEFAULT_CONFIG_PATH: &str = "custodia.toml";

/// Defaults for the verify subcommand.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct VerifySection {
    pub batch_size: Option<usize>,
    pub report_all_breaks: Option<bool>,
}

/// The top-level structure deserialized from the TOML config file.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CliConfig {
    /// Path to the audit database.
    pub db: Option<PathBuf>,

    #[serde(default)]
    pub verify: VerifySection,
}

impl CliConfig {
    /// Load configuration.
    ///
    /// An explicitly given path must exist and parse; the default path is
    /// optional and silently skipped when absent.
    pub fn load(explicit: Option<&Path>) -> CustodiaResult<Self> {
        let path = match explicit {
            Some(path) => path.to_path_buf(),
            None => {
                let default = PathBuf::from(DEFAULT_CONFIG_PATH);
                if !default.exists() {
                    return Ok(Self::default());
                }
                default
            }
        };

        let text = std::fs::read_to_string(&path).map_err(|e| CustodiaError::Configuration {
            reason: format!("cannot read config file '{}': {e}", path.display()),
        })?;

        toml::from_str(&text).map_err(|e| CustodiaError::Configuration {
            reason: format!("invalid config file '{}': {e}", path.display()),
        })
    }
}
