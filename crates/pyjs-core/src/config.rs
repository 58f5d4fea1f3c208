//! Build settings.
//!
//! Settings are resolved from built-in defaults, then an optional
//! `pyjs.toml`, then command-line flags. Unknown keys in the file are
//! rejected when it is loaded.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Python version built when none is requested.
pub const DEFAULT_PYTHON_VERSION: &str = "3.11.7";
/// bzip2 version built as a Python dependency.
pub const DEFAULT_BZ2_VERSION: &str = "1.0.8";
/// OpenSSL version built as a Python dependency.
pub const DEFAULT_SSL_VERSION: &str = "1.1.1w";
/// xz version built as a Python dependency.
pub const DEFAULT_XZ_VERSION: &str = "5.2.5";
/// Minimum macOS release the produced binaries support.
pub const DEFAULT_MAC_DEP_TARGET: &str = "10.13";

/// File name looked up at the project root when no `--config` is given.
pub const SETTINGS_FILE: &str = "pyjs.toml";

/// Options shared by every builder in one invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    /// Run the download stage.
    pub download: bool,
    /// Run the build stage.
    pub build: bool,
    /// Run the clean stage.
    pub clean: bool,
    /// Run the full install pipeline.
    pub install: bool,
    /// Build for release (passed through to packaging collaborators).
    pub release: bool,
    /// Print the plan instead of running it.
    pub dry_run: bool,
    /// Byte-compile the standard library before zipping it.
    pub precompile: bool,
    /// Python version to build.
    pub python_version: String,
    /// bzip2 version to build.
    pub bz2_version: String,
    /// OpenSSL version to build.
    pub ssl_version: String,
    /// xz version to build.
    pub xz_version: String,
    /// Value of `MACOSX_DEPLOYMENT_TARGET` for every compile.
    pub mac_dep_target: String,
    /// Parallel `make` jobs; defaults to the number of logical CPUs.
    pub jobs: Option<usize>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            download: false,
            build: false,
            clean: false,
            install: false,
            release: false,
            dry_run: false,
            precompile: false,
            python_version: DEFAULT_PYTHON_VERSION.to_string(),
            bz2_version: DEFAULT_BZ2_VERSION.to_string(),
            ssl_version: DEFAULT_SSL_VERSION.to_string(),
            xz_version: DEFAULT_XZ_VERSION.to_string(),
            mac_dep_target: DEFAULT_MAC_DEP_TARGET.to_string(),
            jobs: None,
        }
    }
}

impl Settings {
    /// Parse settings from TOML text. Missing keys take their defaults.
    ///
    /// # Errors
    ///
    /// Returns [`BuildError::Settings`](crate::BuildError::Settings) on
    /// malformed TOML or an unrecognised key.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Load settings from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    /// Load `pyjs.toml` from `root` if present, otherwise the defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load_or_default(root: &Path) -> Result<Self> {
        let path = root.join(SETTINGS_FILE);
        if path.exists() {
            tracing::debug!("loading settings from {}", path.display());
            Self::load(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// True when no explicit stage flag was requested.
    pub fn no_stage_requested(&self) -> bool {
        !(self.download || self.build || self.clean || self.install)
    }

    /// Parallel jobs for `make`.
    pub fn jobs(&self) -> usize {
        self.jobs.unwrap_or_else(num_cpus::get).max(1)
    }
}
