//! Gate configuration
//!
//! Loaded from TOML. Every key is optional and falls back to the defaults
//! below.
//!
//! ```toml
//! enabled = true
//! strict = false
//! log_dir = "/var/log/doctrine"
//!
//! [nuclear]
//! max_violations = 3
//! exit_code = 200
//! ```

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// Default audit directory for the standard gate
pub const DEFAULT_LOG_DIR: &str = "doctrine-logs";

/// Default audit directory for the zero-tolerance gate
pub const DEFAULT_NUCLEAR_LOG_DIR: &str = "nuclear-doctrine-logs";

/// Default violation limit: zero tolerance
pub const DEFAULT_MAX_VIOLATIONS: u32 = 1;

/// Default process exit code on zero-tolerance shutdown
pub const DEFAULT_EXIT_CODE: i32 = 255;

/// Default manual recovery authorization code
pub const DEFAULT_RECOVERY_CODE: &str = "ENVELOPE_DOCTRINE_EMERGENCY_OVERRIDE_2025";

/// Standard gate configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GateConfig {
    /// Validation on (default true)
    pub enabled: bool,
    /// Reject instead of repair (default true)
    pub strict: bool,
    /// Audit directory
    pub log_dir: PathBuf,
    /// Zero-tolerance settings
    pub nuclear: NuclearConfig,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            strict: true,
            log_dir: PathBuf::from(DEFAULT_LOG_DIR),
            nuclear: NuclearConfig::default(),
        }
    }
}

impl GateConfig {
    /// Default configuration
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse from TOML text
    ///
    /// # Errors
    /// [`ConfigError::Parse`] for malformed TOML, [`ConfigError::Invalid`] for
    /// out-of-range values.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a TOML file
    ///
    /// # Errors
    /// [`ConfigError::Io`] if the file cannot be read, otherwise as
    /// [`GateConfig::from_toml_str`].
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    /// Check value ranges
    ///
    /// # Errors
    /// [`ConfigError::Invalid`] describing the first bad value.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.nuclear.max_violations == 0 {
            return Err(ConfigError::invalid("nuclear.max_violations must be at least 1"));
        }
        if self.nuclear.recovery_code.trim().is_empty() {
            return Err(ConfigError::invalid("nuclear.recovery_code must not be empty"));
        }
        Ok(())
    }

    /// With validation on or off
    #[inline]
    #[must_use]
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// With strict or permissive policy
    #[inline]
    #[must_use]
    pub fn with_strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    /// With audit directory
    #[inline]
    #[must_use]
    pub fn with_log_dir(mut self, log_dir: impl Into<PathBuf>) -> Self {
        self.log_dir = log_dir.into();
        self
    }

    /// With zero-tolerance settings
    #[inline]
    #[must_use]
    pub fn with_nuclear(mut self, nuclear: NuclearConfig) -> Self {
        self.nuclear = nuclear;
        self
    }
}

/// Zero-tolerance configuration
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NuclearConfig {
    /// Violations before shutdown (default 1)
    pub max_violations: u32,
    /// Process exit code on shutdown
    pub exit_code: i32,
    /// Audit directory
    pub log_dir: PathBuf,
    /// Manual recovery authorization code
    pub recovery_code: String,
}

impl Default for NuclearConfig {
    fn default() -> Self {
        Self {
            max_violations: DEFAULT_MAX_VIOLATIONS,
            exit_code: DEFAULT_EXIT_CODE,
            log_dir: PathBuf::from(DEFAULT_NUCLEAR_LOG_DIR),
            recovery_code: DEFAULT_RECOVERY_CODE.to_string(),
        }
    }
}

impl fmt::Debug for NuclearConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NuclearConfig")
            .field("max_violations", &self.max_violations)
            .field("exit_code", &self.exit_code)
            .field("log_dir", &self.log_dir)
            .field("recovery_code", &crate::violation::REDACTED)
            .finish()
    }
}

impl NuclearConfig {
    /// With violation limit
    #[inline]
    #[must_use]
    pub fn with_max_violations(mut self, max_violations: u32) -> Self {
        self.max_violations = max_violations;
        self
    }

    /// With shutdown exit code
    #[inline]
    #[must_use]
    pub fn with_exit_code(mut self, exit_code: i32) -> Self {
        self.exit_code = exit_code;
        self
    }

    /// With audit directory
    #[inline]
    #[must_use]
    pub fn with_log_dir(mut self, log_dir: impl Into<PathBuf>) -> Self {
        self.log_dir = log_dir.into();
        self
    }

    /// With recovery code
    #[inline]
    #[must_use]
    pub fn with_recovery_code(mut self, recovery_code: impl Into<String>) -> Self {
        self.recovery_code = recovery_code.into();
        self
    }
}
