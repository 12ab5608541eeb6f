//! Enforcement mode

use serde::{Deserialize, Serialize};
use std::fmt::{self, Display, Formatter};

/// Gate enforcement mode
///
/// Derived from the `enabled` and `strict` flags. Transitions only happen
/// through explicit administrative calls.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EnforcementMode {
    /// Payloads pass unchecked
    Disabled,
    /// Failures are recorded, then repaired once
    EnabledPermissive,
    /// Failures are recorded and rejected
    #[default]
    EnabledStrict,
}

impl EnforcementMode {
    /// Mode for the given flags
    #[inline]
    #[must_use]
    pub const fn from_flags(enabled: bool, strict: bool) -> Self {
        match (enabled, strict) {
            (false, _) => Self::Disabled,
            (true, false) => Self::EnabledPermissive,
            (true, true) => Self::EnabledStrict,
        }
    }

    /// Whether validation runs at all
    #[inline]
    #[must_use]
    pub const fn is_enabled(&self) -> bool {
        !matches!(self, Self::Disabled)
    }

    /// Whether failures are rejected without repair
    #[inline]
    #[must_use]
    pub const fn is_strict(&self) -> bool {
        matches!(self, Self::EnabledStrict)
    }

    /// Mode name
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Disabled => "DISABLED",
            Self::EnabledPermissive => "ENABLED_PERMISSIVE",
            Self::EnabledStrict => "ENABLED_STRICT",
        }
    }
}

impl Display for EnforcementMode {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
