//! Run configuration. The varying values of an upgrade (package filename,
//! profile name, timeouts) live here and are passed into the orchestrator
//! at construction instead of floating around as globals.

use std::time::Duration;

use derive_getters::Getters;
use serde::{Deserialize, Serialize};

/// Fixed cadence for every bounded polling loop (maintenance-mode entry and
/// exit, shutdown confirmation).
pub const POLL_INTERVAL: Duration = Duration::from_secs(1);

pub fn default_maintenance_enter_timeout_secs() -> u64 {
    45
}

pub fn default_maintenance_exit_timeout_secs() -> u64 {
    5
}

pub fn default_graceful_shutdown_attempts() -> u32 {
    10
}

/// Everything one upgrade run needs to know. Deserialized from the YAML
/// config file; the timeouts fall back to their defaults when omitted.
#[derive(Getters, Debug, Clone, Serialize, Deserialize)]
pub struct UpgradeConfig {
    /// Filename of the depot package, resolved against the package
    /// directory by the caller.
    package: String,
    /// Name of the image profile to apply from the package.
    profile: String,
    /// Seconds to wait for the host to report maintenance mode enabled.
    #[serde(default = "self::default_maintenance_enter_timeout_secs")]
    maintenance_enter_timeout_secs: u64,
    /// Seconds to wait for the host to report maintenance mode disabled.
    /// Exhausting this is a warning, not a failure.
    #[serde(default = "self::default_maintenance_exit_timeout_secs")]
    maintenance_exit_timeout_secs: u64,
    /// Power-state polls to spend on a graceful shutdown before forcing.
    #[serde(default = "self::default_graceful_shutdown_attempts")]
    graceful_shutdown_attempts: u32,
}

impl UpgradeConfig {
    pub fn new<S: Into<String>>(package: S, profile: S) -> Self {
        Self {
            package: package.into(),
            profile: profile.into(),
            maintenance_enter_timeout_secs: default_maintenance_enter_timeout_secs(),
            maintenance_exit_timeout_secs: default_maintenance_exit_timeout_secs(),
            graceful_shutdown_attempts: default_graceful_shutdown_attempts(),
        }
    }

    pub fn with_package<S: Into<String>>(mut self, package: S) -> Self {
        self.package = package.into();
        self
    }

    pub fn with_profile<S: Into<String>>(mut self, profile: S) -> Self {
        self.profile = profile.into();
        self
    }

    pub fn with_maintenance_enter_timeout_secs(mut self, secs: u64) -> Self {
        self.maintenance_enter_timeout_secs = secs;
        self
    }

    pub fn with_graceful_shutdown_attempts(mut self, attempts: u32) -> Self {
        self.graceful_shutdown_attempts = attempts;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = UpgradeConfig::new(
            "VMware-ESXi-8.0U3-24022510-depot.zip",
            "ESXi-8.0U3-24022510-standard",
        );
        assert_eq!(45, *config.maintenance_enter_timeout_secs());
        assert_eq!(5, *config.maintenance_exit_timeout_secs());
        assert_eq!(10, *config.graceful_shutdown_attempts());
    }

    #[test]
    fn test_builders_override_defaults() {
        let config = UpgradeConfig::new("depot.zip", "profile")
            .with_maintenance_enter_timeout_secs(5)
            .with_graceful_shutdown_attempts(2);
        assert_eq!(5, *config.maintenance_enter_timeout_secs());
        assert_eq!(2, *config.graceful_shutdown_attempts());
    }
}
