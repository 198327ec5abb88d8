//! Structured fact extraction from raw host command output.
//!
//! Management commands answer in loosely structured `key = "value"` text.
//! Everything the orchestration decides on comes through here, and every
//! fact that can't be located parses to an explicit `Unknown` rather than a
//! default. Ambiguity always lands on the conservative branch: forced
//! shutdown, rollback, no reboot.

use std::fmt;

/// Pull a single `key = "value"` field out of command output.
///
/// Finds the first line containing `key`, splits on the first `=`, and
/// strips quotes, trailing commas, and surrounding whitespace. `None` means
/// the fact is absent; callers map that to their `Unknown` variant, never
/// to a successful empty value.
pub fn extract_field<'a>(output: &'a str, key: &str) -> Option<&'a str> {
    for line in output.lines() {
        if !line.contains(key) {
            continue;
        }
        if let Some((_, value)) = line.split_once('=') {
            return Some(value.trim().trim_end_matches(',').trim_matches('"').trim());
        }
    }
    None
}

/// Power state of a workload as the host reports it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PowerState {
    PoweredOn,
    PoweredOff,
    Unknown,
}

impl PowerState {
    /// Parse from `vim-cmd vmsvc/get.summary` output. Anything other than
    /// the two known markers, including a missing field, is `Unknown`.
    pub fn from_summary(output: &str) -> Self {
        match extract_field(output, "powerState") {
            Some("poweredOn") => PowerState::PoweredOn,
            Some("poweredOff") => PowerState::PoweredOff,
            _ => PowerState::Unknown,
        }
    }
}

/// Health of the in-guest management agent, which decides whether a guest
/// can be asked to shut itself down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolsStatus {
    Ok,
    /// Present but out of date; still able to service a shutdown request.
    Degraded,
    Unavailable,
    Unknown,
}

impl ToolsStatus {
    /// Parse from `vim-cmd vmsvc/get.guest` output.
    pub fn from_guest_info(output: &str) -> Self {
        match extract_field(output, "toolsStatus") {
            Some("toolsOk") => ToolsStatus::Ok,
            Some("toolsOld") => ToolsStatus::Degraded,
            Some("toolsNotInstalled") | Some("toolsNotRunning") => ToolsStatus::Unavailable,
            _ => ToolsStatus::Unknown,
        }
    }

    pub fn supports_graceful_shutdown(&self) -> bool {
        matches!(self, ToolsStatus::Ok | ToolsStatus::Degraded)
    }
}

/// The host's exclusive maintenance state. Never cached: every check
/// re-runs the query command and parses its whole (trimmed) output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaintenanceState {
    Enabled,
    Disabled,
    Unknown,
}

impl MaintenanceState {
    pub fn from_query(output: &str) -> Self {
        let trimmed = output.trim();
        if trimmed.eq_ignore_ascii_case("enabled") {
            MaintenanceState::Enabled
        } else if trimmed.eq_ignore_ascii_case("disabled") {
            MaintenanceState::Disabled
        } else {
            MaintenanceState::Unknown
        }
    }
}

pub const UPGRADE_SUCCESS_MARKER: &str = "The update completed successfully";
pub const REBOOT_REQUIRED_MARKER: &str = "Reboot Required: true";
const REBOOT_NOT_REQUIRED_MARKER: &str = "Reboot Required: false";

/// Error classes the installer prints on its own failure paths.
const INSTALLER_FAILURE_MARKERS: &[&str] =
    &["[InstallationError]", "[NoMatchError]", "[DependencyError]", "[HardwareError]"];

/// What the installer's output says happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpgradeVerdict {
    /// Both the success and the reboot-required markers were present.
    SuccessRebootRequired,
    /// Success reported with reboot explicitly not required. Still a
    /// software change this orchestration doesn't separately handle, so
    /// not a reboot path.
    SuccessNoReboot,
    /// The installer reported one of its known error classes.
    Failure,
    /// Output matched no known pattern. Treated exactly like a failure.
    Indeterminate,
}

impl UpgradeVerdict {
    /// Classify installer output by substring matching against the known
    /// markers. A success line without an explicit reboot line is
    /// `Indeterminate` on purpose: "succeeded, reboot unclear" is not a
    /// state this orchestration is willing to reboot from.
    pub fn classify(output: &str) -> Self {
        if output.contains(UPGRADE_SUCCESS_MARKER) {
            if output.contains(REBOOT_REQUIRED_MARKER) {
                UpgradeVerdict::SuccessRebootRequired
            } else if output.contains(REBOOT_NOT_REQUIRED_MARKER) {
                UpgradeVerdict::SuccessNoReboot
            } else {
                UpgradeVerdict::Indeterminate
            }
        } else if INSTALLER_FAILURE_MARKERS
            .iter()
            .any(|marker| output.contains(marker))
        {
            UpgradeVerdict::Failure
        } else {
            UpgradeVerdict::Indeterminate
        }
    }
}

impl fmt::Display for UpgradeVerdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            UpgradeVerdict::SuccessRebootRequired => "success, reboot required",
            UpgradeVerdict::SuccessNoReboot => "success, no reboot",
            UpgradeVerdict::Failure => "failure",
            UpgradeVerdict::Indeterminate => "indeterminate",
        };
        write!(f, "{}", name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const GUEST_INFO: &str = r#"Guest information:

(vim.vm.GuestInfo) {
   dynamicType = <unset>,
   toolsStatus = "toolsOk",
   toolsVersionStatus = "guestToolsCurrent",
   toolsRunningStatus = "guestToolsRunning",
   guestId = "centos8_64Guest",
}"#;

    const SUMMARY: &str = r#"Listsummary:
(vim.vm.Summary) {
   runtime = (vim.vm.RuntimeInfo) {
      powerState = "poweredOn",
      connectionState = "connected",
   },
   overallStatus = "green",
}"#;

    #[test]
    fn test_extract_field_strips_quotes_and_commas() {
        assert_eq!(Some("toolsOk"), extract_field(GUEST_INFO, "toolsStatus"));
        assert_eq!(Some("poweredOn"), extract_field(SUMMARY, "powerState"));
    }

    #[test]
    fn test_extract_field_absent_key_is_none() {
        assert_eq!(None, extract_field(SUMMARY, "toolsStatus"));
        assert_eq!(None, extract_field("", "powerState"));
    }

    #[test]
    fn test_power_state_parsing() {
        assert_eq!(PowerState::PoweredOn, PowerState::from_summary(SUMMARY));
        assert_eq!(
            PowerState::PoweredOff,
            PowerState::from_summary("   powerState = \"poweredOff\",")
        );
        // A garbled or empty response must never read as a live state.
        assert_eq!(PowerState::Unknown, PowerState::from_summary(""));
        assert_eq!(
            PowerState::Unknown,
            PowerState::from_summary("powerState = \"suspended\",")
        );
    }

    #[test]
    fn test_tools_status_parsing() {
        assert_eq!(ToolsStatus::Ok, ToolsStatus::from_guest_info(GUEST_INFO));
        assert_eq!(
            ToolsStatus::Degraded,
            ToolsStatus::from_guest_info("toolsStatus = \"toolsOld\",")
        );
        assert_eq!(
            ToolsStatus::Unavailable,
            ToolsStatus::from_guest_info("toolsStatus = \"toolsNotRunning\",")
        );
        assert_eq!(ToolsStatus::Unknown, ToolsStatus::from_guest_info(""));
    }

    #[test]
    fn test_graceful_shutdown_support() {
        assert!(ToolsStatus::Ok.supports_graceful_shutdown());
        assert!(ToolsStatus::Degraded.supports_graceful_shutdown());
        assert!(!ToolsStatus::Unavailable.supports_graceful_shutdown());
        assert!(!ToolsStatus::Unknown.supports_graceful_shutdown());
    }

    #[test]
    fn test_maintenance_state_parsing() {
        assert_eq!(
            MaintenanceState::Enabled,
            MaintenanceState::from_query("Enabled\n")
        );
        assert_eq!(
            MaintenanceState::Disabled,
            MaintenanceState::from_query("   disabled  ")
        );
        assert_eq!(MaintenanceState::Unknown, MaintenanceState::from_query(""));
        assert_eq!(
            MaintenanceState::Unknown,
            MaintenanceState::from_query("connection refused")
        );
    }

    #[test]
    fn test_verdict_requires_both_markers_for_reboot() {
        let output = r#"Update Result
   Message: The update completed successfully, but the system needs to be rebooted for the changes to be effective.
   Reboot Required: true
   VIBs Installed: VMware_bootbank_esx-base_8.0.3-0.35.24022510"#;
        assert_eq!(
            UpgradeVerdict::SuccessRebootRequired,
            UpgradeVerdict::classify(output)
        );
    }

    #[test]
    fn test_verdict_success_without_reboot_line_is_indeterminate() {
        let output = "Update Result\n   Message: The update completed successfully.\n";
        assert_eq!(UpgradeVerdict::Indeterminate, UpgradeVerdict::classify(output));
    }

    #[test]
    fn test_verdict_success_with_explicit_no_reboot() {
        let output =
            "Update Result\n   Message: The update completed successfully.\n   Reboot Required: false\n";
        assert_eq!(UpgradeVerdict::SuccessNoReboot, UpgradeVerdict::classify(output));
    }

    #[test]
    fn test_verdict_installer_error_is_failure() {
        let output = r#" [NoMatchError]
 No image profile found with name 'ESXi-8.0U3-24022510-standard'
 Please refer to the log file for more details."#;
        assert_eq!(UpgradeVerdict::Failure, UpgradeVerdict::classify(output));
    }

    #[test]
    fn test_verdict_empty_or_garbled_output_is_indeterminate() {
        assert_eq!(UpgradeVerdict::Indeterminate, UpgradeVerdict::classify(""));
        assert_eq!(
            UpgradeVerdict::Indeterminate,
            UpgradeVerdict::classify("ssh_exchange_identification: read: Connection reset")
        );
    }
}
