//! Per-workload power lifecycle: taking workloads down before the upgrade
//! and putting them back on rollback.

use derive_getters::Getters;

use crate::config::POLL_INTERVAL;
use crate::executor::CommandExecutor;
use crate::facts::PowerState;
use crate::inventory::{self, Workload};
use crate::log::*;

/// How a workload ended up off.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuiesceOutcome {
    /// The guest shut itself down within the attempt budget.
    Graceful,
    /// The guest was asked first, didn't go down in time, and was forced.
    ForcedAfterTimeout,
    /// The guest agent was unavailable; forced without asking.
    Forced,
}

/// Result of one restore attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RestoreOutcome {
    /// Was off, power-on issued and accepted.
    PoweredOn,
    /// Already running; not touched.
    AlreadyRunning,
    /// Current state couldn't be read, so no power-on was attempted.
    Unobservable,
    /// Power-on was issued and the host reported a fault.
    Failed(String),
}

/// Per-workload record of a rollback. Failures are collected, never raised:
/// finishing the rest of the restore matters more than any one workload.
#[derive(Getters, Debug, Clone, Default)]
pub struct RestoreReport {
    attempts: Vec<(String, RestoreOutcome)>,
}

impl RestoreReport {
    pub fn is_clean(&self) -> bool {
        self.failures().is_empty()
    }

    pub fn failures(&self) -> Vec<&str> {
        self.attempts
            .iter()
            .filter(|(_, outcome)| {
                matches!(outcome, RestoreOutcome::Failed(_) | RestoreOutcome::Unobservable)
            })
            .map(|(id, _)| id.as_str())
            .collect()
    }
}

#[derive(Debug, Clone)]
pub struct LifecycleController {
    graceful_shutdown_attempts: u32,
}

impl LifecycleController {
    pub fn new(graceful_shutdown_attempts: u32) -> Self {
        Self {
            graceful_shutdown_attempts,
        }
    }

    /// Take one workload down, gracefully when the in-guest agent allows
    /// it. The graceful path always precedes any forced power-off; a guest
    /// without a usable agent is forced without being asked.
    #[tracing::instrument(skip(self, exec, workload))]
    pub async fn quiesce<E: CommandExecutor + ?Sized>(
        &self,
        exec: &mut E,
        workload: &mut Workload,
    ) -> QuiesceOutcome {
        inventory::refresh_tools_status(exec, workload).await;

        if workload.tools().supports_graceful_shutdown() {
            info!(
                "workload {}: guest agent is {:?}, requesting shutdown",
                workload.id(),
                workload.tools()
            );
            if self.graceful_shutdown(exec, workload).await {
                return QuiesceOutcome::Graceful;
            }
            warn!(
                "workload {}: still powered on after {} polls, forcing power-off",
                workload.id(),
                self.graceful_shutdown_attempts
            );
            self.force_off(exec, workload.id()).await;
            QuiesceOutcome::ForcedAfterTimeout
        } else {
            info!(
                "workload {}: guest agent is {:?}, forcing power-off",
                workload.id(),
                workload.tools()
            );
            self.force_off(exec, workload.id()).await;
            QuiesceOutcome::Forced
        }
    }

    /// Ask the guest to shut down, then poll its power state once per
    /// interval. Losing observability counts as down: once the state stops
    /// reading `PoweredOn` the guest is no longer servable either way.
    async fn graceful_shutdown<E: CommandExecutor + ?Sized>(
        &self,
        exec: &mut E,
        workload: &mut Workload,
    ) -> bool {
        exec.execute(&format!("vim-cmd vmsvc/power.shutdown {}", workload.id()))
            .await;

        for _ in 0..self.graceful_shutdown_attempts {
            inventory::refresh_power_state(exec, workload).await;
            if *workload.power() != PowerState::PoweredOn {
                info!("workload {}: down", workload.id());
                return true;
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
        false
    }

    /// Immediate power-off, fire-and-forget. The result is not re-checked;
    /// by the time this runs the host may already be unreachable by other
    /// means.
    async fn force_off<E: CommandExecutor + ?Sized>(&self, exec: &mut E, id: &str) {
        exec.execute(&format!("vim-cmd vmsvc/power.off {}", id))
            .await;
    }

    /// Re-power every workload in the restore set that is currently off.
    ///
    /// Attempts are independent: a fault on one workload is recorded and
    /// the loop moves on. Workloads already running are left alone, and a
    /// workload whose state can't be read is skipped rather than blindly
    /// powered on.
    #[tracing::instrument(skip(self, exec, ids))]
    pub async fn restore<E: CommandExecutor + ?Sized>(
        &self,
        exec: &mut E,
        ids: &[String],
    ) -> RestoreReport {
        let mut attempts = vec![];
        for id in ids {
            let output = exec
                .execute(&format!("vim-cmd vmsvc/get.summary {}", id))
                .await;
            let outcome = match PowerState::from_summary(&output) {
                PowerState::PoweredOn => {
                    debug!("workload {}: already running, leaving it alone", id);
                    RestoreOutcome::AlreadyRunning
                }
                PowerState::Unknown => {
                    warn!("workload {}: state unreadable, not powering on", id);
                    RestoreOutcome::Unobservable
                }
                PowerState::PoweredOff => {
                    let response = exec
                        .execute(&format!("vim-cmd vmsvc/power.on {}", id))
                        .await;
                    if looks_like_fault(&response) {
                        warn!("workload {}: power-on faulted: {}", id, response.trim());
                        RestoreOutcome::Failed(response.trim().to_string())
                    } else {
                        info!("workload {}: powered back on", id);
                        RestoreOutcome::PoweredOn
                    }
                }
            };
            attempts.push((id.clone(), outcome));
        }
        RestoreReport { attempts }
    }

    /// Register the workload with the host's auto-start manager under the
    /// given sequence number, so workloads restart in discovery order after
    /// the post-upgrade reboot.
    #[tracing::instrument(skip(self, exec))]
    pub async fn register_autostart<E: CommandExecutor + ?Sized>(
        &self,
        exec: &mut E,
        id: &str,
        sequence: u32,
    ) {
        let command = format!(
            "vim-cmd hostsvc/autostartmanager/update_autostartentry {} \"PowerOn\" \"15\" \"{}\" \"systemDefault\" \"systemDefault\" \"systemDefault\"",
            id, sequence
        );
        exec.execute(&command).await;
    }
}

fn looks_like_fault(output: &str) -> bool {
    let lowered = output.to_ascii_lowercase();
    lowered.contains("fault") || lowered.contains("fail")
}
