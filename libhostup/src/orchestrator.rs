//! The top-level state machine:
//!
//! `Prepare → Discover → Quiesce → EnterMaintenance → Upgrade → Decide →
//! {ExitAndReboot | ExitAndRestore}`
//!
//! Strictly linear, with exactly two early-exit branches (maintenance-mode
//! entry failure, unconfirmed upgrade verdict) that converge on the same
//! restore path. Every failure leaves previously-running workloads running
//! again; only the single confirmed-success path reboots.

use crate::config::UpgradeConfig;
use crate::executor::CommandExecutor;
use crate::facts::{PowerState, UpgradeVerdict};
use crate::inventory::{self, Workload};
use crate::lifecycle::{LifecycleController, RestoreOutcome};
use crate::log::*;
use crate::maintenance::MaintenanceController;
use crate::upgrade::UpgradeRunner;

/// Terminal result of one run, mapped to a process exit code by the
/// caller. No error escapes [`Orchestrator::run`]; every way a run can end
/// is one of these.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// Upgrade confirmed, reboot issued.
    UpgradedAndRebooting,
    /// The host never entered maintenance mode; workloads were restored,
    /// the upgrade was never attempted.
    MaintenanceEntryFailed,
    /// The installer's verdict was anything other than a confirmed
    /// reboot-required success; workloads were restored, no reboot.
    UpgradeNotConfirmed(UpgradeVerdict),
}

impl RunOutcome {
    /// Process exit status for this outcome. Code 1 is reserved for the
    /// caller's own preflight failures and is never produced here.
    pub fn exit_code(&self) -> i32 {
        match self {
            RunOutcome::UpgradedAndRebooting => 0,
            RunOutcome::MaintenanceEntryFailed => 2,
            RunOutcome::UpgradeNotConfirmed(_) => 3,
        }
    }
}

/// What the run has touched, which is everything rollback needs and
/// nothing more. Owned by the orchestrator for exactly one run.
#[derive(Debug, Default)]
struct RunContext {
    /// Ids that were powered on at discovery, in discovery order. Computed
    /// once before any workload is touched and never recomputed, so
    /// rollback re-powers exactly what the run found running, independent
    /// of anything done to them since.
    restore_set: Vec<String>,
    maintenance_entered: bool,
}

pub struct Orchestrator<E> {
    exec: E,
    lifecycle: LifecycleController,
    maintenance: MaintenanceController,
    upgrade: UpgradeRunner,
}

impl<E: CommandExecutor> Orchestrator<E> {
    pub fn new(exec: E, config: &UpgradeConfig) -> Self {
        Self {
            exec,
            lifecycle: LifecycleController::new(*config.graceful_shutdown_attempts()),
            maintenance: MaintenanceController::new(
                *config.maintenance_enter_timeout_secs(),
                *config.maintenance_exit_timeout_secs(),
            ),
            upgrade: UpgradeRunner::new(config.profile().clone()),
        }
    }

    /// Drive the whole upgrade against the given package path.
    #[tracing::instrument(skip(self))]
    pub async fn run(&mut self, package_path: &str) -> RunOutcome {
        self.prepare().await;

        let mut workloads = self.discover().await;
        let mut ctx = RunContext {
            restore_set: workloads
                .iter()
                .filter(|workload| *workload.power() == PowerState::PoweredOn)
                .map(|workload| workload.id().clone())
                .collect(),
            maintenance_entered: false,
        };
        println!(
            "* discovered {} workloads, {} running",
            workloads.len(),
            ctx.restore_set.len()
        );

        self.quiesce_running(&mut workloads, &ctx).await;

        if let Err(err) = self.maintenance.enter(&mut self.exec).await {
            error!("{}", err);
            println!("* host never entered maintenance mode, restoring workloads");
            self.exit_and_restore(&ctx).await;
            return RunOutcome::MaintenanceEntryFailed;
        }
        ctx.maintenance_entered = true;

        let verdict = self.upgrade.apply(&mut self.exec, package_path).await;
        match verdict {
            UpgradeVerdict::SuccessRebootRequired => {
                println!("* upgrade confirmed, rebooting host");
                self.exit_and_reboot().await;
                RunOutcome::UpgradedAndRebooting
            }
            verdict => {
                warn!("upgrade not confirmed ({}), rolling back", verdict);
                println!("* upgrade not confirmed ({}), restoring workloads", verdict);
                self.exit_and_restore(&ctx).await;
                RunOutcome::UpgradeNotConfirmed(verdict)
            }
        }
    }

    /// Keep the host reachable after the reboot and make the auto-start
    /// entries registered during quiesce take effect.
    async fn prepare(&mut self) {
        info!("enabling ssh and the auto-start manager");
        self.exec.execute("vim-cmd hostsvc/enable_ssh").await;
        self.exec
            .execute("vim-cmd hostsvc/autostartmanager/enable_autostart 1")
            .await;
    }

    async fn discover(&mut self) -> Vec<Workload> {
        let mut workloads = inventory::discover(&mut self.exec).await;
        for workload in workloads.iter_mut() {
            inventory::refresh_power_state(&mut self.exec, workload).await;
        }
        workloads
    }

    /// Quiesce every workload in the restore set, registering auto-start
    /// entries with strictly increasing sequence numbers in discovery
    /// order along the way.
    async fn quiesce_running(&mut self, workloads: &mut [Workload], ctx: &RunContext) {
        let mut sequence = 1u32;
        for workload in workloads.iter_mut() {
            if !ctx.restore_set.contains(workload.id()) {
                debug!("workload {}: not running, leaving it alone", workload.id());
                continue;
            }
            self.lifecycle
                .register_autostart(&mut self.exec, workload.id(), sequence)
                .await;
            let outcome = self.lifecycle.quiesce(&mut self.exec, workload).await;
            println!("* workload {} quiesced ({:?})", workload.id(), outcome);
            sequence += 1;
        }
    }

    /// The converged rollback path both failure branches land on.
    async fn exit_and_restore(&mut self, ctx: &RunContext) {
        self.maintenance.exit(&mut self.exec).await;

        let report = self
            .lifecycle
            .restore(&mut self.exec, &ctx.restore_set)
            .await;
        for (id, outcome) in report.attempts() {
            if let RestoreOutcome::Failed(detail) = outcome {
                warn!("workload {} was not restored: {}", id, detail);
            }
        }
        if report.is_clean() {
            println!("* workloads restored");
        } else {
            println!(
                "* rollback finished, but these workloads need attention: {:?}",
                report.failures()
            );
        }
        if !ctx.maintenance_entered {
            println!("* the upgrade was never attempted; the host software is unchanged");
        }
    }

    async fn exit_and_reboot(&mut self) {
        self.maintenance.exit(&mut self.exec).await;
        info!("issuing reboot");
        self.exec.execute("reboot now").await;
        // Nothing to observe past this point; the reboot severs the shell
        // this process runs in.
    }
}
