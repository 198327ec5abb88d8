//! Driving the host's exclusive maintenance state on and off.

use thiserror::Error;

use crate::config::POLL_INTERVAL;
use crate::executor::CommandExecutor;
use crate::facts::MaintenanceState;
use crate::log::*;

/// The host never reported maintenance mode enabled in time. Fatal to the
/// upgrade path, but handled by rolling back, never by crashing.
#[derive(Error, Debug)]
#[error("host did not report maintenance mode enabled within {waited_secs}s")]
pub struct MaintenanceEnterTimeout {
    pub waited_secs: u64,
}

#[derive(Debug, Clone)]
pub struct MaintenanceController {
    enter_timeout_secs: u64,
    exit_timeout_secs: u64,
}

impl MaintenanceController {
    pub fn new(enter_timeout_secs: u64, exit_timeout_secs: u64) -> Self {
        Self {
            enter_timeout_secs,
            exit_timeout_secs,
        }
    }

    /// Put the host into maintenance mode and poll once per interval until
    /// it reports so. Returns on the first `Enabled` observation.
    #[tracing::instrument(skip(self, exec))]
    pub async fn enter<E: CommandExecutor + ?Sized>(
        &self,
        exec: &mut E,
    ) -> Result<(), MaintenanceEnterTimeout> {
        info!("entering maintenance mode");
        exec.execute("esxcli system maintenanceMode set --enable true")
            .await;

        for _ in 0..self.enter_timeout_secs {
            if self.query(exec).await == MaintenanceState::Enabled {
                info!("host is in maintenance mode");
                return Ok(());
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
        Err(MaintenanceEnterTimeout {
            waited_secs: self.enter_timeout_secs,
        })
    }

    /// Bring the host back out. A host that keeps reporting enabled past
    /// the (short) exit bound is left for manual intervention: workload
    /// restoration must not block on it, so this warns and reports rather
    /// than failing.
    #[tracing::instrument(skip(self, exec))]
    pub async fn exit<E: CommandExecutor + ?Sized>(&self, exec: &mut E) -> bool {
        info!("exiting maintenance mode");
        exec.execute("esxcli system maintenanceMode set --enable false")
            .await;

        for _ in 0..self.exit_timeout_secs {
            if self.query(exec).await == MaintenanceState::Disabled {
                info!("host is out of maintenance mode");
                return true;
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
        warn!(
            "host still reports maintenance mode after {}s, continuing anyway",
            self.exit_timeout_secs
        );
        false
    }

    /// One poll. Always re-queries the host; the answer is never cached
    /// between checks.
    async fn query<E: CommandExecutor + ?Sized>(&self, exec: &mut E) -> MaintenanceState {
        let output = exec.execute("esxcli system maintenanceMode get").await;
        MaintenanceState::from_query(&output)
    }
}
