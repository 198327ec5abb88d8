//! Discovery of the workloads present on the host.

use derive_getters::Getters;

use crate::executor::CommandExecutor;
use crate::facts::{PowerState, ToolsStatus};
use crate::log::*;

/// A virtual machine as discovered on the host. Identity comes from
/// enumeration; the state fields stay `Unknown` until explicitly refreshed
/// and are only ever updated by re-querying the host.
#[derive(Getters, Debug, Clone)]
pub struct Workload {
    id: String,
    power: PowerState,
    tools: ToolsStatus,
}

impl Workload {
    pub fn new<S: Into<String>>(id: S) -> Self {
        Self {
            id: id.into(),
            power: PowerState::Unknown,
            tools: ToolsStatus::Unknown,
        }
    }
}

/// Enumerate the workloads on the host, in the order the host lists them.
///
/// The enumeration output is consumed raw: header and blank lines are
/// dropped by keeping only lines whose first token is purely numeric,
/// which is the shape of a host-assigned id.
#[tracing::instrument(skip(exec))]
pub async fn discover<E: CommandExecutor + ?Sized>(exec: &mut E) -> Vec<Workload> {
    let output = exec.execute("vim-cmd vmsvc/getallvms").await;

    let mut workloads = vec![];
    for line in output.lines() {
        if let Some(first) = line.split_whitespace().next() {
            if first.bytes().all(|b| b.is_ascii_digit()) {
                workloads.push(Workload::new(first));
            }
        }
    }
    debug!("inventory: discovered {} workloads", workloads.len());
    workloads
}

/// Re-query one workload's power state. Read-only and idempotent.
#[tracing::instrument(skip(exec, workload))]
pub async fn refresh_power_state<E: CommandExecutor + ?Sized>(
    exec: &mut E,
    workload: &mut Workload,
) {
    let output = exec
        .execute(&format!("vim-cmd vmsvc/get.summary {}", workload.id))
        .await;
    workload.power = PowerState::from_summary(&output);
    trace!("workload {}: power state {:?}", workload.id, workload.power);
}

/// Re-query one workload's in-guest agent status. Read-only and idempotent.
#[tracing::instrument(skip(exec, workload))]
pub async fn refresh_tools_status<E: CommandExecutor + ?Sized>(
    exec: &mut E,
    workload: &mut Workload,
) {
    let output = exec
        .execute(&format!("vim-cmd vmsvc/get.guest {}", workload.id))
        .await;
    workload.tools = ToolsStatus::from_guest_info(&output);
    trace!("workload {}: tools status {:?}", workload.id, workload.tools);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::scripted::ScriptedHost;

    const GETALLVMS: &str = r#"Vmid           Name                                              File                               Guest OS          Version   Annotation
1      web01                  [datastore1] web01/web01.vmx                  centos8_64Guest      vmx-19
5      db01                   [datastore1] db01/db01.vmx                    otherLinux64Guest    vmx-19
12     win-jump               [datastore1] win-jump/win-jump.vmx           windows2019srv_64Guest vmx-19"#;

    #[tokio::test]
    async fn test_discover_keeps_only_numeric_ids_in_host_order() {
        let mut host = ScriptedHost::new().respond("vim-cmd vmsvc/getallvms", GETALLVMS);
        let workloads = discover(&mut host).await;
        let ids: Vec<&str> = workloads.iter().map(|w| w.id().as_str()).collect();
        assert_eq!(vec!["1", "5", "12"], ids);
        for workload in &workloads {
            assert_eq!(PowerState::Unknown, *workload.power());
            assert_eq!(ToolsStatus::Unknown, *workload.tools());
        }
    }

    #[tokio::test]
    async fn test_discover_empty_output_is_no_workloads() {
        let mut host = ScriptedHost::new();
        assert!(discover(&mut host).await.is_empty());
    }

    #[tokio::test]
    async fn test_refresh_power_state_updates_from_host() {
        let mut host = ScriptedHost::new()
            .respond("vim-cmd vmsvc/get.summary 5", "   powerState = \"poweredOff\",");
        let mut workload = Workload::new("5");
        refresh_power_state(&mut host, &mut workload).await;
        assert_eq!(PowerState::PoweredOff, *workload.power());
    }

    #[tokio::test]
    async fn test_refresh_tools_status_unparseable_is_unknown() {
        let mut host = ScriptedHost::new();
        let mut workload = Workload::new("5");
        refresh_tools_status(&mut host, &mut workload).await;
        assert_eq!(ToolsStatus::Unknown, *workload.tools());
    }
}
