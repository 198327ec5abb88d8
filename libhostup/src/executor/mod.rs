use async_trait::async_trait;

pub mod shell;

#[cfg(test)]
pub(crate) mod scripted;

/// The boundary between the orchestration core and the host's shell.
///
/// `execute` never fails: transport and spawn problems surface as empty
/// output, which the [`crate::facts`] layer classifies as an unknown fact.
/// Callers must never read empty output as a successful empty value.
///
/// Commands are issued one at a time and their output is fully consumed
/// before the next command runs; implementations do not need to support
/// concurrent execution.
#[async_trait]
pub trait CommandExecutor: std::fmt::Debug + Send {
    async fn execute(&mut self, command: &str) -> String;
}
