//! Issuing the profile update and reading the installer's verdict.

use derive_getters::Getters;

use crate::executor::CommandExecutor;
use crate::facts::UpgradeVerdict;
use crate::log::*;

#[derive(Getters, Debug, Clone)]
pub struct UpgradeRunner {
    profile: String,
}

impl UpgradeRunner {
    pub fn new<S: Into<String>>(profile: S) -> Self {
        Self {
            profile: profile.into(),
        }
    }

    /// Apply the package and classify the installer's output. The full
    /// transcript is captured before classification; the verdict is only
    /// ever derived from the known markers, so a half-printed or empty
    /// response classifies as indeterminate and takes the rollback branch.
    #[tracing::instrument(skip(self, exec))]
    pub async fn apply<E: CommandExecutor + ?Sized>(
        &self,
        exec: &mut E,
        package_path: &str,
    ) -> UpgradeVerdict {
        let command = format!(
            "esxcli software profile update -p {} -d {}",
            shell_words::quote(&self.profile),
            shell_words::quote(package_path)
        );
        info!("applying upgrade: {}", command);

        let output = exec.execute(&command).await;
        let verdict = UpgradeVerdict::classify(&output);
        info!("installer verdict: {}", verdict);
        verdict
    }
}
