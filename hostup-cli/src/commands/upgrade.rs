use std::path::{Path, PathBuf};

use async_trait::async_trait;
use clap::ArgMatches;
use color_eyre::eyre::{Result, WrapErr};
use hostup::config::UpgradeConfig;
use hostup::executor::shell::{self, ShellExecutor};
use hostup::inventory;
use hostup::log::*;
use hostup::orchestrator::Orchestrator;
use regex::Regex;
use tokio::fs;

use super::{Arguments, CommandErrors};

/// Profile names are plain identifier-ish tokens; anything else is a typo
/// that would otherwise only surface deep into the run.
fn profile_regex() -> Regex {
    Regex::new("^[A-Za-z0-9][A-Za-z0-9._-]*$").unwrap()
}

pub struct UpgradeCommand;

impl UpgradeCommand {
    async fn load_config(&self, matches: &ArgMatches) -> Result<UpgradeConfig> {
        let regex = profile_regex();
        let mut config = if let Some(path) = matches.get_one::<String>("config") {
            let raw = fs::read_to_string(path)
                .await
                .wrap_err("Failed reading config file")?;
            serde_yaml::from_str(raw.as_str()).wrap_err("Failed deserializing config")?
        } else {
            let package = self.read_argument_with_validator(matches, "package", &mut |_| Ok(()))?;
            let profile = self.read_argument_with_regex_validation(matches, "profile", &regex)?;
            UpgradeConfig::new(package, profile)
        };

        // Flags override whatever the file said.
        if let Some(package) = matches.get_one::<String>("package") {
            config = config.with_package(package.clone());
        }
        if let Some(profile) = matches.get_one::<String>("profile") {
            if !regex.is_match(profile) {
                return Err(CommandErrors::InputValidationFailure(
                    "profile".into(),
                    regex.as_str().into(),
                )
                .into());
            }
            config = config.with_profile(profile.clone());
        }
        Ok(config)
    }

    /// Locate the depot package on local storage. Exit code 1 territory:
    /// a missing package cancels the run before anything touches the host.
    async fn resolve_package(
        &self,
        matches: &ArgMatches,
        config: &UpgradeConfig,
    ) -> Result<PathBuf> {
        let dir = matches
            .get_one::<String>("package-dir")
            .cloned()
            .unwrap_or_else(|| ".".to_string());
        let path = Path::new(&dir).join(config.package());
        match fs::metadata(&path).await {
            Ok(meta) if meta.is_file() => Ok(path),
            _ => Err(CommandErrors::PackageNotFound(config.package().clone(), dir).into()),
        }
    }

    async fn subcommand_check<'a>(
        &self,
        _context: &'a super::CliContext<'a>,
        matches: &ArgMatches,
    ) -> Result<()> {
        let config = self.load_config(matches).await?;

        shell::preflight(shell::REQUIRED_HOST_TOOLS)?;
        println!("* host utilities: ok");

        let package_path = self.resolve_package(matches, &config).await?;
        println!("* package: {}", package_path.display());

        let mut exec = ShellExecutor::new();
        let mut workloads = inventory::discover(&mut exec).await;
        println!("* workloads: {}", workloads.len());
        for workload in workloads.iter_mut() {
            inventory::refresh_power_state(&mut exec, workload).await;
            inventory::refresh_tools_status(&mut exec, workload).await;
            println!(
                "**** {}: {:?} (guest agent {:?})",
                workload.id(),
                workload.power(),
                workload.tools()
            );
        }

        println!(
            "* check passed; `upgrade run` would apply profile {}",
            config.profile()
        );
        Ok(())
    }

    async fn subcommand_run<'a>(
        &self,
        _context: &'a super::CliContext<'a>,
        matches: &ArgMatches,
    ) -> Result<()> {
        let config = self.load_config(matches).await?;

        shell::preflight(shell::REQUIRED_HOST_TOOLS)?;
        let package_path = self.resolve_package(matches, &config).await?;
        println!(
            "* upgrading with package {} (profile {})",
            package_path.display(),
            config.profile()
        );
        info!("starting unattended upgrade");

        let mut orchestrator = Orchestrator::new(ShellExecutor::new(), &config);
        let outcome = orchestrator.run(&package_path.to_string_lossy()).await;
        info!("run finished: {:?}", outcome);

        match outcome.exit_code() {
            0 => Ok(()),
            code => std::process::exit(code),
        }
    }
}

#[async_trait]
impl<'a> super::Command<'a> for UpgradeCommand {
    fn new() -> Self
    where
        Self: Sized,
    {
        Self {}
    }

    async fn run(&self, context: &'a super::CliContext) -> Result<()> {
        match context.matches.subcommand() {
            Some(("check", matches)) => {
                self.subcommand_check(context, matches).await?;
            }
            Some(("run", matches)) => {
                self.subcommand_run(context, matches).await?;
            }
            Some((name, _)) => {
                return Err(super::CommandErrors::InvalidSubcommand(name.to_string()).into())
            }
            None => return Err(super::CommandErrors::NoSubcommandProvided.into()),
        }
        Ok(())
    }
}

impl<'a> super::Arguments<'a> for UpgradeCommand {}
