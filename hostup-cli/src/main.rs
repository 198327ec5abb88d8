#![forbid(unsafe_code)]

use clap::{command, Arg, ArgAction, Command as ClapCommand};
use color_eyre::eyre::Result;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::util::SubscriberInitExt;

use crate::commands::Command;

mod commands;

use hostup::log::*;

fn target_args(subcommand: ClapCommand) -> ClapCommand {
    subcommand
        .arg(
            Arg::new("config")
                .help("Path to the YAML upgrade config. No default.")
                .short('c')
                .long("config"),
        )
        .arg(
            Arg::new("package")
                .help("Depot package filename. Overrides the config file.")
                .long("package"),
        )
        .arg(
            Arg::new("profile")
                .help("Image profile name to apply. Overrides the config file.")
                .long("profile"),
        )
        .arg(
            Arg::new("package-dir")
                .help("Directory the package is looked up in. Defaults to the current directory.")
                .long("package-dir"),
        )
}

#[tokio::main]
async fn main() -> Result<()> {
    install_color_eyre()?;

    // Command configuration
    let matches = command!()
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .help("Turn debugging information on. Overrides -q. Can specify up to -vv.")
                .action(ArgAction::Count),
        )
        .arg(
            Arg::new("quiet")
                .short('q')
                .long("quiet")
                .help("Silence all output. Overridden by -v.")
                .action(ArgAction::SetTrue),
        )
        .subcommand(
            command!("upgrade")
                .about("Upgrade this host in place.")
                .subcommand(target_args(command!("check").about(
                    "Preflight only: verify the package and host utilities, list workloads.",
                )))
                .subcommand(target_args(command!("run").about(
                    "Quiesce workloads, enter maintenance mode, apply the upgrade, then reboot or roll back.",
                ))),
        )
        .subcommand_required(true)
        .get_matches();

    // Set up logging
    let logging_config = tracing_subscriber::fmt::SubscriberBuilder::default()
        .with_timer(tracing_subscriber::fmt::time::UtcTime::new(
            time::macros::format_description!("[year]-[month]-[day] [hour]:[minute]:[second]"),
        ))
        .with_span_events(tracing_subscriber::fmt::format::FmtSpan::NONE)
        .compact();

    let quiet = matches.get_flag("quiet");
    let verbose = matches.get_count("verbose") as usize;
    let logging_config = if quiet && verbose == 0 {
        logging_config.with_max_level(LevelFilter::ERROR)
    } else if verbose > 0 {
        let level = match verbose {
            1 => LevelFilter::WARN,
            2 => LevelFilter::INFO,
            3 => LevelFilter::DEBUG,
            _ => LevelFilter::TRACE,
        };
        logging_config.with_max_level(level)
    } else {
        logging_config.with_max_level(LevelFilter::ERROR)
    };

    let subscriber = logging_config.finish();
    subscriber.init();

    // Run the commands
    if let Some((subcommand, matches)) = matches.subcommand() {
        let ctx = commands::CliContext::new(matches);
        debug!(
            "matched subcommand {} with matches: {:?}",
            &subcommand,
            &matches.ids().map(|id| id.as_str()).collect::<Vec<_>>()
        );
        match subcommand {
            "upgrade" => commands::upgrade::UpgradeCommand::new().run(&ctx).await?,
            _ => return Err(eyre!("Unrecognized subcommand: {}", subcommand)),
        }
    }
    Ok(())
}
