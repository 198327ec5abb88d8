use async_trait::async_trait;
use clap::ArgMatches;
use color_eyre::eyre::Result;
use regex::Regex;
use thiserror::Error;

pub mod upgrade;

#[derive(Error, Debug)]
pub enum CommandErrors {
    #[error("Required argument `{0}` is missing.")]
    RequiredArgumentMissing(String),
    #[error("Argument `{0}` failed validation `{1}`")]
    InputValidationFailure(String, String),
    #[error("Upgrade package `{0}` not found in `{1}`.")]
    PackageNotFound(String, String),
    #[error("Invalid subcommand `{0}`.")]
    InvalidSubcommand(String),
    #[error("No subcommand provided.")]
    NoSubcommandProvided,
}

pub struct CliContext<'a> {
    pub matches: &'a ArgMatches,
}

impl<'a> CliContext<'a> {
    pub fn new(matches: &'a ArgMatches) -> Self {
        Self { matches }
    }
}

#[async_trait]
pub trait Command<'a> {
    fn new() -> Self
    where
        Self: Sized;

    async fn run(&self, context: &'a CliContext) -> Result<()>;
}

/// Argument plumbing shared by subcommands. The tool is unattended by
/// design, so everything comes from flags and the config file; there is no
/// interactive prompting.
pub trait Arguments<'a> {
    /// Read argument from the CLI args with a validation function.
    fn read_argument_with_validator<V>(
        &self,
        arg_matches: &'a ArgMatches,
        id: &'a str,
        validator: &mut V,
    ) -> Result<String>
    where
        V: FnMut(&String) -> Result<(), CommandErrors>,
    {
        if let Some(arg) = arg_matches.get_one::<String>(id) {
            validator(arg)?;
            Ok(arg.clone())
        } else {
            Err(CommandErrors::RequiredArgumentMissing(id.into()))?
        }
    }

    /// Read argument from the CLI args with regex validation.
    fn read_argument_with_regex_validation(
        &self,
        arg_matches: &'a ArgMatches,
        id: &'a str,
        regex: &'a Regex,
    ) -> Result<String> {
        self.read_argument_with_validator(arg_matches, id, &mut |input| {
            if regex.is_match(input) {
                Ok(())
            } else {
                Err(CommandErrors::InputValidationFailure(
                    id.into(),
                    regex.as_str().into(),
                ))
            }
        })
    }
}
