use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::github::GitHubToken;

/// Env var holding the tracing filter directives.
pub const LOG_FILTER_ENV: &str = "GH_AWS_CREDS_LOG";

#[derive(Parser, Debug)]
#[command(
    name = "gh-aws-creds",
    version,
    about = "Provision a scoped AWS IAM user and publish its credentials as GitHub Actions secrets"
)]
pub struct Cli {
    /// Log at debug level, unless GH_AWS_CREDS_LOG says otherwise.
    #[arg(long, short, global = true)]
    pub verbose: bool,

    /// Path to the JSON configuration file.
    #[arg(long, short)]
    pub config: PathBuf,

    /// Token allowed to manage the repository secrets.
    #[arg(long, env = "GITHUB_TOKEN", hide_env_values = true)]
    pub github_token: Option<GitHubToken>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Commands {
    /// Creates the IAM user, its policies and access key, then publishes the repository secrets.
    Setup,
    /// Deletes the repository secrets, the access keys, the policies and the IAM user.
    Teardown,
    /// Prints the repository secrets settings URL.
    SecretsUrl,
    /// Loads and validates the configuration file without calling any remote API.
    Validate,
}

impl Commands {
    /// Whether the command talks to GitHub and therefore needs a token.
    pub fn needs_github_token(self) -> bool {
        matches!(self, Self::Setup | Self::Teardown)
    }
}
