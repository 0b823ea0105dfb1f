use std::error::Error;

use clap::Parser;
use gh_aws_creds::commands::setup::SetupCommand;
use gh_aws_creds::commands::teardown::TeardownCommand;
use gh_aws_creds::config::ProvisionConfig;
use gh_aws_creds::github::rest::HttpGitHubClient;
use gh_aws_creds::github::secrets_settings_url;
use gh_aws_creds::http::client::HttpClient;
use gh_aws_creds::http::config::{
    DEFAULT_HTTP_CONN_TIMEOUT, DEFAULT_HTTP_TIMEOUT, HttpConfig, ProxyConfig,
};
use gh_aws_creds::iam::sdk::SdkIamClient;
use gh_aws_creds::parameters::{Cli, Commands, LOG_FILTER_ENV};
use gh_aws_creds::provisioner::Provisioner;
use tracing::debug;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_env(LOG_FILTER_ENV).unwrap_or_else(|_| {
        if cli.verbose {
            EnvFilter::new("gh_aws_creds=debug")
        } else {
            EnvFilter::new("gh_aws_creds=info")
        }
    });
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .init();

    let config = ProvisionConfig::load(&cli.config)?;
    debug!(config = %cli.config.display(), "configuration loaded");

    if !cli.command.needs_github_token() {
        match cli.command {
            Commands::SecretsUrl => println!("{}", secrets_settings_url(&config.repository())),
            _ => println!("configuration `{}` is valid", cli.config.display()),
        }
        return Ok(());
    }

    let token = cli
        .github_token
        .ok_or("a GitHub token is required, pass --github-token or set GITHUB_TOKEN")?;

    let proxy = ProxyConfig::default()
        .try_with_url_from_env()
        .map_err(|e| format!("invalid proxy configuration: {e}"))?;
    let http_config = HttpConfig::new(DEFAULT_HTTP_TIMEOUT, DEFAULT_HTTP_CONN_TIMEOUT, proxy);
    let http_client =
        HttpClient::new(http_config).map_err(|e| format!("error creating http client: {e}"))?;
    let github = HttpGitHubClient::new(http_client, &config.github.api_url, token);

    let iam = SdkIamClient::new(Some(&config.aws_region), config.aws_profile.as_deref())
        .map_err(|e| format!("error creating iam client: {e}"))?;

    let secret_names = config.github.secret_names.clone();
    let provisioner = Provisioner::new(iam, github, config);

    match cli.command {
        Commands::Setup => {
            let summary = SetupCommand::new(provisioner, secret_names).run()?;
            println!("{summary}");
        }
        Commands::Teardown => {
            TeardownCommand::new(provisioner).run()?;
            println!("Teardown complete, the IAM user, its access keys and the repository secrets are gone.");
        }
        Commands::Validate | Commands::SecretsUrl => {}
    }

    Ok(())
}
