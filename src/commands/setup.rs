use std::fmt;

use crate::config::SecretNames;
use crate::error::ProvisionError;
use crate::github::SecretsApi;
use crate::iam::IamApi;
use crate::provisioner::{Provisioner, SetupReport};

pub struct SetupCommand<I: IamApi, G: SecretsApi> {
    provisioner: Provisioner<I, G>,
    secret_names: SecretNames,
}

impl<I: IamApi, G: SecretsApi> SetupCommand<I, G> {
    pub fn new(provisioner: Provisioner<I, G>, secret_names: SecretNames) -> Self {
        Self {
            provisioner,
            secret_names,
        }
    }

    pub fn run(self) -> Result<SetupSummary, ProvisionError> {
        let report = self.provisioner.setup()?;
        Ok(SetupSummary {
            report,
            secret_names: self.secret_names,
        })
    }
}

/// Printed once setup succeeded: where to find the secrets and how a workflow consumes them.
#[derive(Debug)]
pub struct SetupSummary {
    pub report: SetupReport,
    secret_names: SecretNames,
}

impl SetupSummary {
    pub fn workflow_snippet(&self) -> String {
        let names = &self.secret_names;
        format!(
            r#"name: AWS Example
on: [push]
jobs:
  aws-job:
    runs-on: ubuntu-latest
    steps:
      - uses: actions/checkout@v4
      - name: Configure AWS credentials
        uses: aws-actions/configure-aws-credentials@v4
        with:
          aws-access-key-id: ${{{{ secrets.{} }}}}
          aws-secret-access-key: ${{{{ secrets.{} }}}}
          aws-region: ${{{{ secrets.{} }}}}
      - name: Test AWS access
        run: aws sts get-caller-identity
"#,
            names.aws_access_key_id, names.aws_secret_access_key, names.aws_region
        )
    }
}

impl fmt::Display for SetupSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Setup complete, access key `{}` is published.", self.report.access_key_id)?;
        for (secret_name, outcome) in &self.report.secrets {
            writeln!(f, "  {secret_name}: {outcome:?}")?;
        }
        writeln!(f, "Check the repository secrets at: {}", self.report.secrets_url)?;
        writeln!(f)?;
        writeln!(f, "Example GitHub Actions workflow:")?;
        write!(f, "{}", self.workflow_snippet())
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;
    use crate::config::tests::config;
    use crate::github::tests::FakeGitHub;
    use crate::iam::tests::FakeIam;

    #[test]
    fn summary_points_at_the_secrets_and_their_usage() {
        let dir = TempDir::new().unwrap();
        let mut config = config();
        config.access_key_cache_path = dir.path().join("access_key.json");
        let secret_names = config.github.secret_names.clone();
        let provisioner = Provisioner::new(FakeIam::default(), FakeGitHub::default(), config);

        let summary = SetupCommand::new(provisioner, secret_names).run().unwrap();
        let rendered = summary.to_string();

        assert!(rendered.contains("https://github.com/octo/demo/settings/secrets/actions"));
        assert!(rendered.contains("aws-access-key-id: ${{ secrets.AWS_ACCESS_KEY_ID }}"));
        assert!(rendered.contains("aws-region: ${{ secrets.AWS_REGION }}"));
        assert!(rendered.contains(&summary.report.access_key_id));
    }
}
