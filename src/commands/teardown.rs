use crate::error::ProvisionError;
use crate::github::SecretsApi;
use crate::iam::IamApi;
use crate::provisioner::{Provisioner, TeardownReport};

pub struct TeardownCommand<I: IamApi, G: SecretsApi> {
    provisioner: Provisioner<I, G>,
}

impl<I: IamApi, G: SecretsApi> TeardownCommand<I, G> {
    pub fn new(provisioner: Provisioner<I, G>) -> Self {
        Self { provisioner }
    }

    pub fn run(self) -> Result<TeardownReport, ProvisionError> {
        self.provisioner.teardown()
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;
    use crate::config::tests::config;
    use crate::github::tests::FakeGitHub;
    use crate::iam::tests::FakeIam;
    use crate::reconcile::Outcome;

    #[test]
    fn teardown_of_a_provisioned_account_deletes_the_user() {
        let dir = TempDir::new().unwrap();
        let mut config = config();
        config.access_key_cache_path = dir.path().join("access_key.json");
        let provisioner = Provisioner::new(FakeIam::default(), FakeGitHub::default(), config);
        provisioner.setup().unwrap();

        let report = TeardownCommand::new(provisioner).run().unwrap();

        assert_eq!(report.user, Outcome::Deleted);
    }
}
