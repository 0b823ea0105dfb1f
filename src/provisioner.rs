//! The eight provisioning steps, chained through proof tokens so teardown and setup can only run
//! in dependency order.
//!
//! Every step probes the remote state before acting and can be re-run at any time, including
//! after a previous run was interrupted halfway.

use tracing::info;

use crate::config::ProvisionConfig;
use crate::error::ProvisionError;
use crate::github::SecretsApi;
use crate::github::publisher::SecretsPublisher;
use crate::iam::IamApi;
use crate::iam::manager::IdentityManager;
use crate::key_cache::{AccessKeyMaterial, LocalKeyCache};
use crate::reconcile::Outcome;

/// The IAM user exists.
#[derive(Debug)]
pub struct UserReady(());

/// The inline policy and the managed policy attachments match the configuration.
#[derive(Debug)]
pub struct PoliciesReady(());

/// None of the configured repository secrets exists.
#[derive(Debug)]
pub struct SecretsRemoved(());

/// The IAM user has no access key left and the local cache is gone.
#[derive(Debug)]
pub struct KeysRemoved(());

/// The IAM user has no policy left.
#[derive(Debug)]
pub struct PoliciesRemoved(());

#[derive(Debug, Clone, PartialEq)]
pub struct SetupReport {
    pub user: Outcome,
    pub access_key_id: String,
    pub secrets: Vec<(String, Outcome)>,
    pub secrets_url: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TeardownReport {
    pub user: Outcome,
}

pub struct Provisioner<I: IamApi, G: SecretsApi> {
    identity: IdentityManager<I>,
    publisher: SecretsPublisher<G>,
    cache: LocalKeyCache,
    config: ProvisionConfig,
}

impl<I: IamApi, G: SecretsApi> Provisioner<I, G> {
    pub fn new(iam: I, github: G, config: ProvisionConfig) -> Self {
        Self {
            identity: IdentityManager::new(iam, config.identity_spec()),
            publisher: SecretsPublisher::new(github, config.repository()),
            cache: config.key_cache(),
            config,
        }
    }

    pub fn iam(&self) -> &I {
        self.identity.iam()
    }

    pub fn github(&self) -> &G {
        self.publisher.api()
    }

    pub fn secrets_settings_url(&self) -> String {
        self.publisher.secrets_settings_url()
    }

    /// Runs the four setup steps in order.
    pub fn setup(&self) -> Result<SetupReport, ProvisionError> {
        let (user, user_ready) = self.create_user()?;
        let policies = self.s12_put_iam_policy(&user_ready)?;
        let material = self.s13_create_or_get_access_key(&policies)?;
        let outcomes = self.s14_setup_github_secrets(&material)?;

        Ok(SetupReport {
            user,
            access_key_id: material.access_key_id.clone(),
            secrets: self
                .config
                .github
                .secret_names
                .all()
                .iter()
                .map(|name| name.to_string())
                .zip(outcomes)
                .collect(),
            secrets_url: self.secrets_settings_url(),
        })
    }

    /// Runs the four teardown steps in order.
    pub fn teardown(&self) -> Result<TeardownReport, ProvisionError> {
        let secrets = self.s21_delete_github_secrets()?;
        let keys = self.s22_delete_access_key(&secrets)?;
        let policies = self.s23_delete_iam_policy(&keys)?;
        let user = self.s24_delete_iam_user(&policies)?;

        Ok(TeardownReport { user })
    }

    pub fn s11_create_iam_user(&self) -> Result<UserReady, ProvisionError> {
        self.create_user().map(|(_, ready)| ready)
    }

    fn create_user(&self) -> Result<(Outcome, UserReady), ProvisionError> {
        info!(step = "s11", user = %self.config.iam_user_name, "ensuring iam user");
        let outcome = self.identity.create_user()?;
        Ok((outcome, UserReady(())))
    }

    pub fn s12_put_iam_policy(&self, _: &UserReady) -> Result<PoliciesReady, ProvisionError> {
        info!(step = "s12", user = %self.config.iam_user_name, "ensuring iam policies");
        self.identity.put_policies()?;
        Ok(PoliciesReady(()))
    }

    pub fn s13_create_or_get_access_key(
        &self,
        _: &PoliciesReady,
    ) -> Result<AccessKeyMaterial, ProvisionError> {
        info!(step = "s13", user = %self.config.iam_user_name, "ensuring access key");
        self.identity.create_or_get_access_key(&self.cache)
    }

    /// Publishes the region and both halves of the access key, returning the outcome per secret.
    pub fn s14_setup_github_secrets(
        &self,
        material: &AccessKeyMaterial,
    ) -> Result<Vec<Outcome>, ProvisionError> {
        info!(step = "s14", repository = %self.publisher.repository(), "publishing secrets");
        self.publisher
            .publish(&self.config.secret_bindings(material))
    }

    pub fn s21_delete_github_secrets(&self) -> Result<SecretsRemoved, ProvisionError> {
        info!(step = "s21", repository = %self.publisher.repository(), "deleting secrets");
        self.publisher
            .unpublish(&self.config.github.secret_names.all())?;
        Ok(SecretsRemoved(()))
    }

    pub fn s22_delete_access_key(&self, _: &SecretsRemoved) -> Result<KeysRemoved, ProvisionError> {
        info!(step = "s22", user = %self.config.iam_user_name, "deleting access keys");
        self.identity.delete_access_key(&self.cache)?;
        Ok(KeysRemoved(()))
    }

    pub fn s23_delete_iam_policy(&self, _: &KeysRemoved) -> Result<PoliciesRemoved, ProvisionError> {
        info!(step = "s23", user = %self.config.iam_user_name, "deleting iam policies");
        self.identity.delete_policies()?;
        Ok(PoliciesRemoved(()))
    }

    pub fn s24_delete_iam_user(&self, _: &PoliciesRemoved) -> Result<Outcome, ProvisionError> {
        info!(step = "s24", user = %self.config.iam_user_name, "deleting iam user");
        self.identity.delete_user()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use assert_matches::assert_matches;
    use tempfile::TempDir;

    use super::*;
    use crate::github::tests::FakeGitHub;
    use crate::iam::AccessKeyStatus;
    use crate::iam::manager::tests::{AUDIT_ARN, READ_ONLY_ARN};
    use crate::iam::tests::FakeIam;

    const INLINE_POLICY: &str = "github-actions-inline-policy";

    fn provisioner(dir: &TempDir, managed_policy_arns: &[&str]) -> Provisioner<FakeIam, FakeGitHub> {
        let mut config = crate::config::tests::config();
        config.access_key_cache_path = dir.path().join("access_key.json");
        config.managed_policy_arns = managed_policy_arns.iter().map(|a| a.to_string()).collect();

        Provisioner::new(
            FakeIam::with_managed_policies(&[READ_ONLY_ARN, AUDIT_ARN]),
            FakeGitHub::default(),
            config,
        )
    }

    fn run_setup_steps(provisioner: &Provisioner<FakeIam, FakeGitHub>) -> AccessKeyMaterial {
        let user = provisioner.s11_create_iam_user().unwrap();
        let policies = provisioner.s12_put_iam_policy(&user).unwrap();
        let material = provisioner.s13_create_or_get_access_key(&policies).unwrap();
        provisioner.s14_setup_github_secrets(&material).unwrap();
        material
    }

    fn run_teardown_steps(provisioner: &Provisioner<FakeIam, FakeGitHub>) {
        let secrets = provisioner.s21_delete_github_secrets().unwrap();
        let keys = provisioner.s22_delete_access_key(&secrets).unwrap();
        let policies = provisioner.s23_delete_iam_policy(&keys).unwrap();
        provisioner.s24_delete_iam_user(&policies).unwrap();
    }

    fn assert_nothing_left(provisioner: &Provisioner<FakeIam, FakeGitHub>) {
        let iam = provisioner.iam();
        assert!(!iam.user_exists("gh-ci-demo"));
        assert!(iam.attached("gh-ci-demo").is_empty());
        assert!(iam.inline_policy("gh-ci-demo", INLINE_POLICY).is_none());
        assert!(iam.access_key_ids("gh-ci-demo").is_empty());
        assert!(provisioner.github().secret_names().is_empty());
    }

    #[test]
    fn fresh_setup_provisions_every_resource() {
        let dir = TempDir::new().unwrap();
        let provisioner = provisioner(&dir, &[]);

        let material = run_setup_steps(&provisioner);

        let iam = provisioner.iam();
        assert!(iam.user_exists("gh-ci-demo"));
        assert!(iam.inline_policy("gh-ci-demo", INLINE_POLICY).is_some());
        let keys = iam.list_access_keys("gh-ci-demo").unwrap();
        assert_eq!(keys.len(), 1);
        assert_eq!(keys[0].status, AccessKeyStatus::Active);

        let github = provisioner.github();
        assert_eq!(
            github.secret_names(),
            vec!["AWS_ACCESS_KEY_ID", "AWS_REGION", "AWS_SECRET_ACCESS_KEY"]
        );
        for name in github.secret_names() {
            assert!(!github.state.borrow().secrets[&name].encrypted_value.is_empty());
        }
        assert_eq!(github.secret_value("AWS_REGION").unwrap(), "us-east-1");
        assert_eq!(
            github.secret_value("AWS_ACCESS_KEY_ID").unwrap(),
            material.access_key_id
        );
        assert_eq!(
            github.secret_value("AWS_SECRET_ACCESS_KEY").unwrap(),
            material.secret_access_key
        );
    }

    #[test]
    fn rerunning_setup_converges_to_the_same_state() {
        let dir = TempDir::new().unwrap();
        let provisioner = provisioner(&dir, &[READ_ONLY_ARN]);

        let first = run_setup_steps(&provisioner);
        let second = run_setup_steps(&provisioner);

        assert_eq!(first, second);
        assert_eq!(provisioner.iam().keys_created(), 1);
        assert_eq!(provisioner.iam().access_key_ids("gh-ci-demo").len(), 1);
        assert_eq!(
            provisioner.iam().attached("gh-ci-demo"),
            BTreeSet::from([READ_ONLY_ARN.to_string()])
        );
        assert_eq!(provisioner.github().secret_names().len(), 3);
    }

    #[test]
    fn every_step_can_run_twice() {
        let dir = TempDir::new().unwrap();
        let provisioner = provisioner(&dir, &[READ_ONLY_ARN]);

        let user = provisioner.s11_create_iam_user().unwrap();
        provisioner.s11_create_iam_user().unwrap();
        let policies = provisioner.s12_put_iam_policy(&user).unwrap();
        provisioner.s12_put_iam_policy(&user).unwrap();
        let first = provisioner.s13_create_or_get_access_key(&policies).unwrap();
        let second = provisioner.s13_create_or_get_access_key(&policies).unwrap();
        assert_eq!(first, second);
        provisioner.s14_setup_github_secrets(&first).unwrap();
        assert_eq!(
            provisioner.s14_setup_github_secrets(&second).unwrap(),
            vec![Outcome::Updated; 3]
        );

        let secrets = provisioner.s21_delete_github_secrets().unwrap();
        provisioner.s21_delete_github_secrets().unwrap();
        let keys = provisioner.s22_delete_access_key(&secrets).unwrap();
        provisioner.s22_delete_access_key(&secrets).unwrap();
        let removed = provisioner.s23_delete_iam_policy(&keys).unwrap();
        provisioner.s23_delete_iam_policy(&keys).unwrap();
        assert_eq!(
            provisioner.s24_delete_iam_user(&removed).unwrap(),
            Outcome::Deleted
        );
        assert_eq!(
            provisioner.s24_delete_iam_user(&removed).unwrap(),
            Outcome::Unchanged
        );

        assert_nothing_left(&provisioner);
    }

    #[test]
    fn teardown_after_setup_leaves_nothing_behind() {
        let dir = TempDir::new().unwrap();
        let provisioner = provisioner(&dir, &[READ_ONLY_ARN]);
        run_setup_steps(&provisioner);

        run_teardown_steps(&provisioner);

        assert_nothing_left(&provisioner);
        assert!(!dir.path().join("access_key.json").exists());
    }

    #[test]
    fn teardown_without_setup_succeeds() {
        let dir = TempDir::new().unwrap();
        let provisioner = provisioner(&dir, &[READ_ONLY_ARN]);

        let report = provisioner.teardown().unwrap();

        assert_eq!(report.user, Outcome::Unchanged);
        assert_nothing_left(&provisioner);
    }

    #[test]
    fn managed_policy_is_attached_then_detached() {
        let dir = TempDir::new().unwrap();
        let provisioner = provisioner(&dir, &[READ_ONLY_ARN]);

        let user = provisioner.s11_create_iam_user().unwrap();
        provisioner.s12_put_iam_policy(&user).unwrap();
        assert!(provisioner.iam().attached("gh-ci-demo").contains(READ_ONLY_ARN));

        let secrets = provisioner.s21_delete_github_secrets().unwrap();
        let keys = provisioner.s22_delete_access_key(&secrets).unwrap();
        provisioner.s23_delete_iam_policy(&keys).unwrap();
        assert!(provisioner.iam().attached("gh-ci-demo").is_empty());
    }

    #[test]
    fn setup_resumes_after_an_interrupted_run() {
        let dir = TempDir::new().unwrap();
        let provisioner = provisioner(&dir, &[]);
        let user = provisioner.s11_create_iam_user().unwrap();
        provisioner.s12_put_iam_policy(&user).unwrap();

        let report = provisioner.setup().unwrap();

        assert_eq!(report.user, Outcome::Unchanged);
        assert_eq!(
            report.secrets,
            vec![
                ("AWS_REGION".to_string(), Outcome::Created),
                ("AWS_ACCESS_KEY_ID".to_string(), Outcome::Created),
                ("AWS_SECRET_ACCESS_KEY".to_string(), Outcome::Created),
            ]
        );
        assert_eq!(
            report.secrets_url,
            "https://github.com/octo/demo/settings/secrets/actions"
        );
        assert_eq!(provisioner.iam().keys_created(), 1);
    }

    #[test]
    fn teardown_handles_keys_created_outside_the_cache() {
        let dir = TempDir::new().unwrap();
        let provisioner = provisioner(&dir, &[]);
        provisioner.setup().unwrap();
        provisioner.iam().create_access_key("gh-ci-demo").unwrap();

        provisioner.teardown().unwrap();

        assert_nothing_left(&provisioner);
    }

    #[test]
    fn failed_setup_step_stops_the_sequence() {
        let dir = TempDir::new().unwrap();
        let provisioner = provisioner(&dir, &[]);
        provisioner.iam().deny("PutUserPolicy");

        assert_matches!(provisioner.setup(), Err(ProvisionError::Permission(_)));
        assert!(provisioner.iam().access_key_ids("gh-ci-demo").is_empty());
        assert!(provisioner.github().secret_names().is_empty());
    }
}
