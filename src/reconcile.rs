//! Probe-then-act convergence shared by every remote resource the provisioner manages.
//!
//! A [Resource] knows how to observe its remote state, how to bring it into existence (or update
//! it) and how to remove it. [reconcile] drives any resource towards the desired state, treating
//! "already exists" on creation and "not found" on removal as convergence rather than failures.

use std::fmt;

use tracing::{debug, info};

/// Errors reported by remote collaborators which can express the absence or the prior existence of
/// the target resource.
pub trait RemoteError: std::error::Error {
    fn is_not_found(&self) -> bool;

    fn is_already_exists(&self) -> bool {
        false
    }
}

/// Identifies a managed remote resource. Used for logging and diagnostics only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceDescriptor {
    User {
        user_name: String,
    },
    InlinePolicy {
        user_name: String,
        policy_name: String,
    },
    ManagedPolicyAttachment {
        user_name: String,
        policy_arn: String,
    },
    AccessKey {
        user_name: String,
        access_key_id: String,
    },
    RepoSecret {
        owner: String,
        repo: String,
        secret_name: String,
    },
}

impl fmt::Display for ResourceDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::User { user_name } => write!(f, "iam user `{user_name}`"),
            Self::InlinePolicy {
                user_name,
                policy_name,
            } => write!(f, "inline policy `{policy_name}` of iam user `{user_name}`"),
            Self::ManagedPolicyAttachment {
                user_name,
                policy_arn,
            } => write!(f, "managed policy `{policy_arn}` attached to `{user_name}`"),
            Self::AccessKey {
                user_name,
                access_key_id,
            } => write!(f, "access key `{access_key_id}` of iam user `{user_name}`"),
            Self::RepoSecret {
                owner,
                repo,
                secret_name,
            } => write!(f, "secret `{secret_name}` of repository `{owner}/{repo}`"),
        }
    }
}

/// Remote state of a resource compared to its desired definition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Observed {
    Absent,
    Converged,
    Drifted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Desired {
    Present,
    Absent,
}

/// What [reconcile] had to do to reach the desired state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Created,
    Updated,
    Deleted,
    Unchanged,
}

pub trait Resource {
    type Error: RemoteError;

    fn descriptor(&self) -> ResourceDescriptor;

    fn observe(&self) -> Result<Observed, Self::Error>;

    /// Creates the resource, or replaces its definition when it already exists.
    fn apply(&self) -> Result<(), Self::Error>;

    fn remove(&self) -> Result<(), Self::Error>;
}

pub fn reconcile<R: Resource>(resource: &R, desired: Desired) -> Result<Outcome, R::Error> {
    let descriptor = resource.descriptor();
    let observed = resource.observe()?;
    debug!(resource = %descriptor, ?observed, ?desired, "reconciling");

    let outcome = match (desired, observed) {
        (Desired::Present, Observed::Converged) | (Desired::Absent, Observed::Absent) => {
            Outcome::Unchanged
        }
        (Desired::Present, Observed::Absent) => match resource.apply() {
            Ok(()) => Outcome::Created,
            Err(e) if e.is_already_exists() => Outcome::Unchanged,
            Err(e) => return Err(e),
        },
        (Desired::Present, Observed::Drifted) => {
            resource.apply()?;
            Outcome::Updated
        }
        (Desired::Absent, Observed::Converged | Observed::Drifted) => match resource.remove() {
            Ok(()) => Outcome::Deleted,
            Err(e) if e.is_not_found() => Outcome::Unchanged,
            Err(e) => return Err(e),
        },
    };

    match outcome {
        Outcome::Created => info!(resource = %descriptor, "created"),
        Outcome::Updated => info!(resource = %descriptor, "updated"),
        Outcome::Deleted => info!(resource = %descriptor, "deleted"),
        Outcome::Unchanged => info!(resource = %descriptor, "already converged"),
    }

    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use std::cell::{Cell, RefCell};

    use assert_matches::assert_matches;
    use rstest::rstest;
    use thiserror::Error;

    use super::*;

    #[derive(Debug, Error, Clone, PartialEq)]
    enum FakeError {
        #[error("not found")]
        NotFound,
        #[error("already exists")]
        AlreadyExists,
        #[error("boom")]
        Boom,
    }

    impl RemoteError for FakeError {
        fn is_not_found(&self) -> bool {
            matches!(self, Self::NotFound)
        }

        fn is_already_exists(&self) -> bool {
            matches!(self, Self::AlreadyExists)
        }
    }

    struct FakeResource {
        observed: Observed,
        apply_result: Result<(), FakeError>,
        remove_result: Result<(), FakeError>,
        calls: RefCell<Vec<&'static str>>,
        observations: Cell<usize>,
    }

    impl FakeResource {
        fn new(observed: Observed) -> Self {
            Self {
                observed,
                apply_result: Ok(()),
                remove_result: Ok(()),
                calls: RefCell::new(Vec::new()),
                observations: Cell::new(0),
            }
        }
    }

    impl Resource for FakeResource {
        type Error = FakeError;

        fn descriptor(&self) -> ResourceDescriptor {
            ResourceDescriptor::User {
                user_name: "gh-ci-demo".to_string(),
            }
        }

        fn observe(&self) -> Result<Observed, FakeError> {
            self.observations.set(self.observations.get() + 1);
            Ok(self.observed)
        }

        fn apply(&self) -> Result<(), FakeError> {
            self.calls.borrow_mut().push("apply");
            self.apply_result.clone()
        }

        fn remove(&self) -> Result<(), FakeError> {
            self.calls.borrow_mut().push("remove");
            self.remove_result.clone()
        }
    }

    #[rstest]
    #[case(Desired::Present, Observed::Absent, Outcome::Created, vec!["apply"])]
    #[case(Desired::Present, Observed::Drifted, Outcome::Updated, vec!["apply"])]
    #[case(Desired::Present, Observed::Converged, Outcome::Unchanged, vec![])]
    #[case(Desired::Absent, Observed::Converged, Outcome::Deleted, vec!["remove"])]
    #[case(Desired::Absent, Observed::Drifted, Outcome::Deleted, vec!["remove"])]
    #[case(Desired::Absent, Observed::Absent, Outcome::Unchanged, vec![])]
    fn acts_only_when_needed(
        #[case] desired: Desired,
        #[case] observed: Observed,
        #[case] expected: Outcome,
        #[case] expected_calls: Vec<&'static str>,
    ) {
        let resource = FakeResource::new(observed);

        let outcome = reconcile(&resource, desired).unwrap();

        assert_eq!(outcome, expected);
        assert_eq!(*resource.calls.borrow(), expected_calls);
        assert_eq!(resource.observations.get(), 1);
    }

    #[test]
    fn already_exists_on_create_is_convergence() {
        let resource = FakeResource {
            apply_result: Err(FakeError::AlreadyExists),
            ..FakeResource::new(Observed::Absent)
        };

        assert_eq!(
            reconcile(&resource, Desired::Present).unwrap(),
            Outcome::Unchanged
        );
    }

    #[test]
    fn not_found_on_remove_is_convergence() {
        let resource = FakeResource {
            remove_result: Err(FakeError::NotFound),
            ..FakeResource::new(Observed::Converged)
        };

        assert_eq!(
            reconcile(&resource, Desired::Absent).unwrap(),
            Outcome::Unchanged
        );
    }

    #[test]
    fn genuine_faults_are_surfaced() {
        let creating = FakeResource {
            apply_result: Err(FakeError::Boom),
            ..FakeResource::new(Observed::Absent)
        };
        assert_matches!(
            reconcile(&creating, Desired::Present),
            Err(FakeError::Boom)
        );

        let removing = FakeResource {
            remove_result: Err(FakeError::Boom),
            ..FakeResource::new(Observed::Converged)
        };
        assert_matches!(reconcile(&removing, Desired::Absent), Err(FakeError::Boom));

        // Not found while updating means something else removed it mid-flight.
        let updating = FakeResource {
            apply_result: Err(FakeError::NotFound),
            ..FakeResource::new(Observed::Drifted)
        };
        assert_matches!(
            reconcile(&updating, Desired::Present),
            Err(FakeError::NotFound)
        );
    }

    #[test]
    fn descriptors_render_for_operators() {
        let secret = ResourceDescriptor::RepoSecret {
            owner: "octo".to_string(),
            repo: "demo".to_string(),
            secret_name: "AWS_REGION".to_string(),
        };
        assert_eq!(
            secret.to_string(),
            "secret `AWS_REGION` of repository `octo/demo`"
        );
    }
}
