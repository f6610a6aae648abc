//! Account provisioning: validate a profile, generate credentials, persist the
//! account and hold the credentials for a single display.

use crate::config::ProvisioningConfig;
use crate::credentials::GeneratedCredentials;
use crate::password;
use crate::registry::{Account, AccountRegistry, RegistryError};
use crate::role::{RequiredField, Role};
use chrono::{DateTime, SubsecRound, Utc};
use rand::Rng;
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

/// Attributes entered by the operator. Blank strings count as missing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountProfile {
    pub name: String,
    pub role: Option<Role>,
    pub class_name: Option<String>,
    pub subject: Option<String>,
    pub email: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("name is required")]
    MissingName,
    #[error("role is required")]
    MissingRole,
    #[error("{} is required for role {role}", .field.key())]
    MissingField { field: RequiredField, role: Role },
}

#[derive(Debug, thiserror::Error)]
pub enum ProvisionError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("account creation failed")]
    Creation(#[source] RegistryError),
    #[error("previous credentials have not been acknowledged")]
    CredentialsPending,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowState {
    CollectingInput,
    Validating,
    Generating,
    Persisting,
    Presenting,
    Idle,
}

/// Who is creating the account, for which school, and when.
#[derive(Debug, Clone)]
pub struct ProvisionContext {
    pub tenant_id: Option<String>,
    pub created_by: String,
    pub now: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct IssuedCredentials {
    pub account: Account,
    pub credentials: GeneratedCredentials,
}

fn present(v: &Option<String>) -> Option<String> {
    v.as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// A profile that passed validation, with irrelevant attributes dropped.
#[derive(Debug, Clone)]
struct ValidProfile {
    name: String,
    role: Role,
    class_name: Option<String>,
    subject: Option<String>,
    email: Option<String>,
}

fn validate(profile: &AccountProfile) -> Result<ValidProfile, ValidationError> {
    let name = profile.name.trim();
    if name.is_empty() {
        return Err(ValidationError::MissingName);
    }
    let Some(role) = profile.role else {
        return Err(ValidationError::MissingRole);
    };
    let class_name = present(&profile.class_name);
    let subject = present(&profile.subject);
    for &field in role.profile().required {
        let missing = match field {
            RequiredField::Name => false,
            RequiredField::ClassName => class_name.is_none(),
            RequiredField::Subject => subject.is_none(),
        };
        if missing {
            return Err(ValidationError::MissingField { field, role });
        }
    }
    Ok(ValidProfile {
        name: name.to_string(),
        role,
        class_name: class_name.filter(|_| role.requires(RequiredField::ClassName)),
        subject: subject.filter(|_| role.requires(RequiredField::Subject)),
        email: present(&profile.email),
    })
}

/// Runs validation, generation and persistence once, without workflow state.
pub fn provision_account<R, G>(
    profile: &AccountProfile,
    ctx: &ProvisionContext,
    config: &ProvisioningConfig,
    registry: &R,
    rng: &mut G,
) -> Result<IssuedCredentials, ProvisionError>
where
    R: AccountRegistry + ?Sized,
    G: Rng + ?Sized,
{
    let valid = validate(profile)?;
    let mut issued = generate(valid, ctx, config, rng)?;
    persist(&mut issued, config, registry, rng)?;
    Ok(issued)
}

fn generate<G: Rng + ?Sized>(
    valid: ValidProfile,
    ctx: &ProvisionContext,
    config: &ProvisioningConfig,
    rng: &mut G,
) -> Result<IssuedCredentials, ProvisionError> {
    let credentials = config
        .generator()
        .generate(rng, valid.role, ctx.tenant_id.as_deref());
    let password_hash = password::hash_password(&credentials.password)
        .map_err(|e| ProvisionError::Creation(RegistryError::Hash(e.to_string())))?;

    let account = Account {
        id: Uuid::new_v4().to_string(),
        name: valid.name,
        username: credentials.username.clone(),
        password_hash,
        role: valid.role,
        tenant_id: ctx.tenant_id.clone(),
        class_name: valid.class_name,
        subject: valid.subject,
        email: valid.email,
        created_at: ctx.now.trunc_subsecs(3),
        created_by: ctx.created_by.clone(),
    };
    Ok(IssuedCredentials {
        account,
        credentials,
    })
}

/// Appends the account. A username collision reported by the registry
/// regenerates the username and retries, up to `max_username_attempts`
/// appends in total.
fn persist<R, G>(
    issued: &mut IssuedCredentials,
    config: &ProvisioningConfig,
    registry: &R,
    rng: &mut G,
) -> Result<(), ProvisionError>
where
    R: AccountRegistry + ?Sized,
    G: Rng + ?Sized,
{
    let generator = config.generator();
    let role = issued.account.role;
    let attempts = config.max_username_attempts.max(1);
    let mut attempt = 1;
    loop {
        match registry.append(&issued.account) {
            Ok(()) => break,
            Err(RegistryError::UsernameTaken { username }) if attempt < attempts => {
                warn!(%username, attempt, "username collision; regenerating");
                attempt += 1;
                let fresh =
                    generator.username(rng, role.as_str(), issued.account.tenant_id.as_deref());
                issued.credentials.username = fresh.clone();
                issued.account.username = fresh;
            }
            Err(e) => {
                warn!(error = %e, %role, "account creation failed");
                return Err(ProvisionError::Creation(e));
            }
        }
    }

    info!(
        account_id = %issued.account.id,
        %role,
        tenant_id = issued.account.tenant_id.as_deref().unwrap_or("-"),
        "account provisioned"
    );
    Ok(())
}

/// Operator-facing provisioning session.
///
/// Credentials stay available from [`ProvisioningWorkflow::presented`] until
/// [`ProvisioningWorkflow::acknowledge`]; afterwards they are gone.
#[derive(Debug)]
pub struct ProvisioningWorkflow {
    state: WorkflowState,
    draft: Option<AccountProfile>,
    presented: Option<IssuedCredentials>,
}

impl Default for ProvisioningWorkflow {
    fn default() -> Self {
        Self::new()
    }
}

impl ProvisioningWorkflow {
    pub fn new() -> Self {
        Self {
            state: WorkflowState::Idle,
            draft: None,
            presented: None,
        }
    }

    pub fn state(&self) -> WorkflowState {
        self.state
    }

    /// Profile retained after a failed attempt so the operator can fix it.
    pub fn draft(&self) -> Option<&AccountProfile> {
        self.draft.as_ref()
    }

    pub fn presented(&self) -> Option<&IssuedCredentials> {
        self.presented.as_ref()
    }

    pub fn submit<R, G>(
        &mut self,
        profile: AccountProfile,
        ctx: &ProvisionContext,
        config: &ProvisioningConfig,
        registry: &R,
        rng: &mut G,
    ) -> Result<&IssuedCredentials, ProvisionError>
    where
        R: AccountRegistry + ?Sized,
        G: Rng + ?Sized,
    {
        if self.state == WorkflowState::Presenting {
            return Err(ProvisionError::CredentialsPending);
        }

        self.state = WorkflowState::Validating;
        let valid = match validate(&profile) {
            Ok(v) => v,
            Err(e) => return Err(self.back_to_input(profile, e.into())),
        };

        self.state = WorkflowState::Generating;
        let mut issued = match generate(valid, ctx, config, rng) {
            Ok(i) => i,
            Err(e) => return Err(self.back_to_input(profile, e)),
        };

        self.state = WorkflowState::Persisting;
        if let Err(e) = persist(&mut issued, config, registry, rng) {
            return Err(self.back_to_input(profile, e));
        }

        self.state = WorkflowState::Presenting;
        self.draft = None;
        Ok(&*self.presented.insert(issued))
    }

    fn back_to_input(&mut self, profile: AccountProfile, e: ProvisionError) -> ProvisionError {
        self.state = WorkflowState::CollectingInput;
        self.draft = Some(profile);
        e
    }

    /// Closes the credential display. Returns false when nothing was shown.
    pub fn acknowledge(&mut self) -> bool {
        match self.presented.take() {
            Some(issued) => {
                drop(issued);
                self.state = WorkflowState::Idle;
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use crate::registry::SqliteRegistry;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::cell::RefCell;

    fn ctx(tenant: Option<&str>) -> ProvisionContext {
        ProvisionContext {
            tenant_id: tenant.map(str::to_string),
            created_by: "system".into(),
            now: Utc::now(),
        }
    }

    fn profile(name: &str, role: Option<Role>) -> AccountProfile {
        AccountProfile {
            name: name.into(),
            role,
            ..AccountProfile::default()
        }
    }

    /// Records appends in memory; can be told to fail or collide.
    #[derive(Default)]
    struct ScriptedRegistry {
        appended: RefCell<Vec<Account>>,
        collisions_left: RefCell<u32>,
        broken: bool,
    }

    impl AccountRegistry for ScriptedRegistry {
        fn append(&self, account: &Account) -> Result<(), RegistryError> {
            if self.broken {
                return Err(RegistryError::Storage(rusqlite::Error::InvalidQuery));
            }
            let mut left = self.collisions_left.borrow_mut();
            if *left > 0 {
                *left -= 1;
                return Err(RegistryError::UsernameTaken {
                    username: account.username.clone(),
                });
            }
            self.appended.borrow_mut().push(account.clone());
            Ok(())
        }

        fn find_match(
            &self,
            _identifier: &str,
            _password: &str,
            _role: Role,
        ) -> Result<Option<Account>, RegistryError> {
            Ok(None)
        }

        fn list_all(&self) -> Result<Vec<Account>, RegistryError> {
            Ok(self.appended.borrow().clone())
        }

        fn count_by_role(&self, role: Role) -> Result<usize, RegistryError> {
            Ok(self
                .appended
                .borrow()
                .iter()
                .filter(|a| a.role == role)
                .count())
        }
    }

    #[test]
    fn student_without_class_fails_before_any_write() {
        let reg = ScriptedRegistry::default();
        let mut rng = StdRng::seed_from_u64(1);
        let err = provision_account(
            &profile("Jane", Some(Role::Student)),
            &ctx(Some("school_1")),
            &ProvisioningConfig::default(),
            &reg,
            &mut rng,
        )
        .expect_err("class name is required");
        assert!(matches!(
            err,
            ProvisionError::Validation(ValidationError::MissingField {
                field: RequiredField::ClassName,
                role: Role::Student
            })
        ));
        assert!(reg.appended.borrow().is_empty());
    }

    #[test]
    fn subject_teacher_is_persisted_with_subject() {
        let conn = db::open_in_memory().expect("db");
        let reg = SqliteRegistry::new(&conn);
        let mut rng = rand::thread_rng();
        let mut p = profile("Amir", Some(Role::SubjectTeacher));
        p.subject = Some("Mathematics".into());
        let issued = provision_account(
            &p,
            &ctx(Some("school_1")),
            &ProvisioningConfig::default(),
            &reg,
            &mut rng,
        )
        .expect("provision");

        assert!(issued.credentials.username.starts_with("sch_subj_"));
        assert_eq!(issued.credentials.password.len(), 12);
        let all = reg.list_all().expect("list");
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].subject.as_deref(), Some("Mathematics"));
        assert_eq!(all[0], issued.account);

        let found = reg
            .find_match(
                &issued.credentials.username,
                &issued.credentials.password,
                Role::SubjectTeacher,
            )
            .expect("query");
        assert_eq!(found.map(|a| a.id), Some(issued.account.id));
    }

    #[rstest::rstest]
    #[case(profile("", Some(Role::HeadTeacher)), "name is required")]
    #[case(profile("   ", Some(Role::Administrator)), "name is required")]
    #[case(profile("Sam", None), "role is required")]
    #[case(profile("", None), "name is required")]
    #[case(profile("Kofi", Some(Role::ClassTeacher)), "className is required for role class_teacher")]
    #[case(profile("Lena", Some(Role::SubjectTeacher)), "subject is required for role subject_teacher")]
    fn validation_messages(#[case] p: AccountProfile, #[case] message: &str) {
        let err = validate(&p).expect_err("invalid profile");
        assert_eq!(err.to_string(), message);
    }

    #[test]
    fn irrelevant_attributes_are_dropped() {
        let mut p = profile("Ruth", Some(Role::HeadTeacher));
        p.class_name = Some("9B".into());
        p.subject = Some("Art".into());
        p.email = Some("  ".into());
        let v = validate(&p).expect("valid");
        assert_eq!(v.class_name, None);
        assert_eq!(v.subject, None);
        assert_eq!(v.email, None);

        let mut s = profile(" Ade ", Some(Role::Student));
        s.class_name = Some(" Grade 9A ".into());
        s.subject = Some("Art".into());
        let v = validate(&s).expect("valid");
        assert_eq!(v.name, "Ade");
        assert_eq!(v.class_name.as_deref(), Some("Grade 9A"));
        assert_eq!(v.subject, None);
    }

    #[test]
    fn collisions_regenerate_username() {
        let reg = ScriptedRegistry {
            collisions_left: RefCell::new(2),
            ..ScriptedRegistry::default()
        };
        let mut rng = StdRng::seed_from_u64(5);
        let issued = provision_account(
            &profile("Nia", Some(Role::HeadTeacher)),
            &ctx(None),
            &ProvisioningConfig::default(),
            &reg,
            &mut rng,
        )
        .expect("third attempt succeeds");
        let stored = reg.appended.borrow();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].username, issued.credentials.username);
        assert!(issued.credentials.username.starts_with("sys_head_"));
    }

    #[test]
    fn collisions_beyond_limit_fail_creation() {
        let reg = ScriptedRegistry {
            collisions_left: RefCell::new(10),
            ..ScriptedRegistry::default()
        };
        let config = ProvisioningConfig {
            max_username_attempts: 3,
            ..ProvisioningConfig::default()
        };
        let mut rng = StdRng::seed_from_u64(5);
        let err = provision_account(
            &profile("Nia", Some(Role::HeadTeacher)),
            &ctx(None),
            &config,
            &reg,
            &mut rng,
        )
        .expect_err("gives up");
        assert!(matches!(
            err,
            ProvisionError::Creation(RegistryError::UsernameTaken { .. })
        ));
        assert_eq!(*reg.collisions_left.borrow(), 7);
        assert_eq!(err.to_string(), "account creation failed");
    }

    #[test]
    fn workflow_presents_once_then_forgets() {
        let conn = db::open_in_memory().expect("db");
        let reg = SqliteRegistry::new(&conn);
        let mut rng = rand::thread_rng();
        let mut wf = ProvisioningWorkflow::new();
        assert_eq!(wf.state(), WorkflowState::Idle);

        let mut p = profile("Jane", Some(Role::Student));
        p.class_name = Some("Grade 9A".into());
        let username = wf
            .submit(p.clone(), &ctx(Some("school_1")), &ProvisioningConfig::default(), &reg, &mut rng)
            .expect("provision")
            .credentials
            .username
            .clone();
        assert_eq!(wf.state(), WorkflowState::Presenting);
        assert_eq!(
            wf.presented().map(|i| i.credentials.username.as_str()),
            Some(username.as_str())
        );

        let err = wf
            .submit(p, &ctx(Some("school_1")), &ProvisioningConfig::default(), &reg, &mut rng)
            .expect_err("must acknowledge first");
        assert!(matches!(err, ProvisionError::CredentialsPending));
        assert_eq!(reg.list_all().expect("list").len(), 1);

        assert!(wf.acknowledge());
        assert_eq!(wf.state(), WorkflowState::Idle);
        assert!(wf.presented().is_none());
        assert!(!wf.acknowledge());
    }

    #[test]
    fn workflow_keeps_draft_after_failures() {
        let mut rng = StdRng::seed_from_u64(2);
        let mut wf = ProvisioningWorkflow::new();

        let invalid = profile("Jane", Some(Role::Student));
        let reg = ScriptedRegistry::default();
        wf.submit(invalid.clone(), &ctx(None), &ProvisioningConfig::default(), &reg, &mut rng)
            .expect_err("invalid");
        assert_eq!(wf.state(), WorkflowState::CollectingInput);
        assert_eq!(wf.draft(), Some(&invalid));

        let broken = ScriptedRegistry {
            broken: true,
            ..ScriptedRegistry::default()
        };
        let mut p = invalid.clone();
        p.class_name = Some("Grade 9A".into());
        let err = wf
            .submit(p.clone(), &ctx(None), &ProvisioningConfig::default(), &broken, &mut rng)
            .expect_err("storage down");
        assert!(matches!(err, ProvisionError::Creation(RegistryError::Storage(_))));
        assert_eq!(wf.state(), WorkflowState::CollectingInput);
        assert_eq!(wf.draft(), Some(&p));
        assert!(wf.presented().is_none());

        wf.submit(p, &ctx(None), &ProvisioningConfig::default(), &reg, &mut rng)
            .expect("recovered");
        assert!(wf.draft().is_none());
    }
}
