//! Username and password generation for provisioned accounts.

use crate::role::{self, Role};
use rand::seq::SliceRandom;
use rand::Rng;
use std::fmt;
use zeroize::Zeroizing;

pub const DEFAULT_PASSWORD_LENGTH: usize = 12;
pub const DEFAULT_FALLBACK_PREFIX: &str = "sys";
pub const USERNAME_SUFFIX_LEN: usize = 6;
const TENANT_PREFIX_LEN: usize = 3;

const UPPERCASE: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ";
const LOWERCASE: &[u8] = b"abcdefghijklmnopqrstuvwxyz";
const DIGITS: &[u8] = b"0123456789";
pub const SYMBOLS: &[u8] = b"!@#$%^&*()_+-=[]{}|;:,.<>?";
const BASE36: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

const CHARACTER_CLASSES: [&[u8]; 4] = [UPPERCASE, LOWERCASE, DIGITS, SYMBOLS];

/// Credentials as issued to the operator. The password is wiped on drop.
#[derive(Clone)]
pub struct GeneratedCredentials {
    pub username: String,
    pub password: Zeroizing<String>,
    pub role: Role,
    pub tenant_id: Option<String>,
}

impl fmt::Debug for GeneratedCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GeneratedCredentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("role", &self.role)
            .field("tenant_id", &self.tenant_id)
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct CredentialGenerator {
    password_length: usize,
    fallback_prefix: String,
}

impl Default for CredentialGenerator {
    fn default() -> Self {
        Self {
            password_length: DEFAULT_PASSWORD_LENGTH,
            fallback_prefix: DEFAULT_FALLBACK_PREFIX.to_string(),
        }
    }
}

impl CredentialGenerator {
    pub fn new(password_length: usize, fallback_prefix: impl Into<String>) -> Self {
        Self {
            password_length,
            fallback_prefix: fallback_prefix.into(),
        }
    }

    pub fn generate<R: Rng + ?Sized>(
        &self,
        rng: &mut R,
        role: Role,
        tenant_id: Option<&str>,
    ) -> GeneratedCredentials {
        GeneratedCredentials {
            username: self.username(rng, role.as_str(), tenant_id),
            password: self.password(rng),
            role,
            tenant_id: tenant_id.map(str::to_string),
        }
    }

    /// `{tenantPrefix}_{roleTag}_{suffix}`. Uniqueness is not checked here.
    pub fn username<R: Rng + ?Sized>(
        &self,
        rng: &mut R,
        raw_role: &str,
        tenant_id: Option<&str>,
    ) -> String {
        let prefix: String = match tenant_id {
            Some(t) if !t.is_empty() => t.chars().take(TENANT_PREFIX_LEN).collect(),
            _ => self.fallback_prefix.clone(),
        };
        let suffix: String = (0..USERNAME_SUFFIX_LEN)
            .map(|_| pick(rng, BASE36))
            .collect();
        format!("{}_{}_{}", prefix, role::username_tag(raw_role), suffix)
    }

    /// One character from each class first, the rest from the union, then shuffled.
    pub fn password<R: Rng + ?Sized>(&self, rng: &mut R) -> Zeroizing<String> {
        let mut chars: Zeroizing<Vec<char>> =
            Zeroizing::new(Vec::with_capacity(self.password_length));
        for class in CHARACTER_CLASSES.iter().take(self.password_length) {
            chars.push(pick(rng, class));
        }
        while chars.len() < self.password_length {
            let class = pick_class_weighted(rng);
            chars.push(pick(rng, class));
        }
        chars.shuffle(rng);
        Zeroizing::new(chars.iter().collect())
    }
}

fn pick<R: Rng + ?Sized>(rng: &mut R, set: &[u8]) -> char {
    char::from(set[rng.gen_range(0..set.len())])
}

// Choosing a class proportionally to its size and then a member uniformly is
// the same as drawing uniformly from the union of all classes.
fn pick_class_weighted<R: Rng + ?Sized>(rng: &mut R) -> &'static [u8] {
    let total: usize = CHARACTER_CLASSES.iter().map(|c| c.len()).sum();
    let mut n = rng.gen_range(0..total);
    for class in CHARACTER_CLASSES {
        if n < class.len() {
            return class;
        }
        n -= class.len();
    }
    SYMBOLS
}

/// Text block shown once to the operator who created the account.
pub fn format_for_display(creds: &GeneratedCredentials) -> String {
    let mut out = format!(
        "Username: {}\nPassword: {}\nRole: {}",
        creds.username,
        creds.password.as_str(),
        creds.role
    );
    if let Some(tenant) = &creds.tenant_id {
        out.push_str(&format!("\nSchool ID: {}", tenant));
    }
    out
}

pub fn is_symbol(c: char) -> bool {
    c.is_ascii() && SYMBOLS.contains(&(c as u8))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use rstest::rstest;

    fn has_all_classes(pw: &str) -> bool {
        pw.chars().any(|c| c.is_ascii_uppercase())
            && pw.chars().any(|c| c.is_ascii_lowercase())
            && pw.chars().any(|c| c.is_ascii_digit())
            && pw.chars().any(is_symbol)
    }

    #[rstest]
    #[case(Role::Administrator)]
    #[case(Role::HeadTeacher)]
    #[case(Role::ClassTeacher)]
    #[case(Role::SubjectTeacher)]
    #[case(Role::Student)]
    fn password_has_length_twelve_and_every_class(#[case] role: Role) {
        let gen = CredentialGenerator::default();
        let mut rng = rand::thread_rng();
        for _ in 0..200 {
            let creds = gen.generate(&mut rng, role, Some("school_1"));
            assert_eq!(creds.password.chars().count(), 12);
            assert!(has_all_classes(&creds.password), "{}", creds.password.as_str());
            assert!(creds
                .password
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || is_symbol(c)));
        }
    }

    #[rstest]
    #[case(Role::Administrator, Some("school_1"), "sch_admin_")]
    #[case(Role::HeadTeacher, Some("ab"), "ab_head_")]
    #[case(Role::ClassTeacher, None, "sys_class_")]
    #[case(Role::SubjectTeacher, Some(""), "sys_subj_")]
    #[case(Role::Student, Some("xyz-tenant"), "xyz_stud_")]
    fn username_matches_prefix_tag_suffix(
        #[case] role: Role,
        #[case] tenant: Option<&str>,
        #[case] expected_head: &str,
    ) {
        let gen = CredentialGenerator::default();
        let mut rng = StdRng::seed_from_u64(7);
        let creds = gen.generate(&mut rng, role, tenant);
        let suffix = creds
            .username
            .strip_prefix(expected_head)
            .unwrap_or_else(|| panic!("{} lacks {}", creds.username, expected_head));
        assert_eq!(suffix.len(), USERNAME_SUFFIX_LEN);
        assert!(suffix
            .chars()
            .all(|c| c.is_ascii_digit() || c.is_ascii_lowercase()));
    }

    #[test]
    fn unknown_role_string_gets_generic_tag() {
        let gen = CredentialGenerator::default();
        let mut rng = StdRng::seed_from_u64(1);
        let u = gen.username(&mut rng, "caretaker", Some("north"));
        assert!(u.starts_with("nor_user_"), "{}", u);
    }

    #[test]
    fn tenant_prefix_counts_characters_not_bytes() {
        let gen = CredentialGenerator::default();
        let mut rng = StdRng::seed_from_u64(3);
        let u = gen.username(&mut rng, "student", Some("ééé-school"));
        assert!(u.starts_with("ééé_stud_"), "{}", u);
    }

    #[test]
    fn successive_generations_differ() {
        let gen = CredentialGenerator::default();
        let mut rng = rand::thread_rng();
        let a = gen.generate(&mut rng, Role::Student, Some("school_1"));
        let b = gen.generate(&mut rng, Role::Student, Some("school_1"));
        assert_ne!(a.password.as_str(), b.password.as_str());
        assert_ne!(a.username, b.username);
    }

    #[test]
    fn guaranteed_classes_do_not_stay_in_fixed_positions() {
        let gen = CredentialGenerator::default();
        let mut rng = StdRng::seed_from_u64(42);
        let first_is_upper = (0..100)
            .filter(|_| {
                gen.password(&mut rng)
                    .chars()
                    .next()
                    .is_some_and(|c| c.is_ascii_uppercase())
            })
            .count();
        assert!(first_is_upper < 100);
    }

    #[test]
    fn configured_length_is_respected() {
        let gen = CredentialGenerator::new(20, "tst");
        let mut rng = StdRng::seed_from_u64(9);
        let pw = gen.password(&mut rng);
        assert_eq!(pw.len(), 20);
        assert!(has_all_classes(&pw));
        assert!(gen.username(&mut rng, "student", None).starts_with("tst_stud_"));
    }

    #[test]
    fn short_lengths_still_yield_requested_size() {
        let gen = CredentialGenerator::new(2, "sys");
        let mut rng = StdRng::seed_from_u64(5);
        assert_eq!(gen.password(&mut rng).len(), 2);
    }

    #[test]
    fn display_includes_school_only_when_present() {
        let gen = CredentialGenerator::default();
        let mut rng = StdRng::seed_from_u64(11);
        let with = gen.generate(&mut rng, Role::Student, Some("school_1"));
        let text = format_for_display(&with);
        assert!(text.starts_with(&format!("Username: {}\n", with.username)));
        assert!(text.contains("\nRole: student"));
        assert!(text.ends_with("\nSchool ID: school_1"));

        let without = gen.generate(&mut rng, Role::Administrator, None);
        assert!(!format_for_display(&without).contains("School ID"));
    }

    #[test]
    fn debug_output_redacts_password() {
        let gen = CredentialGenerator::default();
        let mut rng = StdRng::seed_from_u64(13);
        let creds = gen.generate(&mut rng, Role::Student, None);
        let dbg = format!("{:?}", creds);
        assert!(!dbg.contains(creds.password.as_str()));
        assert!(dbg.contains("<redacted>"));
    }
}
