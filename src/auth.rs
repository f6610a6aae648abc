//! Login check against the account registry.
//!
//! Every failure the caller can observe is the same "invalid credentials"
//! outcome; storage problems are logged but not distinguished.

use crate::registry::{Account, AccountRegistry, RegistryError};
use crate::role::Role;
use std::fmt;
use tracing::{info, warn};
use zeroize::Zeroizing;

#[derive(Debug, thiserror::Error)]
pub enum LoginError {
    #[error("invalid credentials")]
    InvalidCredentials,
    #[error("login failed")]
    Registry(#[from] RegistryError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum LoginValidationError {
    #[error("identifier must not be empty")]
    EmptyIdentifier,
    #[error("password must not be empty")]
    EmptyPassword,
}

/// Login payload with a trimmed identifier and an untouched password.
#[derive(Clone, PartialEq, Eq)]
pub struct LoginCredentials {
    identifier: String,
    password: Zeroizing<String>,
    role: Role,
}

impl fmt::Debug for LoginCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoginCredentials")
            .field("identifier", &self.identifier)
            .field("role", &self.role)
            .finish_non_exhaustive()
    }
}

impl LoginCredentials {
    /// Blank identifiers and empty passwords never reach the registry.
    pub fn try_from_parts(
        identifier: &str,
        password: &str,
        role: Role,
    ) -> Result<Self, LoginValidationError> {
        let identifier = identifier.trim();
        if identifier.is_empty() {
            return Err(LoginValidationError::EmptyIdentifier);
        }
        if password.is_empty() {
            return Err(LoginValidationError::EmptyPassword);
        }
        Ok(Self {
            identifier: identifier.to_string(),
            password: Zeroizing::new(password.to_string()),
            role,
        })
    }

    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    pub fn role(&self) -> Role {
        self.role
    }
}

pub fn login<R: AccountRegistry + ?Sized>(
    registry: &R,
    creds: &LoginCredentials,
) -> Result<Account, LoginError> {
    match registry.find_match(creds.identifier(), &creds.password, creds.role()) {
        Ok(Some(account)) => {
            info!(account_id = %account.id, role = %account.role, "login succeeded");
            Ok(account)
        }
        Ok(None) => {
            info!(role = %creds.role(), "login rejected");
            Err(LoginError::InvalidCredentials)
        }
        Err(e) => {
            warn!(error = %e, "login lookup failed");
            Err(LoginError::Registry(e))
        }
    }
}

/// Signed-in account held by the sidecar between requests.
#[derive(Debug, Default)]
pub struct Session {
    current: Option<Account>,
}

impl Session {
    pub fn sign_in(&mut self, account: Account) {
        self.current = Some(account);
    }

    pub fn sign_out(&mut self) -> bool {
        self.current.take().is_some()
    }

    pub fn current(&self) -> Option<&Account> {
        self.current.as_ref()
    }
}
