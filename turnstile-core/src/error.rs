//! Failure types surfaced by the account workflows.

use thiserror::Error;

use crate::account::AccountField;
use crate::crypto::HashingError;
use crate::repository::RepositoryError;
use crate::token::SigningError;

/// A failure the caller cannot act on. Detail is for logs only and never
/// reaches a client.
#[derive(Debug, Error)]
pub enum InternalFailure {
    #[error("account store error: {0}")]
    Repository(#[from] RepositoryError),
    #[error("hashing error: {0}")]
    Hashing(#[from] HashingError),
    #[error("token signing error: {0}")]
    Signing(#[from] SigningError),
}

#[derive(Debug, Error)]
pub enum RegistrationError {
    /// An existing account already holds the value of this field.
    #[error("{}", .0.conflict_message())]
    Conflict(AccountField),
    #[error(transparent)]
    Internal(#[from] InternalFailure),
}

#[derive(Debug, Error)]
pub enum AuthenticationError {
    /// Unknown identity or wrong secret; the two are indistinguishable.
    #[error("Invalid credentials")]
    InvalidCredentials,
    #[error(transparent)]
    Internal(#[from] InternalFailure),
}

impl From<RepositoryError> for RegistrationError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::Duplicate { field } => {
                RegistrationError::Conflict(field)
            }
            other => RegistrationError::Internal(other.into()),
        }
    }
}

impl From<HashingError> for RegistrationError {
    fn from(err: HashingError) -> Self {
        RegistrationError::Internal(err.into())
    }
}

impl From<SigningError> for RegistrationError {
    fn from(err: SigningError) -> Self {
        RegistrationError::Internal(err.into())
    }
}

impl From<SigningError> for AuthenticationError {
    fn from(err: SigningError) -> Self {
        AuthenticationError::Internal(err.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conflict_messages_name_the_field() {
        assert_eq!(
            RegistrationError::Conflict(AccountField::Identity).to_string(),
            "User with this email already exists"
        );
        assert_eq!(
            RegistrationError::Conflict(AccountField::OrganizationName)
                .to_string(),
            "Organization name already exists"
        );
    }

    #[test]
    fn duplicate_inserts_become_conflicts() {
        let err: RegistrationError = RepositoryError::Duplicate {
            field: AccountField::Username,
        }
        .into();
        assert!(matches!(
            err,
            RegistrationError::Conflict(AccountField::Username)
        ));

        let err: RegistrationError =
            RepositoryError::Unavailable("connection refused".into()).into();
        assert!(matches!(
            err,
            RegistrationError::Internal(InternalFailure::Repository(_))
        ));
    }
}
