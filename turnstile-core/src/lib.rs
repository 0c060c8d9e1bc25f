//! # Turnstile Core
//!
//! Credential lifecycle for the Turnstile account service.
//!
//! The crate owns the parts of account handling that carry security
//! contracts:
//!
//! - [`crypto::CredentialHasher`]: Argon2id hashing and constant-time
//!   verification of account secrets
//! - [`uniqueness::UniquenessChecker`]: duplicate detection ahead of inserts,
//!   driven by a configurable [`uniqueness::UniquenessPolicy`]
//! - [`token::TokenIssuer`]: HS256 bearer tokens with a fifteen minute expiry
//! - [`service::AccountService`]: the registration and authentication
//!   workflows that tie the pieces together
//!
//! Storage is reached through the [`repository::AccountRepository`] port.
//! A PostgreSQL adapter (feature `postgres`, on by default) and an in-memory
//! adapter ship with the crate.

pub mod account;
pub mod crypto;
pub mod error;
pub mod repository;
pub mod service;
pub mod token;
pub mod uniqueness;

pub use account::{
    Account, AccountField, AccountFields, AccountId, Credentials, NewAccount,
    RegistrationRequest, ValidCredentials, ValidRegistration,
    ValidationError, ValidationRules,
};
pub use crypto::{CredentialHasher, HashParams, HashedSecret, HashingError};
pub use error::{AuthenticationError, InternalFailure, RegistrationError};
pub use repository::{
    AccountFilter, AccountRepository, InMemoryAccountRepository,
    RepositoryError,
};
pub use service::{AccountService, AuthenticatedAccount, RegisteredAccount};
pub use token::{AccessClaims, SignedToken, SigningError, TokenIssuer};
pub use uniqueness::{
    UniquenessChecker, UniquenessError, UniquenessPolicy, UniquenessRule,
};

#[cfg(feature = "postgres")]
pub use repository::postgres::{PostgresAccountRepository, TableName};
