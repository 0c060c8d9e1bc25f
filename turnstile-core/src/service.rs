use std::{any::type_name_of_val, fmt, sync::Arc};

use chrono::{DateTime, Utc};
use rand::{Rng, distr::Alphanumeric};
use tracing::{error, info, warn};
use zeroize::Zeroizing;

use crate::account::{AccountId, ValidCredentials, ValidRegistration};
use crate::crypto::{CredentialHasher, HashedSecret, HashingError};
use crate::error::{AuthenticationError, InternalFailure, RegistrationError};
use crate::repository::{AccountFilter, AccountRepository, RepositoryError};
use crate::token::{SignedToken, TokenIssuer};
use crate::uniqueness::{UniquenessChecker, UniquenessError, UniquenessPolicy};

const DECOY_SECRET_LEN: usize = 32;

/// Outcome of a successful registration.
#[derive(Debug, Clone)]
pub struct RegisteredAccount {
    pub account_id: AccountId,
    pub identity: String,
    pub created_at: DateTime<Utc>,
    pub token: SignedToken,
}

/// Outcome of a successful authentication.
#[derive(Debug, Clone)]
pub struct AuthenticatedAccount {
    pub identity: String,
    pub is_admin: bool,
    pub token: SignedToken,
}

/// Registration and authentication workflows over an account store.
pub struct AccountService<R>
where
    R: AccountRepository + ?Sized,
{
    repository: Arc<R>,
    uniqueness: UniquenessChecker<R>,
    hasher: Arc<CredentialHasher>,
    tokens: Arc<TokenIssuer>,
    /// Verified against when the identity is unknown, so a miss costs the
    /// same Argon2 work as a wrong secret.
    decoy_hash: HashedSecret,
}

impl<R> fmt::Debug for AccountService<R>
where
    R: AccountRepository + ?Sized,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccountService")
            .field("repository", &type_name_of_val(self.repository.as_ref()))
            .field("uniqueness", &self.uniqueness)
            .field("hasher", &self.hasher)
            .field("tokens", &self.tokens)
            .finish()
    }
}

impl<R> AccountService<R>
where
    R: AccountRepository + ?Sized,
{
    /// Build the service with the default uniqueness policy.
    ///
    /// Hashes a throwaway secret with `hasher` up front; call from a
    /// blocking-tolerant context when the hasher uses production parameters.
    pub fn new(
        repository: Arc<R>,
        hasher: Arc<CredentialHasher>,
        tokens: Arc<TokenIssuer>,
    ) -> Result<Self, HashingError> {
        let decoy_hash = hasher.hash(&generate_decoy_secret())?;
        Ok(Self {
            uniqueness: UniquenessChecker::new(
                Arc::clone(&repository),
                UniquenessPolicy::default(),
            ),
            repository,
            hasher,
            tokens,
            decoy_hash,
        })
    }

    /// Replace the default uniqueness policy.
    pub fn with_policy(mut self, policy: UniquenessPolicy) -> Self {
        self.uniqueness =
            UniquenessChecker::new(Arc::clone(&self.repository), policy);
        self
    }

    pub fn tokens(&self) -> &TokenIssuer {
        &self.tokens
    }

    /// Create an admin account and sign its first token.
    ///
    /// The token is signed before the insert, so any failure up to and
    /// including signing leaves the store untouched.
    pub async fn register(
        &self,
        registration: ValidRegistration,
    ) -> Result<RegisteredAccount, RegistrationError> {
        match self.uniqueness.check(&registration).await {
            Ok(()) => {}
            Err(UniquenessError::Conflict(field)) => {
                warn!(%field, "registration rejected: duplicate {field}");
                return Err(RegistrationError::Conflict(field));
            }
            Err(UniquenessError::Repository(err)) => {
                error!(error = %err, "uniqueness check failed");
                return Err(InternalFailure::from(err).into());
            }
        }

        let secret_hash = self
            .hash_secret(registration.secret())
            .await
            .inspect_err(|err| error!(error = %err, "failed to hash secret"))?;

        let now = Utc::now();
        let token = self
            .tokens
            .issue_at(registration.identity(), true, now)
            .inspect_err(|err| error!(error = %err, "failed to sign token"))?;

        let account = registration.into_new_account(secret_hash, true, now);
        let identity = account.identity.clone();

        let account_id =
            self.repository.insert_one(account).await.map_err(|err| {
                match &err {
                    RepositoryError::Duplicate { field } => {
                        warn!(%field, "registration lost an insert race on {field}")
                    }
                    other => error!(error = %other, "failed to insert account"),
                }
                RegistrationError::from(err)
            })?;

        info!(%account_id, "account registered");

        Ok(RegisteredAccount {
            account_id,
            identity,
            created_at: now,
            token,
        })
    }

    /// Check a secret against the stored hash and issue a token.
    ///
    /// Unknown identities, store failures during lookup and wrong secrets
    /// all produce [`AuthenticationError::InvalidCredentials`].
    pub async fn authenticate(
        &self,
        credentials: ValidCredentials,
    ) -> Result<AuthenticatedAccount, AuthenticationError> {
        let filter = AccountFilter::by_identity(credentials.identity());

        let account = match self.repository.find_one(&filter).await {
            Ok(Some(account)) => account,
            Ok(None) => {
                self.burn_decoy(credentials.secret()).await;
                info!("authentication failed: unknown identity");
                return Err(AuthenticationError::InvalidCredentials);
            }
            Err(err) => {
                self.burn_decoy(credentials.secret()).await;
                error!(error = %err, "account lookup failed during authentication");
                return Err(AuthenticationError::InvalidCredentials);
            }
        };

        let verified = self
            .verify_secret(credentials.secret(), &account.secret_hash)
            .await
            .map_err(|err| {
                error!(error = %err, "secret verification task failed");
                AuthenticationError::Internal(err.into())
            })?;
        if !verified {
            info!(account_id = %account.id, "authentication failed: secret mismatch");
            return Err(AuthenticationError::InvalidCredentials);
        }

        let token = self
            .tokens
            .issue(&account.identity, account.is_admin)
            .inspect_err(|err| error!(error = %err, "failed to sign token"))?;

        info!(account_id = %account.id, "account authenticated");

        Ok(AuthenticatedAccount {
            identity: account.identity,
            is_admin: account.is_admin,
            token,
        })
    }

    /// Run a verification whose outcome is discarded.
    async fn burn_decoy(&self, secret: &str) {
        if let Err(err) = self.verify_secret(secret, &self.decoy_hash).await {
            warn!(error = %err, "decoy verification task failed");
        }
    }

    async fn hash_secret(
        &self,
        secret: &str,
    ) -> Result<HashedSecret, HashingError> {
        let hasher = Arc::clone(&self.hasher);
        let secret = Zeroizing::new(secret.to_string());
        tokio::task::spawn_blocking(move || hasher.hash(&secret))
            .await
            .map_err(|err| HashingError::Hash(format!("hashing task failed: {err}")))?
    }

    async fn verify_secret(
        &self,
        secret: &str,
        hashed: &HashedSecret,
    ) -> Result<bool, HashingError> {
        let hasher = Arc::clone(&self.hasher);
        let secret = Zeroizing::new(secret.to_string());
        let hashed = hashed.clone();
        tokio::task::spawn_blocking(move || hasher.verify(&secret, &hashed))
            .await
            .map_err(|err| {
                HashingError::Hash(format!("verification task failed: {err}"))
            })
    }
}

fn generate_decoy_secret() -> Zeroizing<String> {
    Zeroizing::new(
        rand::rng()
            .sample_iter(&Alphanumeric)
            .take(DECOY_SECRET_LEN)
            .map(char::from)
            .collect(),
    )
}
