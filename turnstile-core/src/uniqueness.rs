//! Duplicate-account detection ahead of inserts.
//!
//! The check is advisory: two registrations can both pass it before either
//! insert lands. The store's unique keys settle that race and the loser
//! sees [`RepositoryError::Duplicate`].

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use thiserror::Error;
use tracing::debug;

use crate::account::{AccountField, AccountFields};
use crate::repository::{AccountFilter, AccountRepository, RepositoryError};

/// A set of fields OR-ed into a single existence query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UniquenessRule {
    fields: Vec<AccountField>,
}

impl UniquenessRule {
    pub fn new(fields: impl IntoIterator<Item = AccountField>) -> Self {
        let mut unique = Vec::new();
        for field in fields {
            if !unique.contains(&field) {
                unique.push(field);
            }
        }
        Self { fields: unique }
    }

    pub fn single(field: AccountField) -> Self {
        Self {
            fields: vec![field],
        }
    }

    pub fn fields(&self) -> &[AccountField] {
        &self.fields
    }

    /// Field/value pairs this rule queries for `candidate`. Fields the
    /// candidate has no value for are dropped.
    fn predicates<'a>(
        &self,
        candidate: &'a impl AccountFields,
    ) -> Vec<(AccountField, &'a str)> {
        self.fields
            .iter()
            .filter_map(|field| candidate.value_of(*field).map(|v| (*field, v)))
            .collect()
    }
}

/// Ordered rules evaluated before every insert. The first rule that finds
/// an existing account decides the conflict.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UniquenessPolicy {
    rules: Vec<UniquenessRule>,
}

impl UniquenessPolicy {
    pub fn identity_only() -> Self {
        Self::custom(vec![UniquenessRule::single(AccountField::Identity)])
    }

    pub fn identity_or_username() -> Self {
        Self::custom(vec![UniquenessRule::new([
            AccountField::Identity,
            AccountField::Username,
        ])])
    }

    pub fn identity_then_organization() -> Self {
        Self::custom(vec![
            UniquenessRule::single(AccountField::Identity),
            UniquenessRule::single(AccountField::OrganizationName),
        ])
    }

    pub fn custom(rules: Vec<UniquenessRule>) -> Self {
        Self { rules }
    }

    pub fn rules(&self) -> &[UniquenessRule] {
        &self.rules
    }
}

impl Default for UniquenessPolicy {
    fn default() -> Self {
        Self::identity_then_organization()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error(
    "unknown uniqueness policy {0:?}: expected identity, identity-or-username or identity-then-organization"
)]
pub struct UnknownPolicy(pub String);

impl FromStr for UniquenessPolicy {
    type Err = UnknownPolicy;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "identity" => Ok(Self::identity_only()),
            "identity-or-username" => Ok(Self::identity_or_username()),
            "identity-then-organization" => Ok(Self::identity_then_organization()),
            _ => Err(UnknownPolicy(s.to_string())),
        }
    }
}

#[derive(Debug, Error)]
pub enum UniquenessError {
    #[error("{} is already taken", .0)]
    Conflict(AccountField),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

pub struct UniquenessChecker<R: ?Sized> {
    repository: Arc<R>,
    policy: UniquenessPolicy,
}

impl<R: ?Sized> fmt::Debug for UniquenessChecker<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UniquenessChecker")
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

impl<R> UniquenessChecker<R>
where
    R: AccountRepository + ?Sized,
{
    pub fn new(repository: Arc<R>, policy: UniquenessPolicy) -> Self {
        Self { repository, policy }
    }

    /// Whether any account matches `filter`.
    pub async fn is_taken(
        &self,
        filter: &AccountFilter,
    ) -> Result<bool, RepositoryError> {
        Ok(self.repository.count_matching(filter).await? > 0)
    }

    /// Run every rule of the policy against `candidate` in order.
    pub async fn check(
        &self,
        candidate: &impl AccountFields,
    ) -> Result<(), UniquenessError> {
        for rule in self.policy.rules() {
            let predicates = rule.predicates(candidate);
            let filter = match predicates.as_slice() {
                [] => continue,
                [(field, value)] => AccountFilter::eq(*field, value),
                _ => AccountFilter::any(predicates.iter().copied()),
            };

            if !self.is_taken(&filter).await? {
                continue;
            }

            let field = self.conflicting_field(&predicates).await?;
            debug!(%field, "uniqueness rule matched an existing account");
            return Err(UniquenessError::Conflict(field));
        }
        Ok(())
    }

    /// Name the field behind a match on a multi-field rule.
    async fn conflicting_field(
        &self,
        predicates: &[(AccountField, &str)],
    ) -> Result<AccountField, RepositoryError> {
        if let [(field, _)] = predicates {
            return Ok(*field);
        }
        for (field, value) in predicates {
            if self.is_taken(&AccountFilter::eq(*field, value)).await? {
                return Ok(*field);
            }
        }
        // The combined query matched but no single field did; only possible
        // if a conflicting record vanished in between.
        Ok(predicates[0].0)
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use chrono::Utc;

    use super::*;
    use crate::account::{Account, AccountId, NewAccount};
    use crate::crypto::HashedSecret;
    use crate::repository::InMemoryAccountRepository;

    fn candidate(
        identity: &str,
        username: Option<&str>,
        org: Option<&str>,
    ) -> NewAccount {
        let now = Utc::now();
        NewAccount {
            identity: identity.to_string(),
            secret_hash: HashedSecret::from_stored("$argon2id$stub"),
            username: username.map(str::to_string),
            organization_name: org.map(str::to_string),
            location: None,
            is_admin: true,
            created_at: now,
            updated_at: now,
        }
    }

    async fn seeded() -> Arc<InMemoryAccountRepository> {
        let repo = Arc::new(InMemoryAccountRepository::new());
        repo.insert_one(candidate("a@x.com", Some("alice"), Some("Acme")))
            .await
            .unwrap();
        repo
    }

    #[tokio::test]
    async fn default_policy_checks_identity_then_organization() {
        let checker =
            UniquenessChecker::new(seeded().await, UniquenessPolicy::default());

        let err = checker
            .check(&candidate("a@x.com", None, Some("Acme")))
            .await
            .unwrap_err();
        assert!(matches!(err, UniquenessError::Conflict(AccountField::Identity)));

        let err = checker
            .check(&candidate("b@x.com", None, Some("Acme")))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            UniquenessError::Conflict(AccountField::OrganizationName)
        ));

        // Username is not part of this policy.
        checker
            .check(&candidate("b@x.com", Some("alice"), Some("Other")))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn multi_field_rules_label_the_matching_field() {
        let checker = UniquenessChecker::new(
            seeded().await,
            UniquenessPolicy::identity_or_username(),
        );

        let err = checker
            .check(&candidate("b@x.com", Some("alice"), None))
            .await
            .unwrap_err();
        assert!(matches!(err, UniquenessError::Conflict(AccountField::Username)));

        let err = checker
            .check(&candidate("a@x.com", Some("alice"), None))
            .await
            .unwrap_err();
        assert!(matches!(err, UniquenessError::Conflict(AccountField::Identity)));

        checker
            .check(&candidate("b@x.com", None, Some("Acme")))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn identity_only_ignores_other_fields() {
        let checker = UniquenessChecker::new(
            seeded().await,
            UniquenessPolicy::identity_only(),
        );
        checker
            .check(&candidate("b@x.com", Some("alice"), Some("Acme")))
            .await
            .unwrap();
        assert!(
            checker
                .is_taken(&AccountFilter::by_identity("A@X.com"))
                .await
                .unwrap()
        );
    }

    #[tokio::test]
    async fn rules_without_values_are_skipped() {
        let checker = UniquenessChecker::new(
            Arc::new(FailingRepository),
            UniquenessPolicy::custom(vec![UniquenessRule::single(
                AccountField::Username,
            )]),
        );
        // No username, so no query is ever issued.
        checker
            .check(&candidate("a@x.com", None, Some("Acme")))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn store_failures_are_not_conflicts() {
        let checker = UniquenessChecker::new(
            Arc::new(FailingRepository),
            UniquenessPolicy::default(),
        );
        let err = checker
            .check(&candidate("a@x.com", None, Some("Acme")))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            UniquenessError::Repository(RepositoryError::Unavailable(_))
        ));
    }

    #[test]
    fn parses_policy_names() {
        assert_eq!(
            "identity".parse::<UniquenessPolicy>().unwrap(),
            UniquenessPolicy::identity_only()
        );
        assert_eq!(
            "Identity-Or-Username".parse::<UniquenessPolicy>().unwrap(),
            UniquenessPolicy::identity_or_username()
        );
        assert_eq!(
            "identity-then-organization"
                .parse::<UniquenessPolicy>()
                .unwrap(),
            UniquenessPolicy::default()
        );
        assert!("everything".parse::<UniquenessPolicy>().is_err());
    }

    #[test]
    fn rules_drop_repeated_fields() {
        let rule = UniquenessRule::new([
            AccountField::Identity,
            AccountField::Identity,
            AccountField::Username,
        ]);
        assert_eq!(
            rule.fields(),
            &[AccountField::Identity, AccountField::Username]
        );
    }

    struct FailingRepository;

    #[async_trait]
    impl AccountRepository for FailingRepository {
        async fn count_matching(
            &self,
            _filter: &AccountFilter,
        ) -> Result<u64, RepositoryError> {
            Err(RepositoryError::Unavailable("connection refused".into()))
        }

        async fn insert_one(
            &self,
            _account: NewAccount,
        ) -> Result<AccountId, RepositoryError> {
            Err(RepositoryError::Unavailable("connection refused".into()))
        }

        async fn find_one(
            &self,
            _filter: &AccountFilter,
        ) -> Result<Option<Account>, RepositoryError> {
            Err(RepositoryError::Unavailable("connection refused".into()))
        }
    }
}
