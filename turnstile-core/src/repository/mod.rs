//! Storage port for accounts and the adapters that implement it.

use async_trait::async_trait;
use thiserror::Error;

use crate::account::{Account, AccountField, AccountFields, AccountId, NewAccount};

mod memory;
#[cfg(feature = "postgres")]
pub mod postgres;

pub use memory::InMemoryAccountRepository;

/// Selects accounts by field equality. Values are normalized on
/// construction so they compare equal to stored values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccountFilter {
    /// The field equals the value.
    Eq(AccountField, String),
    /// Any of the field/value pairs holds. An empty list matches nothing.
    Any(Vec<(AccountField, String)>),
}

impl AccountFilter {
    pub fn eq(field: AccountField, value: &str) -> Self {
        AccountFilter::Eq(field, field.normalize(value))
    }

    pub fn any<'a>(
        predicates: impl IntoIterator<Item = (AccountField, &'a str)>,
    ) -> Self {
        AccountFilter::Any(
            predicates
                .into_iter()
                .map(|(field, value)| (field, field.normalize(value)))
                .collect(),
        )
    }

    pub fn by_identity(identity: &str) -> Self {
        Self::eq(AccountField::Identity, identity)
    }

    /// The predicates OR-ed together by this filter.
    pub fn predicates(&self) -> Vec<(AccountField, &str)> {
        match self {
            AccountFilter::Eq(field, value) => vec![(*field, value.as_str())],
            AccountFilter::Any(pairs) => pairs
                .iter()
                .map(|(field, value)| (*field, value.as_str()))
                .collect(),
        }
    }

    pub fn matches(&self, account: &Account) -> bool {
        self.predicates()
            .into_iter()
            .any(|(field, value)| account.value_of(field) == Some(value))
    }
}

#[derive(Debug, Error)]
pub enum RepositoryError {
    /// The store could not be reached or did not answer in time.
    #[error("account store unavailable: {0}")]
    Unavailable(String),
    /// A uniqueness constraint rejected the insert.
    #[error("duplicate value for {field}")]
    Duplicate { field: AccountField },
    /// A stored record could not be decoded.
    #[error("corrupt account record: {0}")]
    Corrupt(String),
}

/// Persistence operations the account workflows rely on.
///
/// Implementations must reject an insert that would duplicate a value of a
/// field held unique with [`RepositoryError::Duplicate`]; this is the
/// backstop for two registrations racing past the uniqueness check.
#[async_trait]
pub trait AccountRepository: Send + Sync {
    /// Number of accounts matching the filter.
    async fn count_matching(
        &self,
        filter: &AccountFilter,
    ) -> Result<u64, RepositoryError>;

    /// Persist a new account and return the id the store assigned.
    async fn insert_one(
        &self,
        account: NewAccount,
    ) -> Result<AccountId, RepositoryError>;

    /// First account matching the filter, if any.
    async fn find_one(
        &self,
        filter: &AccountFilter,
    ) -> Result<Option<Account>, RepositoryError>;
}
