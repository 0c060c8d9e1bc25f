use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{AccountFilter, AccountRepository, RepositoryError};
use crate::account::{Account, AccountField, AccountFields, AccountId, NewAccount};

/// Process-local account store. Every field in [`AccountField::ALL`] is
/// held unique among accounts that carry a value for it.
#[derive(Debug, Default)]
pub struct InMemoryAccountRepository {
    accounts: RwLock<Vec<Account>>,
}

impl InMemoryAccountRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every stored account in insertion order.
    pub async fn all(&self) -> Vec<Account> {
        self.accounts.read().await.clone()
    }

    pub async fn len(&self) -> usize {
        self.accounts.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.accounts.read().await.is_empty()
    }
}

#[async_trait]
impl AccountRepository for InMemoryAccountRepository {
    async fn count_matching(
        &self,
        filter: &AccountFilter,
    ) -> Result<u64, RepositoryError> {
        let accounts = self.accounts.read().await;
        Ok(accounts.iter().filter(|a| filter.matches(a)).count() as u64)
    }

    async fn insert_one(
        &self,
        account: NewAccount,
    ) -> Result<AccountId, RepositoryError> {
        let mut accounts = self.accounts.write().await;

        for field in AccountField::ALL {
            let Some(value) = account.value_of(field) else {
                continue;
            };
            if accounts
                .iter()
                .any(|existing| existing.value_of(field) == Some(value))
            {
                return Err(RepositoryError::Duplicate { field });
            }
        }

        let id = AccountId::new();
        accounts.push(Account::from_new(id, account));
        Ok(id)
    }

    async fn find_one(
        &self,
        filter: &AccountFilter,
    ) -> Result<Option<Account>, RepositoryError> {
        let accounts = self.accounts.read().await;
        Ok(accounts.iter().find(|a| filter.matches(a)).cloned())
    }
}
