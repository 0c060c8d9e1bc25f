use std::fmt;
use std::future::Future;
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Postgres, QueryBuilder, Row};
use tracing::info;
use uuid::Uuid;

use super::{AccountFilter, AccountRepository, RepositoryError};
use crate::account::{Account, AccountField, AccountId, NewAccount};
use crate::crypto::HashedSecret;

const ACCOUNT_COLUMNS: &str = "id, identity, secret_hash, username, organization_name, location, is_admin, created_at, updated_at";

/// Name of the table (collection) accounts live in.
///
/// Table names cannot be bound as query parameters, so they are restricted
/// to lowercase identifiers before they are ever interpolated into SQL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableName(String);

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error(
    "invalid table name {0:?}: expected 1-48 lowercase letters, digits or underscores, not starting with a digit"
)]
pub struct InvalidTableName(pub String);

impl TableName {
    const MAX_LEN: usize = 48;

    pub fn new(name: impl Into<String>) -> Result<Self, InvalidTableName> {
        let name = name.into();
        let mut chars = name.chars();
        let valid_start = chars
            .next()
            .is_some_and(|c| c.is_ascii_lowercase() || c == '_');
        let valid_rest =
            chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_');

        if valid_start && valid_rest && name.len() <= Self::MAX_LEN {
            Ok(Self(name))
        } else {
            Err(InvalidTableName(name))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn index_name(&self, field: AccountField) -> String {
        format!("{}_{}_key", self.0, field.column())
    }
}

impl Default for TableName {
    fn default() -> Self {
        Self("users".to_string())
    }
}

impl FromStr for TableName {
    type Err = InvalidTableName;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl fmt::Display for TableName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Account store backed by a single PostgreSQL table.
#[derive(Debug, Clone)]
pub struct PostgresAccountRepository {
    pool: PgPool,
    table: TableName,
    timeout: Duration,
}

impl PostgresAccountRepository {
    pub fn new(pool: PgPool, table: TableName, timeout: Duration) -> Self {
        Self {
            pool,
            table,
            timeout,
        }
    }

    /// Open a pool against `url`. Every subsequent call is bounded by
    /// `timeout`.
    pub async fn connect(
        url: &str,
        table: TableName,
        timeout: Duration,
    ) -> Result<Self, RepositoryError> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .acquire_timeout(timeout)
            .test_before_acquire(true)
            .connect(url)
            .await
            .map_err(|e| {
                RepositoryError::Unavailable(format!(
                    "Database connection failed: {e}"
                ))
            })?;

        info!(table = %table, "connected to account store");
        Ok(Self::new(pool, table, timeout))
    }

    /// Create the accounts table and its unique indexes if they are missing.
    pub async fn ensure_schema(&self) -> Result<(), RepositoryError> {
        let table = &self.table;
        let mut statements = vec![format!(
            r#"
            CREATE TABLE IF NOT EXISTS {table} (
                id UUID PRIMARY KEY,
                identity TEXT NOT NULL,
                secret_hash TEXT NOT NULL,
                username TEXT,
                organization_name TEXT,
                location TEXT,
                is_admin BOOLEAN NOT NULL DEFAULT FALSE,
                created_at TIMESTAMPTZ NOT NULL,
                updated_at TIMESTAMPTZ NOT NULL
            )
            "#
        )];
        for field in AccountField::ALL {
            let column = field.column();
            let index = table.index_name(field);
            let predicate = match field {
                AccountField::Identity => String::new(),
                _ => format!(" WHERE {column} IS NOT NULL"),
            };
            statements.push(format!(
                "CREATE UNIQUE INDEX IF NOT EXISTS {index} ON {table} ({column}){predicate}"
            ));
        }

        for statement in statements {
            self.bounded(sqlx::query(&statement).execute(&self.pool))
                .await?
                .map_err(|e| {
                    RepositoryError::Unavailable(format!(
                        "Failed to prepare {table}: {e}"
                    ))
                })?;
        }

        info!(table = %table, "account schema ready");
        Ok(())
    }

    async fn bounded<F, T>(&self, fut: F) -> Result<T, RepositoryError>
    where
        F: Future<Output = T>,
    {
        tokio::time::timeout(self.timeout, fut).await.map_err(|_| {
            RepositoryError::Unavailable(format!(
                "account store did not answer within {:?}",
                self.timeout
            ))
        })
    }

    fn push_filter<'a>(
        builder: &mut QueryBuilder<'a, Postgres>,
        filter: &'a AccountFilter,
    ) {
        let predicates = filter.predicates();
        if predicates.is_empty() {
            builder.push("FALSE");
            return;
        }

        let mut separated = builder.separated(" OR ");
        for (field, value) in predicates {
            separated.push(format!("{} = ", field.column()));
            separated.push_bind_unseparated(value);
        }
    }

    fn count_query<'a>(
        &self,
        filter: &'a AccountFilter,
    ) -> QueryBuilder<'a, Postgres> {
        let mut builder =
            QueryBuilder::new(format!("SELECT COUNT(*) FROM {} WHERE ", self.table));
        Self::push_filter(&mut builder, filter);
        builder
    }

    fn find_query<'a>(
        &self,
        filter: &'a AccountFilter,
    ) -> QueryBuilder<'a, Postgres> {
        let mut builder = QueryBuilder::new(format!(
            "SELECT {ACCOUNT_COLUMNS} FROM {} WHERE ",
            self.table
        ));
        Self::push_filter(&mut builder, filter);
        builder.push(" ORDER BY created_at ASC LIMIT 1");
        builder
    }

    fn duplicate_field(&self, constraint: Option<&str>) -> Option<AccountField> {
        let constraint = constraint?;
        AccountField::ALL
            .into_iter()
            .find(|field| self.table.index_name(*field) == constraint)
    }

    fn map_row(row: &PgRow) -> Result<Account, RepositoryError> {
        let corrupt = |column: &str, e: sqlx::Error| {
            RepositoryError::Corrupt(format!("Failed to read {column}: {e}"))
        };

        let id: Uuid = row.try_get("id").map_err(|e| corrupt("id", e))?;
        let identity: String =
            row.try_get("identity").map_err(|e| corrupt("identity", e))?;
        let secret_hash: String = row
            .try_get("secret_hash")
            .map_err(|e| corrupt("secret_hash", e))?;
        let username: Option<String> =
            row.try_get("username").map_err(|e| corrupt("username", e))?;
        let organization_name: Option<String> = row
            .try_get("organization_name")
            .map_err(|e| corrupt("organization_name", e))?;
        let location: Option<String> =
            row.try_get("location").map_err(|e| corrupt("location", e))?;
        let is_admin: bool =
            row.try_get("is_admin").map_err(|e| corrupt("is_admin", e))?;
        let created_at: DateTime<Utc> = row
            .try_get("created_at")
            .map_err(|e| corrupt("created_at", e))?;
        let updated_at: DateTime<Utc> = row
            .try_get("updated_at")
            .map_err(|e| corrupt("updated_at", e))?;

        Ok(Account {
            id: AccountId::from_uuid(id),
            identity,
            secret_hash: HashedSecret::from_stored(secret_hash),
            username,
            organization_name,
            location,
            is_admin,
            created_at,
            updated_at,
        })
    }
}

#[async_trait]
impl AccountRepository for PostgresAccountRepository {
    async fn count_matching(
        &self,
        filter: &AccountFilter,
    ) -> Result<u64, RepositoryError> {
        let mut query = self.count_query(filter);
        let count: i64 = self
            .bounded(query.build_query_scalar::<i64>().fetch_one(&self.pool))
            .await?
            .map_err(|e| {
                RepositoryError::Unavailable(format!(
                    "Failed to count accounts: {e}"
                ))
            })?;

        u64::try_from(count).map_err(|_| {
            RepositoryError::Corrupt(format!("negative account count {count}"))
        })
    }

    async fn insert_one(
        &self,
        account: NewAccount,
    ) -> Result<AccountId, RepositoryError> {
        let id = AccountId::new();
        let statement = format!(
            r#"
            INSERT INTO {} ({ACCOUNT_COLUMNS})
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
            self.table
        );

        let result = sqlx::query(&statement)
            .bind(id.as_uuid())
            .bind(&account.identity)
            .bind(account.secret_hash.as_str())
            .bind(account.username.as_deref())
            .bind(account.organization_name.as_deref())
            .bind(account.location.as_deref())
            .bind(account.is_admin)
            .bind(account.created_at)
            .bind(account.updated_at)
            .execute(&self.pool);

        self.bounded(result).await?.map_err(|e| {
            if let Some(db_err) = e.as_database_error()
                && db_err.is_unique_violation()
                && let Some(field) = self.duplicate_field(db_err.constraint())
            {
                return RepositoryError::Duplicate { field };
            }
            RepositoryError::Unavailable(format!("Failed to insert account: {e}"))
        })?;

        Ok(id)
    }

    async fn find_one(
        &self,
        filter: &AccountFilter,
    ) -> Result<Option<Account>, RepositoryError> {
        let mut query = self.find_query(filter);
        let row = self
            .bounded(query.build().fetch_optional(&self.pool))
            .await?
            .map_err(|e| {
                RepositoryError::Unavailable(format!(
                    "Failed to look up account: {e}"
                ))
            })?;

        row.as_ref().map(Self::map_row).transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn repository() -> PostgresAccountRepository {
        let pool = PgPoolOptions::new()
            .connect_lazy("postgres://localhost/turnstile")
            .unwrap();
        PostgresAccountRepository::new(
            pool,
            TableName::new("accounts").unwrap(),
            Duration::from_secs(1),
        )
    }

    #[test]
    fn table_names_are_restricted_to_identifiers() {
        assert_eq!(TableName::default().as_str(), "users");
        assert!(TableName::new("users_v2").is_ok());
        assert!(TableName::new("_shadow").is_ok());
        for bad in ["", "2users", "Users", "users; DROP TABLE x", "a-b"] {
            assert!(TableName::new(bad).is_err(), "{bad}");
        }
        assert!(TableName::new("u".repeat(48)).is_ok());
        assert!(TableName::new("u".repeat(49)).is_err());
    }

    #[tokio::test]
    async fn builds_or_queries_with_bound_values() {
        let repo = repository();
        let filter = AccountFilter::any([
            (AccountField::Identity, "a@x.com"),
            (AccountField::OrganizationName, "Acme"),
        ]);
        let query = repo.count_query(&filter);
        assert_eq!(
            query.sql(),
            "SELECT COUNT(*) FROM accounts WHERE identity = $1 OR organization_name = $2"
        );
    }

    #[tokio::test]
    async fn empty_filters_select_nothing() {
        let repo = repository();
        let filter = AccountFilter::any(std::iter::empty());
        let query = repo.find_query(&filter);
        assert_eq!(
            query.sql(),
            format!(
                "SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE FALSE ORDER BY created_at ASC LIMIT 1"
            )
        );
    }

    #[tokio::test]
    async fn maps_unique_indexes_back_to_fields() {
        let repo = repository();
        assert_eq!(
            repo.duplicate_field(Some("accounts_identity_key")),
            Some(AccountField::Identity)
        );
        assert_eq!(
            repo.duplicate_field(Some("accounts_organization_name_key")),
            Some(AccountField::OrganizationName)
        );
        assert_eq!(repo.duplicate_field(Some("accounts_pkey")), None);
        assert_eq!(repo.duplicate_field(None), None);
    }
}
