//! Account store behaviour against a live PostgreSQL database.
//!
//! Run with `--features postgres-tests` and `DATABASE_URL` pointing at a
//! server the test user may create databases on.
#![cfg(feature = "postgres-tests")]

use std::time::Duration;

use anyhow::Result;
use chrono::Utc;
use sqlx::PgPool;
use turnstile_core::{
    AccountField, AccountFilter, AccountRepository, HashedSecret, NewAccount,
    PostgresAccountRepository, RepositoryError, TableName,
};

fn new_account(identity: &str, org: Option<&str>) -> NewAccount {
    let now = Utc::now();
    NewAccount {
        identity: identity.to_string(),
        secret_hash: HashedSecret::from_stored("$argon2id$v=19$stub"),
        username: None,
        organization_name: org.map(str::to_string),
        location: Some("Berlin".to_string()),
        is_admin: true,
        created_at: now,
        updated_at: now,
    }
}

async fn repository(pool: PgPool) -> Result<PostgresAccountRepository> {
    let repo = PostgresAccountRepository::new(
        pool,
        TableName::new("accounts")?,
        Duration::from_secs(5),
    );
    repo.ensure_schema().await?;
    Ok(repo)
}

#[sqlx::test(migrations = false)]
async fn inserts_and_reads_back_accounts(pool: PgPool) -> Result<()> {
    let repo = repository(pool).await?;
    let id = repo.insert_one(new_account("a@x.com", Some("Acme"))).await?;

    let found = repo
        .find_one(&AccountFilter::by_identity("a@x.com"))
        .await?
        .expect("inserted account is found");
    assert_eq!(found.id, id);
    assert_eq!(found.location.as_deref(), Some("Berlin"));
    assert!(found.is_admin);

    let filter = AccountFilter::any([
        (AccountField::Identity, "b@x.com"),
        (AccountField::OrganizationName, "Acme"),
    ]);
    assert_eq!(repo.count_matching(&filter).await?, 1);
    Ok(())
}

#[sqlx::test(migrations = false)]
async fn unique_indexes_report_the_duplicated_field(pool: PgPool) -> Result<()> {
    let repo = repository(pool).await?;
    repo.insert_one(new_account("a@x.com", Some("Acme"))).await?;

    let err = repo
        .insert_one(new_account("a@x.com", Some("Other")))
        .await
        .expect_err("duplicate identity is rejected");
    assert!(matches!(
        err,
        RepositoryError::Duplicate {
            field: AccountField::Identity
        }
    ));

    let err = repo
        .insert_one(new_account("b@x.com", Some("Acme")))
        .await
        .expect_err("duplicate organization is rejected");
    assert!(matches!(
        err,
        RepositoryError::Duplicate {
            field: AccountField::OrganizationName
        }
    ));

    // Accounts without an organization never collide on it.
    repo.insert_one(new_account("c@x.com", None)).await?;
    repo.insert_one(new_account("d@x.com", None)).await?;
    Ok(())
}

#[sqlx::test(migrations = false)]
async fn ensure_schema_is_idempotent(pool: PgPool) -> Result<()> {
    let repo = repository(pool).await?;
    repo.ensure_schema().await?;
    assert_eq!(
        repo.count_matching(&AccountFilter::by_identity("a@x.com"))
            .await?,
        0
    );
    Ok(())
}
