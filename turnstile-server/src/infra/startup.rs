use std::sync::Arc;

use anyhow::Context;
use tracing::{info, warn};
use turnstile_core::{
    AccountRepository, AccountService, CredentialHasher,
    InMemoryAccountRepository, PostgresAccountRepository, TokenIssuer,
};

use super::{app_state::AppState, config::Config, metrics::HttpMetrics};

/// Wire the account service from configuration: pick the store, build the
/// hasher and token issuer, and bundle them into the shared state.
pub async fn build_state(config: &Config) -> anyhow::Result<AppState> {
    let repository: Arc<dyn AccountRepository> = match &config.database {
        Some(database) => {
            let repository = PostgresAccountRepository::connect(
                &database.url,
                database.collection.clone(),
                database.timeout,
            )
            .await
            .context("failed to connect to the account store")?;
            repository
                .ensure_schema()
                .await
                .context("failed to prepare the account table")?;
            Arc::new(repository)
        }
        None => {
            warn!(
                "DB_URL is not set; accounts are kept in memory and lost on restart"
            );
            Arc::new(InMemoryAccountRepository::new())
        }
    };

    let mut hasher = CredentialHasher::new().context("invalid hashing parameters")?;
    if let Some(pepper) = &config.auth.password_pepper {
        hasher = hasher
            .with_pepper(pepper.as_bytes())
            .context("invalid PASSWORD_PEPPER")?;
    }

    if config.auth.token_secret_generated {
        warn!(
            "JWT_TOKEN_SECRET is not set; using a random signing key. Tokens will not survive a restart."
        );
    }
    let tokens = TokenIssuer::new(config.auth.token_secret.as_bytes())
        .context("invalid JWT_TOKEN_SECRET")?;

    let hasher = Arc::new(hasher);
    let accounts = tokio::task::spawn_blocking(move || {
        AccountService::new(repository, hasher, Arc::new(tokens))
    })
    .await
    .context("account service setup task failed")?
    .context("failed to prepare the account service")?
    .with_policy(config.auth.uniqueness.clone());
    info!(
        policy = ?config.auth.uniqueness,
        require_organization = config.auth.validation.require_organization,
        "account service ready"
    );

    let metrics = HttpMetrics::new().context("failed to register metrics")?;

    Ok(AppState::new(
        Arc::new(accounts),
        Arc::new(metrics),
        config.auth.validation,
    ))
}
