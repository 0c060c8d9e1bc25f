use std::sync::Arc;

use anyhow::{Result, anyhow};
use axum_test::TestServer;
use turnstile_core::{
    AccountRepository, AccountService, CredentialHasher, HashParams,
    InMemoryAccountRepository, TokenIssuer, UniquenessPolicy, ValidationRules,
};
use turnstile_server::{AppState, infra::metrics::HttpMetrics, routes};

pub const TEST_SIGNING_KEY: &str = "integration-test-signing-key";

// Used by some test modules, not all
#[allow(unused)]
pub struct TestApp {
    pub server: TestServer,
    pub repository: Arc<InMemoryAccountRepository>,
    pub tokens: Arc<TokenIssuer>,
}

pub fn build_test_app() -> Result<TestApp> {
    build_test_app_with(UniquenessPolicy::default(), ValidationRules::default())
}

#[allow(unused)]
pub fn build_test_app_with(
    policy: UniquenessPolicy,
    validation: ValidationRules,
) -> Result<TestApp> {
    let repository = Arc::new(InMemoryAccountRepository::new());
    let hasher = CredentialHasher::with_params(
        HashParams::new(8, 1, 1, Some(32))
            .map_err(|err| anyhow!(err.to_string()))?,
    );
    let tokens = Arc::new(TokenIssuer::new(TEST_SIGNING_KEY)?);

    let store: Arc<dyn AccountRepository> = repository.clone();
    let accounts = AccountService::new(store, Arc::new(hasher), Arc::clone(&tokens))?
        .with_policy(policy);
    let state = AppState::new(
        Arc::new(accounts),
        Arc::new(HttpMetrics::new()?),
        validation,
    );

    let server = TestServer::builder()
        .http_transport()
        .build(routes::create_app(state))
        .map_err(|err| anyhow!(err.to_string()))?;

    Ok(TestApp {
        server,
        repository,
        tokens,
    })
}
