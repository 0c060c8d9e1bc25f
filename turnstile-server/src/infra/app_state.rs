use std::{fmt, sync::Arc};

use turnstile_core::{AccountRepository, AccountService, ValidationRules};

use super::metrics::HttpMetrics;

pub type SharedAccountService = Arc<AccountService<dyn AccountRepository>>;

#[derive(Clone)]
pub struct AppState {
    pub accounts: SharedAccountService,
    pub metrics: Arc<HttpMetrics>,
    pub validation: ValidationRules,
}

impl fmt::Debug for AppState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppState")
            .field("accounts", &self.accounts)
            .field("validation", &self.validation)
            .finish_non_exhaustive()
    }
}

impl AppState {
    pub fn new(
        accounts: SharedAccountService,
        metrics: Arc<HttpMetrics>,
        validation: ValidationRules,
    ) -> Self {
        Self {
            accounts,
            metrics,
            validation,
        }
    }

    pub fn accounts(&self) -> &AccountService<dyn AccountRepository> {
        &self.accounts
    }

    pub fn metrics(&self) -> &HttpMetrics {
        &self.metrics
    }
}
