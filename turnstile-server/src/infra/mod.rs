pub mod app_state;
pub mod config;
pub mod correlation;
pub mod errors;
pub mod logging;
pub mod metrics;
pub mod startup;
