//! # Turnstile Server
//!
//! HTTP front end for the Turnstile account service.
//!
//! - `POST /users`, `POST /register`: create an account and return a bearer
//!   token in the `Authorization` header
//! - `POST /auth`: check credentials and return a fresh bearer token
//! - `GET /`: liveness
//! - `GET /metrics`: Prometheus exposition
//!
//! The credential logic lives in `turnstile-core`; this crate decodes
//! requests, maps outcomes to HTTP and carries the ambient plumbing
//! (configuration, logging, correlation ids, metrics).

pub mod handlers;
pub mod infra;
pub mod routes;

pub use infra::app_state::AppState;
