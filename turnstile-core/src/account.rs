//! Account model and the request types that feed the workflows.
//!
//! Requests arrive as [`RegistrationRequest`] and [`Credentials`] straight
//! from the boundary layer. Validation turns them into [`ValidRegistration`]
//! and [`ValidCredentials`], which are the only inputs the workflows accept.

use std::fmt;

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use zeroize::Zeroizing;

use crate::crypto::HashedSecret;

/// Shortest secret accepted at registration (in characters).
pub const MIN_SECRET_LEN: usize = 8;
/// Longest secret accepted anywhere (in characters).
pub const MAX_SECRET_LEN: usize = 300;

const MAX_IDENTITY_LEN: usize = 254;
const MAX_USERNAME_LEN: usize = 64;
const MAX_ORGANIZATION_LEN: usize = 200;

static EMAIL_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^[a-z0-9.!#$%&'*+/=?^_`{|}~-]+@[a-z0-9](?:[a-z0-9-]{0,61}[a-z0-9])?(?:\.[a-z0-9](?:[a-z0-9-]{0,61}[a-z0-9])?)*$",
    )
    .expect("email pattern is a valid regex")
});

/// Identifier assigned to an account by the store on insert.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize,
    Deserialize,
)]
#[serde(transparent)]
pub struct AccountId(Uuid);

impl AccountId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    pub fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for AccountId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Account fields that can be queried and held unique.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountField {
    Identity,
    Username,
    OrganizationName,
}

impl AccountField {
    pub const ALL: [AccountField; 3] = [
        AccountField::Identity,
        AccountField::Username,
        AccountField::OrganizationName,
    ];

    /// Storage column backing the field.
    pub fn column(self) -> &'static str {
        match self {
            AccountField::Identity => "identity",
            AccountField::Username => "username",
            AccountField::OrganizationName => "organization_name",
        }
    }

    /// Client-facing message for a uniqueness conflict on this field.
    pub fn conflict_message(self) -> &'static str {
        match self {
            AccountField::Identity => "User with this email already exists",
            AccountField::Username => "Username already exists",
            AccountField::OrganizationName => "Organization name already exists",
        }
    }

    /// Normalize a raw value the same way stored values are normalized, so
    /// filters and stored records compare equal.
    pub fn normalize(self, value: &str) -> String {
        match self {
            AccountField::Identity => normalize_identity(value),
            AccountField::Username | AccountField::OrganizationName => {
                value.trim().to_string()
            }
        }
    }
}

impl fmt::Display for AccountField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            AccountField::Identity => "email",
            AccountField::Username => "username",
            AccountField::OrganizationName => "organization name",
        };
        f.write_str(label)
    }
}

/// An account ready to be inserted. Carries the secret only as a hash.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewAccount {
    pub identity: String,
    pub secret_hash: HashedSecret,
    pub username: Option<String>,
    pub organization_name: Option<String>,
    pub location: Option<String>,
    pub is_admin: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Read access to the values of the unique-able fields.
pub trait AccountFields {
    fn value_of(&self, field: AccountField) -> Option<&str>;
}

impl AccountFields for NewAccount {
    fn value_of(&self, field: AccountField) -> Option<&str> {
        match field {
            AccountField::Identity => Some(self.identity.as_str()),
            AccountField::Username => self.username.as_deref(),
            AccountField::OrganizationName => self.organization_name.as_deref(),
        }
    }
}

/// A persisted account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Account {
    pub id: AccountId,
    pub identity: String,
    pub secret_hash: HashedSecret,
    pub username: Option<String>,
    pub organization_name: Option<String>,
    pub location: Option<String>,
    pub is_admin: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Account {
    /// Attach the store-assigned id to an inserted record.
    pub fn from_new(id: AccountId, account: NewAccount) -> Self {
        let NewAccount {
            identity,
            secret_hash,
            username,
            organization_name,
            location,
            is_admin,
            created_at,
            updated_at,
        } = account;

        Self {
            id,
            identity,
            secret_hash,
            username,
            organization_name,
            location,
            is_admin,
            created_at,
            updated_at,
        }
    }
}

impl AccountFields for Account {
    fn value_of(&self, field: AccountField) -> Option<&str> {
        match field {
            AccountField::Identity => Some(self.identity.as_str()),
            AccountField::Username => self.username.as_deref(),
            AccountField::OrganizationName => self.organization_name.as_deref(),
        }
    }
}

/// Validation errors for client-supplied account data
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("Invalid email address")]
    InvalidIdentity,

    #[error("Password must be between 8 and 300 characters")]
    SecretLength,

    #[error("Password is required")]
    MissingSecret,

    #[error("Organization name is required")]
    MissingOrganization,

    #[error("Invalid organization name: must be at most 200 characters")]
    InvalidOrganization,

    #[error(
        "Invalid username: must be 3-64 characters, alphanumeric, underscore, dot or hyphen"
    )]
    InvalidUsername,
}

/// Which optional registration fields a deployment insists on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValidationRules {
    pub require_organization: bool,
}

impl Default for ValidationRules {
    fn default() -> Self {
        Self {
            require_organization: true,
        }
    }
}

/// Registration input as received from a client.
#[derive(Clone)]
pub struct RegistrationRequest {
    pub identity: String,
    pub secret: String,
    pub username: Option<String>,
    pub organization_name: Option<String>,
    pub location: Option<String>,
}

impl fmt::Debug for RegistrationRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegistrationRequest")
            .field("identity", &self.identity)
            .field("secret", &"<redacted>")
            .field("username", &self.username)
            .field("organization_name", &self.organization_name)
            .field("location", &self.location)
            .finish()
    }
}

impl RegistrationRequest {
    /// Check formats and lengths, normalizing the identity and trimming
    /// optional fields. Blank optional fields are treated as absent.
    pub fn validate(
        self,
        rules: &ValidationRules,
    ) -> Result<ValidRegistration, ValidationError> {
        let RegistrationRequest {
            identity,
            secret,
            username,
            organization_name,
            location,
        } = self;
        let secret = Zeroizing::new(secret);

        let identity = validate_identity(&identity)?;

        if secret.is_empty() {
            return Err(ValidationError::MissingSecret);
        }
        let secret_len = secret.chars().count();
        if !(MIN_SECRET_LEN..=MAX_SECRET_LEN).contains(&secret_len) {
            return Err(ValidationError::SecretLength);
        }

        let username = non_blank(username);
        if let Some(name) = username.as_deref() {
            validate_username(name)?;
        }

        let organization_name = non_blank(organization_name);
        match organization_name.as_deref() {
            None if rules.require_organization => {
                return Err(ValidationError::MissingOrganization);
            }
            Some(org) if org.chars().count() > MAX_ORGANIZATION_LEN => {
                return Err(ValidationError::InvalidOrganization);
            }
            _ => {}
        }

        Ok(ValidRegistration {
            identity,
            secret,
            username,
            organization_name,
            location: non_blank(location),
        })
    }
}

/// Registration input that passed validation.
#[derive(Clone)]
pub struct ValidRegistration {
    identity: String,
    secret: Zeroizing<String>,
    username: Option<String>,
    organization_name: Option<String>,
    location: Option<String>,
}

impl fmt::Debug for ValidRegistration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ValidRegistration")
            .field("identity", &self.identity)
            .field("username", &self.username)
            .field("organization_name", &self.organization_name)
            .finish_non_exhaustive()
    }
}

impl ValidRegistration {
    pub fn identity(&self) -> &str {
        &self.identity
    }

    pub fn secret(&self) -> &str {
        &self.secret
    }

    pub fn username(&self) -> Option<&str> {
        self.username.as_deref()
    }

    pub fn organization_name(&self) -> Option<&str> {
        self.organization_name.as_deref()
    }

    pub fn location(&self) -> Option<&str> {
        self.location.as_deref()
    }

    /// Build the insertable record once the secret has been hashed.
    pub fn into_new_account(
        self,
        secret_hash: HashedSecret,
        is_admin: bool,
        now: DateTime<Utc>,
    ) -> NewAccount {
        NewAccount {
            identity: self.identity,
            secret_hash,
            username: self.username,
            organization_name: self.organization_name,
            location: self.location,
            is_admin,
            created_at: now,
            updated_at: now,
        }
    }
}

impl AccountFields for ValidRegistration {
    fn value_of(&self, field: AccountField) -> Option<&str> {
        match field {
            AccountField::Identity => Some(self.identity.as_str()),
            AccountField::Username => self.username(),
            AccountField::OrganizationName => self.organization_name(),
        }
    }
}

/// Authentication input as received from a client.
#[derive(Clone)]
pub struct Credentials {
    pub identity: String,
    pub secret: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("identity", &self.identity)
            .field("secret", &"<redacted>")
            .finish()
    }
}

impl Credentials {
    /// Only shape is checked here. The registration length floor is not
    /// applied so a short wrong secret is an authentication failure, not a
    /// validation failure.
    pub fn validate(self) -> Result<ValidCredentials, ValidationError> {
        let secret = Zeroizing::new(self.secret);
        let identity = validate_identity(&self.identity)?;

        if secret.is_empty() {
            return Err(ValidationError::MissingSecret);
        }
        if secret.chars().count() > MAX_SECRET_LEN {
            return Err(ValidationError::SecretLength);
        }

        Ok(ValidCredentials { identity, secret })
    }
}

/// Authentication input that passed validation.
#[derive(Clone)]
pub struct ValidCredentials {
    identity: String,
    secret: Zeroizing<String>,
}

impl fmt::Debug for ValidCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ValidCredentials")
            .field("identity", &self.identity)
            .finish_non_exhaustive()
    }
}

impl ValidCredentials {
    pub fn identity(&self) -> &str {
        &self.identity
    }

    pub fn secret(&self) -> &str {
        &self.secret
    }
}

/// Lowercase and trim an email identity.
pub fn normalize_identity(identity: &str) -> String {
    identity.trim().to_lowercase()
}

fn validate_identity(raw: &str) -> Result<String, ValidationError> {
    let identity = normalize_identity(raw);
    if identity.is_empty()
        || identity.len() > MAX_IDENTITY_LEN
        || !EMAIL_PATTERN.is_match(&identity)
    {
        return Err(ValidationError::InvalidIdentity);
    }
    Ok(identity)
}

fn validate_username(username: &str) -> Result<(), ValidationError> {
    let len = username.chars().count();
    if !(3..=MAX_USERNAME_LEN).contains(&len) {
        return Err(ValidationError::InvalidUsername);
    }
    if !username
        .chars()
        .all(|c| c.is_alphanumeric() || matches!(c, '_' | '.' | '-'))
    {
        return Err(ValidationError::InvalidUsername);
    }
    Ok(())
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
