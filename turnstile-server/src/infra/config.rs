use std::{env, fmt, str::FromStr, time::Duration};

use rand::{Rng, distr::Alphanumeric};
use thiserror::Error;
use turnstile_core::{
    TableName, UniquenessPolicy, ValidationRules,
    repository::postgres::InvalidTableName, uniqueness::UnknownPolicy,
};
use url::Url;
use zeroize::Zeroizing;

const DEFAULT_HOST: &str = "localhost";
const DEFAULT_PORT: u16 = 51000;
const DEFAULT_DB_TIMEOUT_SECS: u64 = 10;
const GENERATED_SECRET_LEN: usize = 64;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{key} must be a valid {expected}, got {value:?}")]
    InvalidValue {
        key: &'static str,
        expected: &'static str,
        value: String,
    },
    #[error("DB_URL is not a valid database URL: {source}")]
    InvalidDatabaseUrl {
        #[source]
        source: url::ParseError,
    },
    #[error("DB_USER cannot be applied to the database URL")]
    InvalidDatabaseUser,
    #[error("DB_PASS cannot be applied to the database URL")]
    InvalidDatabasePassword,
    #[error("USER_COLLECTION: {0}")]
    InvalidCollection(#[from] InvalidTableName),
    #[error("UNIQUENESS_POLICY: {0}")]
    InvalidPolicy(#[from] UnknownPolicy),
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Json,
    Pretty,
}

impl FromStr for LogFormat {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(LogFormat::Json),
            "pretty" | "text" => Ok(LogFormat::Pretty),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(Clone)]
pub struct DatabaseConfig {
    /// Full connection URL with credentials spliced in.
    pub url: Zeroizing<String>,
    pub collection: TableName,
    pub timeout: Duration,
}

impl fmt::Debug for DatabaseConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatabaseConfig")
            .field("url", &redact_url(&self.url))
            .field("collection", &self.collection)
            .field("timeout", &self.timeout)
            .finish()
    }
}

#[derive(Clone)]
pub struct AuthConfig {
    pub token_secret: Zeroizing<String>,
    /// True when no secret was configured and one was generated at startup.
    pub token_secret_generated: bool,
    pub password_pepper: Option<Zeroizing<String>>,
    pub uniqueness: UniquenessPolicy,
    pub validation: ValidationRules,
}

impl fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthConfig")
            .field("token_secret", &"<redacted>")
            .field("token_secret_generated", &self.token_secret_generated)
            .field("password_pepper", &self.password_pepper.is_some())
            .field("uniqueness", &self.uniqueness)
            .field("validation", &self.validation)
            .finish()
    }
}

/// Server configuration loaded from the environment (and `.env`).
#[derive(Debug, Clone)]
pub struct Config {
    pub server: ServerConfig,
    /// `None` runs the service on the in-memory account store.
    pub database: Option<DatabaseConfig>,
    pub auth: AuthConfig,
    pub log_format: LogFormat,
    pub env_file_loaded: bool,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present
        let env_file_loaded = dotenvy::dotenv().is_ok();

        let mut config = Self::from_lookup(|key| env::var(key).ok())?;
        config.env_file_loaded = env_file_loaded;
        Ok(config)
    }

    /// Build the configuration from an arbitrary key lookup. Blank values
    /// count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let server = ServerConfig {
            host: get("USERS_HOST").unwrap_or_else(|| DEFAULT_HOST.to_string()),
            port: parse_or("USERS_SRV_PORT", get("USERS_SRV_PORT"), DEFAULT_PORT, "port number")?,
        };

        let timeout = Duration::from_secs(parse_or(
            "DB_TIMEOUT_SECS",
            get("DB_TIMEOUT_SECS"),
            DEFAULT_DB_TIMEOUT_SECS,
            "number of seconds",
        )?);

        let collection = match get("USER_COLLECTION") {
            Some(name) => TableName::new(name.trim())?,
            None => TableName::default(),
        };

        let database = match get("DB_URL") {
            Some(raw) => Some(DatabaseConfig {
                url: Zeroizing::new(resolve_database_url(
                    &raw,
                    get("DB_USER").as_deref(),
                    get("DB_PASS").as_deref(),
                    get("DB_NAME").as_deref(),
                )?),
                collection,
                timeout,
            }),
            None => None,
        };

        let (token_secret, token_secret_generated) = match get("JWT_TOKEN_SECRET") {
            Some(secret) => (Zeroizing::new(secret), false),
            None => (generate_secret(), true),
        };

        let uniqueness = match get("UNIQUENESS_POLICY") {
            Some(policy) => policy.parse::<UniquenessPolicy>()?,
            None => UniquenessPolicy::default(),
        };

        let validation = ValidationRules {
            require_organization: parse_or(
                "REQUIRE_ORGANIZATION",
                get("REQUIRE_ORGANIZATION"),
                true,
                "boolean (true or false)",
            )?,
        };

        let log_format = match get("LOG_FORMAT") {
            Some(value) => value.parse::<LogFormat>().map_err(|()| ConfigError::InvalidValue {
                key: "LOG_FORMAT",
                expected: "log format (json or pretty)",
                value,
            })?,
            None => LogFormat::default(),
        };

        Ok(Self {
            server,
            database,
            auth: AuthConfig {
                token_secret,
                token_secret_generated,
                password_pepper: get("PASSWORD_PEPPER").map(Zeroizing::new),
                uniqueness,
                validation,
            },
            log_format,
            env_file_loaded: false,
        })
    }
}

fn parse_or<T: FromStr>(
    key: &'static str,
    value: Option<String>,
    default: T,
    expected: &'static str,
) -> Result<T, ConfigError> {
    match value {
        Some(raw) => raw.trim().parse().map_err(|_| ConfigError::InvalidValue {
            key,
            expected,
            value: raw,
        }),
        None => Ok(default),
    }
}

/// Normalize `DB_URL` into a full PostgreSQL URL. A missing scheme gets
/// `postgres://`. `DB_USER`, `DB_PASS` and `DB_NAME` fill in the parts the
/// URL leaves out and never override parts it already carries.
pub fn resolve_database_url(
    raw: &str,
    user: Option<&str>,
    password: Option<&str>,
    database: Option<&str>,
) -> Result<String, ConfigError> {
    let raw = raw.trim();
    let with_scheme = if raw.contains("://") {
        raw.to_string()
    } else {
        format!("postgres://{raw}")
    };

    let mut url = Url::parse(&with_scheme)
        .map_err(|source| ConfigError::InvalidDatabaseUrl { source })?;

    if url.username().is_empty()
        && let Some(user) = user
    {
        url.set_username(user)
            .map_err(|_| ConfigError::InvalidDatabaseUser)?;
    }
    if url.password().is_none()
        && let Some(password) = password
    {
        url.set_password(Some(password))
            .map_err(|_| ConfigError::InvalidDatabasePassword)?;
    }
    if matches!(url.path(), "" | "/")
        && let Some(database) = database
    {
        url.set_path(&format!("/{database}"));
    }

    Ok(url.to_string())
}

fn redact_url(raw: &str) -> String {
    match Url::parse(raw) {
        Ok(mut url) => {
            if url.password().is_some() {
                let _ = url.set_password(Some("***"));
            }
            url.to_string()
        }
        Err(_) => "<unparseable>".to_string(),
    }
}

fn generate_secret() -> Zeroizing<String> {
    Zeroizing::new(
        rand::rng()
            .sample_iter(&Alphanumeric)
            .take(GENERATED_SECRET_LEN)
            .map(char::from)
            .collect(),
    )
}
