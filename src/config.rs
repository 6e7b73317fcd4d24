//! # Datasource configuration
//!
//! The connection record for the MongoDB datasource and the logic that picks the
//! configuration a process should run with.
//!
//! ## Resolution order
//!
//! 1. `datasources.config.MongoDB` in the Rocket figment (`Rocket.toml` or `ROCKET_*`)
//! 2. `MONGODB_URL` or `DATABASE_URL`
//! 3. `MONGODB_USER` / `MONGODB_PASSWORD` layered onto [`DEFAULT_CONFIG`]
//! 4. nothing, in which case the datasource falls back to [`DEFAULT_CONFIG`]

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::sync::LazyLock;

use rocket::figment::Figment;
use serde::{Deserialize, Serialize};

use crate::errors::DataSourceError;

/// Figment path holding an override for the MongoDB datasource.
pub const OVERRIDE_KEY: &str = "datasources.config.MongoDB";

/// Connection record handed to the connector.
///
/// Every key is optional so an override can carry only what it needs
/// (for instance just `connector` and `url`). Keys outside the fixed set are
/// kept in `options` and handed to the connector with the rest.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(crate = "rocket::serde", default, rename_all = "camelCase")]
pub struct DataSourceConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connector: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub database: Option<String>,
    /// Accepted for compatibility with existing configuration files. The Rust
    /// driver always uses its own connection string parser.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub use_new_url_parser: Option<bool>,
    /// Connector specific settings such as `authSource` or `replicaSet`.
    #[serde(flatten, skip_serializing_if = "BTreeMap::is_empty")]
    pub options: BTreeMap<String, serde_json::Value>,
}

/// Built-in configuration used when nothing overrides it.
///
/// Carries no credentials; see [`DataSourceConfig::with_credentials`].
pub static DEFAULT_CONFIG: LazyLock<DataSourceConfig> = LazyLock::new(|| DataSourceConfig {
    name: Some("MongoDB".to_string()),
    connector: Some("mongodb".to_string()),
    url: Some("mongodb://localhost:27017/crud-lb4".to_string()),
    host: Some("localhost".to_string()),
    port: Some(27017),
    user: None,
    password: None,
    database: Some("crud-lb4".to_string()),
    use_new_url_parser: Some(true),
    options: BTreeMap::new(),
});

impl DataSourceConfig {
    /// Builds a `mongodb://` connection string from the discrete fields.
    pub fn compose_url(&self) -> String {
        let mut url = String::from("mongodb://");

        if let Some(user) = &self.user {
            url.push_str(&urlencoding::encode(user));
            if let Some(password) = &self.password {
                url.push(':');
                url.push_str(&urlencoding::encode(password));
            }
            url.push('@');
        }

        url.push_str(self.host.as_deref().unwrap_or("localhost"));
        if let Some(port) = self.port {
            let _ = write!(url, ":{port}");
        }

        url.push('/');
        if let Some(database) = &self.database {
            url.push_str(database);
        }

        url
    }

    /// Whether `url` agrees with the discrete endpoint fields.
    ///
    /// Records that only carry one of the two forms are trivially consistent.
    /// Query options and a trailing `/` on the URL are ignored.
    pub fn is_consistent(&self) -> bool {
        let Some(url) = &self.url else {
            return true;
        };

        let has_discrete = self.host.is_some()
            || self.port.is_some()
            || self.user.is_some()
            || self.password.is_some()
            || self.database.is_some();

        if !has_discrete {
            return true;
        }

        let base = url.split('?').next().unwrap_or(url);
        base.trim_end_matches('/') == self.compose_url().trim_end_matches('/')
    }

    /// Returns a copy with the given credentials and a recomposed `url`.
    pub fn with_credentials(&self, user: String, password: Option<String>) -> Self {
        let mut config = self.clone();
        config.user = Some(user);
        config.password = password;
        config.url = Some(config.compose_url());
        config
    }

    /// Copy that is safe to print: the password is masked in both places it lives.
    pub fn redacted(&self) -> Self {
        let mut config = self.clone();
        if config.password.is_some() {
            config.password = Some("********".to_string());
        }
        config.url = config.url.as_deref().map(redact_url);
        config
    }
}

/// Resolves the override for the MongoDB datasource from `figment` and the process
/// environment. `Ok(None)` means the built-in default should be used.
pub fn resolve_override(figment: &Figment) -> Result<Option<DataSourceConfig>, DataSourceError> {
    resolve_override_with(figment, |key| std::env::var(key).ok())
}

pub fn resolve_override_with<F>(
    figment: &Figment,
    env: F,
) -> Result<Option<DataSourceConfig>, DataSourceError>
where
    F: Fn(&str) -> Option<String>,
{
    if figment.contains(OVERRIDE_KEY) {
        let config = figment.extract_inner::<DataSourceConfig>(OVERRIDE_KEY)?;
        return Ok(Some(config));
    }

    if let Some(url) = env("MONGODB_URL").or_else(|| env("DATABASE_URL")) {
        return Ok(Some(DataSourceConfig {
            name: DEFAULT_CONFIG.name.clone(),
            connector: DEFAULT_CONFIG.connector.clone(),
            url: Some(url),
            ..Default::default()
        }));
    }

    if let Some(user) = env("MONGODB_USER") {
        return Ok(Some(
            DEFAULT_CONFIG.with_credentials(user, env("MONGODB_PASSWORD")),
        ));
    }

    Ok(None)
}

fn redact_url(url: &str) -> String {
    let Some((scheme, rest)) = url.split_once("://") else {
        return url.to_string();
    };

    let authority_end = rest.find('/').unwrap_or(rest.len());
    let Some(at) = rest[..authority_end].rfind('@') else {
        return url.to_string();
    };

    match rest[..at].split_once(':') {
        Some((user, _)) => format!("{scheme}://{user}:********{}", &rest[at..]),
        None => url.to_string(),
    }
}
