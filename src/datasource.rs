//! # MongoDB datasource binding
//!
//! [`MongoDbDataSource`] ties a [`DataSourceConfig`] to a live connection and
//! closes that connection when the application stops. The connection itself is
//! owned by a [`ConnectionManager`]; [`MongoConnector`] is the one backed by the
//! `mongodb` driver.
//!
//! Nothing here retries or recovers: driver errors reach the caller untouched.

use std::collections::BTreeMap;
use std::sync::RwLock;
use std::time::Duration;

use mongodb::bson::doc;
use mongodb::options::ClientOptions;
use mongodb::Client;
use serde_json::Value;

use crate::config::{DataSourceConfig, DEFAULT_CONFIG};
use crate::errors::DataSourceError;
use crate::lifecycle::{LifeCycleObserver, DATASOURCE_GROUP};

/// Owns a connection opened from a [`DataSourceConfig`].
#[rocket::async_trait]
pub trait ConnectionManager: Send + Sync + Sized + 'static {
    /// Opens (or schedules opening) a connection using `config` as given.
    async fn connect(config: DataSourceConfig) -> Result<Self, DataSourceError>;

    /// The configuration this manager was created with.
    fn config(&self) -> &DataSourceConfig;

    fn is_connected(&self) -> bool;

    /// Releases the connection. Calling this on a closed manager does nothing.
    async fn disconnect(&self) -> Result<(), DataSourceError>;
}

/// [`ConnectionManager`] on top of the official MongoDB driver.
///
/// The driver connects lazily and monitors the deployment in the background, so
/// `connect` fails only on configuration problems (bad URL, unresolvable SRV
/// record, unsupported connector). Use [`MongoConnector::ping`] to reach the server.
pub struct MongoConnector {
    config: DataSourceConfig,
    database: String,
    client: RwLock<Option<Client>>,
}

impl MongoConnector {
    /// Handle to the driver client while connected.
    pub fn client(&self) -> Option<Client> {
        match self.client.read() {
            Ok(client) => client.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Name of the database operations run against.
    pub fn database_name(&self) -> &str {
        &self.database
    }

    pub async fn ping(&self) -> Result<(), DataSourceError> {
        let client = self
            .client()
            .ok_or_else(|| DataSourceError::NotConnected(self.display_name().to_string()))?;

        client
            .database(&self.database)
            .run_command(doc! { "ping": 1 })
            .await?;

        Ok(())
    }

    fn display_name(&self) -> &str {
        self.config.name.as_deref().unwrap_or("MongoDB")
    }
}

#[rocket::async_trait]
impl ConnectionManager for MongoConnector {
    async fn connect(config: DataSourceConfig) -> Result<Self, DataSourceError> {
        if let Some(connector) = config.connector.as_deref()
            && connector != "mongodb"
        {
            return Err(DataSourceError::UnsupportedConnector(connector.to_string()));
        }

        let url = config.url.clone().unwrap_or_else(|| config.compose_url());
        let mut options = ClientOptions::parse(&url).await?;

        let ignored = apply_connector_options(&mut options, &config.options);
        if !ignored.is_empty() {
            tracing::warn!(?ignored, "connector options not supported by the mongodb driver");
        }

        if options.app_name.is_none() {
            options.app_name = config.name.clone();
        }

        let database = config
            .database
            .clone()
            .or_else(|| options.default_database.clone())
            .unwrap_or_else(|| "test".to_string());

        let client = Client::with_options(options)?;

        tracing::info!(
            name = config.name.as_deref().unwrap_or("MongoDB"),
            database = %database,
            "datasource connected"
        );

        Ok(Self {
            config,
            database,
            client: RwLock::new(Some(client)),
        })
    }

    fn config(&self) -> &DataSourceConfig {
        &self.config
    }

    fn is_connected(&self) -> bool {
        self.client().is_some()
    }

    async fn disconnect(&self) -> Result<(), DataSourceError> {
        let client = match self.client.write() {
            Ok(mut client) => client.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };

        match client {
            Some(client) => {
                client.shutdown().await;
                tracing::info!(name = self.display_name(), "datasource disconnected");
            }
            None => tracing::debug!(name = self.display_name(), "datasource already disconnected"),
        }

        Ok(())
    }
}

/// Copies the extra configuration keys the driver understands onto `options`.
///
/// Keys match case-insensitively, as in a connection string. Returns the keys
/// that were left untouched.
pub fn apply_connector_options(
    options: &mut ClientOptions,
    extra: &BTreeMap<String, Value>,
) -> Vec<String> {
    let mut ignored = Vec::new();

    for (key, value) in extra {
        let applied = match (key.to_ascii_lowercase().as_str(), value) {
            ("authsource", Value::String(source)) => match options.credential.as_mut() {
                Some(credential) => {
                    credential.source = Some(source.clone());
                    true
                }
                None => false,
            },
            ("replicaset", Value::String(name)) => {
                options.repl_set_name = Some(name.clone());
                true
            }
            ("appname", Value::String(name)) => {
                options.app_name = Some(name.clone());
                true
            }
            ("directconnection", Value::Bool(direct)) => {
                options.direct_connection = Some(*direct);
                true
            }
            ("maxpoolsize", Value::Number(size)) => {
                options.max_pool_size = size.as_u64().and_then(|s| u32::try_from(s).ok());
                options.max_pool_size.is_some()
            }
            ("minpoolsize", Value::Number(size)) => {
                options.min_pool_size = size.as_u64().and_then(|s| u32::try_from(s).ok());
                options.min_pool_size.is_some()
            }
            ("serverselectiontimeoutms", Value::Number(ms)) => {
                options.server_selection_timeout = ms.as_u64().map(Duration::from_millis);
                options.server_selection_timeout.is_some()
            }
            ("connecttimeoutms", Value::Number(ms)) => {
                options.connect_timeout = ms.as_u64().map(Duration::from_millis);
                options.connect_timeout.is_some()
            }
            _ => false,
        };

        if !applied {
            ignored.push(key.clone());
        }
    }

    ignored
}

/// The `MongoDB` datasource.
///
/// Registered under [`MongoDbDataSource::DATA_SOURCE_NAME`] and observed by the
/// life cycle registry in the `datasource` group.
pub struct MongoDbDataSource<M = MongoConnector> {
    manager: M,
}

impl MongoDbDataSource {
    pub const DATA_SOURCE_NAME: &'static str = "MongoDB";

    pub fn default_config() -> &'static DataSourceConfig {
        &DEFAULT_CONFIG
    }

    pub async fn ping(&self) -> Result<(), DataSourceError> {
        self.manager.ping().await
    }

    pub fn database_name(&self) -> &str {
        self.manager.database_name()
    }
}

impl<M: ConnectionManager> MongoDbDataSource<M> {
    /// Connects with `config`, or with the built-in default when `None`.
    pub async fn new(config: Option<DataSourceConfig>) -> Result<Self, DataSourceError> {
        let config = config.unwrap_or_else(|| DEFAULT_CONFIG.clone());
        let manager = M::connect(config).await?;
        Ok(Self { manager })
    }

    pub fn config(&self) -> &DataSourceConfig {
        self.manager.config()
    }

    pub fn manager(&self) -> &M {
        &self.manager
    }

    pub fn is_connected(&self) -> bool {
        self.manager.is_connected()
    }
}

#[rocket::async_trait]
impl<M: ConnectionManager> LifeCycleObserver for MongoDbDataSource<M> {
    fn group(&self) -> &str {
        DATASOURCE_GROUP
    }

    async fn stop(&self) -> Result<(), DataSourceError> {
        self.manager.disconnect().await
    }
}
