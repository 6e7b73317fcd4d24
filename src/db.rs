//! # Datasource wiring
//!
//! Connects the MongoDB datasource while Rocket ignites and hands it to the
//! life cycle registry so it is stopped on shutdown.
//!
//! ## Usage
//!
//! Handlers receive the datasource through the [`Db`] state guard.
//!
//! ```rust,no_run
//! #[get("/")]
//! async fn handler(db: &State<Db>) -> &'static str {
//!     db.ping().await.ok();
//!     "Hello"
//! }
//! ```

use std::sync::Arc;

use rocket::fairing::{self, Fairing, Info, Kind};
use rocket::{Build, Rocket};

use crate::config;
use crate::datasource::{MongoConnector, MongoDbDataSource};
use crate::lifecycle::LifeCycleRegistry;

/// Shared handle to the MongoDB datasource kept in Rocket's managed state.
pub type Db = Arc<MongoDbDataSource>;

pub struct DataSourceFairing {
    registry: Arc<LifeCycleRegistry>,
}

impl DataSourceFairing {
    pub fn new(registry: Arc<LifeCycleRegistry>) -> Self {
        Self { registry }
    }
}

#[rocket::async_trait]
impl Fairing for DataSourceFairing {
    fn info(&self) -> Info {
        Info {
            name: "MongoDB Datasource",
            kind: Kind::Ignite,
        }
    }

    async fn on_ignite(&self, rocket: Rocket<Build>) -> fairing::Result {
        let override_config = match config::resolve_override(rocket.figment()) {
            Ok(config) => config,
            Err(e) => {
                tracing::error!(error = %e, key = config::OVERRIDE_KEY, "invalid datasource configuration");
                return Err(rocket);
            }
        };

        match MongoDbDataSource::<MongoConnector>::new(override_config).await {
            Ok(datasource) => {
                let datasource: Db = Arc::new(datasource);
                self.registry
                    .register(MongoDbDataSource::DATA_SOURCE_NAME, datasource.clone());
                Ok(rocket.manage(datasource))
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to connect datasource");
                Err(rocket)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::{DATASOURCE_GROUP, LifeCycleObserver};
    use rocket::local::asynchronous::Client;

    fn datasource_figment() -> rocket::figment::Figment {
        rocket::Config::figment()
            .merge(("datasources.config.MongoDB.connector", "mongodb"))
            .merge(("datasources.config.MongoDB.url", "mongodb://127.0.0.1:1/inventory"))
    }

    #[rocket::async_test]
    async fn ignite_registers_datasource_and_stop_disconnects_it() {
        let registry = Arc::new(LifeCycleRegistry::new());
        let rocket = crate::build(rocket::custom(datasource_figment()), registry.clone());
        let client = Client::tracked(rocket).await.unwrap();

        assert_eq!(registry.names(), vec![MongoDbDataSource::DATA_SOURCE_NAME]);

        let db = client.rocket().state::<Db>().unwrap();
        assert_eq!(db.group(), DATASOURCE_GROUP);
        assert!(db.is_connected());

        registry.stop().await.unwrap();
        assert!(!db.is_connected());
    }

    #[rocket::async_test]
    async fn invalid_override_aborts_ignite() {
        let registry = Arc::new(LifeCycleRegistry::new());

        let figment = datasource_figment().merge(("datasources.config.MongoDB.port", "x"));
        let rocket = crate::build(rocket::custom(figment), registry.clone());

        let result = Client::tracked(rocket).await;

        assert!(result.is_err());
        // Rocket's `Error` panics on drop unless inspected; mark it handled.
        let _ = result.err().map(|e| e.kind().to_string());
        assert!(registry.names().is_empty());
    }
}
