//! # Application life cycle
//!
//! Components that hold external resources register here as observers and are
//! started when Rocket lifts off and stopped when it shuts down.

use std::sync::{Arc, RwLock};

use rocket::fairing::{Fairing, Info, Kind};
use rocket::{Orbit, Rocket};

use crate::errors::DataSourceError;

/// Group that datasources register under.
pub const DATASOURCE_GROUP: &str = "datasource";

/// Something that wants to hear about application start and stop.
#[rocket::async_trait]
pub trait LifeCycleObserver: Send + Sync {
    /// Group used to order this observer relative to others.
    fn group(&self) -> &str {
        ""
    }

    async fn start(&self) -> Result<(), DataSourceError> {
        Ok(())
    }

    async fn stop(&self) -> Result<(), DataSourceError>;
}

#[derive(Clone)]
struct Registration {
    name: String,
    group: String,
    observer: Arc<dyn LifeCycleObserver>,
}

/// Ordered collection of life cycle observers.
///
/// Groups not listed in `ordered_groups` run first, in the order they were first
/// registered, followed by the listed groups in listed order. `stop` walks the
/// same sequence backwards.
pub struct LifeCycleRegistry {
    ordered_groups: Vec<String>,
    observers: RwLock<Vec<Registration>>,
}

impl Default for LifeCycleRegistry {
    fn default() -> Self {
        Self::with_ordered_groups(vec!["server".to_string()])
    }
}

impl LifeCycleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ordered_groups(ordered_groups: Vec<String>) -> Self {
        Self {
            ordered_groups,
            observers: RwLock::new(Vec::new()),
        }
    }

    pub fn register(&self, name: &str, observer: Arc<dyn LifeCycleObserver>) {
        let registration = Registration {
            name: name.to_string(),
            group: observer.group().to_string(),
            observer,
        };

        tracing::debug!(name, group = %registration.group, "registered life cycle observer");

        match self.observers.write() {
            Ok(mut observers) => observers.push(registration),
            Err(poisoned) => poisoned.into_inner().push(registration),
        }
    }

    /// Observer names in start order.
    pub fn names(&self) -> Vec<String> {
        self.ordered().into_iter().map(|r| r.name).collect()
    }

    pub async fn start(&self) -> Result<(), DataSourceError> {
        for registration in self.ordered() {
            tracing::debug!(name = %registration.name, "starting observer");
            registration.observer.start().await?;
        }
        Ok(())
    }

    pub async fn stop(&self) -> Result<(), DataSourceError> {
        for registration in self.ordered().into_iter().rev() {
            tracing::debug!(name = %registration.name, "stopping observer");
            registration.observer.stop().await?;
        }
        Ok(())
    }

    fn ordered(&self) -> Vec<Registration> {
        let mut observers = match self.observers.read() {
            Ok(observers) => observers.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        };

        // `None` (unlisted) sorts before any listed position; the sort is stable.
        observers.sort_by_key(|r| self.ordered_groups.iter().position(|g| *g == r.group));
        observers
    }
}

/// Drives a [`LifeCycleRegistry`] from Rocket's liftoff and shutdown events.
pub struct LifeCycleFairing(pub Arc<LifeCycleRegistry>);

#[rocket::async_trait]
impl Fairing for LifeCycleFairing {
    fn info(&self) -> Info {
        Info {
            name: "Life Cycle Observers",
            kind: Kind::Liftoff | Kind::Shutdown,
        }
    }

    async fn on_liftoff(&self, _: &Rocket<Orbit>) {
        if let Err(e) = self.0.start().await {
            tracing::error!(error = %e, "failed to start life cycle observers");
        }
    }

    async fn on_shutdown(&self, _: &Rocket<Orbit>) {
        if let Err(e) = self.0.stop().await {
            tracing::error!(error = %e, "failed to stop life cycle observers");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct Recorder {
        name: &'static str,
        group: &'static str,
        log: Arc<Mutex<Vec<String>>>,
        fail_stop: bool,
    }

    #[rocket::async_trait]
    impl LifeCycleObserver for Recorder {
        fn group(&self) -> &str {
            self.group
        }

        async fn start(&self) -> Result<(), DataSourceError> {
            self.log.lock().unwrap().push(format!("start {}", self.name));
            Ok(())
        }

        async fn stop(&self) -> Result<(), DataSourceError> {
            self.log.lock().unwrap().push(format!("stop {}", self.name));
            if self.fail_stop {
                return Err(DataSourceError::NotConnected(self.name.to_string()));
            }
            Ok(())
        }
    }

    fn recorder(
        name: &'static str,
        group: &'static str,
        log: &Arc<Mutex<Vec<String>>>,
    ) -> Arc<Recorder> {
        Arc::new(Recorder {
            name,
            group,
            log: log.clone(),
            fail_stop: false,
        })
    }

    #[test]
    fn server_group_runs_after_unlisted_groups() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let registry = LifeCycleRegistry::new();

        registry.register("rest", recorder("rest", "server", &log));
        registry.register("MongoDB", recorder("MongoDB", DATASOURCE_GROUP, &log));
        registry.register("cron", recorder("cron", "", &log));

        assert_eq!(registry.names(), vec!["MongoDB", "cron", "rest"]);
    }

    #[rocket::async_test]
    async fn stop_runs_in_reverse_start_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let registry =
            LifeCycleRegistry::with_ordered_groups(vec![DATASOURCE_GROUP.into(), "server".into()]);

        registry.register("rest", recorder("rest", "server", &log));
        registry.register("MongoDB", recorder("MongoDB", DATASOURCE_GROUP, &log));

        registry.start().await.unwrap();
        registry.stop().await.unwrap();

        assert_eq!(
            *log.lock().unwrap(),
            vec!["start MongoDB", "start rest", "stop rest", "stop MongoDB"]
        );
    }

    #[rocket::async_test]
    async fn stop_error_is_returned_unchanged() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let registry = LifeCycleRegistry::new();

        registry.register("first", recorder("first", DATASOURCE_GROUP, &log));
        registry.register(
            "broken",
            Arc::new(Recorder {
                name: "broken",
                group: DATASOURCE_GROUP,
                log: log.clone(),
                fail_stop: true,
            }),
        );

        let err = registry.stop().await.unwrap_err();

        assert!(matches!(err, DataSourceError::NotConnected(ref name) if name == "broken"));
        assert_eq!(*log.lock().unwrap(), vec!["stop broken"]);
    }
}
