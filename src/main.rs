//! # crud-lb4 - REST service backed by a MongoDB datasource
//!
//! ## Environment Variables
//!
//! - `MONGODB_URL` or `DATABASE_URL`: full MongoDB connection string (optional)
//! - `MONGODB_USER` / `MONGODB_PASSWORD`: credentials layered onto the built-in config (optional)
//! - `RUST_LOG`: log filter, defaults to `info`
//!
//! `datasources.config.MongoDB` in `Rocket.toml` takes precedence over all of the above.

use std::sync::Arc;

use rocket::{Build, Rocket, catchers, http::Method, routes};
use rocket_cors::{AllowedOrigins, CorsOptions};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use crate::{
    db::DataSourceFairing,
    lifecycle::{LifeCycleFairing, LifeCycleRegistry},
};

pub mod cli;
pub mod config;
pub mod datasource;
pub mod db;
pub mod errors;
pub mod handlers;
pub mod lifecycle;

#[rocket::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    if std::env::args().len() > 1 {
        return cli::handle_cli().await;
    }

    let registry = Arc::new(LifeCycleRegistry::new());
    build(rocket::build(), registry).launch().await?;

    Ok(())
}

/// Attaches the datasource, life cycle hooks, CORS and routes to `rocket`.
///
/// The datasource fairing registers with `registry`; the life cycle fairing stops
/// everything in it when Rocket shuts down.
pub fn build(rocket: Rocket<Build>, registry: Arc<LifeCycleRegistry>) -> Rocket<Build> {
    let cors = CorsOptions::default()
        .allowed_origins(AllowedOrigins::all())
        .allowed_methods(
            vec![Method::Get, Method::Options]
                .into_iter()
                .map(From::from)
                .collect(),
        )
        .allow_credentials(true);

    let rocket = rocket
        .attach(DataSourceFairing::new(registry.clone()))
        .attach(LifeCycleFairing(registry))
        .register("/", catchers![handlers::catch404, handlers::catch500])
        .mount("/", routes![handlers::index])
        .mount("/misc", handlers::misc::routes());

    match cors.to_cors() {
        Ok(cors) => rocket.attach(cors),
        Err(e) => {
            tracing::warn!(error = %e, "CORS disabled, invalid options");
            rocket
        }
    }
}
