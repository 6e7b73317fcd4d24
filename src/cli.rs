use clap::{Arg, ArgAction, Command};

use crate::config::{self, DEFAULT_CONFIG, DataSourceConfig};
use crate::datasource::{MongoConnector, MongoDbDataSource};
use crate::errors::DataSourceError;
use crate::lifecycle::LifeCycleObserver;

pub fn cli() -> Command {
    Command::new("crud-lb4")
        .subcommand(
            Command::new("show-config")
                .about("Print the datasource configuration this process would use")
                .arg(
                    Arg::new("reveal")
                        .long("reveal")
                        .help("Print the password instead of masking it")
                        .action(ArgAction::SetTrue),
                ),
        )
        .subcommand(
            Command::new("ping").about("Connect to the datasource, ping it and disconnect"),
        )
}

pub async fn handle_cli() -> Result<(), Box<dyn std::error::Error>> {
    let matches = cli().get_matches();
    let override_config = config::resolve_override(&rocket::Config::figment())?;

    match matches.subcommand() {
        Some(("show-config", sub_matches)) => {
            let reveal = sub_matches.get_flag("reveal");
            println!("{}", render_config(override_config, reveal)?);
        }
        Some(("ping", _)) => {
            let datasource = MongoDbDataSource::<MongoConnector>::new(override_config).await?;
            ping_then_stop(&datasource).await?;

            println!(
                "{} is reachable (database `{}`)",
                MongoDbDataSource::DATA_SOURCE_NAME,
                datasource.database_name()
            );
        }
        _ => {
            cli().print_help()?;
        }
    }

    Ok(())
}

/// Pings and then stops `datasource`. A ping failure wins over a stop failure.
async fn ping_then_stop(datasource: &MongoDbDataSource) -> Result<(), DataSourceError> {
    let pinged = datasource.ping().await;
    let stopped = datasource.stop().await;
    pinged?;
    stopped
}

fn render_config(
    override_config: Option<DataSourceConfig>,
    reveal: bool,
) -> Result<String, serde_json::Error> {
    let config = override_config.unwrap_or_else(|| DEFAULT_CONFIG.clone());

    if !config.is_consistent() {
        tracing::warn!("datasource url does not match host, port, credentials and database");
    }

    let config = if reveal { config } else { config.redacted() };
    serde_json::to_string_pretty(&config)
}
