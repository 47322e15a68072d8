use std::sync::Arc;

use argh::FromArgs;
use miette::WrapErr;
use tracing::{info, warn};

use cogwheel::context::{Ready, Services};
use cogwheel::{Bot, Config, Registry, database, http};

mod telemetry;

/// A plugin-driven IRC bot.
#[derive(Debug, FromArgs)]
struct Opts {
    /// path to config file
    #[argh(option, default = "String::from(\"config.toml\")")]
    config_path: String,
}

#[tokio::main]
async fn main() -> miette::Result<()> {
    let opts: Opts = argh::from_env();

    let config = Config::load(&opts.config_path)
        .wrap_err_with(|| format!("could not load config from {}", opts.config_path))?;

    telemetry::try_init(&config.tracing)?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        "{} starting",
        env!("CARGO_PKG_NAME")
    );

    let db = match config.database {
        Some(ref db_config) => Some(
            database::connect(db_config)
                .await
                .wrap_err("could not connect to database")?,
        ),
        None => {
            warn!("no database configured, storage is unavailable");

            None
        }
    };

    let (ready_tx, ready) = Ready::channel();
    let services = Services::new(Arc::new(config), db, http::build_client(), ready);
    let registry = Registry::preloaded(&services).wrap_err("could not construct plugins")?;

    info!(plugins = ?registry.names().collect::<Vec<_>>(), "constructed plugins");

    Bot::new(services, registry, ready_tx)
        .run()
        .await
        .wrap_err("bot stopped")
}
