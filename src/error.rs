//! Error types

use miette::Diagnostic;
use thiserror::Error;

/// Application errors for configuration, database, IRC, and plugin operations.
#[derive(Error, Debug, Diagnostic)]
pub enum Error {
    /// The configuration could not be loaded or extracted.
    #[error("Invalid configuration")]
    #[diagnostic(code(cogwheel::config))]
    Config(#[source] Box<figment::Error>),
    /// A plugin that requires configuration has no configuration block.
    #[error("Missing configuration for plugin `{plugin}`")]
    #[diagnostic(
        code(cogwheel::missing_config),
        help("add a non-empty [plugins.{plugin}] section to the config file")
    )]
    MissingConfig {
        /// The name of the plugin.
        plugin: String,
    },
    /// Failed to establish a connection to the database.
    #[error("Cannot connect to database")]
    OpenDatabase(#[source] sqlx::Error),
    /// Failed to acquire a database connection from the connection pool.
    #[error("Could not acquire a connection from the connection pool")]
    DatabasePool(#[source] sqlx::Error),
    /// Creating the table of a plugin model failed.
    #[error("Could not create table `{table}`")]
    CreateTable {
        /// The name of the table.
        table: &'static str,
        /// The underlying database error.
        #[source]
        source: sqlx::Error,
    },
    /// A database query operation failed.
    #[error("Database query failed")]
    DatabaseQueryFailed(#[from] sqlx::Error),
    /// The plugin has no storage backend to work with.
    #[error("No storage backend available")]
    NoStorage,
    /// Failed to create the IRC client.
    #[error("Could not create IRC client")]
    IrcClient(#[source] irc::error::Error),
    /// Failed to register with the IRC server.
    #[error("Could not send registration details for IRC")]
    IrcRegistration(#[source] irc::error::Error),
    /// General IRC communication error.
    #[error("IRC error")]
    Irc(#[from] irc::error::Error),
    /// The HTTP method is not supported by the HTTP client.
    #[error("Unable to use HTTP method: {0}")]
    UnsupportedMethod(String),
    /// A plugin declared a capability without implementing one of its hooks.
    #[error("The `{hook}` hook must be implemented by the plugin")]
    NotImplemented {
        /// The name of the hook.
        hook: &'static str,
    },
    /// A cron expression could not be parsed.
    #[error("Invalid cron expression `{expression}`")]
    InvalidSchedule {
        /// The expression as written in the configuration.
        expression: String,
        /// The underlying parse error.
        #[source]
        source: cron::error::Error,
    },
    /// Plugin system error.
    #[error("Plugin error: {0}")]
    Plugin(Box<dyn std::error::Error + Send + Sync>),
}

impl From<figment::Error> for Error {
    fn from(err: figment::Error) -> Self {
        Error::Config(Box::new(err))
    }
}

impl Error {
    /// Wraps a plugin-specific error.
    pub fn plugin<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Error::Plugin(Box::new(err))
    }
}
