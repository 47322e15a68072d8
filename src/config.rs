use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::time::Duration;

use figment::Figment;
use figment::providers::{Env, Format, Toml};
use figment::value::{Dict, Tag, Value};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::Error;

/// The environment variable prefix used to override configuration values.
pub const ENV_PREFIX: &str = "COGWHEEL_";

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct Config {
    /// Database configuration
    pub database: Option<DbConfig>,
    /// Tracing configuration
    #[serde(default)]
    pub tracing: TracingConfig,
    /// IRC client configuration
    pub irc: IrcConfig,
    /// Bot behaviour configuration
    #[serde(default)]
    pub bot: BotConfig,
    /// Named configuration blocks for plugins
    #[serde(default)]
    pub plugins: BTreeMap<String, Value>,
}

impl Config {
    /// Loads the configuration from the TOML file at `path`, with overrides from `COGWHEEL_`
    /// prefixed environment variables.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the merged configuration cannot be extracted.
    pub fn load(path: impl AsRef<Path>) -> Result<Config, Error> {
        let path = path.as_ref();

        trace!(?path, "loading config file");

        let config = Self::figment(path).extract()?;

        trace!(?path, "loaded config file");

        Ok(config)
    }

    /// Returns the layered configuration providers.
    #[must_use]
    pub fn figment(path: &Path) -> Figment {
        Figment::new()
            .merge(Toml::file(path))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
    }
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct DbConfig {
    /// Connection URL
    pub url: String,
    /// Maximum number of connections to keep in the connection pool
    #[serde(default = "default_max_db_connections")]
    pub max_connections: u32,
    /// Maximum idle duration for individual connections, in seconds
    #[serde(default = "default_db_idle_timeout", with = "humantime_serde")]
    pub idle_timeout: Duration,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct TracingConfig {
    /// Enable tracing
    pub enabled: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct BotConfig {
    /// The prefix that marks a message as a command.
    #[serde(default = "default_command_prefix")]
    pub prefix: String,
    /// The nickname that receives error reports.
    pub operator: Option<String>,
}

impl Default for BotConfig {
    fn default() -> Self {
        BotConfig {
            prefix: default_command_prefix(),
            operator: None,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
pub struct IrcChannelConfig {
    /// The shared key to access the channel.
    pub key: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
pub struct IrcTlsConfig {
    /// Enable TLS.
    pub enabled: bool,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
pub struct IrcConfig {
    /// The client's nickname.
    pub nickname: String,
    /// Alternative nicknames for the client, if the default is taken.
    #[serde(default)]
    pub alt_nicks: Vec<String>,
    /// The client's username.
    pub username: Option<String>,
    /// The client's real name.
    pub realname: Option<String>,
    /// The hostname of the server to connect to.
    pub hostname: String,
    /// The password to connect to the server.
    pub password: Option<String>,
    /// The port number of the server to connect to.
    pub port: Option<u16>,
    /// TLS configuration.
    pub tls: Option<IrcTlsConfig>,
    /// List of channels to automatically manage.
    #[serde(default)]
    pub channels: HashMap<String, Option<IrcChannelConfig>>,
}

impl IrcConfig {
    #[must_use]
    pub fn port(&self) -> u16 {
        match self.port {
            Some(port) => port,
            None => self.fallback_port(),
        }
    }

    /// Return the port number to use based on whether the connection requires TLS or not.
    fn fallback_port(&self) -> u16 {
        if self.tls.as_ref().map(|tls| tls.enabled) == Some(true) {
            6697
        } else {
            6667
        }
    }
}

impl From<IrcConfig> for irc::client::data::Config {
    fn from(config: IrcConfig) -> Self {
        let port = config.port();
        let use_tls = config.tls.map(|x| x.enabled);
        let channel_keys = config
            .channels
            .iter()
            .filter_map(|(name, channel)| {
                let key = channel.as_ref()?.key.clone()?;
                Some((name.clone(), key))
            })
            .collect();
        let channels = config.channels.into_keys().collect();

        irc::client::data::Config {
            nickname: Some(config.nickname),
            username: config.username,
            realname: config.realname,
            password: config.password,
            server: Some(config.hostname),
            port: Some(port),
            use_tls,
            channels,
            channel_keys,
            alt_nicks: config.alt_nicks,
            ..Default::default()
        }
    }
}

/// The configuration block of a single plugin, addressed by the plugin's name.
#[derive(Clone, Debug)]
pub struct PluginConfig {
    /// The name of the plugin the block belongs to.
    name: String,
    /// The raw configuration values.
    value: Value,
}

impl PluginConfig {
    /// Looks up the configuration block named `name`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MissingConfig`] if there's no block for the plugin, or if the block is
    /// empty.
    pub fn resolve(config: &Config, name: &str) -> Result<PluginConfig, Error> {
        match config.plugins.get(name) {
            Some(value) if !is_empty(value) => Ok(PluginConfig {
                name: name.to_string(),
                value: value.clone(),
            }),
            _ => Err(Error::MissingConfig {
                plugin: name.to_string(),
            }),
        }
    }

    /// Returns the configuration block named `name`, or an empty block if there is none.
    #[must_use]
    pub fn resolve_or_empty(config: &Config, name: &str) -> PluginConfig {
        Self::resolve(config, name).unwrap_or_else(|_| PluginConfig::empty(name))
    }

    /// Returns an empty configuration block for the plugin named `name`.
    #[must_use]
    pub fn empty(name: &str) -> PluginConfig {
        PluginConfig {
            name: name.to_string(),
            value: Value::Dict(Tag::Default, Dict::new()),
        }
    }

    /// Returns the name of the plugin this block belongs to.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Deserializes the whole block into `T`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the block doesn't match `T`.
    pub fn extract<T: DeserializeOwned>(&self) -> Result<T, Error> {
        Ok(self.value.deserialize()?)
    }

    /// Deserializes the value at the dotted `path` (e.g. `mq.host`) into `T`.
    ///
    /// Returns `Ok(None)` when nothing is set at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the value doesn't match `T`.
    pub fn get<T: DeserializeOwned>(&self, path: &str) -> Result<Option<T>, Error> {
        match self.value.find_ref(path) {
            Some(value) => Ok(Some(value.deserialize()?)),
            None => Ok(None),
        }
    }
}

fn is_empty(value: &Value) -> bool {
    match value {
        Value::Dict(_, dict) => dict.is_empty(),
        Value::Empty(..) => true,
        _ => false,
    }
}

#[must_use]
pub fn default_command_prefix() -> String {
    crate::consts::DEFAULT_COMMAND_PREFIX.to_string()
}

#[must_use]
pub const fn default_max_db_connections() -> u32 {
    crate::consts::DEFAULT_MAX_DB_CONNECTIONS
}

#[must_use]
pub const fn default_db_idle_timeout() -> Duration {
    crate::consts::DEFAULT_DB_IDLE_TIMEOUT
}
