//! Plugins, their capabilities and the registry that drives them.
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use crate::Error;
use crate::command::Invocation;
use crate::config::PluginConfig;
use crate::context::{Context, Ready, Services};
use crate::database::{Model, Session, Storage};
use crate::report::{CommandError, CommandErrorHook, ErrorReporter};
use crate::schedule::{self, Scheduled};

/// Search google
#[cfg(feature = "plugin-google")]
pub mod google;
/// Remember funny things people said
#[cfg(feature = "plugin-grab")]
pub mod grab;
/// Lenny faces
#[cfg(feature = "plugin-lenny")]
pub mod lenny;
/// Channel moderation
#[cfg(feature = "plugin-protect")]
pub mod protect;
/// Bridge between channels and a message queue
#[cfg(feature = "plugin-relay")]
pub mod relay;

/// A newtype wrapper for plugin metadata strings.
macro_rules! metadata_type {
    ($name:ident, $doc:expr) => {
        #[doc = $doc]
        #[derive(Debug, Clone, Eq, PartialEq, Hash)]
        pub struct $name(String);

        impl $name {
            /// Returns the inner string value.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

metadata_type!(Name, "The name of a plugin, which is also the key of its configuration block.");
metadata_type!(Author, "The author of a plugin.");
metadata_type!(Version, "The version of a plugin.");

/// Common includes used in plugins.
#[allow(unused)]
mod prelude {
    pub use super::{Author, CommandHandler, MessageMatcher, Name, Plugin, Storable, Version};
    pub use crate::Error as CogwheelError;
    pub use crate::command::Invocation;
    pub use crate::config::PluginConfig;
    pub use crate::context::{Context, Services};
    pub use crate::report::CommandError;
    pub use async_trait::async_trait;
    pub use std::sync::Arc;
}

/// The base trait that all plugins must implement.
///
/// Plugins are built in two phases. [`Plugin::new`] receives the plugin's configuration block and
/// must not do any I/O. Once every plugin is registered, [`Registry::start`] runs the capability
/// setup and [`Plugin::preconfig`] for each plugin on its own task.
///
/// Capabilities are opted into by overriding the accessor that returns the plugin as that
/// capability, e.g. `fn matcher(self: Arc<Self>) -> Option<Arc<dyn MessageMatcher>> { Some(self) }`.
#[async_trait]
pub trait Plugin: Send + Sync + 'static {
    /// Returns the name of the plugin.
    fn name() -> Name
    where
        Self: Sized;

    /// Returns the author of the plugin.
    fn author() -> Author
    where
        Self: Sized;

    /// Returns the version of the plugin.
    fn version() -> Version
    where
        Self: Sized;

    /// Returns true if the plugin can't be built without a configuration block.
    fn requires_config() -> bool
    where
        Self: Sized,
    {
        true
    }

    /// The constructor for a new plugin.
    fn new(config: PluginConfig, services: &Services) -> Result<Self, Error>
    where
        Self: Sized;

    /// Prepares the plugin once it's started.
    async fn preconfig(&self) -> Result<(), Error> {
        Ok(())
    }

    /// Returns the plugin as a command handler.
    fn command_handler(self: Arc<Self>) -> Option<Arc<dyn CommandHandler>> {
        None
    }

    /// Returns the plugin as a message matcher.
    fn matcher(self: Arc<Self>) -> Option<Arc<dyn MessageMatcher>> {
        None
    }

    /// Returns the plugin as a storable plugin.
    fn storable(self: Arc<Self>) -> Option<Arc<dyn Storable>> {
        None
    }

    /// Returns the plugin as a scheduled plugin.
    fn scheduled(self: Arc<Self>) -> Option<Arc<dyn Scheduled>> {
        None
    }
}

/// Capability for plugins that provide prefixed commands.
#[async_trait]
pub trait CommandHandler: Send + Sync {
    /// The command names handled by the plugin, without the prefix.
    fn commands(&self) -> &[&'static str];

    /// Runs a command.
    async fn handle_command(
        &self,
        ctx: &Context,
        invocation: Invocation<'_>,
    ) -> Result<(), CommandError>;

    /// Returns a hook that replaces the default handling of this plugin's command errors.
    fn command_error_hook(&self) -> Option<&dyn CommandErrorHook> {
        None
    }
}

/// Capability for plugins that look at every message.
#[async_trait]
pub trait MessageMatcher: Send + Sync {
    /// Returns true if the plugin should respond to `content`.
    async fn matches(&self, _ctx: &Context, _content: &str) -> Result<bool, Error> {
        Err(Error::NotImplemented { hook: "matches" })
    }

    /// Responds to a matched message.
    async fn respond(&self, _ctx: &Context, _content: &str) -> Result<(), Error> {
        Err(Error::NotImplemented { hook: "respond" })
    }
}

/// Capability for plugins that keep a table in the database.
#[async_trait]
pub trait Storable: Send + Sync {
    /// The plugin's table.
    fn model(&self) -> Model;

    /// The storage backend holding the table.
    fn storage(&self) -> &dyn Storage;

    /// Returns a new session. Every call gets its own session.
    async fn session(&self) -> Result<Session, Error> {
        self.storage().session().await
    }
}

/// A registered plugin and its capabilities.
struct Entry {
    name: Name,
    plugin: Arc<dyn Plugin>,
    commands: Option<Arc<dyn CommandHandler>>,
    matcher: Option<Arc<dyn MessageMatcher>>,
    storable: Option<Arc<dyn Storable>>,
    scheduled: Option<Arc<dyn Scheduled>>,
}

/// Plugin registry.
#[derive(Default)]
pub struct Registry {
    entries: Vec<Entry>,
}

impl Registry {
    /// Constructs and returns a new, empty plugin registry.
    #[must_use]
    pub fn new() -> Registry {
        Registry { entries: vec![] }
    }

    /// Constructs and returns a new plugin registry with every enabled plugin.
    ///
    /// # Errors
    ///
    /// Returns the first construction error, e.g. [`Error::MissingConfig`].
    pub fn preloaded(services: &Services) -> Result<Registry, Error> {
        let mut registry = Self::new();
        debug!("registering plugins");

        #[cfg(feature = "plugin-google")]
        registry.register::<google::Google>(services)?;
        #[cfg(feature = "plugin-grab")]
        if services.db.is_some() {
            registry.register::<grab::Grab>(services)?;
        } else {
            debug!("no database configured, skipping grab plugin");
        }
        #[cfg(feature = "plugin-lenny")]
        registry.register::<lenny::Lenny>(services)?;
        #[cfg(feature = "plugin-protect")]
        registry.register::<protect::Protect>(services)?;
        #[cfg(feature = "plugin-relay")]
        registry.register::<relay::Relay>(services)?;

        let num_plugins = registry.len();
        debug!(%num_plugins, "finished registering plugins");

        Ok(registry)
    }

    /// Constructs and registers a plugin based on its type.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MissingConfig`] if the plugin requires configuration and has none, or
    /// whatever error the plugin's constructor returns.
    pub fn register<P: Plugin>(&mut self, services: &Services) -> Result<(), Error> {
        let name = P::name();
        let config = if P::requires_config() {
            PluginConfig::resolve(&services.config, name.as_str())?
        } else {
            PluginConfig::resolve_or_empty(&services.config, name.as_str())
        };

        let plugin = P::new(config, services)?;

        debug!(%name, author = %P::author(), version = %P::version(), "registered plugin");
        self.add(name, Arc::new(plugin));

        Ok(())
    }

    /// Registers an already constructed plugin.
    pub fn add<P: Plugin>(&mut self, name: Name, plugin: Arc<P>) {
        self.entries.push(Entry {
            name,
            commands: plugin.clone().command_handler(),
            matcher: plugin.clone().matcher(),
            storable: plugin.clone().storable(),
            scheduled: plugin.clone().scheduled(),
            plugin,
        });
    }

    /// Returns the number of registered plugins.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if no plugins are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns the names of the registered plugins, in registration order.
    pub fn names(&self) -> impl Iterator<Item = &Name> {
        self.entries.iter().map(|entry| &entry.name)
    }

    /// Starts every plugin on its own task.
    ///
    /// Each task creates the plugin's table if it's storable, runs its preconfig hook and then, if
    /// it's scheduled, its loop. A plugin whose table can't be created isn't started.
    #[must_use]
    pub fn start(&self, ready: &Ready) -> Vec<PluginHandle> {
        self.entries
            .iter()
            .map(|entry| {
                let task = tokio::spawn(run_plugin(
                    entry.name.clone(),
                    entry.plugin.clone(),
                    entry.storable.clone(),
                    entry.scheduled.clone(),
                    ready.clone(),
                ));

                PluginHandle {
                    name: entry.name.clone(),
                    scheduled: entry.scheduled.clone(),
                    task,
                }
            })
            .collect()
    }

    /// Dispatches a message to every matcher and, if it's a command, to the plugin handling it.
    ///
    /// Errors are never propagated: matcher errors are logged, command errors go to `reporter`.
    pub async fn dispatch(&self, ctx: &Context, prefix: &str, reporter: &ErrorReporter) {
        if ctx.is_own_message() {
            return;
        }

        for entry in &self.entries {
            if let Some(ref matcher) = entry.matcher {
                match_message(&entry.name, matcher.as_ref(), ctx).await;
            }
        }

        let Some(invocation) = Invocation::parse(prefix, &ctx.content) else {
            return;
        };

        let Some((entry, handler)) = self.entries.iter().find_map(|entry| {
            entry
                .commands
                .as_ref()
                .filter(|handler| handler.commands().iter().any(|c| *c == invocation.name))
                .map(|handler| (entry, handler))
        }) else {
            let error = CommandError::CommandNotFound {
                name: invocation.name.to_string(),
            };

            return reporter.handle_command_error(ctx, "", invocation.name, &error, None);
        };

        debug!(plugin = %entry.name, command = %invocation.name, "running command");

        if let Err(error) = handler.handle_command(ctx, invocation).await {
            reporter.handle_command_error(
                ctx,
                entry.name.as_str(),
                invocation.name,
                &error,
                handler.command_error_hook(),
            );
        }
    }
}

async fn match_message(name: &Name, matcher: &dyn MessageMatcher, ctx: &Context) {
    match matcher.matches(ctx, &ctx.content).await {
        Ok(true) => {
            if let Err(err) = matcher.respond(ctx, &ctx.content).await {
                error!(plugin = %name, %err, "match response failed");
            }
        }
        Ok(false) => {}
        Err(err) => error!(plugin = %name, %err, "match check failed"),
    }
}

async fn run_plugin(
    name: Name,
    plugin: Arc<dyn Plugin>,
    storable: Option<Arc<dyn Storable>>,
    scheduled: Option<Arc<dyn Scheduled>>,
    ready: Ready,
) {
    if let Some(storable) = storable {
        let model = storable.model();

        if let Err(err) = storable.storage().create_table(&model).await {
            error!(
                plugin = %name,
                table = model.table,
                %err,
                "could not create table, not starting plugin"
            );

            return;
        }
    }

    if let Err(err) = plugin.preconfig().await {
        error!(plugin = %name, %err, "preconfig failed");
    }

    if let Some(scheduled) = scheduled {
        schedule::run(name.as_str(), scheduled.as_ref(), ready).await;
    }
}

/// A started plugin.
pub struct PluginHandle {
    name: Name,
    scheduled: Option<Arc<dyn Scheduled>>,
    task: JoinHandle<()>,
}

impl fmt::Debug for PluginHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginHandle")
            .field("name", &self.name)
            .field("scheduled", &self.scheduled.is_some())
            .finish_non_exhaustive()
    }
}

impl PluginHandle {
    /// Returns the name of the plugin.
    #[must_use]
    pub const fn name(&self) -> &Name {
        &self.name
    }

    /// Asks the plugin's loop, if any, to exit after its current wait.
    pub fn stop(&self) {
        if let Some(ref scheduled) = self.scheduled {
            scheduled.state().stop();
        }
    }

    /// Stops the plugin and waits up to `timeout` for its task to finish, aborting it otherwise.
    pub async fn shutdown(mut self, timeout: Duration) {
        self.stop();

        match tokio::time::timeout(timeout, &mut self.task).await {
            Ok(Ok(())) => debug!(plugin = %self.name, "plugin stopped"),
            Ok(Err(err)) => warn!(plugin = %self.name, %err, "plugin task failed"),
            Err(_) => {
                warn!(plugin = %self.name, "plugin did not stop in time, aborting");
                self.task.abort();
            }
        }
    }
}
