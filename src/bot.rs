//! The main process for communicating over IRC and driving plugins.
use std::sync::Arc;

use futures::stream::StreamExt;
use irc::client::prelude::Client;
use irc::proto::{Command, Message, Response};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::Error;
use crate::Registry;
use crate::config::Config;
use crate::consts;
use crate::context::{Context, Services};
use crate::report::ErrorReporter;
use crate::transport::Transport;

/// The bot, owning the plugin registry and the IRC connection.
pub struct Bot {
    /// The complete configuration loaded from file or environment
    config: Arc<Config>,
    /// The constructed plugins
    registry: Registry,
    /// Services shared with the plugins
    services: Services,
    /// Signals plugins waiting on [`crate::context::Ready`]
    ready_tx: watch::Sender<bool>,
}

impl Bot {
    /// Creates a new bot from already constructed plugins.
    ///
    /// `ready_tx` must be the sender half of the channel whose receiver was handed to `services`.
    #[must_use]
    pub fn new(services: Services, registry: Registry, ready_tx: watch::Sender<bool>) -> Self {
        Bot {
            config: services.config.clone(),
            registry,
            services,
            ready_tx,
        }
    }

    /// Connects, starts the plugins and processes messages until interrupted or disconnected.
    ///
    /// # Errors
    ///
    /// - [`Error::IrcClient`] - if the IRC client can't be created (e.g. due to configuration
    ///   issues.)
    /// - [`Error::IrcRegistration`] - if user registration fails.
    /// - [`Error::Irc`] - if a protocol or communication error occurred.
    pub async fn run(self) -> Result<(), Error> {
        let mut client = Client::from_config(self.config.irc.clone().into())
            .await
            .map_err(Error::IrcClient)?;

        client.identify().map_err(Error::IrcRegistration)?;

        let mut stream = client.stream()?;
        let sender: Arc<dyn Transport> = Arc::new(client.sender());

        self.services.connect_transport(sender.clone());

        let reporter = ErrorReporter::new(sender, self.config.bot.operator.clone());
        let handles = self.registry.start(&self.services.ready);

        info!(plugins = handles.len(), "started plugins");

        let shutdown = tokio::signal::ctrl_c();
        tokio::pin!(shutdown);

        let result = loop {
            tokio::select! {
                message = stream.next() => match message {
                    Some(Ok(message)) => self.handle_message(&client, &reporter, message).await,
                    Some(Err(err)) => break Err(Error::from(err)),
                    None => {
                        warn!("connection closed");

                        break Ok(());
                    }
                },
                _ = &mut shutdown => {
                    info!("interrupted, quitting");

                    if let Err(err) = client.send_quit("") {
                        debug!(%err, "could not send quit");
                    }

                    break Ok(());
                }
            }
        };

        for handle in handles {
            handle.shutdown(consts::PLUGIN_SHUTDOWN_TIMEOUT).await;
        }

        result
    }

    /// Processes a single IRC message by dispatching it to the registered plugins.
    async fn handle_message(&self, client: &Client, reporter: &ErrorReporter, message: Message) {
        debug!(?message, "processing irc message");

        if let Command::Response(Response::RPL_WELCOME, _) = message.command {
            info!("registered with server");
            self.ready_tx.send_replace(true);
        }

        let Some(ctx) = Context::from_message(
            &message,
            client.current_nickname(),
            Arc::new(client.sender()),
        ) else {
            return;
        };

        self.registry
            .dispatch(&ctx, &self.config.bot.prefix, reporter)
            .await;
    }
}
