use std::sync::{Arc, OnceLock};

use irc::proto::{Command, Message};
use tokio::sync::watch;

use crate::Config;
use crate::Error;
use crate::database::Database;
use crate::transport::Transport;

/// Shared services handed to plugins when they are constructed.
#[derive(Clone)]
pub struct Services {
    /// The bot configuration.
    pub config: Arc<Config>,
    /// The database connection pool, if a database is configured.
    pub db: Option<Database>,
    /// The HTTP client.
    pub http: reqwest::Client,
    /// Resolves once the host has finished registering with the chat server.
    pub ready: Ready,
    /// The outbound transport, set once the host has connected.
    transport: Arc<OnceLock<Arc<dyn Transport>>>,
}

impl Services {
    /// Creates a new set of services.
    #[must_use]
    pub fn new(
        config: Arc<Config>,
        db: Option<Database>,
        http: reqwest::Client,
        ready: Ready,
    ) -> Self {
        Self {
            config,
            db,
            http,
            ready,
            transport: Arc::default(),
        }
    }

    /// Makes `transport` available to plugins. Only the first call has any effect.
    pub fn connect_transport(&self, transport: Arc<dyn Transport>) {
        let _ = self.transport.set(transport);
    }

    /// Returns the outbound transport, if the host has connected.
    #[must_use]
    pub fn transport(&self) -> Option<Arc<dyn Transport>> {
        self.transport.get().cloned()
    }

    /// Returns the database, failing if none is configured.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoStorage`] if the bot runs without a database.
    pub fn database(&self) -> Result<Database, Error> {
        self.db.clone().ok_or(Error::NoStorage)
    }
}

/// Readiness of the host.
#[derive(Clone, Debug)]
pub struct Ready(watch::Receiver<bool>);

impl Ready {
    /// Creates a new readiness signal, returning the sender that marks the host as ready.
    #[must_use]
    pub fn channel() -> (watch::Sender<bool>, Ready) {
        let (tx, rx) = watch::channel(false);

        (tx, Ready(rx))
    }

    /// Waits until the host is ready.
    ///
    /// Returns immediately if the host is already ready, or if the sender was dropped.
    pub async fn wait(&mut self) {
        let _ = self.0.wait_for(|ready| *ready).await;
    }
}

/// The context of a single inbound chat message.
#[derive(Clone)]
pub struct Context {
    /// The nickname of the message author.
    pub author: String,
    /// Where replies should be sent: the channel, or the author for private messages.
    pub target: String,
    /// The message text.
    pub content: String,
    /// The bot's own current nickname.
    pub nickname: String,
    /// The outbound transport.
    transport: Arc<dyn Transport>,
}

impl Context {
    /// Creates a context for a message from `author` sent to `target`.
    ///
    /// When `target` is the bot itself, replies are sent back to the author.
    #[must_use]
    pub fn new(
        author: &str,
        target: &str,
        content: &str,
        nickname: &str,
        transport: Arc<dyn Transport>,
    ) -> Self {
        let target = if target.eq_ignore_ascii_case(nickname) {
            author
        } else {
            target
        };

        Self {
            author: author.to_string(),
            target: target.to_string(),
            content: content.to_string(),
            nickname: nickname.to_string(),
            transport,
        }
    }

    /// Builds a context from an IRC message, if it's a `PRIVMSG` from a user.
    #[must_use]
    pub fn from_message(
        message: &Message,
        nickname: &str,
        transport: Arc<dyn Transport>,
    ) -> Option<Self> {
        let Command::PRIVMSG(ref target, ref content) = message.command else {
            return None;
        };
        let author = message.source_nickname()?;

        Some(Self::new(author, target, content, nickname, transport))
    }

    /// Returns true if the message was authored by the bot itself.
    #[must_use]
    pub fn is_own_message(&self) -> bool {
        self.author.eq_ignore_ascii_case(&self.nickname)
    }

    /// Returns true if the message was sent privately to the bot.
    #[must_use]
    pub fn is_private(&self) -> bool {
        self.target == self.author
    }

    /// Sends `text` to the reply target.
    ///
    /// # Errors
    ///
    /// Returns an error if the message could not be sent.
    pub fn reply(&self, text: &str) -> Result<(), Error> {
        self.transport.send_lines(&self.target, text)
    }

    /// Sends `text` to the reply target, prefixed with the author's nickname.
    ///
    /// # Errors
    ///
    /// Returns an error if the message could not be sent.
    pub fn tagged_reply(&self, text: &str) -> Result<(), Error> {
        self.transport
            .send_privmsg(&self.target, &format!("{}: {text}", self.author))
    }

    /// Sends `text` privately to the author.
    ///
    /// # Errors
    ///
    /// Returns an error if the message could not be sent.
    pub fn private_reply(&self, text: &str) -> Result<(), Error> {
        self.transport.send_lines(&self.author, text)
    }
}
