use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use sqlx::PgConnection;
use time::OffsetDateTime;
use tracing::{debug, warn};

use super::prelude::*;
use crate::database::{Database, Model, Storage};

/// The number of recent messages remembered per channel.
const SEARCH_LIMIT: usize = 50;

const MODEL: Model = Model {
    table: "grabs",
    schema: "CREATE TABLE IF NOT EXISTS grabs (
        id BIGSERIAL PRIMARY KEY,
        author TEXT NOT NULL,
        channel TEXT NOT NULL,
        message TEXT NOT NULL,
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )",
};

const SLIPPING: &str = "Ain't gonna catch me slipping!";

/// A saved message.
#[derive(Debug, sqlx::FromRow)]
pub struct GrabRecord {
    /// Who said it.
    pub author: String,
    /// What they said.
    pub message: String,
    /// When it was grabbed.
    pub created_at: OffsetDateTime,
}

/// A message seen in a channel.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Line {
    author: String,
    message: String,
}

/// Saves memorable things people said.
pub struct Grab {
    db: Database,
    prefix: String,
    history: Mutex<HashMap<String, VecDeque<Line>>>,
}

#[async_trait]
impl Plugin for Grab {
    fn name() -> Name {
        Name::from("grab")
    }

    fn author() -> Author {
        Author::from("Mikkel Kroman <mk@maero.dk>")
    }

    fn version() -> Version {
        Version::from("0.1")
    }

    fn requires_config() -> bool {
        false
    }

    fn new(_config: PluginConfig, services: &Services) -> Result<Grab, CogwheelError> {
        Ok(Grab::with_database(
            services.database()?,
            &services.config.bot.prefix,
        ))
    }

    fn command_handler(self: Arc<Self>) -> Option<Arc<dyn CommandHandler>> {
        Some(self)
    }

    fn matcher(self: Arc<Self>) -> Option<Arc<dyn MessageMatcher>> {
        Some(self)
    }

    fn storable(self: Arc<Self>) -> Option<Arc<dyn Storable>> {
        Some(self)
    }
}

impl Storable for Grab {
    fn model(&self) -> Model {
        MODEL
    }

    fn storage(&self) -> &dyn Storage {
        &self.db
    }
}

#[async_trait]
impl MessageMatcher for Grab {
    /// Remembers channel messages so they can be grabbed later. Never responds.
    async fn matches(&self, ctx: &Context, content: &str) -> Result<bool, CogwheelError> {
        if !ctx.is_private() && !content.starts_with(&format!("{}grab", self.prefix)) {
            self.remember(&ctx.target, &ctx.author, content);
        }

        Ok(false)
    }
}

#[async_trait]
impl CommandHandler for Grab {
    fn commands(&self) -> &[&'static str] {
        &["grab", "grabs", "grabr"]
    }

    async fn handle_command(
        &self,
        ctx: &Context,
        invocation: Invocation<'_>,
    ) -> Result<(), CommandError> {
        let nickname = match invocation.name {
            "grabr" => invocation.args.words().first().copied(),
            _ => invocation.args.required("user")?.split_whitespace().next(),
        };

        if nickname.is_some_and(|nick| nick.eq_ignore_ascii_case(&ctx.nickname)) {
            ctx.tagged_reply(SLIPPING)?;

            return Ok(());
        }

        match (invocation.name, nickname) {
            ("grab", Some(nick)) => self.grab(ctx, nick).await,
            ("grabs", Some(nick)) => self.grabs(ctx, nick).await,
            (_, nick) => self.random(ctx, nick).await,
        }
    }
}

impl Grab {
    /// Creates a new plugin storing grabs in `db`.
    #[must_use]
    pub fn with_database(db: Database, prefix: &str) -> Grab {
        Grab {
            db,
            prefix: prefix.to_string(),
            history: Mutex::default(),
        }
    }

    fn remember(&self, channel: &str, author: &str, message: &str) {
        let Ok(mut history) = self.history.lock() else {
            return;
        };
        let lines = history.entry(channel.to_ascii_lowercase()).or_default();

        if lines.len() == SEARCH_LIMIT {
            lines.pop_front();
        }

        lines.push_back(Line {
            author: author.to_string(),
            message: message.to_string(),
        });
    }

    /// Returns the most recent line `nickname` sent to `channel`, with the author as it was seen.
    fn last_message(&self, channel: &str, nickname: &str) -> Option<Line> {
        let history = self.history.lock().ok()?;

        history
            .get(&channel.to_ascii_lowercase())?
            .iter()
            .rev()
            .find(|line| line.author.eq_ignore_ascii_case(nickname))
            .cloned()
    }

    async fn grab(&self, ctx: &Context, nickname: &str) -> Result<(), CommandError> {
        let Some(line) = self.last_message(&ctx.target, nickname) else {
            ctx.tagged_reply(&format!(
                "Could not find a recent message from user {nickname}"
            ))?;

            return Ok(());
        };

        let mut session = self.session().await?;

        match save(&mut session, &line.author, &ctx.target, &line.message).await {
            Ok(true) => ctx.tagged_reply(&format!("Successfully saved: '{}'", line.message))?,
            Ok(false) => ctx.tagged_reply("That grab already exists!")?,
            Err(err) => {
                warn!(%err, "could not save grab");
                ctx.tagged_reply("I had an issue remembering that message!")?;
            }
        }

        Ok(())
    }

    async fn grabs(&self, ctx: &Context, nickname: &str) -> Result<(), CommandError> {
        let mut session = self.session().await?;
        let messages: Vec<String> = sqlx::query_scalar(
            "SELECT message FROM grabs
             WHERE lower(author) = lower($1) AND channel = $2 ORDER BY id",
        )
        .bind(nickname)
        .bind(&ctx.target)
        .fetch_all(&mut *session)
        .await
        .map_err(CogwheelError::from)?;

        debug!(%nickname, count = messages.len(), "listing grabs");

        match join_quoted(&messages) {
            Some(list) => ctx.tagged_reply(&list)?,
            None => ctx.tagged_reply(&format!("No messages found for {nickname}"))?,
        }

        Ok(())
    }

    async fn random(&self, ctx: &Context, nickname: Option<&str>) -> Result<(), CommandError> {
        let mut session = self.session().await?;
        let record: Option<GrabRecord> = sqlx::query_as(
            "SELECT author, message, created_at FROM grabs
             WHERE channel = $1 AND ($2::TEXT IS NULL OR lower(author) = lower($2))
             ORDER BY random() LIMIT 1",
        )
        .bind(&ctx.target)
        .bind(nickname)
        .fetch_optional(&mut *session)
        .await
        .map_err(CogwheelError::from)?;

        match record {
            Some(record) => ctx.tagged_reply(&format!(
                "'{}' - {}, {}",
                record.message,
                record.author,
                record.created_at.date()
            ))?,
            None => ctx.tagged_reply(&format!(
                "No messages found for {}",
                nickname.unwrap_or("this channel")
            ))?,
        }

        Ok(())
    }
}

/// Saves a grab, returning false if the same message was already grabbed.
async fn save(
    conn: &mut PgConnection,
    author: &str,
    channel: &str,
    message: &str,
) -> Result<bool, sqlx::Error> {
    let existing: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM grabs
         WHERE lower(author) = lower($1) AND channel = $2 AND message = $3",
    )
    .bind(author)
    .bind(channel)
    .bind(message)
    .fetch_one(&mut *conn)
    .await?;

    if existing != 0 {
        return Ok(false);
    }

    sqlx::query("INSERT INTO grabs (author, channel, message) VALUES ($1, $2, $3)")
        .bind(author)
        .bind(channel)
        .bind(message)
        .execute(&mut *conn)
        .await?;

    Ok(true)
}

/// Joins messages as `'a', 'b', and 'c'`.
fn join_quoted(messages: &[String]) -> Option<String> {
    match messages {
        [] => None,
        [only] => Some(format!("'{only}'")),
        [rest @ .., last] => {
            let rest: Vec<String> = rest.iter().map(|m| format!("'{m}'")).collect();

            Some(format!("{}, and '{last}'", rest.join(", ")))
        }
    }
}
