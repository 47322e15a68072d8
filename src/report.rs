//! Classification of command errors, user-facing error messages and operator reports.

use std::error::Error as StdError;
use std::fmt::Write as _;
use std::sync::Arc;

use tracing::{debug, error, warn};

use crate::consts;
use crate::context::Context;
use crate::transport::Transport;
use crate::utils::Truncatable;

/// The message users get when an error has no template, or its template can't be rendered.
pub const DEFAULT_MESSAGE: &str = "I ran into an error processing your command";

/// The longest chat message sent to the operator.
const MAX_OPERATOR_LINE_LEN: usize = 400;

/// Errors raised while parsing or running a command.
#[derive(thiserror::Error, Debug)]
#[allow(missing_docs)]
pub enum CommandError {
    #[error("could not convert argument to `{converter}`")]
    Conversion { converter: String },
    #[error("missing required argument `{param}`")]
    MissingRequiredArgument { param: String },
    #[error("too many arguments")]
    TooManyArguments,
    #[error("message not found: {argument}")]
    MessageNotFound { argument: String },
    #[error("member not found: {argument}")]
    MemberNotFound { argument: String },
    #[error("user not found: {argument}")]
    UserNotFound { argument: String },
    #[error("channel not found: {argument}")]
    ChannelNotFound { argument: String },
    #[error("channel not readable: {argument}")]
    ChannelNotReadable { argument: String },
    #[error("bad colour: {argument}")]
    BadColourArgument { argument: String },
    #[error("role not found: {argument}")]
    RoleNotFound { argument: String },
    #[error("bad invite")]
    BadInviteArgument,
    #[error("emoji not found: {argument}")]
    EmojiNotFound { argument: String },
    #[error("partial emoji conversion failed: {argument}")]
    PartialEmojiConversionFailure { argument: String },
    #[error("bad boolean: {argument}")]
    BadBoolArgument { argument: String },
    #[error("unexpected quote {quote}")]
    UnexpectedQuote { quote: String },
    #[error("invalid end of quoted string: {char}")]
    InvalidEndOfQuotedString { char: String },
    #[error("expected closing quote {close_quote}")]
    ExpectedClosingQuote { close_quote: String },
    #[error("check failed")]
    CheckFailure,
    #[error("all checks failed")]
    CheckAnyFailure,
    #[error("private message only")]
    PrivateMessageOnly,
    #[error("no private message")]
    NoPrivateMessage,
    #[error("not owner")]
    NotOwner,
    #[error("missing permissions: {}", .permissions.join(", "))]
    MissingPermissions { permissions: Vec<String> },
    #[error("bot missing permissions: {}", .permissions.join(", "))]
    BotMissingPermissions { permissions: Vec<String> },
    #[error("missing role: {role}")]
    MissingRole { role: String },
    #[error("bot missing role: {role}")]
    BotMissingRole { role: String },
    #[error("missing any role of: {}", .roles.join(", "))]
    MissingAnyRole { roles: Vec<String> },
    #[error("bot missing any role of: {}", .roles.join(", "))]
    BotMissingAnyRole { roles: Vec<String> },
    #[error("nsfw channel required")]
    NsfwChannelRequired,
    #[error("command is disabled")]
    DisabledCommand,
    #[error("command on cooldown, retry after {retry_after}s")]
    CommandOnCooldown { retry_after: f64 },
    #[error("command `{name}` not found")]
    CommandNotFound { name: String },
    /// Any other failure inside a command.
    #[error(transparent)]
    Other(Box<dyn StdError + Send + Sync>),
}

impl From<crate::Error> for CommandError {
    fn from(err: crate::Error) -> Self {
        CommandError::Other(Box::new(err))
    }
}

impl CommandError {
    /// Wraps an arbitrary error raised by a command.
    pub fn other<E>(err: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        CommandError::Other(Box::new(err))
    }

    /// Returns true if errors of this kind are never reported.
    #[must_use]
    pub const fn is_ignored(&self) -> bool {
        matches!(self, CommandError::CommandNotFound { .. })
    }

    /// Returns the user-facing template for this error.
    #[must_use]
    pub fn template(&self) -> Template<'_> {
        use CommandError::*;

        match self {
            Conversion { converter } => Template::new(
                "Could not convert argument to: `{}`",
                vec![Field::Text(converter)],
            ),
            MissingRequiredArgument { param } => Template::new(
                "You did not provide the command argument: `{}`",
                vec![Field::Text(param)],
            ),
            TooManyArguments => Template::fixed("You provided too many arguments to that command"),
            MessageNotFound { argument: a } => {
                Template::text("I couldn't find the message: \"{}\"", a)
            }
            MemberNotFound { argument: a } => {
                Template::text("I couldn't find the server member: \"{}\"", a)
            }
            UserNotFound { argument: a } => Template::text("I couldn't find the user: \"{}\"", a),
            ChannelNotFound { argument: a } => {
                Template::text("I couldn't find the channel: \"{}\"", a)
            }
            ChannelNotReadable { argument: a } => {
                Template::text("I can't read the channel: \"{}\"", a)
            }
            BadColourArgument { argument: a } => {
                Template::text("I can't use the color: \"{}\"", a)
            }
            RoleNotFound { argument: a } => Template::text("I couldn't find the role: \"{}\"", a),
            BadInviteArgument => Template::fixed("I can't use that invite"),
            EmojiNotFound { argument: a } => Template::text("I couldn't find the emoji: \"{}\"", a),
            PartialEmojiConversionFailure { argument: a } => {
                Template::text("I couldn't use the emoji: \"{}\"", a)
            }
            BadBoolArgument { argument: a } => {
                Template::text("I couldn't process the boolean: \"{}\"", a)
            }
            UnexpectedQuote { quote } => Template::new(
                "I wasn't able to understand your command because of an unexpected quote ({})",
                vec![Field::Text(quote)],
            ),
            InvalidEndOfQuotedString { char } => Template::new(
                "You provided an unreadable char after your quote: `{}`",
                vec![Field::Text(char)],
            ),
            ExpectedClosingQuote { close_quote } => Template::new(
                "You did not close your quote with a `{}`",
                vec![Field::Text(close_quote)],
            ),
            CheckFailure | CheckAnyFailure => {
                Template::fixed("That command can't be ran in this context")
            }
            PrivateMessageOnly => Template::fixed("That's only allowed in private messages"),
            NoPrivateMessage => Template::fixed("That's only allowed in channels"),
            NotOwner => Template::fixed("Only the bot owner can do that"),
            MissingPermissions { permissions } => Template::new(
                "I am unable to do that because you lack the permission(s): `{}`",
                vec![Field::List(permissions)],
            ),
            BotMissingPermissions { permissions } => Template::new(
                "I am unable to do that because I lack the permission(s): `{}`",
                vec![Field::List(permissions)],
            ),
            MissingRole { role } => Template::new(
                "I am unable to do that because you lack the role: `{}`",
                vec![Field::Text(role)],
            ),
            BotMissingRole { role } => Template::new(
                "I am unable to do that because I lack the role: `{}`",
                vec![Field::Text(role)],
            ),
            MissingAnyRole { roles } => Template::new(
                "I am unable to do that because you lack the role(s): `{}`",
                vec![Field::List(roles)],
            ),
            BotMissingAnyRole { roles } => Template::new(
                "I am unable to do that because I lack the role(s): `{}`",
                vec![Field::List(roles)],
            ),
            NsfwChannelRequired => Template::fixed(
                "I can't do that because the target channel is not marked NSFW",
            ),
            DisabledCommand => Template::fixed("That command is disabled"),
            CommandOnCooldown { retry_after } => Template::new(
                "That command is on cooldown for you. Try again in {} seconds",
                vec![Field::Integer(*retry_after)],
            ),
            CommandNotFound { .. } | Other(_) => Template::default(),
        }
    }

    /// Renders the user-facing message for this error.
    #[must_use]
    pub fn message(&self) -> String {
        self.template().get_message()
    }
}

/// A value interpolated into a [`Template`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Field<'a> {
    /// Text, used as-is.
    Text(&'a str),
    /// A list of names, joined with commas.
    List(&'a [String]),
    /// A number that is truncated to an integer.
    Integer(f64),
}

impl Field<'_> {
    /// Returns the rendered value, or `None` if the value is empty.
    fn render(&self) -> Option<String> {
        match *self {
            Field::Text(text) if !text.is_empty() => Some(text.to_string()),
            Field::List(items) if !items.is_empty() => Some(items.join(", ")),
            Field::Integer(value) if value != 0.0 => {
                if value.is_finite() {
                    Some(value.trunc().to_string())
                } else {
                    warn!(%value, "unable to truncate template value");

                    Some(value.to_string())
                }
            }
            _ => None,
        }
    }
}

/// A message format with `{}` placeholders and the values to fill them with.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Template<'a> {
    format: Option<&'static str>,
    fields: Vec<Field<'a>>,
}

impl<'a> Template<'a> {
    /// Creates a template with placeholders.
    #[must_use]
    pub fn new(format: &'static str, fields: Vec<Field<'a>>) -> Self {
        Template {
            format: Some(format),
            fields,
        }
    }

    /// Creates a template without placeholders.
    #[must_use]
    pub fn fixed(format: &'static str) -> Self {
        Template::new(format, Vec::new())
    }

    /// Creates a template with a single text placeholder.
    #[must_use]
    pub fn text(format: &'static str, value: &'a str) -> Self {
        Template::new(format, vec![Field::Text(value)])
    }

    /// Renders the template.
    ///
    /// Falls back to [`DEFAULT_MESSAGE`] when there's no format, when any field is empty, or when
    /// the number of fields doesn't match the number of placeholders.
    #[must_use]
    pub fn get_message(&self) -> String {
        let Some(format) = self.format else {
            return DEFAULT_MESSAGE.to_string();
        };

        let Some(values) = self.fields.iter().map(Field::render).collect::<Option<Vec<_>>>()
        else {
            return DEFAULT_MESSAGE.to_string();
        };

        let mut parts = format.split("{}");
        let mut message = parts.next().unwrap_or_default().to_string();
        let mut values = values.into_iter();

        for part in parts {
            let Some(value) = values.next() else {
                return DEFAULT_MESSAGE.to_string();
            };

            message.push_str(&value);
            message.push_str(part);
        }

        if values.next().is_some() {
            return DEFAULT_MESSAGE.to_string();
        }

        message
    }
}

/// Details about where an error happened.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ErrorRecord {
    /// The event being handled, e.g. `command` or `loop`.
    pub event: String,
    /// The plugin that raised the error.
    pub plugin: Option<String>,
    /// The command that was invoked.
    pub command: Option<String>,
    /// The user who invoked the command.
    pub user: Option<String>,
    /// The message that was sent to the user.
    pub response: Option<String>,
}

impl ErrorRecord {
    /// Creates a record for `event` without any command details.
    #[must_use]
    pub fn new(event: &str) -> Self {
        ErrorRecord {
            event: event.to_string(),
            ..Default::default()
        }
    }

    /// Returns the summary lines sent to the operator.
    #[must_use]
    pub fn summary(&self) -> Vec<String> {
        let mut lines = vec!["Error!".to_string(), format!("Event: {}", self.event)];

        if self.plugin.is_some() || self.command.is_some() || self.user.is_some() {
            let or_unknown =
                |value: &Option<String>| value.clone().unwrap_or_else(|| "unknown".into());

            lines.push(format!("Plugin: {}", or_unknown(&self.plugin)));
            lines.push(format!("Command: {}", or_unknown(&self.command)));
            lines.push(format!("User: {}", or_unknown(&self.user)));
            lines.push(format!("Response: \"{}\"", or_unknown(&self.response)));
        }

        lines
    }
}

/// Custom handling of command errors, replacing the default reply and operator report.
pub trait CommandErrorHook: Send + Sync {
    /// Handles a failed command.
    fn on_command_error(&self, ctx: &Context, error: &CommandError);
}

/// Reports errors to users and to the bot operator.
#[derive(Clone)]
pub struct ErrorReporter {
    transport: Arc<dyn Transport>,
    operator: Option<String>,
    hook: Option<Arc<dyn CommandErrorHook>>,
}

impl ErrorReporter {
    /// Creates a reporter that sends operator reports to `operator`, if any.
    #[must_use]
    pub fn new(transport: Arc<dyn Transport>, operator: Option<String>) -> Self {
        ErrorReporter {
            transport,
            operator,
            hook: None,
        }
    }

    /// Replaces the default handling of every command error with `hook`.
    #[must_use]
    pub fn with_hook(mut self, hook: Arc<dyn CommandErrorHook>) -> Self {
        self.hook = Some(hook);
        self
    }

    /// Handles an error raised by `command` of `plugin`.
    ///
    /// When a custom hook is installed on the reporter, or `plugin_hook` is given, the error is
    /// handed to that hook instead. Ignored errors are dropped. Otherwise the user gets the
    /// rendered message and the operator gets a report.
    pub fn handle_command_error(
        &self,
        ctx: &Context,
        plugin: &str,
        command: &str,
        error: &CommandError,
        plugin_hook: Option<&dyn CommandErrorHook>,
    ) {
        if let Some(hook) = self.hook.as_deref().or(plugin_hook) {
            hook.on_command_error(ctx, error);

            return;
        }

        if error.is_ignored() {
            return;
        }

        let message = error.message();

        if let Err(err) = ctx.tagged_reply(&message) {
            debug!(%err, target = %ctx.target, "could not send error message");
        }

        let record = ErrorRecord {
            event: "command".to_string(),
            plugin: Some(plugin.to_string()),
            command: Some(command.to_string()),
            user: Some(ctx.author.clone()),
            response: Some(message),
        };

        self.handle_error(&record.event, error, Some(&record));
    }

    /// Logs `error` and sends a report to the operator.
    ///
    /// The trace is truncated to [`consts::MAX_TRACE_LEN`] before it is split into messages of at
    /// most [`MAX_OPERATOR_LINE_LEN`] characters. Blank lines are not sent, so the delivered text
    /// may be slightly shorter than the truncated trace.
    ///
    /// Delivery failures are logged at debug level and otherwise ignored.
    pub fn handle_error(
        &self,
        event: &str,
        error: &(dyn StdError + 'static),
        record: Option<&ErrorRecord>,
    ) {
        if error
            .downcast_ref::<CommandError>()
            .is_some_and(CommandError::is_ignored)
        {
            return;
        }

        let trace = trace(error);

        error!(%event, %trace, "unhandled error");

        let Some(ref operator) = self.operator else {
            return;
        };

        let summary = match record {
            Some(record) => record.summary(),
            None => ErrorRecord::new(event).summary(),
        };
        let trace = trace.truncate_with_suffix(consts::MAX_TRACE_LEN, "");
        let lines = summary.iter().map(String::as_str).chain(
            trace
                .lines()
                .filter(|line| !line.trim().is_empty())
                .flat_map(|line| line.char_chunks(MAX_OPERATOR_LINE_LEN)),
        );

        for line in lines {
            if let Err(err) = self.transport.send_privmsg(operator, line) {
                debug!(%err, %operator, "could not deliver error report");

                return;
            }
        }
    }
}

/// Formats an error and its chain of sources.
#[must_use]
pub fn trace(error: &(dyn StdError + 'static)) -> String {
    let mut trace = error.to_string();
    let mut source = error.source();

    while let Some(cause) = source {
        let _ = write!(trace, "\nCaused by: {cause}");
        source = cause.source();
    }

    trace
}
