use std::time::Duration;

/// The `User-Agent` header to send when issuing HTTP requests.
pub const HTTP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));

/// The duration before a HTTP request times out.
pub const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// The default value for the maximum number of connections the database connection pool will keep
/// open at once.
pub const DEFAULT_MAX_DB_CONNECTIONS: u32 = 5;

/// The default value for the duration the connection pool will keep an idle connection open.
pub const DEFAULT_DB_IDLE_TIMEOUT: Duration = Duration::from_secs(5);

/// The prefix that marks a chat message as a command.
pub const DEFAULT_COMMAND_PREFIX: &str = ".";

/// The time a scheduled plugin waits between runs when it has no schedule configured.
pub const DEFAULT_LOOP_WAIT: Duration = Duration::from_secs(30);

/// The default AMQP port.
pub const DEFAULT_MQ_PORT: u16 = 5672;

/// The default number of messages fetched from the receive queue per consume call.
pub const DEFAULT_MQ_RESPONSE_LIMIT: usize = 10;

/// Logged in place of a broker connection error that carries no message.
pub const MQ_EMPTY_ERROR_PLACEHOLDER: &str = "No route to host";

/// The maximum number of characters of an error trace delivered to the operator.
pub const MAX_TRACE_LEN: usize = 1994;

/// How long plugins get to finish their current run when the bot shuts down.
pub const PLUGIN_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// The most relayed messages kept while the broker is unreachable. Older messages are dropped.
pub const MAX_RELAY_PENDING: usize = 1000;
