use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::prelude::*;
use crate::consts;
use crate::mq::{AmqpBroker, Broker, MqClient, MqConfig, QueueClient};
use crate::schedule::{LoopState, Schedule, ScheduleConfig, Scheduled};

/// Plugin configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct RelayConfig {
    /// The channels whose messages are published. Inbound messages without a channel go to the
    /// first one.
    pub channels: Vec<String>,
    /// Broker settings.
    #[serde(flatten)]
    pub mq: MqConfig,
    /// How often to exchange messages with the broker.
    #[serde(flatten)]
    pub schedule: ScheduleConfig,
}

/// A chat message published to the send queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayEvent {
    /// The kind of event, always `message`.
    pub event: String,
    /// The channel it was sent to.
    pub channel: String,
    /// Who sent it.
    pub author: String,
    /// The message text.
    pub content: String,
}

/// A message consumed from the receive queue.
#[derive(Debug, Clone, Deserialize)]
pub struct InboundMessage {
    /// The channel to send it to.
    pub channel: Option<String>,
    /// The message text.
    pub content: String,
}

/// Relays channel messages to a message queue, and messages from the queue to channels.
pub struct Relay {
    channels: Vec<String>,
    queue: MqClient,
    schedule: Schedule,
    state: LoopState,
    pending: Mutex<Vec<Vec<u8>>>,
    services: Services,
}

#[async_trait]
impl Plugin for Relay {
    fn name() -> Name {
        Name::from("relay")
    }

    fn author() -> Author {
        Author::from("Mikkel Kroman <mk@maero.dk>")
    }

    fn version() -> Version {
        Version::from("0.1")
    }

    fn new(config: PluginConfig, services: &Services) -> Result<Relay, CogwheelError> {
        Relay::with_broker(config.extract()?, AmqpBroker, services)
    }

    fn matcher(self: Arc<Self>) -> Option<Arc<dyn MessageMatcher>> {
        Some(self)
    }

    fn scheduled(self: Arc<Self>) -> Option<Arc<dyn Scheduled>> {
        Some(self)
    }
}

impl QueueClient for Relay {
    fn queue(&self) -> &MqClient {
        &self.queue
    }
}

#[async_trait]
impl MessageMatcher for Relay {
    /// Queues messages from relayed channels for publishing. Never responds.
    async fn matches(&self, ctx: &Context, content: &str) -> Result<bool, CogwheelError> {
        if !self.is_relayed(&ctx.target) {
            return Ok(false);
        }

        let event = RelayEvent {
            event: "message".to_string(),
            channel: ctx.target.clone(),
            author: ctx.author.clone(),
            content: content.to_string(),
        };
        let body = serde_json::to_vec(&event).map_err(CogwheelError::plugin)?;

        if let Ok(mut pending) = self.pending.lock() {
            pending.push(body);
            drop_oldest(&mut pending);
        }

        Ok(false)
    }
}

#[async_trait]
impl Scheduled for Relay {
    fn schedule(&self) -> &Schedule {
        &self.schedule
    }

    fn state(&self) -> &LoopState {
        &self.state
    }

    async fn loop_preconfig(&self) -> Result<(), CogwheelError> {
        debug!(channels = ?self.channels, host = %self.queue.config().host, "starting relay");

        Ok(())
    }

    async fn execute(&self) -> Result<(), CogwheelError> {
        self.flush().await;
        self.deliver().await
    }
}

impl Relay {
    /// Creates a new relay using `broker`.
    ///
    /// # Errors
    ///
    /// Returns [`CogwheelError::InvalidSchedule`] if the cron expression is invalid.
    pub fn with_broker(
        config: RelayConfig,
        broker: impl Broker + 'static,
        services: &Services,
    ) -> Result<Relay, CogwheelError> {
        Ok(Relay {
            schedule: config.schedule.schedule()?,
            channels: config.channels,
            queue: MqClient::new(broker, config.mq),
            state: LoopState::new(),
            pending: Mutex::default(),
            services: services.clone(),
        })
    }

    fn is_relayed(&self, channel: &str) -> bool {
        self.channels.iter().any(|c| c.eq_ignore_ascii_case(channel))
    }

    /// Publishes the pending messages, keeping them for the next run if that fails.
    async fn flush(&self) {
        let batch = match self.pending.lock() {
            Ok(mut pending) => std::mem::take(&mut *pending),
            Err(_) => return,
        };

        if batch.is_empty() || self.publish(&batch).await {
            return;
        }

        warn!(count = batch.len(), "could not publish relayed messages, will retry");

        if let Ok(mut pending) = self.pending.lock() {
            pending.splice(0..0, batch);
            drop_oldest(&mut pending);
        }
    }

    /// Sends consumed messages to their channels.
    async fn deliver(&self) -> Result<(), CogwheelError> {
        let (bodies, ok) = self.consume().await;

        if !ok {
            debug!("mq unavailable, skipping delivery");

            return Ok(());
        }

        if bodies.is_empty() {
            return Ok(());
        }

        let Some(transport) = self.services.transport() else {
            warn!(count = bodies.len(), "not connected, dropping inbound messages");

            return Ok(());
        };

        for body in bodies {
            let message: InboundMessage = match serde_json::from_slice(&body) {
                Ok(message) => message,
                Err(err) => {
                    warn!(%err, "dropping malformed inbound message");

                    continue;
                }
            };

            let Some(channel) = message.channel.as_ref().or_else(|| self.channels.first()) else {
                continue;
            };

            if let Err(err) = transport.send_lines(channel, &message.content) {
                warn!(%err, %channel, "could not deliver inbound message");
            }
        }

        Ok(())
    }
}

/// Drops the oldest pending messages beyond [`consts::MAX_RELAY_PENDING`].
fn drop_oldest(pending: &mut Vec<Vec<u8>>) {
    let excess = pending.len().saturating_sub(consts::MAX_RELAY_PENDING);

    if excess > 0 {
        pending.drain(..excess);
        warn!(dropped = excess, "relay backlog full, dropping oldest messages");
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;

    use super::*;
    use crate::Config;
    use crate::context::Ready;
    use crate::mq::testing::MemoryBroker;
    use crate::transport::testing::RecordingTransport;

    fn config() -> RelayConfig {
        RelayConfig {
            channels: vec!["#rust".to_string(), "#ops".to_string()],
            mq: MqConfig {
                host: "localhost".to_string(),
                port: 5672,
                vhost: "/".to_string(),
                user: "guest".to_string(),
                pass: "guest".to_string(),
                send_queue: Some("chat.out".to_string()),
                recv_queue: Some("chat.in".to_string()),
                response_limit: 10,
            },
            schedule: ScheduleConfig::default(),
        }
    }

    fn relay(broker: &MemoryBroker) -> (Relay, Arc<RecordingTransport>) {
        let (_tx, ready) = Ready::channel();
        let services = Services::new(
            Arc::new(Config::default()),
            None,
            reqwest::Client::new(),
            ready,
        );
        let transport = Arc::new(RecordingTransport::default());
        services.connect_transport(transport.clone());

        let relay = Relay::with_broker(config(), broker.clone(), &services).unwrap();

        (relay, transport)
    }

    async fn say(relay: &Relay, transport: &Arc<RecordingTransport>, target: &str, content: &str) {
        let ctx = Context::new("bob", target, content, "cogwheel", transport.clone());

        assert!(!relay.matches(&ctx, content).await.unwrap());
    }

    #[test]
    fn config_is_read_from_flat_keys() {
        let value = figment::value::Value::serialize(serde_json::json!({
            "channels": ["#rust"],
            "mq_host": "mq.example.com",
            "mq_user": "bot",
            "mq_pass": "hunter2",
            "mq_send_queue": "out",
            "wait": "5s",
        }))
        .unwrap();
        let config: RelayConfig = value.deserialize().unwrap();

        assert_eq!(config.mq.port, 5672);
        assert_eq!(config.mq.vhost, "/");
        assert_eq!(config.mq.recv_queue, None);
        assert_eq!(config.mq.response_limit, 10);
        assert_eq!(config.schedule.wait, Some(std::time::Duration::from_secs(5)));
    }

    #[tokio::test]
    async fn it_should_publish_relayed_channels() {
        let broker = MemoryBroker::default();
        let (relay, transport) = relay(&broker);

        say(&relay, &transport, "#rust", "hello").await;
        say(&relay, &transport, "#other", "ignored").await;
        relay.execute().await.unwrap();

        let published = broker.queued("chat.out");
        assert_eq!(published.len(), 1);

        let event: RelayEvent = serde_json::from_str(&published[0]).unwrap();
        assert_eq!(event.channel, "#rust");
        assert_eq!(event.author, "bob");
        assert_eq!(event.content, "hello");
    }

    #[tokio::test]
    async fn it_should_retry_failed_publishes() {
        let broker = MemoryBroker::default();
        let (relay, transport) = relay(&broker);

        broker.state.unreachable.store(true, Ordering::SeqCst);
        say(&relay, &transport, "#rust", "one").await;
        relay.execute().await.unwrap();
        assert!(broker.queued("chat.out").is_empty());

        broker.state.unreachable.store(false, Ordering::SeqCst);
        say(&relay, &transport, "#rust", "two").await;
        relay.execute().await.unwrap();

        let contents: Vec<String> = broker
            .queued("chat.out")
            .iter()
            .map(|body| serde_json::from_str::<RelayEvent>(body).unwrap().content)
            .collect();
        assert_eq!(contents, vec!["one", "two"]);
    }

    #[tokio::test]
    async fn it_should_cap_the_backlog_during_outages() {
        let broker = MemoryBroker::default();
        let (relay, transport) = relay(&broker);
        let total = consts::MAX_RELAY_PENDING + 250;

        broker.state.unreachable.store(true, Ordering::SeqCst);

        for i in 0..total {
            say(&relay, &transport, "#rust", &i.to_string()).await;

            if i % 100 == 0 {
                relay.execute().await.unwrap();
            }
        }
        relay.execute().await.unwrap();

        let pending = relay.pending.lock().unwrap().clone();
        assert_eq!(pending.len(), consts::MAX_RELAY_PENDING);

        let oldest: RelayEvent = serde_json::from_slice(&pending[0]).unwrap();
        let newest: RelayEvent = serde_json::from_slice(&pending[pending.len() - 1]).unwrap();
        assert_eq!(oldest.content, "250");
        assert_eq!(newest.content, (total - 1).to_string());
    }

    #[tokio::test]
    async fn it_should_keep_delivering_after_a_failed_send() {
        let broker = MemoryBroker::default();
        let (_tx, ready) = Ready::channel();
        let services = Services::new(
            Arc::new(Config::default()),
            None,
            reqwest::Client::new(),
            ready,
        );
        let transport = Arc::new(RecordingTransport::unreachable("#ops"));
        services.connect_transport(transport.clone());
        let relay = Relay::with_broker(config(), broker.clone(), &services).unwrap();

        broker.push("chat.in", r##"{"channel":"#ops","content":"lost"}"##);
        broker.push("chat.in", r##"{"channel":"#rust","content":"still delivered"}"##);
        relay.execute().await.unwrap();

        assert_eq!(transport.sent_to("#rust"), vec!["still delivered"]);
        assert!(broker.queued("chat.in").is_empty());
    }

    #[tokio::test]
    async fn it_should_deliver_inbound_messages() {
        let broker = MemoryBroker::default();
        let (relay, transport) = relay(&broker);

        broker.push("chat.in", r##"{"channel":"#ops","content":"deploy done"}"##);
        broker.push("chat.in", "not json");
        broker.push("chat.in", r#"{"content":"to the default channel"}"#);
        relay.execute().await.unwrap();

        assert_eq!(transport.sent_to("#ops"), vec!["deploy done"]);
        assert_eq!(transport.sent_to("#rust"), vec!["to the default channel"]);
        assert!(broker.queued("chat.in").is_empty());
    }
}
