use std::collections::BTreeMap;

use serde::Deserialize;
use tracing::debug;

use super::prelude::*;

/// Plugin configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ProtectConfig {
    /// The channels to watch.
    #[serde(default)]
    pub included_channels: Vec<String>,
    /// The longest message allowed, in characters.
    #[serde(default = "default_length_limit")]
    pub length_limit: usize,
    /// Alerts keyed by the text that triggers them.
    #[serde(default)]
    pub string_map: BTreeMap<String, StringAlert>,
    /// Nicknames that are never warned.
    #[serde(default)]
    pub exempt: Vec<String>,
}

/// A warning sent when a message contains a watched string.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct StringAlert {
    /// The warning.
    pub message: String,
    /// Match case when looking for the string.
    #[serde(default = "default_sensitive")]
    pub sensitive: bool,
    /// Send the warning privately instead of in the channel.
    #[serde(default)]
    pub private: bool,
}

const fn default_length_limit() -> usize {
    500
}

const fn default_sensitive() -> bool {
    true
}

/// What a message violated.
#[derive(Debug, Default, PartialEq, Eq)]
struct Alerts<'a> {
    string: Option<&'a StringAlert>,
    length: bool,
}

/// Warns people who post watched strings or overly long messages.
pub struct Protect {
    config: ProtectConfig,
    operator: Option<String>,
}

#[async_trait]
impl Plugin for Protect {
    fn name() -> Name {
        Name::from("protect")
    }

    fn author() -> Author {
        Author::from("Mikkel Kroman <mk@maero.dk>")
    }

    fn version() -> Version {
        Version::from("0.1")
    }

    fn new(config: PluginConfig, services: &Services) -> Result<Protect, CogwheelError> {
        Ok(Protect {
            config: config.extract()?,
            operator: services.config.bot.operator.clone(),
        })
    }

    fn matcher(self: Arc<Self>) -> Option<Arc<dyn MessageMatcher>> {
        Some(self)
    }
}

#[async_trait]
impl MessageMatcher for Protect {
    async fn matches(&self, ctx: &Context, content: &str) -> Result<bool, CogwheelError> {
        let watched = self
            .config
            .included_channels
            .iter()
            .any(|channel| channel.eq_ignore_ascii_case(&ctx.target));

        Ok(watched && self.alerts(content) != Alerts::default())
    }

    async fn respond(&self, ctx: &Context, content: &str) -> Result<(), CogwheelError> {
        if self.is_exempt(&ctx.author) {
            debug!(author = %ctx.author, "ignoring exempt user");

            return Ok(());
        }

        let alerts = self.alerts(content);

        if let Some(alert) = alerts.string {
            if alert.private {
                ctx.private_reply(&alert.message)?;
            } else {
                ctx.tagged_reply(&alert.message)?;
            }
        }

        if alerts.length {
            ctx.tagged_reply(&format!(
                "Message greater than {} characters",
                self.config.length_limit
            ))?;
        }

        Ok(())
    }
}

impl Protect {
    fn alerts(&self, content: &str) -> Alerts<'_> {
        let lowercase = content.to_lowercase();
        let string = self.config.string_map.iter().find_map(|(key, alert)| {
            let found = if alert.sensitive {
                content.contains(key.as_str())
            } else {
                lowercase.contains(&key.to_lowercase())
            };

            found.then_some(alert)
        });

        Alerts {
            string,
            length: content.chars().count() > self.config.length_limit,
        }
    }

    fn is_exempt(&self, nickname: &str) -> bool {
        self.operator
            .iter()
            .chain(&self.config.exempt)
            .any(|exempt| exempt.eq_ignore_ascii_case(nickname))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::testing::RecordingTransport;

    fn protect() -> Protect {
        let mut string_map = BTreeMap::new();
        string_map.insert(
            "Windows ME".to_string(),
            StringAlert {
                message: "We don't talk about that".to_string(),
                sensitive: true,
                private: false,
            },
        );
        string_map.insert(
            "password".to_string(),
            StringAlert {
                message: "Never share passwords".to_string(),
                sensitive: false,
                private: true,
            },
        );

        Protect {
            config: ProtectConfig {
                included_channels: vec!["#help".to_string()],
                length_limit: 20,
                string_map,
                exempt: vec!["mod".to_string()],
            },
            operator: Some("admin".to_string()),
        }
    }

    fn ctx(
        transport: &Arc<RecordingTransport>,
        author: &str,
        target: &str,
        content: &str,
    ) -> Context {
        Context::new(author, target, content, "cogwheel", transport.clone())
    }

    #[tokio::test]
    async fn it_should_only_watch_included_channels() {
        let transport = Arc::new(RecordingTransport::default());
        let protect = protect();

        let watched = ctx(&transport, "bob", "#help", "Windows ME");
        let unwatched = ctx(&transport, "bob", "#off", "Windows ME");
        let harmless = ctx(&transport, "bob", "#help", "hi");

        assert!(protect.matches(&watched, "Windows ME").await.unwrap());
        assert!(!protect.matches(&unwatched, "Windows ME").await.unwrap());
        assert!(!protect.matches(&harmless, "hi").await.unwrap());
    }

    #[test]
    fn it_should_respect_case_sensitivity() {
        let protect = protect();

        assert!(protect.alerts("windows me").string.is_none());
        assert_eq!(
            protect.alerts("my PassWord").string.map(|a| a.message.as_str()),
            Some("Never share passwords")
        );
    }

    #[tokio::test]
    async fn it_should_warn_about_strings_and_length() {
        let transport = Arc::new(RecordingTransport::default());
        let content = "here is my password, hunter2";

        protect()
            .respond(&ctx(&transport, "bob", "#help", content), content)
            .await
            .unwrap();

        assert_eq!(transport.sent_to("bob"), vec!["Never share passwords"]);
        assert_eq!(
            transport.sent_to("#help"),
            vec!["bob: Message greater than 20 characters"]
        );
    }

    #[tokio::test]
    async fn it_should_ignore_exempt_users() {
        let transport = Arc::new(RecordingTransport::default());

        for author in ["mod", "Admin"] {
            protect()
                .respond(&ctx(&transport, author, "#help", "Windows ME"), "Windows ME")
                .await
                .unwrap();
        }

        assert!(transport.sent().is_empty());
    }
}
