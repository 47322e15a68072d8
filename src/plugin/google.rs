use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use super::prelude::*;
use crate::http::{HttpCaller, RequestOptions};

const GOOGLE_URL: &str = "https://www.googleapis.com/customsearch/v1";
const YOUTUBE_URL: &str = "https://www.googleapis.com/youtube/v3/search";

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("search result has no link")]
    MissingLink,
    #[error("video result has no id")]
    MissingVideoId,
}

/// Plugin configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct GoogleConfig {
    /// The id of the custom search engine.
    pub cse_id: String,
    /// The API key.
    pub dev_key: String,
    /// The maximum number of results to reply with.
    #[serde(default = "default_responses_max")]
    pub responses_max: usize,
    /// The custom search endpoint.
    #[serde(default = "default_google_url")]
    pub google_url: String,
    /// The YouTube search endpoint.
    #[serde(default = "default_youtube_url")]
    pub youtube_url: String,
}

const fn default_responses_max() -> usize {
    1
}

fn default_google_url() -> String {
    GOOGLE_URL.to_string()
}

fn default_youtube_url() -> String {
    YOUTUBE_URL.to_string()
}

/// Searches Google and YouTube.
pub struct Google {
    client: reqwest::Client,
    config: GoogleConfig,
}

#[async_trait]
impl Plugin for Google {
    fn name() -> Name {
        Name::from("google")
    }

    fn author() -> Author {
        Author::from("Mikkel Kroman <mk@maero.dk>")
    }

    fn version() -> Version {
        Version::from("0.1")
    }

    fn new(config: PluginConfig, services: &Services) -> Result<Google, CogwheelError> {
        Ok(Google::with_client(services.http.clone(), config.extract()?))
    }

    fn command_handler(self: Arc<Self>) -> Option<Arc<dyn CommandHandler>> {
        Some(self)
    }
}

impl HttpCaller for Google {
    fn http_client(&self) -> &reqwest::Client {
        &self.client
    }
}

#[async_trait]
impl CommandHandler for Google {
    fn commands(&self) -> &[&'static str] {
        &["g", "gis", "yt"]
    }

    async fn handle_command(
        &self,
        ctx: &Context,
        invocation: Invocation<'_>,
    ) -> Result<(), CommandError> {
        let query = invocation.args.raw().trim();

        if query.is_empty() {
            ctx.private_reply("I can't search for nothing!")?;

            return Ok(());
        }

        match invocation.name {
            "yt" => self.youtube(ctx, query).await,
            "gis" => self.google(ctx, query, true).await,
            _ => self.google(ctx, query, false).await,
        }
    }
}

impl Google {
    /// Creates a new plugin using the given HTTP client.
    #[must_use]
    pub fn with_client(client: reqwest::Client, config: GoogleConfig) -> Self {
        Google { client, config }
    }

    /// Returns the result items of a search, or `None` if the API couldn't be reached.
    async fn items(
        &self,
        url: &str,
        options: RequestOptions,
    ) -> Result<Option<Vec<Value>>, CogwheelError> {
        let Some(response) = self.http_call("get", url, options).await? else {
            return Ok(None);
        };

        let items = response
            .get("items")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();

        Ok(Some(items))
    }

    async fn google(&self, ctx: &Context, query: &str, images: bool) -> Result<(), CommandError> {
        let mut options = RequestOptions::new()
            .query("cx", &self.config.cse_id)
            .query("q", query)
            .query("key", &self.config.dev_key);

        if images {
            options = options.query("searchType", "image");
        }

        debug!(%query, %images, "searching google");

        let Some(items) = self.items(&self.config.google_url, options).await? else {
            ctx.private_reply("I had an issue processing Google's response... try again later!")?;

            return Ok(());
        };

        if items.is_empty() {
            ctx.private_reply(&format!("No search results found for: {query}"))?;

            return Ok(());
        }

        if images {
            let link = items[0]
                .get("link")
                .and_then(Value::as_str)
                .ok_or_else(|| CommandError::other(Error::MissingLink))?;

            ctx.tagged_reply(link)?;

            return Ok(());
        }

        for item in items.iter().take(self.config.responses_max) {
            let Some(link) = item.get("link").and_then(Value::as_str) else {
                continue;
            };
            let snippet = item
                .get("snippet")
                .and_then(Value::as_str)
                .unwrap_or("<Details Unknown>")
                .replace('\n', "");

            ctx.tagged_reply(&format!("{link} - {snippet}"))?;
        }

        Ok(())
    }

    async fn youtube(&self, ctx: &Context, query: &str) -> Result<(), CommandError> {
        let options = RequestOptions::new()
            .query("part", "id")
            .query("maxResults", "1")
            .query("q", query)
            .query("key", &self.config.dev_key)
            .query("type", "video");

        let Some(items) = self.items(&self.config.youtube_url, options).await? else {
            ctx.private_reply("I had an issue processing YouTube's response... try again later!")?;

            return Ok(());
        };

        let Some(item) = items.first() else {
            ctx.private_reply(&format!("No video results found for: {query}"))?;

            return Ok(());
        };

        let video_id = item
            .pointer("/id/videoId")
            .and_then(Value::as_str)
            .ok_or_else(|| CommandError::other(Error::MissingVideoId))?;

        ctx.tagged_reply(&format!("https://youtu.be/{video_id}"))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::testing::serve_once;
    use crate::transport::testing::RecordingTransport;

    fn google(url: &str) -> Google {
        Google::with_client(
            crate::http::build_client(),
            GoogleConfig {
                cse_id: "cse".to_string(),
                dev_key: "key".to_string(),
                responses_max: 2,
                google_url: url.to_string(),
                youtube_url: url.to_string(),
            },
        )
    }

    async fn run(
        google: &Google,
        transport: &Arc<RecordingTransport>,
        input: &str,
    ) -> Result<(), CommandError> {
        let ctx = Context::new("bob", "#rust", input, "cogwheel", transport.clone());
        let invocation = Invocation::parse(".", input).unwrap();

        google.handle_command(&ctx, invocation).await
    }

    #[tokio::test]
    async fn it_should_reply_with_top_results() {
        let (url, request) = serve_once(
            r#"{"items":[
                {"link":"https://rust-lang.org","snippet":"A language\nempowering everyone"},
                {"link":"https://crates.io"},
                {"link":"https://docs.rs","snippet":"ignored"}
            ]}"#,
        )
        .await;
        let transport = Arc::new(RecordingTransport::default());

        run(&google(&url), &transport, ".g rust").await.unwrap();

        assert_eq!(
            transport.sent_to("#rust"),
            vec![
                "bob: https://rust-lang.org - A languageempowering everyone",
                "bob: https://crates.io - <Details Unknown>",
            ]
        );
        assert!(request.await.unwrap().contains("q=rust"));
    }

    #[tokio::test]
    async fn it_should_refuse_empty_queries() {
        let transport = Arc::new(RecordingTransport::default());

        run(&google("http://127.0.0.1:1/"), &transport, ".g  ")
            .await
            .unwrap();

        assert_eq!(transport.sent_to("bob"), vec!["I can't search for nothing!"]);
    }

    #[tokio::test]
    async fn it_should_apologize_when_the_api_is_down() {
        let transport = Arc::new(RecordingTransport::default());

        run(&google("http://127.0.0.1:1/"), &transport, ".gis cats")
            .await
            .unwrap();

        assert_eq!(
            transport.sent_to("bob"),
            vec!["I had an issue processing Google's response... try again later!"]
        );
    }

    #[tokio::test]
    async fn it_should_link_youtube_videos() {
        let (url, _) = serve_once(r#"{"items":[{"id":{"videoId":"dQw4w9WgXcQ"}}]}"#).await;
        let transport = Arc::new(RecordingTransport::default());

        run(&google(&url), &transport, ".yt never gonna").await.unwrap();

        assert_eq!(
            transport.sent_to("#rust"),
            vec!["bob: https://youtu.be/dQw4w9WgXcQ"]
        );
    }

    #[tokio::test]
    async fn it_should_fail_on_malformed_videos() {
        let (url, _) = serve_once(r#"{"items":[{"id":{}}]}"#).await;
        let transport = Arc::new(RecordingTransport::default());

        let result = run(&google(&url), &transport, ".yt nothing").await;

        assert!(matches!(result, Err(CommandError::Other(_))));
    }
}
