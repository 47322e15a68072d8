//! HTTP features

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, warn};

use crate::Error;

mod client {
    use crate::consts;

    pub use reqwest::Client;

    /// Returns a default HTTP client.
    ///
    /// # Panics
    ///
    /// Panics if the default HTTP client fails to build.
    #[must_use]
    pub fn build() -> Client {
        builder().build().expect("could not build http client")
    }

    /// Returns a default HTTP client builder.
    pub fn builder() -> reqwest::ClientBuilder {
        reqwest::ClientBuilder::new()
            .redirect(reqwest::redirect::Policy::limited(5))
            .timeout(consts::HTTP_TIMEOUT)
            .user_agent(consts::HTTP_USER_AGENT)
    }
}

/// Builds a default HTTP client.
///
/// This is equivalent to calling [`client::build`].
#[must_use]
pub fn build_client() -> client::Client {
    client::build()
}

/// HTTP methods that can be used with [`HttpCaller::http_call`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum Method {
    Get,
    Post,
    Put,
    Patch,
    Delete,
    Head,
}

impl FromStr for Method {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "get" => Ok(Method::Get),
            "post" => Ok(Method::Post),
            "put" => Ok(Method::Put),
            "patch" => Ok(Method::Patch),
            "delete" => Ok(Method::Delete),
            "head" => Ok(Method::Head),
            _ => Err(Error::UnsupportedMethod(s.to_string())),
        }
    }
}

impl From<Method> for reqwest::Method {
    fn from(method: Method) -> Self {
        match method {
            Method::Get => reqwest::Method::GET,
            Method::Post => reqwest::Method::POST,
            Method::Put => reqwest::Method::PUT,
            Method::Patch => reqwest::Method::PATCH,
            Method::Delete => reqwest::Method::DELETE,
            Method::Head => reqwest::Method::HEAD,
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", reqwest::Method::from(*self))
    }
}

/// Extra parts of a request.
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    /// Query string parameters.
    pub query: Vec<(String, String)>,
    /// Request headers.
    pub headers: Vec<(String, String)>,
    /// A JSON request body.
    pub json: Option<Value>,
}

impl RequestOptions {
    /// Returns empty request options.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a query string parameter.
    #[must_use]
    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    /// Adds a request header.
    #[must_use]
    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((key.into(), value.into()));
        self
    }

    /// Sets the JSON request body.
    #[must_use]
    pub fn json(mut self, body: Value) -> Self {
        self.json = Some(body);
        self
    }
}

/// Capability for plugins that talk to HTTP APIs.
#[async_trait]
pub trait HttpCaller: Send + Sync {
    /// Returns the HTTP client used for calls.
    fn http_client(&self) -> &reqwest::Client;

    /// Makes an HTTP request and parses the response body as JSON.
    ///
    /// Transport failures are logged and reported as `Ok(None)`, so callers must be prepared to
    /// apologize to the user rather than assume a response.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnsupportedMethod`] if `method` isn't a known HTTP method.
    async fn http_call(
        &self,
        method: &str,
        url: &str,
        options: RequestOptions,
    ) -> Result<Option<Value>, Error> {
        call(self.http_client(), method, url, options).await
    }
}

/// Makes an HTTP request with `client`. See [`HttpCaller::http_call`].
///
/// # Errors
///
/// Returns [`Error::UnsupportedMethod`] if `method` isn't a known HTTP method.
pub async fn call(
    client: &reqwest::Client,
    method: &str,
    url: &str,
    options: RequestOptions,
) -> Result<Option<Value>, Error> {
    let method: Method = method.parse()?;

    debug!(%method, %url, "making http call");

    let mut request = client.request(method.into(), url).query(&options.query);

    for (key, value) in &options.headers {
        request = request.header(key, value);
    }

    if let Some(ref body) = options.json {
        request = request.json(body);
    }

    let response = match request.send().await {
        Ok(response) => response,
        Err(err) => {
            warn!(%method, %url, %err, "http call failed");

            return Ok(None);
        }
    };

    let status = response.status();
    let body = match response.bytes().await {
        Ok(body) => body,
        Err(err) => {
            warn!(%method, %url, %err, "could not read http response");

            return Ok(None);
        }
    };

    if body.is_empty() {
        debug!(%status, "received empty http response");

        return Ok(Some(Value::Null));
    }

    match serde_json::from_slice(&body) {
        Ok(value) => {
            debug!(%status, ?value, "received http response");

            Ok(Some(value))
        }
        Err(err) => {
            warn!(%method, %url, %status, %err, "http response is not json");

            Ok(None)
        }
    }
}
