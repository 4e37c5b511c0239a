use bytes::Bytes;
use futures::future::{BoxFuture, FutureExt};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::Client;
use url::Url;

use crate::error::{ConfigError, LookupError};
use crate::model::GameId;

pub const DEFAULT_ENDPOINT: &str = "https://boardgamegeek.com/xmlapi2/thing";

const USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));

/// One outbound fetch per call, returning the raw response body.
///
/// Implementations must not retry or cache; a failure is reported as
/// [`LookupError::NetworkError`] and becomes the task's terminal outcome.
pub trait Transport: Send + Sync {
    fn fetch<'a>(&'a self, id: &'a GameId) -> BoxFuture<'a, Result<Bytes, LookupError>>;
}

#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
    endpoint: Url,
}

impl HttpTransport {
    pub fn new(endpoint: Url, api_token: Option<&str>) -> Result<Self, ConfigError> {
        let mut headers = HeaderMap::new();
        if let Some(token) = api_token {
            let mut value = HeaderValue::from_str(&format!("Bearer {token}")).map_err(|_| {
                ConfigError::invalid_value("api_token", "not a valid header value")
            })?;
            value.set_sensitive(true);
            headers.insert(AUTHORIZATION, value);
        }

        let client = Client::builder()
            .user_agent(USER_AGENT)
            .default_headers(headers)
            .build()?;

        Ok(Self { client, endpoint })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// `<endpoint>?id=<id>`, keeping any query pairs already on the endpoint.
    pub fn request_url(&self, id: &GameId) -> Url {
        let mut url = self.endpoint.clone();
        url.query_pairs_mut().append_pair("id", id.as_str());
        url
    }

    async fn get(&self, id: &GameId) -> Result<Bytes, LookupError> {
        let url = self.request_url(id);
        tracing::trace!(%url, "requesting game");

        let response = self.client.get(url.clone()).send().await?;
        if !response.status().is_success() {
            return Err(LookupError::NetworkError(format!(
                "HTTP {} for {url}",
                response.status().as_u16()
            )));
        }

        response
            .bytes()
            .await
            .map_err(|e| LookupError::NetworkError(format!("failed to read body: {e}")))
    }
}

impl Transport for HttpTransport {
    fn fetch<'a>(&'a self, id: &'a GameId) -> BoxFuture<'a, Result<Bytes, LookupError>> {
        self.get(id).boxed()
    }
}
