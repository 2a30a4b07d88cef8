//! Feed client.
//!
//! Fetches the earthquake list and the county topology over HTTP.
//! Uses reqwest with rustls for TLS.

use std::time::Duration;

use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, Response};
use tracing::{debug, instrument};

use crate::errors::QuakemapError;
use crate::models::{EarthquakeEvent, EarthquakeFeed};
use crate::token::TokenProvider;
use crate::topology::{self, CountyFeature};

/// Default request timeout in seconds.
const REQUEST_TIMEOUT_SECS: u64 = 10;

/// User agent string for API requests.
const USER_AGENT: &str = concat!("quakemap/", env!("CARGO_PKG_VERSION"));

/// Header carrying the access token.
pub const TOKEN_HEADER: &str = "X-CSRFToken";

/// Default API host for the earthquake feed.
pub const DEFAULT_API_HOST: &str = "https://api.lcwei.site";

/// Client for the earthquake feed and the boundary topology.
#[derive(Debug, Clone)]
pub struct QuakeClient {
    client: Client,
    api_host: String,
    map_base: String,
    region: String,
}

impl QuakeClient {
    /// Create a new client.
    ///
    /// `api_host` serves `/api/earthquake_data`, `map_base` serves
    /// `/static/json/{region}.json`.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be initialized.
    pub fn new(
        api_host: impl Into<String>,
        map_base: impl Into<String>,
        region: impl Into<String>,
    ) -> Result<Self, QuakemapError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .user_agent(USER_AGENT)
            .build()?;

        Ok(Self {
            client,
            api_host: trim_base(api_host.into()),
            map_base: trim_base(map_base.into()),
            region: region.into(),
        })
    }

    /// Underlying HTTP client, for sharing with token providers.
    #[must_use]
    pub fn http(&self) -> &Client {
        &self.client
    }

    #[must_use]
    pub fn region(&self) -> &str {
        &self.region
    }

    /// Fetch the earthquake list, acquiring a fresh token first.
    ///
    /// # Errors
    ///
    /// Returns an error if the token cannot be acquired, the request fails,
    /// or the response cannot be parsed.
    #[instrument(skip_all)]
    pub async fn fetch_earthquakes<T: TokenProvider>(
        &self,
        tokens: &T,
    ) -> Result<Vec<EarthquakeEvent>, QuakemapError> {
        let token = tokens.token().await?;
        let url = format!("{}/api/earthquake_data", self.api_host);

        debug!("fetching earthquakes from {}", url);

        let response = self
            .client
            .get(&url)
            .header(CONTENT_TYPE, "application/json")
            .header(TOKEN_HEADER, token)
            .send()
            .await?;

        let feed: EarthquakeFeed = check_status(response).await?.json().await?;

        debug!("fetched {} earthquakes", feed.earthquakes.len());
        Ok(feed.earthquakes)
    }

    /// Fetch and decode the county topology.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the topology cannot be decoded.
    #[instrument(skip(self), fields(region = %self.region))]
    pub async fn fetch_topology(&self) -> Result<Vec<CountyFeature>, QuakemapError> {
        let url = format!("{}/static/json/{}.json", self.map_base, self.region);

        debug!("fetching topology from {}", url);

        let text = check_status(self.client.get(&url).send().await?)
            .await?
            .text()
            .await?;
        topology::parse_counties(&text, &self.region)
    }

    /// Fetch both feeds concurrently; fails as a whole if either fails.
    ///
    /// # Errors
    ///
    /// Returns the first error of either request.
    pub async fn load_data<T: TokenProvider>(
        &self,
        tokens: &T,
    ) -> Result<(Vec<EarthquakeEvent>, Vec<CountyFeature>), QuakemapError> {
        tokio::try_join!(self.fetch_earthquakes(tokens), self.fetch_topology())
    }
}

/// Check status before parsing.
async fn check_status(response: Response) -> Result<Response, QuakemapError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(QuakemapError::Api {
        status: status.as_u16(),
        message: body,
    })
}

fn trim_base(mut base: String) -> String {
    while base.ends_with('/') {
        base.pop();
    }
    base
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use axum::Router;
    use axum::http::{HeaderMap, StatusCode};
    use axum::response::IntoResponse;
    use axum::routing::get;

    use super::*;
    use crate::models::tests::SAMPLE_FEED;
    use crate::token::StaticToken;
    use crate::topology::tests::SAMPLE_TOPOLOGY;

    /// Counts token requests and fails when asked to.
    struct CountingToken {
        calls: AtomicUsize,
        fail: bool,
    }

    impl TokenProvider for CountingToken {
        async fn token(&self) -> Result<String, QuakemapError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err(QuakemapError::Token("collaborator unavailable".into()))
            } else {
                Ok(format!("token-{n}"))
            }
        }
    }

    async fn serve(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("addr");
        tokio::spawn(async move { axum::serve(listener, app).await });
        format!("http://{addr}")
    }

    fn feed_app(seen_tokens: Arc<std::sync::Mutex<Vec<String>>>) -> Router {
        Router::new()
            .route(
                "/api/earthquake_data",
                get(move |headers: HeaderMap| {
                    let seen = Arc::clone(&seen_tokens);
                    async move {
                        let token = headers
                            .get(TOKEN_HEADER)
                            .and_then(|v| v.to_str().ok())
                            .unwrap_or_default()
                            .to_string();
                        seen.lock().expect("lock").push(token);
                        ([(CONTENT_TYPE, "application/json")], SAMPLE_FEED)
                    }
                }),
            )
            .route("/static/json/Taiwan.json", get(|| async { SAMPLE_TOPOLOGY }))
    }

    #[tokio::test]
    async fn test_load_data() {
        let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
        let base = serve(feed_app(Arc::clone(&seen))).await;
        let client = QuakeClient::new(&base, format!("{base}/"), "Taiwan").expect("client");

        let (events, counties) = client
            .load_data(&StaticToken("secret".into()))
            .await
            .expect("load");

        assert_eq!(events.len(), 1);
        assert_eq!(counties.len(), 2);
        assert_eq!(*seen.lock().expect("lock"), vec!["secret".to_string()]);
    }

    #[tokio::test]
    async fn test_token_acquired_every_call() {
        let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
        let base = serve(feed_app(Arc::clone(&seen))).await;
        let client = QuakeClient::new(&base, &base, "Taiwan").expect("client");
        let tokens = CountingToken { calls: AtomicUsize::new(0), fail: false };

        client.load_data(&tokens).await.expect("first");
        client.load_data(&tokens).await.expect("second");

        assert_eq!(tokens.calls.load(Ordering::SeqCst), 2);
        assert_eq!(*seen.lock().expect("lock"), vec!["token-0".to_string(), "token-1".to_string()]);
    }

    #[tokio::test]
    async fn test_token_failure_propagates() {
        let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
        let base = serve(feed_app(Arc::clone(&seen))).await;
        let client = QuakeClient::new(&base, &base, "Taiwan").expect("client");
        let tokens = CountingToken { calls: AtomicUsize::new(0), fail: true };

        let err = client.load_data(&tokens).await.expect_err("token failure");
        assert!(matches!(err, QuakemapError::Token(_)));
        assert!(seen.lock().expect("lock").is_empty());
    }

    #[tokio::test]
    async fn test_non_success_on_either_feed_fails() {
        let app = Router::new()
            .route("/api/earthquake_data", get(|| async { SAMPLE_FEED }))
            .route(
                "/static/json/Taiwan.json",
                get(|| async { (StatusCode::NOT_FOUND, "missing").into_response() }),
            );
        let base = serve(app).await;
        let client = QuakeClient::new(&base, &base, "Taiwan").expect("client");

        let err = client
            .load_data(&StaticToken("t".into()))
            .await
            .expect_err("topology 404");
        assert!(matches!(err, QuakemapError::Api { status: 404, .. }));

        let app = Router::new()
            .route(
                "/api/earthquake_data",
                get(|| async { StatusCode::INTERNAL_SERVER_ERROR }),
            )
            .route("/static/json/Taiwan.json", get(|| async { SAMPLE_TOPOLOGY }));
        let base = serve(app).await;
        let client = QuakeClient::new(&base, &base, "Taiwan").expect("client");

        let err = client
            .load_data(&StaticToken("t".into()))
            .await
            .expect_err("feed 500");
        assert!(matches!(err, QuakemapError::Api { status: 500, .. }));
    }
}
