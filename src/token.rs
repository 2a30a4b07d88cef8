//! Access token providers.
//!
//! The earthquake feed wants a short-lived token on every request. Issuing
//! tokens is someone else's job; this module only knows how to ask.

use std::future::Future;

use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, instrument};

use crate::errors::QuakemapError;

/// Supplies a fresh token for each feed request.
pub trait TokenProvider: Send + Sync {
    /// Acquire a token. Called once per refresh cycle; never cached.
    fn token(&self) -> impl Future<Output = Result<String, QuakemapError>> + Send;
}

/// A fixed token given on the command line.
#[derive(Debug, Clone)]
pub struct StaticToken(pub String);

impl TokenProvider for StaticToken {
    async fn token(&self) -> Result<String, QuakemapError> {
        Ok(self.0.clone())
    }
}

/// Body returned by a token endpoint.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    #[serde(rename = "csrfToken")]
    csrf_token: String,
}

/// Fetches a token from an HTTP endpoint on every call.
#[derive(Debug, Clone)]
pub struct EndpointToken {
    client: Client,
    url: String,
}

impl EndpointToken {
    #[must_use]
    pub fn new(client: Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }
}

impl TokenProvider for EndpointToken {
    #[instrument(skip(self), fields(url = %self.url))]
    async fn token(&self) -> Result<String, QuakemapError> {
        debug!("requesting token");
        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(|e| QuakemapError::Token(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(QuakemapError::Token(format!("token endpoint returned HTTP {}", status.as_u16())));
        }

        let body: TokenResponse = response
            .json()
            .await
            .map_err(|e| QuakemapError::Token(e.to_string()))?;
        Ok(body.csrf_token)
    }
}

/// Either provider, chosen from the command line.
#[derive(Debug, Clone)]
pub enum AnyToken {
    Static(StaticToken),
    Endpoint(EndpointToken),
}

impl TokenProvider for AnyToken {
    async fn token(&self) -> Result<String, QuakemapError> {
        match self {
            Self::Static(p) => p.token().await,
            Self::Endpoint(p) => p.token().await,
        }
    }
}

/// Where tokens come from, as chosen on the command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenSource {
    /// Send this token as is
    Fixed(String),
    /// Ask this endpoint before every request
    Endpoint(String),
}

impl TokenSource {
    /// Build the provider, sharing the feed client's connection pool.
    #[must_use]
    pub fn into_provider(self, client: &Client) -> AnyToken {
        match self {
            Self::Fixed(token) => AnyToken::Static(StaticToken(token)),
            Self::Endpoint(url) => AnyToken::Endpoint(EndpointToken::new(client.clone(), url)),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use axum::Router;
    use axum::http::StatusCode;
    use axum::routing::get;

    use super::*;

    async fn serve(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("addr");
        tokio::spawn(async move { axum::serve(listener, app).await });
        format!("http://{addr}")
    }

    #[tokio::test]
    async fn test_static_token() {
        let token = StaticToken("abc".into()).token().await.expect("token");
        assert_eq!(token, "abc");
    }

    #[tokio::test]
    async fn test_endpoint_token_is_fetched_every_call() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let app = Router::new().route(
            "/api/csrf_token",
            get(move || {
                let n = counter.fetch_add(1, Ordering::SeqCst);
                async move { axum::Json(serde_json::json!({ "csrfToken": format!("t{n}") })) }
            }),
        );
        let base = serve(app).await;
        let provider = EndpointToken::new(Client::new(), format!("{base}/api/csrf_token"));

        assert_eq!(provider.token().await.expect("first"), "t0");
        assert_eq!(provider.token().await.expect("second"), "t1");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_endpoint_failure_is_token_error() {
        let app = Router::new().route("/api/csrf_token", get(|| async { StatusCode::FORBIDDEN }));
        let base = serve(app).await;
        let provider = EndpointToken::new(Client::new(), format!("{base}/api/csrf_token"));

        let err = provider.token().await.expect_err("403");
        assert!(matches!(err, QuakemapError::Token(_)));
    }
}
