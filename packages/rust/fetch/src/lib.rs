//! Single-shot HTTP artifact retrieval.
//!
//! [`ArtifactFetcher`] performs one `GET` per call and returns the raw body.
//! There are no retries and no request timeout: a hung upstream blocks the
//! caller, which must layer its own timeout if it needs one.

use bytes::Bytes;
use reqwest::Client;
use rnws_shared::{Result, RnwsError};
use tracing::{debug, instrument};

/// Maximum number of redirects to follow.
const MAX_REDIRECTS: usize = 3;

/// Error bodies longer than this are truncated in [`RnwsError::Fetch`].
const MAX_ERROR_BODY: usize = 4096;

/// User-Agent string for artifact requests.
const USER_AGENT: &str = concat!("rnws/", env!("CARGO_PKG_VERSION"));

/// Fetches compiled artifacts (bundles, runtime code) over HTTP.
///
/// Cheap to clone; clones share one connection pool.
#[derive(Debug, Clone)]
pub struct ArtifactFetcher {
    client: Client,
}

impl ArtifactFetcher {
    /// Build a fetcher with its own HTTP client.
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .redirect(reqwest::redirect::Policy::limited(MAX_REDIRECTS))
            .build()
            .map_err(|e| RnwsError::transport("", format!("failed to build HTTP client: {e}")))?;

        Ok(Self { client })
    }

    /// `GET url` and return the body. Non-2xx responses fail with the status
    /// and (truncated) body attached.
    #[instrument(skip(self))]
    pub async fn fetch(&self, url: &str) -> Result<Bytes> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| RnwsError::transport(url, e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RnwsError::http_status(
                url,
                status.as_u16(),
                truncate(body, MAX_ERROR_BODY),
            ));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| RnwsError::transport(url, format!("failed to read body: {e}")))?;

        debug!(bytes = body.len(), "artifact fetched");
        Ok(body)
    }
}

fn truncate(mut body: String, max: usize) -> String {
    if body.len() > max {
        let mut cut = max;
        while !body.is_char_boundary(cut) {
            cut -= 1;
        }
        body.truncate(cut);
    }
    body
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fetch_returns_body_bytes() {
        let server = wiremock::MockServer::start().await;

        wiremock::Mock::given(wiremock::matchers::method("GET"))
            .and(wiremock::matchers::path("/index.ios.bundle"))
            .respond_with(
                wiremock::ResponseTemplate::new(200).set_body_bytes(b"__d('app');".to_vec()),
            )
            .expect(1)
            .mount(&server)
            .await;

        let fetcher = ArtifactFetcher::new().unwrap();
        let body = fetcher
            .fetch(&format!("{}/index.ios.bundle", server.uri()))
            .await
            .unwrap();

        assert_eq!(&body[..], b"__d('app');");
    }

    #[tokio::test]
    async fn non_success_carries_status_and_body() {
        let server = wiremock::MockServer::start().await;

        wiremock::Mock::given(wiremock::matchers::path("/index.android.bundle"))
            .respond_with(
                wiremock::ResponseTemplate::new(500)
                    .set_body_string("SyntaxError: index.android.js"),
            )
            .expect(1)
            .mount(&server)
            .await;

        let fetcher = ArtifactFetcher::new().unwrap();
        let err = fetcher
            .fetch(&format!("{}/index.android.bundle", server.uri()))
            .await
            .unwrap_err();

        match err {
            RnwsError::Fetch { status, body, .. } => {
                assert_eq!(status, Some(500));
                assert_eq!(body.as_deref(), Some("SyntaxError: index.android.js"));
            }
            other => panic!("expected fetch error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn transport_failure_has_no_status() {
        // Bind then drop a listener so the port is known to be closed.
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let fetcher = ArtifactFetcher::new().unwrap();
        let err = fetcher
            .fetch(&format!("http://127.0.0.1:{port}/index.ios.bundle"))
            .await
            .unwrap_err();

        assert!(matches!(err, RnwsError::Fetch { status: None, .. }));
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate("héllo".to_string(), 2), "h");
        assert_eq!(truncate("short".to_string(), 100), "short");
    }
}
