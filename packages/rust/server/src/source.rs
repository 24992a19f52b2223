//! Bundle sources: where the bytes behind `/<entry>.bundle` come from.

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use rnws_fetch::ArtifactFetcher;
use rnws_shared::{Platform, Result, RnwsError, RuntimeConfig, ServerConfig};
use tracing::{debug, instrument};

/// A request for one entry's bundle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BundleRequest {
    /// Configured entry name (e.g., `index.ios`).
    pub entry: String,
    /// Target platform, from the query string or the entry suffix.
    pub platform: Option<Platform>,
    pub dev: bool,
    pub minify: bool,
}

/// Produces compiled bundle content for an entry.
///
/// The build server only talks to this trait, so tests can serve fixed
/// content without any packager or bundler running.
#[async_trait]
pub trait BundleSource: Send + Sync {
    async fn bundle(&self, request: &BundleRequest) -> Result<Bytes>;
}

/// Stitches the packager's runtime bundle and the bundler's app bundle.
///
/// - runtime: `http://{host}:{packager_port}{runtime.bundle_path}?platform=..&dev=..&minify=..`
/// - app: `http://{host}:{bundler_port}/{entry}.js`
///
/// The runtime part is skipped when no runtime path is configured or the
/// request carries no platform.
#[derive(Debug, Clone)]
pub struct UpstreamBundleSource {
    fetcher: ArtifactFetcher,
    hostname: String,
    packager_port: u16,
    bundler_port: u16,
    runtime: RuntimeConfig,
}

impl UpstreamBundleSource {
    pub fn new(config: &ServerConfig, fetcher: ArtifactFetcher) -> Self {
        Self {
            fetcher,
            hostname: config.hostname.clone(),
            packager_port: config.packager_port,
            bundler_port: config.bundler_port,
            runtime: config.project.runtime.clone(),
        }
    }

    fn runtime_url(&self, request: &BundleRequest) -> Option<String> {
        if self.runtime.bundle_path.is_empty() {
            return None;
        }
        let platform = request.platform?;
        Some(format!(
            "http://{}:{}{}?platform={platform}&dev={}&minify={}",
            self.hostname, self.packager_port, self.runtime.bundle_path, request.dev, request.minify
        ))
    }

    fn app_url(&self, request: &BundleRequest) -> String {
        format!(
            "http://{}:{}/{}.js",
            self.hostname, self.bundler_port, request.entry
        )
    }
}

#[async_trait]
impl BundleSource for UpstreamBundleSource {
    #[instrument(skip_all, fields(entry = %request.entry, platform = ?request.platform))]
    async fn bundle(&self, request: &BundleRequest) -> Result<Bytes> {
        let runtime_url = self.runtime_url(request);
        let app_url = self.app_url(request);

        let runtime = async {
            match &runtime_url {
                Some(url) => self.fetcher.fetch(url).await.map(Some),
                None => Ok(None),
            }
        };

        // Runtime and app code come from different processes; fetch both at once
        let (runtime, app) = tokio::join!(runtime, self.fetcher.fetch(&app_url));

        let runtime = runtime.map_err(|e| upstream_error(&request.entry, "packager", e))?;
        let app = app.map_err(|e| upstream_error(&request.entry, "bundler", e))?;

        let Some(runtime) = runtime else {
            debug!(bytes = app.len(), "serving app bundle without runtime");
            return Ok(app);
        };

        let mut combined = BytesMut::with_capacity(runtime.len() + app.len() + 1);
        combined.extend_from_slice(&runtime);
        combined.extend_from_slice(b"\n");
        combined.extend_from_slice(&app);

        debug!(
            runtime_bytes = runtime.len(),
            app_bytes = app.len(),
            "bundle assembled"
        );
        Ok(combined.freeze())
    }
}

fn upstream_error(entry: &str, tool: &str, err: RnwsError) -> RnwsError {
    let detail = match &err {
        RnwsError::Fetch {
            body: Some(body), ..
        } if !body.is_empty() => format!("{err}\n{body}"),
        _ => err.to_string(),
    };
    RnwsError::bundle(entry, format!("{tool} failed: {detail}"))
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use rnws_shared::{BundlerConfig, ProjectConfig};

    use super::*;

    fn config_for(packager_port: u16, bundler_port: u16) -> ServerConfig {
        ServerConfig {
            hostname: "127.0.0.1".into(),
            port: 0,
            packager_port,
            bundler_port,
            entries: vec!["index.ios".into(), "index.android".into()],
            hot: false,
            bundler: BundlerConfig {
                config_path: PathBuf::from("webpack.config.js"),
            },
            project_root: PathBuf::from("."),
            project: ProjectConfig::without_tools(),
        }
    }

    fn ios_request() -> BundleRequest {
        BundleRequest {
            entry: "index.ios".into(),
            platform: Some(Platform::Ios),
            dev: true,
            minify: false,
        }
    }

    #[tokio::test]
    async fn combines_runtime_and_app_bundles() {
        let packager = wiremock::MockServer::start().await;
        let bundler = wiremock::MockServer::start().await;

        wiremock::Mock::given(wiremock::matchers::path(
            "/node_modules/react-native/Libraries/react-native/react-native.bundle",
        ))
        .and(wiremock::matchers::query_param("platform", "ios"))
        .and(wiremock::matchers::query_param("dev", "true"))
        .respond_with(wiremock::ResponseTemplate::new(200).set_body_string("var React;"))
        .expect(1)
        .mount(&packager)
        .await;

        wiremock::Mock::given(wiremock::matchers::path("/index.ios.js"))
            .respond_with(wiremock::ResponseTemplate::new(200).set_body_string("render(App);"))
            .expect(1)
            .mount(&bundler)
            .await;

        let config = config_for(packager.address().port(), bundler.address().port());
        let source = UpstreamBundleSource::new(&config, ArtifactFetcher::new().unwrap());

        let body = source.bundle(&ios_request()).await.unwrap();
        assert_eq!(&body[..], b"var React;\nrender(App);");
    }

    #[tokio::test]
    async fn skips_runtime_without_platform() {
        let bundler = wiremock::MockServer::start().await;

        wiremock::Mock::given(wiremock::matchers::path("/main.js"))
            .respond_with(wiremock::ResponseTemplate::new(200).set_body_string("main();"))
            .mount(&bundler)
            .await;

        // Packager port points nowhere; it must not be contacted
        let config = config_for(1, bundler.address().port());
        let source = UpstreamBundleSource::new(&config, ArtifactFetcher::new().unwrap());

        let request = BundleRequest {
            entry: "main".into(),
            platform: None,
            dev: true,
            minify: false,
        };
        let body = source.bundle(&request).await.unwrap();
        assert_eq!(&body[..], b"main();");
    }

    #[tokio::test]
    async fn bundler_failure_names_tool_and_entry() {
        let packager = wiremock::MockServer::start().await;
        let bundler = wiremock::MockServer::start().await;

        wiremock::Mock::given(wiremock::matchers::method("GET"))
            .respond_with(wiremock::ResponseTemplate::new(200).set_body_string("var React;"))
            .mount(&packager)
            .await;

        wiremock::Mock::given(wiremock::matchers::path("/index.ios.js"))
            .respond_with(
                wiremock::ResponseTemplate::new(500).set_body_string("Module not found: ./App"),
            )
            .mount(&bundler)
            .await;

        let config = config_for(packager.address().port(), bundler.address().port());
        let source = UpstreamBundleSource::new(&config, ArtifactFetcher::new().unwrap());

        let err = source.bundle(&ios_request()).await.unwrap_err();
        match err {
            RnwsError::Bundle { entry, message } => {
                assert_eq!(entry, "index.ios");
                assert!(message.starts_with("bundler failed"));
                assert!(message.contains("Module not found: ./App"));
            }
            other => panic!("expected bundle error, got {other:?}"),
        }
    }
}
