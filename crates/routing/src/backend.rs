//! Route navigation backend.

use std::fmt;
use std::path::PathBuf;

use formats::geojson::FeatureCollection;
use formats::wire::RouteRequest;
use streaming::backend::{BackendError, BoxFuture};
use streaming::http::read_json;
use tracing::debug;

/// Why a route could not be turned into a path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteError {
    Backend(BackendError),
    /// The response parsed but carried no line geometry.
    EmptyGeometry,
}

impl fmt::Display for RouteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RouteError::Backend(e) => write!(f, "{e}"),
            RouteError::EmptyGeometry => write!(f, "route response missing coordinates"),
        }
    }
}

impl std::error::Error for RouteError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RouteError::Backend(e) => Some(e),
            RouteError::EmptyGeometry => None,
        }
    }
}

impl From<BackendError> for RouteError {
    fn from(e: BackendError) -> Self {
        RouteError::Backend(e)
    }
}

pub trait RouteBackend: Send + Sync {
    /// Asks the routing service for a path between the request endpoints.
    fn request_route(
        &self,
        request: RouteRequest,
    ) -> BoxFuture<'_, Result<FeatureCollection, BackendError>>;

    /// The bundled sample route, used when routing fails and as the
    /// reference overlay.
    fn load_fallback_route(&self) -> BoxFuture<'_, Result<FeatureCollection, BackendError>>;
}

/// Where the fallback route lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FallbackSource {
    File(PathBuf),
    Url(String),
}

impl FallbackSource {
    /// `http://` and `https://` locations are fetched, anything else is a
    /// local path.
    pub fn parse(location: &str) -> Self {
        if location.starts_with("http://") || location.starts_with("https://") {
            FallbackSource::Url(location.to_string())
        } else {
            FallbackSource::File(PathBuf::from(location))
        }
    }
}

#[derive(Debug, Clone)]
pub struct HttpRouteBackend {
    route_url: String,
    fallback: FallbackSource,
    client: reqwest::Client,
}

impl HttpRouteBackend {
    pub fn new(route_url: impl Into<String>, fallback: FallbackSource) -> Self {
        Self::with_client(route_url, fallback, reqwest::Client::new())
    }

    pub fn with_client(
        route_url: impl Into<String>,
        fallback: FallbackSource,
        client: reqwest::Client,
    ) -> Self {
        Self {
            route_url: route_url.into(),
            fallback,
            client,
        }
    }

    pub fn route_url(&self) -> &str {
        &self.route_url
    }

    pub fn fallback(&self) -> &FallbackSource {
        &self.fallback
    }
}

impl RouteBackend for HttpRouteBackend {
    fn request_route(
        &self,
        request: RouteRequest,
    ) -> BoxFuture<'_, Result<FeatureCollection, BackendError>> {
        Box::pin(async move {
            debug!(
                url = %self.route_url,
                start = %request.start,
                end = %request.end,
                features = request.geojson.len(),
                "posting route request"
            );
            let resp = self
                .client
                .post(&self.route_url)
                .json(&request)
                .send()
                .await
                .map_err(|e| BackendError::Transport(e.to_string()))?;
            read_json(resp).await
        })
    }

    fn load_fallback_route(&self) -> BoxFuture<'_, Result<FeatureCollection, BackendError>> {
        Box::pin(async move {
            match &self.fallback {
                FallbackSource::Url(url) => {
                    let resp = self
                        .client
                        .get(url)
                        .send()
                        .await
                        .map_err(|e| BackendError::Transport(e.to_string()))?;
                    read_json(resp).await
                }
                FallbackSource::File(path) => {
                    let text = tokio::fs::read_to_string(path).await.map_err(|e| {
                        if e.kind() == std::io::ErrorKind::NotFound {
                            BackendError::NotFound
                        } else {
                            BackendError::Transport(format!("{}: {e}", path.display()))
                        }
                    })?;
                    FeatureCollection::from_geojson_str(&text)
                        .map_err(|e| BackendError::Decode(e.to_string()))
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::{FallbackSource, HttpRouteBackend, RouteBackend};
    use std::path::PathBuf;
    use streaming::backend::BackendError;

    #[test]
    fn fallback_location_kind() {
        assert_eq!(
            FallbackSource::parse("https://example.org/route.geojson"),
            FallbackSource::Url("https://example.org/route.geojson".into())
        );
        assert_eq!(
            FallbackSource::parse("assets/hudson-bay.geojson"),
            FallbackSource::File(PathBuf::from("assets/hudson-bay.geojson"))
        );
    }

    #[tokio::test]
    async fn fallback_file_is_read_from_disk() {
        let path = std::env::temp_dir().join(format!("route-fallback-{}.geojson", std::process::id()));
        tokio::fs::write(
            &path,
            r#"{"type":"FeatureCollection","features":[{"type":"Feature","properties":{},
                "geometry":{"type":"LineString","coordinates":[[-80,60],[-79,61]]}}]}"#,
        )
        .await
        .unwrap();

        let backend = HttpRouteBackend::new("http://127.0.0.1:9/route", FallbackSource::File(path.clone()));
        let fc = backend.load_fallback_route().await.unwrap();
        assert_eq!(fc.first_line().map(|l| l.len()), Some(2));
        tokio::fs::remove_file(&path).await.unwrap();
    }

    #[tokio::test]
    async fn missing_fallback_file_is_not_found() {
        let backend = HttpRouteBackend::new(
            "http://127.0.0.1:9/route",
            FallbackSource::File(PathBuf::from("/nonexistent/route.geojson")),
        );
        assert_eq!(backend.load_fallback_route().await, Err(BackendError::NotFound));
    }
}
