//! Turns a completed marker pair into a route polyline.
//!
//! [`RouteRequestOrchestrator`] is the synchronous half: it decides whether a
//! request can be made, builds it, tracks the request status and rejects
//! late results. [`resolve_route`] is the asynchronous half that talks to the
//! backend and applies the fallback.

use std::fmt;

use formats::geojson::FeatureCollection;
use formats::wire::RouteRequest;
use foundation::geo::Position;
use foundation::handles::Generation;
use tracing::{debug, error, info, warn};

use crate::backend::{RouteBackend, RouteError};
use crate::markers::RouteTarget;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum RouteStatus {
    #[default]
    Idle,
    Requesting,
}

impl RouteStatus {
    pub fn is_requesting(self) -> bool {
        self == RouteStatus::Requesting
    }
}

impl fmt::Display for RouteStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RouteStatus::Idle => write!(f, "idle"),
            RouteStatus::Requesting => write!(f, "requesting"),
        }
    }
}

/// Which extent was sent as the routing payload.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum PayloadSource {
    Prediction,
    Observed,
}

impl fmt::Display for PayloadSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PayloadSource::Prediction => write!(f, "prediction"),
            PayloadSource::Observed => write!(f, "observed"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RouteJob {
    pub target: RouteTarget,
    pub request: RouteRequest,
    pub payload_source: PayloadSource,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RouteOutcome {
    Routed(Vec<Position>),
    /// Routing failed and the bundled route was used instead.
    Fallback(Vec<Position>),
    /// Routing and the fallback both failed.
    Unavailable,
}

impl RouteOutcome {
    pub fn into_coordinates(self) -> Option<Vec<Position>> {
        match self {
            RouteOutcome::Routed(coords) | RouteOutcome::Fallback(coords) => Some(coords),
            RouteOutcome::Unavailable => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RouteCompletion {
    pub target: RouteTarget,
    pub outcome: RouteOutcome,
}

#[derive(Debug, Default)]
pub struct RouteRequestOrchestrator {
    status: RouteStatus,
    pending: Option<Generation>,
    use_corridor: bool,
}

impl RouteRequestOrchestrator {
    pub fn new(use_corridor: bool) -> Self {
        Self {
            use_corridor,
            ..Self::default()
        }
    }

    pub fn status(&self) -> RouteStatus {
        self.status
    }

    pub fn pending(&self) -> Option<Generation> {
        self.pending
    }

    /// Builds the request for `target`.
    ///
    /// The predicted extent is preferred over the observed one. With neither
    /// available nothing is requested and the status is left alone.
    pub fn begin(
        &mut self,
        target: RouteTarget,
        prediction: Option<&FeatureCollection>,
        observed: Option<&FeatureCollection>,
    ) -> Option<RouteJob> {
        let (payload_source, geojson) = match (prediction, observed) {
            (Some(fc), _) => (PayloadSource::Prediction, fc),
            (None, Some(fc)) => (PayloadSource::Observed, fc),
            (None, None) => {
                warn!("no extent available for routing");
                return None;
            }
        };
        info!(payload = %payload_source, "routing");

        self.status = RouteStatus::Requesting;
        self.pending = Some(target.generation);
        Some(RouteJob {
            target,
            request: RouteRequest {
                start: target.start,
                end: target.end,
                geojson: geojson.clone(),
                use_corridor: self.use_corridor,
            },
            payload_source,
        })
    }

    /// Applies a settled request.
    ///
    /// Returns the coordinates to animate, or `None` when the outcome is
    /// unusable or belongs to a marker pair that no longer exists.
    pub fn finish(
        &mut self,
        completion: RouteCompletion,
        current: Generation,
    ) -> Option<Vec<Position>> {
        if self.pending == Some(completion.target.generation) {
            self.pending = None;
            self.status = RouteStatus::Idle;
        }
        if completion.target.generation != current {
            debug!(
                generation = completion.target.generation.get(),
                current = current.get(),
                "discarding route for superseded markers"
            );
            return None;
        }
        completion.outcome.into_coordinates()
    }
}

/// First line geometry of `fc`, which must hold at least one coordinate.
pub fn extract_route_line(fc: &FeatureCollection) -> Result<Vec<Position>, RouteError> {
    match fc.first_line() {
        Some(line) if !line.is_empty() => Ok(line.to_vec()),
        _ => Err(RouteError::EmptyGeometry),
    }
}

/// Requests the route, falling back to the bundled route on any failure.
///
/// Never fails: a fallback failure is logged and reported as
/// [`RouteOutcome::Unavailable`].
pub async fn resolve_route(backend: &dyn RouteBackend, job: RouteJob) -> RouteCompletion {
    let target = job.target;
    let routed = match backend.request_route(job.request).await {
        Ok(fc) => extract_route_line(&fc),
        Err(e) => Err(RouteError::Backend(e)),
    };

    let outcome = match routed {
        Ok(coords) => {
            debug!(coordinates = coords.len(), "route received");
            RouteOutcome::Routed(coords)
        }
        Err(err) => {
            warn!(%err, "route navigation failed, falling back to bundled route");
            let fallback = backend
                .load_fallback_route()
                .await
                .map_err(RouteError::from)
                .and_then(|fc| extract_route_line(&fc));
            match fallback {
                Ok(coords) => RouteOutcome::Fallback(coords),
                Err(err) => {
                    error!(%err, "fallback route load failed");
                    RouteOutcome::Unavailable
                }
            }
        }
    };
    RouteCompletion { target, outcome }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use super::{
        resolve_route, PayloadSource, RouteCompletion, RouteOutcome, RouteRequestOrchestrator,
        RouteStatus,
    };
    use crate::backend::RouteBackend;
    use crate::markers::{MarkerEffect, MarkerStateMachine, RouteTarget};
    use formats::geojson::FeatureCollection;
    use formats::wire::RouteRequest;
    use foundation::geo::Position;
    use foundation::handles::Generation;
    use pretty_assertions::assert_eq;
    use streaming::backend::{BackendError, BoxFuture};

    fn line(points: &[(f64, f64)]) -> FeatureCollection {
        FeatureCollection::line_string(points.iter().map(|&(x, y)| Position::new(x, y)).collect())
    }

    /// Scripted routing backend that records every request it receives.
    struct FakeRouteBackend {
        route: Result<FeatureCollection, BackendError>,
        fallback: Result<FeatureCollection, BackendError>,
        requests: Mutex<Vec<RouteRequest>>,
        fallback_calls: AtomicUsize,
    }

    impl FakeRouteBackend {
        fn new(
            route: Result<FeatureCollection, BackendError>,
            fallback: Result<FeatureCollection, BackendError>,
        ) -> Self {
            Self {
                route,
                fallback,
                requests: Mutex::new(Vec::new()),
                fallback_calls: AtomicUsize::new(0),
            }
        }
    }

    impl RouteBackend for FakeRouteBackend {
        fn request_route(
            &self,
            request: RouteRequest,
        ) -> BoxFuture<'_, Result<FeatureCollection, BackendError>> {
            self.requests.lock().unwrap().push(request);
            let result = self.route.clone();
            Box::pin(async move { result })
        }

        fn load_fallback_route(&self) -> BoxFuture<'_, Result<FeatureCollection, BackendError>> {
            self.fallback_calls.fetch_add(1, Ordering::SeqCst);
            let result = self.fallback.clone();
            Box::pin(async move { result })
        }
    }

    fn target(generation: u64) -> RouteTarget {
        RouteTarget {
            start: Position::new(0.0, 0.0),
            end: Position::new(1.0, 1.0),
            generation: Generation::new(generation),
        }
    }

    #[test]
    fn prefers_prediction_payload() {
        let observed = line(&[(0.0, 0.0)]);
        let predicted = line(&[(5.0, 5.0)]);
        let mut orch = RouteRequestOrchestrator::new(true);

        let job = orch.begin(target(1), Some(&predicted), Some(&observed)).unwrap();
        assert_eq!(job.payload_source, PayloadSource::Prediction);
        assert_eq!(job.request.geojson, predicted);
        assert!(job.request.use_corridor);
        assert_eq!(orch.status(), RouteStatus::Requesting);

        let job = orch.begin(target(2), None, Some(&observed)).unwrap();
        assert_eq!(job.payload_source, PayloadSource::Observed);
    }

    #[test]
    fn no_payload_means_no_request() {
        let mut orch = RouteRequestOrchestrator::default();
        assert!(orch.begin(target(1), None, None).is_none());
        assert_eq!(orch.status(), RouteStatus::Idle);
        assert_eq!(orch.pending(), None);
    }

    #[test]
    fn late_result_for_removed_markers_is_discarded() {
        let mut orch = RouteRequestOrchestrator::default();
        let observed = line(&[(0.0, 0.0)]);
        orch.begin(target(1), None, Some(&observed)).unwrap();

        let completion = RouteCompletion {
            target: target(1),
            outcome: RouteOutcome::Routed(vec![Position::new(0.0, 0.0)]),
        };
        assert_eq!(orch.finish(completion, Generation::new(2)), None);
        assert_eq!(orch.status(), RouteStatus::Idle);
    }

    #[test]
    fn superseded_request_keeps_status_requesting() {
        let mut orch = RouteRequestOrchestrator::default();
        let observed = line(&[(0.0, 0.0)]);
        orch.begin(target(1), None, Some(&observed)).unwrap();
        orch.begin(target(3), None, Some(&observed)).unwrap();

        let stale = RouteCompletion {
            target: target(1),
            outcome: RouteOutcome::Unavailable,
        };
        assert_eq!(orch.finish(stale, Generation::new(3)), None);
        assert_eq!(orch.status(), RouteStatus::Requesting);

        let fresh = RouteCompletion {
            target: target(3),
            outcome: RouteOutcome::Fallback(vec![Position::new(2.0, 2.0)]),
        };
        assert_eq!(
            orch.finish(fresh, Generation::new(3)),
            Some(vec![Position::new(2.0, 2.0)])
        );
        assert_eq!(orch.status(), RouteStatus::Idle);
    }

    #[tokio::test]
    async fn one_request_per_completed_pair() {
        let backend = FakeRouteBackend::new(
            Ok(line(&[(0.0, 0.0), (0.5, 0.5), (1.0, 1.0)])),
            Ok(line(&[(9.0, 9.0)])),
        );
        let observed = line(&[(0.0, 0.0)]);
        let mut markers = MarkerStateMachine::new();
        let mut orch = RouteRequestOrchestrator::default();

        let mut effects = markers.click(Position::new(0.0, 0.0));
        effects.extend(markers.click(Position::new(1.0, 1.0)));
        let mut routed = Vec::new();
        for effect in effects {
            if let MarkerEffect::RequestRoute(t) = effect {
                let job = orch.begin(t, None, Some(&observed)).unwrap();
                let done = resolve_route(&backend, job).await;
                routed.push(orch.finish(done, markers.generation()));
            }
        }

        let requests = backend.requests.lock().unwrap();
        assert_eq!(requests.len(), 1);
        let request = &requests[0];
        assert_eq!(
            (request.start, request.end),
            (Position::new(0.0, 0.0), Position::new(1.0, 1.0))
        );
        assert_eq!(routed.len(), 1);
        assert_eq!(routed[0].as_ref().map(|c| c.len()), Some(3));
        assert_eq!(backend.fallback_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn server_error_uses_bundled_route() {
        let bundled = line(&[(-80.0, 60.0), (-79.0, 61.0), (-78.0, 62.0)]);
        let backend = FakeRouteBackend::new(Err(BackendError::Status(500)), Ok(bundled.clone()));
        let mut orch = RouteRequestOrchestrator::default();
        let job = orch.begin(target(1), None, Some(&bundled)).unwrap();

        let done = resolve_route(&backend, job).await;
        assert_eq!(
            done.outcome,
            RouteOutcome::Fallback(bundled.first_line().unwrap().to_vec())
        );
    }

    #[tokio::test]
    async fn response_without_line_falls_back() {
        let backend =
            FakeRouteBackend::new(Ok(FeatureCollection::empty()), Ok(line(&[(3.0, 3.0)])));
        let mut orch = RouteRequestOrchestrator::default();
        let job = orch.begin(target(1), None, Some(&line(&[(0.0, 0.0)]))).unwrap();

        let done = resolve_route(&backend, job).await;
        assert_eq!(done.outcome, RouteOutcome::Fallback(vec![Position::new(3.0, 3.0)]));
    }

    #[tokio::test]
    async fn failed_fallback_is_unavailable() {
        let backend = FakeRouteBackend::new(
            Err(BackendError::Transport("connection refused".into())),
            Err(BackendError::NotFound),
        );
        let mut orch = RouteRequestOrchestrator::default();
        let job = orch.begin(target(1), None, Some(&line(&[(0.0, 0.0)]))).unwrap();

        let done = resolve_route(&backend, job).await;
        assert_eq!(done.outcome, RouteOutcome::Unavailable);
        assert_eq!(orch.finish(done, Generation::new(1)), None);
        assert_eq!(orch.status(), RouteStatus::Idle);
    }
}
