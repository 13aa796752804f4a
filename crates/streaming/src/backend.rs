//! Backend abstraction for the ice-extent data service.
//!
//! The core only talks to [`SnapshotBackend`]; [`crate::http::HttpBackend`] is
//! the production implementation and tests substitute scripted fakes.

use std::future::Future;
use std::pin::Pin;

use formats::geojson::FeatureCollection;
use formats::snapshot::Snapshot;
use foundation::time::IsoDate;

/// Type alias for a boxed future that can be sent between threads.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Failure talking to a backend.
///
/// `NotFound` means "this resource does not exist upstream" and is the only
/// variant that may be cached as a permanent negative. Everything else is a
/// transient network error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    NotFound,
    Status(u16),
    Transport(String),
    Decode(String),
}

impl BackendError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, BackendError::NotFound)
    }

    /// Short label used in user-facing messages (`404`, `503`, `network`).
    pub fn status_label(&self) -> String {
        match self {
            BackendError::NotFound => "404".to_string(),
            BackendError::Status(code) => code.to_string(),
            BackendError::Transport(_) | BackendError::Decode(_) => "network".to_string(),
        }
    }
}

impl std::fmt::Display for BackendError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackendError::NotFound => write!(f, "resource not found"),
            BackendError::Status(code) => write!(f, "server error {code}"),
            BackendError::Transport(msg) => write!(f, "network error: {msg}"),
            BackendError::Decode(msg) => write!(f, "invalid response: {msg}"),
        }
    }
}

impl std::error::Error for BackendError {}

/// Parameters for a model-predicted extent.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PredictionParams {
    pub date: IsoDate,
    pub radius_km: f64,
    /// Probability cut-off in `[0, 1]`.
    pub thresh: f64,
}

impl PredictionParams {
    pub fn new(date: IsoDate) -> Self {
        Self {
            date,
            radius_km: 500.0,
            thresh: 0.5,
        }
    }
}

/// Source of per-day ice-extent snapshots.
///
/// Implementations must be `Send + Sync` so a single instance can be shared
/// by every component of a session. Methods return boxed futures for
/// dyn-compatibility.
pub trait SnapshotBackend: Send + Sync {
    /// Every date with data, in any order.
    fn list_available_dates(&self) -> BoxFuture<'_, Result<Vec<IsoDate>, BackendError>>;

    fn fetch_snapshot(&self, date: IsoDate) -> BoxFuture<'_, Result<Snapshot, BackendError>>;

    /// All days of `year` in one response.
    ///
    /// `Err(BackendError::NotFound)` means the year has no data at all.
    fn fetch_year(&self, year: i32) -> BoxFuture<'_, Result<Vec<Snapshot>, BackendError>>;

    fn fetch_prediction(
        &self,
        params: PredictionParams,
    ) -> BoxFuture<'_, Result<FeatureCollection, BackendError>>;
}
