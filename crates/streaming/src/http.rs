use formats::geojson::FeatureCollection;
use formats::snapshot::Snapshot;
use formats::wire::{AvailableDatesResponse, IceExtentResponse, PredictionResponse, YearResponse};
use foundation::time::IsoDate;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::backend::{BackendError, BoxFuture, PredictionParams, SnapshotBackend};

/// HTTP implementation of [`SnapshotBackend`] against the ice-extent API.
///
/// Paths are resolved relative to `base_url`:
/// - `GET /ice_extent/available_dates`
/// - `GET /ice_extent?date=..&radius_km=..`
/// - `GET /ice_extent/by_year?year=..&radius_km=..`
/// - `GET /ice_extent/predict?date=..&radius_km=..&thresh=..`
#[derive(Debug, Clone)]
pub struct HttpBackend {
    base_url: String,
    radius_km: f64,
    client: reqwest::Client,
}

impl HttpBackend {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(base_url, reqwest::Client::new())
    }

    pub fn with_client(base_url: impl Into<String>, client: reqwest::Client) -> Self {
        Self {
            base_url: base_url.into(),
            radius_km: 500.0,
            client,
        }
    }

    pub fn with_radius_km(mut self, radius_km: f64) -> Self {
        self.radius_km = radius_km;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), path)
    }
}

impl SnapshotBackend for HttpBackend {
    fn list_available_dates(&self) -> BoxFuture<'_, Result<Vec<IsoDate>, BackendError>> {
        let url = self.url("ice_extent/available_dates");
        Box::pin(async move {
            let resp: AvailableDatesResponse = get_json(&self.client, &url, &[]).await?;
            let count = resp.count;
            let (dates, rejected) = resp.into_dates();
            if let Some(first) = rejected.first() {
                warn!(rejected = rejected.len(), %first, "skipping malformed available dates");
            }
            debug!(count, listed = dates.len(), "available dates loaded");
            Ok(dates)
        })
    }

    fn fetch_snapshot(&self, date: IsoDate) -> BoxFuture<'_, Result<Snapshot, BackendError>> {
        let url = self.url("ice_extent");
        let query = [
            ("date", date.to_string()),
            ("radius_km", self.radius_km.to_string()),
        ];
        Box::pin(async move {
            let resp: IceExtentResponse = get_json(&self.client, &url, &query).await?;
            Ok(resp.into_snapshot())
        })
    }

    fn fetch_year(&self, year: i32) -> BoxFuture<'_, Result<Vec<Snapshot>, BackendError>> {
        let url = self.url("ice_extent/by_year");
        let query = [
            ("year", year.to_string()),
            ("radius_km", self.radius_km.to_string()),
        ];
        Box::pin(async move {
            let resp: YearResponse = get_json(&self.client, &url, &query).await?;
            Ok(resp.into_snapshots())
        })
    }

    fn fetch_prediction(
        &self,
        params: PredictionParams,
    ) -> BoxFuture<'_, Result<FeatureCollection, BackendError>> {
        let url = self.url("ice_extent/predict");
        let query = [
            ("date", params.date.to_string()),
            ("radius_km", params.radius_km.to_string()),
            ("thresh", params.thresh.to_string()),
        ];
        Box::pin(async move {
            let resp: PredictionResponse = get_json(&self.client, &url, &query).await?;
            Ok(resp.feature_collection)
        })
    }
}

/// Maps a response onto [`BackendError`]: 404 is `NotFound`, any other
/// non-2xx status is `Status`.
pub fn check_status(resp: reqwest::Response) -> Result<reqwest::Response, BackendError> {
    let status = resp.status();
    if status == StatusCode::NOT_FOUND {
        return Err(BackendError::NotFound);
    }
    if !status.is_success() {
        return Err(BackendError::Status(status.as_u16()));
    }
    Ok(resp)
}

pub async fn read_json<T: DeserializeOwned>(resp: reqwest::Response) -> Result<T, BackendError> {
    check_status(resp)?
        .json::<T>()
        .await
        .map_err(|e| BackendError::Decode(e.to_string()))
}

async fn get_json<T: DeserializeOwned>(
    client: &reqwest::Client,
    url: &str,
    query: &[(&str, String)],
) -> Result<T, BackendError> {
    let resp = client
        .get(url)
        .query(query)
        .send()
        .await
        .map_err(|e| BackendError::Transport(e.to_string()))?;
    read_json(resp).await
}
