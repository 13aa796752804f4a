//! JSON bodies exchanged with the ice-extent and routing backends.

use foundation::geo::Position;
use foundation::time::IsoDate;
use serde::{Deserialize, Serialize};

use crate::geojson::FeatureCollection;
use crate::snapshot::{Snapshot, SnapshotMeta};

#[derive(Debug, Clone, Deserialize)]
pub struct AvailableDatesResponse {
    #[serde(default)]
    pub count: usize,
    #[serde(default)]
    pub dates: Option<Vec<serde_json::Value>>,
}

impl AvailableDatesResponse {
    /// Splits the listing into valid dates and the entries that are not
    /// `YYYY-MM-DD` strings. A missing or null list is empty.
    pub fn into_dates(self) -> (Vec<IsoDate>, Vec<serde_json::Value>) {
        let entries = self.dates.unwrap_or_default();
        let mut dates = Vec::with_capacity(entries.len());
        let mut rejected = Vec::new();
        for entry in entries {
            match entry.as_str().map(IsoDate::parse) {
                Some(Ok(date)) => dates.push(date),
                _ => rejected.push(entry),
            }
        }
        (dates, rejected)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct IceExtentResponse {
    pub date: IsoDate,
    pub source: String,
    pub radius_km: f64,
    #[serde(default)]
    pub feature_collection: Option<FeatureCollection>,
}

impl IceExtentResponse {
    /// A response without geometry is an empty day, not an error.
    pub fn into_snapshot(self) -> Snapshot {
        Snapshot::new(
            SnapshotMeta {
                date: self.date,
                source: self.source,
                radius_km: self.radius_km,
            },
            self.feature_collection.unwrap_or_default(),
        )
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct YearDay {
    pub date: IsoDate,
    #[serde(default)]
    pub source: String,
    pub feature_collection: FeatureCollection,
}

#[derive(Debug, Clone, Deserialize)]
pub struct YearResponse {
    pub year: i32,
    pub radius_km: f64,
    #[serde(default)]
    pub days: Vec<YearDay>,
}

impl YearResponse {
    /// Days outside `self.year` are dropped.
    pub fn into_snapshots(self) -> Vec<Snapshot> {
        let year = self.year;
        let radius_km = self.radius_km;
        self.days
            .into_iter()
            .filter(|day| day.date.year() == year)
            .map(|day| {
                Snapshot::new(
                    SnapshotMeta {
                        date: day.date,
                        source: day.source,
                        radius_km,
                    },
                    day.feature_collection,
                )
            })
            .collect()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PredictionResponse {
    #[serde(default)]
    pub date: Option<IsoDate>,
    pub feature_collection: FeatureCollection,
}

#[derive(Debug, Clone, Serialize)]
pub struct RouteRequest {
    pub start: Position,
    pub end: Position,
    pub geojson: FeatureCollection,
    pub use_corridor: bool,
}
