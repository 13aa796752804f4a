use foundation::time::IsoDate;
use serde::{Deserialize, Serialize};

use crate::geojson::FeatureCollection;

/// Where a snapshot came from and how it was sampled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotMeta {
    pub date: IsoDate,
    /// Upstream label, e.g. the product a day was derived from.
    pub source: String,
    pub radius_km: f64,
}

/// One day of ice-extent geometry. Immutable once fetched.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub meta: SnapshotMeta,
    pub features: FeatureCollection,
}

impl Snapshot {
    pub fn new(meta: SnapshotMeta, features: FeatureCollection) -> Self {
        Self { meta, features }
    }

    pub fn date(&self) -> IsoDate {
        self.meta.date
    }
}
