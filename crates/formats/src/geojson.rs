use foundation::geo::Position;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

#[derive(Debug, Clone, PartialEq)]
pub enum Geometry {
    Point(Position),
    MultiPoint(Vec<Position>),
    LineString(Vec<Position>),
    MultiLineString(Vec<Vec<Position>>),
    Polygon(Vec<Vec<Position>>),
    MultiPolygon(Vec<Vec<Vec<Position>>>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Feature {
    pub id: Option<String>,
    pub properties: Map<String, Value>,
    /// GeoJSON allows `"geometry": null`.
    pub geometry: Option<Geometry>,
}

impl Feature {
    pub fn new(geometry: Geometry) -> Self {
        Self {
            id: None,
            properties: Map::new(),
            geometry: Some(geometry),
        }
    }
}

/// A GeoJSON `FeatureCollection`, the unit every map layer is replaced with.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeatureCollection {
    pub features: Vec<Feature>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GeoJsonError {
    NotAFeatureCollection,
    InvalidFeature { index: usize, reason: String },
}

impl std::fmt::Display for GeoJsonError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GeoJsonError::NotAFeatureCollection => {
                write!(f, "expected GeoJSON FeatureCollection")
            }
            GeoJsonError::InvalidFeature { index, reason } => {
                write!(f, "invalid feature at index {index}: {reason}")
            }
        }
    }
}

impl std::error::Error for GeoJsonError {}

impl FeatureCollection {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Single-feature collection holding one `LineString`.
    pub fn line_string(coordinates: Vec<Position>) -> Self {
        Self {
            features: vec![Feature::new(Geometry::LineString(coordinates))],
        }
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    /// First line geometry in feature order.
    ///
    /// Each feature is checked in turn: a `LineString` yields its coordinates,
    /// a non-empty `MultiLineString` yields its first line. Anything else is
    /// skipped. The returned slice may itself be empty.
    pub fn first_line(&self) -> Option<&[Position]> {
        self.features
            .iter()
            .find_map(|feature| match feature.geometry.as_ref()? {
                Geometry::LineString(coords) => Some(coords.as_slice()),
                Geometry::MultiLineString(lines) => lines.first().map(|l| l.as_slice()),
                _ => None,
            })
    }

    pub fn from_geojson_str(payload: &str) -> Result<Self, GeoJsonError> {
        let value: Value =
            serde_json::from_str(payload).map_err(|e| GeoJsonError::InvalidFeature {
                index: 0,
                reason: format!("JSON parse error: {e}"),
            })?;
        Self::from_geojson_value(&value)
    }

    pub fn from_geojson_value(value: &Value) -> Result<Self, GeoJsonError> {
        let obj = value
            .as_object()
            .ok_or(GeoJsonError::NotAFeatureCollection)?;
        let ty = obj
            .get("type")
            .and_then(|v| v.as_str())
            .ok_or(GeoJsonError::NotAFeatureCollection)?;
        if ty != "FeatureCollection" {
            return Err(GeoJsonError::NotAFeatureCollection);
        }

        let features_val = obj
            .get("features")
            .and_then(|v| v.as_array())
            .ok_or(GeoJsonError::NotAFeatureCollection)?;

        let mut features = Vec::with_capacity(features_val.len());
        for (index, feat_val) in features_val.iter().enumerate() {
            let invalid = |reason: String| GeoJsonError::InvalidFeature { index, reason };

            let feat_obj = feat_val
                .as_object()
                .ok_or_else(|| invalid("feature must be an object".to_string()))?;

            let feat_type = feat_obj
                .get("type")
                .and_then(|v| v.as_str())
                .ok_or_else(|| invalid("feature missing type".to_string()))?;
            if feat_type != "Feature" {
                return Err(invalid(format!("unexpected feature type: {feat_type}")));
            }

            let id = match feat_obj.get("id") {
                Some(Value::String(s)) => Some(s.clone()),
                Some(Value::Number(n)) => Some(n.to_string()),
                _ => None,
            };

            let properties = feat_obj
                .get("properties")
                .and_then(|v| v.as_object())
                .cloned()
                .unwrap_or_default();

            let geometry = match feat_obj.get("geometry") {
                None | Some(Value::Null) => None,
                Some(geometry_val) => Some(parse_geometry(geometry_val).map_err(invalid)?),
            };

            features.push(Feature {
                id,
                properties,
                geometry,
            });
        }

        Ok(Self { features })
    }

    /// Emits a GeoJSON `FeatureCollection`.
    /// (Property ordering may differ from the original input.)
    pub fn to_geojson_value(&self) -> Value {
        let mut root = Map::new();
        root.insert(
            "type".to_string(),
            Value::String("FeatureCollection".to_string()),
        );

        let features = self
            .features
            .iter()
            .map(|feat| {
                let mut fobj = Map::new();
                fobj.insert("type".to_string(), Value::String("Feature".to_string()));
                if let Some(id) = &feat.id {
                    fobj.insert("id".to_string(), Value::String(id.clone()));
                }
                fobj.insert(
                    "properties".to_string(),
                    Value::Object(feat.properties.clone()),
                );
                fobj.insert(
                    "geometry".to_string(),
                    feat.geometry
                        .as_ref()
                        .map(geometry_to_geojson_value)
                        .unwrap_or(Value::Null),
                );
                Value::Object(fobj)
            })
            .collect();

        root.insert("features".to_string(), Value::Array(features));
        Value::Object(root)
    }
}

impl Serialize for FeatureCollection {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_geojson_value().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for FeatureCollection {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Self::from_geojson_value(&value).map_err(serde::de::Error::custom)
    }
}

fn geometry_to_geojson_value(geom: &Geometry) -> Value {
    let (ty, coordinates) = match geom {
        Geometry::Point(p) => ("Point", point_coords(p)),
        Geometry::MultiPoint(ps) => ("MultiPoint", points_coords(ps)),
        Geometry::LineString(ps) => ("LineString", points_coords(ps)),
        Geometry::MultiLineString(lines) => (
            "MultiLineString",
            Value::Array(lines.iter().map(|l| points_coords(l)).collect()),
        ),
        Geometry::Polygon(rings) => (
            "Polygon",
            Value::Array(rings.iter().map(|r| points_coords(r)).collect()),
        ),
        Geometry::MultiPolygon(polys) => (
            "MultiPolygon",
            Value::Array(
                polys
                    .iter()
                    .map(|poly| Value::Array(poly.iter().map(|r| points_coords(r)).collect()))
                    .collect(),
            ),
        ),
    };

    let mut obj = Map::new();
    obj.insert("type".to_string(), Value::String(ty.to_string()));
    obj.insert("coordinates".to_string(), coordinates);
    Value::Object(obj)
}

fn point_coords(p: &Position) -> Value {
    Value::Array(vec![Value::from(p.lon), Value::from(p.lat)])
}

fn points_coords(ps: &[Position]) -> Value {
    Value::Array(ps.iter().map(point_coords).collect())
}

fn parse_geometry(value: &Value) -> Result<Geometry, String> {
    let obj = value
        .as_object()
        .ok_or("geometry must be an object".to_string())?;
    let ty = obj
        .get("type")
        .and_then(|v| v.as_str())
        .ok_or("geometry missing type".to_string())?;

    let coords = obj
        .get("coordinates")
        .ok_or("geometry missing coordinates".to_string())?;

    match ty {
        "Point" => Ok(Geometry::Point(parse_point(coords)?)),
        "MultiPoint" => Ok(Geometry::MultiPoint(parse_points(coords)?)),
        "LineString" => Ok(Geometry::LineString(parse_points(coords)?)),
        "MultiLineString" => Ok(Geometry::MultiLineString(parse_nested(coords, parse_points)?)),
        "Polygon" => Ok(Geometry::Polygon(parse_nested(coords, parse_points)?)),
        "MultiPolygon" => Ok(Geometry::MultiPolygon(parse_nested(coords, |poly| {
            parse_nested(poly, parse_points)
        })?)),
        other => Err(format!("unsupported geometry type: {other}")),
    }
}

/// Reads `[lon, lat]`; a trailing altitude is accepted and dropped.
fn parse_point(coords: &Value) -> Result<Position, String> {
    let arr = coords
        .as_array()
        .ok_or("position must be an array".to_string())?;
    if arr.len() < 2 {
        return Err("position must have [lon, lat]".to_string());
    }
    let lon = arr[0]
        .as_f64()
        .ok_or("position lon must be a number".to_string())?;
    let lat = arr[1]
        .as_f64()
        .ok_or("position lat must be a number".to_string())?;
    Ok(Position::new(lon, lat))
}

fn parse_points(coords: &Value) -> Result<Vec<Position>, String> {
    parse_nested(coords, parse_point)
}

fn parse_nested<T>(
    coords: &Value,
    parse_item: impl Fn(&Value) -> Result<T, String>,
) -> Result<Vec<T>, String> {
    let arr = coords
        .as_array()
        .ok_or("coordinates must be an array".to_string())?;
    arr.iter().map(parse_item).collect()
}

#[cfg(test)]
mod tests {
    use super::{FeatureCollection, GeoJsonError, Geometry};
    use foundation::geo::Position;
    use serde_json::json;

    #[test]
    fn parses_mixed_geometries() {
        let value = json!({
            "type": "FeatureCollection",
            "features": [
                { "type": "Feature", "id": 7, "properties": { "conc": 0.8 },
                  "geometry": { "type": "Point", "coordinates": [10.0, 80.0, 0.0] } },
                { "type": "Feature", "properties": null, "geometry": null },
                { "type": "Feature", "geometry": { "type": "Polygon",
                  "coordinates": [[[0.0, 70.0], [1.0, 70.0], [1.0, 71.0], [0.0, 70.0]]] } }
            ]
        });

        let fc = FeatureCollection::from_geojson_value(&value).unwrap();
        assert_eq!(fc.len(), 3);
        assert_eq!(fc.features[0].id.as_deref(), Some("7"));
        assert_eq!(
            fc.features[0].geometry,
            Some(Geometry::Point(Position::new(10.0, 80.0)))
        );
        assert_eq!(fc.features[1].geometry, None);
        assert!(matches!(fc.features[2].geometry, Some(Geometry::Polygon(_))));
    }

    #[test]
    fn rejects_non_collections() {
        let err = FeatureCollection::from_geojson_value(&json!({ "type": "Feature" }));
        assert_eq!(err, Err(GeoJsonError::NotAFeatureCollection));

        let err = FeatureCollection::from_geojson_str(
            r#"{"type":"FeatureCollection","features":[{"type":"Feature","geometry":{"type":"Circle","coordinates":[]}}]}"#,
        );
        assert!(matches!(err, Err(GeoJsonError::InvalidFeature { index: 0, .. })));
    }

    #[test]
    fn first_line_prefers_earliest_feature() {
        let value = json!({
            "type": "FeatureCollection",
            "features": [
                { "type": "Feature", "geometry": { "type": "Point", "coordinates": [0.0, 0.0] } },
                { "type": "Feature", "geometry": { "type": "MultiLineString",
                  "coordinates": [[[1.0, 1.0], [2.0, 2.0]], [[9.0, 9.0], [8.0, 8.0]]] } },
                { "type": "Feature", "geometry": { "type": "LineString",
                  "coordinates": [[5.0, 5.0], [6.0, 6.0]] } }
            ]
        });
        let fc = FeatureCollection::from_geojson_value(&value).unwrap();
        assert_eq!(
            fc.first_line(),
            Some(&[Position::new(1.0, 1.0), Position::new(2.0, 2.0)][..])
        );
    }

    #[test]
    fn first_line_is_none_without_lines() {
        let points = FeatureCollection {
            features: vec![super::Feature::new(Geometry::Point(Position::new(0.0, 0.0)))],
        };
        assert_eq!(points.first_line(), None);
        assert_eq!(FeatureCollection::empty().first_line(), None);
    }

    #[test]
    fn serde_goes_through_geojson_form() {
        let fc = FeatureCollection::line_string(vec![Position::new(0.0, 0.0), Position::new(1.0, 1.0)]);
        let value = serde_json::to_value(&fc).unwrap();
        assert_eq!(value["type"], "FeatureCollection");
        assert_eq!(value["features"][0]["geometry"]["type"], "LineString");
        assert_eq!(value["features"][0]["geometry"]["coordinates"], json!([[0.0, 0.0], [1.0, 1.0]]));

        let back: FeatureCollection = serde_json::from_value(value).unwrap();
        assert_eq!(back, fc);
    }
}
