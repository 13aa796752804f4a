use std::env;
use std::time::Duration;

use routing::backend::FallbackSource;

pub const DEFAULT_API_BASE: &str = "http://127.0.0.1:5001/api";
pub const DEFAULT_FALLBACK_ROUTE: &str = "assets/hudson-bay.geojson";

/// Runtime settings for a viewer session.
#[derive(Debug, Clone, PartialEq)]
pub struct ViewerConfig {
    pub api_base: String,
    pub route_url: String,
    /// Local path, or an `http(s)://` URL.
    pub fallback_route: String,
    pub radius_km: f64,
    pub frame_interval: Duration,
    pub use_corridor: bool,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self::from_lookup(|_| None)
    }
}

impl ViewerConfig {
    /// Reads `ICEWATCH_*` variables, falling back to defaults for anything
    /// unset or unparseable.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let api_base = lookup("ICEWATCH_API_BASE").unwrap_or_else(|| DEFAULT_API_BASE.to_string());
        let route_url = lookup("ICEWATCH_ROUTE_URL")
            .unwrap_or_else(|| format!("{}/route_navigation", api_base.trim_end_matches('/')));
        let fallback_route = lookup("ICEWATCH_FALLBACK_ROUTE")
            .unwrap_or_else(|| DEFAULT_FALLBACK_ROUTE.to_string());

        Self {
            api_base,
            route_url,
            fallback_route,
            radius_km: parse_or(lookup("ICEWATCH_RADIUS_KM"), 500.0),
            frame_interval: Duration::from_millis(parse_or::<u64>(lookup("ICEWATCH_FRAME_MS"), 16).max(1)),
            use_corridor: lookup("ICEWATCH_USE_CORRIDOR")
                .map(|v| parse_flag(&v))
                .unwrap_or(false),
        }
    }

    pub fn fallback_source(&self) -> FallbackSource {
        FallbackSource::parse(&self.fallback_route)
    }
}

fn parse_or<T: std::str::FromStr>(value: Option<String>, default: T) -> T {
    value.and_then(|v| v.trim().parse().ok()).unwrap_or(default)
}

fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}
