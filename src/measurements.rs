use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

/// A monitored site along the canal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Location {
    DowsLake,
    FifthAvenue,
    Nac,
}

impl Location {
    /// Every monitored site, in the order they are queried and displayed.
    pub const ALL: [Location; 3] = [Location::DowsLake, Location::FifthAvenue, Location::Nac];

    /// Value of the `location` field in stored documents
    pub fn name(self) -> &'static str {
        match self {
            Location::DowsLake => "Dow's Lake",
            Location::FifthAvenue => "Fifth Avenue",
            Location::Nac => "NAC",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|loc| loc.name() == name)
    }

    pub fn key(self) -> &'static str {
        match self {
            Location::DowsLake => "dows",
            Location::FifthAvenue => "fifth",
            Location::Nac => "nac",
        }
    }

    /// Line colour used for this site on both charts
    pub fn color(self) -> &'static str {
        match self {
            Location::DowsLake => "rgb(75, 192, 192)",
            Location::FifthAvenue => "rgb(255, 99, 132)",
            Location::Nac => "rgb(54, 162, 235)",
        }
    }
}

impl std::fmt::Display for Location {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Display key for any location name. Unknown sites get the name lowercased
/// with everything outside `a-z` stripped.
pub fn location_key(name: &str) -> String {
    match Location::from_name(name) {
        Some(loc) => loc.key().to_string(),
        None => name
            .to_lowercase()
            .chars()
            .filter(|c| c.is_ascii_lowercase())
            .collect(),
    }
}

const NAIVE_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];

/// Parses a stored timestamp as a point in time.
///
/// Accepts RFC 3339, ISO date-times without an offset (read as UTC) in `T` or
/// space separated form, and bare dates (midnight UTC).
pub fn parse_timestamp(ts: &str) -> Option<DateTime<Utc>> {
    let ts = ts.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc3339(ts) {
        return Some(parsed.with_timezone(&Utc));
    }
    NAIVE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(ts, fmt).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(ts, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
        .map(|naive| naive.and_utc())
}

/// Aggregated measurement document as it sits in the container
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredMeasurement {
    pub location: Option<String>,
    pub timestamp: Option<String>,

    pub avg_ice_thickness: Option<f64>,
    pub max_ice_thickness: Option<f64>,
    pub min_ice_thickness: Option<f64>,

    pub avg_surface_temp: Option<f64>,
    pub max_surface_temp: Option<f64>,
    pub min_surface_temp: Option<f64>,

    pub avg_snow: Option<f64>,
    pub max_snow: Option<f64>,
    pub min_snow: Option<f64>,

    pub avg_external_temp: Option<f64>,
    pub max_external_temp: Option<f64>,
    pub min_external_temp: Option<f64>,
}

/// Wire format returned by the API, one per location per window.
///
/// Fields missing from the source document are omitted from the JSON rather
/// than sent as `null`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MeasurementRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avg_ice_thickness: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_ice_thickness: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_ice_thickness: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avg_surface_temperature: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_surface_temperature: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_surface_temperature: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avg_snow_accumulation: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_snow_accumulation: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_snow_accumulation: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avg_external_temperature: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_external_temperature: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_external_temperature: Option<f64>,
}

impl From<StoredMeasurement> for MeasurementRecord {
    fn from(doc: StoredMeasurement) -> Self {
        Self {
            location: doc.location,
            timestamp: doc.timestamp,

            avg_ice_thickness: doc.avg_ice_thickness,
            max_ice_thickness: doc.max_ice_thickness,
            min_ice_thickness: doc.min_ice_thickness,

            avg_surface_temperature: doc.avg_surface_temp,
            max_surface_temperature: doc.max_surface_temp,
            min_surface_temperature: doc.min_surface_temp,

            avg_snow_accumulation: doc.avg_snow,
            max_snow_accumulation: doc.max_snow,
            min_snow_accumulation: doc.min_snow,

            avg_external_temperature: doc.avg_external_temp,
            max_external_temperature: doc.max_external_temp,
            min_external_temperature: doc.min_external_temp,
        }
    }
}
