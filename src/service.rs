use crate::measurements::{parse_timestamp, Location, MeasurementRecord, StoredMeasurement};
use crate::storage::DocumentSource;
use chrono::{DateTime, Utc};
use std::cmp::Ordering;
use tracing::{debug, error, info, warn};

/// Latest reading for each monitored location.
///
/// Locations are queried one after another. A failed query is logged and the
/// location left out; a location without documents is left out as well, so the
/// result can hold fewer entries than there are locations.
pub fn latest_readings(source: &dyn DocumentSource) -> Vec<MeasurementRecord> {
    Location::ALL
        .into_iter()
        .filter_map(|location| latest_for(source, location))
        .collect()
}

fn latest_for(source: &dyn DocumentSource, location: Location) -> Option<MeasurementRecord> {
    info!("Fetching latest reading for {}", location);

    let mut documents = match source.find_by_location(location.name()) {
        Ok(documents) => documents,
        Err(e) => {
            error!("Query failed for {}: {:#}", location, e);
            return None;
        }
    };

    debug!("Returned {} documents for {}", documents.len(), location);
    if documents.is_empty() {
        warn!("No records found for {}", location);
        return None;
    }

    documents.sort_by(newest_first);
    let latest = documents.swap_remove(0);
    debug!(
        "Latest timestamp for {}: {}",
        location,
        latest.timestamp.as_deref().unwrap_or("<none>")
    );
    Some(latest.into())
}

/// Every document for `location`, newest first, in the order the store returns them.
pub fn history(source: &dyn DocumentSource, location: &str) -> anyhow::Result<Vec<MeasurementRecord>> {
    let documents = source.find_by_location_desc(location)?;
    debug!("History for {}: {} documents", location, documents.len());
    Ok(documents.into_iter().map(MeasurementRecord::from).collect())
}

fn instant(doc: &StoredMeasurement) -> Option<DateTime<Utc>> {
    doc.timestamp.as_deref().and_then(parse_timestamp)
}

/// Descending by timestamp as a point in time; documents whose timestamp is
/// missing or unparseable sort after every dated one.
fn newest_first(a: &StoredMeasurement, b: &StoredMeasurement) -> Ordering {
    match (instant(a), instant(b)) {
        (Some(a), Some(b)) => b.cmp(&a),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}
