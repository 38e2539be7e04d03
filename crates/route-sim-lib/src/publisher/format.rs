//! GeoJSON wire format for positions

use crate::Position;
use serde_json::{Value, json};
use std::time::UNIX_EPOCH;

/// Render a position as a GeoJSON `Feature`
///
/// Device metadata is copied into `properties`, followed by the sampling `timestamp` in
/// fractional Unix seconds.
pub fn geojson_feature(position: &Position) -> Value {
    let mut properties = position.device.metadata().clone();
    properties.insert("timestamp".to_string(), json!(unix_seconds(position)));

    json!({
        "type": "Feature",
        "id": position.device_id(),
        "geometry": {
            "type": "Point",
            "coordinates": [position.lng(), position.lat()],
        },
        "properties": properties,
    })
}

/// [`geojson_feature`] serialized to a compact string
pub fn geojson_string(position: &Position) -> serde_json::Result<String> {
    serde_json::to_string(&geojson_feature(position))
}

fn unix_seconds(position: &Position) -> f64 {
    match position.at.duration_since(UNIX_EPOCH) {
        Ok(since) => since.as_secs_f64(),
        Err(before) => -before.duration().as_secs_f64(),
    }
}
