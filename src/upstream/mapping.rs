//! Request shaping and defensive response mapping for the courier search API.
//!
//! The upstream schema drifts between couriers and API versions, so every field
//! is read from a list of candidate names and falls back to a deterministic
//! default. The untouched record is kept in `raw_payload`.

use super::RequestOptions;
use crate::core::types::{Coordinates, PickupPoint, SearchQuery};
use serde_json::{json, Map, Value};

const UNKNOWN: &str = "unknown";
const DEFAULT_COUNTRY: &str = "PL";

/// Body for `POST <search_path>`
pub fn search_request(query: &SearchQuery) -> RequestOptions {
    let mut body = json!({
        "location": {
            "city": query.city().unwrap_or_default(),
            "postcode": query.postal_code().unwrap_or_default()
        },
        "courierServices": query.courier_services
    });
    if let (Some(provider), Some(object)) = (query.provider(), body.as_object_mut()) {
        object.insert("provider".to_string(), Value::String(provider.to_string()));
    }
    RequestOptions::post(body)
}

/// Extract pickup points from an upstream body. Unrecognised shapes yield an empty list.
pub fn map_points(body: &Value, query: &SearchQuery) -> Vec<PickupPoint> {
    let records: &[Value] = match body {
        Value::Array(items) => items.as_slice(),
        Value::Object(object) => ["points", "data"]
            .iter()
            .find_map(|field| object.get(*field).and_then(Value::as_array))
            .map(Vec::as_slice)
            .unwrap_or_default(),
        _ => &[],
    };

    records
        .iter()
        .filter_map(|record| record.as_object().map(|object| map_point(object, record, query)))
        .collect()
}

fn map_point(record: &Map<String, Value>, raw: &Value, query: &SearchQuery) -> PickupPoint {
    let address = record.get("address");
    let address_object = address.and_then(Value::as_object);

    let id = first_string(record, &["code", "id", "name"]).unwrap_or_else(|| UNKNOWN.to_string());

    let provider = first_string(record, &["courierService", "provider", "service"])
        .or_else(|| query.provider().map(str::to_string))
        .unwrap_or_else(|| UNKNOWN.to_string());

    let name = first_string(record, &["name", "description"]).unwrap_or_else(|| id.clone());

    let street = match address {
        Some(Value::String(line)) => line.clone(),
        Some(Value::Object(object)) => first_string(object, &["line1", "street_line", "streetLine"])
            .unwrap_or_else(|| {
                [
                    first_string(object, &["street"]),
                    first_string(object, &["buildingNumber", "building_number"]),
                ]
                .into_iter()
                .flatten()
                .collect::<Vec<_>>()
                .join(" ")
            }),
        _ => String::new(),
    };

    let city = address_object
        .and_then(|a| first_string(a, &["city"]))
        .or_else(|| first_string(record, &["city"]))
        .or_else(|| query.city().map(str::to_string))
        .unwrap_or_default();

    let postal_code = address_object
        .and_then(|a| first_string(a, &["postCode", "postalCode", "postcode", "postal_code"]))
        .or_else(|| first_string(record, &["postal_code", "postalCode", "postcode"]))
        .unwrap_or_default();

    let country = address_object
        .and_then(|a| first_string(a, &["countryCode", "country"]))
        .or_else(|| first_string(record, &["countryCode", "country"]))
        .unwrap_or_else(|| DEFAULT_COUNTRY.to_string());

    PickupPoint {
        id,
        provider,
        name,
        address: street,
        city,
        postal_code,
        country,
        distance: record.get("distance").and_then(Value::as_f64),
        hours: first_string(record, &["openingHours", "opening_hours", "hours"]),
        coordinates: coordinates(record),
        raw_payload: raw.clone(),
    }
}

fn coordinates(record: &Map<String, Value>) -> Option<Coordinates> {
    let nested = record.get("coordinates").and_then(Value::as_object);
    let (lat, lng) = match nested {
        Some(c) => (
            number(c, &["latitude", "lat"]),
            number(c, &["longitude", "lng", "lon"]),
        ),
        None => (
            number(record, &["lat", "latitude"]),
            number(record, &["lng", "lon", "longitude"]),
        ),
    };
    Some(Coordinates {
        lat: lat?,
        lng: lng?,
    })
}

/// First non-blank string (or number rendered as string) among `fields`
fn first_string(object: &Map<String, Value>, fields: &[&str]) -> Option<String> {
    fields.iter().find_map(|field| match object.get(*field)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}

/// Numbers may arrive as JSON numbers or numeric strings
fn number(object: &Map<String, Value>, fields: &[&str]) -> Option<f64> {
    fields.iter().find_map(|field| match object.get(*field)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    })
}
