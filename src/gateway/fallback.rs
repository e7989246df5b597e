//! Synthetic pickup points served when neither upstream nor cache can answer.
//!
//! Output depends only on the requested city, postal code and provider, so the
//! storefront and tests see the same placeholder set for the same query.

use crate::core::types::{Coordinates, PickupPoint, SearchQuery};
use serde_json::json;

const POINTS_PER_QUERY: usize = 2;
const DEFAULT_PROVIDER: &str = "inpost";
const DEFAULT_CITY: &str = "Unknown";
const DEFAULT_POSTAL_CODE: &str = "00-000";

/// Geographic centre of Poland, used for cities missing from [`KNOWN_CITIES`]
const COUNTRY_CENTRE: Coordinates = Coordinates {
    lat: 52.0693,
    lng: 19.4803,
};

const KNOWN_CITIES: &[(&str, f64, f64)] = &[
    ("warszawa", 52.2297, 21.0122),
    ("warsaw", 52.2297, 21.0122),
    ("kraków", 50.0647, 19.9450),
    ("krakow", 50.0647, 19.9450),
    ("wrocław", 51.1079, 17.0385),
    ("wroclaw", 51.1079, 17.0385),
    ("poznań", 52.4064, 16.9252),
    ("poznan", 52.4064, 16.9252),
    ("gdańsk", 54.3520, 18.6466),
    ("gdansk", 54.3520, 18.6466),
    ("łódź", 51.7592, 19.4560),
    ("lodz", 51.7592, 19.4560),
];

pub fn synthetic_points(query: &SearchQuery) -> Vec<PickupPoint> {
    let provider = query
        .provider()
        .map(str::to_lowercase)
        .or_else(|| {
            query
                .courier_services
                .first()
                .map(|s| s.trim().to_lowercase())
                .filter(|s| !s.is_empty())
        })
        .unwrap_or_else(|| DEFAULT_PROVIDER.to_string());
    let city = query.city().unwrap_or(DEFAULT_CITY).to_string();
    let postal_code = query.postal_code().unwrap_or(DEFAULT_POSTAL_CODE).to_string();
    let centre = city_centre(&city);
    let slug = slug(&city);

    (1..=POINTS_PER_QUERY)
        .map(|n| {
            let offset = 0.004 * n as f64;
            PickupPoint {
                id: format!("mock-{provider}-{slug}-{n}"),
                provider: provider.clone(),
                name: format!("{} {} #{}", provider.to_uppercase(), city, n),
                address: format!("ul. Przykładowa {}", n * 10),
                city: city.clone(),
                postal_code: postal_code.clone(),
                country: "PL".to_string(),
                distance: Some(250.0 * n as f64),
                hours: Some(if n == 1 { "24/7" } else { "08:00-20:00" }.to_string()),
                coordinates: Some(Coordinates {
                    lat: centre.lat + offset,
                    lng: centre.lng - offset,
                }),
                raw_payload: json!({ "mock": true, "index": n }),
            }
        })
        .collect()
}

fn city_centre(city: &str) -> Coordinates {
    let wanted = city.trim().to_lowercase();
    KNOWN_CITIES
        .iter()
        .find(|(name, _, _)| *name == wanted)
        .map(|&(_, lat, lng)| Coordinates { lat, lng })
        .unwrap_or(COUNTRY_CENTRE)
}

fn slug(city: &str) -> String {
    let slug: String = city
        .trim()
        .to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { '-' })
        .collect();
    slug.trim_matches('-').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_warszawa_inpost_is_fixed() {
        let query = SearchQuery::for_city("Warszawa").with_provider("inpost");
        let first = synthetic_points(&query);
        let second = synthetic_points(&query);

        assert_eq!(first, second);
        assert_eq!(first.len(), 2);
        assert!(first.iter().all(|p| p.provider == "inpost"));
        assert_eq!(first[0].id, "mock-inpost-warszawa-1");
        assert_eq!(first[1].id, "mock-inpost-warszawa-2");
        assert_eq!(first[0].city, "Warszawa");
        let coords = first[0].coordinates.unwrap();
        assert!((coords.lat - 52.2337).abs() < 1e-9);
    }

    #[test]
    fn test_provider_falls_back_to_first_courier_service() {
        let query = SearchQuery::for_city("Poznań").with_courier_services(["DHL", "dpd"]);
        assert!(synthetic_points(&query).iter().all(|p| p.provider == "dhl"));

        let bare = SearchQuery::default().with_postal_code("61-001");
        let points = synthetic_points(&bare);
        assert!(points.iter().all(|p| p.provider == "inpost"));
        assert_eq!(points[0].city, "Unknown");
        assert_eq!(points[0].postal_code, "61-001");
    }

    #[test]
    fn test_unknown_city_uses_country_centre() {
        let points = synthetic_points(&SearchQuery::for_city("Zakopane"));
        let coords = points[0].coordinates.unwrap();
        assert!((coords.lat - (COUNTRY_CENTRE.lat + 0.004)).abs() < 1e-9);
        assert_eq!(points[0].id, "mock-inpost-zakopane-1");
    }
}
