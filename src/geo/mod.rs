//! Geospatial aggregation
//!
//! Groups located events by origin address and projects marker coordinates
//! onto a rendering surface with an equirectangular mapping.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::HashMap;

use crate::models::Event;

/// Smallest marker radius (a single hit adds to this)
const RADIUS_BASE: f64 = 5.0;
/// Radius growth per hit
const RADIUS_PER_HIT: f64 = 2.0;
/// Radius cap so one noisy origin cannot dominate the map
const RADIUS_MAX: f64 = 18.0;

/// Observed size of the rendering surface
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Surface {
    pub width: f64,
    pub height: f64,
}

impl Surface {
    pub fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }

    /// Replace the size after the presentation layer observed a resize.
    pub fn resize(&mut self, width: f64, height: f64) {
        self.width = width;
        self.height = height;
    }
}

impl Default for Surface {
    fn default() -> Self {
        Self::new(800.0, 400.0)
    }
}

/// Planar position on a surface
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

/// Equirectangular projection of `(lat, lon)` onto `surface`.
pub fn project(lat: f64, lon: f64, surface: Surface) -> Point {
    Point {
        x: (lon + 180.0) / 360.0 * surface.width,
        y: (90.0 - lat) / 180.0 * surface.height,
    }
}

/// Marker radius for a hit count: linear growth, capped.
pub fn marker_radius(count: u64) -> f64 {
    (count as f64 * RADIUS_PER_HIT + RADIUS_BASE).min(RADIUS_MAX)
}

/// Per-origin aggregate over the current filtered view
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Marker {
    pub ip: String,
    pub lat: f64,
    pub lon: f64,
    /// Location attributes of the first event seen for this address
    pub location: Map<String, Value>,
    pub count: u64,
    pub last_seen: Option<DateTime<Utc>>,
}

impl Marker {
    pub fn city(&self) -> Option<&str> {
        self.location.get("city").and_then(Value::as_str)
    }

    pub fn country(&self) -> Option<&str> {
        self.location.get("country").and_then(Value::as_str)
    }

    pub fn radius(&self) -> f64 {
        marker_radius(self.count)
    }

    pub fn projected(&self, surface: Surface) -> Point {
        project(self.lat, self.lon, surface)
    }

    /// "City, Country" where available
    pub fn place(&self) -> String {
        match (self.city(), self.country()) {
            (Some(city), Some(country)) => format!("{city}, {country}"),
            (Some(city), None) => city.to_string(),
            (None, Some(country)) => country.to_string(),
            (None, None) => "-".to_string(),
        }
    }
}

/// Build one marker per origin address from located events.
///
/// Events without an address or numeric coordinates are skipped. Markers
/// come out in first-seen order.
pub fn aggregate_markers<'a, I>(events: I) -> Vec<Marker>
where
    I: IntoIterator<Item = &'a Event>,
{
    let mut markers: Vec<Marker> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();

    for event in events {
        let (Some(ip), Some((lat, lon)), Some(location)) =
            (event.ip(), event.coordinates(), event.location())
        else {
            continue;
        };
        let seen = event.timestamp();

        let slot = match index.get(ip) {
            Some(&slot) => slot,
            None => {
                index.insert(ip.to_string(), markers.len());
                markers.push(Marker {
                    ip: ip.to_string(),
                    lat,
                    lon,
                    location: location.clone(),
                    count: 0,
                    last_seen: None,
                });
                markers.len() - 1
            }
        };

        let marker = &mut markers[slot];
        marker.count += 1;
        if seen > marker.last_seen {
            marker.last_seen = seen;
        }
    }

    markers
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_projection() {
        let surface = Surface::new(800.0, 400.0);
        assert_eq!(project(0.0, 0.0, surface), Point { x: 400.0, y: 200.0 });
        assert_eq!(project(90.0, -180.0, surface), Point { x: 0.0, y: 0.0 });
        assert_eq!(project(-90.0, 180.0, surface), Point { x: 800.0, y: 400.0 });
    }

    #[test]
    fn test_projection_follows_resize() {
        let mut surface = Surface::new(800.0, 400.0);
        surface.resize(1600.0, 900.0);
        assert_eq!(project(0.0, 0.0, surface), Point { x: 800.0, y: 450.0 });
    }

    #[test]
    fn test_radius_monotone_and_capped() {
        assert_eq!(marker_radius(1), 7.0);
        assert_eq!(marker_radius(3), 11.0);
        assert_eq!(marker_radius(6), 17.0);
        assert_eq!(marker_radius(7), 18.0);
        assert_eq!(marker_radius(10_000), 18.0);

        let mut previous = marker_radius(0);
        for count in 1..50 {
            let r = marker_radius(count);
            assert!(r >= previous);
            previous = r;
        }
    }

    #[test]
    fn test_aggregates_by_ip() {
        let events: Vec<Event> = vec![
            json!({"ip": "1.2.3.4", "location": {"lat": 10, "lon": 20, "city": "A"},
                   "timestamp": "2024-01-01T00:00:00Z"}),
            json!({"ip": "1.2.3.4", "location": {"lat": 11, "lon": 21, "city": "B"},
                   "timestamp": "2024-01-03T00:00:00Z"}),
            json!({"ip": "1.2.3.4", "location": {"lat": 12, "lon": 22, "city": "C"},
                   "timestamp": "2024-01-02T00:00:00Z"}),
            json!({"ip": "5.6.7.8", "location": {"lat": -1.5, "lon": 3}}),
        ]
        .into_iter()
        .map(Event::new)
        .collect();

        let markers = aggregate_markers(&events);
        assert_eq!(markers.len(), 2);

        let first = markers.iter().find(|m| m.ip == "1.2.3.4").unwrap();
        assert_eq!(first.count, 3);
        assert_eq!(first.radius(), 11.0);
        assert_eq!(first.city(), Some("A"));
        assert_eq!((first.lat, first.lon), (10.0, 20.0));
        assert_eq!(
            first.last_seen.map(|ts| ts.to_rfc3339()),
            Some("2024-01-03T00:00:00+00:00".to_string())
        );

        let second = markers.iter().find(|m| m.ip == "5.6.7.8").unwrap();
        assert_eq!(second.count, 1);
        assert_eq!(second.last_seen, None);
        assert_eq!(second.place(), "-");
    }

    #[test]
    fn test_skips_unlocated_events() {
        let events: Vec<Event> = vec![
            json!({"ip": "1.1.1.1"}),
            json!({"ip": "1.1.1.1", "location": {"lat": "10", "lon": "20"}}),
            json!({"ip": "", "location": {"lat": 1, "lon": 1}}),
            json!({"location": {"lat": 1, "lon": 1}}),
            json!({"ip": "2.2.2.2", "location": {"lat": 1}}),
            json!({"ip": "3.3.3.3", "location": null}),
        ]
        .into_iter()
        .map(Event::new)
        .collect();

        assert!(aggregate_markers(&events).is_empty());
    }

    #[test]
    fn test_marker_projection() {
        let events = vec![Event::new(
            json!({"ip": "8.8.8.8", "location": {"lat": 0, "lon": 0, "city": "Null Island", "country": "XX"}}),
        )];
        let markers = aggregate_markers(&events);
        assert_eq!(
            markers[0].projected(Surface::default()),
            Point { x: 400.0, y: 200.0 }
        );
        assert_eq!(markers[0].place(), "Null Island, XX");
    }
}
