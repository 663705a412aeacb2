//! Data models module
//!
//! Defines the captured event record, the backend statistics object and the
//! dataset pair replaced on every synchronization tick.

use chrono::{DateTime, Utc};
use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::utils::parse_event_timestamp;

/// Category label used when an event carries no `protocol`.
pub const UNKNOWN_CATEGORY: &str = "UNKNOWN";

/// One captured interaction delivered by a decoy service.
///
/// The record has no fixed schema; only a handful of canonical fields are
/// given accessors here. Everything else is reached through dotted field
/// paths (see `crate::filter::resolve_path`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Event(Value);

impl Event {
    pub fn new(value: Value) -> Self {
        Self(value)
    }

    pub fn as_value(&self) -> &Value {
        &self.0
    }

    pub fn into_value(self) -> Value {
        self.0
    }

    /// Top-level mapping, if the record is an object.
    pub fn fields(&self) -> Option<&Map<String, Value>> {
        self.0.as_object()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields()?.get(key)
    }

    /// Uppercased protocol label, `UNKNOWN` when absent or null.
    pub fn category(&self) -> String {
        match self.get("protocol") {
            None | Some(Value::Null) => UNKNOWN_CATEGORY.to_string(),
            Some(Value::String(s)) => s.to_uppercase(),
            Some(other) => other.to_string().to_uppercase(),
        }
    }

    /// Origin address, when present as a non-empty string.
    pub fn ip(&self) -> Option<&str> {
        self.get("ip")
            .and_then(Value::as_str)
            .filter(|ip| !ip.trim().is_empty())
    }

    pub fn kind(&self) -> Option<&str> {
        self.get("type").and_then(Value::as_str)
    }

    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        self.get("timestamp").and_then(parse_event_timestamp)
    }

    pub fn location(&self) -> Option<&Map<String, Value>> {
        self.get("location").and_then(Value::as_object)
    }

    /// `(lat, lon)` when `location.lat` and `location.lon` are finite numbers.
    pub fn coordinates(&self) -> Option<(f64, f64)> {
        let location = self.location()?;
        let lat = location.get("lat").and_then(Value::as_f64)?;
        let lon = location.get("lon").and_then(Value::as_f64)?;
        if lat.is_finite() && lon.is_finite() {
            Some((lat, lon))
        } else {
            None
        }
    }
}

impl From<Value> for Event {
    fn from(value: Value) -> Self {
        Self(value)
    }
}

/// Aggregate statistics served by `GET /stats`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Stats {
    #[serde(deserialize_with = "lenient_count")]
    pub total_attacks: u64,
    #[serde(rename = "uniqueIPs", deserialize_with = "lenient_count")]
    pub unique_ips: u64,
    #[serde(deserialize_with = "lenient_count")]
    pub active_honeypots: u64,
    #[serde(deserialize_with = "lenient_count")]
    pub commands_logged: u64,
    /// Category label -> count, in backend order
    #[serde(deserialize_with = "lenient_map")]
    pub protocol_counts: Map<String, Value>,
}

impl Stats {
    /// Build statistics from a raw payload; null is the empty mapping.
    ///
    /// Anything but an object or null is rejected.
    pub fn from_payload(payload: Value) -> Result<Self, serde_json::Error> {
        match payload {
            Value::Null => Ok(Self::default()),
            object @ Value::Object(_) => serde_json::from_value(object),
            other => Err(de::Error::custom(format!(
                "expected statistics object, got {}",
                value_kind(&other)
            ))),
        }
    }
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Counter that accepts null (as 0) and integral floats such as `12.0`.
fn lenient_count<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::Null => Ok(0),
        Value::Number(n) => n
            .as_u64()
            .or_else(|| {
                n.as_f64()
                    .filter(|f| f.fract() == 0.0 && *f >= 0.0 && *f <= u64::MAX as f64)
                    .map(|f| f as u64)
            })
            .ok_or_else(|| de::Error::custom(format!("invalid counter value {}", n))),
        other => Err(de::Error::custom(format!(
            "invalid counter type: {}",
            value_kind(&other)
        ))),
    }
}

/// Mapping that accepts null as empty.
fn lenient_map<'de, D>(deserializer: D) -> Result<Map<String, Value>, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::Null => Ok(Map::new()),
        Value::Object(map) => Ok(map),
        other => Err(de::Error::custom(format!(
            "invalid protocol counts type: {}",
            value_kind(&other)
        ))),
    }
}

/// Event collection and statistics, replaced together on every successful tick
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Dataset {
    pub events: Vec<Event>,
    pub stats: Stats,
}

impl Dataset {
    /// Build a dataset from raw `/logs` and `/stats` payloads.
    ///
    /// A non-array event payload is an empty collection.
    pub fn from_payloads(logs: Value, stats: Value) -> Result<Self, serde_json::Error> {
        let events = match logs {
            Value::Array(items) => items.into_iter().map(Event::new).collect(),
            _ => Vec::new(),
        };
        Ok(Self {
            events,
            stats: Stats::from_payload(stats)?,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_category_uppercases_and_defaults() {
        assert_eq!(Event::new(json!({"protocol": "ssh"})).category(), "SSH");
        assert_eq!(Event::new(json!({"protocol": null})).category(), "UNKNOWN");
        assert_eq!(Event::new(json!({"ip": "1.2.3.4"})).category(), "UNKNOWN");
        assert_eq!(Event::new(json!("not an object")).category(), "UNKNOWN");
    }

    #[test]
    fn test_coordinates_require_numbers() {
        let ok = Event::new(json!({"location": {"lat": 10.5, "lon": -3}}));
        assert_eq!(ok.coordinates(), Some((10.5, -3.0)));

        let strings = Event::new(json!({"location": {"lat": "10", "lon": "20"}}));
        assert_eq!(strings.coordinates(), None);

        let missing = Event::new(json!({"location": {"lat": 1}}));
        assert_eq!(missing.coordinates(), None);
    }

    #[test]
    fn test_ip_ignores_blank() {
        assert_eq!(Event::new(json!({"ip": "  "})).ip(), None);
        assert_eq!(Event::new(json!({"ip": 42})).ip(), None);
        assert_eq!(Event::new(json!({"ip": "10.0.0.1"})).ip(), Some("10.0.0.1"));
    }

    #[test]
    fn test_dataset_tolerates_shapes() {
        let ds = Dataset::from_payloads(json!({"oops": true}), Value::Null).unwrap();
        assert!(ds.is_empty());
        assert_eq!(ds.stats, Stats::default());

        let ds = Dataset::from_payloads(
            json!([{"ip": "1.1.1.1"}, 7]),
            json!({"totalAttacks": 2, "uniqueIPs": 1, "protocolCounts": {"ssh": 2}}),
        )
        .unwrap();
        assert_eq!(ds.events.len(), 2);
        assert_eq!(ds.stats.total_attacks, 2);
        assert_eq!(ds.stats.unique_ips, 1);
        assert_eq!(ds.stats.active_honeypots, 0);
        assert_eq!(ds.stats.protocol_counts.get("ssh"), Some(&json!(2)));
    }

    #[test]
    fn test_stats_rejects_ill_typed_fields() {
        assert!(Stats::from_payload(json!({"totalAttacks": "many"})).is_err());
        assert!(Stats::from_payload(json!([1, 2])).is_err());
        assert!(Stats::from_payload(json!([7, 3])).is_err());
        assert!(Stats::from_payload(json!("7")).is_err());
        assert!(Stats::from_payload(json!({"totalAttacks": 1.5})).is_err());
        assert!(Stats::from_payload(json!({"totalAttacks": -2})).is_err());
        assert!(Stats::from_payload(json!({"protocolCounts": [1]})).is_err());
    }

    #[test]
    fn test_stats_tolerate_null_and_float_counters() {
        let stats = Stats::from_payload(json!({
            "totalAttacks": 12.0,
            "uniqueIPs": null,
            "activeHoneypots": 3,
            "protocolCounts": null
        }))
        .unwrap();
        assert_eq!(stats.total_attacks, 12);
        assert_eq!(stats.unique_ips, 0);
        assert_eq!(stats.active_honeypots, 3);
        assert!(stats.protocol_counts.is_empty());

        let ds = Dataset::from_payloads(
            json!([{"ip": "1.1.1.1"}]),
            json!({"protocolCounts": null}),
        )
        .unwrap();
        assert_eq!(ds.events.len(), 1);
        assert!(ds.stats.protocol_counts.is_empty());
    }

    #[test]
    fn test_protocol_counts_keep_backend_order() {
        let stats = Stats::from_payload(json!({"protocolCounts": {"telnet": 1, "ssh": 5, "ftp": 2}}))
            .unwrap();
        let keys: Vec<&str> = stats.protocol_counts.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["telnet", "ssh", "ftp"]);
    }
}
