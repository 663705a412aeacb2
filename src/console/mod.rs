//! Console state container
//!
//! Owns the current dataset and everything derived from it. Each input
//! change (new dataset, constraint edit, surface resize) recomputes the
//! affected views through the pure functions of `schema`, `filter`, `geo`
//! and `distribution`; nothing else holds state between calls.

pub mod render;

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::distribution::{compute_distribution, Distribution};
use crate::filter::{filter_indices, Constraints};
use crate::geo::{aggregate_markers, Marker, Point, Surface};
use crate::models::{Dataset, Event, Stats};
use crate::schema::{discover_schema, Schema};
use crate::sync::{SyncHandle, SyncUpdate};

/// Target name for console operational logs
const TARGET_CONSOLE: &str = "console";

/// A marker placed on the current surface
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlacedMarker<'a> {
    pub marker: &'a Marker,
    pub position: Point,
    pub radius: f64,
}

pub struct Console {
    dataset: Dataset,
    last_sync: Option<DateTime<Utc>>,
    schema: Schema,
    constraints: Constraints,
    /// Indices into `dataset.events` passing the constraints, in order
    visible: Vec<usize>,
    markers: Vec<Marker>,
    distribution: Distribution,
    surface: Surface,
}

impl Console {
    pub fn new(surface: Surface) -> Self {
        Self {
            dataset: Dataset::default(),
            last_sync: None,
            schema: Schema::default(),
            constraints: Constraints::new(),
            visible: Vec::new(),
            markers: Vec::new(),
            distribution: Distribution::Empty,
            surface,
        }
    }

    /// Apply a synchronizer update if it belongs to the current generation.
    ///
    /// Returns whether the update was applied.
    pub fn apply_update(&mut self, update: SyncUpdate, handle: &SyncHandle) -> bool {
        if !handle.is_current(&update) {
            debug!(
                target: TARGET_CONSOLE,
                generation = update.generation,
                current = handle.current_generation(),
                "Discarding stale update"
            );
            return false;
        }
        self.replace_dataset(update.dataset, update.fetched_at);
        true
    }

    /// Replace events and statistics wholesale and rebuild all derived state.
    pub fn replace_dataset(&mut self, dataset: Dataset, fetched_at: DateTime<Utc>) {
        self.dataset = dataset;
        self.last_sync = Some(fetched_at);
        self.schema = discover_schema(&self.dataset.events);
        self.distribution = compute_distribution(&self.dataset.stats.protocol_counts);
        self.refilter();
        debug!(
            target: TARGET_CONSOLE,
            events = self.dataset.events.len(),
            fields = self.schema.len(),
            visible = self.visible.len(),
            markers = self.markers.len(),
            "Dataset replaced"
        );
    }

    /// Set or clear (blank pattern) the constraint on one field.
    pub fn set_constraint(&mut self, field: impl Into<String>, pattern: impl Into<String>) {
        self.constraints.set(field, pattern);
        self.refilter();
    }

    pub fn set_constraints(&mut self, constraints: Constraints) {
        self.constraints = constraints;
        self.refilter();
    }

    pub fn clear_constraints(&mut self) {
        self.constraints.clear();
        self.refilter();
    }

    /// Feed a newly observed surface size.
    pub fn resize(&mut self, width: f64, height: f64) {
        self.surface.resize(width, height);
    }

    fn refilter(&mut self) {
        self.visible = filter_indices(&self.dataset.events, &self.constraints);
        self.markers = aggregate_markers(self.visible_events());
    }

    pub fn dataset(&self) -> &Dataset {
        &self.dataset
    }

    pub fn events(&self) -> &[Event] {
        &self.dataset.events
    }

    pub fn stats(&self) -> &Stats {
        &self.dataset.stats
    }

    pub fn last_sync(&self) -> Option<DateTime<Utc>> {
        self.last_sync
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn constraints(&self) -> &Constraints {
        &self.constraints
    }

    pub fn surface(&self) -> Surface {
        self.surface
    }

    pub fn visible_events(&self) -> impl Iterator<Item = &Event> + '_ {
        self.visible.iter().map(|&idx| &self.dataset.events[idx])
    }

    pub fn visible_count(&self) -> usize {
        self.visible.len()
    }

    pub fn markers(&self) -> &[Marker] {
        &self.markers
    }

    /// Markers with coordinates projected on the current surface
    pub fn placed_markers(&self) -> Vec<PlacedMarker<'_>> {
        self.markers
            .iter()
            .map(|marker| PlacedMarker {
                marker,
                position: marker.projected(self.surface),
                radius: marker.radius(),
            })
            .collect()
    }

    pub fn distribution(&self) -> &Distribution {
        &self.distribution
    }
}

impl Default for Console {
    fn default() -> Self {
        Self::new(Surface::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::testing::MockBackend;
    use crate::sync::Synchronizer;
    use serde_json::json;
    use std::sync::atomic::Ordering;
    use std::sync::Arc;
    use std::time::Duration;

    fn dataset(events: serde_json::Value, stats: serde_json::Value) -> Dataset {
        Dataset::from_payloads(events, stats).unwrap()
    }

    fn honeypot_dataset() -> Dataset {
        dataset(
            json!([
                {"ip": "1.2.3.4", "protocol": "ssh", "command": "uname -a",
                 "location": {"lat": 0, "lon": 0, "city": "Null Island"}},
                {"ip": "1.2.3.4", "protocol": "ssh", "command": "wget x",
                 "location": {"lat": 0, "lon": 0}},
                {"ip": "1.2.3.4", "protocol": "ssh", "command": "cat /etc/passwd",
                 "location": {"lat": 0, "lon": 0}},
                {"ip": "9.9.9.9", "protocol": "http", "headers": {"User-Agent": "zgrab"},
                 "location": {"lat": 90, "lon": -180}},
                {"ip": "7.7.7.7", "protocol": "telnet", "data": "HTTP/200 OK"}
            ]),
            json!({"totalAttacks": 5, "protocolCounts": {"ssh": 3, "http": 1}}),
        )
    }

    #[test]
    fn test_replace_dataset_rebuilds_everything() {
        let mut console = Console::new(Surface::new(800.0, 400.0));
        console.replace_dataset(honeypot_dataset(), Utc::now());

        assert_eq!(console.visible_count(), 5);
        assert!(console.schema().contains("headers.User-Agent"));
        assert_eq!(console.markers().len(), 2);

        let placed = console.placed_markers();
        let busy = placed.iter().find(|p| p.marker.ip == "1.2.3.4").unwrap();
        assert_eq!(busy.marker.count, 3);
        assert_eq!(busy.radius, 11.0);
        assert_eq!(busy.position, Point { x: 400.0, y: 200.0 });

        let corner = placed.iter().find(|p| p.marker.ip == "9.9.9.9").unwrap();
        assert_eq!(corner.position, Point { x: 0.0, y: 0.0 });

        let slices = console.distribution().slices();
        assert_eq!(slices[0].sweep(), 270.0);
        assert_eq!(slices[1].sweep(), 90.0);
    }

    #[test]
    fn test_constraints_drive_markers() {
        let mut console = Console::default();
        console.replace_dataset(honeypot_dataset(), Utc::now());

        console.set_constraint("command", "WGET");
        assert_eq!(console.visible_count(), 1);
        assert_eq!(console.markers().len(), 1);
        assert_eq!(console.markers()[0].count, 1);

        // Distribution ignores filtering
        assert_eq!(console.distribution().slices().len(), 2);

        console.set_constraint("command", "  ");
        assert!(console.constraints().is_empty());
        assert_eq!(console.visible_count(), 5);
        assert_eq!(console.markers()[0].count, 3);
    }

    #[test]
    fn test_constraints_survive_new_dataset() {
        let mut console = Console::default();
        console.set_constraint("protocol", "telnet");
        console.replace_dataset(honeypot_dataset(), Utc::now());
        let visible: Vec<_> = console.visible_events().collect();
        assert_eq!(visible.len(), 1);
        assert_eq!(visible[0].ip(), Some("7.7.7.7"));

        console.clear_constraints();
        assert_eq!(console.visible_count(), 5);
    }

    #[test]
    fn test_resize_reprojects() {
        let mut console = Console::new(Surface::new(800.0, 400.0));
        console.replace_dataset(honeypot_dataset(), Utc::now());
        console.resize(400.0, 200.0);
        let placed = console.placed_markers();
        let busy = placed.iter().find(|p| p.marker.ip == "1.2.3.4").unwrap();
        assert_eq!(busy.position, Point { x: 200.0, y: 100.0 });
    }

    #[test]
    fn test_zero_counts_show_empty_distribution() {
        let mut console = Console::default();
        console.replace_dataset(
            dataset(json!([]), json!({"protocolCounts": {"ssh": 0}})),
            Utc::now(),
        );
        assert!(console.distribution().is_empty());
    }

    #[tokio::test]
    async fn test_failed_tick_keeps_previous_state() {
        let first = json!([{"ip": "1.1.1.1", "protocol": "ssh"}]);
        let second = json!([{"ip": "2.2.2.2", "protocol": "ftp"}, {"ip": "3.3.3.3"}]);
        let backend = Arc::new(MockBackend::new(
            vec![Ok(first), Err("timeout".into()), Ok(second)],
            json!({"protocolCounts": {"ssh": 1}}),
        ));
        let sync = Synchronizer::with_interval(
            Arc::clone(&backend),
            Duration::from_millis(200),
            Duration::from_secs(60),
        );
        let (handle, mut rx, task) = sync.spawn(4);
        let mut console = Console::default();

        let update = rx.recv().await.unwrap();
        assert!(console.apply_update(update, &handle));
        let before = console.dataset().clone();
        let schema_before = console.schema().clone();
        assert_eq!(before.events.len(), 1);

        // Wait for the failing tick, then drain whatever it produced.
        while backend.log_calls.load(Ordering::SeqCst) < 2 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
        while let Ok(update) = rx.try_recv() {
            console.apply_update(update, &handle);
        }
        assert_eq!(console.dataset(), &before);
        assert_eq!(console.schema(), &schema_before);

        let update = rx.recv().await.unwrap();
        assert!(console.apply_update(update, &handle));
        assert_eq!(console.events().len(), 2);
        assert!(console.schema().categories("ip").unwrap().contains("FTP"));
        assert!(!console.schema().categories("ip").unwrap().contains("SSH"));

        handle.cancel();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_update_after_cancel_is_discarded() {
        let backend = MockBackend::new(vec![Ok(json!([{"ip": "1.1.1.1"}]))], json!({}));
        let sync = Synchronizer::with_interval(
            Arc::new(backend),
            Duration::from_millis(10),
            Duration::from_secs(60),
        );
        let (handle, mut rx, task) = sync.spawn(4);
        let update = rx.recv().await.unwrap();

        handle.cancel();
        let mut console = Console::default();
        assert!(!console.apply_update(update, &handle));
        assert!(console.events().is_empty());
        assert!(console.last_sync().is_none());

        task.await.unwrap();
    }
}
