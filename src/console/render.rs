//! Text and SVG rendering of console views

use serde_json::Value;
use std::fmt::Write as _;

use crate::distribution::Distribution;
use crate::filter::{resolve_path, stringify};
use crate::geo::{Marker, Surface};
use crate::models::Event;
use crate::schema::Schema;
use crate::utils::format_timestamp;

use super::Console;

/// Fields tried, in order, for the one-line event summary
const SUMMARY_FIELDS: &[&str] = &["command", "data", "raw", "path", "message"];
const SUMMARY_WIDTH: usize = 72;

fn truncate(text: &str, width: usize) -> String {
    let mut chars = text.chars();
    let head: String = chars.by_ref().take(width).collect();
    if chars.next().is_some() {
        format!("{}…", head)
    } else {
        head
    }
}

fn one_line(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Sorted field list with the categories that emit each field
pub fn render_fields(schema: &Schema) -> String {
    if schema.is_empty() {
        return "No fields discovered\n".to_string();
    }
    let width = schema.fields.iter().map(|f| f.len()).max().unwrap_or(0);
    let mut out = String::new();
    for field in &schema.fields {
        let _ = writeln!(
            out,
            "{:<width$}  [{}]",
            field,
            schema.provenance_label(field),
            width = width
        );
    }
    out
}

/// One line per event: time, category, origin, kind, summary
pub fn render_event_line(event: &Event) -> String {
    let time = event
        .timestamp()
        .map(|ts| format_timestamp(&ts))
        .unwrap_or_else(|| "-".to_string());
    let summary = SUMMARY_FIELDS
        .iter()
        .find_map(|field| resolve_path(event, field).non_null())
        .map(|value| truncate(&one_line(&stringify(value)), SUMMARY_WIDTH))
        .unwrap_or_default();
    format!(
        "{:<20}  {:<8}  {:<15}  {:<12}  {}",
        time,
        event.category(),
        event.ip().unwrap_or("-"),
        event.kind().unwrap_or("-"),
        summary
    )
}

/// Up to `limit` events, followed by a note when more were hidden
pub fn render_events<'a, I>(events: I, total: usize, limit: usize) -> String
where
    I: IntoIterator<Item = &'a Event>,
{
    let mut out = String::new();
    let mut shown = 0;
    for event in events.into_iter().take(limit) {
        out.push_str(&render_event_line(event));
        out.push('\n');
        shown += 1;
    }
    if shown == 0 {
        out.push_str("No events match\n");
    } else if total > shown {
        let _ = writeln!(out, "… {} more not shown", total - shown);
    }
    out
}

/// Marker table with projected coordinates
pub fn render_markers(markers: &[Marker], surface: Surface) -> String {
    if markers.is_empty() {
        return "No located events\n".to_string();
    }
    let mut sorted: Vec<&Marker> = markers.iter().collect();
    sorted.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.ip.cmp(&b.ip)));

    let mut out = String::new();
    let _ = writeln!(
        out,
        "{:<15}  {:>5}  {:>7}  {:>8}  {:>8}  {:>6}  place",
        "ip", "hits", "radius", "x", "y", "lat"
    );
    for marker in sorted {
        let point = marker.projected(surface);
        let _ = writeln!(
            out,
            "{:<15}  {:>5}  {:>7.1}  {:>8.1}  {:>8.1}  {:>6.1}  {}",
            marker.ip,
            marker.count,
            marker.radius(),
            point.x,
            point.y,
            marker.lat,
            marker.place()
        );
    }
    out
}

pub fn render_distribution(distribution: &Distribution) -> String {
    match distribution {
        Distribution::Empty => "No protocol data\n".to_string(),
        Distribution::Slices(slices) => {
            let mut out = String::new();
            for slice in slices {
                let _ = writeln!(
                    out,
                    "{:<10}  {:>8}  {:>5.1}%  {:>6.1}° → {:>6.1}°  {}",
                    slice.label,
                    slice.count,
                    slice.percent(),
                    slice.start_angle,
                    slice.end_angle,
                    slice.color
                );
            }
            out
        }
    }
}

/// Full console snapshot as printed after each applied update
pub fn render_summary(console: &Console, event_limit: usize) -> String {
    let stats = console.stats();
    let mut out = String::new();
    let synced = console
        .last_sync()
        .map(|ts| format_timestamp(&ts))
        .unwrap_or_else(|| "never".to_string());
    let _ = writeln!(out, "=== honeyscope @ {} ===", synced);
    let _ = writeln!(
        out,
        "attacks {}  unique ips {}  active honeypots {}  commands {}",
        stats.total_attacks, stats.unique_ips, stats.active_honeypots, stats.commands_logged
    );
    let _ = writeln!(
        out,
        "fields {}  events {}/{}",
        console.schema().len(),
        console.visible_count(),
        console.events().len()
    );
    if !console.constraints().is_empty() {
        let active: Vec<String> = console
            .constraints()
            .iter()
            .map(|(field, pattern)| format!("{field}~{pattern:?}"))
            .collect();
        let _ = writeln!(out, "filters {}", active.join(" AND "));
    }
    out.push_str("\n-- events --\n");
    out.push_str(&render_events(
        console.visible_events(),
        console.visible_count(),
        event_limit,
    ));
    out.push_str("\n-- map --\n");
    out.push_str(&render_markers(console.markers(), console.surface()));
    out.push_str("\n-- protocols --\n");
    out.push_str(&render_distribution(console.distribution()));
    out
}

fn xml_escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// SVG with one circle per marker on a `surface`-sized canvas
pub fn svg_map(markers: &[Marker], surface: Surface) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        r#"<svg xmlns="http://www.w3.org/2000/svg" width="{w}" height="{h}" viewBox="0 0 {w} {h}">"#,
        w = surface.width,
        h = surface.height
    );
    let _ = writeln!(
        out,
        r##"  <rect width="100%" height="100%" fill="#0f172a"/>"##
    );
    for marker in markers {
        let point = marker.projected(surface);
        let _ = writeln!(
            out,
            r##"  <circle cx="{:.2}" cy="{:.2}" r="{:.1}" fill="#ef4444" fill-opacity="0.6"><title>{} ({} hits) {}</title></circle>"##,
            point.x,
            point.y,
            marker.radius(),
            xml_escape(&marker.ip),
            marker.count,
            xml_escape(&marker.place())
        );
    }
    out.push_str("</svg>\n");
    out
}

/// SVG pie chart of the distribution, `size` pixels square
pub fn svg_pie(distribution: &Distribution, size: f64) -> String {
    let c = size / 2.0;
    let r = size / 2.0 - 2.0;
    let mut out = String::new();
    let _ = writeln!(
        out,
        r#"<svg xmlns="http://www.w3.org/2000/svg" width="{size}" height="{size}" viewBox="0 0 {size} {size}">"#
    );
    match distribution {
        Distribution::Empty => {
            let _ = writeln!(
                out,
                r#"  <text x="{c}" y="{c}" text-anchor="middle">No data</text>"#
            );
        }
        Distribution::Slices(slices) => {
            for slice in slices.iter().filter(|s| s.sweep() > 0.0) {
                let _ = writeln!(
                    out,
                    r#"  <path d="{}" fill="{}"><title>{}: {}</title></path>"#,
                    slice.sector_path(c, c, r),
                    slice.color,
                    xml_escape(&slice.label),
                    slice.count
                );
            }
        }
    }
    out.push_str("</svg>\n");
    out
}

/// Pretty JSON of one event, for detail views
pub fn render_event_detail(event: &Event) -> String {
    serde_json::to_string_pretty(event.as_value()).unwrap_or_else(|_| Value::Null.to_string())
}
