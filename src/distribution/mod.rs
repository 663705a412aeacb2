//! Protocol distribution
//!
//! Turns the `protocolCounts` statistics into contiguous circular arcs, one
//! per category, in the order the backend reported them.

use serde::Serialize;
use serde_json::{Map, Value};

/// Color used for categories missing from the palette
pub const FALLBACK_COLOR: &str = "#6b7280";

/// Display colors keyed by lower-cased category label
const PALETTE: &[(&str, &str)] = &[
    ("ssh", "#ef4444"),
    ("http", "#3b82f6"),
    ("https", "#6366f1"),
    ("ftp", "#f59e0b"),
    ("telnet", "#10b981"),
    ("smtp", "#8b5cf6"),
    ("mysql", "#ec4899"),
    ("rdp", "#14b8a6"),
    ("smb", "#f97316"),
    ("dns", "#84cc16"),
    ("unknown", "#9ca3af"),
];

/// Display color for a category label. Never fails.
pub fn color_for(label: &str) -> &'static str {
    let key = label.to_lowercase();
    PALETTE
        .iter()
        .find(|(name, _)| *name == key)
        .map(|(_, color)| *color)
        .unwrap_or(FALLBACK_COLOR)
}

/// One category's share of the total
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Slice {
    pub label: String,
    pub count: f64,
    pub color: &'static str,
    /// Degrees, measured from 0 at the start of the first slice
    pub start_angle: f64,
    pub end_angle: f64,
}

impl Slice {
    pub fn sweep(&self) -> f64 {
        self.end_angle - self.start_angle
    }

    /// Share of the total as a percentage
    pub fn percent(&self) -> f64 {
        self.sweep() / 360.0 * 100.0
    }

    /// SVG path data for this slice as a sector of a circle centred on
    /// `(cx, cy)`. Angles run clockwise from 12 o'clock.
    pub fn sector_path(&self, cx: f64, cy: f64, r: f64) -> String {
        let sweep = self.sweep();
        if sweep >= 360.0 {
            // A single arc cannot start and end on the same point.
            return format!(
                "M {:.3} {:.3} m {:.3} 0 a {r:.3} {r:.3} 0 1 0 {:.3} 0 a {r:.3} {r:.3} 0 1 0 {:.3} 0 Z",
                cx,
                cy,
                -r,
                2.0 * r,
                -2.0 * r,
            );
        }
        let (x1, y1) = polar(cx, cy, r, self.start_angle);
        let (x2, y2) = polar(cx, cy, r, self.end_angle);
        let large_arc = u8::from(sweep > 180.0);
        format!(
            "M {cx:.3} {cy:.3} L {x1:.3} {y1:.3} A {r:.3} {r:.3} 0 {large_arc} 1 {x2:.3} {y2:.3} Z"
        )
    }
}

fn polar(cx: f64, cy: f64, r: f64, degrees: f64) -> (f64, f64) {
    let radians = (degrees - 90.0).to_radians();
    (cx + r * radians.cos(), cy + r * radians.sin())
}

/// Result of a distribution computation
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", content = "slices", rename_all = "snake_case")]
pub enum Distribution {
    /// Counts summed to zero
    Empty,
    Slices(Vec<Slice>),
}

impl Distribution {
    pub fn is_empty(&self) -> bool {
        matches!(self, Distribution::Empty)
    }

    pub fn slices(&self) -> &[Slice] {
        match self {
            Distribution::Empty => &[],
            Distribution::Slices(slices) => slices,
        }
    }
}

/// Count value as a non-negative number; anything else counts as zero.
fn count_of(value: &Value) -> f64 {
    let count = match value {
        Value::Number(n) => n.as_f64().unwrap_or(0.0),
        Value::String(s) => s.trim().parse::<f64>().unwrap_or(0.0),
        _ => 0.0,
    };
    if count.is_finite() && count > 0.0 {
        count
    } else {
        0.0
    }
}

/// Compute contiguous arcs for `counts`, preserving input order.
pub fn compute_distribution(counts: &Map<String, Value>) -> Distribution {
    let total: f64 = counts.values().map(count_of).sum();
    if total <= 0.0 {
        return Distribution::Empty;
    }

    let mut cursor = 0.0;
    let slices = counts
        .iter()
        .map(|(label, value)| {
            let count = count_of(value);
            let start_angle = cursor;
            let end_angle = start_angle + count / total * 360.0;
            cursor = end_angle;
            Slice {
                label: label.clone(),
                count,
                color: color_for(label),
                start_angle,
                end_angle,
            }
        })
        .collect();

    Distribution::Slices(slices)
}
