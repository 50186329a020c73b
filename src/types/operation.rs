//! Touch operations and raw pointer input

use serde::{Deserialize, Serialize};

/// Kind of a touch operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    /// Pointer went down
    Tap,
    /// Pointer moved while down
    Drag,
    /// Long press, synthesized upstream
    Hold,
}

impl OperationKind {
    /// Does this kind count toward the classification cadence?
    pub fn counts_for_classification(&self) -> bool {
        !matches!(self, OperationKind::Drag)
    }
}

impl std::fmt::Display for OperationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            OperationKind::Tap => "tap",
            OperationKind::Drag => "drag",
            OperationKind::Hold => "hold",
        };
        write!(f, "{}", name)
    }
}

/// A single immutable touch sample
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TouchOperation {
    pub x: f64,
    pub y: f64,
    /// Wall clock, milliseconds since the Unix epoch
    pub timestamp: i64,
    #[serde(rename = "type")]
    pub kind: OperationKind,
    /// Hold length in milliseconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
    /// Pointer speed in pixels per millisecond
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub velocity: Option<f64>,
}

impl TouchOperation {
    /// Create an operation without duration or velocity
    pub fn new(kind: OperationKind, x: f64, y: f64, timestamp: i64) -> Self {
        Self {
            x,
            y,
            timestamp,
            kind,
            duration: None,
            velocity: None,
        }
    }

    pub fn tap(x: f64, y: f64, timestamp: i64) -> Self {
        Self::new(OperationKind::Tap, x, y, timestamp)
    }

    pub fn drag(x: f64, y: f64, timestamp: i64) -> Self {
        Self::new(OperationKind::Drag, x, y, timestamp)
    }

    pub fn hold(x: f64, y: f64, timestamp: i64) -> Self {
        Self::new(OperationKind::Hold, x, y, timestamp)
    }

    pub fn with_duration(mut self, duration_ms: f64) -> Self {
        self.duration = Some(duration_ms);
        self
    }

    pub fn with_velocity(mut self, velocity: f64) -> Self {
        self.velocity = Some(velocity);
        self
    }

    /// Position of the operation
    pub fn position(&self) -> Point {
        Point::new(self.x, self.y)
    }
}

/// Canvas position in pixels
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn distance_to(&self, other: &Point) -> f64 {
        ((self.x - other.x).powi(2) + (self.y - other.y).powi(2)).sqrt()
    }
}

/// Raw pointer/touch input as delivered by the host surface
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "phase", rename_all = "snake_case")]
pub enum PointerEvent {
    /// Touch start / mouse down
    Down { x: f64, y: f64 },
    /// Touch move
    Move { x: f64, y: f64 },
    /// Touch end / mouse up
    Up,
    /// Long press recognized by an upstream gesture detector
    Hold {
        x: f64,
        y: f64,
        #[serde(default = "default_hold_ms")]
        duration_ms: f64,
    },
}

fn default_hold_ms() -> f64 {
    crate::core::controller::DEFAULT_HOLD_MS
}

impl PointerEvent {
    /// Parse a terminal command such as `down 10 20`, `move 3 4`, `up`
    /// or `hold 5 5 800`
    pub fn parse_command(line: &str) -> Option<Self> {
        let mut parts = line.split_whitespace();
        let verb = parts.next()?.to_ascii_lowercase();
        let mut num = || parts.next().and_then(|s| s.parse::<f64>().ok());

        match verb.as_str() {
            "down" | "d" | "tap" => Some(PointerEvent::Down { x: num()?, y: num()? }),
            "move" | "m" | "drag" => Some(PointerEvent::Move { x: num()?, y: num()? }),
            "up" | "u" => Some(PointerEvent::Up),
            "hold" | "h" => {
                let x = num()?;
                let y = num()?;
                let duration_ms = num().unwrap_or_else(default_hold_ms);
                Some(PointerEvent::Hold { x, y, duration_ms })
            }
            _ => None,
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operation_wire_format() {
        let op = TouchOperation::tap(10.0, 20.0, 1_700_000_000_000);
        let json = serde_json::to_value(&op).unwrap();

        assert_eq!(json["type"], "tap");
        assert_eq!(json["x"], 10.0);
        assert!(json.get("duration").is_none());
        assert!(json.get("velocity").is_none());
    }

    #[test]
    fn test_drag_does_not_count() {
        assert!(OperationKind::Tap.counts_for_classification());
        assert!(OperationKind::Hold.counts_for_classification());
        assert!(!OperationKind::Drag.counts_for_classification());
    }

    #[test]
    fn test_pointer_event_json() {
        let event: PointerEvent = serde_json::from_str(r#"{"phase":"down","x":1.5,"y":2}"#).unwrap();
        assert_eq!(event, PointerEvent::Down { x: 1.5, y: 2.0 });

        let up: PointerEvent = serde_json::from_str(r#"{"phase":"up"}"#).unwrap();
        assert_eq!(up, PointerEvent::Up);

        let hold: PointerEvent = serde_json::from_str(r#"{"phase":"hold","x":5,"y":5}"#).unwrap();
        assert_eq!(hold, PointerEvent::Hold { x: 5.0, y: 5.0, duration_ms: 800.0 });

        let hold: PointerEvent = serde_json::from_str(r#"{"phase":"hold","x":5,"y":5,"duration_ms":1200}"#).unwrap();
        assert_eq!(hold, PointerEvent::Hold { x: 5.0, y: 5.0, duration_ms: 1200.0 });
    }

    #[test]
    fn test_parse_command() {
        assert_eq!(PointerEvent::parse_command("down 10 20"), Some(PointerEvent::Down { x: 10.0, y: 20.0 }));
        assert_eq!(PointerEvent::parse_command("M 1 2"), Some(PointerEvent::Move { x: 1.0, y: 2.0 }));
        assert_eq!(PointerEvent::parse_command("up"), Some(PointerEvent::Up));
        assert_eq!(
            PointerEvent::parse_command("hold 5 6 900"),
            Some(PointerEvent::Hold { x: 5.0, y: 6.0, duration_ms: 900.0 })
        );
        assert_eq!(PointerEvent::parse_command("down ten 20"), None);
        assert_eq!(PointerEvent::parse_command("jump"), None);
        assert_eq!(PointerEvent::parse_command(""), None);
    }
}
