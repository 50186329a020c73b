//! Feedback tuples produced by the inference engine

use serde::{Deserialize, Serialize};

use crate::types::Emotion;

/// 8-bit RGB color
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Build from continuous channel values: floor, then clamp to [0, 255]
    pub fn from_channels(r: f64, g: f64, b: f64) -> Self {
        Self {
            r: channel(r),
            g: channel(g),
            b: channel(b),
        }
    }

    /// `#rrggbb`
    pub fn to_hex(&self) -> String {
        format!("#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }
}

fn channel(value: f64) -> u8 {
    if value.is_nan() {
        return 0;
    }
    value.floor().clamp(0.0, 255.0) as u8
}

/// Output of one inference call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedbackTuple {
    pub color: Rgb,
    /// Tone frequency in Hz
    pub frequency: f64,
    /// Tone duration in milliseconds
    pub duration: f64,
    /// Emotion label, or `unknown` for unrecognized pinned labels
    pub emotion: String,
}

impl FeedbackTuple {
    pub fn new(color: Rgb, frequency: f64, duration: f64, emotion: impl Into<String>) -> Self {
        Self {
            color,
            frequency,
            duration,
            emotion: emotion.into(),
        }
    }

    /// Parsed label, if it is one of the known six
    pub fn known_emotion(&self) -> Option<Emotion> {
        Emotion::from_label(&self.emotion)
    }

    /// Format for parseable output (no colors)
    pub fn to_parseable_string(&self) -> String {
        format!(
            "emotion={} | color={} | freq={:.2}Hz | dur={:.0}ms",
            self.emotion,
            self.color.to_hex(),
            self.frequency,
            self.duration
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channels_floor_and_clamp() {
        let c = Rgb::from_channels(254.9, -3.0, 400.0);
        assert_eq!(c, Rgb::new(254, 0, 255));
        assert_eq!(Rgb::from_channels(f64::NAN, 0.5, 1.0), Rgb::new(0, 0, 1));
    }

    #[test]
    fn test_color_formats() {
        let c = Rgb::new(135, 206, 235);
        assert_eq!(c.to_hex(), "#87ceeb");
    }

    #[test]
    fn test_parseable_string() {
        let f = FeedbackTuple::new(Rgb::new(255, 223, 0), 523.0, 400.0, "joyful");
        assert_eq!(f.to_parseable_string(), "emotion=joyful | color=#ffdf00 | freq=523.00Hz | dur=400ms");
        assert_eq!(f.known_emotion(), Some(Emotion::Joyful));
    }
}
