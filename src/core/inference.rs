//! Inference Engine: touch history → color, tone and emotion
//!
//! Strategy, in priority order:
//! - Emotion mode pinned: fixed table per label (unknown → neutral)
//! - History empty before this operation: random joyful
//! - Otherwise the first matching rule over the last 5 operations:
//!   taps ≥ 3 → excited, drags ≥ 2 → explorative, holds ≥ 1 → calm,
//!   else curious

use rand::rngs::StdRng;
use rand::Rng;

use crate::core::clock::{make_rng, system_clock, SharedClock};
use crate::core::history::OperationHistory;
use crate::core::render::Viewport;
use crate::types::{Emotion, EmotionMode, FeedbackTuple, OperationKind, Rgb, TouchOperation};
use crate::{CALM_MIN_HOLDS, EXCITED_MIN_TAPS, EXPLORATIVE_MIN_DRAGS, INFERENCE_WINDOW};

/// Joyful fallback palette
pub const JOYFUL_COLORS: [Rgb; 5] = [
    Rgb::new(255, 192, 203),
    Rgb::new(255, 255, 0),
    Rgb::new(0, 255, 255),
    Rgb::new(255, 165, 0),
    Rgb::new(144, 238, 144),
];

/// C4 D4 E4 F4 G4 A4
pub const JOYFUL_FREQUENCIES: [f64; 6] = [261.63, 293.66, 329.63, 349.23, 392.00, 440.00];

pub const JOYFUL_DURATION_MS: f64 = 350.0;
pub const EXCITED_DURATION_MS: f64 = 300.0;
pub const EXPLORATIVE_DURATION_MS: f64 = 500.0;
pub const CALM_DURATION_MS: f64 = 800.0;
pub const CURIOUS_DURATION_MS: f64 = 400.0;

/// Label used for pinned labels outside the known six
pub const UNKNOWN_EMOTION: &str = "unknown";

/// Fixed feedback for a pinned emotion
pub fn pinned_feedback(label: &str) -> FeedbackTuple {
    let (color, frequency, duration, emotion) = match Emotion::from_label(label) {
        Some(Emotion::Joyful) => (Rgb::new(255, 223, 0), 523.0, 400.0, Emotion::Joyful.label()),
        Some(Emotion::Excited) => (Rgb::new(255, 105, 180), 659.0, 300.0, Emotion::Excited.label()),
        Some(Emotion::Calm) => (Rgb::new(135, 206, 250), 220.0, 800.0, Emotion::Calm.label()),
        Some(Emotion::Curious) => (Rgb::new(200, 160, 255), 392.0, 400.0, Emotion::Curious.label()),
        Some(Emotion::Surprised) => (Rgb::new(255, 255, 0), 784.0, 200.0, Emotion::Surprised.label()),
        Some(Emotion::Explorative) => (Rgb::new(100, 255, 200), 349.0, 500.0, Emotion::Explorative.label()),
        None => (Rgb::new(200, 200, 255), 440.0, 400.0, UNKNOWN_EMOTION),
    };
    FeedbackTuple::new(color, frequency, duration, emotion)
}

/// Summary of the recent operation window
/// Outcome of the live rule table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LiveRule {
    Excited,
    Explorative,
    Calm,
    Curious,
}

impl LiveRule {
    pub fn emotion(self) -> Emotion {
        match self {
            LiveRule::Excited => Emotion::Excited,
            LiveRule::Explorative => Emotion::Explorative,
            LiveRule::Calm => Emotion::Calm,
            LiveRule::Curious => Emotion::Curious,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct WindowStats {
    pub avg_x: f64,
    pub avg_y: f64,
    pub taps: usize,
    pub drags: usize,
    pub holds: usize,
    pub len: usize,
}

impl WindowStats {
    /// Averages and kind counts; `None` for an empty window
    pub fn from_operations(window: &[TouchOperation]) -> Option<Self> {
        if window.is_empty() {
            return None;
        }
        let n = window.len() as f64;
        let count = |kind: OperationKind| window.iter().filter(|op| op.kind == kind).count();

        Some(Self {
            avg_x: window.iter().map(|op| op.x).sum::<f64>() / n,
            avg_y: window.iter().map(|op| op.y).sum::<f64>() / n,
            taps: count(OperationKind::Tap),
            drags: count(OperationKind::Drag),
            holds: count(OperationKind::Hold),
            len: window.len(),
        })
    }

    /// First matching rule: tap > drag > hold > curious
    pub fn matched_rule(&self) -> LiveRule {
        if self.taps >= EXCITED_MIN_TAPS {
            LiveRule::Excited
        } else if self.drags >= EXPLORATIVE_MIN_DRAGS {
            LiveRule::Explorative
        } else if self.holds >= CALM_MIN_HOLDS {
            LiveRule::Calm
        } else {
            LiveRule::Curious
        }
    }
}

/// HSL → RGB, hue in degrees, saturation and lightness in [0, 1].
/// Returns continuous channels in [0, 255].
pub fn hsl_to_rgb(hue: f64, saturation: f64, lightness: f64) -> (f64, f64, f64) {
    let h = hue / 360.0;
    let a = saturation * lightness.min(1.0 - lightness);
    let f = |n: f64| {
        let k = (n + h * 12.0) % 12.0;
        lightness - a * (k - 3.0).min(9.0 - k).min(1.0).max(-1.0)
    };
    (f(0.0) * 255.0, f(8.0) * 255.0, f(4.0) * 255.0)
}

/// Behavior inference engine; one per session
#[derive(Debug)]
pub struct InferenceEngine {
    history: OperationHistory,
    mode: EmotionMode,
    viewport: Viewport,
    clock: SharedClock,
    rng: StdRng,
    inference_count: u64,
}

impl Default for InferenceEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl InferenceEngine {
    /// Engine with real time and OS randomness
    pub fn new() -> Self {
        Self::with_sources(system_clock(), make_rng(None))
    }

    /// Engine with injected time and randomness
    pub fn with_sources(clock: SharedClock, rng: StdRng) -> Self {
        Self {
            history: OperationHistory::new(),
            mode: EmotionMode::Default,
            viewport: Viewport::default(),
            clock,
            rng,
            inference_count: 0,
        }
    }

    pub fn with_viewport(mut self, viewport: Viewport) -> Self {
        self.viewport = viewport;
        self
    }

    /// Switch strategy; takes effect on the next inference
    pub fn set_emotion_mode(&mut self, mode: EmotionMode) {
        if mode != self.mode {
            tracing::debug!(from = %self.mode, to = %mode, "emotion mode changed");
        }
        self.mode = mode;
    }

    /// Pin to a classifier label (`default` unpins)
    pub fn set_emotion_label(&mut self, label: &str) {
        self.set_emotion_mode(EmotionMode::from_label(label));
    }

    pub fn emotion_mode(&self) -> &EmotionMode {
        &self.mode
    }

    pub fn set_viewport(&mut self, viewport: Viewport) {
        self.viewport = viewport;
    }

    pub fn viewport(&self) -> Viewport {
        self.viewport
    }

    pub fn history(&self) -> &OperationHistory {
        &self.history
    }

    /// Copy of the history, oldest first
    pub fn snapshot(&self) -> Vec<TouchOperation> {
        self.history.snapshot()
    }

    pub fn inference_count(&self) -> u64 {
        self.inference_count
    }

    /// Append `operation`, then infer feedback for it
    pub fn record_and_infer(&mut self, operation: TouchOperation) -> FeedbackTuple {
        let had_history = !self.history.is_empty();
        self.history.append(operation);
        self.inference_count += 1;

        if let EmotionMode::Pinned(label) = &self.mode {
            return pinned_feedback(label);
        }
        if !had_history {
            return self.random_joyful();
        }
        self.live_feedback()
    }

    /// Infer from the current history without recording anything
    pub fn infer(&mut self) -> FeedbackTuple {
        if let EmotionMode::Pinned(label) = &self.mode {
            return pinned_feedback(label);
        }
        if self.history.is_empty() {
            return self.random_joyful();
        }
        self.live_feedback()
    }

    fn live_feedback(&mut self) -> FeedbackTuple {
        let window = self.history.recent_window(INFERENCE_WINDOW);
        let Some(stats) = WindowStats::from_operations(&window) else {
            return self.random_joyful();
        };

        let fx = self.viewport.fraction_x(stats.avg_x);
        let fy = self.viewport.fraction_y(stats.avg_y);

        match stats.matched_rule() {
            LiveRule::Excited => self.excited(fx, fy),
            LiveRule::Explorative => explorative(fx, fy),
            LiveRule::Calm => calm(self.clock.now_ms()),
            LiveRule::Curious => curious(fx),
        }
    }

    fn excited(&mut self, fx: f64, fy: f64) -> FeedbackTuple {
        let u: f64 = self.rng.gen();
        FeedbackTuple::new(
            Rgb::from_channels(255.0 * fx, 150.0 + 105.0 * fy, 100.0 + 155.0 * u),
            440.0 + 220.0 * fx,
            EXCITED_DURATION_MS,
            Emotion::Excited.label(),
        )
    }

    fn random_joyful(&mut self) -> FeedbackTuple {
        let color = JOYFUL_COLORS[self.rng.gen_range(0..JOYFUL_COLORS.len())];
        let frequency = JOYFUL_FREQUENCIES[self.rng.gen_range(0..JOYFUL_FREQUENCIES.len())];
        FeedbackTuple::new(color, frequency, JOYFUL_DURATION_MS, Emotion::Joyful.label())
    }
}

fn explorative(fx: f64, fy: f64) -> FeedbackTuple {
    FeedbackTuple::new(
        Rgb::from_channels(100.0 + 100.0 * fx, 200.0 + 55.0 * fy, 150.0 + 105.0 * (1.0 - fy)),
        330.0 + 110.0 * fy,
        EXPLORATIVE_DURATION_MS,
        Emotion::Explorative.label(),
    )
}

/// Breathes with wall-clock time, independent of position
fn calm(now_ms: i64) -> FeedbackTuple {
    let t = now_ms as f64;
    FeedbackTuple::new(
        Rgb::from_channels(
            150.0 + 50.0 * (t / 1000.0).sin(),
            200.0 + 55.0 * (t / 1500.0).cos(),
            180.0 + 75.0 * (t / 2000.0).sin(),
        ),
        220.0 + 55.0 * (t / 1000.0).sin(),
        CALM_DURATION_MS,
        Emotion::Calm.label(),
    )
}

fn curious(fx: f64) -> FeedbackTuple {
    let (r, g, b) = hsl_to_rgb(360.0 * fx, 0.7, 0.6);
    FeedbackTuple::new(
        Rgb::from_channels(r, g, b),
        392.0 + 98.0 * fx,
        CURIOUS_DURATION_MS,
        Emotion::Curious.label(),
    )
}

// =============================================================================
// TESTS
// =============================================================================
