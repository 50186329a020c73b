//! Rendering collaborator: viewport, touch effects, terminal renderer

use colored::Colorize;
use rand::rngs::StdRng;
use rand::Rng;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::core::clock::{make_rng, system_clock, SharedClock};
use crate::types::{FeedbackTuple, Point, Rgb};
use crate::EFFECT_EXTRA_MS;

/// Canvas dimensions used to normalize positions
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Viewport {
    pub width: f64,
    pub height: f64,
}

impl Default for Viewport {
    fn default() -> Self {
        Self::new(1024.0, 768.0)
    }
}

impl Viewport {
    pub fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }

    /// x as a fraction of the width, clamped to [0, 1]
    pub fn fraction_x(&self, x: f64) -> f64 {
        fraction(x, self.width)
    }

    /// y as a fraction of the height, clamped to [0, 1]
    pub fn fraction_y(&self, y: f64) -> f64 {
        fraction(y, self.height)
    }
}

fn fraction(value: f64, extent: f64) -> f64 {
    if !(extent > 0.0) || !value.is_finite() {
        return 0.0;
    }
    (value / extent).clamp(0.0, 1.0)
}

/// Receives feedback for display; owns the viewport
pub trait Renderer: Send {
    fn viewport(&self) -> Viewport;

    /// Canvas was resized
    fn set_viewport(&mut self, viewport: Viewport);

    /// Paint background and spawn an effect at `position`
    fn render(&mut self, feedback: &FeedbackTuple, position: Point);

    fn show_message(&mut self, emotion: &str, message: &str);

    fn hide_message(&mut self);
}

// =============================================================================
// TOUCH EFFECTS
// =============================================================================

/// Visual style of one touch effect
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EffectKind {
    Ripple,
    Particle,
    Pulse,
    Burst,
}

impl EffectKind {
    pub const ALL: [EffectKind; 4] = [
        EffectKind::Ripple,
        EffectKind::Particle,
        EffectKind::Pulse,
        EffectKind::Burst,
    ];

    pub fn random<R: Rng + ?Sized>(rng: &mut R) -> Self {
        Self::ALL[rng.gen_range(0..Self::ALL.len())]
    }
}

/// Ephemeral artifact spawned per operation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TouchEffect {
    pub id: Uuid,
    pub x: f64,
    pub y: f64,
    pub color: Rgb,
    pub started_at: i64,
    /// Lifetime in milliseconds
    pub duration: f64,
    pub kind: EffectKind,
}

impl TouchEffect {
    /// Effect for `feedback`, living 200ms longer than its tone
    pub fn spawn<R: Rng + ?Sized>(
        feedback: &FeedbackTuple,
        position: Point,
        now_ms: i64,
        rng: &mut R,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            x: position.x,
            y: position.y,
            color: feedback.color,
            started_at: now_ms,
            duration: feedback.duration + EFFECT_EXTRA_MS,
            kind: EffectKind::random(rng),
        }
    }

    /// Elapsed fraction of the lifetime, in [0, 1]
    pub fn progress(&self, now_ms: i64) -> f64 {
        if self.duration <= 0.0 {
            return 1.0;
        }
        ((now_ms - self.started_at) as f64 / self.duration).clamp(0.0, 1.0)
    }

    pub fn opacity(&self, now_ms: i64) -> f64 {
        1.0 - self.progress(now_ms)
    }

    pub fn scale(&self, now_ms: i64) -> f64 {
        1.0 + self.progress(now_ms) * 2.0
    }

    pub fn is_expired(&self, now_ms: i64) -> bool {
        (now_ms - self.started_at) as f64 >= self.duration
    }
}

/// Live effects on a canvas
#[derive(Debug, Default)]
pub struct EffectBoard {
    effects: Vec<TouchEffect>,
}

impl EffectBoard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, effect: TouchEffect) {
        self.effects.push(effect);
    }

    /// Drop expired effects, returning how many were removed
    pub fn prune(&mut self, now_ms: i64) -> usize {
        let before = self.effects.len();
        self.effects.retain(|e| !e.is_expired(now_ms));
        before - self.effects.len()
    }

    pub fn effects(&self) -> &[TouchEffect] {
        &self.effects
    }

    pub fn len(&self) -> usize {
        self.effects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.effects.is_empty()
    }
}

// =============================================================================
// TERMINAL RENDERER
// =============================================================================

/// Prints feedback as colored swatches
pub struct TerminalRenderer {
    viewport: Viewport,
    no_color: bool,
    json: bool,
    effects: EffectBoard,
    clock: SharedClock,
    rng: StdRng,
}

impl std::fmt::Debug for TerminalRenderer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TerminalRenderer")
            .field("viewport", &self.viewport)
            .field("no_color", &self.no_color)
            .field("json", &self.json)
            .field("effects", &self.effects.len())
            .finish()
    }
}

impl TerminalRenderer {
    pub fn new(viewport: Viewport, no_color: bool, json: bool) -> Self {
        Self {
            viewport,
            no_color,
            json,
            effects: EffectBoard::new(),
            clock: system_clock(),
            rng: make_rng(None),
        }
    }

    /// Use the session's clock and a seeded RNG for effects
    pub fn with_sources(mut self, clock: SharedClock, rng: StdRng) -> Self {
        self.clock = clock;
        self.rng = rng;
        self
    }
}

impl Renderer for TerminalRenderer {
    fn viewport(&self) -> Viewport {
        self.viewport
    }

    fn set_viewport(&mut self, viewport: Viewport) {
        self.viewport = viewport;
    }

    fn render(&mut self, feedback: &FeedbackTuple, position: Point) {
        let now = self.clock.now_ms();
        self.effects.prune(now);
        let effect = TouchEffect::spawn(feedback, position, now, &mut self.rng);
        let kind = effect.kind;
        self.effects.add(effect);

        if self.json {
            #[derive(Serialize)]
            struct RenderLine<'a> {
                feedback: &'a FeedbackTuple,
                position: Point,
                effect: EffectKind,
            }
            let line = RenderLine { feedback, position, effect: kind };
            match serde_json::to_string(&line) {
                Ok(json) => println!("{}", json),
                Err(e) => tracing::warn!(error = %e, "failed to serialize feedback"),
            }
            return;
        }

        if self.no_color {
            println!(
                "({:.0},{:.0}) {} | effects={}",
                position.x,
                position.y,
                feedback.to_parseable_string(),
                self.effects.len()
            );
        } else {
            let c = feedback.color;
            let swatch = "      ".on_truecolor(c.r, c.g, c.b);
            let emoji = feedback.known_emotion().map(|e| e.emoji()).unwrap_or("❔");
            println!(
                "{} {} {:<11} {:>7.2}Hz {:>4.0}ms  ({:.0},{:.0}) {:?}",
                swatch,
                emoji,
                feedback.emotion.bold(),
                feedback.frequency,
                feedback.duration,
                position.x,
                position.y,
                kind
            );
        }
    }

    fn show_message(&mut self, emotion: &str, message: &str) {
        if self.json {
            println!("{}", serde_json::json!({ "message": message, "emotion": emotion }));
        } else if self.no_color {
            println!("  >> [{}] {}", emotion, message);
        } else {
            println!("  {} {}", format!("✨ [{}]", emotion).bright_white().bold(), message.italic());
        }
    }

    fn hide_message(&mut self) {
        if self.json {
            println!("{}", serde_json::json!({ "message": null }));
        } else {
            println!("  {}", "(message hidden)".dimmed());
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::clock::ManualClock;
    use std::sync::Arc;

    fn feedback(duration: f64) -> FeedbackTuple {
        FeedbackTuple::new(Rgb::new(1, 2, 3), 440.0, duration, "joyful")
    }

    #[test]
    fn test_fractions_clamp() {
        let vp = Viewport::new(100.0, 200.0);
        assert_eq!(vp.fraction_x(50.0), 0.5);
        assert_eq!(vp.fraction_y(50.0), 0.25);
        assert_eq!(vp.fraction_x(150.0), 1.0);
        assert_eq!(vp.fraction_x(-5.0), 0.0);
    }

    #[test]
    fn test_degenerate_viewport() {
        let vp = Viewport::new(0.0, -1.0);
        assert_eq!(vp.fraction_x(10.0), 0.0);
        assert_eq!(vp.fraction_y(10.0), 0.0);
        assert_eq!(Viewport::new(10.0, 10.0).fraction_x(f64::NAN), 0.0);
    }

    #[test]
    fn test_effect_lifetime() {
        let mut rng = make_rng(Some(7));
        let effect = TouchEffect::spawn(&feedback(300.0), Point::new(5.0, 6.0), 1_000, &mut rng);

        assert_eq!(effect.duration, 500.0);
        assert_eq!(effect.progress(1_000), 0.0);
        assert_eq!(effect.progress(1_250), 0.5);
        assert_eq!(effect.opacity(1_250), 0.5);
        assert_eq!(effect.scale(1_250), 2.0);
        assert!(!effect.is_expired(1_499));
        assert!(effect.is_expired(1_500));
    }

    #[test]
    fn test_board_prunes_expired() {
        let mut rng = make_rng(Some(1));
        let mut board = EffectBoard::new();
        board.add(TouchEffect::spawn(&feedback(100.0), Point::default(), 0, &mut rng));
        board.add(TouchEffect::spawn(&feedback(800.0), Point::default(), 0, &mut rng));

        assert_eq!(board.prune(500), 1);
        assert_eq!(board.len(), 1);
        assert_eq!(board.prune(2_000), 1);
        assert!(board.is_empty());
    }

    #[test]
    fn test_effect_ids_are_unique() {
        let mut rng = make_rng(Some(3));
        let a = TouchEffect::spawn(&feedback(1.0), Point::default(), 0, &mut rng);
        let b = TouchEffect::spawn(&feedback(1.0), Point::default(), 0, &mut rng);
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_seeded_terminal_effects_are_reproducible() {
        let kinds = |seed: u64| {
            let clock = Arc::new(ManualClock::new(5_000));
            let mut renderer = TerminalRenderer::new(Viewport::new(10.0, 10.0), true, true)
                .with_sources(clock, make_rng(Some(seed)));
            for _ in 0..12 {
                renderer.render(&feedback(60_000.0), Point::new(1.0, 1.0));
            }
            let effects = renderer.effects.effects();
            assert!(effects.iter().all(|e| e.started_at == 5_000));
            effects.iter().map(|e| e.kind).collect::<Vec<_>>()
        };
        assert_eq!(kinds(11), kinds(11));
        assert_eq!(kinds(11).len(), 12);
    }
}
