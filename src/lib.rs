//! Touchfeel: touch-to-feedback inference for a sensory canvas
//!
//! Pointer events → typed operations → history → inference → color + tone,
//! with a periodic remote classification that pins the emotion mode.

pub mod config;
pub mod core;
pub mod types;

// =============================================================================
// HISTORY
// =============================================================================

/// Maximum number of operations kept in a session's history
pub const HISTORY_CAPACITY: usize = 20;

/// Number of most recent operations the live heuristic looks at
pub const INFERENCE_WINDOW: usize = 5;

// =============================================================================
// RULE THRESHOLDS
// =============================================================================

/// Taps in the window needed for "excited"
pub const EXCITED_MIN_TAPS: usize = 3;

/// Drags in the window needed for "explorative"
pub const EXPLORATIVE_MIN_DRAGS: usize = 2;

/// Holds in the window needed for "calm"
pub const CALM_MIN_HOLDS: usize = 1;

// =============================================================================
// CLASSIFICATION CADENCE
// =============================================================================

/// Qualifying (non-drag) operations between classification requests
pub const CLASSIFY_EVERY: u32 = 10;

/// How long a classification message stays visible (milliseconds)
pub const MESSAGE_DISPLAY_MS: u64 = 5000;

/// Operations forwarded to the model prompt and the journal
pub const CLASSIFIER_WINDOW: usize = 5;

/// Recent feedback tuples / messages kept for the debug panel
pub const RECENT_LOG_CAPACITY: usize = 10;

// =============================================================================
// EFFECTS
// =============================================================================

/// Touch effects outlive the tone by this many milliseconds
pub const EFFECT_EXTRA_MS: f64 = 200.0;

// =============================================================================
// VERSION
// =============================================================================

pub const VERSION: &str = "1.0.0";
