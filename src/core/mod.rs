//! Core modules for touchfeel

pub mod history;
pub mod clock;
pub mod render;
pub mod audio;
pub mod inference;
pub mod controller;
pub mod classify;
pub mod journal;
pub mod session;
pub mod api;

pub use history::OperationHistory;
pub use clock::{Clock, SystemClock, ManualClock, SharedClock, system_clock, make_rng};
pub use render::{Renderer, Viewport, TerminalRenderer, TouchEffect, EffectKind, EffectBoard};
pub use audio::{AudioSink, DeviceAudio, PcmMixer, SharedMixer, NullAudio, Tone, chord};
pub use inference::{InferenceEngine, LiveRule, WindowStats, pinned_feedback};
pub use controller::{InteractionController, PointerOutcome};
pub use classify::{Classifier, ClassifyError, HttpClassifier, OfflineClassifier, build_prompt, parse_model_response};
pub use journal::{Journal, JournalError, JsonlJournal, NullJournal};
pub use session::{Session, SessionEvent, SessionHandle, SessionServices, SessionClosed, spawn_session};
pub use api::{create_router, run_server, ApiSettings, BroadcastSurface, SurfaceCommand};
