//! Core types for Touchfeel

mod operation;
mod emotion;
mod feedback;
mod profile;
mod classification;
mod status;

pub use operation::{OperationKind, TouchOperation, Point, PointerEvent};
pub use emotion::{Emotion, EmotionMode};
pub use feedback::{Rgb, FeedbackTuple};
pub use profile::UserProfile;
pub use classification::{Classification, ClassificationRequest, EmotionLogEntry};
pub use status::{InteractionPhase, DisplayedMessage, MessageTicket, SessionStatus};
