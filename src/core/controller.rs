//! Interaction Loop Controller: pointer events → operations → feedback
//!
//! Phase transitions:
//! - IDLE → INTERACTING: down (emits Tap)
//! - INTERACTING → INTERACTING: move (emits Drag)
//! - INTERACTING → IDLE: up (no operation)
//! - any → same: hold (emits Hold)
//!
//! Every `classify_every` non-drag operations a classification request is
//! handed back to the caller, which dispatches it without awaiting.

use std::collections::VecDeque;

use rand::rngs::StdRng;

use crate::core::audio::AudioSink;
use crate::core::clock::SharedClock;
use crate::core::inference::InferenceEngine;
use crate::core::render::{Renderer, Viewport};
use crate::types::{
    Classification, ClassificationRequest, DisplayedMessage, FeedbackTuple, InteractionPhase,
    MessageTicket, Point, PointerEvent, Rgb, SessionStatus, TouchOperation, UserProfile,
};
use crate::{CLASSIFY_EVERY, RECENT_LOG_CAPACITY};

/// Hold length used when the gesture source gives none
pub const DEFAULT_HOLD_MS: f64 = 800.0;

/// Emotion shown before any feedback
pub const INITIAL_EMOTION: &str = "peaceful";

/// Sky blue
pub const INITIAL_BACKGROUND: Rgb = Rgb::new(135, 206, 235);

/// What one pointer event produced
#[derive(Debug, Clone, PartialEq)]
pub struct PointerOutcome {
    pub operation: TouchOperation,
    pub feedback: FeedbackTuple,
    /// Present when this operation completed a classification cycle
    pub request: Option<ClassificationRequest>,
}

/// Previous pointer sample of the current gesture
#[derive(Debug, Clone, Copy)]
struct PointerSample {
    position: Point,
    at_ms: i64,
}

/// Per-session interaction state machine
pub struct InteractionController {
    engine: InferenceEngine,
    renderer: Box<dyn Renderer>,
    audio: Box<dyn AudioSink>,
    clock: SharedClock,
    phase: InteractionPhase,
    last_pointer: Option<PointerSample>,
    touches_since_classification: u32,
    classify_every: u32,
    profile: UserProfile,
    current_emotion: String,
    background: Rgb,
    message: Option<DisplayedMessage>,
    next_ticket: u64,
    next_seq: u64,
    recent_feedback: VecDeque<FeedbackTuple>,
    recent_messages: VecDeque<String>,
    classifications_requested: u64,
    classifications_applied: u64,
    classifications_failed: u64,
    last_classified_at: Option<i64>,
}

impl std::fmt::Debug for InteractionController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InteractionController")
            .field("phase", &self.phase)
            .field("emotion_mode", self.engine.emotion_mode())
            .field("history_len", &self.engine.history().len())
            .field("touches_since_classification", &self.touches_since_classification)
            .field("message", &self.message)
            .finish_non_exhaustive()
    }
}

impl InteractionController {
    pub fn new(
        renderer: Box<dyn Renderer>,
        audio: Box<dyn AudioSink>,
        clock: SharedClock,
        rng: StdRng,
    ) -> Self {
        let engine = InferenceEngine::with_sources(clock.clone(), rng)
            .with_viewport(renderer.viewport());
        Self {
            engine,
            renderer,
            audio,
            clock,
            phase: InteractionPhase::Idle,
            last_pointer: None,
            touches_since_classification: 0,
            classify_every: CLASSIFY_EVERY,
            profile: UserProfile::default(),
            current_emotion: INITIAL_EMOTION.to_string(),
            background: INITIAL_BACKGROUND,
            message: None,
            next_ticket: 0,
            next_seq: 0,
            recent_feedback: VecDeque::with_capacity(RECENT_LOG_CAPACITY),
            recent_messages: VecDeque::with_capacity(RECENT_LOG_CAPACITY),
            classifications_requested: 0,
            classifications_applied: 0,
            classifications_failed: 0,
            last_classified_at: None,
        }
    }

    pub fn with_profile(mut self, profile: UserProfile) -> Self {
        self.profile = profile;
        self
    }

    /// Cadence override (minimum 1)
    pub fn with_classify_every(mut self, every: u32) -> Self {
        self.classify_every = every.max(1);
        self
    }

    pub fn engine(&self) -> &InferenceEngine {
        &self.engine
    }

    pub fn phase(&self) -> InteractionPhase {
        self.phase
    }

    pub fn profile(&self) -> &UserProfile {
        &self.profile
    }

    pub fn set_profile(&mut self, profile: UserProfile) {
        self.profile = profile;
    }

    pub fn touches_since_classification(&self) -> u32 {
        self.touches_since_classification
    }

    pub fn message(&self) -> Option<&DisplayedMessage> {
        self.message.as_ref()
    }

    /// Canvas resized; next inference normalizes against the new size
    pub fn resize(&mut self, viewport: Viewport) {
        self.renderer.set_viewport(viewport);
        self.engine.set_viewport(viewport);
    }

    /// Feed one raw pointer event through the phase machine
    pub fn handle_pointer(&mut self, event: PointerEvent) -> Option<PointerOutcome> {
        let now = self.clock.now_ms();

        let operation = match event {
            PointerEvent::Down { x, y } => {
                self.phase = InteractionPhase::Interacting;
                self.last_pointer = Some(PointerSample {
                    position: Point::new(x, y),
                    at_ms: now,
                });
                TouchOperation::tap(x, y, now)
            }
            PointerEvent::Move { x, y } => {
                if self.phase == InteractionPhase::Idle {
                    return None;
                }
                let position = Point::new(x, y);
                let velocity = self.last_pointer.and_then(|prev| {
                    let dt = (now - prev.at_ms) as f64;
                    (dt > 0.0).then(|| position.distance_to(&prev.position) / dt)
                });
                self.last_pointer = Some(PointerSample { position, at_ms: now });

                let drag = TouchOperation::drag(x, y, now);
                match velocity {
                    Some(v) => drag.with_velocity(v),
                    None => drag,
                }
            }
            PointerEvent::Up => {
                self.phase = InteractionPhase::Idle;
                self.last_pointer = None;
                return None;
            }
            PointerEvent::Hold { x, y, duration_ms } => {
                TouchOperation::hold(x, y, now).with_duration(duration_ms)
            }
        };

        Some(self.process_operation(operation))
    }

    /// Record, infer and dispatch one already-typed operation
    pub fn process_operation(&mut self, operation: TouchOperation) -> PointerOutcome {
        self.engine.set_viewport(self.renderer.viewport());
        let position = operation.position();
        let feedback = self.engine.record_and_infer(operation.clone());

        self.renderer.render(&feedback, position);
        self.audio.play_tone(feedback.frequency, feedback.duration);

        push_bounded(&mut self.recent_feedback, feedback.clone());
        self.current_emotion = feedback.emotion.clone();
        self.background = feedback.color;

        let request = if operation.kind.counts_for_classification() {
            self.count_touch()
        } else {
            None
        };

        tracing::debug!(
            kind = %operation.kind,
            emotion = %feedback.emotion,
            frequency = feedback.frequency,
            counter = self.touches_since_classification,
            inferences = self.engine.inference_count(),
            "operation processed"
        );

        PointerOutcome {
            operation,
            feedback,
            request,
        }
    }

    fn count_touch(&mut self) -> Option<ClassificationRequest> {
        self.touches_since_classification += 1;
        if self.touches_since_classification < self.classify_every {
            return None;
        }

        self.touches_since_classification = 0;
        self.next_seq += 1;
        self.classifications_requested += 1;
        tracing::info!(seq = self.next_seq, "classification requested");

        Some(ClassificationRequest {
            seq: self.next_seq,
            history: self.engine.snapshot(),
            profile: self.profile.clone(),
        })
    }

    /// Pin the classified emotion and show its message
    pub fn apply_classification(&mut self, classification: &Classification) -> MessageTicket {
        let now = self.clock.now_ms();
        self.engine.set_emotion_label(&classification.emotion);
        self.current_emotion = classification.emotion.clone();

        self.next_ticket += 1;
        let ticket = MessageTicket(self.next_ticket);
        self.message = Some(DisplayedMessage {
            ticket,
            emotion: classification.emotion.clone(),
            text: classification.message.clone(),
            shown_at: now,
        });
        self.renderer
            .show_message(&classification.emotion, &classification.message);

        push_bounded(&mut self.recent_messages, classification.message.clone());
        self.classifications_applied += 1;
        self.last_classified_at = Some(now);

        tracing::info!(
            emotion = %classification.emotion,
            ticket = ticket.0,
            "classification applied"
        );
        ticket
    }

    /// Hide the message if `ticket` is still the one shown.
    /// Emotion mode stays pinned.
    pub fn hide_message(&mut self, ticket: MessageTicket) -> bool {
        match &self.message {
            Some(shown) if shown.ticket == ticket => {
                self.message = None;
                self.renderer.hide_message();
                true
            }
            _ => {
                tracing::debug!(ticket = ticket.0, "stale hide timer ignored");
                false
            }
        }
    }

    /// Failed classification: counted and logged, nothing else changes
    pub fn record_classification_failure(&mut self, seq: u64, error: &dyn std::fmt::Display) {
        self.classifications_failed += 1;
        tracing::warn!(seq, error = %error, "classification failed");
    }

    pub fn status(&self) -> SessionStatus {
        SessionStatus {
            phase: self.phase,
            emotion_mode: self.engine.emotion_mode().clone(),
            current_emotion: self.current_emotion.clone(),
            background: self.background,
            history_len: self.engine.history().len(),
            touches_since_classification: self.touches_since_classification,
            classifications_requested: self.classifications_requested,
            classifications_applied: self.classifications_applied,
            classifications_failed: self.classifications_failed,
            message: self.message.clone(),
            last_classified_at: self.last_classified_at,
            recent_feedback: self.recent_feedback.iter().cloned().collect(),
            recent_messages: self.recent_messages.iter().cloned().collect(),
        }
    }
}

fn push_bounded<T>(log: &mut VecDeque<T>, item: T) {
    log.push_back(item);
    while log.len() > RECENT_LOG_CAPACITY {
        log.pop_front();
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::clock::{make_rng, ManualClock};
    use crate::types::EmotionMode;
    use pretty_assertions::assert_eq;
    use std::sync::{Arc, Mutex};

    #[derive(Debug, Clone, PartialEq)]
    enum Call {
        Render(String, Point),
        Show(String, String),
        Hide,
        Tone(f64, f64),
    }

    type Calls = Arc<Mutex<Vec<Call>>>;

    struct Recorder {
        calls: Calls,
        viewport: Viewport,
    }

    impl Renderer for Recorder {
        fn viewport(&self) -> Viewport {
            self.viewport
        }
        fn set_viewport(&mut self, viewport: Viewport) {
            self.viewport = viewport;
        }
        fn render(&mut self, feedback: &FeedbackTuple, position: Point) {
            self.calls.lock().unwrap().push(Call::Render(feedback.emotion.clone(), position));
        }
        fn show_message(&mut self, emotion: &str, message: &str) {
            self.calls.lock().unwrap().push(Call::Show(emotion.into(), message.into()));
        }
        fn hide_message(&mut self) {
            self.calls.lock().unwrap().push(Call::Hide);
        }
    }

    impl AudioSink for Recorder {
        fn play_tone(&mut self, frequency_hz: f64, duration_ms: f64) {
            self.calls.lock().unwrap().push(Call::Tone(frequency_hz, duration_ms));
        }
    }

    fn controller() -> (InteractionController, Calls, Arc<ManualClock>) {
        let calls: Calls = Arc::default();
        let clock = Arc::new(ManualClock::new(10_000));
        let viewport = Viewport::new(100.0, 100.0);
        let ctl = InteractionController::new(
            Box::new(Recorder { calls: calls.clone(), viewport }),
            Box::new(Recorder { calls: calls.clone(), viewport }),
            clock.clone(),
            make_rng(Some(5)),
        );
        (ctl, calls, clock)
    }

    fn down(x: f64, y: f64) -> PointerEvent {
        PointerEvent::Down { x, y }
    }

    fn mv(x: f64, y: f64) -> PointerEvent {
        PointerEvent::Move { x, y }
    }

    #[test]
    fn test_initial_status() {
        let (ctl, _, _) = controller();
        let status = ctl.status();
        assert_eq!(status.phase, InteractionPhase::Idle);
        assert_eq!(status.current_emotion, "peaceful");
        assert_eq!(status.background, INITIAL_BACKGROUND);
        assert_eq!(status.emotion_mode, EmotionMode::Default);
        assert!(!status.message_visible());
    }

    #[test]
    fn test_phase_machine() {
        let (mut ctl, _, _) = controller();

        assert!(ctl.handle_pointer(mv(1.0, 1.0)).is_none());
        assert_eq!(ctl.engine().history().len(), 0);

        let tap = ctl.handle_pointer(down(1.0, 1.0)).unwrap();
        assert_eq!(tap.operation.kind, crate::types::OperationKind::Tap);
        assert_eq!(ctl.phase(), InteractionPhase::Interacting);

        let drag = ctl.handle_pointer(mv(2.0, 2.0)).unwrap();
        assert_eq!(drag.operation.kind, crate::types::OperationKind::Drag);

        assert!(ctl.handle_pointer(PointerEvent::Up).is_none());
        assert_eq!(ctl.phase(), InteractionPhase::Idle);
        assert!(ctl.handle_pointer(mv(3.0, 3.0)).is_none());

        let hold = ctl
            .handle_pointer(PointerEvent::Hold { x: 4.0, y: 4.0, duration_ms: 900.0 })
            .unwrap();
        assert_eq!(hold.operation.duration, Some(900.0));
        assert_eq!(ctl.phase(), InteractionPhase::Idle);
        assert_eq!(ctl.engine().history().len(), 3);
    }

    #[test]
    fn test_drag_velocity() {
        let (mut ctl, _, clock) = controller();
        ctl.handle_pointer(down(0.0, 0.0));
        clock.advance(10);
        let drag = ctl.handle_pointer(mv(30.0, 40.0)).unwrap();
        assert_eq!(drag.operation.velocity, Some(5.0));

        // Same millisecond: no velocity
        let still = ctl.handle_pointer(mv(31.0, 40.0)).unwrap();
        assert_eq!(still.operation.velocity, None);
    }

    #[test]
    fn test_dispatches_render_and_tone() {
        let (mut ctl, calls, _) = controller();
        let outcome = ctl.handle_pointer(down(40.0, 60.0)).unwrap();

        let calls = calls.lock().unwrap().clone();
        assert_eq!(
            calls,
            vec![
                Call::Render("joyful".into(), Point::new(40.0, 60.0)),
                Call::Tone(outcome.feedback.frequency, 350.0),
            ]
        );
        assert_eq!(ctl.status().current_emotion, "joyful");
        assert_eq!(ctl.status().background, outcome.feedback.color);
    }

    #[test]
    fn test_drags_do_not_count() {
        let (mut ctl, _, _) = controller();
        let mut requests = Vec::new();

        for _ in 0..9 {
            requests.extend(ctl.handle_pointer(down(5.0, 5.0)).and_then(|o| o.request));
            ctl.handle_pointer(PointerEvent::Up);
        }
        assert!(requests.is_empty());
        requests.extend(ctl.handle_pointer(down(5.0, 5.0)).and_then(|o| o.request));
        for i in 0..50 {
            requests.extend(ctl.handle_pointer(mv(i as f64, 5.0)).and_then(|o| o.request));
        }
        // Only the 10th tap triggered
        assert_eq!(requests.len(), 1);
        assert_eq!(ctl.touches_since_classification(), 0);
    }

    #[test]
    fn test_nine_taps_fifty_drags_one_tap() {
        let (mut ctl, _, _) = controller();
        let mut triggers = 0;

        for _ in 0..9 {
            let op = TouchOperation::tap(1.0, 1.0, 0);
            triggers += ctl.process_operation(op).request.is_some() as usize;
        }
        assert_eq!(ctl.touches_since_classification(), 9);
        for _ in 0..50 {
            let op = TouchOperation::drag(1.0, 1.0, 0);
            triggers += ctl.process_operation(op).request.is_some() as usize;
        }
        assert_eq!(triggers, 0);

        let last = ctl.process_operation(TouchOperation::tap(1.0, 1.0, 0));
        let request = last.request.unwrap();
        assert_eq!(request.seq, 1);
        assert_eq!(request.history.len(), 20);
        assert_eq!(ctl.touches_since_classification(), 0);
        assert_eq!(ctl.status().classifications_requested, 1);
    }

    #[test]
    fn test_holds_count() {
        let (ctl, _, _) = controller();
        let mut ctl = ctl.with_classify_every(2);
        ctl.process_operation(TouchOperation::hold(1.0, 1.0, 0).with_duration(500.0));
        let out = ctl.process_operation(TouchOperation::hold(1.0, 1.0, 0).with_duration(500.0));
        assert!(out.request.is_some());
    }

    #[test]
    fn test_apply_classification_pins_and_shows() {
        let (mut ctl, calls, clock) = controller();
        ctl.process_operation(TouchOperation::tap(1.0, 1.0, 0));

        clock.set(20_000);
        let ticket = ctl.apply_classification(&Classification::new("calm", "so gentle"));
        let status = ctl.status();

        assert_eq!(status.emotion_mode, EmotionMode::Pinned("calm".into()));
        assert_eq!(status.current_emotion, "calm");
        assert_eq!(status.message.as_ref().unwrap().ticket, ticket);
        assert_eq!(status.message.as_ref().unwrap().shown_at, 20_000);
        assert_eq!(status.last_classified_at, Some(20_000));
        assert_eq!(status.recent_messages, vec!["so gentle".to_string()]);
        assert!(calls
            .lock()
            .unwrap()
            .contains(&Call::Show("calm".into(), "so gentle".into())));

        let next = ctl.process_operation(TouchOperation::tap(90.0, 90.0, 0));
        assert_eq!(next.feedback.frequency, 220.0);
    }

    #[test]
    fn test_hide_keeps_pinned_mode() {
        let (mut ctl, calls, _) = controller();
        let ticket = ctl.apply_classification(&Classification::new("excited", "wow"));

        assert!(ctl.hide_message(ticket));
        assert!(ctl.message().is_none());
        assert_eq!(ctl.engine().emotion_mode(), &EmotionMode::Pinned("excited".into()));
        assert_eq!(calls.lock().unwrap().last(), Some(&Call::Hide));

        // Second hide for the same ticket is a no-op
        assert!(!ctl.hide_message(ticket));
    }

    #[test]
    fn test_stale_ticket_does_not_hide_newer_message() {
        let (mut ctl, _, _) = controller();
        let first = ctl.apply_classification(&Classification::new("calm", "one"));
        let second = ctl.apply_classification(&Classification::new("joyful", "two"));
        assert_ne!(first, second);

        assert!(!ctl.hide_message(first));
        assert_eq!(ctl.message().unwrap().text, "two");
        assert!(ctl.hide_message(second));
    }

    #[test]
    fn test_failure_changes_nothing_but_counter() {
        let (mut ctl, _, _) = controller();
        ctl.process_operation(TouchOperation::tap(1.0, 1.0, 0));
        let before = ctl.status();

        ctl.record_classification_failure(1, &"timeout");
        let after = ctl.status();

        assert_eq!(after.classifications_failed, 1);
        assert_eq!(after.emotion_mode, before.emotion_mode);
        assert_eq!(after.message, before.message);
        assert_eq!(after.current_emotion, before.current_emotion);
    }

    #[test]
    fn test_recent_logs_are_bounded() {
        let (mut ctl, _, _) = controller();
        for i in 0..15 {
            ctl.process_operation(TouchOperation::tap(i as f64, 0.0, 0));
            ctl.apply_classification(&Classification::new("calm", format!("m{}", i)));
        }
        let status = ctl.status();
        assert_eq!(status.recent_feedback.len(), RECENT_LOG_CAPACITY);
        assert_eq!(status.recent_messages.len(), RECENT_LOG_CAPACITY);
        assert_eq!(status.recent_messages[0], "m5");
    }

    #[test]
    fn test_resize_changes_normalization() {
        let (mut ctl, _, _) = controller();
        ctl.resize(Viewport::new(1000.0, 1000.0));
        assert_eq!(ctl.engine().viewport(), Viewport::new(1000.0, 1000.0));

        ctl.process_operation(TouchOperation::tap(500.0, 0.0, 0));
        let f = ctl.process_operation(TouchOperation::tap(500.0, 0.0, 0)).feedback;
        // fx = 0.5 on the new viewport
        assert_eq!(f.frequency, 441.0);
    }
}
