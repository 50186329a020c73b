//! Session driver: one event loop task per interaction session
//!
//! All controller state is touched only from the loop task. Classification
//! calls and hide timers run as separate tasks that post their outcome back
//! onto the session channel, so results apply in arrival order.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;

use crate::core::classify::{classifier_window, Classifier, ClassifyError};
use crate::core::clock::SharedClock;
use crate::core::controller::InteractionController;
use crate::core::journal::Journal;
use crate::core::render::Viewport;
use crate::types::{
    Classification, ClassificationRequest, EmotionLogEntry, FeedbackTuple, MessageTicket,
    PointerEvent, SessionStatus, UserProfile,
};
use crate::MESSAGE_DISPLAY_MS;

/// Input to a session loop
#[derive(Debug)]
pub enum SessionEvent {
    Pointer {
        event: PointerEvent,
        /// Receives the feedback, or `None` when the event produced no operation
        reply: Option<oneshot::Sender<Option<FeedbackTuple>>>,
    },
    Resize(Viewport),
    Profile(UserProfile),
    Classified {
        seq: u64,
        result: Result<Classification, ClassifyError>,
    },
    HideMessage(MessageTicket),
    Status(oneshot::Sender<SessionStatus>),
    Shutdown,
}

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("session is closed")]
pub struct SessionClosed;

/// Session collaborators shared across tasks
#[derive(Clone)]
pub struct SessionServices {
    pub classifier: Arc<dyn Classifier>,
    pub journal: Arc<dyn Journal>,
    pub clock: SharedClock,
    /// How long a classification message stays up
    pub message_display: Duration,
}

impl SessionServices {
    pub fn new(classifier: Arc<dyn Classifier>, journal: Arc<dyn Journal>, clock: SharedClock) -> Self {
        Self {
            classifier,
            journal,
            clock,
            message_display: Duration::from_millis(MESSAGE_DISPLAY_MS),
        }
    }
}

impl std::fmt::Debug for SessionServices {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionServices")
            .field("classifier", &self.classifier.name())
            .field("message_display", &self.message_display)
            .finish_non_exhaustive()
    }
}

/// Cheap, cloneable access to a running session
#[derive(Debug, Clone)]
pub struct SessionHandle {
    tx: mpsc::UnboundedSender<SessionEvent>,
    status: watch::Receiver<SessionStatus>,
}

impl SessionHandle {
    /// Send a pointer event and wait for its feedback
    pub async fn pointer(&self, event: PointerEvent) -> Result<Option<FeedbackTuple>, SessionClosed> {
        let (reply, rx) = oneshot::channel();
        self.send(SessionEvent::Pointer {
            event,
            reply: Some(reply),
        })?;
        rx.await.map_err(|_| SessionClosed)
    }

    /// Send a pointer event without waiting
    pub fn send_pointer(&self, event: PointerEvent) -> Result<(), SessionClosed> {
        self.send(SessionEvent::Pointer { event, reply: None })
    }

    pub fn resize(&self, viewport: Viewport) -> Result<(), SessionClosed> {
        self.send(SessionEvent::Resize(viewport))
    }

    pub fn set_profile(&self, profile: UserProfile) -> Result<(), SessionClosed> {
        self.send(SessionEvent::Profile(profile))
    }

    /// Status after every event queued before this call
    pub async fn status(&self) -> Result<SessionStatus, SessionClosed> {
        let (reply, rx) = oneshot::channel();
        self.send(SessionEvent::Status(reply))?;
        rx.await.map_err(|_| SessionClosed)
    }

    pub fn subscribe_status(&self) -> watch::Receiver<SessionStatus> {
        self.status.clone()
    }

    pub fn shutdown(&self) -> Result<(), SessionClosed> {
        self.send(SessionEvent::Shutdown)
    }

    fn send(&self, event: SessionEvent) -> Result<(), SessionClosed> {
        self.tx.send(event).map_err(|_| SessionClosed)
    }
}

/// Event loop owning one controller
pub struct Session {
    controller: InteractionController,
    services: SessionServices,
    events: mpsc::UnboundedReceiver<SessionEvent>,
    /// For spawned tasks; weak so dropped handles end the loop
    events_tx: mpsc::WeakUnboundedSender<SessionEvent>,
    status_tx: watch::Sender<SessionStatus>,
}

/// Start a session loop on the current runtime
pub fn spawn_session(
    controller: InteractionController,
    services: SessionServices,
) -> (SessionHandle, JoinHandle<()>) {
    let (session, handle) = Session::new(controller, services);
    let task = tokio::spawn(session.run());
    (handle, task)
}

impl Session {
    pub fn new(controller: InteractionController, services: SessionServices) -> (Self, SessionHandle) {
        let (tx, events) = mpsc::unbounded_channel();
        let (status_tx, status_rx) = watch::channel(controller.status());
        let session = Self {
            controller,
            services,
            events,
            events_tx: tx.downgrade(),
            status_tx,
        };
        let handle = SessionHandle {
            tx,
            status: status_rx,
        };
        (session, handle)
    }

    /// Process events until shutdown or every sender is gone
    pub async fn run(mut self) {
        tracing::info!(classifier = self.services.classifier.name(), "session started");

        while let Some(event) = self.events.recv().await {
            if matches!(event, SessionEvent::Shutdown) {
                break;
            }
            self.handle(event);
            self.status_tx.send_replace(self.controller.status());
        }

        tracing::info!("session stopped");
    }

    fn handle(&mut self, event: SessionEvent) {
        match event {
            SessionEvent::Pointer { event, reply } => {
                let outcome = self.controller.handle_pointer(event);
                let feedback = outcome.as_ref().map(|o| o.feedback.clone());
                if let Some(request) = outcome.and_then(|o| o.request) {
                    self.dispatch_classification(request);
                }
                if let Some(reply) = reply {
                    let _ = reply.send(feedback);
                }
            }
            SessionEvent::Resize(viewport) => {
                tracing::debug!(width = viewport.width, height = viewport.height, "viewport resized");
                self.controller.resize(viewport);
            }
            SessionEvent::Profile(profile) => {
                self.controller.set_profile(profile);
            }
            SessionEvent::Classified { seq, result } => match result {
                Ok(classification) => {
                    let ticket = self.controller.apply_classification(&classification);
                    tracing::debug!(seq, "classification response applied");
                    self.schedule_hide(ticket);
                }
                Err(error) => self.controller.record_classification_failure(seq, &error),
            },
            SessionEvent::HideMessage(ticket) => {
                self.controller.hide_message(ticket);
            }
            SessionEvent::Status(reply) => {
                let _ = reply.send(self.controller.status());
            }
            SessionEvent::Shutdown => {}
        }
    }

    /// Fire and forget; the outcome comes back as `Classified`
    fn dispatch_classification(&self, request: ClassificationRequest) {
        let Some(tx) = self.events_tx.upgrade() else {
            return;
        };
        let classifier = self.services.classifier.clone();
        let journal = self.services.journal.clone();
        let clock = self.services.clock.clone();

        tokio::spawn(async move {
            let ClassificationRequest { seq, history, profile } = request;
            let result = classifier.classify(&history, &profile).await;

            if let Ok(classification) = &result {
                let timestamp = DateTime::<Utc>::from_timestamp_millis(clock.now_ms()).unwrap_or_else(Utc::now);
                let entry = EmotionLogEntry::new(
                    timestamp,
                    &profile,
                    classification,
                    classifier_window(&history).to_vec(),
                );
                match tokio::task::spawn_blocking(move || journal.record(&entry)).await {
                    Ok(Ok(_)) => {}
                    Ok(Err(e)) => tracing::warn!(seq, error = %e, "journal write failed"),
                    Err(e) => tracing::warn!(seq, error = %e, "journal task failed"),
                }
            }

            let _ = tx.send(SessionEvent::Classified { seq, result });
        });
    }

    fn schedule_hide(&self, ticket: MessageTicket) {
        let Some(tx) = self.events_tx.upgrade() else {
            return;
        };
        let delay = self.services.message_display;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send(SessionEvent::HideMessage(ticket));
        });
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::audio::NullAudio;
    use crate::core::classify::OfflineClassifier;
    use crate::core::clock::{make_rng, ManualClock};
    use crate::core::journal::NullJournal;
    use crate::core::render::TerminalRenderer;
    use crate::types::EmotionMode;

    fn start(every: u32) -> (SessionHandle, JoinHandle<()>) {
        let clock: SharedClock = Arc::new(ManualClock::new(0));
        let controller = InteractionController::new(
            Box::new(TerminalRenderer::new(Viewport::new(100.0, 100.0), true, true)),
            Box::new(NullAudio),
            clock.clone(),
            make_rng(Some(1)),
        )
        .with_classify_every(every);
        let services = SessionServices::new(Arc::new(OfflineClassifier), Arc::new(NullJournal), clock);
        spawn_session(controller, services)
    }

    #[tokio::test]
    async fn test_pointer_round_trip() {
        let (handle, _task) = start(10);
        let feedback = handle.pointer(PointerEvent::Down { x: 1.0, y: 1.0 }).await.unwrap();
        assert_eq!(feedback.unwrap().emotion, "joyful");

        let none = handle.pointer(PointerEvent::Up).await.unwrap();
        assert!(none.is_none());
        assert_eq!(handle.status().await.unwrap().history_len, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_offline_classification_pins_then_hides() {
        let (handle, _task) = start(3);
        for _ in 0..3 {
            handle.pointer(PointerEvent::Down { x: 5.0, y: 5.0 }).await.unwrap();
        }

        // Let the classify task and its reply run
        tokio::time::sleep(Duration::from_millis(10)).await;
        let status = handle.status().await.unwrap();
        assert_eq!(status.emotion_mode, EmotionMode::Pinned("excited".into()));
        assert!(status.message_visible());

        tokio::time::sleep(Duration::from_millis(MESSAGE_DISPLAY_MS)).await;
        let status = handle.status().await.unwrap();
        assert!(!status.message_visible());
        assert_eq!(status.emotion_mode, EmotionMode::Pinned("excited".into()));
    }

    #[tokio::test]
    async fn test_shutdown_closes_session() {
        let (handle, task) = start(10);
        handle.shutdown().unwrap();
        task.await.unwrap();
        assert_eq!(handle.status().await, Err(SessionClosed));
    }

    #[tokio::test]
    async fn test_dropping_handles_ends_loop() {
        let (handle, task) = start(10);
        drop(handle);
        task.await.unwrap();
    }
}
