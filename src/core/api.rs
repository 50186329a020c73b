//! HTTP + WebSocket API for remote canvases
//!
//! Endpoints:
//! - GET /health - Health check
//! - POST /session/new - Create new session
//! - GET /session/{id} - Get session status
//! - POST /session/{id}/pointer - Feed one pointer event
//! - PUT /session/{id}/profile - Replace the session profile
//! - DELETE /session/{id} - Stop a session
//! - WS /ws/{id} - Pointer events in, surface commands out
//!
//! A session ends on DELETE, or when its last WebSocket closes.

use axum::{
    extract::{Path, State, WebSocketUpgrade, ws::{Message, WebSocket}},
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::{get, post, put},
    Router,
};
use futures_util::{SinkExt, StreamExt};
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::core::audio::AudioSink;
use crate::core::clock::{make_rng, SharedClock};
use crate::core::controller::InteractionController;
use crate::core::render::{Renderer, TouchEffect, Viewport};
use crate::core::session::{spawn_session, SessionHandle, SessionServices};
use crate::types::{FeedbackTuple, Point, PointerEvent, SessionStatus, UserProfile};

/// What a remote canvas should do next
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum SurfaceCommand {
    Render {
        feedback: FeedbackTuple,
        position: Point,
        effect: TouchEffect,
    },
    Tone {
        frequency: f64,
        duration: f64,
    },
    ShowMessage {
        emotion: String,
        message: String,
    },
    HideMessage,
}

/// Renderer and audio sink that forward everything to WebSocket clients
#[derive(Debug, Clone)]
pub struct BroadcastSurface {
    viewport: Viewport,
    tx: broadcast::Sender<SurfaceCommand>,
    clock: SharedClock,
    rng: StdRng,
}

impl BroadcastSurface {
    pub fn new(
        viewport: Viewport,
        tx: broadcast::Sender<SurfaceCommand>,
        clock: SharedClock,
        rng: StdRng,
    ) -> Self {
        Self { viewport, tx, clock, rng }
    }

    fn emit(&self, command: SurfaceCommand) {
        // No subscribers is fine
        let _ = self.tx.send(command);
    }
}

impl Renderer for BroadcastSurface {
    fn viewport(&self) -> Viewport {
        self.viewport
    }

    fn set_viewport(&mut self, viewport: Viewport) {
        self.viewport = viewport;
    }

    fn render(&mut self, feedback: &FeedbackTuple, position: Point) {
        let effect = TouchEffect::spawn(feedback, position, self.clock.now_ms(), &mut self.rng);
        self.emit(SurfaceCommand::Render {
            feedback: feedback.clone(),
            position,
            effect,
        });
    }

    fn show_message(&mut self, emotion: &str, message: &str) {
        self.emit(SurfaceCommand::ShowMessage {
            emotion: emotion.to_string(),
            message: message.to_string(),
        });
    }

    fn hide_message(&mut self) {
        self.emit(SurfaceCommand::HideMessage);
    }
}

impl AudioSink for BroadcastSurface {
    fn play_tone(&mut self, frequency_hz: f64, duration_ms: f64) {
        self.emit(SurfaceCommand::Tone {
            frequency: frequency_hz,
            duration: duration_ms,
        });
    }
}

/// Defaults applied to new sessions
#[derive(Debug, Clone)]
pub struct ApiSettings {
    pub viewport: Viewport,
    pub classify_every: u32,
    pub profile: UserProfile,
    /// Reproducible effects and joyful picks when set
    pub seed: Option<u64>,
}

impl Default for ApiSettings {
    fn default() -> Self {
        Self {
            viewport: Viewport::default(),
            classify_every: crate::CLASSIFY_EVERY,
            profile: UserProfile::default(),
            seed: None,
        }
    }
}

/// One live session
#[derive(Debug)]
pub struct SessionEntry {
    pub handle: SessionHandle,
    pub surface_tx: broadcast::Sender<SurfaceCommand>,
    pub created_at: chrono::DateTime<chrono::Utc>,
    /// Open WebSocket connections; the session ends with the last one
    pub sockets: usize,
}

/// App state
pub struct AppState {
    pub sessions: RwLock<HashMap<String, SessionEntry>>,
    pub services: SessionServices,
    pub settings: ApiSettings,
}

impl AppState {
    pub fn new(services: SessionServices, settings: ApiSettings) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            services,
            settings,
        }
    }

    /// Register a socket on a session
    async fn attach_socket(&self, id: &str) -> Option<(SessionHandle, broadcast::Receiver<SurfaceCommand>)> {
        let mut sessions = self.sessions.write().await;
        let entry = sessions.get_mut(id)?;
        entry.sockets += 1;
        Some((entry.handle.clone(), entry.surface_tx.subscribe()))
    }

    /// Unregister a socket; returns true when that closed the session
    async fn detach_socket(&self, id: &str) -> bool {
        let mut sessions = self.sessions.write().await;
        let Some(entry) = sessions.get_mut(id) else {
            return false;
        };
        entry.sockets = entry.sockets.saturating_sub(1);
        if entry.sockets > 0 {
            return false;
        }
        if let Some(entry) = sessions.remove(id) {
            let _ = entry.handle.shutdown();
        }
        tracing::info!(session_id = %id, "last socket closed, session removed");
        true
    }

    /// Drop the entry once the session loop has ended
    fn reap_when_finished(self: &Arc<Self>, id: String, task: JoinHandle<()>) {
        let state = Arc::clone(self);
        tokio::spawn(async move {
            if let Err(e) = task.await {
                tracing::warn!(session_id = %id, error = %e, "session task failed");
            }
            if state.sessions.write().await.remove(&id).is_some() {
                tracing::info!(session_id = %id, "session ended, removed");
            }
        });
    }
}

/// Create new session request
#[derive(Debug, Default, Deserialize)]
pub struct NewSessionRequest {
    pub width: Option<f64>,
    pub height: Option<f64>,
    #[serde(default)]
    pub profile: Option<UserProfile>,
}

/// Create new session response
#[derive(Debug, Serialize)]
pub struct NewSessionResponse {
    pub session_id: String,
    pub websocket_url: String,
}

/// Session status response
#[derive(Debug, Serialize)]
pub struct SessionStatusResponse {
    pub session_id: String,
    pub created_at: chrono::DateTime<chrono::Utc>,
    #[serde(flatten)]
    pub status: SessionStatus,
}

/// Pointer response
#[derive(Debug, Serialize)]
pub struct PointerResponse {
    /// Absent when the event produced no operation
    pub feedback: Option<FeedbackTuple>,
    pub touches_since_classification: u32,
}

/// Health response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub sessions_active: usize,
    pub classifier: String,
}

/// Resize frame sent by a WebSocket client
#[derive(Debug, Deserialize)]
struct ResizeFrame {
    width: f64,
    height: f64,
}

/// Create the API router
pub fn create_router(services: SessionServices, settings: ApiSettings) -> Router {
    let state = Arc::new(AppState::new(services, settings));

    Router::new()
        .route("/health", get(health))
        .route("/session/new", post(create_session))
        .route("/session/:id", get(get_session).delete(delete_session))
        .route("/session/:id/pointer", post(post_pointer))
        .route("/session/:id/profile", put(put_profile))
        .route("/ws/:id", get(websocket_handler))
        .with_state(state)
}

/// Health check endpoint
async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let sessions = state.sessions.read().await;
    Json(HealthResponse {
        status: "ok".to_string(),
        version: crate::VERSION.to_string(),
        sessions_active: sessions.len(),
        classifier: state.services.classifier.name().to_string(),
    })
}

/// Create new session
async fn create_session(
    State(state): State<Arc<AppState>>,
    body: Option<Json<NewSessionRequest>>,
) -> Result<Json<NewSessionResponse>, StatusCode> {
    let req = body.map(|Json(r)| r).unwrap_or_default();
    let defaults = &state.settings;

    let viewport = Viewport::new(
        req.width.unwrap_or(defaults.viewport.width),
        req.height.unwrap_or(defaults.viewport.height),
    );
    if !(viewport.width > 0.0 && viewport.height > 0.0) {
        return Err(StatusCode::UNPROCESSABLE_ENTITY);
    }
    let profile = req
        .profile
        .unwrap_or_default()
        .or(defaults.profile.clone());

    let session_id = generate_session_id();
    let (surface_tx, _) = broadcast::channel(256);
    let clock = state.services.clock.clone();

    let renderer = BroadcastSurface::new(viewport, surface_tx.clone(), clock.clone(), make_rng(defaults.seed));
    let audio = renderer.clone();
    let controller = InteractionController::new(
        Box::new(renderer),
        Box::new(audio),
        clock,
        make_rng(defaults.seed),
    )
    .with_profile(profile)
    .with_classify_every(defaults.classify_every);

    let (handle, task) = spawn_session(controller, state.services.clone());

    let mut sessions = state.sessions.write().await;
    sessions.insert(
        session_id.clone(),
        SessionEntry {
            handle,
            surface_tx,
            created_at: chrono::Utc::now(),
            sockets: 0,
        },
    );
    drop(sessions);
    state.reap_when_finished(session_id.clone(), task);
    tracing::info!(session_id = %session_id, "session created");

    Ok(Json(NewSessionResponse {
        session_id: session_id.clone(),
        websocket_url: format!("/ws/{}", session_id),
    }))
}

async fn lookup(state: &AppState, id: &str) -> Result<(SessionHandle, chrono::DateTime<chrono::Utc>), StatusCode> {
    let sessions = state.sessions.read().await;
    let entry = sessions.get(id).ok_or(StatusCode::NOT_FOUND)?;
    Ok((entry.handle.clone(), entry.created_at))
}

/// Get session status
async fn get_session(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<SessionStatusResponse>, StatusCode> {
    let (handle, created_at) = lookup(&state, &id).await?;
    let status = handle.status().await.map_err(|_| StatusCode::GONE)?;

    Ok(Json(SessionStatusResponse {
        session_id: id,
        created_at,
        status,
    }))
}

/// Feed one pointer event
async fn post_pointer(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(event): Json<PointerEvent>,
) -> Result<Json<PointerResponse>, StatusCode> {
    let (handle, _) = lookup(&state, &id).await?;
    let feedback = handle.pointer(event).await.map_err(|_| StatusCode::GONE)?;
    let status = handle.status().await.map_err(|_| StatusCode::GONE)?;

    Ok(Json(PointerResponse {
        feedback,
        touches_since_classification: status.touches_since_classification,
    }))
}

/// Replace the session profile
async fn put_profile(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(profile): Json<UserProfile>,
) -> Result<StatusCode, StatusCode> {
    let (handle, _) = lookup(&state, &id).await?;
    let profile = UserProfile::new(profile.nickname, profile.birth_month, profile.gender);
    handle.set_profile(profile).map_err(|_| StatusCode::GONE)?;
    Ok(StatusCode::NO_CONTENT)
}

/// Stop and forget a session
async fn delete_session(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<StatusCode, StatusCode> {
    let entry = state
        .sessions
        .write()
        .await
        .remove(&id)
        .ok_or(StatusCode::NOT_FOUND)?;
    let _ = entry.handle.shutdown();
    tracing::info!(session_id = %id, "session deleted");
    Ok(StatusCode::NO_CONTENT)
}

/// WebSocket handler: pointer events in, surface commands out
async fn websocket_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    ws: WebSocketUpgrade,
) -> Result<impl IntoResponse, StatusCode> {
    if !state.sessions.read().await.contains_key(&id) {
        return Err(StatusCode::NOT_FOUND);
    }

    Ok(ws.on_upgrade(move |socket| async move {
        let Some((handle, rx)) = state.attach_socket(&id).await else {
            return;
        };
        handle_websocket(socket, handle, rx).await;
        state.detach_socket(&id).await;
    }))
}

/// Parse one client text frame: a pointer event or `{width, height}`
fn apply_client_frame(handle: &SessionHandle, text: &str) -> Result<(), String> {
    if let Ok(event) = serde_json::from_str::<PointerEvent>(text) {
        return handle.send_pointer(event).map_err(|e| e.to_string());
    }
    match serde_json::from_str::<ResizeFrame>(text) {
        Ok(frame) => handle
            .resize(Viewport::new(frame.width, frame.height))
            .map_err(|e| e.to_string()),
        Err(e) => Err(format!("unrecognized frame: {}", e)),
    }
}

/// Handle WebSocket connection
async fn handle_websocket(
    socket: WebSocket,
    handle: SessionHandle,
    mut rx: broadcast::Receiver<SurfaceCommand>,
) {
    let (mut sender, mut receiver) = socket.split();

    let mut push = tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(command) => {
                    let json = match serde_json::to_string(&command) {
                        Ok(json) => json,
                        Err(e) => {
                            tracing::warn!(error = %e, "failed to serialize surface command");
                            continue;
                        }
                    };
                    if sender.send(Message::Text(json)).await.is_err() {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "websocket client lagging");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    let mut pull = tokio::spawn(async move {
        while let Some(Ok(message)) = receiver.next().await {
            match message {
                Message::Text(text) => {
                    if let Err(e) = apply_client_frame(&handle, &text) {
                        tracing::debug!(error = %e, "ignoring websocket frame");
                    }
                }
                Message::Close(_) => break,
                _ => {}
            }
        }
    });

    tokio::select! {
        _ = &mut push => pull.abort(),
        _ = &mut pull => push.abort(),
    }
}

/// Generate session ID
fn generate_session_id() -> String {
    format!("session_{}", Uuid::new_v4().simple())
}

/// Run the API server
pub async fn run_server(addr: &str, services: SessionServices, settings: ApiSettings) -> anyhow::Result<()> {
    let router = create_router(services, settings);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "touchfeel API listening");
    println!("touchfeel API running on {}", addr);
    println!("  POST   /session/new          - Create session");
    println!("  GET    /session/:id          - Get status");
    println!("  POST   /session/:id/pointer  - Pointer event");
    println!("  PUT    /session/:id/profile  - Set profile");
    println!("  DELETE /session/:id          - Stop session");
    println!("  WS     /ws/:id               - Live surface");
    println!("  GET    /health               - Health check");
    axum::serve(listener, router).await?;
    Ok(())
}

// =============================================================================
// TESTS
// =============================================================================
