//! Web routes for the conversation simulator.
//!
//! HTML Endpoints:
//! - `GET  /`              — simulator page (HTML)
//!
//! API Endpoints:
//! - `GET  /simulate`      — run a full simulated conversation as an SSE stream
//! - `POST /user_message`  — interactive mode: send one customer message

use std::convert::Infallible;
use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{
        sse::{Event, KeepAlive, KeepAliveStream, Sse},
        Html,
    },
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tera::{Context, Tera};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{error, info, warn};
use uuid::Uuid;

use tariffsim_agent::ConversationController;
use tariffsim_core::domain::conversation::SessionId;
use tariffsim_core::domain::message::{Message, MessageRole};
use tariffsim_core::domain::persona::PersonaCatalog;
use tariffsim_core::domain::tariff::TariffCatalog;
use tariffsim_core::errors::InterfaceError;

use crate::bootstrap::Application;
use crate::sessions::{SessionStore, SharedSession};
use crate::transcripts::{JsonFileTranscriptStore, TranscriptStore};

#[derive(Clone)]
pub struct SimulatorState {
    controller: Arc<ConversationController>,
    sessions: Arc<SessionStore>,
    transcripts: Arc<JsonFileTranscriptStore>,
    personas: Arc<PersonaCatalog>,
    catalog: TariffCatalog,
    templates: Arc<Tera>,
}

// ---------------------------------------------------------------------------
// Request / Response types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, Default)]
pub struct SimulateQuery {
    pub session_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UserMessageRequest {
    pub session_id: Option<String>,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct UserMessageResponse {
    pub session_id: String,
    pub content: String,
    pub conversation_complete: bool,
}

#[derive(Debug, Serialize)]
pub struct ApiError {
    pub error: String,
}

/// One SSE payload. Exactly one of the optional fields is set per event.
#[derive(Debug, Default, Serialize)]
struct StreamEvent {
    #[serde(skip_serializing_if = "Option::is_none")]
    persona_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    end: Option<bool>,
}

impl StreamEvent {
    fn persona(name: &str) -> Self {
        Self { persona_name: Some(name.to_string()), ..Self::default() }
    }

    fn message(message: &Message) -> Self {
        Self {
            role: Some(message.role.as_str().to_string()),
            content: Some(message.content.clone()),
            ..Self::default()
        }
    }

    fn status(status: &str) -> Self {
        Self { status: Some(status.to_string()), ..Self::default() }
    }

    fn error(message: &str) -> Self {
        Self { error: Some(message.to_string()), ..Self::default() }
    }

    fn end() -> Self {
        Self { end: Some(true), ..Self::default() }
    }
}

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

/// Initialize the Tera template engine with the simulator page.
fn init_templates() -> Arc<Tera> {
    let mut tera = match Tera::new("templates/**/*") {
        Ok(t) => t,
        Err(e) => {
            warn!(error = %e, "failed to load templates from filesystem, using empty Tera instance");
            Tera::default()
        }
    };

    // Embedded fallback so the binary works without an on-disk templates dir.
    tera.add_raw_template("index.html", include_str!("../../../templates/index.html")).ok();

    Arc::new(tera)
}

pub fn router(app: &Application) -> Router {
    let state = SimulatorState {
        controller: Arc::clone(&app.controller),
        sessions: Arc::clone(&app.sessions),
        transcripts: Arc::clone(&app.transcripts),
        personas: Arc::new(app.personas.clone()),
        catalog: app.catalog.clone(),
        templates: init_templates(),
    };

    Router::new()
        .route("/", get(index_page))
        .route("/simulate", get(simulate))
        .route("/user_message", post(user_message))
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// Render the simulator HTML page.
async fn index_page(
    State(state): State<SimulatorState>,
) -> Result<Html<String>, (StatusCode, Html<String>)> {
    let mut context = Context::new();
    context.insert("plans", &state.catalog.plans);
    context.insert("plan_names", &state.catalog.plan_names());

    let html = state.templates.render("index.html", &context).map_err(|e| {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Html(format!("<h1>Template Error</h1><pre>{e:?}</pre>")),
        )
    })?;

    Ok(Html(html))
}

/// Run a complete simulated conversation, streaming every message as it is
/// generated. The stream always terminates with an `{end: true}` event, on
/// failure preceded by an `{error}` event carrying a user-safe message.
async fn simulate(
    Query(query): Query<SimulateQuery>,
    State(state): State<SimulatorState>,
) -> Sse<KeepAliveStream<ReceiverStream<Result<Event, Infallible>>>> {
    let session_id =
        SessionId(query.session_id.unwrap_or_else(|| Uuid::new_v4().simple().to_string()));
    let correlation_id = Uuid::new_v4().simple().to_string();

    let session = state.sessions.get_or_create(&session_id);

    let (tx, rx) = mpsc::channel::<Result<Event, Infallible>>(32);
    tokio::spawn(run_simulation(state, session, session_id, correlation_id, tx));

    Sse::new(ReceiverStream::new(rx)).keep_alive(KeepAlive::default())
}

async fn run_simulation(
    state: SimulatorState,
    session: SharedSession,
    session_id: SessionId,
    correlation_id: String,
    tx: mpsc::Sender<Result<Event, Infallible>>,
) {
    let mut entry = session.lock().await;
    entry.touch();

    // Resumed simulations keep their persona; fresh ones (including sessions
    // that began interactively) get a random profile now.
    let persona = {
        let chosen = state.personas.pick_random().clone();
        entry.assign_persona(&chosen)
    };

    info!(
        event_name = "server.simulate.start",
        correlation_id = %correlation_id,
        session_id = %session_id.as_str(),
        persona = %persona.name,
        "simulated conversation started"
    );

    if entry.state.messages.is_empty() {
        if !send(&tx, StreamEvent::persona(&persona.name)).await {
            return;
        }
        let greeting = ConversationController::greeting();
        if entry.state.append(greeting.clone()).is_ok()
            && !send(&tx, StreamEvent::message(&greeting)).await
        {
            return;
        }
    } else {
        // Resumed stream: replay what the session already holds.
        if !send(&tx, StreamEvent::persona(&persona.name)).await {
            return;
        }
        for message in &entry.state.messages {
            if message.role == MessageRole::Log {
                continue;
            }
            if !send(&tx, StreamEvent::message(message)).await {
                return;
            }
        }
    }

    while !entry.state.terminal {
        if !send(&tx, StreamEvent::status("generating next exchange")).await {
            return;
        }

        let outcome = match state.controller.advance(&mut entry.state, &persona).await {
            Ok(outcome) => outcome,
            Err(app_error) => {
                let interface: InterfaceError = app_error.clone().into_interface(&correlation_id);
                error!(
                    event_name = "server.simulate.generation_failed",
                    correlation_id = %correlation_id,
                    session_id = %session_id.as_str(),
                    error = %app_error,
                    "simulation aborted"
                );
                let _ = send(&tx, StreamEvent::error(interface.user_message())).await;
                break;
            }
        };

        for message in &outcome.new_messages {
            if !send(&tx, StreamEvent::message(message)).await {
                return;
            }
        }

        persist(&state, &entry.state, &correlation_id).await;
        entry.touch();
    }

    if let Some(plan) = &entry.state.selected_plan {
        info!(
            event_name = "server.simulate.completed",
            correlation_id = %correlation_id,
            session_id = %session_id.as_str(),
            selected_plan = %plan,
            "simulated conversation ended with a selection"
        );
    }

    let _ = send(&tx, StreamEvent::end()).await;
}

/// Interactive mode: record the caller's customer message and return the
/// generated assistant reply.
async fn user_message(
    State(state): State<SimulatorState>,
    Json(body): Json<UserMessageRequest>,
) -> Result<Json<UserMessageResponse>, (StatusCode, Json<ApiError>)> {
    let correlation_id = Uuid::new_v4().simple().to_string();

    let message = body.message.trim();
    if message.is_empty() {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(ApiError { error: "message must not be empty".to_string() }),
        ));
    }

    // No persona here: the caller is the customer, and `respond` builds its
    // prompt from the message itself when the session has no profile.
    let session_id =
        SessionId(body.session_id.unwrap_or_else(|| Uuid::new_v4().simple().to_string()));
    let session = state.sessions.get_or_create(&session_id);
    let mut entry = session.lock().await;
    entry.touch();

    if entry.state.terminal {
        return Ok(Json(UserMessageResponse {
            session_id: session_id.as_str().to_string(),
            content: "This conversation has already ended.".to_string(),
            conversation_complete: true,
        }));
    }

    let outcome =
        state.controller.respond(&mut entry.state, message).await.map_err(|app_error| {
            let interface = app_error.clone().into_interface(&correlation_id);
            error!(
                event_name = "server.user_message.failed",
                correlation_id = %correlation_id,
                session_id = %session_id.as_str(),
                error = %app_error,
                "interactive turn failed"
            );
            let status = match interface {
                InterfaceError::BadRequest { .. } => StatusCode::BAD_REQUEST,
                InterfaceError::ServiceUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
                InterfaceError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            };
            (status, Json(ApiError { error: interface.user_message().to_string() }))
        })?;

    persist(&state, &entry.state, &correlation_id).await;

    let content = outcome
        .new_messages
        .iter()
        .map(|m| m.content.as_str())
        .collect::<Vec<_>>()
        .join("\n\n");

    info!(
        event_name = "server.user_message.answered",
        correlation_id = %correlation_id,
        session_id = %session_id.as_str(),
        conversation_complete = entry.state.terminal,
        "interactive turn answered"
    );

    Ok(Json(UserMessageResponse {
        session_id: session_id.as_str().to_string(),
        content,
        conversation_complete: entry.state.terminal,
    }))
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Returns false when the client has disconnected.
async fn send(tx: &mpsc::Sender<Result<Event, Infallible>>, payload: StreamEvent) -> bool {
    let event = match serde_json::to_string(&payload) {
        Ok(json) => Event::default().data(json),
        Err(error) => {
            error!(error = %error, "failed to serialize stream event");
            return false;
        }
    };
    tx.send(Ok(event)).await.is_ok()
}

/// Transcript persistence is best-effort during streaming: a failed write is
/// logged but does not abort the conversation.
async fn persist(
    state: &SimulatorState,
    conversation: &tariffsim_core::domain::conversation::ConversationState,
    correlation_id: &str,
) {
    if let Err(error) = state.transcripts.save(conversation).await {
        error!(
            event_name = "server.transcripts.save_failed",
            correlation_id = %correlation_id,
            session_id = %conversation.session_id.as_str(),
            error = %error,
            "transcript write failed"
        );
    }
}
