use axum::{
    extract::{Json, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response, sse::{Event, Sse}},
};
use futures_util::stream::Stream;
use serde_json::json;
use std::convert::Infallible;
use std::sync::Arc;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::StreamExt;
use tracing::warn;

use crate::events::{self, ChatEvent, EventSender};
use crate::memory::Db;
use crate::sessions::{Session, SharedSession};

use super::server::AppState;
use super::types::*;

type ApiError = (StatusCode, Json<serde_json::Value>);

fn api_error(status: StatusCode, message: impl Into<String>) -> ApiError {
    (status, Json(json!({ "error": message.into() })))
}

pub async fn handle_chat(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ChatRequest>,
) -> Response {
    if req.message.trim().is_empty() {
        return api_error(StatusCode::BAD_REQUEST, "message cannot be empty").into_response();
    }

    if req.stream.unwrap_or(false) {
        handle_chat_stream(state, req).await.into_response()
    } else {
        handle_chat_standard(state, req).await.into_response()
    }
}

async fn handle_chat_standard(
    state: Arc<AppState>,
    req: ChatRequest,
) -> Result<Json<ChatResponse>, ApiError> {
    let session = open_session(&state, req.session_id.as_deref());
    let mut session = session.lock().await;

    let result = session.orchestrator.run_turn(&req.message).await;
    persist(&state.db, &mut session);

    match result {
        Ok(outcome) => Ok(Json(ChatResponse {
            session_id: session.id.clone(),
            content: outcome.content,
            status: outcome.status,
            rounds: outcome.rounds,
            tool_access: outcome.tool_access,
        })),
        Err(e) => Err((
            StatusCode::BAD_GATEWAY,
            Json(json!({ "error": e.to_string(), "session_id": session.id })),
        )),
    }
}

async fn handle_chat_stream(
    state: Arc<AppState>,
    req: ChatRequest,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    // Generate unique request ID
    let request_id = uuid::Uuid::new_v4().to_string();

    // Create event receiver
    let rx = events::create_channel(request_id.clone());

    // Run the turn in background
    tokio::spawn(async move {
        let events = EventSender::new(request_id);
        let session = open_session(&state, req.session_id.as_deref());
        let mut session = session.lock().await;

        let result = session
            .orchestrator
            .run_turn_observed(&req.message, Some(&events))
            .await;
        persist(&state.db, &mut session);

        match result {
            Ok(_) => events.complete(&session.id),
            Err(e) => events.error(e.to_string()),
        }
    });

    // Convert broadcast receiver to SSE stream
    let stream = BroadcastStream::new(rx).filter_map(sse_event);

    Sse::new(stream)
}

fn sse_event(result: Result<ChatEvent, BroadcastStreamRecvError>) -> Option<Result<Event, Infallible>> {
    match result {
        Ok(event) => serde_json::to_string(&event)
            .ok()
            .map(|json| Ok(Event::default().data(json))),
        Err(BroadcastStreamRecvError::Lagged(skipped)) => {
            warn!(skipped, "SSE client fell behind, events dropped");
            None
        }
    }
}

fn open_session(state: &AppState, id: Option<&str>) -> SharedSession {
    let (session, _) = state.sessions.open(id, |id| match state.db.load_transcript(id) {
        Ok(transcript) => transcript,
        Err(e) => {
            warn!(session = %id, error = %e, "could not load stored transcript");
            Vec::new()
        }
    });
    session
}

/// Stores whatever the last turn appended. Storage failures never fail a turn.
fn persist(db: &Db, session: &mut Session) {
    let unsaved = session.unsaved();
    if unsaved.is_empty() {
        return;
    }

    let saved = db
        .ensure_session(&session.id)
        .and_then(|_| db.append_messages(&session.id, session.persisted(), unsaved));

    match saved {
        Ok(()) => session.mark_saved(),
        Err(e) => warn!(session = %session.id, error = %e, "failed to store transcript"),
    }
}

pub async fn handle_list_tools(State(state): State<Arc<AppState>>) -> Json<ListToolsResponse> {
    let tools = state
        .sessions
        .registry()
        .manifest()
        .into_iter()
        .map(|tool| ToolInfo {
            name: tool.function.name,
            description: tool.function.description,
            parameters: tool.function.parameters,
        })
        .collect();

    Json(ListToolsResponse { tools })
}

pub async fn handle_history(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<HistoryResponse>, ApiError> {
    if let Some(session) = state.sessions.get(&id) {
        let messages = session.lock().await.orchestrator.state().messages().to_vec();
        return Ok(Json(HistoryResponse { session_id: id, messages }));
    }

    match state.db.load_transcript(&id) {
        Ok(messages) if !messages.is_empty() => Ok(Json(HistoryResponse { session_id: id, messages })),
        Ok(_) => Err(api_error(StatusCode::NOT_FOUND, format!("Unknown session '{}'", id))),
        Err(e) => Err(api_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Database error: {}", e),
        )),
    }
}

pub async fn health_check() -> &'static str {
    "Flux is running"
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::{AssistantTurn, GatewayError, ScriptedGateway};
    use crate::message::{Role, ToolCall};
    use crate::orchestrator::{OrchestratorConfig, TurnStatus};
    use crate::sessions::{SessionLimits, SessionStore};
    use std::time::Duration;
    use flux_shared::ToolRegistry;
    use flux_shared::toolbelts::SecretScanner;

    fn app(gateway: ScriptedGateway) -> Arc<AppState> {
        app_with_limits(gateway, SessionLimits::default())
    }

    fn app_with_limits(gateway: ScriptedGateway, limits: SessionLimits) -> Arc<AppState> {
        let mut registry = ToolRegistry::new();
        registry.register_toolbelt(SecretScanner::default()).unwrap();

        Arc::new(AppState {
            sessions: SessionStore::new(
                Arc::new(gateway),
                Arc::new(registry),
                Arc::new(OrchestratorConfig::default()),
                "You are Flux.",
            )
            .with_limits(limits),
            db: Db::in_memory().unwrap(),
        })
    }

    fn chat(session_id: Option<&str>, message: &str) -> Json<ChatRequest> {
        Json(ChatRequest {
            session_id: session_id.map(str::to_string),
            message: message.to_string(),
            stream: None,
        })
    }

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn chat_answers_and_stores_the_transcript() {
        let state = app(ScriptedGateway::new([
            AssistantTurn::calls(vec![ToolCall::new(
                "c1",
                "scan-for-secrets",
                json!({ "fileName": "app.env", "content": "API_KEY=abc" }),
            )]),
            AssistantTurn::text("app.env looks like it contains an API key."),
        ]));

        let response = handle_chat(State(Arc::clone(&state)), chat(Some("s1"), "scan app.env")).await;
        assert_eq!(response.status(), StatusCode::OK);

        let body = body_json(response).await;
        assert_eq!(body["session_id"], "s1");
        assert_eq!(body["status"], "answered");
        assert_eq!(body["rounds"], 2);

        let stored = state.db.load_transcript("s1").unwrap();
        let roles: Vec<Role> = stored.iter().map(|m| m.role).collect();
        assert_eq!(roles, vec![Role::System, Role::User, Role::Assistant, Role::Tool, Role::Assistant]);
        assert!(stored[3].text().unwrap().starts_with("[SECURITY ALERT]"));
    }

    #[tokio::test]
    async fn second_turn_appends_to_the_same_session() {
        let state = app(ScriptedGateway::repeating(AssistantTurn::text("Hi!")));

        handle_chat(State(Arc::clone(&state)), chat(Some("s1"), "hey")).await;
        handle_chat(State(Arc::clone(&state)), chat(Some("s1"), "thanks")).await;

        assert_eq!(state.db.load_transcript("s1").unwrap().len(), 5);
        assert_eq!(state.sessions.len(), 1);
    }

    #[tokio::test]
    async fn evicted_session_resumes_from_the_database() {
        let limits = SessionLimits {
            capacity: 1,
            idle_ttl: Duration::from_secs(3600),
        };
        let state = app_with_limits(ScriptedGateway::repeating(AssistantTurn::text("Hi!")), limits);

        handle_chat(State(Arc::clone(&state)), chat(Some("s1"), "hey")).await;
        handle_chat(State(Arc::clone(&state)), chat(Some("s2"), "hey")).await;
        assert_eq!(state.sessions.len(), 1);
        assert!(state.sessions.get("s1").is_none());

        let response = handle_chat(State(Arc::clone(&state)), chat(Some("s1"), "thanks")).await;
        assert_eq!(response.status(), StatusCode::OK);

        let stored = state.db.load_transcript("s1").unwrap();
        let roles: Vec<Role> = stored.iter().map(|m| m.role).collect();
        assert_eq!(roles, vec![Role::System, Role::User, Role::Assistant, Role::User, Role::Assistant]);
    }

    #[test]
    fn lagged_stream_errors_are_skipped() {
        assert!(sse_event(Err(BroadcastStreamRecvError::Lagged(7))).is_none());
        assert!(sse_event(Ok(ChatEvent::Done { session_id: "s1".to_string() })).is_some());
    }

    #[tokio::test]
    async fn empty_message_is_rejected() {
        let state = app(ScriptedGateway::default());

        let response = handle_chat(State(Arc::clone(&state)), chat(None, "   ")).await;

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(state.sessions.is_empty());
    }

    #[tokio::test]
    async fn gateway_failure_is_a_bad_gateway_and_keeps_the_user_message() {
        let state = app(ScriptedGateway::with_results([Err(GatewayError::Transport(
            "connection refused".to_string(),
        ))]));

        let response = handle_chat(State(Arc::clone(&state)), chat(Some("s1"), "list your repos")).await;
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);

        let stored = state.db.load_transcript("s1").unwrap();
        assert_eq!(stored.last().and_then(|m| m.text()), Some("list your repos"));
    }

    #[tokio::test]
    async fn history_prefers_live_sessions_and_falls_back_to_storage() {
        let state = app(ScriptedGateway::repeating(AssistantTurn::text("Hi!")));
        handle_chat(State(Arc::clone(&state)), chat(Some("s1"), "hey")).await;

        let Json(live) = handle_history(State(Arc::clone(&state)), Path("s1".to_string())).await.unwrap();
        assert_eq!(live.messages.len(), 3);

        state.db.ensure_session("archived").unwrap();
        state.db.append_messages("archived", 0, &live.messages).unwrap();
        let Json(stored) = handle_history(State(Arc::clone(&state)), Path("archived".to_string())).await.unwrap();
        assert_eq!(stored.messages, live.messages);

        let missing = handle_history(State(state), Path("nope".to_string())).await.unwrap_err();
        assert_eq!(missing.0, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn tool_listing_mirrors_the_registry() {
        let state = app(ScriptedGateway::default());

        let Json(listing) = handle_list_tools(State(state)).await;

        assert_eq!(listing.tools.len(), 1);
        assert_eq!(listing.tools[0].name, "scan-for-secrets");
        assert_eq!(listing.tools[0].parameters["required"], json!(["fileName", "content"]));
    }

    #[test]
    fn turn_status_serializes_snake_case() {
        assert_eq!(serde_json::to_value(TurnStatus::LoopGuardExceeded).unwrap(), json!("loop_guard_exceeded"));
    }
}
