use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, post, put},
    Json, Router,
};
use parking_lot::RwLock;
use serde::Serialize;
use std::{collections::HashMap, sync::Arc};
use uuid::Uuid;

use crate::{
    gemini::{sniff_mime, strip_data_url, DesignEngine, GeminiError},
    leads::LeadBook,
    models::{
        b64_preview, Catalog, ContactInfo, EditRequest, Lead, SetBudgetRequest, SetImageRequest,
        ToggleStyleRequest,
    },
    pdf::design_dossier,
    session::{
        CallOutcome, DesignSession, GenerationStart, GenerationTicket, SessionError, SessionView,
        Settled,
    },
};

#[derive(Clone)]
pub struct AppState {
    pub sessions: Arc<RwLock<HashMap<Uuid, DesignSession>>>,
    pub engine: Arc<dyn DesignEngine>,
    pub leads: LeadBook,
}

impl AppState {
    pub fn new(engine: Arc<dyn DesignEngine>, leads: LeadBook) -> Self {
        Self {
            sessions: Arc::default(),
            engine,
            leads,
        }
    }
}

/// A rejected request: HTTP status plus the user-facing message.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self { status, message: message.into() }
    }
}

fn session_not_found() -> ApiError {
    ApiError::new(StatusCode::NOT_FOUND, "Không tìm thấy phiên thiết kế.")
}

impl From<SessionError> for ApiError {
    fn from(err: SessionError) -> Self {
        let status = match &err {
            SessionError::InvalidCandidate => StatusCode::NOT_FOUND,
            SessionError::CallInFlight
            | SessionError::GateOpen
            | SessionError::NoPendingRequest
            | SessionError::NotEditing
            | SessionError::SessionClosed => StatusCode::CONFLICT,
            _ => StatusCode::BAD_REQUEST,
        };
        ApiError::new(status, err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(serde_json::json!({ "error": self.message }))).into_response()
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/catalog", get(catalog))
        .route("/api/session", post(create_session))
        .route("/api/session/:id", get(get_session))
        .route("/api/session/:id/image", put(set_image).delete(clear_image))
        .route("/api/session/:id/style", post(toggle_style))
        .route("/api/session/:id/budget", put(set_budget))
        .route("/api/session/:id/generate", post(generate))
        .route("/api/session/:id/contact", post(submit_contact))
        .route("/api/session/:id/gate", delete(dismiss_gate))
        .route("/api/session/:id/candidate/:index", post(select_candidate))
        .route("/api/session/:id/editor", delete(close_editor))
        .route("/api/session/:id/edit", post(edit_candidate))
        .route("/api/session/:id/submit", post(submit_lead))
        .route("/api/session/:id/reset", post(reset_session))
        .route("/api/session/:id/error", delete(dismiss_error))
        .route("/api/leads", get(list_leads))
        .route("/api/leads/:id", get(get_lead))
        .route("/api/leads/:id/pdf", get(lead_dossier))
        .with_state(state)
}

fn view_of(state: &AppState, id: Uuid) -> Result<Json<SessionView>, ApiError> {
    let guard = state.sessions.read();
    let session = guard.get(&id).ok_or_else(session_not_found)?;
    Ok(Json(session.view()))
}

pub async fn catalog() -> Json<Catalog> {
    Json(Catalog::current())
}

pub async fn create_session(State(state): State<AppState>) -> Json<SessionView> {
    let session = DesignSession::new();
    let view = session.view();
    state.sessions.write().insert(session.id(), session);
    tracing::info!("🚀 Design session {} opened", view.id);
    Json(view)
}

pub async fn get_session(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
) -> Result<Json<SessionView>, ApiError> {
    view_of(&state, id)
}

pub async fn set_image(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
    Json(body): Json<SetImageRequest>,
) -> Result<Json<SessionView>, ApiError> {
    if sniff_mime(&body.image_base64).is_none() {
        return Err(SessionError::UnsupportedImage.into());
    }
    let image = strip_data_url(&body.image_base64).to_string();
    let preview = b64_preview(&image);

    let mut guard = state.sessions.write();
    let session = guard.get_mut(&id).ok_or_else(session_not_found)?;
    session.set_image(image)?;
    tracing::info!("🖼️ Session {} photo set: {}", id, preview);
    Ok(Json(session.view()))
}

pub async fn clear_image(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
) -> Result<Json<SessionView>, ApiError> {
    let mut guard = state.sessions.write();
    let session = guard.get_mut(&id).ok_or_else(session_not_found)?;
    session.clear_image()?;
    Ok(Json(session.view()))
}

pub async fn toggle_style(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
    Json(body): Json<ToggleStyleRequest>,
) -> Result<Json<SessionView>, ApiError> {
    let mut guard = state.sessions.write();
    let session = guard.get_mut(&id).ok_or_else(session_not_found)?;
    session.toggle_style(body.style)?;
    Ok(Json(session.view()))
}

pub async fn set_budget(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
    Json(body): Json<SetBudgetRequest>,
) -> Result<Json<SessionView>, ApiError> {
    let mut guard = state.sessions.write();
    let session = guard.get_mut(&id).ok_or_else(session_not_found)?;
    session.set_budget(body.budget)?;
    Ok(Json(session.view()))
}

/// Run the engine for a launched generation and settle the result. The
/// session lock is never held across the engine call.
async fn run_generation(state: &AppState, id: Uuid, ticket: GenerationTicket) {
    tracing::info!(
        "🚀 Generating candidates for session {} ({} styles, budget {})",
        id,
        ticket.request.styles.len(),
        ticket.request.budget
    );
    let outcome = match state.engine.generate(&ticket.request).await {
        Ok(candidates) => CallOutcome::Produced(candidates),
        Err(GeminiError::Http(e)) => {
            tracing::error!("❌ Engine unreachable for session {}: {}", id, e);
            CallOutcome::Unreachable
        }
        Err(e) => {
            tracing::error!("❌ Engine refused generation for session {}: {}", id, e);
            CallOutcome::Refused
        }
    };

    let mut guard = state.sessions.write();
    if let Some(session) = guard.get_mut(&id) {
        match session.complete_generation(&ticket, outcome) {
            Settled::Applied => tracing::info!(
                "✅ Session {} now holds {} candidates",
                id,
                session.candidates().len()
            ),
            Settled::RolledBack(msg) => {
                tracing::info!("🔄 Session {} generation rolled back: {}", id, msg)
            }
            Settled::Stale => tracing::info!("⚠️ Session {} discarded a stale generation", id),
        }
    }
}

pub async fn generate(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
) -> Result<Json<SessionView>, ApiError> {
    let start = {
        let mut guard = state.sessions.write();
        let session = guard.get_mut(&id).ok_or_else(session_not_found)?;
        session.request_generation()?
    };

    let ticket = match start {
        GenerationStart::ContactRequired => {
            tracing::info!("🎯 Session {} paused at the contact gate", id);
            return view_of(&state, id);
        }
        GenerationStart::Launched(ticket) => ticket,
    };

    run_generation(&state, id, ticket).await;
    view_of(&state, id)
}

pub async fn submit_contact(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
    Json(contact): Json<ContactInfo>,
) -> Result<Json<SessionView>, ApiError> {
    let ticket = {
        let mut guard = state.sessions.write();
        let session = guard.get_mut(&id).ok_or_else(session_not_found)?;
        session.submit_contact(contact)?
    };
    tracing::info!("✅ Contact captured for session {}", id);

    run_generation(&state, id, ticket).await;
    view_of(&state, id)
}

pub async fn dismiss_gate(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
) -> Result<Json<SessionView>, ApiError> {
    let mut guard = state.sessions.write();
    let session = guard.get_mut(&id).ok_or_else(session_not_found)?;
    session.dismiss_gate()?;
    Ok(Json(session.view()))
}

pub async fn select_candidate(
    Path((id, index)): Path<(Uuid, usize)>,
    State(state): State<AppState>,
) -> Result<Json<SessionView>, ApiError> {
    let mut guard = state.sessions.write();
    let session = guard.get_mut(&id).ok_or_else(session_not_found)?;
    session.select_for_edit(index)?;
    Ok(Json(session.view()))
}

pub async fn close_editor(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
) -> Result<Json<SessionView>, ApiError> {
    let mut guard = state.sessions.write();
    let session = guard.get_mut(&id).ok_or_else(session_not_found)?;
    session.close_editor()?;
    Ok(Json(session.view()))
}

#[axum::debug_handler]
pub async fn edit_candidate(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
    Json(body): Json<EditRequest>,
) -> Result<Json<SessionView>, ApiError> {
    // First, reserve the edit and snapshot what the engine needs
    let ticket = {
        let mut guard = state.sessions.write();
        let session = guard.get_mut(&id).ok_or_else(session_not_found)?;
        session.begin_edit(&body.instruction)?
    };
    tracing::info!("🚀 Editing candidate {} of session {}", ticket.index, id);

    // Run the engine outside the lock
    let outcome = match state.engine.edit(&ticket.source, &ticket.instruction).await {
        Ok(Some(image_data)) => CallOutcome::Produced(image_data),
        Ok(None) => {
            tracing::error!("❌ Engine returned no image for session {} edit", id);
            CallOutcome::Refused
        }
        Err(GeminiError::Http(e)) => {
            tracing::error!("❌ Engine unreachable for session {} edit: {}", id, e);
            CallOutcome::Unreachable
        }
        Err(e) => {
            tracing::error!("❌ Engine refused edit for session {}: {}", id, e);
            CallOutcome::Refused
        }
    };

    // Settle against the session
    {
        let mut guard = state.sessions.write();
        if let Some(session) = guard.get_mut(&id) {
            match session.complete_edit(&ticket, outcome) {
                Settled::Applied => {
                    tracing::info!("✅ Candidate {} of session {} replaced", ticket.index, id)
                }
                Settled::RolledBack(msg) => {
                    tracing::info!("🔄 Session {} edit rolled back: {}", id, msg)
                }
                Settled::Stale => tracing::info!("⚠️ Session {} discarded a stale edit", id),
            }
        }
    }

    view_of(&state, id)
}

#[derive(Debug, Serialize)]
pub struct SubmitResponse {
    pub lead_id: Uuid,
    pub session: SessionView,
}

pub async fn submit_lead(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
) -> Result<Json<SubmitResponse>, ApiError> {
    let (lead, session) = {
        let mut guard = state.sessions.write();
        let session = guard.get_mut(&id).ok_or_else(session_not_found)?;
        let lead = session.finalize()?;
        (lead, session.view())
    };
    tracing::info!("🚀 Lead {} captured from session {}", lead.id, id);

    let lead_id = lead.id;
    state.leads.record(lead);
    Ok(Json(SubmitResponse { lead_id, session }))
}

pub async fn reset_session(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
) -> Result<Json<SessionView>, ApiError> {
    let mut guard = state.sessions.write();
    let session = guard.get_mut(&id).ok_or_else(session_not_found)?;
    session.reset();
    tracing::info!("🔄 Session {} reset", id);
    Ok(Json(session.view()))
}

pub async fn dismiss_error(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
) -> Result<Json<SessionView>, ApiError> {
    let mut guard = state.sessions.write();
    let session = guard.get_mut(&id).ok_or_else(session_not_found)?;
    session.dismiss_error();
    Ok(Json(session.view()))
}

pub async fn list_leads(State(state): State<AppState>) -> Json<Vec<Lead>> {
    Json(state.leads.list())
}

pub async fn get_lead(Path(id): Path<Uuid>, State(state): State<AppState>) -> Response {
    if let Some(lead) = state.leads.get(&id) {
        Json(lead).into_response()
    } else {
        StatusCode::NOT_FOUND.into_response()
    }
}

pub async fn lead_dossier(Path(id): Path<Uuid>, State(state): State<AppState>) -> Response {
    if let Some(lead) = state.leads.get(&id) {
        let pdf_bytes = design_dossier(&lead);
        let mut headers = axum::http::HeaderMap::new();
        headers.insert(axum::http::header::CONTENT_TYPE, "application/pdf".parse().unwrap());
        headers.insert(
            axum::http::header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"lead_{}.pdf\"", id).parse().unwrap(),
        );
        return (StatusCode::OK, headers, bytes::Bytes::from(pdf_bytes)).into_response();
    }
    StatusCode::NOT_FOUND.into_response()
}
