use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::{Method, StatusCode},
    routing::{get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use anonimku_shared::models::{
    ActiveMatch, Match, Message, RevealRequest, RevealResponse, User,
};
use anonimku_shared::types::{MatchId, RevealRequestId, UserId};

use crate::config::ServerConfig;
use crate::error::ServerError;
use crate::service::Matchmaker;
use crate::ws;

#[derive(Clone)]
pub struct AppState {
    pub matchmaker: Matchmaker,
    pub config: Arc<ServerConfig>,
}

pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::OPTIONS])
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_check))
        .route("/info", get(server_info))
        .route("/users", post(sign_in))
        .route("/users/:id", get(get_user))
        .route("/users/:id/online", put(set_online))
        .route("/users/:id/find-match", post(find_match))
        .route("/users/:id/active-match", get(active_match))
        .route("/users/:id/reveal-requests", get(pending_reveals))
        .route("/matches/:id/messages", get(list_messages).post(send_message))
        .route("/matches/:id/messages/read", post(mark_read))
        .route("/matches/:id/reveal-requests", post(request_reveal))
        .route("/matches/:id/end", post(end_match))
        .route("/reveal-requests/:id/respond", post(respond_to_reveal))
        .route("/ws", get(ws::ws_upgrade))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Run a store-backed operation on the blocking pool.
async fn blocking<T, F>(state: &AppState, op: F) -> Result<T, ServerError>
where
    T: Send + 'static,
    F: FnOnce(&Matchmaker) -> Result<T, ServerError> + Send + 'static,
{
    let matchmaker = state.matchmaker.clone();
    tokio::task::spawn_blocking(move || op(&matchmaker))
        .await
        .map_err(|e| ServerError::Internal(format!("blocking task failed: {e}")))?
}

fn parse_id<T>(raw: &str, parse: fn(&str) -> Result<T, uuid::Error>) -> Result<T, ServerError> {
    parse(raw.trim()).map_err(|e| ServerError::BadRequest(format!("Invalid id '{raw}': {e}")))
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

#[derive(Serialize)]
struct ServerInfoResponse {
    name: String,
    version: &'static str,
    presence_ttl_secs: u64,
    max_message_len: usize,
}

#[derive(Deserialize)]
struct SignInRequest {
    name: String,
    phone: String,
}

#[derive(Deserialize)]
struct OnlineRequest {
    online: bool,
}

#[derive(Serialize)]
struct FindMatchResponse {
    match_id: Option<MatchId>,
}

#[derive(Deserialize)]
struct SendMessageRequest {
    sender_id: UserId,
    content: String,
}

#[derive(Deserialize)]
struct ReadRequest {
    reader_id: UserId,
}

#[derive(Serialize)]
struct ReadResponse {
    updated: usize,
}

#[derive(Deserialize)]
struct RevealRequestBody {
    requester_id: UserId,
    target_id: UserId,
}

#[derive(Deserialize)]
struct RespondRequest {
    responder_id: UserId,
    response: RevealResponse,
}

#[derive(Serialize)]
struct RespondResponse {
    request: RevealRequest,
    /// Present only when the response revealed both profiles.
    #[serde(rename = "match")]
    revealed_match: Option<Match>,
}

async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

async fn server_info(State(state): State<AppState>) -> Json<ServerInfoResponse> {
    Json(ServerInfoResponse {
        name: state.config.instance_name.clone(),
        version: env!("CARGO_PKG_VERSION"),
        presence_ttl_secs: state.config.presence_ttl.as_secs(),
        max_message_len: state.config.max_message_len,
    })
}

async fn sign_in(
    State(state): State<AppState>,
    Json(req): Json<SignInRequest>,
) -> Result<Json<User>, ServerError> {
    let user = blocking(&state, move |mm| mm.sign_in(&req.name, &req.phone)).await?;
    info!(user = %user.id, "User signed in");
    Ok(Json(user))
}

async fn get_user(
    State(state): State<AppState>,
    Path(raw): Path<String>,
) -> Result<Json<User>, ServerError> {
    let id = parse_id(&raw, UserId::parse)?;
    Ok(Json(blocking(&state, move |mm| mm.get_user(id)).await?))
}

async fn set_online(
    State(state): State<AppState>,
    Path(raw): Path<String>,
    Json(req): Json<OnlineRequest>,
) -> Result<Json<User>, ServerError> {
    let id = parse_id(&raw, UserId::parse)?;
    Ok(Json(
        blocking(&state, move |mm| mm.set_online_status(id, req.online)).await?,
    ))
}

async fn find_match(
    State(state): State<AppState>,
    Path(raw): Path<String>,
) -> Result<Json<FindMatchResponse>, ServerError> {
    let id = parse_id(&raw, UserId::parse)?;
    let match_id = blocking(&state, move |mm| mm.find_match(id)).await?;
    Ok(Json(FindMatchResponse { match_id }))
}

async fn active_match(
    State(state): State<AppState>,
    Path(raw): Path<String>,
) -> Result<Json<ActiveMatch>, ServerError> {
    let id = parse_id(&raw, UserId::parse)?;
    Ok(Json(blocking(&state, move |mm| mm.get_active_match(id)).await?))
}

async fn pending_reveals(
    State(state): State<AppState>,
    Path(raw): Path<String>,
) -> Result<Json<Vec<RevealRequest>>, ServerError> {
    let id = parse_id(&raw, UserId::parse)?;
    Ok(Json(
        blocking(&state, move |mm| mm.list_pending_reveal_requests(id)).await?,
    ))
}

async fn list_messages(
    State(state): State<AppState>,
    Path(raw): Path<String>,
) -> Result<Json<Vec<Message>>, ServerError> {
    let id = parse_id(&raw, MatchId::parse)?;
    Ok(Json(blocking(&state, move |mm| mm.list_messages(id)).await?))
}

async fn send_message(
    State(state): State<AppState>,
    Path(raw): Path<String>,
    Json(req): Json<SendMessageRequest>,
) -> Result<(StatusCode, Json<Message>), ServerError> {
    let id = parse_id(&raw, MatchId::parse)?;
    let message =
        blocking(&state, move |mm| mm.send_message(id, req.sender_id, &req.content)).await?;
    Ok((StatusCode::CREATED, Json(message)))
}

async fn mark_read(
    State(state): State<AppState>,
    Path(raw): Path<String>,
    Json(req): Json<ReadRequest>,
) -> Result<Json<ReadResponse>, ServerError> {
    let id = parse_id(&raw, MatchId::parse)?;
    let updated = blocking(&state, move |mm| mm.mark_messages_read(id, req.reader_id)).await?;
    Ok(Json(ReadResponse { updated }))
}

async fn request_reveal(
    State(state): State<AppState>,
    Path(raw): Path<String>,
    Json(req): Json<RevealRequestBody>,
) -> Result<(StatusCode, Json<RevealRequest>), ServerError> {
    let id = parse_id(&raw, MatchId::parse)?;
    let request = blocking(&state, move |mm| {
        mm.request_reveal(id, req.requester_id, req.target_id)
    })
    .await?;
    Ok((StatusCode::CREATED, Json(request)))
}

async fn respond_to_reveal(
    State(state): State<AppState>,
    Path(raw): Path<String>,
    Json(req): Json<RespondRequest>,
) -> Result<Json<RespondResponse>, ServerError> {
    let id = parse_id(&raw, RevealRequestId::parse)?;
    let resolution = blocking(&state, move |mm| {
        mm.respond_to_reveal(id, req.responder_id, req.response)
    })
    .await?;
    Ok(Json(RespondResponse {
        request: resolution.request,
        revealed_match: resolution.revealed_match,
    }))
}

async fn end_match(
    State(state): State<AppState>,
    Path(raw): Path<String>,
) -> Result<Json<Match>, ServerError> {
    let id = parse_id(&raw, MatchId::parse)?;
    Ok(Json(blocking(&state, move |mm| mm.end_match(id)).await?))
}

pub async fn serve(state: AppState, addr: std::net::SocketAddr) -> anyhow::Result<()> {
    let app = build_router(state);

    info!(addr = %addr, "Starting HTTP API server");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<std::net::SocketAddr>(),
    )
    .await?;

    Ok(())
}
