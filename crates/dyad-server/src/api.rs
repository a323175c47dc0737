//! HTTP surface: registration/login, the pull-based fetch endpoints that are
//! the clients' ground truth, and the WebSocket upgrade into the realtime
//! core.

use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query, State},
    http::{Method, StatusCode},
    middleware,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use dyad_shared::{ConversationId, ConversationView, MessageView, UserView};
use dyad_store::{Database, User};

use crate::auth::{self, AuthUser, TokenService};
use crate::config::ServerConfig;
use crate::error::ServerError;
use crate::realtime;
use crate::registry::ConnectionRegistry;
use crate::rooms::RoomMultiplexer;
use crate::views;

/// The store handle shared between HTTP handlers and the realtime core.
pub type SharedDb = Arc<tokio::sync::Mutex<Database>>;

#[derive(Clone)]
pub struct AppState {
    pub db: SharedDb,
    pub tokens: TokenService,
    pub registry: Arc<ConnectionRegistry>,
    pub rooms: Arc<RoomMultiplexer>,
    pub config: Arc<ServerConfig>,
}

pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any);

    let authed = Router::new()
        .route("/api/conversations", get(list_conversations))
        .route("/api/conversations/:id/messages", get(get_messages))
        .route("/api/users/search", get(search_users))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_auth,
        ));

    Router::new()
        .route("/health", get(health_check))
        .route("/api/auth/register", post(register))
        .route("/api/auth/login", post(login))
        .route("/ws", get(realtime::ws_handler))
        .merge(authed)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

#[derive(Deserialize)]
struct RegisterRequest {
    username: String,
    email: String,
    password: String,
}

#[derive(Deserialize)]
struct LoginRequest {
    email: String,
    password: String,
}

/// Returned by both register and login.
#[derive(Serialize)]
struct AuthResponse {
    user: UserView,
    token: String,
}

#[derive(Deserialize)]
struct SearchQuery {
    #[serde(default)]
    q: String,
}

/// How many users a search may return.
const SEARCH_LIMIT: u32 = 10;

async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<AuthResponse>), ServerError> {
    let username = req.username.trim();
    let email = req.email.trim();
    if username.is_empty() || email.is_empty() || req.password.is_empty() {
        return Err(ServerError::BadRequest(
            "username, email and password are required".to_string(),
        ));
    }

    let password_hash = auth::hash_password(&req.password)?;
    let user = User::new(username.to_string(), email.to_string(), password_hash);

    {
        let db = state.db.lock().await;
        if db.username_or_email_taken(username, email)? {
            return Err(ServerError::Conflict(
                "User with this email or username already exists".to_string(),
            ));
        }
        db.insert_user(&user)?;
    }

    let token = state.tokens.issue(user.id)?;
    info!(user_id = %user.id, username, "user registered");

    Ok((
        StatusCode::CREATED,
        Json(AuthResponse {
            user: user.view(),
            token,
        }),
    ))
}

async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<AuthResponse>, ServerError> {
    let user = {
        let db = state.db.lock().await;
        db.get_user_by_email(req.email.trim())
            .map_err(|_| ServerError::BadRequest("Invalid credentials".to_string()))?
    };

    // Same error for unknown email and wrong password.
    if !auth::verify_password(&req.password, &user.password_hash) {
        return Err(ServerError::BadRequest("Invalid credentials".to_string()));
    }

    let token = state.tokens.issue(user.id)?;
    info!(user_id = %user.id, "user logged in");

    Ok(Json(AuthResponse {
        user: user.view(),
        token,
    }))
}

/// `GET /api/conversations`: the caller's conversations, most recently
/// updated first, with participants, last message, and `otherUser` resolved.
async fn list_conversations(
    State(state): State<AppState>,
    Extension(AuthUser(caller)): Extension<AuthUser>,
) -> Result<Json<Vec<ConversationView>>, ServerError> {
    let db = state.db.lock().await;
    let conversations = db.list_conversations_for_user(caller.id)?;

    let mut payload = Vec::with_capacity(conversations.len());
    for conversation in &conversations {
        payload.push(views::conversation_view(&db, conversation, caller.id)?);
    }
    Ok(Json(payload))
}

/// `GET /api/conversations/:id/messages`: the ordered message log.
///
/// A conversation the caller is not part of and one that does not exist both
/// answer 403, so existence is not leaked.
async fn get_messages(
    State(state): State<AppState>,
    Extension(AuthUser(caller)): Extension<AuthUser>,
    Path(id): Path<String>,
) -> Result<Json<Vec<MessageView>>, ServerError> {
    let conversation_id = ConversationId::from_string(id);

    let db = state.db.lock().await;
    if !db.is_participant(&conversation_id, caller.id)? {
        return Err(ServerError::AccessDenied);
    }

    let messages = db.list_messages(&conversation_id)?;
    let mut payload = Vec::with_capacity(messages.len());
    for message in &messages {
        payload.push(views::message_view(&db, message)?);
    }
    Ok(Json(payload))
}

/// `GET /api/users/search?q=`: up to ten case-insensitive username matches,
/// the caller excluded.  An empty query is an empty result, not an error.
async fn search_users(
    State(state): State<AppState>,
    Extension(AuthUser(caller)): Extension<AuthUser>,
    Query(query): Query<SearchQuery>,
) -> Result<Json<Vec<UserView>>, ServerError> {
    let q = query.q.trim();
    if q.is_empty() {
        return Ok(Json(Vec::new()));
    }

    let db = state.db.lock().await;
    let users = db.search_users(q, caller.id, SEARCH_LIMIT)?;
    Ok(Json(users.iter().map(User::view).collect()))
}

pub async fn serve(state: AppState, addr: std::net::SocketAddr) -> anyhow::Result<()> {
    let app = build_router(state);

    info!(addr = %addr, "Starting HTTP server");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
