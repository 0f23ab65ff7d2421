use crate::{
    auth, catalog,
    config::Config,
    db, friends, list,
    messages::{self, ConversationHub},
    model::{ContentKind, User},
    recommend, users,
};
use anyhow::Result;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::{
    extract::{Extension, Path, Query, State},
    http::{header, HeaderValue, Method, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use futures::{SinkExt, StreamExt};
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use time::Duration;
use uuid::Uuid;

const TOKEN_VALIDITY: Duration = Duration::hours(24);

#[derive(Clone)]
pub struct AppState {
    pub pool: Pool<SqliteConnectionManager>,
    pub hub: Arc<ConversationHub>,
    pub http: reqwest::Client,
    pub config: Config,
    pub jwt_secret: Vec<u8>,
    pub login_limiter: auth::LoginRateLimiter,
}

impl AppState {
    pub async fn new(config: Config) -> Result<Self> {
        tokio::fs::create_dir_all(&config.data_dir).await?;
        let manager = SqliteConnectionManager::file(config.data_dir.join("fiction_folder.db"));
        let pool = Pool::new(manager)?;
        db::migrate(&*pool.get()?)?;

        // session-signing secret survives restarts
        let secret_file = config.data_dir.join("jwt.secret");
        let jwt_secret = match tokio::fs::read(&secret_file).await {
            Ok(bytes) if bytes.len() == 32 => bytes,
            _ => {
                use rand::RngCore;
                let mut secret = vec![0u8; 32];
                rand::thread_rng().fill_bytes(&mut secret);
                tokio::fs::write(&secret_file, &secret).await?;
                secret
            }
        };

        Ok(Self {
            pool,
            hub: Arc::new(ConversationHub::new()),
            http: reqwest::Client::new(),
            config,
            jwt_secret,
            login_limiter: auth::LoginRateLimiter::new(5, std::time::Duration::from_secs(60)),
        })
    }
}

/// Build the HTTP application router.
pub fn build_router(state: AppState) -> Router {
    let protected = Router::new()
        .route("/api/me", get(me))
        .route("/api/users/search", get(search_users))
        .route(
            "/api/friends/requests",
            get(list_friend_requests).post(send_friend_request),
        )
        .route("/api/friends/requests/:id/accept", post(accept_friend_request))
        .route("/api/friends/requests/:id/decline", post(decline_friend_request))
        .route("/api/friends", get(list_friends))
        .route("/api/friends/:friend_id", delete(remove_friend))
        .route("/api/recommendations", get(recommendations))
        .route("/api/list", get(get_list).post(rate_item))
        .route(
            "/api/messages/:friend_id",
            get(conversation_messages).post(post_message),
        )
        .route("/ws/messages/:friend_id", get(ws_messages))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));
    Router::new()
        .route("/api/health", get(health))
        .route("/api/config/firebase", get(client_config))
        .route("/api/films", get(films_search))
        .route("/api/films/:imdb_id", get(film_detail))
        .route("/api/catalog", get(catalog_search))
        .route("/api/catalog/manga/:id", get(manga_detail))
        .route("/api/catalog/shows/:id", get(show_detail))
        .route("/api/signup", post(signup))
        .route("/api/login", post(login))
        .merge(protected)
        .layer(middleware::from_fn_with_state(
            state.clone(),
            cors_middleware,
        ))
        .with_state(state)
}

async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok", "message": "Server is running" }))
}

async fn client_config(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.config.client.clone())
}

/// Single-origin CORS, mirrored on every response.
async fn cors_middleware<B>(
    State(state): State<AppState>,
    req: axum::http::Request<B>,
    next: Next<B>,
) -> Response {
    let origin = HeaderValue::from_str(&state.config.frontend_origin)
        .unwrap_or_else(|_| HeaderValue::from_static("null"));
    let mut resp = if req.method() == Method::OPTIONS {
        StatusCode::NO_CONTENT.into_response()
    } else {
        next.run(req).await
    };
    let headers = resp.headers_mut();
    headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, origin);
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static("GET, POST, DELETE, OPTIONS"),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static("authorization, content-type"),
    );
    resp
}

async fn auth_middleware<B>(
    State(state): State<AppState>,
    mut req: axum::http::Request<B>,
    next: Next<B>,
) -> Result<Response, StatusCode> {
    if let Some(value) = req.headers().get(header::AUTHORIZATION) {
        if let Ok(value) = value.to_str() {
            if let Some(token) = value.strip_prefix("Bearer ") {
                if let Ok(claims) = auth::verify_jwt(&state.jwt_secret, token) {
                    req.extensions_mut().insert(claims);
                    return Ok(next.run(req).await);
                }
            }
        }
    }
    Err(StatusCode::UNAUTHORIZED)
}

#[derive(Serialize)]
struct ErrorResp {
    error: String,
}

type ApiError = (StatusCode, Json<ErrorResp>);

fn err(status: StatusCode, msg: &str) -> ApiError {
    (status, Json(ErrorResp { error: msg.into() }))
}

/// Map module-level error codes onto HTTP statuses.
fn map_err(e: anyhow::Error) -> ApiError {
    let msg = e.to_string();
    let status = match msg.as_str() {
        "not_found" | "missing_profile" => StatusCode::NOT_FOUND,
        "duplicate_user" => StatusCode::CONFLICT,
        "empty_message" | "empty_search" | "invalid_rating" | "invalid_entry"
        | "self_request" | "invalid_username" | "invalid_email" | "weak_password" => {
            StatusCode::BAD_REQUEST
        }
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    err(status, &msg)
}

fn conn(state: &AppState) -> Result<PooledConnection<SqliteConnectionManager>, ApiError> {
    state
        .pool
        .get()
        .map_err(|_| err(StatusCode::INTERNAL_SERVER_ERROR, "db_unavailable"))
}

#[derive(Deserialize)]
struct SignupReq {
    username: String,
    email: String,
    password: String,
}

#[derive(Serialize)]
struct SessionResp {
    token: String,
    user: User,
}

async fn signup(
    State(state): State<AppState>,
    Json(req): Json<SignupReq>,
) -> Result<impl IntoResponse, ApiError> {
    if req.password.len() < 8 {
        return Err(err(StatusCode::BAD_REQUEST, "weak_password"));
    }
    let hash = auth::hash_password(&req.password)
        .map_err(|_| err(StatusCode::INTERNAL_SERVER_ERROR, "hash"))?;
    let user = {
        let conn = conn(&state)?;
        users::create_user(&conn, &req.username, &req.email, &hash).map_err(map_err)?
    };
    let token = auth::issue_jwt(&state.jwt_secret, &user.id, TOKEN_VALIDITY)
        .map_err(|_| err(StatusCode::INTERNAL_SERVER_ERROR, "token"))?;
    tracing::info!(username = %user.username, "user signed up");
    Ok((StatusCode::CREATED, Json(SessionResp { token, user })))
}

#[derive(Deserialize)]
struct LoginReq {
    email: String,
    password: String,
}

async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginReq>,
) -> Result<impl IntoResponse, ApiError> {
    if !state.login_limiter.check(&req.email).await {
        return Err(err(StatusCode::TOO_MANY_REQUESTS, "rate_limited"));
    }
    let found = {
        let conn = conn(&state)?;
        users::find_by_email(&conn, req.email.trim()).map_err(map_err)?
    };
    let Some((user, hash)) = found else {
        return Err(err(StatusCode::UNAUTHORIZED, "invalid_credentials"));
    };
    if !auth::verify_password(&req.password, &hash) {
        return Err(err(StatusCode::UNAUTHORIZED, "invalid_credentials"));
    }
    let token = auth::issue_jwt(&state.jwt_secret, &user.id, TOKEN_VALIDITY)
        .map_err(|_| err(StatusCode::INTERNAL_SERVER_ERROR, "token"))?;
    Ok(Json(SessionResp { token, user }))
}

async fn me(
    State(state): State<AppState>,
    Extension(claims): Extension<auth::Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let conn = conn(&state)?;
    let user = users::get_user(&conn, &claims.sub)
        .map_err(map_err)?
        .ok_or_else(|| err(StatusCode::NOT_FOUND, "missing_profile"))?;
    Ok(Json(user))
}

#[derive(Deserialize)]
struct SearchQuery {
    q: String,
}

async fn search_users(
    State(state): State<AppState>,
    Extension(claims): Extension<auth::Claims>,
    Query(query): Query<SearchQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let conn = conn(&state)?;
    let hits = users::search_by_prefix(&conn, &query.q, &claims.sub).map_err(map_err)?;
    Ok(Json(hits))
}

#[derive(Deserialize)]
struct FriendRequestReq {
    to_id: Uuid,
}

async fn send_friend_request(
    State(state): State<AppState>,
    Extension(claims): Extension<auth::Claims>,
    Json(req): Json<FriendRequestReq>,
) -> Result<impl IntoResponse, ApiError> {
    let conn = conn(&state)?;
    let request = friends::send_request(&conn, &claims.sub, &req.to_id).map_err(map_err)?;
    Ok((StatusCode::CREATED, Json(request)))
}

async fn list_friend_requests(
    State(state): State<AppState>,
    Extension(claims): Extension<auth::Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let conn = conn(&state)?;
    let pending = friends::pending_requests_for(&conn, &claims.sub).map_err(map_err)?;
    Ok(Json(pending))
}

async fn accept_friend_request(
    State(state): State<AppState>,
    Extension(claims): Extension<auth::Claims>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let mut conn = conn(&state)?;
    let accepted = friends::accept_request(&mut conn, &id, &claims.sub).map_err(map_err)?;
    Ok(Json(accepted))
}

async fn decline_friend_request(
    State(state): State<AppState>,
    Extension(claims): Extension<auth::Claims>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let conn = conn(&state)?;
    friends::decline_request(&conn, &id, &claims.sub).map_err(map_err)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn list_friends(
    State(state): State<AppState>,
    Extension(claims): Extension<auth::Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let conn = conn(&state)?;
    let friends = friends::friends_of(&conn, &claims.sub).map_err(map_err)?;
    Ok(Json(friends))
}

async fn remove_friend(
    State(state): State<AppState>,
    Extension(claims): Extension<auth::Claims>,
    Path(friend_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let mut conn = conn(&state)?;
    friends::remove_friend(&mut conn, &claims.sub, &friend_id).map_err(map_err)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn recommendations(
    State(state): State<AppState>,
    Extension(claims): Extension<auth::Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let conn = conn(&state)?;
    let recs = recommend::recommendations_for(&conn, &claims.sub).map_err(map_err)?;
    Ok(Json(recs))
}

#[derive(Deserialize)]
struct ListQuery {
    #[serde(default)]
    search: Option<String>,
    #[serde(default)]
    top: Option<usize>,
}

async fn get_list(
    State(state): State<AppState>,
    Extension(claims): Extension<auth::Claims>,
    Query(query): Query<ListQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let conn = conn(&state)?;
    let mut entries = list::entries(&conn, &claims.sub).map_err(map_err)?;
    if let Some(term) = query.search.as_deref() {
        entries = list::filter_entries(&entries, term);
    }
    if let Some(n) = query.top {
        entries = list::top_n(&entries, n);
    }
    Ok(Json(entries))
}

#[derive(Deserialize)]
struct RateReq {
    content_id: String,
    kind: ContentKind,
    title: String,
    #[serde(default)]
    cover: Option<String>,
    rating: u8,
}

async fn rate_item(
    State(state): State<AppState>,
    Extension(claims): Extension<auth::Claims>,
    Json(req): Json<RateReq>,
) -> Result<impl IntoResponse, ApiError> {
    let conn = conn(&state)?;
    let entry = list::rate(
        &conn,
        &claims.sub,
        &req.content_id,
        req.kind,
        &req.title,
        req.cover.as_deref(),
        req.rating,
    )
    .map_err(map_err)?;
    Ok((StatusCode::CREATED, Json(entry)))
}

async fn conversation_messages(
    State(state): State<AppState>,
    Extension(claims): Extension<auth::Claims>,
    Path(friend_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let conn = conn(&state)?;
    let conversation = messages::conversation_id(&claims.sub, &friend_id);
    let msgs = messages::list_messages(&conn, &conversation).map_err(map_err)?;
    Ok(Json(msgs))
}

#[derive(Deserialize)]
struct SendMessageReq {
    text: String,
}

async fn post_message(
    State(state): State<AppState>,
    Extension(claims): Extension<auth::Claims>,
    Path(friend_id): Path<Uuid>,
    Json(req): Json<SendMessageReq>,
) -> Result<impl IntoResponse, ApiError> {
    let msg = {
        let conn = conn(&state)?;
        messages::send_message(&conn, &claims.sub, &friend_id, &req.text).map_err(map_err)?
    };
    state.hub.publish(&msg);
    Ok((StatusCode::CREATED, Json(msg)))
}

/// Live feed for one conversation. Opening a socket for another friend is
/// the subscription switch; the old socket's feed drops with the socket.
async fn ws_messages(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Extension(claims): Extension<auth::Claims>,
    Path(friend_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let conversation = messages::conversation_id(&claims.sub, &friend_id);
    Ok(ws.on_upgrade(move |socket| handle_message_socket(socket, state, conversation)))
}

async fn handle_message_socket(stream: WebSocket, state: AppState, conversation: String) {
    let mut feed = state.hub.subscribe(&conversation);
    let (mut sender, mut receiver) = stream.split();

    // backlog first, then live messages
    let backlog = match state.pool.get() {
        Ok(conn) => messages::list_messages(&conn, &conversation).unwrap_or_default(),
        Err(_) => Vec::new(),
    };
    for msg in backlog {
        if let Ok(text) = serde_json::to_string(&msg) {
            if sender.send(Message::Text(text)).await.is_err() {
                return;
            }
        }
    }

    loop {
        tokio::select! {
            live = feed.recv() => {
                let Some(msg) = live else { break };
                let Ok(text) = serde_json::to_string(&msg) else { continue };
                if sender.send(Message::Text(text)).await.is_err() {
                    break;
                }
            }
            incoming = receiver.next() => {
                match incoming {
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                    _ => {}
                }
            }
        }
    }
}

#[derive(Deserialize)]
struct FilmsQuery {
    #[serde(default)]
    search: Option<String>,
}

async fn films_search(
    State(state): State<AppState>,
    Query(query): Query<FilmsQuery>,
) -> impl IntoResponse {
    let term = query.search.unwrap_or_default();
    if term.is_empty() {
        return Json(json!({ "Response": "False", "Search": [] })).into_response();
    }
    let Some(key) = state.config.omdb_api_key.clone() else {
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "Response": "False", "Error": "missing_api_key" })),
        )
            .into_response();
    };
    match catalog::film_search_raw(&state.http, &key, &term).await {
        Ok(body) => Json(body).into_response(),
        Err(e) => {
            tracing::warn!(error = %e, "omdb search failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "Response": "False", "Error": "upstream_failed" })),
            )
                .into_response()
        }
    }
}

async fn film_detail(
    State(state): State<AppState>,
    Path(imdb_id): Path<String>,
) -> impl IntoResponse {
    let Some(key) = state.config.omdb_api_key.clone() else {
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "Response": "False", "Error": "missing_api_key" })),
        )
            .into_response();
    };
    match catalog::film_detail_raw(&state.http, &key, &imdb_id).await {
        Ok(body) => Json(body).into_response(),
        Err(e) => {
            tracing::warn!(error = %e, "omdb detail failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "Response": "False", "Error": "upstream_failed" })),
            )
                .into_response()
        }
    }
}

async fn catalog_search(
    State(state): State<AppState>,
    Query(query): Query<FilmsQuery>,
) -> impl IntoResponse {
    let term = query.search.unwrap_or_default();
    let results =
        catalog::fetch_all(&state.http, state.config.omdb_api_key.as_deref(), &term).await;
    Json(results)
}

async fn manga_detail(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let media = catalog::manga_detail(&state.http, id)
        .await
        .map_err(map_err)?;
    Ok(Json(media))
}

async fn show_detail(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let detail = catalog::tv_show_detail(&state.http, &id)
        .await
        .map_err(map_err)?;
    Ok(Json(detail))
}

// Integration tests live in tests/ directory
