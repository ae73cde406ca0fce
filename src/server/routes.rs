//! HTTP route handlers for the talk room API.
//!
//! The acting user is always part of the path; there is no session state.

use std::sync::Arc;

use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post, put};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::messaging::core::errors::TalkError;
use crate::messaging::core::ids::{MessageId, UserId};
use crate::messaging::core::message::Message;
use crate::messaging::core::user::User;
use crate::messaging::display::Elapsed;
use crate::messaging::service::TalkRoom;
use crate::messaging::storage::ConversationQuery;

use super::state::AppState;

/// Error response: status plus `{ "error": ... }` body.
pub type ApiError = (StatusCode, Json<Value>);

/// Create the API router with all routes.
#[must_use]
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/api/users", post(sign_up))
        .route("/api/users/{user_id}", get(get_user))
        .route("/api/users/{user_id}/username", put(change_username))
        .route("/api/users/{user_id}/email", put(change_email))
        .route("/api/users/{user_id}/friends", get(friends))
        .route(
            "/api/users/{user_id}/talks/{friend_id}",
            get(talk_room).post(send_message),
        )
        .with_state(state)
}

const fn status_for(err: &TalkError) -> StatusCode {
    match err {
        TalkError::InvalidParticipant { .. }
        | TalkError::InvalidViewer { .. }
        | TalkError::UnknownUser { .. } => StatusCode::NOT_FOUND,
        TalkError::InvalidPageSize { .. } | TalkError::InvalidInput { .. } => {
            StatusCode::BAD_REQUEST
        }
        TalkError::DuplicateUsername { .. } | TalkError::DuplicateEmail { .. } => {
            StatusCode::CONFLICT
        }
        TalkError::InvalidConfig(_) | TalkError::CorruptRecord(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
        TalkError::StorageUnavailable(_) | TalkError::AsyncStorageUnavailable(_) => {
            StatusCode::SERVICE_UNAVAILABLE
        }
    }
}

/// Map a service error to its HTTP response.
#[must_use]
pub fn api_error(err: TalkError) -> ApiError {
    let status = status_for(&err);
    if status.is_server_error() {
        tracing::error!(error = %err, "Request failed");
    }
    rejected(status, err.to_string())
}

fn rejected(status: StatusCode, reason: String) -> ApiError {
    (status, Json(json!({ "error": reason })))
}

fn path_rejection(rejection: PathRejection) -> ApiError {
    rejected(rejection.status(), rejection.body_text())
}

fn query_rejection(rejection: QueryRejection) -> ApiError {
    rejected(rejection.status(), rejection.body_text())
}

fn json_rejection(rejection: JsonRejection) -> ApiError {
    rejected(rejection.status(), rejection.body_text())
}

/// Health check endpoint.
async fn health_check() -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "service": "talk-room",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// Sign-up request.
#[derive(Debug, Deserialize)]
pub struct SignUpRequest {
    /// Requested display name.
    pub username: String,
    /// Email address.
    pub email: String,
}

async fn sign_up(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<SignUpRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<User>), ApiError> {
    let Json(request) = payload.map_err(json_rejection)?;
    let user = state
        .service
        .sign_up(&request.username, &request.email)
        .await
        .map_err(api_error)?;
    Ok((StatusCode::CREATED, Json(user)))
}

async fn get_user(
    State(state): State<Arc<AppState>>,
    path: Result<Path<UserId>, PathRejection>,
) -> Result<Json<User>, ApiError> {
    let Path(user_id) = path.map_err(path_rejection)?;
    state.service.user(user_id).await.map(Json).map_err(api_error)
}

/// Username change request.
#[derive(Debug, Deserialize)]
pub struct UsernameChangeRequest {
    /// New display name.
    pub username: String,
}

async fn change_username(
    State(state): State<Arc<AppState>>,
    path: Result<Path<UserId>, PathRejection>,
    payload: Result<Json<UsernameChangeRequest>, JsonRejection>,
) -> Result<Json<User>, ApiError> {
    let Path(user_id) = path.map_err(path_rejection)?;
    let Json(request) = payload.map_err(json_rejection)?;
    state
        .service
        .change_username(user_id, &request.username)
        .await
        .map(Json)
        .map_err(api_error)
}

/// Email change request.
#[derive(Debug, Deserialize)]
pub struct EmailChangeRequest {
    /// New email address.
    pub email: String,
}

async fn change_email(
    State(state): State<Arc<AppState>>,
    path: Result<Path<UserId>, PathRejection>,
    payload: Result<Json<EmailChangeRequest>, JsonRejection>,
) -> Result<Json<User>, ApiError> {
    let Path(user_id) = path.map_err(path_rejection)?;
    let Json(request) = payload.map_err(json_rejection)?;
    state
        .service
        .change_email(user_id, &request.email)
        .await
        .map(Json)
        .map_err(api_error)
}

/// Friends list query string.
#[derive(Debug, Default, Deserialize)]
pub struct FriendsQuery {
    /// Case-insensitive username filter.
    pub keyword: Option<String>,
    /// 1-indexed page, defaults to 1.
    pub page: Option<u32>,
}

/// One row of the friends list.
#[derive(Debug, Serialize)]
pub struct FriendDto {
    /// The counterpart.
    pub user: User,
    /// Time of the latest message exchanged, if any.
    pub last_message_at: Option<DateTime<Utc>>,
    /// Id of that message.
    pub last_message_id: Option<MessageId>,
    /// Relative label for `last_message_at`.
    pub elapsed: Option<Elapsed>,
}

/// Friends list response.
#[derive(Debug, Serialize)]
pub struct FriendsResponse {
    /// Ranked counterparts on this page.
    pub friends: Vec<FriendDto>,
    /// Page number.
    pub page: u32,
    /// Page size.
    pub page_size: u32,
    /// Matching counterparts across all pages.
    pub total: usize,
    /// Whether another page follows.
    pub has_next: bool,
}

async fn friends(
    State(state): State<Arc<AppState>>,
    path: Result<Path<UserId>, PathRejection>,
    query: Result<Query<FriendsQuery>, QueryRejection>,
) -> Result<Json<FriendsResponse>, ApiError> {
    let Path(user_id) = path.map_err(path_rejection)?;
    let Query(query) = query.map_err(query_rejection)?;
    let page = state
        .service
        .friends(user_id, query.keyword.as_deref(), query.page.unwrap_or(1))
        .await
        .map_err(api_error)?;

    let now = state.service.now();
    let has_next = page.has_next();
    let friends = page
        .friends
        .into_iter()
        .map(|friend| FriendDto {
            elapsed: friend.last_message_at.map(|at| Elapsed::between(at, now)),
            last_message_at: friend.last_message_at,
            last_message_id: friend.last_message_id,
            user: friend.user,
        })
        .collect();

    Ok(Json(FriendsResponse {
        friends,
        page: page.page,
        page_size: page.page_size,
        total: page.total,
        has_next,
    }))
}

/// Talk room query string.
#[derive(Debug, Default, Deserialize)]
pub struct TalkRoomQuery {
    /// Most recent messages to return.
    pub limit: Option<usize>,
    /// Only messages sent strictly before this instant (RFC 3339).
    pub before: Option<DateTime<Utc>>,
}

impl From<TalkRoomQuery> for ConversationQuery {
    fn from(query: TalkRoomQuery) -> Self {
        Self {
            limit: query.limit,
            before: query.before,
        }
    }
}

async fn talk_room(
    State(state): State<Arc<AppState>>,
    path: Result<Path<(UserId, UserId)>, PathRejection>,
    query: Result<Query<TalkRoomQuery>, QueryRejection>,
) -> Result<Json<TalkRoom>, ApiError> {
    let Path((user_id, friend_id)) = path.map_err(path_rejection)?;
    let Query(query) = query.map_err(query_rejection)?;
    state
        .service
        .talk_room(user_id, friend_id, query.into())
        .await
        .map(Json)
        .map_err(api_error)
}

/// Send-message request.
#[derive(Debug, Deserialize)]
pub struct SendMessageRequest {
    /// Message text.
    pub body: String,
}

async fn send_message(
    State(state): State<Arc<AppState>>,
    path: Result<Path<(UserId, UserId)>, PathRejection>,
    payload: Result<Json<SendMessageRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<Message>), ApiError> {
    let Path((user_id, friend_id)) = path.map_err(path_rejection)?;
    let Json(request) = payload.map_err(json_rejection)?;
    let message = state
        .service
        .send_message(user_id, friend_id, &request.body)
        .await
        .map_err(api_error)?;
    Ok((StatusCode::CREATED, Json(message)))
}

#[cfg(test)]
mod tests {
    use axum::body::{Body, to_bytes};
    use axum::http::Request;
    use tower::ServiceExt;

    use super::*;
    use crate::messaging::core::clock::ManualClock;
    use crate::messaging::core::config::{StorageConfig, TalkConfig};
    use crate::messaging::service::{TalkBackends, TalkService};

    async fn app() -> (Router, Arc<ManualClock>) {
        let config = TalkConfig {
            storage: StorageConfig::in_memory(),
            ..TalkConfig::default()
        };
        let clock = Arc::new(ManualClock::from_millis(1_700_000_000_000));
        let backends = TalkBackends::sqlite(&config, clock.clone()).await.unwrap();
        let service = TalkService::new(config, backends).unwrap();
        (create_router(AppState::from_service(service)), clock)
    }

    async fn send(
        app: &Router,
        method: &str,
        uri: &str,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let builder = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    async fn sign_up_user(app: &Router, name: &str) -> String {
        let (status, body) = send(
            app,
            "POST",
            "/api/users",
            Some(json!({ "username": name, "email": format!("{name}@example.com") })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        body["id"].as_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn test_health() {
        let (app, _) = app().await;
        let (status, body) = send(&app, "GET", "/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn test_talk_room_flow() {
        let (app, clock) = app().await;
        let alice = sign_up_user(&app, "alice").await;
        let bob = sign_up_user(&app, "bob").await;

        let (status, message) = send(
            &app,
            "POST",
            &format!("/api/users/{alice}/talks/{bob}"),
            Some(json!({ "body": "hello bob" })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(message["body"], "hello bob");

        let (status, room) = send(&app, "GET", &format!("/api/users/{bob}/talks/{alice}"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(room["friend"]["username"], "alice");
        assert_eq!(room["messages"].as_array().unwrap().len(), 1);

        clock.advance_millis(5 * 60 * 1_000);

        let (status, list) = send(&app, "GET", &format!("/api/users/{bob}/friends?keyword=ALI"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(list["total"], 1);
        assert_eq!(list["friends"][0]["user"]["username"], "alice");
        assert_eq!(list["friends"][0]["elapsed"], "5 minutes ago");
        assert_eq!(list["has_next"], false);
    }

    #[tokio::test]
    async fn test_error_statuses() {
        let (app, _) = app().await;
        let alice = sign_up_user(&app, "alice").await;
        let ghost = UserId::new();

        let (status, body) = send(
            &app,
            "POST",
            &format!("/api/users/{ghost}/talks/{alice}"),
            Some(json!({ "body": "hi" })),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(body["error"].as_str().unwrap().contains("unknown participant"));

        let (status, _) = send(&app, "GET", &format!("/api/users/{ghost}/friends"), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = send(
            &app,
            "POST",
            &format!("/api/users/{alice}/talks/{alice}"),
            Some(json!({ "body": "  " })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = send(
            &app,
            "POST",
            "/api/users",
            Some(json!({ "username": "alice", "email": "again@example.com" })),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn test_profile_changes() {
        let (app, _) = app().await;
        let alice = sign_up_user(&app, "alice").await;

        let (status, user) = send(
            &app,
            "PUT",
            &format!("/api/users/{alice}/username"),
            Some(json!({ "username": "alicia" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(user["username"], "alicia");

        let (status, user) = send(
            &app,
            "PUT",
            &format!("/api/users/{alice}/email"),
            Some(json!({ "email": "alicia@example.com" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(user["email"], "alicia@example.com");

        let (status, user) = send(&app, "GET", &format!("/api/users/{alice}"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(user["username"], "alicia");
    }

    #[tokio::test]
    async fn test_extractor_rejections_are_json() {
        let (app, _) = app().await;
        let alice = sign_up_user(&app, "alice").await;

        let (status, body) = send(&app, "GET", "/api/users/not-a-uuid", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].is_string());

        let (status, body) =
            send(&app, "GET", &format!("/api/users/{alice}/friends?page=abc"), None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].is_string());

        let (status, body) = send(
            &app,
            "GET",
            &format!("/api/users/{alice}/talks/{alice}?before=yesterday"),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].is_string());

        let (status, body) = send(
            &app,
            "POST",
            "/api/users",
            Some(json!({ "username": "bob" })),
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert!(body["error"].is_string());

        let request = Request::builder()
            .method("POST")
            .uri(format!("/api/users/{alice}/talks/{alice}"))
            .header("content-type", "application/json")
            .body(Body::from("{not json"))
            .unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        assert!(body["error"].is_string());
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            status_for(&TalkError::InvalidPageSize { page_size: 0 }),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_for(&TalkError::InvalidViewer { user_id: UserId::new() }),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            status_for(&TalkError::StorageUnavailable(rusqlite::Error::InvalidQuery)),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }
}
