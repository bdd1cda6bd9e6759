//! REST surface of the gateway.
//!
//! Every CRUD route is a single unary call to the auth service. `POST
//! /users/email` validates the paging parameters, answers `202 Accepted`, and
//! runs the [`QueryOrchestrator`] in the background as one of the tracked
//! [`QueryRuns`].

use crate::config::GatewayConfig;
use crate::error::ApiError;
use crate::orchestrator::{QueryOrchestrator, QueryRuns};
use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
};
use serde_json::{Value, json};
use std::sync::Arc;
use tonic::transport::Channel;
use tower_http::trace::TraceLayer;
use userhub_core::{
    pagination::PageCursor,
    proto::{
        CreateUserDto, Empty, FindOneUserDto, UpdateUserDto, User, Users,
        users_service_client::UsersServiceClient,
    },
};

#[derive(Clone)]
pub struct AppState {
    client: UsersServiceClient<Channel>,
    config: Arc<GatewayConfig>,
    runs: QueryRuns,
}

impl AppState {
    pub fn new(client: UsersServiceClient<Channel>, config: GatewayConfig) -> Self {
        Self {
            client,
            config: Arc::new(config),
            runs: QueryRuns::new(),
        }
    }

    pub fn runs(&self) -> &QueryRuns {
        &self.runs
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/users", post(create_user).get(find_all_users))
        .route("/users/email", post(email_users))
        .route(
            "/users/{id}",
            get(find_one_user).patch(update_user).delete(remove_user),
        )
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

async fn create_user(
    State(mut state): State<AppState>,
    Json(dto): Json<CreateUserDto>,
) -> Result<(StatusCode, Json<User>), ApiError> {
    let user = state.client.create_user(dto).await?.into_inner();
    Ok((StatusCode::CREATED, Json(user)))
}

async fn find_all_users(State(mut state): State<AppState>) -> Result<Json<Users>, ApiError> {
    Ok(Json(state.client.find_all_users(Empty {}).await?.into_inner()))
}

async fn find_one_user(
    State(mut state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<User>, ApiError> {
    let user = state
        .client
        .find_one_user(FindOneUserDto { id })
        .await?
        .into_inner();
    Ok(Json(user))
}

async fn update_user(
    State(mut state): State<AppState>,
    Path(id): Path<String>,
    Json(dto): Json<UpdateUserDto>,
) -> Result<Json<User>, ApiError> {
    // The path wins over any id in the body.
    let dto = UpdateUserDto { id, ..dto };
    Ok(Json(state.client.update_user(dto).await?.into_inner()))
}

async fn remove_user(
    State(mut state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<User>, ApiError> {
    let user = state
        .client
        .remove_user(FindOneUserDto { id })
        .await?
        .into_inner();
    Ok(Json(user))
}

async fn email_users(State(state): State<AppState>) -> Result<(StatusCode, Json<Value>), ApiError> {
    let total_users = state.config.total_users;
    let page_size = state.config.page_size;
    let cursor = PageCursor::new(total_users, page_size)?;

    let orchestrator = QueryOrchestrator::new(state.client, state.config.session_timeout);
    state.runs.spawn(orchestrator, total_users, page_size)?;

    Ok((
        StatusCode::ACCEPTED,
        Json(json!({
            "pages": cursor.total_pages(),
            "pageSize": page_size,
            "totalUsers": total_users,
        })),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{Body, to_bytes};
    use axum::http::Request;
    use core::time::Duration;
    use tonic::transport::Endpoint;
    use tower::ServiceExt;

    fn state(total_users: usize, page_size: u32) -> AppState {
        // Nothing listens on port 1, so every upstream call fails fast.
        let channel = Endpoint::from_static("http://127.0.0.1:1").connect_lazy();
        let config = GatewayConfig {
            listen_addr: "127.0.0.1:0".to_string(),
            auth_addr: "http://127.0.0.1:1".to_string(),
            total_users,
            page_size,
            session_timeout: Duration::from_secs(1),
            shutdown_timeout: Duration::from_secs(1),
        };
        AppState::new(UsersServiceClient::new(channel), config)
    }

    fn app(total_users: usize, page_size: u32) -> Router {
        router(state(total_users, page_size))
    }

    fn email_request() -> Request<Body> {
        Request::post("/users/email").body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn email_accepts_and_reports_page_count() {
        let response = app(500, 50).oneshot(email_request()).await.unwrap();
        assert_eq!(response.status(), StatusCode::ACCEPTED);

        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(body["pages"], 10);
        assert_eq!(body["pageSize"], 50);
        assert_eq!(body["totalUsers"], 500);
    }

    #[tokio::test]
    async fn email_runs_are_tracked_until_shutdown() {
        let state = state(20, 5);
        let response = router(state.clone())
            .oneshot(email_request())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::ACCEPTED);

        state.runs().shutdown(Duration::from_secs(5)).await;
        assert_eq!(state.runs().len(), 0);

        let response = router(state).oneshot(email_request()).await.unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn unreachable_auth_service_is_a_server_error() {
        let response = app(10, 4)
            .oneshot(Request::get("/users").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert!(response.status().is_server_error());

        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: Value = serde_json::from_slice(&body).unwrap();
        assert!(body["statusCode"].as_u64().is_some());
    }

    #[tokio::test]
    async fn unknown_route_is_not_found() {
        let response = app(10, 4)
            .oneshot(Request::get("/accounts").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
