use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use democrud_api::{ApiError, CreateUserRequest, StatusBody};
use democrud_storage::{NewUser, User};
use serde_json::json;

use crate::server::AppState;
use crate::users::UserServiceError;

/// Name reported by the root endpoint.
pub const SERVICE_NAME: &str = "demo-crud";

impl From<UserServiceError> for ApiError {
    fn from(err: UserServiceError) -> Self {
        ApiError::internal(err.to_string())
    }
}

pub async fn root() -> impl IntoResponse {
    let body = StatusBody {
        status: "ok".into(),
        service: Some(SERVICE_NAME.into()),
    };
    (StatusCode::OK, Json(body))
}

pub async fn healthz() -> impl IntoResponse {
    let body = StatusBody {
        status: "ok".into(),
        service: None,
    };
    (StatusCode::OK, Json(body))
}

pub async fn readyz(State(state): State<AppState>) -> Response {
    let readiness = state.users.readiness().await;
    if readiness.is_ready() {
        let body = json!({
            "status": "ready",
            "store": readiness.store,
            "cache": readiness.cache,
        });
        (StatusCode::OK, Json(body)).into_response()
    } else {
        tracing::warn!(?readiness, "readiness check failed");
        let body = json!({
            "status": "not_ready",
            "store": readiness.store,
            "cache": readiness.cache,
        });
        (StatusCode::SERVICE_UNAVAILABLE, Json(body)).into_response()
    }
}

pub async fn create_user(
    State(state): State<AppState>,
    payload: Result<Json<CreateUserRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<User>), ApiError> {
    let Json(request) = payload.map_err(rejection_to_api_error)?;
    let (name, email) = request.validate()?;

    let user = state.users.create_user(NewUser::new(name, email)).await?;
    Ok((StatusCode::CREATED, Json(user)))
}

fn rejection_to_api_error(rejection: JsonRejection) -> ApiError {
    match rejection.status() {
        StatusCode::PAYLOAD_TOO_LARGE => ApiError::payload_too_large(rejection.body_text()),
        _ => ApiError::bad_request(rejection.body_text()),
    }
}

pub async fn list_users(State(state): State<AppState>) -> Result<Json<Vec<User>>, ApiError> {
    let users = state.users.list_users().await?;
    Ok(Json(users))
}

/// Always fails; exercises the error path end to end.
pub async fn forced_error() -> ApiError {
    tracing::error!("forced error requested");
    ApiError::internal("Forced error!")
}
