use std::collections::BTreeMap;
use std::time::Duration;

use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{delete, get, post, put};
use axum::{Json, Router};
use mediq_auth::{AuthError, SessionCodec, bearer_token};
use mediq_contracts::{ErrorKind, Role, ServiceError, Session};
use mediq_store::{AccountRecord, Store, seed};
use serde::Serialize;

use crate::config::{ApiConfig, StartupError};

mod appointments;
mod doctors;
mod patients;
mod users;

#[derive(Clone)]
pub struct AppState {
    pub config: ApiConfig,
    codec: SessionCodec,
    store: Store,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

const DEMO_PASSWORD: &str = "Password123!";

pub async fn router(config: ApiConfig) -> Result<Router, StartupError> {
    let store = Store::connect_and_migrate(
        &config.db_url,
        config.db_max_connections,
        Duration::from_millis(config.query_timeout_ms),
    )
    .await
    .map_err(|err| StartupError {
        code: "ERR_DB_UNAVAILABLE",
        message: format!("failed to initialize store: {}", err),
    })?;

    if config.seed_demo_data {
        let hash =
            mediq_auth::password::hash_password(DEMO_PASSWORD).map_err(|err| StartupError {
                code: "ERR_SEED_FAILED",
                message: format!("failed to hash demo password: {}", err),
            })?;
        let seeded = seed::seed_demo_data(&store, &hash)
            .await
            .map_err(|err| StartupError {
                code: "ERR_SEED_FAILED",
                message: format!("failed to seed demo data: {}", err),
            })?;
        if seeded {
            tracing::info!("demo data seeded");
        }
    }

    let codec = SessionCodec::new(
        config.jwt_secret.as_bytes(),
        Duration::from_secs(config.session_ttl_secs),
    );

    let state = AppState {
        config,
        codec,
        store,
    };

    Ok(Router::new()
        .route("/api/health/ping", get(ping))
        .route("/api/health/ready", get(ready))
        .route("/api/patients/register", post(patients::register))
        .route("/api/patients/login", post(patients::login))
        .route("/api/patients", get(patients::list))
        .route(
            "/api/patients/{id}",
            get(patients::get_by_id)
                .put(patients::update)
                .delete(patients::remove),
        )
        .route("/api/doctors", get(doctors::list).post(doctors::create))
        .route(
            "/api/doctors/{id}",
            get(doctors::get_by_id)
                .put(doctors::update)
                .delete(doctors::remove),
        )
        .route(
            "/api/appointments",
            get(appointments::list).post(appointments::create),
        )
        .route(
            "/api/appointments/{id}",
            get(appointments::get_by_id)
                .put(appointments::update)
                .delete(appointments::remove),
        )
        .route("/api/users", get(users::list))
        .route("/api/users/{id}/roles", put(users::update_roles))
        .route("/api/users/{id}", delete(users::remove))
        .with_state(state))
}

async fn ping() -> &'static str {
    "ok"
}

#[derive(Debug, Serialize)]
struct ReadyResponse {
    status: &'static str,
    checks: BTreeMap<&'static str, bool>,
}

async fn ready(State(state): State<AppState>) -> impl IntoResponse {
    let mut checks = BTreeMap::new();
    checks.insert("postgres", state.store.ping().await.is_ok());

    let all_ready = checks.values().all(|ok| *ok);
    let status = if all_ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status,
        Json(ReadyResponse {
            status: if all_ready { "ready" } else { "not_ready" },
            checks,
        }),
    )
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    code: String,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<serde_json::Value>,
}

fn json_error(
    status: StatusCode,
    code: impl Into<String>,
    message: impl Into<String>,
) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            code: code.into(),
            message: message.into(),
            details: None,
        }),
    )
}

fn service_error(err: ServiceError) -> ApiError {
    let status = match err.kind {
        ErrorKind::Unauthenticated => StatusCode::UNAUTHORIZED,
        ErrorKind::Forbidden => StatusCode::FORBIDDEN,
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::Conflict => StatusCode::CONFLICT,
        ErrorKind::ValidationFailed => StatusCode::BAD_REQUEST,
        ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    };

    if err.kind == ErrorKind::Internal {
        tracing::error!(message = %err.message, "internal error surfaced to caller");
    }

    (
        status,
        Json(ErrorResponse {
            code: err.code().to_string(),
            message: err.message,
            details: err.details,
        }),
    )
}

/// Perimeter check: absence of the header, a malformed header, a bad
/// signature, and an expired token all map to the same outcome.
fn extract_session(state: &AppState, headers: &HeaderMap) -> Result<Session, ApiError> {
    let token = bearer_token(headers).map_err(unauthenticated)?;
    let session = state.codec.verify(token).map_err(unauthenticated)?;
    Ok(session)
}

fn unauthenticated(err: AuthError) -> ApiError {
    tracing::debug!(reason = %err, "authentication failed");
    json_error(
        StatusCode::UNAUTHORIZED,
        ErrorKind::Unauthenticated.code(),
        err.message(),
    )
}

fn require_admin(session: &Session) -> Result<(), ApiError> {
    if session.roles.contains(Role::Admin) {
        Ok(())
    } else {
        Err(service_error(ServiceError::forbidden(
            "you are not allowed to view this part of the application",
        )))
    }
}

fn parse_body<T>(req: Result<Json<T>, JsonRejection>) -> Result<T, ApiError> {
    match req {
        Ok(Json(value)) => Ok(value),
        Err(_) => Err(json_error(
            StatusCode::BAD_REQUEST,
            ErrorKind::ValidationFailed.code(),
            "invalid JSON body",
        )),
    }
}

fn validate_email(email: &str) -> Result<(), ApiError> {
    let email = email.trim();
    if email.is_empty() || !email.contains('@') {
        return Err(json_error(
            StatusCode::BAD_REQUEST,
            ErrorKind::ValidationFailed.code(),
            "email must be a valid address",
        ));
    }
    Ok(())
}

fn validate_password(password: &str) -> Result<(), ApiError> {
    if password.len() < 8 {
        return Err(json_error(
            StatusCode::BAD_REQUEST,
            ErrorKind::ValidationFailed.code(),
            "password must be at least 8 characters",
        ));
    }
    Ok(())
}

fn issue_token(state: &AppState, session: &Session) -> Result<String, ApiError> {
    state
        .codec
        .issue(session.subject_id, session.roles)
        .map_err(|err| {
            json_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorKind::Internal.code(),
                err.message(),
            )
        })
}

#[derive(Debug, Serialize)]
struct ListResponse<T> {
    items: Vec<T>,
    count: usize,
}

impl<T> ListResponse<T> {
    fn new(items: Vec<T>) -> Self {
        let count = items.len();
        Self { items, count }
    }
}

#[derive(Debug, Serialize)]
struct ExposedUser {
    id: i64,
    email: String,
    roles: Vec<String>,
}

fn expose_account(account: &AccountRecord) -> ExposedUser {
    ExposedUser {
        id: account.id,
        email: account.email.clone(),
        roles: account
            .roles
            .tags()
            .into_iter()
            .map(str::to_string)
            .collect(),
    }
}
