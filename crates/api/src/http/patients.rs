use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use chrono::NaiveDate;
use mediq_auth::password::{hash_password, verify_password};
use mediq_contracts::{
    AccountId, Action, EntityKind, ErrorKind, ResourceOwnership, Role, RoleSet, ServiceError,
    Session,
};
use mediq_policy::{authorize, visible_scope};
use mediq_store::{NewPatient, PatientRecord, UpdatePatient};
use serde::{Deserialize, Serialize};

use super::{
    ApiError, AppState, ExposedUser, ListResponse, expose_account, extract_session, issue_token,
    json_error, parse_body, service_error, validate_email, validate_password,
};

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub(super) struct RegisterRequest {
    email: String,
    password: String,
    name: String,
    #[serde(default)]
    street: Option<String>,
    #[serde(default)]
    number: Option<String>,
    #[serde(default)]
    postal_code: Option<String>,
    #[serde(default)]
    city: Option<String>,
    #[serde(default)]
    birthdate: Option<NaiveDate>,
}

#[derive(Debug, Serialize)]
pub(super) struct RegisterResponse {
    user: PatientRecord,
    token: String,
}

pub(super) async fn register(
    State(state): State<AppState>,
    req: Result<Json<RegisterRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<RegisterResponse>), ApiError> {
    let req = parse_body(req)?;
    validate_email(&req.email)?;
    validate_password(&req.password)?;
    if req.name.trim().is_empty() {
        return Err(json_error(
            StatusCode::BAD_REQUEST,
            ErrorKind::ValidationFailed.code(),
            "name must be non-empty",
        ));
    }

    let password_hash = hash_password(&req.password).map_err(|err| {
        json_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            ErrorKind::Internal.code(),
            err.to_string(),
        )
    })?;

    let patient = state
        .store
        .register_patient(NewPatient {
            email: req.email.trim().to_string(),
            password_hash,
            name: req.name.trim().to_string(),
            street: req.street,
            number: req.number,
            postal_code: req.postal_code,
            city: req.city,
            birthdate: req.birthdate,
        })
        .await
        .map_err(service_error)?;

    let session = Session {
        subject_id: patient.id,
        roles: RoleSet::from_roles(&[Role::Patient]),
    };
    let token = issue_token(&state, &session)?;

    tracing::info!(account_id = patient.id, "patient registered");

    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse {
            user: patient,
            token,
        }),
    ))
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub(super) struct LoginRequest {
    email: String,
    password: String,
}

#[derive(Debug, Serialize)]
pub(super) struct LoginResponse {
    user: ExposedUser,
    token: String,
}

pub(super) async fn login(
    State(state): State<AppState>,
    req: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<Json<LoginResponse>, ApiError> {
    let req = parse_body(req)?;

    let account = state
        .store
        .find_account_by_email(req.email.trim())
        .await
        .map_err(service_error)?;
    let Some(account) = account else {
        return Err(invalid_credentials());
    };

    let password_ok = verify_password(&req.password, &account.password_hash).map_err(|err| {
        json_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            ErrorKind::Internal.code(),
            err.to_string(),
        )
    })?;
    if !password_ok {
        return Err(invalid_credentials());
    }

    let session = Session {
        subject_id: account.id,
        roles: account.roles,
    };
    let token = issue_token(&state, &session)?;

    tracing::debug!(account_id = account.id, "login succeeded");

    Ok(Json(LoginResponse {
        user: expose_account(&account),
        token,
    }))
}

/// Unknown email and wrong password return the same code and message, so
/// the endpoint does not reveal which accounts exist.
fn invalid_credentials() -> ApiError {
    service_error(ServiceError::unauthenticated(
        "the given email and password do not match",
    ))
}

pub(super) async fn list(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<ListResponse<PatientRecord>>, ApiError> {
    let session = extract_session(&state, &headers)?;
    let scope = visible_scope(&session, EntityKind::Patient);

    let items = state
        .store
        .list_patients(&scope)
        .await
        .map_err(service_error)?;

    Ok(Json(ListResponse::new(items)))
}

pub(super) async fn get_by_id(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<AccountId>,
) -> Result<Json<PatientRecord>, ApiError> {
    let session = extract_session(&state, &headers)?;

    let patient = state
        .store
        .find_patient(id)
        .await
        .map_err(service_error)?
        .ok_or_else(|| service_error(ServiceError::not_found(EntityKind::Patient, id)))?;

    if !authorize(&session, ResourceOwnership::Single(id), Action::Read).is_allow() {
        return Err(service_error(ServiceError::forbidden(
            "you are not allowed to view this patient's information",
        )));
    }

    Ok(Json(patient))
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub(super) struct UpdatePatientRequest {
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    street: Option<String>,
    #[serde(default)]
    number: Option<String>,
    #[serde(default)]
    postal_code: Option<String>,
    #[serde(default)]
    city: Option<String>,
    #[serde(default)]
    birthdate: Option<NaiveDate>,
}

pub(super) async fn update(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<AccountId>,
    req: Result<Json<UpdatePatientRequest>, JsonRejection>,
) -> Result<Json<PatientRecord>, ApiError> {
    let session = extract_session(&state, &headers)?;
    let req = parse_body(req)?;

    if let Some(email) = req.email.as_deref() {
        validate_email(email)?;
    }

    let exists = state
        .store
        .patient_exists(id)
        .await
        .map_err(service_error)?;
    if !exists {
        return Err(service_error(ServiceError::not_found(
            EntityKind::Patient,
            id,
        )));
    }

    if !authorize(&session, ResourceOwnership::Single(id), Action::Update).is_allow() {
        return Err(service_error(ServiceError::forbidden(
            "you are not allowed to update this patient's information",
        )));
    }

    state
        .store
        .update_patient(
            id,
            UpdatePatient {
                email: req.email.map(|e| e.trim().to_string()),
                name: req.name,
                street: req.street,
                number: req.number,
                postal_code: req.postal_code,
                city: req.city,
                birthdate: req.birthdate,
            },
        )
        .await
        .map_err(service_error)?;

    let patient = state
        .store
        .find_patient(id)
        .await
        .map_err(service_error)?
        .ok_or_else(|| service_error(ServiceError::not_found(EntityKind::Patient, id)))?;

    Ok(Json(patient))
}

pub(super) async fn remove(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<AccountId>,
) -> Result<StatusCode, ApiError> {
    let session = extract_session(&state, &headers)?;

    let exists = state
        .store
        .patient_exists(id)
        .await
        .map_err(service_error)?;
    if !exists {
        return Err(service_error(ServiceError::not_found(
            EntityKind::Patient,
            id,
        )));
    }

    if !authorize(&session, ResourceOwnership::Single(id), Action::Delete).is_allow() {
        return Err(service_error(ServiceError::forbidden(
            "you are not allowed to delete this patient's information",
        )));
    }

    state.store.delete_patient(id).await.map_err(service_error)?;

    Ok(StatusCode::NO_CONTENT)
}
