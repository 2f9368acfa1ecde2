use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use mediq_contracts::{AccountId, EntityKind, ErrorKind, ServiceError};
use mediq_policy::{QueryScope, visible_scope};
use mediq_store::{DoctorRecord, NewDoctor, UpdateDoctor};
use serde::Deserialize;

use super::{
    ApiError, AppState, ListResponse, extract_session, json_error, parse_body, require_admin,
    service_error, validate_email, validate_password,
};

/// The directory is public to any signed-in caller.
pub(super) async fn list(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<ListResponse<DoctorRecord>>, ApiError> {
    let session = extract_session(&state, &headers)?;

    let items = match visible_scope(&session, EntityKind::Doctor) {
        QueryScope::All => state.store.list_doctors().await.map_err(service_error)?,
        QueryScope::SelfOnly(id) => state
            .store
            .find_doctor(id)
            .await
            .map_err(service_error)?
            .into_iter()
            .collect(),
        _ => Vec::new(),
    };

    Ok(Json(ListResponse::new(items)))
}

pub(super) async fn get_by_id(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<AccountId>,
) -> Result<Json<DoctorRecord>, ApiError> {
    extract_session(&state, &headers)?;

    let doctor = state
        .store
        .find_doctor(id)
        .await
        .map_err(service_error)?
        .ok_or_else(|| service_error(ServiceError::not_found(EntityKind::Doctor, id)))?;

    Ok(Json(doctor))
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub(super) struct CreateDoctorRequest {
    email: String,
    password: String,
    name: String,
    speciality: String,
    #[serde(default)]
    hospital: Option<String>,
    #[serde(default)]
    about: Option<String>,
}

pub(super) async fn create(
    State(state): State<AppState>,
    headers: HeaderMap,
    req: Result<Json<CreateDoctorRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<DoctorRecord>), ApiError> {
    let session = extract_session(&state, &headers)?;
    require_admin(&session)?;

    let req = parse_body(req)?;
    validate_email(&req.email)?;
    validate_password(&req.password)?;
    if req.name.trim().is_empty() || req.speciality.trim().is_empty() {
        return Err(json_error(
            StatusCode::BAD_REQUEST,
            ErrorKind::ValidationFailed.code(),
            "name and speciality must be non-empty",
        ));
    }

    let password_hash = mediq_auth::password::hash_password(&req.password).map_err(|err| {
        json_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            ErrorKind::Internal.code(),
            err.to_string(),
        )
    })?;

    let doctor = state
        .store
        .create_doctor(NewDoctor {
            email: req.email.trim().to_string(),
            password_hash,
            name: req.name.trim().to_string(),
            speciality: req.speciality.trim().to_string(),
            hospital: req.hospital,
            about: req.about,
        })
        .await
        .map_err(service_error)?;

    tracing::info!(account_id = doctor.id, "doctor created");

    Ok((StatusCode::CREATED, Json(doctor)))
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub(super) struct UpdateDoctorRequest {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    speciality: Option<String>,
    #[serde(default)]
    hospital: Option<String>,
    #[serde(default)]
    about: Option<String>,
}

pub(super) async fn update(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<AccountId>,
    req: Result<Json<UpdateDoctorRequest>, JsonRejection>,
) -> Result<Json<DoctorRecord>, ApiError> {
    let session = extract_session(&state, &headers)?;
    require_admin(&session)?;

    let req = parse_body(req)?;

    let updated = state
        .store
        .update_doctor(
            id,
            UpdateDoctor {
                name: req.name,
                speciality: req.speciality,
                hospital: req.hospital,
                about: req.about,
            },
        )
        .await
        .map_err(service_error)?;
    if !updated {
        return Err(service_error(ServiceError::not_found(
            EntityKind::Doctor,
            id,
        )));
    }

    let doctor = state
        .store
        .find_doctor(id)
        .await
        .map_err(service_error)?
        .ok_or_else(|| service_error(ServiceError::not_found(EntityKind::Doctor, id)))?;

    Ok(Json(doctor))
}

pub(super) async fn remove(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<AccountId>,
) -> Result<StatusCode, ApiError> {
    let session = extract_session(&state, &headers)?;
    require_admin(&session)?;

    let deleted = state.store.delete_doctor(id).await.map_err(service_error)?;
    if !deleted {
        return Err(service_error(ServiceError::not_found(
            EntityKind::Doctor,
            id,
        )));
    }

    Ok(StatusCode::NO_CONTENT)
}
