use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use chrono::{DateTime, Utc};
use mediq_contracts::{
    AccountId, Action, AppointmentParties, EntityKind, ErrorKind, ResourceOwnership, ServiceError,
};
use mediq_policy::{authorize, visible_scope};
use mediq_store::{AppointmentRecord, NewAppointment, UpdateAppointment};
use serde::Deserialize;

use super::{
    ApiError, AppState, ListResponse, extract_session, json_error, parse_body, service_error,
};

pub(super) async fn list(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<ListResponse<AppointmentRecord>>, ApiError> {
    let session = extract_session(&state, &headers)?;
    let scope = visible_scope(&session, EntityKind::Appointment);

    let items = state
        .store
        .list_appointments(&scope)
        .await
        .map_err(service_error)?;

    Ok(Json(ListResponse::new(items)))
}

pub(super) async fn get_by_id(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> Result<Json<AppointmentRecord>, ApiError> {
    let session = extract_session(&state, &headers)?;

    let parties = state
        .store
        .appointment_parties(id)
        .await
        .map_err(service_error)?
        .ok_or_else(|| service_error(ServiceError::not_found(EntityKind::Appointment, id)))?;

    if !authorize(&session, ResourceOwnership::TwoSided(parties), Action::Read).is_allow() {
        return Err(forbidden("view"));
    }

    let appointment = state
        .store
        .find_appointment(id)
        .await
        .map_err(service_error)?
        .ok_or_else(|| service_error(ServiceError::not_found(EntityKind::Appointment, id)))?;

    Ok(Json(appointment))
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub(super) struct CreateAppointmentRequest {
    /// Defaults to the caller; only an admin can book on behalf of another
    /// patient anyway.
    #[serde(default)]
    patient_id: Option<AccountId>,
    doctor_id: AccountId,
    date: DateTime<Utc>,
    description: String,
    #[serde(default)]
    condition: Option<String>,
    #[serde(default)]
    number_of_beds: Option<i32>,
}

pub(super) async fn create(
    State(state): State<AppState>,
    headers: HeaderMap,
    req: Result<Json<CreateAppointmentRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<AppointmentRecord>), ApiError> {
    let session = extract_session(&state, &headers)?;
    let req = parse_body(req)?;

    if req.description.trim().is_empty() {
        return Err(json_error(
            StatusCode::BAD_REQUEST,
            ErrorKind::ValidationFailed.code(),
            "description must be non-empty",
        ));
    }

    let parties = AppointmentParties {
        patient_id: req.patient_id.unwrap_or(session.subject_id),
        doctor_id: req.doctor_id,
    };

    if !authorize(&session, ResourceOwnership::TwoSided(parties), Action::Create).is_allow() {
        return Err(forbidden("create"));
    }

    let appointment = state
        .store
        .create_appointment(NewAppointment {
            patient_id: parties.patient_id,
            doctor_id: parties.doctor_id,
            date: req.date,
            description: req.description.trim().to_string(),
            condition: req.condition,
            number_of_beds: req.number_of_beds,
        })
        .await
        .map_err(service_error)?;

    tracing::info!(
        appointment_id = appointment.id,
        patient_id = parties.patient_id,
        doctor_id = parties.doctor_id,
        "appointment created"
    );

    Ok((StatusCode::CREATED, Json(appointment)))
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub(super) struct UpdateAppointmentRequest {
    #[serde(default)]
    patient_id: Option<AccountId>,
    #[serde(default)]
    doctor_id: Option<AccountId>,
    #[serde(default)]
    date: Option<DateTime<Utc>>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    condition: Option<String>,
    #[serde(default)]
    number_of_beds: Option<i32>,
}

pub(super) async fn update(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
    req: Result<Json<UpdateAppointmentRequest>, JsonRejection>,
) -> Result<Json<AppointmentRecord>, ApiError> {
    let session = extract_session(&state, &headers)?;
    let req = parse_body(req)?;

    let current = state
        .store
        .appointment_parties(id)
        .await
        .map_err(service_error)?
        .ok_or_else(|| service_error(ServiceError::not_found(EntityKind::Appointment, id)))?;

    if !authorize(&session, ResourceOwnership::TwoSided(current), Action::Update).is_allow() {
        return Err(forbidden("update"));
    }

    // Re-pointing a side needs the caller to be a legitimate party of the
    // resulting pair as well.
    let next = AppointmentParties {
        patient_id: req.patient_id.unwrap_or(current.patient_id),
        doctor_id: req.doctor_id.unwrap_or(current.doctor_id),
    };
    if next != current
        && !authorize(&session, ResourceOwnership::TwoSided(next), Action::Update).is_allow()
    {
        return Err(forbidden("update"));
    }

    state
        .store
        .update_appointment(
            id,
            UpdateAppointment {
                patient_id: req.patient_id,
                doctor_id: req.doctor_id,
                date: req.date,
                description: req.description,
                condition: req.condition,
                number_of_beds: req.number_of_beds,
            },
        )
        .await
        .map_err(service_error)?;

    let appointment = state
        .store
        .find_appointment(id)
        .await
        .map_err(service_error)?
        .ok_or_else(|| service_error(ServiceError::not_found(EntityKind::Appointment, id)))?;

    Ok(Json(appointment))
}

pub(super) async fn remove(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    let session = extract_session(&state, &headers)?;

    let parties = state
        .store
        .appointment_parties(id)
        .await
        .map_err(service_error)?
        .ok_or_else(|| service_error(ServiceError::not_found(EntityKind::Appointment, id)))?;

    if !authorize(&session, ResourceOwnership::TwoSided(parties), Action::Delete).is_allow() {
        return Err(forbidden("delete"));
    }

    state
        .store
        .delete_appointment(id)
        .await
        .map_err(service_error)?;

    Ok(StatusCode::NO_CONTENT)
}

fn forbidden(verb: &str) -> ApiError {
    service_error(ServiceError::forbidden(format!(
        "you are not allowed to {} this appointment",
        verb
    )))
}
