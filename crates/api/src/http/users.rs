use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use mediq_contracts::{AccountId, EntityKind, ErrorKind, RoleSet, ServiceError};
use serde::Deserialize;

use super::{
    ApiError, AppState, ExposedUser, ListResponse, expose_account, extract_session, json_error,
    parse_body, require_admin, service_error,
};

pub(super) async fn list(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<ListResponse<ExposedUser>>, ApiError> {
    let session = extract_session(&state, &headers)?;
    require_admin(&session)?;

    let accounts = state.store.list_accounts().await.map_err(service_error)?;
    let items = accounts.iter().map(expose_account).collect();

    Ok(Json(ListResponse::new(items)))
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub(super) struct UpdateRolesRequest {
    roles: Vec<String>,
}

/// The only mutation of an account's role set. Unknown tags and empty sets
/// are rejected before anything touches storage.
pub(super) async fn update_roles(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<AccountId>,
    req: Result<Json<UpdateRolesRequest>, JsonRejection>,
) -> Result<Json<ExposedUser>, ApiError> {
    let session = extract_session(&state, &headers)?;
    require_admin(&session)?;

    let req = parse_body(req)?;
    let roles = RoleSet::parse_tags(&req.roles).map_err(service_error)?;
    if roles.is_empty() {
        return Err(json_error(
            StatusCode::BAD_REQUEST,
            ErrorKind::ValidationFailed.code(),
            "role set must not be empty",
        ));
    }

    let updated = state
        .store
        .update_account_roles(id, roles)
        .await
        .map_err(service_error)?;
    if !updated {
        return Err(service_error(ServiceError::not_found(
            EntityKind::Account,
            id,
        )));
    }

    let account = state
        .store
        .find_account(id)
        .await
        .map_err(service_error)?
        .ok_or_else(|| service_error(ServiceError::not_found(EntityKind::Account, id)))?;

    tracing::info!(account_id = id, roles = ?account.roles.tags(), "role set updated");

    Ok(Json(expose_account(&account)))
}

pub(super) async fn remove(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<AccountId>,
) -> Result<StatusCode, ApiError> {
    let session = extract_session(&state, &headers)?;
    require_admin(&session)?;

    let deleted = state
        .store
        .delete_account(id)
        .await
        .map_err(service_error)?;
    if !deleted {
        return Err(service_error(ServiceError::not_found(
            EntityKind::Account,
            id,
        )));
    }

    Ok(StatusCode::NO_CONTENT)
}
