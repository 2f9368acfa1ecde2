//! Entity consistency: existence pre-checks for two-sided writes, and the
//! single translation point from storage-level violations into the domain
//! taxonomy. Errors this module does not recognize are surfaced loud, not
//! swallowed.

use mediq_contracts::{AccountId, EntityKind, ErrorKind, ServiceError};

use crate::Store;

/// Confirms the referenced parties exist before an appointment write. The
/// two probes run concurrently and do not short-circuit: when both parties
/// are missing, both are reported.
pub async fn check_parties(
    store: &Store,
    patient_id: Option<AccountId>,
    doctor_id: Option<AccountId>,
) -> Result<(), ServiceError> {
    let (patient_missing, doctor_missing) = tokio::join!(
        async {
            match patient_id {
                Some(id) => store.patient_exists(id).await.map(|found| (!found).then_some(id)),
                None => Ok(None),
            }
        },
        async {
            match doctor_id {
                Some(id) => store.doctor_exists(id).await.map(|found| (!found).then_some(id)),
                None => Ok(None),
            }
        },
    );

    let mut missing = Vec::new();
    if let Some(id) = patient_missing? {
        missing.push((EntityKind::Patient, id));
    }
    if let Some(id) = doctor_missing? {
        missing.push((EntityKind::Doctor, id));
    }

    if missing.is_empty() {
        Ok(())
    } else {
        Err(missing_parties_error(&missing))
    }
}

fn missing_parties_error(missing: &[(EntityKind, AccountId)]) -> ServiceError {
    if let [(entity, id)] = missing {
        return ServiceError::not_found(*entity, *id);
    }

    let message = missing
        .iter()
        .map(|(entity, id)| format!("no {} with id {} exists", entity.as_str(), id))
        .collect::<Vec<_>>()
        .join("; ");

    let details = missing
        .iter()
        .map(|(entity, id)| serde_json::json!({ "entity": entity.as_str(), "id": id }))
        .collect::<Vec<_>>();

    ServiceError {
        kind: ErrorKind::NotFound,
        message,
        details: Some(serde_json::json!({ "missing": details })),
    }
}

/// Maps a storage error onto the domain taxonomy: uniqueness violations
/// become conflicts, known referential-integrity violations become the
/// same NotFound the pre-check would have produced (covers the race with
/// a concurrent deletion), and everything else stays an internal error
/// carrying the original text.
pub fn map_db_error(err: sqlx::Error) -> ServiceError {
    if let Some(db) = err.as_database_error() {
        if db.is_unique_violation() {
            let mut out = ServiceError::conflict("already exists");
            if let Some(constraint) = db.constraint() {
                out = out.with_details(serde_json::json!({ "constraint": constraint }));
            }
            return out;
        }

        if db.is_foreign_key_violation() {
            match db.constraint() {
                Some("fk_appointment_patient") => {
                    return ServiceError {
                        kind: ErrorKind::NotFound,
                        message: "this patient does not exist".to_string(),
                        details: Some(serde_json::json!({ "entity": "patient" })),
                    };
                }
                Some("fk_appointment_doctor") => {
                    return ServiceError {
                        kind: ErrorKind::NotFound,
                        message: "this doctor does not exist".to_string(),
                        details: Some(serde_json::json!({ "entity": "doctor" })),
                    };
                }
                _ => {}
            }
        }
    }

    ServiceError::internal(format!("database error: {}", err))
}
