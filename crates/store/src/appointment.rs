use chrono::{DateTime, Utc};
use mediq_contracts::{AccountId, AppointmentParties, ServiceError};
use mediq_policy::QueryScope;
use serde::Serialize;
use sqlx::Row;
use sqlx::postgres::PgRow;

use crate::Store;
use crate::consistency;

#[derive(Debug, Clone, Serialize)]
pub struct PartyRef {
    pub id: AccountId,
    pub name: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct AppointmentRecord {
    pub id: i64,
    pub date: DateTime<Utc>,
    pub description: String,
    pub condition: Option<String>,
    pub number_of_beds: Option<i32>,
    pub patient: PartyRef,
    pub doctor: PartyRef,
}

#[derive(Debug, Clone)]
pub struct NewAppointment {
    pub patient_id: AccountId,
    pub doctor_id: AccountId,
    pub date: DateTime<Utc>,
    pub description: String,
    pub condition: Option<String>,
    pub number_of_beds: Option<i32>,
}

#[derive(Debug, Clone, Default)]
pub struct UpdateAppointment {
    pub patient_id: Option<AccountId>,
    pub doctor_id: Option<AccountId>,
    pub date: Option<DateTime<Utc>>,
    pub description: Option<String>,
    pub condition: Option<String>,
    pub number_of_beds: Option<i32>,
}

const SELECT_APPOINTMENT: &str =
    "SELECT a.id, a.date, a.description, a.condition, a.number_of_beds, \
     a.patient_id, p.name AS patient_name, a.doctor_id, d.name AS doctor_name \
     FROM appointments a \
     JOIN patients p ON p.id = a.patient_id \
     JOIN doctors d ON d.id = a.doctor_id";

fn appointment_from_row(row: &PgRow) -> AppointmentRecord {
    AppointmentRecord {
        id: row.get("id"),
        date: row.get("date"),
        description: row.get("description"),
        condition: row.get("condition"),
        number_of_beds: row.get("number_of_beds"),
        patient: PartyRef {
            id: row.get("patient_id"),
            name: row.get("patient_name"),
        },
        doctor: PartyRef {
            id: row.get("doctor_id"),
            name: row.get("doctor_name"),
        },
    }
}

impl Store {
    /// Applies a visibility scope as one OR filter: an appointment matched
    /// by both union clauses (the self-referential case) comes back once.
    pub async fn list_appointments(
        &self,
        scope: &QueryScope,
    ) -> Result<Vec<AppointmentRecord>, ServiceError> {
        let rows = match *scope {
            QueryScope::All => {
                let query = format!("{} ORDER BY a.date ASC", SELECT_APPOINTMENT);
                self.run(sqlx::query(&query).fetch_all(&self.pool)).await?
            }
            QueryScope::SelfOnly(id) => {
                let query = format!(
                    "{} WHERE a.patient_id = $1 OR a.doctor_id = $1 ORDER BY a.date ASC",
                    SELECT_APPOINTMENT
                );
                self.run(sqlx::query(&query).bind(id).fetch_all(&self.pool))
                    .await?
            }
            QueryScope::AppointmentParties {
                patient_id: Some(patient_id),
                doctor_id: Some(doctor_id),
            } => {
                let query = format!(
                    "{} WHERE a.patient_id = $1 OR a.doctor_id = $2 ORDER BY a.date ASC",
                    SELECT_APPOINTMENT
                );
                self.run(
                    sqlx::query(&query)
                        .bind(patient_id)
                        .bind(doctor_id)
                        .fetch_all(&self.pool),
                )
                .await?
            }
            QueryScope::AppointmentParties {
                patient_id: Some(patient_id),
                doctor_id: None,
            } => {
                let query = format!(
                    "{} WHERE a.patient_id = $1 ORDER BY a.date ASC",
                    SELECT_APPOINTMENT
                );
                self.run(sqlx::query(&query).bind(patient_id).fetch_all(&self.pool))
                    .await?
            }
            QueryScope::AppointmentParties {
                patient_id: None,
                doctor_id: Some(doctor_id),
            } => {
                let query = format!(
                    "{} WHERE a.doctor_id = $1 ORDER BY a.date ASC",
                    SELECT_APPOINTMENT
                );
                self.run(sqlx::query(&query).bind(doctor_id).fetch_all(&self.pool))
                    .await?
            }
            QueryScope::AppointmentParties {
                patient_id: None,
                doctor_id: None,
            } => Vec::new(),
            // A profile scope cannot enumerate appointments.
            QueryScope::PatientsOfDoctor { .. } => Vec::new(),
        };

        Ok(rows.iter().map(appointment_from_row).collect())
    }

    pub async fn find_appointment(
        &self,
        id: i64,
    ) -> Result<Option<AppointmentRecord>, ServiceError> {
        let query = format!("{} WHERE a.id = $1", SELECT_APPOINTMENT);
        let row = self
            .run(sqlx::query(&query).bind(id).fetch_optional(&self.pool))
            .await?;
        Ok(row.as_ref().map(appointment_from_row))
    }

    /// Owner-pair fetch for the single-resource authorization check.
    pub async fn appointment_parties(
        &self,
        id: i64,
    ) -> Result<Option<AppointmentParties>, ServiceError> {
        let row = self
            .run(
                sqlx::query("SELECT patient_id, doctor_id FROM appointments WHERE id = $1")
                    .bind(id)
                    .fetch_optional(&self.pool),
            )
            .await?;
        Ok(row.map(|row| AppointmentParties {
            patient_id: row.get("patient_id"),
            doctor_id: row.get("doctor_id"),
        }))
    }

    /// Pre-checks both referenced parties, then inserts. A referential
    /// failure racing past the pre-check still maps to the same NotFound
    /// taxonomy through the database-error translation.
    pub async fn create_appointment(
        &self,
        new: NewAppointment,
    ) -> Result<AppointmentRecord, ServiceError> {
        consistency::check_parties(self, Some(new.patient_id), Some(new.doctor_id)).await?;

        let row = self
            .run(
                sqlx::query(
                    "INSERT INTO appointments \
                     (patient_id, doctor_id, date, description, condition, number_of_beds) \
                     VALUES ($1, $2, $3, $4, $5, $6) RETURNING id",
                )
                .bind(new.patient_id)
                .bind(new.doctor_id)
                .bind(new.date)
                .bind(&new.description)
                .bind(&new.condition)
                .bind(new.number_of_beds)
                .fetch_one(&self.pool),
            )
            .await?;
        let id: i64 = row.get("id");

        self.find_appointment(id)
            .await?
            .ok_or_else(|| ServiceError::internal("created appointment vanished before readback"))
    }

    pub async fn update_appointment(
        &self,
        id: i64,
        changes: UpdateAppointment,
    ) -> Result<bool, ServiceError> {
        consistency::check_parties(self, changes.patient_id, changes.doctor_id).await?;

        let result = self
            .run(
                sqlx::query(
                    "UPDATE appointments SET \
                     patient_id = COALESCE($2, patient_id), \
                     doctor_id = COALESCE($3, doctor_id), \
                     date = COALESCE($4, date), \
                     description = COALESCE($5, description), \
                     condition = COALESCE($6, condition), \
                     number_of_beds = COALESCE($7, number_of_beds) \
                     WHERE id = $1",
                )
                .bind(id)
                .bind(changes.patient_id)
                .bind(changes.doctor_id)
                .bind(changes.date)
                .bind(changes.description)
                .bind(changes.condition)
                .bind(changes.number_of_beds)
                .execute(&self.pool),
            )
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn delete_appointment(&self, id: i64) -> Result<bool, ServiceError> {
        let result = self
            .run(
                sqlx::query("DELETE FROM appointments WHERE id = $1")
                    .bind(id)
                    .execute(&self.pool),
            )
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
