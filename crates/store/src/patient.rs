use chrono::NaiveDate;
use mediq_contracts::{AccountId, Role, RoleSet, ServiceError};
use mediq_policy::QueryScope;
use serde::Serialize;
use sqlx::Row;
use sqlx::postgres::PgRow;

use crate::Store;

#[derive(Debug, Clone, Serialize)]
pub struct PatientRecord {
    pub id: AccountId,
    pub email: String,
    pub roles: Vec<String>,
    pub name: String,
    pub street: String,
    pub number: String,
    pub postal_code: String,
    pub city: String,
    pub birthdate: Option<NaiveDate>,
}

#[derive(Debug, Clone)]
pub struct NewPatient {
    pub email: String,
    pub password_hash: String,
    pub name: String,
    pub street: Option<String>,
    pub number: Option<String>,
    pub postal_code: Option<String>,
    pub city: Option<String>,
    pub birthdate: Option<NaiveDate>,
}

#[derive(Debug, Clone, Default)]
pub struct UpdatePatient {
    pub email: Option<String>,
    pub name: Option<String>,
    pub street: Option<String>,
    pub number: Option<String>,
    pub postal_code: Option<String>,
    pub city: Option<String>,
    pub birthdate: Option<NaiveDate>,
}

const SELECT_PATIENT: &str = "SELECT p.id, a.email, a.roles, p.name, p.street, p.number, \
     p.postal_code, p.city, p.birthdate \
     FROM patients p JOIN accounts a ON a.id = p.id";

fn patient_from_row(row: &PgRow) -> PatientRecord {
    let roles = RoleSet::from_bits(row.get::<i16, _>("roles") as u8);
    PatientRecord {
        id: row.get("id"),
        email: row.get("email"),
        roles: roles.tags().into_iter().map(str::to_string).collect(),
        name: row.get("name"),
        street: row.get("street"),
        number: row.get("number"),
        postal_code: row.get("postal_code"),
        city: row.get("city"),
        birthdate: row.get("birthdate"),
    }
}

impl Store {
    /// Account and profile are created in one transaction: registration
    /// never leaves an account without its patient profile.
    pub async fn register_patient(&self, new: NewPatient) -> Result<PatientRecord, ServiceError> {
        let roles = RoleSet::from_roles(&[Role::Patient]);

        let id = self
            .run(async {
                let mut tx = self.pool.begin().await?;

                let row = sqlx::query(
                    "INSERT INTO accounts (email, password_hash, roles) VALUES ($1, $2, $3) RETURNING id",
                )
                .bind(&new.email)
                .bind(&new.password_hash)
                .bind(roles.bits() as i16)
                .fetch_one(&mut *tx)
                .await?;
                let id: AccountId = row.get("id");

                sqlx::query(
                    "INSERT INTO patients (id, name, street, number, postal_code, city, birthdate) \
                     VALUES ($1, $2, $3, $4, $5, $6, $7)",
                )
                .bind(id)
                .bind(&new.name)
                .bind(new.street.as_deref().unwrap_or(""))
                .bind(new.number.as_deref().unwrap_or(""))
                .bind(new.postal_code.as_deref().unwrap_or(""))
                .bind(new.city.as_deref().unwrap_or(""))
                .bind(new.birthdate)
                .execute(&mut *tx)
                .await?;

                tx.commit().await?;
                Ok::<AccountId, sqlx::Error>(id)
            })
            .await?;

        self.find_patient(id)
            .await?
            .ok_or_else(|| ServiceError::internal("registered patient vanished before readback"))
    }

    pub async fn find_patient(
        &self,
        id: AccountId,
    ) -> Result<Option<PatientRecord>, ServiceError> {
        let query = format!("{} WHERE p.id = $1", SELECT_PATIENT);
        let row = self
            .run(sqlx::query(&query).bind(id).fetch_optional(&self.pool))
            .await?;
        Ok(row.as_ref().map(patient_from_row))
    }

    pub async fn patient_exists(&self, id: AccountId) -> Result<bool, ServiceError> {
        let row = self
            .run(
                sqlx::query("SELECT 1 AS one FROM patients WHERE id = $1")
                    .bind(id)
                    .fetch_optional(&self.pool),
            )
            .await?;
        Ok(row.is_some())
    }

    /// Applies a visibility scope as a single filter, so a profile matched
    /// by both union clauses appears exactly once.
    pub async fn list_patients(
        &self,
        scope: &QueryScope,
    ) -> Result<Vec<PatientRecord>, ServiceError> {
        let rows = match *scope {
            QueryScope::All => {
                let query = format!("{} ORDER BY p.id", SELECT_PATIENT);
                self.run(sqlx::query(&query).fetch_all(&self.pool)).await?
            }
            QueryScope::SelfOnly(id) => {
                let query = format!("{} WHERE p.id = $1", SELECT_PATIENT);
                self.run(sqlx::query(&query).bind(id).fetch_all(&self.pool))
                    .await?
            }
            QueryScope::PatientsOfDoctor {
                doctor_id,
                include_self: Some(self_id),
            } => {
                let query = format!(
                    "{} WHERE p.id = $1 OR p.id IN \
                     (SELECT patient_id FROM appointments WHERE doctor_id = $2) ORDER BY p.id",
                    SELECT_PATIENT
                );
                self.run(
                    sqlx::query(&query)
                        .bind(self_id)
                        .bind(doctor_id)
                        .fetch_all(&self.pool),
                )
                .await?
            }
            QueryScope::PatientsOfDoctor {
                doctor_id,
                include_self: None,
            } => {
                let query = format!(
                    "{} WHERE p.id IN \
                     (SELECT patient_id FROM appointments WHERE doctor_id = $1) ORDER BY p.id",
                    SELECT_PATIENT
                );
                self.run(sqlx::query(&query).bind(doctor_id).fetch_all(&self.pool))
                    .await?
            }
            // An appointment scope cannot enumerate profiles.
            QueryScope::AppointmentParties { .. } => Vec::new(),
        };

        Ok(rows.iter().map(patient_from_row).collect())
    }

    pub async fn update_patient(
        &self,
        id: AccountId,
        changes: UpdatePatient,
    ) -> Result<bool, ServiceError> {
        let updated = self
            .run(async {
                let mut tx = self.pool.begin().await?;

                if let Some(email) = changes.email.as_deref() {
                    sqlx::query("UPDATE accounts SET email = $1 WHERE id = $2")
                        .bind(email)
                        .bind(id)
                        .execute(&mut *tx)
                        .await?;
                }

                let result = sqlx::query(
                    "UPDATE patients SET \
                     name = COALESCE($2, name), \
                     street = COALESCE($3, street), \
                     number = COALESCE($4, number), \
                     postal_code = COALESCE($5, postal_code), \
                     city = COALESCE($6, city), \
                     birthdate = COALESCE($7, birthdate) \
                     WHERE id = $1",
                )
                .bind(id)
                .bind(changes.name)
                .bind(changes.street)
                .bind(changes.number)
                .bind(changes.postal_code)
                .bind(changes.city)
                .bind(changes.birthdate)
                .execute(&mut *tx)
                .await?;

                tx.commit().await?;
                Ok::<bool, sqlx::Error>(result.rows_affected() > 0)
            })
            .await?;

        Ok(updated)
    }

    /// Removes the profile; the owning account stays. Appointments held as
    /// the patient cascade at the storage boundary.
    pub async fn delete_patient(&self, id: AccountId) -> Result<bool, ServiceError> {
        let result = self
            .run(
                sqlx::query("DELETE FROM patients WHERE id = $1")
                    .bind(id)
                    .execute(&self.pool),
            )
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
