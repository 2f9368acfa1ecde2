use mediq_contracts::{AccountId, Role, RoleSet, ServiceError};
use serde::Serialize;
use sqlx::Row;
use sqlx::postgres::PgRow;

use crate::Store;

#[derive(Debug, Clone, Serialize)]
pub struct DoctorRecord {
    pub id: AccountId,
    pub email: String,
    pub name: String,
    pub speciality: String,
    pub hospital: Option<String>,
    pub about: Option<String>,
}

#[derive(Debug, Clone)]
pub struct NewDoctor {
    pub email: String,
    pub password_hash: String,
    pub name: String,
    pub speciality: String,
    pub hospital: Option<String>,
    pub about: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct UpdateDoctor {
    pub name: Option<String>,
    pub speciality: Option<String>,
    pub hospital: Option<String>,
    pub about: Option<String>,
}

const SELECT_DOCTOR: &str = "SELECT d.id, a.email, d.name, d.speciality, d.hospital, d.about \
     FROM doctors d JOIN accounts a ON a.id = d.id";

fn doctor_from_row(row: &PgRow) -> DoctorRecord {
    DoctorRecord {
        id: row.get("id"),
        email: row.get("email"),
        name: row.get("name"),
        speciality: row.get("speciality"),
        hospital: row.get("hospital"),
        about: row.get("about"),
    }
}

impl Store {
    /// Administrative creation of a directory entry: account (role DOCTOR)
    /// and profile in one transaction.
    pub async fn create_doctor(&self, new: NewDoctor) -> Result<DoctorRecord, ServiceError> {
        let roles = RoleSet::from_roles(&[Role::Doctor]);

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
                    "INSERT INTO doctors (id, name, speciality, hospital, about) \
                     VALUES ($1, $2, $3, $4, $5)",
                )
                .bind(id)
                .bind(&new.name)
                .bind(&new.speciality)
                .bind(&new.hospital)
                .bind(&new.about)
                .execute(&mut *tx)
                .await?;

                tx.commit().await?;
                Ok::<AccountId, sqlx::Error>(id)
            })
            .await?;

        self.find_doctor(id)
            .await?
            .ok_or_else(|| ServiceError::internal("created doctor vanished before readback"))
    }

    pub async fn find_doctor(&self, id: AccountId) -> Result<Option<DoctorRecord>, ServiceError> {
        let query = format!("{} WHERE d.id = $1", SELECT_DOCTOR);
        let row = self
            .run(sqlx::query(&query).bind(id).fetch_optional(&self.pool))
            .await?;
        Ok(row.as_ref().map(doctor_from_row))
    }

    pub async fn doctor_exists(&self, id: AccountId) -> Result<bool, ServiceError> {
        let row = self
            .run(
                sqlx::query("SELECT 1 AS one FROM doctors WHERE id = $1")
                    .bind(id)
                    .fetch_optional(&self.pool),
            )
            .await?;
        Ok(row.is_some())
    }

    /// The directory is enumerable by any signed-in caller; no scope
    /// parameter is needed.
    pub async fn list_doctors(&self) -> Result<Vec<DoctorRecord>, ServiceError> {
        let query = format!("{} ORDER BY d.id", SELECT_DOCTOR);
        let rows = self.run(sqlx::query(&query).fetch_all(&self.pool)).await?;
        Ok(rows.iter().map(doctor_from_row).collect())
    }

    pub async fn update_doctor(
        &self,
        id: AccountId,
        changes: UpdateDoctor,
    ) -> Result<bool, ServiceError> {
        let result = self
            .run(
                sqlx::query(
                    "UPDATE doctors SET \
                     name = COALESCE($2, name), \
                     speciality = COALESCE($3, speciality), \
                     hospital = COALESCE($4, hospital), \
                     about = COALESCE($5, about) \
                     WHERE id = $1",
                )
                .bind(id)
                .bind(changes.name)
                .bind(changes.speciality)
                .bind(changes.hospital)
                .bind(changes.about)
                .execute(&self.pool),
            )
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn delete_doctor(&self, id: AccountId) -> Result<bool, ServiceError> {
        let result = self
            .run(
                sqlx::query("DELETE FROM doctors WHERE id = $1")
                    .bind(id)
                    .execute(&self.pool),
            )
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
