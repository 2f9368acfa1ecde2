//! Demo data for local development: a handful of accounts, profiles, and
//! appointments. Applied only when the accounts table is empty.

use mediq_contracts::{Role, RoleSet, ServiceError};
use sqlx::Row;

use crate::Store;

/// Returns true when demo rows were inserted, false when existing data made
/// this a no-op. All rows land in one transaction.
pub async fn seed_demo_data(store: &Store, demo_password_hash: &str) -> Result<bool, ServiceError> {
    let patient = RoleSet::from_roles(&[Role::Patient]).bits() as i16;
    let doctor = RoleSet::from_roles(&[Role::Doctor]).bits() as i16;
    let everything =
        RoleSet::from_roles(&[Role::Admin, Role::Patient, Role::Doctor]).bits() as i16;

    store
        .run(async {
            let mut tx = store.pool.begin().await?;

            let row = sqlx::query("SELECT COUNT(*) AS count FROM accounts")
                .fetch_one(&mut *tx)
                .await?;
            let count: i64 = row.get("count");
            if count > 0 {
                return Ok::<bool, sqlx::Error>(false);
            }

            sqlx::query(
                "INSERT INTO accounts (id, email, password_hash, roles) VALUES \
                 (1, 'emily.smith@example.com', $1, $2), \
                 (2, 'david.brown@example.com', $1, $2), \
                 (3, 'nora.janssens@example.com', $1, $3), \
                 (4, 'tom.verstraeten@example.com', $1, $3), \
                 (5, 'admin@example.com', $1, $4)",
            )
            .bind(demo_password_hash)
            .bind(patient)
            .bind(doctor)
            .bind(everything)
            .execute(&mut *tx)
            .await?;

            sqlx::query(
                "INSERT INTO patients (id, name, street, number, postal_code, city, birthdate) VALUES \
                 (1, 'Emily Smith', 'Stationsstraat', '12', '9000', 'Gent', '1994-03-18'), \
                 (2, 'David Brown', 'Kerkplein', '3', '9300', 'Aalst', '1987-11-02'), \
                 (5, 'Site Admin', '', '', '', '', NULL)",
            )
            .execute(&mut *tx)
            .await?;

            sqlx::query(
                "INSERT INTO doctors (id, name, speciality, hospital, about) VALUES \
                 (3, 'Nora Janssens', 'Cardiology', 'AZ Sint-Lucas', NULL), \
                 (4, 'Tom Verstraeten', 'Dermatology', 'UZ Gent', NULL), \
                 (5, 'Site Admin', 'General practice', NULL, NULL)",
            )
            .execute(&mut *tx)
            .await?;

            sqlx::query(
                "INSERT INTO appointments (patient_id, doctor_id, date, description, condition, number_of_beds) VALUES \
                 (1, 3, '2023-12-01T09:00:00Z', 'Routine checkup', 'stable', 1), \
                 (2, 3, '2023-12-01T10:30:00Z', 'Follow-up consultation', 'recovering', 1), \
                 (2, 4, '2023-12-05T14:00:00Z', 'Skin examination', NULL, 1)",
            )
            .execute(&mut *tx)
            .await?;

            // Keep generated ids clear of the fixed demo ids.
            sqlx::query("SELECT setval(pg_get_serial_sequence('accounts', 'id'), 100)")
                .execute(&mut *tx)
                .await?;

            tx.commit().await?;
            Ok::<bool, sqlx::Error>(true)
        })
        .await
}
