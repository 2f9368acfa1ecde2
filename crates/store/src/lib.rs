use std::future::Future;
use std::time::Duration;

use mediq_contracts::ServiceError;
use sqlx::postgres::PgPoolOptions;

mod account;
mod appointment;
pub mod consistency;
mod doctor;
mod patient;
pub mod seed;

pub use account::AccountRecord;
pub use appointment::{AppointmentRecord, NewAppointment, PartyRef, UpdateAppointment};
pub use doctor::{DoctorRecord, NewDoctor, UpdateDoctor};
pub use patient::{NewPatient, PatientRecord, UpdatePatient};

/// Handle over the Postgres pool, passed explicitly into every consumer
/// instead of living in a module-level singleton.
#[derive(Clone)]
pub struct Store {
    pool: sqlx::PgPool,
    query_timeout: Duration,
}

impl Store {
    pub async fn connect(
        db_url: &str,
        max_connections: u32,
        query_timeout: Duration,
    ) -> Result<Self, ServiceError> {
        let pool = tokio::time::timeout(
            Duration::from_secs(2),
            PgPoolOptions::new()
                .max_connections(max_connections)
                .connect(db_url),
        )
        .await
        .map_err(|_| ServiceError::internal("database connect timed out"))?
        .map_err(|err| ServiceError::internal(format!("failed to connect to database: {}", err)))?;

        Ok(Self {
            pool,
            query_timeout,
        })
    }

    pub async fn connect_and_migrate(
        db_url: &str,
        max_connections: u32,
        query_timeout: Duration,
    ) -> Result<Self, ServiceError> {
        let store = Self::connect(db_url, max_connections, query_timeout).await?;
        store.migrate().await?;
        Ok(store)
    }

    pub async fn migrate(&self) -> Result<(), ServiceError> {
        tokio::time::timeout(Duration::from_secs(10), migrate(&self.pool))
            .await
            .map_err(|_| ServiceError::internal("migration timed out"))?
            .map_err(|err| ServiceError::internal(format!("migration failed: {}", err)))?;
        Ok(())
    }

    pub async fn ping(&self) -> Result<(), ServiceError> {
        self.run(sqlx::query("SELECT 1").execute(&self.pool))
            .await?;
        Ok(())
    }

    pub fn pool(&self) -> &sqlx::PgPool {
        &self.pool
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    /// Every query goes through here: bounded by the configured timeout,
    /// with storage-level violations translated into the domain taxonomy.
    pub(crate) async fn run<T, F>(&self, fut: F) -> Result<T, ServiceError>
    where
        F: Future<Output = Result<T, sqlx::Error>>,
    {
        tokio::time::timeout(self.query_timeout, fut)
            .await
            .map_err(|_| ServiceError::internal("database operation timed out"))?
            .map_err(consistency::map_db_error)
    }
}

pub async fn migrate(pool: &sqlx::PgPool) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("./migrations").run(pool).await
}
