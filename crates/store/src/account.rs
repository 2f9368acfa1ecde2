use mediq_contracts::{AccountId, RoleSet, ServiceError};
use sqlx::Row;
use sqlx::postgres::PgRow;

use crate::Store;

/// Full identity record, including the stored hash. Never serialized as-is;
/// the API layer maps it to an exposed shape without the hash.
#[derive(Debug, Clone)]
pub struct AccountRecord {
    pub id: AccountId,
    pub email: String,
    pub password_hash: String,
    pub roles: RoleSet,
}

pub(crate) fn account_from_row(row: &PgRow) -> AccountRecord {
    AccountRecord {
        id: row.get("id"),
        email: row.get("email"),
        password_hash: row.get("password_hash"),
        roles: RoleSet::from_bits(row.get::<i16, _>("roles") as u8),
    }
}

impl Store {
    /// Email compare is case-sensitive, exactly as stored.
    pub async fn find_account_by_email(
        &self,
        email: &str,
    ) -> Result<Option<AccountRecord>, ServiceError> {
        let row = self
            .run(
                sqlx::query("SELECT id, email, password_hash, roles FROM accounts WHERE email = $1")
                    .bind(email)
                    .fetch_optional(&self.pool),
            )
            .await?;
        Ok(row.as_ref().map(account_from_row))
    }

    pub async fn find_account(&self, id: AccountId) -> Result<Option<AccountRecord>, ServiceError> {
        let row = self
            .run(
                sqlx::query("SELECT id, email, password_hash, roles FROM accounts WHERE id = $1")
                    .bind(id)
                    .fetch_optional(&self.pool),
            )
            .await?;
        Ok(row.as_ref().map(account_from_row))
    }

    pub async fn list_accounts(&self) -> Result<Vec<AccountRecord>, ServiceError> {
        let rows = self
            .run(
                sqlx::query("SELECT id, email, password_hash, roles FROM accounts ORDER BY id")
                    .fetch_all(&self.pool),
            )
            .await?;
        Ok(rows.iter().map(account_from_row).collect())
    }

    /// The explicit administrative role-set update: the only mutation of an
    /// account's role set. Callers validate the tags before this point.
    pub async fn update_account_roles(
        &self,
        id: AccountId,
        roles: RoleSet,
    ) -> Result<bool, ServiceError> {
        let result = self
            .run(
                sqlx::query("UPDATE accounts SET roles = $1 WHERE id = $2")
                    .bind(roles.bits() as i16)
                    .bind(id)
                    .execute(&self.pool),
            )
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Profiles and appointments cascade at the storage boundary.
    pub async fn delete_account(&self, id: AccountId) -> Result<bool, ServiceError> {
        let result = self
            .run(
                sqlx::query("DELETE FROM accounts WHERE id = $1")
                    .bind(id)
                    .execute(&self.pool),
            )
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
