//! SQLite principal repository implementation.

use skillrun_core::repository::principal::PrincipalRepository;
use skillrun_types::error::RepositoryError;
use skillrun_types::principal::{Principal, PrincipalId};
use sqlx::Row;

use super::pool::DatabasePool;
use super::{format_datetime, parse_datetime, parse_uuid, query_error, write_error};

/// SQLite-backed implementation of `PrincipalRepository`.
pub struct SqlitePrincipalRepository {
    pool: DatabasePool,
}

impl SqlitePrincipalRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

struct PrincipalRow {
    id: String,
    name: String,
    created_at: String,
}

impl PrincipalRow {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            created_at: row.try_get("created_at")?,
        })
    }

    fn into_principal(self) -> Result<Principal, RepositoryError> {
        Ok(Principal {
            id: PrincipalId(parse_uuid(&self.id)?),
            name: self.name,
            created_at: parse_datetime(&self.created_at)?,
        })
    }
}

fn decode(row: &sqlx::sqlite::SqliteRow) -> Result<Principal, RepositoryError> {
    PrincipalRow::from_row(row)
        .map_err(query_error)?
        .into_principal()
}

impl PrincipalRepository for SqlitePrincipalRepository {
    async fn create(&self, principal: &Principal, key_hash: &str) -> Result<(), RepositoryError> {
        sqlx::query("INSERT INTO principals (id, name, key_hash, created_at) VALUES (?, ?, ?, ?)")
            .bind(principal.id.to_string())
            .bind(&principal.name)
            .bind(key_hash)
            .bind(format_datetime(&principal.created_at))
            .execute(&self.pool.writer)
            .await
            .map_err(write_error)?;
        Ok(())
    }

    async fn get(&self, id: &PrincipalId) -> Result<Option<Principal>, RepositoryError> {
        let row = sqlx::query("SELECT id, name, created_at FROM principals WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool.reader)
            .await
            .map_err(query_error)?;
        row.as_ref().map(decode).transpose()
    }

    async fn find_by_key_hash(&self, key_hash: &str) -> Result<Option<Principal>, RepositoryError> {
        let row = sqlx::query("SELECT id, name, created_at FROM principals WHERE key_hash = ?")
            .bind(key_hash)
            .fetch_optional(&self.pool.reader)
            .await
            .map_err(query_error)?;
        row.as_ref().map(decode).transpose()
    }

    async fn list(&self) -> Result<Vec<Principal>, RepositoryError> {
        let rows = sqlx::query("SELECT id, name, created_at FROM principals ORDER BY name")
            .fetch_all(&self.pool.reader)
            .await
            .map_err(query_error)?;
        rows.iter().map(decode).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sqlite::test_support::test_pool;

    #[tokio::test]
    async fn test_create_and_lookup_by_key_hash() {
        let repo = SqlitePrincipalRepository::new(test_pool().await);
        let alice = Principal::new("alice");
        repo.create(&alice, "abc123").await.unwrap();

        let found = repo.find_by_key_hash("abc123").await.unwrap().unwrap();
        assert_eq!(found.id, alice.id);
        assert_eq!(found.name, "alice");
        assert!(repo.find_by_key_hash("nope").await.unwrap().is_none());
        assert_eq!(repo.get(&alice.id).await.unwrap().unwrap().name, "alice");
    }

    #[tokio::test]
    async fn test_duplicate_name_conflicts() {
        let repo = SqlitePrincipalRepository::new(test_pool().await);
        repo.create(&Principal::new("alice"), "k1").await.unwrap();
        let err = repo.create(&Principal::new("alice"), "k2").await.unwrap_err();
        assert!(matches!(err, RepositoryError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_list_orders_by_name() {
        let repo = SqlitePrincipalRepository::new(test_pool().await);
        repo.create(&Principal::new("zoe"), "k1").await.unwrap();
        repo.create(&Principal::new("adam"), "k2").await.unwrap();
        let names: Vec<String> = repo.list().await.unwrap().into_iter().map(|p| p.name).collect();
        assert_eq!(names, vec!["adam", "zoe"]);
    }
}
