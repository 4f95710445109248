// src/db/org_repo.rs

use sqlx::{Executor, PgPool, Postgres};
use uuid::Uuid;

use crate::{
    common::error::AppError,
    models::org::{OrgMember, Organization},
};

#[derive(Clone)]
pub struct OrgRepository {
    pool: PgPool,
}

impl OrgRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Papel do usuário na organização do token. `None` = não é membro.
    /// Roda direto na pool: é chamado pelo middleware, antes da transação da requisição.
    pub async fn find_membership_role(
        &self,
        user_id: Uuid,
        org_id: Uuid,
    ) -> Result<Option<String>, AppError> {
        let role = sqlx::query_scalar::<_, String>(
            "SELECT role FROM membership WHERE user_id = $1 AND org_id = $2",
        )
            .bind(user_id)
            .bind(org_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(role)
    }

    pub async fn find_org<'e, E>(
        &self,
        executor: E,
        org_id: Uuid,
    ) -> Result<Option<Organization>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let org = sqlx::query_as::<_, Organization>("SELECT * FROM org WHERE id = $1")
            .bind(org_id)
            .fetch_optional(executor)
            .await?;
        Ok(org)
    }

    /// Só devolve a organização se ela for um Estado (is_state = true).
    pub async fn find_state<'e, E>(
        &self,
        executor: E,
        state_id: Uuid,
    ) -> Result<Option<Organization>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let state = sqlx::query_as::<_, Organization>(
            "SELECT * FROM org WHERE id = $1 AND is_state = true",
        )
            .bind(state_id)
            .fetch_optional(executor)
            .await?;
        Ok(state)
    }

    pub async fn list_members<'e, E>(
        &self,
        executor: E,
        org_id: Uuid,
    ) -> Result<Vec<OrgMember>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let members = sqlx::query_as::<_, OrgMember>(
            r#"
            SELECT m.user_id, u.email, u.full_name, m.role, m.created_at
            FROM membership m
            JOIN users u ON u.id = m.user_id
            WHERE m.org_id = $1
            ORDER BY u.email ASC
            "#,
        )
            .bind(org_id)
            .fetch_all(executor)
            .await?;
        Ok(members)
    }

    pub async fn user_exists<'e, E>(&self, executor: E, user_id: Uuid) -> Result<bool, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let exists = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS (SELECT 1 FROM users WHERE id = $1)",
        )
            .bind(user_id)
            .fetch_one(executor)
            .await?;
        Ok(exists)
    }
}
