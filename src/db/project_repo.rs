// src/db/project_repo.rs

use sqlx::{Executor, Postgres};
use uuid::Uuid;

use crate::{
    common::error::AppError,
    models::project::{Project, ProjectRow},
};

const PROJECT_SELECT: &str = r#"
    SELECT
        p.id, p.org_id, p.administrative_node_id, p.name, p.description, p.status,
        p.created_at, p.updated_at,
        n.name AS node_name,
        l.name AS node_level_name
    FROM project p
    LEFT JOIN administrative_node n ON n.id = p.administrative_node_id
    LEFT JOIN administrative_level l ON l.id = n.level_id
"#;

#[derive(Clone, Default)]
pub struct ProjectRepository;

impl ProjectRepository {
    pub fn new() -> Self {
        Self
    }

    pub async fn list_for_org<'e, E>(&self, executor: E, org_id: Uuid) -> Result<Vec<Project>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let sql = format!("{} WHERE p.org_id = $1 ORDER BY p.created_at DESC", PROJECT_SELECT);
        let rows = sqlx::query_as::<_, ProjectRow>(&sql)
            .bind(org_id)
            .fetch_all(executor)
            .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    pub async fn find_for_org<'e, E>(
        &self,
        executor: E,
        org_id: Uuid,
        project_id: Uuid,
    ) -> Result<Option<Project>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let sql = format!("{} WHERE p.org_id = $1 AND p.id = $2", PROJECT_SELECT);
        let row = sqlx::query_as::<_, ProjectRow>(&sql)
            .bind(org_id)
            .bind(project_id)
            .fetch_optional(executor)
            .await?;
        Ok(row.map(Into::into))
    }

    /// Projetos ligados a qualquer um dos nós, do mais recente para o mais antigo.
    pub async fn list_for_nodes<'e, E>(
        &self,
        executor: E,
        node_ids: &[Uuid],
    ) -> Result<Vec<Project>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        if node_ids.is_empty() {
            return Ok(Vec::new());
        }

        let sql = format!(
            "{} WHERE p.administrative_node_id = ANY($1) ORDER BY p.created_at DESC",
            PROJECT_SELECT
        );
        let rows = sqlx::query_as::<_, ProjectRow>(&sql)
            .bind(node_ids)
            .fetch_all(executor)
            .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }
}
