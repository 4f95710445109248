// src/services/project_service.rs

use sqlx::PgConnection;
use uuid::Uuid;

use crate::{common::error::AppError, db::ProjectRepository, models::project::Project};

#[derive(Clone)]
pub struct ProjectService {
    repo: ProjectRepository,
}

impl ProjectService {
    pub fn new(repo: ProjectRepository) -> Self {
        Self { repo }
    }

    pub async fn list_projects(&self, conn: &mut PgConnection, org_id: Uuid) -> Result<Vec<Project>, AppError> {
        self.repo.list_for_org(&mut *conn, org_id).await
    }

    /// Projeto de outra organização responde como inexistente.
    pub async fn get_project(
        &self,
        conn: &mut PgConnection,
        org_id: Uuid,
        project_id: Uuid,
    ) -> Result<Project, AppError> {
        self.repo
            .find_for_org(&mut *conn, org_id, project_id)
            .await?
            .ok_or(AppError::ProjectNotFound)
    }
}
