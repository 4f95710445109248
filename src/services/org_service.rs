// src/services/org_service.rs

use sqlx::PgConnection;
use uuid::Uuid;

use crate::{
    common::error::AppError,
    db::OrgRepository,
    models::org::{OrgMember, Organization},
};

#[derive(Clone)]
pub struct OrgService {
    repo: OrgRepository,
}

impl OrgService {
    pub fn new(repo: OrgRepository) -> Self {
        Self { repo }
    }

    pub async fn get_org(&self, conn: &mut PgConnection, org_id: Uuid) -> Result<Organization, AppError> {
        self.repo
            .find_org(&mut *conn, org_id)
            .await?
            .ok_or(AppError::OrgNotFound)
    }

    pub async fn list_members(&self, conn: &mut PgConnection, org_id: Uuid) -> Result<Vec<OrgMember>, AppError> {
        self.repo.list_members(&mut *conn, org_id).await
    }
}
