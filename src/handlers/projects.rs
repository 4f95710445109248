// src/handlers/projects.rs

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use uuid::Uuid;

use crate::{
    common::{
        db_utils::begin_request_transaction,
        error::{ApiError, AppError},
    },
    config::AppState,
    middleware::{i18n::Locale, tenancy::TenantContext},
    models::project::Project,
};

// GET /api/projects
#[utoipa::path(
    get,
    path = "/api/projects",
    tag = "Projects",
    responses((status = 200, description = "Projetos da organização, mais recentes primeiro", body = Vec<Project>)),
    security(("api_jwt" = []))
)]
pub async fn list_projects(
    State(app_state): State<AppState>,
    locale: Locale,
    tenant: TenantContext,
) -> Result<impl IntoResponse, ApiError> {
    let mut tx = begin_request_transaction(&app_state)
        .await
        .map_err(|e| e.to_api_error(&locale, &app_state.i18n_store))?;

    let projects = app_state
        .project_service
        .list_projects(&mut *tx, tenant.0)
        .await
        .map_err(|e| e.to_api_error(&locale, &app_state.i18n_store))?;

    tx.commit()
        .await
        .map_err(|e| AppError::from(e).to_api_error(&locale, &app_state.i18n_store))?;

    Ok((StatusCode::OK, Json(projects)))
}

// GET /api/projects/{project_id}
#[utoipa::path(
    get,
    path = "/api/projects/{project_id}",
    tag = "Projects",
    responses(
        (status = 200, description = "Projeto com o resumo do nó", body = Project),
        (status = 404, description = "Projeto não encontrado")
    ),
    params(("project_id" = Uuid, Path, description = "ID do Projeto")),
    security(("api_jwt" = []))
)]
pub async fn get_project(
    State(app_state): State<AppState>,
    locale: Locale,
    tenant: TenantContext,
    Path(project_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let mut tx = begin_request_transaction(&app_state)
        .await
        .map_err(|e| e.to_api_error(&locale, &app_state.i18n_store))?;

    let project = app_state
        .project_service
        .get_project(&mut *tx, tenant.0, project_id)
        .await
        .map_err(|e| e.to_api_error(&locale, &app_state.i18n_store))?;

    tx.commit()
        .await
        .map_err(|e| AppError::from(e).to_api_error(&locale, &app_state.i18n_store))?;

    Ok((StatusCode::OK, Json(project)))
}
