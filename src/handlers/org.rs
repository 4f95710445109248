// src/handlers/org.rs

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};

use crate::{
    common::{
        db_utils::begin_request_transaction,
        error::{ApiError, AppError},
    },
    config::AppState,
    middleware::{i18n::Locale, tenancy::TenantContext},
    models::org::{OrgMember, Organization},
};

// GET /api/org
#[utoipa::path(
    get,
    path = "/api/org",
    tag = "Organization",
    responses(
        (status = 200, description = "Organização ativa do token", body = Organization),
        (status = 404, description = "Organização não encontrada")
    ),
    security(("api_jwt" = []))
)]
pub async fn get_current_org(
    State(app_state): State<AppState>,
    locale: Locale,
    tenant: TenantContext,
) -> Result<impl IntoResponse, ApiError> {
    let mut tx = begin_request_transaction(&app_state)
        .await
        .map_err(|e| e.to_api_error(&locale, &app_state.i18n_store))?;

    let org = app_state
        .org_service
        .get_org(&mut *tx, tenant.0)
        .await
        .map_err(|e| e.to_api_error(&locale, &app_state.i18n_store))?;

    tx.commit()
        .await
        .map_err(|e| AppError::from(e).to_api_error(&locale, &app_state.i18n_store))?;

    Ok((StatusCode::OK, Json(org)))
}

// GET /api/org/members
#[utoipa::path(
    get,
    path = "/api/org/members",
    tag = "Organization",
    responses((status = 200, description = "Membros com e-mail, nome e papel", body = Vec<OrgMember>)),
    security(("api_jwt" = []))
)]
pub async fn list_members(
    State(app_state): State<AppState>,
    locale: Locale,
    tenant: TenantContext,
) -> Result<impl IntoResponse, ApiError> {
    let mut tx = begin_request_transaction(&app_state)
        .await
        .map_err(|e| e.to_api_error(&locale, &app_state.i18n_store))?;

    let members = app_state
        .org_service
        .list_members(&mut *tx, tenant.0)
        .await
        .map_err(|e| e.to_api_error(&locale, &app_state.i18n_store))?;

    tx.commit()
        .await
        .map_err(|e| AppError::from(e).to_api_error(&locale, &app_state.i18n_store))?;

    Ok((StatusCode::OK, Json(members)))
}
