// src/handlers/contracts.rs

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use uuid::Uuid;
use validator::Validate;

use crate::{
    common::{
        db_utils::begin_request_transaction,
        error::{ApiError, AppError},
    },
    config::AppState,
    handlers::administrative::MessageResponse,
    middleware::{
        auth::AuthenticatedUser,
        i18n::Locale,
        rbac::{PermContractsRead, PermContractsWrite, RequirePermission},
    },
    models::contract::{
        AssignManagerPayload, ContractDetail, ContractManagerCheck, ContractManagerDetail,
        CreateContractPayload, GovernmentContract, UpdateContractStatusPayload, UserContract,
    },
};

// =============================================================================
//  1. CONTRATOS
// =============================================================================

// POST /api/contracts
#[utoipa::path(
    post,
    path = "/api/contracts",
    tag = "Contracts",
    request_body = CreateContractPayload,
    responses(
        (status = 201, description = "Contrato criado com o escopo territorial", body = ContractDetail),
        (status = 400, description = "Payload inválido ou organização que não é Estado"),
        (status = 409, description = "Número de contrato já existe"),
        (status = 422, description = "Nó do escopo fora do Estado")
    ),
    security(("api_jwt" = []))
)]
pub async fn create_contract(
    State(app_state): State<AppState>,
    locale: Locale,
    user: AuthenticatedUser,
    _perm: RequirePermission<PermContractsWrite>,
    Json(payload): Json<CreateContractPayload>,
) -> Result<impl IntoResponse, ApiError> {
    payload
        .validate()
        .map_err(|e| AppError::ValidationError(e).to_api_error(&locale, &app_state.i18n_store))?;

    let mut tx = begin_request_transaction(&app_state)
        .await
        .map_err(|e| e.to_api_error(&locale, &app_state.i18n_store))?;

    let contract = app_state
        .contract_service
        .create_contract(&mut *tx, &user.0, &payload)
        .await
        .map_err(|e| e.to_api_error(&locale, &app_state.i18n_store))?;

    tx.commit()
        .await
        .map_err(|e| AppError::from(e).to_api_error(&locale, &app_state.i18n_store))?;

    Ok((StatusCode::CREATED, Json(contract)))
}

// GET /api/contracts/{contract_id}
#[utoipa::path(
    get,
    path = "/api/contracts/{contract_id}",
    tag = "Contracts",
    responses(
        (status = 200, description = "Contrato, Estado e escopo", body = ContractDetail),
        (status = 403, description = "Nem membro do Estado nem gestor do contrato"),
        (status = 404, description = "Contrato não encontrado")
    ),
    params(("contract_id" = Uuid, Path, description = "ID do Contrato")),
    security(("api_jwt" = []))
)]
pub async fn get_contract(
    State(app_state): State<AppState>,
    locale: Locale,
    user: AuthenticatedUser,
    _perm: RequirePermission<PermContractsRead>,
    Path(contract_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let mut tx = begin_request_transaction(&app_state)
        .await
        .map_err(|e| e.to_api_error(&locale, &app_state.i18n_store))?;

    let contract = app_state
        .contract_service
        .get_contract(&mut *tx, contract_id, &user.0)
        .await
        .map_err(|e| e.to_api_error(&locale, &app_state.i18n_store))?;

    tx.commit()
        .await
        .map_err(|e| AppError::from(e).to_api_error(&locale, &app_state.i18n_store))?;

    Ok((StatusCode::OK, Json(contract)))
}

// GET /api/contracts/org/{org_id}
#[utoipa::path(
    get,
    path = "/api/contracts/org/{org_id}",
    tag = "Contracts",
    responses(
        (status = 200, description = "Contratos em vigor do Estado", body = Vec<GovernmentContract>),
        (status = 403, description = "Sem acesso ao Estado")
    ),
    params(("org_id" = Uuid, Path, description = "ID do Estado")),
    security(("api_jwt" = []))
)]
pub async fn list_org_contracts(
    State(app_state): State<AppState>,
    locale: Locale,
    user: AuthenticatedUser,
    _perm: RequirePermission<PermContractsRead>,
    Path(org_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let mut tx = begin_request_transaction(&app_state)
        .await
        .map_err(|e| e.to_api_error(&locale, &app_state.i18n_store))?;

    let contracts = app_state
        .contract_service
        .list_org_contracts(&mut *tx, org_id, &user.0)
        .await
        .map_err(|e| e.to_api_error(&locale, &app_state.i18n_store))?;

    tx.commit()
        .await
        .map_err(|e| AppError::from(e).to_api_error(&locale, &app_state.i18n_store))?;

    Ok((StatusCode::OK, Json(contracts)))
}

// PUT /api/contracts/{contract_id}/status
#[utoipa::path(
    put,
    path = "/api/contracts/{contract_id}/status",
    tag = "Contracts",
    request_body = UpdateContractStatusPayload,
    responses(
        (status = 200, description = "Status atualizado", body = GovernmentContract),
        (status = 404, description = "Contrato não encontrado")
    ),
    params(("contract_id" = Uuid, Path, description = "ID do Contrato")),
    security(("api_jwt" = []))
)]
pub async fn update_contract_status(
    State(app_state): State<AppState>,
    locale: Locale,
    user: AuthenticatedUser,
    _perm: RequirePermission<PermContractsWrite>,
    Path(contract_id): Path<Uuid>,
    Json(payload): Json<UpdateContractStatusPayload>,
) -> Result<impl IntoResponse, ApiError> {
    let mut tx = begin_request_transaction(&app_state)
        .await
        .map_err(|e| e.to_api_error(&locale, &app_state.i18n_store))?;

    let contract = app_state
        .contract_service
        .update_status(&mut *tx, contract_id, &user.0, payload.status)
        .await
        .map_err(|e| e.to_api_error(&locale, &app_state.i18n_store))?;

    tx.commit()
        .await
        .map_err(|e| AppError::from(e).to_api_error(&locale, &app_state.i18n_store))?;

    Ok((StatusCode::OK, Json(contract)))
}

// GET /api/contracts/mine
#[utoipa::path(
    get,
    path = "/api/contracts/mine",
    tag = "Contracts",
    responses((status = 200, description = "Vínculos ativos do usuário como gestor", body = Vec<UserContract>)),
    security(("api_jwt" = []))
)]
pub async fn my_contracts(
    State(app_state): State<AppState>,
    locale: Locale,
    user: AuthenticatedUser,
    _perm: RequirePermission<PermContractsRead>,
) -> Result<impl IntoResponse, ApiError> {
    let mut tx = begin_request_transaction(&app_state)
        .await
        .map_err(|e| e.to_api_error(&locale, &app_state.i18n_store))?;

    let contracts = app_state
        .contract_service
        .user_contracts(&mut *tx, &user.0)
        .await
        .map_err(|e| e.to_api_error(&locale, &app_state.i18n_store))?;

    tx.commit()
        .await
        .map_err(|e| AppError::from(e).to_api_error(&locale, &app_state.i18n_store))?;

    Ok((StatusCode::OK, Json(contracts)))
}

// =============================================================================
//  2. GESTORES
// =============================================================================

// POST /api/contracts/{contract_id}/managers
#[utoipa::path(
    post,
    path = "/api/contracts/{contract_id}/managers",
    tag = "Contracts",
    request_body = AssignManagerPayload,
    responses(
        (status = 201, description = "Gestor nomeado", body = ContractManagerDetail),
        (status = 404, description = "Contrato ou usuário não encontrado"),
        (status = 409, description = "Já é gestor ativo ou já existe um principal")
    ),
    params(("contract_id" = Uuid, Path, description = "ID do Contrato")),
    security(("api_jwt" = []))
)]
pub async fn assign_manager(
    State(app_state): State<AppState>,
    locale: Locale,
    user: AuthenticatedUser,
    _perm: RequirePermission<PermContractsWrite>,
    Path(contract_id): Path<Uuid>,
    Json(payload): Json<AssignManagerPayload>,
) -> Result<impl IntoResponse, ApiError> {
    payload
        .validate()
        .map_err(|e| AppError::ValidationError(e).to_api_error(&locale, &app_state.i18n_store))?;

    let mut tx = begin_request_transaction(&app_state)
        .await
        .map_err(|e| e.to_api_error(&locale, &app_state.i18n_store))?;

    let manager = app_state
        .contract_service
        .assign_manager(&mut *tx, contract_id, &user.0, &payload)
        .await
        .map_err(|e| e.to_api_error(&locale, &app_state.i18n_store))?;

    tx.commit()
        .await
        .map_err(|e| AppError::from(e).to_api_error(&locale, &app_state.i18n_store))?;

    Ok((StatusCode::CREATED, Json(manager)))
}

// GET /api/contracts/{contract_id}/managers
#[utoipa::path(
    get,
    path = "/api/contracts/{contract_id}/managers",
    tag = "Contracts",
    responses((status = 200, description = "Gestores ativos, o principal primeiro", body = Vec<ContractManagerDetail>)),
    params(("contract_id" = Uuid, Path, description = "ID do Contrato")),
    security(("api_jwt" = []))
)]
pub async fn list_managers(
    State(app_state): State<AppState>,
    locale: Locale,
    user: AuthenticatedUser,
    _perm: RequirePermission<PermContractsRead>,
    Path(contract_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let mut tx = begin_request_transaction(&app_state)
        .await
        .map_err(|e| e.to_api_error(&locale, &app_state.i18n_store))?;

    let managers = app_state
        .contract_service
        .list_managers(&mut *tx, contract_id, &user.0)
        .await
        .map_err(|e| e.to_api_error(&locale, &app_state.i18n_store))?;

    tx.commit()
        .await
        .map_err(|e| AppError::from(e).to_api_error(&locale, &app_state.i18n_store))?;

    Ok((StatusCode::OK, Json(managers)))
}

// GET /api/contracts/{contract_id}/check-manager
#[utoipa::path(
    get,
    path = "/api/contracts/{contract_id}/check-manager",
    tag = "Contracts",
    responses((status = 200, description = "Se o usuário é gestor ativo do contrato", body = ContractManagerCheck)),
    params(("contract_id" = Uuid, Path, description = "ID do Contrato")),
    security(("api_jwt" = []))
)]
pub async fn check_manager(
    State(app_state): State<AppState>,
    locale: Locale,
    user: AuthenticatedUser,
    _perm: RequirePermission<PermContractsRead>,
    Path(contract_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let mut tx = begin_request_transaction(&app_state)
        .await
        .map_err(|e| e.to_api_error(&locale, &app_state.i18n_store))?;

    let is_manager = app_state
        .contract_service
        .is_manager(&mut *tx, contract_id, &user.0)
        .await
        .map_err(|e| e.to_api_error(&locale, &app_state.i18n_store))?;

    tx.commit()
        .await
        .map_err(|e| AppError::from(e).to_api_error(&locale, &app_state.i18n_store))?;

    Ok((StatusCode::OK, Json(ContractManagerCheck { is_manager })))
}

// GET /api/contracts/managers/{manager_id}
#[utoipa::path(
    get,
    path = "/api/contracts/managers/{manager_id}",
    tag = "Contracts",
    responses(
        (status = 200, description = "Gestor com usuário, contrato e nó de escopo", body = ContractManagerDetail),
        (status = 404, description = "Gestor não encontrado")
    ),
    params(("manager_id" = Uuid, Path, description = "ID do Gestor")),
    security(("api_jwt" = []))
)]
pub async fn get_manager(
    State(app_state): State<AppState>,
    locale: Locale,
    user: AuthenticatedUser,
    _perm: RequirePermission<PermContractsRead>,
    Path(manager_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let mut tx = begin_request_transaction(&app_state)
        .await
        .map_err(|e| e.to_api_error(&locale, &app_state.i18n_store))?;

    let manager = app_state
        .contract_service
        .get_manager(&mut *tx, manager_id, &user.0)
        .await
        .map_err(|e| e.to_api_error(&locale, &app_state.i18n_store))?;

    tx.commit()
        .await
        .map_err(|e| AppError::from(e).to_api_error(&locale, &app_state.i18n_store))?;

    Ok((StatusCode::OK, Json(manager)))
}

// DELETE /api/contracts/managers/{manager_id}
#[utoipa::path(
    delete,
    path = "/api/contracts/managers/{manager_id}",
    tag = "Contracts",
    responses(
        (status = 200, description = "Gestor desativado", body = MessageResponse),
        (status = 404, description = "Gestor não encontrado")
    ),
    params(("manager_id" = Uuid, Path, description = "ID do Gestor")),
    security(("api_jwt" = []))
)]
pub async fn remove_manager(
    State(app_state): State<AppState>,
    locale: Locale,
    user: AuthenticatedUser,
    _perm: RequirePermission<PermContractsWrite>,
    Path(manager_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let mut tx = begin_request_transaction(&app_state)
        .await
        .map_err(|e| e.to_api_error(&locale, &app_state.i18n_store))?;

    app_state
        .contract_service
        .remove_manager(&mut *tx, manager_id, &user.0)
        .await
        .map_err(|e| e.to_api_error(&locale, &app_state.i18n_store))?;

    tx.commit()
        .await
        .map_err(|e| AppError::from(e).to_api_error(&locale, &app_state.i18n_store))?;

    let message = app_state.i18n_store.translate(&locale.0, "contract.manager_removed", &[]);
    Ok((StatusCode::OK, Json(MessageResponse { message })))
}
