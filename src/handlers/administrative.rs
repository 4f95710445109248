// src/handlers/administrative.rs

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;
use validator::Validate;

use crate::{
    common::{
        db_utils::begin_request_transaction,
        error::{ApiError, AppError},
    },
    config::AppState,
    middleware::{
        auth::AuthenticatedUser,
        i18n::Locale,
        rbac::{PermAdministrativeRead, PermAdministrativeWrite, RequirePermission},
    },
    models::{
        administrative::{
            AdministrativeLevel, AdministrativeNodeDetail, AdministrativeNodeWithLevel,
            AdministrativeTreeNode, AdministrativeUserAssignment, AssignUserPayload,
            CreateLevelPayload, CreateNodePayload, UpdateLevelPayload, UpdateNodePayload,
            UserNodeAssignment,
        },
        project::Project,
    },
};

#[derive(Debug, Serialize, ToSchema)]
pub struct MessageResponse {
    #[schema(example = "Administrative node deleted.")]
    pub message: String,
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct NodeProjectsQuery {
    /// Inclui os projetos de toda a subárvore ativa
    #[serde(rename = "includeChildren")]
    pub include_children: Option<bool>,
}

// =============================================================================
//  1. NÍVEIS
// =============================================================================

// GET /api/administrative/states/{state_id}/levels
#[utoipa::path(
    get,
    path = "/api/administrative/states/{state_id}/levels",
    tag = "Administrative",
    responses(
        (status = 200, description = "Níveis ativos ordenados por level_order", body = Vec<AdministrativeLevel>),
        (status = 403, description = "Sem acesso ao Estado")
    ),
    params(("state_id" = Uuid, Path, description = "ID do Estado")),
    security(("api_jwt" = []))
)]
pub async fn list_levels(
    State(app_state): State<AppState>,
    locale: Locale,
    user: AuthenticatedUser,
    _perm: RequirePermission<PermAdministrativeRead>,
    Path(state_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let mut tx = begin_request_transaction(&app_state)
        .await
        .map_err(|e| e.to_api_error(&locale, &app_state.i18n_store))?;

    let levels = app_state
        .administrative_service
        .list_levels(&mut *tx, state_id, &user.0)
        .await
        .map_err(|e| e.to_api_error(&locale, &app_state.i18n_store))?;

    tx.commit()
        .await
        .map_err(|e| AppError::from(e).to_api_error(&locale, &app_state.i18n_store))?;

    Ok((StatusCode::OK, Json(levels)))
}

// POST /api/administrative/states/{state_id}/levels
#[utoipa::path(
    post,
    path = "/api/administrative/states/{state_id}/levels",
    tag = "Administrative",
    request_body = CreateLevelPayload,
    responses(
        (status = 201, description = "Nível criado", body = AdministrativeLevel),
        (status = 400, description = "Payload inválido"),
        (status = 409, description = "Código ou ordem já existem no Estado")
    ),
    params(("state_id" = Uuid, Path, description = "ID do Estado")),
    security(("api_jwt" = []))
)]
pub async fn create_level(
    State(app_state): State<AppState>,
    locale: Locale,
    user: AuthenticatedUser,
    _perm: RequirePermission<PermAdministrativeWrite>,
    Path(state_id): Path<Uuid>,
    Json(payload): Json<CreateLevelPayload>,
) -> Result<impl IntoResponse, ApiError> {
    payload
        .validate()
        .map_err(|e| AppError::ValidationError(e).to_api_error(&locale, &app_state.i18n_store))?;

    let mut tx = begin_request_transaction(&app_state)
        .await
        .map_err(|e| e.to_api_error(&locale, &app_state.i18n_store))?;

    let level = app_state
        .administrative_service
        .create_level(&mut *tx, state_id, &user.0, &payload)
        .await
        .map_err(|e| e.to_api_error(&locale, &app_state.i18n_store))?;

    tx.commit()
        .await
        .map_err(|e| AppError::from(e).to_api_error(&locale, &app_state.i18n_store))?;

    Ok((StatusCode::CREATED, Json(level)))
}

// PUT /api/administrative/states/{state_id}/levels/{level_id}
#[utoipa::path(
    put,
    path = "/api/administrative/states/{state_id}/levels/{level_id}",
    tag = "Administrative",
    request_body = UpdateLevelPayload,
    responses(
        (status = 200, description = "Nível atualizado", body = AdministrativeLevel),
        (status = 404, description = "Nível não encontrado")
    ),
    params(
        ("state_id" = Uuid, Path, description = "ID do Estado"),
        ("level_id" = Uuid, Path, description = "ID do Nível")
    ),
    security(("api_jwt" = []))
)]
pub async fn update_level(
    State(app_state): State<AppState>,
    locale: Locale,
    user: AuthenticatedUser,
    _perm: RequirePermission<PermAdministrativeWrite>,
    Path((state_id, level_id)): Path<(Uuid, Uuid)>,
    Json(payload): Json<UpdateLevelPayload>,
) -> Result<impl IntoResponse, ApiError> {
    payload
        .validate()
        .map_err(|e| AppError::ValidationError(e).to_api_error(&locale, &app_state.i18n_store))?;

    let mut tx = begin_request_transaction(&app_state)
        .await
        .map_err(|e| e.to_api_error(&locale, &app_state.i18n_store))?;

    let level = app_state
        .administrative_service
        .update_level(&mut *tx, state_id, level_id, &user.0, &payload)
        .await
        .map_err(|e| e.to_api_error(&locale, &app_state.i18n_store))?;

    tx.commit()
        .await
        .map_err(|e| AppError::from(e).to_api_error(&locale, &app_state.i18n_store))?;

    Ok((StatusCode::OK, Json(level)))
}

// DELETE /api/administrative/states/{state_id}/levels/{level_id}
#[utoipa::path(
    delete,
    path = "/api/administrative/states/{state_id}/levels/{level_id}",
    tag = "Administrative",
    responses(
        (status = 200, description = "Nível removido", body = MessageResponse),
        (status = 403, description = "Nível ainda usado por nós")
    ),
    params(
        ("state_id" = Uuid, Path, description = "ID do Estado"),
        ("level_id" = Uuid, Path, description = "ID do Nível")
    ),
    security(("api_jwt" = []))
)]
pub async fn delete_level(
    State(app_state): State<AppState>,
    locale: Locale,
    user: AuthenticatedUser,
    _perm: RequirePermission<PermAdministrativeWrite>,
    Path((state_id, level_id)): Path<(Uuid, Uuid)>,
) -> Result<impl IntoResponse, ApiError> {
    let mut tx = begin_request_transaction(&app_state)
        .await
        .map_err(|e| e.to_api_error(&locale, &app_state.i18n_store))?;

    app_state
        .administrative_service
        .delete_level(&mut *tx, state_id, level_id, &user.0)
        .await
        .map_err(|e| e.to_api_error(&locale, &app_state.i18n_store))?;

    tx.commit()
        .await
        .map_err(|e| AppError::from(e).to_api_error(&locale, &app_state.i18n_store))?;

    let message = app_state.i18n_store.translate(&locale.0, "level.deleted", &[]);
    Ok((StatusCode::OK, Json(MessageResponse { message })))
}

// =============================================================================
//  2. ÁRVORE E NÓS
// =============================================================================

// GET /api/administrative/states/{state_id}/tree
#[utoipa::path(
    get,
    path = "/api/administrative/states/{state_id}/tree",
    tag = "Administrative",
    responses(
        (status = 200, description = "Floresta de nós ativos com filhos, profundidade e caminho", body = Vec<AdministrativeTreeNode>),
        (status = 403, description = "Sem acesso ao Estado")
    ),
    params(("state_id" = Uuid, Path, description = "ID do Estado")),
    security(("api_jwt" = []))
)]
pub async fn get_tree(
    State(app_state): State<AppState>,
    locale: Locale,
    user: AuthenticatedUser,
    _perm: RequirePermission<PermAdministrativeRead>,
    Path(state_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let mut tx = begin_request_transaction(&app_state)
        .await
        .map_err(|e| e.to_api_error(&locale, &app_state.i18n_store))?;

    let tree = app_state
        .administrative_service
        .get_tree(&mut *tx, state_id, &user.0)
        .await
        .map_err(|e| e.to_api_error(&locale, &app_state.i18n_store))?;

    tx.commit()
        .await
        .map_err(|e| AppError::from(e).to_api_error(&locale, &app_state.i18n_store))?;

    Ok((StatusCode::OK, Json(tree)))
}

// POST /api/administrative/states/{state_id}/nodes
#[utoipa::path(
    post,
    path = "/api/administrative/states/{state_id}/nodes",
    tag = "Administrative",
    request_body = CreateNodePayload,
    responses(
        (status = 201, description = "Nó criado", body = AdministrativeNodeWithLevel),
        (status = 404, description = "Nível ou pai não encontrado"),
        (status = 422, description = "Posição inválida na hierarquia")
    ),
    params(("state_id" = Uuid, Path, description = "ID do Estado")),
    security(("api_jwt" = []))
)]
pub async fn create_node(
    State(app_state): State<AppState>,
    locale: Locale,
    user: AuthenticatedUser,
    _perm: RequirePermission<PermAdministrativeWrite>,
    Path(state_id): Path<Uuid>,
    Json(payload): Json<CreateNodePayload>,
) -> Result<impl IntoResponse, ApiError> {
    payload
        .validate()
        .map_err(|e| AppError::ValidationError(e).to_api_error(&locale, &app_state.i18n_store))?;

    let mut tx = begin_request_transaction(&app_state)
        .await
        .map_err(|e| e.to_api_error(&locale, &app_state.i18n_store))?;

    let node = app_state
        .administrative_service
        .create_node(&mut *tx, state_id, &user.0, &payload)
        .await
        .map_err(|e| e.to_api_error(&locale, &app_state.i18n_store))?;

    tx.commit()
        .await
        .map_err(|e| AppError::from(e).to_api_error(&locale, &app_state.i18n_store))?;

    Ok((StatusCode::CREATED, Json(node)))
}

// GET /api/administrative/nodes/{node_id}
#[utoipa::path(
    get,
    path = "/api/administrative/nodes/{node_id}",
    tag = "Administrative",
    responses(
        (status = 200, description = "Nó com nível e resumo do pai", body = AdministrativeNodeDetail),
        (status = 403, description = "Nó fora do escopo do usuário"),
        (status = 404, description = "Nó não encontrado")
    ),
    params(("node_id" = Uuid, Path, description = "ID do Nó")),
    security(("api_jwt" = []))
)]
pub async fn get_node(
    State(app_state): State<AppState>,
    locale: Locale,
    user: AuthenticatedUser,
    _perm: RequirePermission<PermAdministrativeRead>,
    Path(node_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let mut tx = begin_request_transaction(&app_state)
        .await
        .map_err(|e| e.to_api_error(&locale, &app_state.i18n_store))?;

    let node = app_state
        .administrative_service
        .get_node(&mut *tx, node_id, &user.0)
        .await
        .map_err(|e| e.to_api_error(&locale, &app_state.i18n_store))?;

    tx.commit()
        .await
        .map_err(|e| AppError::from(e).to_api_error(&locale, &app_state.i18n_store))?;

    Ok((StatusCode::OK, Json(node)))
}

// PUT /api/administrative/nodes/{node_id}
#[utoipa::path(
    put,
    path = "/api/administrative/nodes/{node_id}",
    tag = "Administrative",
    request_body = UpdateNodePayload,
    responses(
        (status = 200, description = "Nó atualizado", body = AdministrativeNodeWithLevel),
        (status = 422, description = "Movimento inválido (ciclo ou nível)")
    ),
    params(("node_id" = Uuid, Path, description = "ID do Nó")),
    security(("api_jwt" = []))
)]
pub async fn update_node(
    State(app_state): State<AppState>,
    locale: Locale,
    user: AuthenticatedUser,
    _perm: RequirePermission<PermAdministrativeWrite>,
    Path(node_id): Path<Uuid>,
    Json(payload): Json<UpdateNodePayload>,
) -> Result<impl IntoResponse, ApiError> {
    payload
        .validate()
        .map_err(|e| AppError::ValidationError(e).to_api_error(&locale, &app_state.i18n_store))?;

    let mut tx = begin_request_transaction(&app_state)
        .await
        .map_err(|e| e.to_api_error(&locale, &app_state.i18n_store))?;

    let node = app_state
        .administrative_service
        .update_node(&mut *tx, node_id, &user.0, &payload)
        .await
        .map_err(|e| e.to_api_error(&locale, &app_state.i18n_store))?;

    tx.commit()
        .await
        .map_err(|e| AppError::from(e).to_api_error(&locale, &app_state.i18n_store))?;

    Ok((StatusCode::OK, Json(node)))
}

// DELETE /api/administrative/nodes/{node_id}
#[utoipa::path(
    delete,
    path = "/api/administrative/nodes/{node_id}",
    tag = "Administrative",
    responses(
        (status = 200, description = "Nó desativado", body = MessageResponse),
        (status = 403, description = "Nó possui filhos ativos")
    ),
    params(("node_id" = Uuid, Path, description = "ID do Nó")),
    security(("api_jwt" = []))
)]
pub async fn delete_node(
    State(app_state): State<AppState>,
    locale: Locale,
    user: AuthenticatedUser,
    _perm: RequirePermission<PermAdministrativeWrite>,
    Path(node_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let mut tx = begin_request_transaction(&app_state)
        .await
        .map_err(|e| e.to_api_error(&locale, &app_state.i18n_store))?;

    app_state
        .administrative_service
        .delete_node(&mut *tx, node_id, &user.0)
        .await
        .map_err(|e| e.to_api_error(&locale, &app_state.i18n_store))?;

    tx.commit()
        .await
        .map_err(|e| AppError::from(e).to_api_error(&locale, &app_state.i18n_store))?;

    let message = app_state.i18n_store.translate(&locale.0, "node.deleted", &[]);
    Ok((StatusCode::OK, Json(MessageResponse { message })))
}

// GET /api/administrative/nodes/{node_id}/children
#[utoipa::path(
    get,
    path = "/api/administrative/nodes/{node_id}/children",
    tag = "Administrative",
    responses(
        (status = 200, description = "Filhos diretos ativos", body = Vec<AdministrativeNodeWithLevel>),
        (status = 404, description = "Nó inexistente ou desativado")
    ),
    params(("node_id" = Uuid, Path, description = "ID do Nó")),
    security(("api_jwt" = []))
)]
pub async fn get_children(
    State(app_state): State<AppState>,
    locale: Locale,
    user: AuthenticatedUser,
    _perm: RequirePermission<PermAdministrativeRead>,
    Path(node_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let mut tx = begin_request_transaction(&app_state)
        .await
        .map_err(|e| e.to_api_error(&locale, &app_state.i18n_store))?;

    let children = app_state
        .administrative_service
        .get_children(&mut *tx, node_id, &user.0)
        .await
        .map_err(|e| e.to_api_error(&locale, &app_state.i18n_store))?;

    tx.commit()
        .await
        .map_err(|e| AppError::from(e).to_api_error(&locale, &app_state.i18n_store))?;

    Ok((StatusCode::OK, Json(children)))
}

// GET /api/administrative/nodes/{node_id}/hierarchy
#[utoipa::path(
    get,
    path = "/api/administrative/nodes/{node_id}/hierarchy",
    tag = "Administrative",
    responses(
        (status = 200, description = "Cadeia de ancestrais, da raiz até o nó", body = Vec<AdministrativeNodeWithLevel>),
        (status = 404, description = "Nó inexistente ou desativado")
    ),
    params(("node_id" = Uuid, Path, description = "ID do Nó")),
    security(("api_jwt" = []))
)]
pub async fn get_hierarchy(
    State(app_state): State<AppState>,
    locale: Locale,
    user: AuthenticatedUser,
    _perm: RequirePermission<PermAdministrativeRead>,
    Path(node_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let mut tx = begin_request_transaction(&app_state)
        .await
        .map_err(|e| e.to_api_error(&locale, &app_state.i18n_store))?;

    let chain = app_state
        .administrative_service
        .get_hierarchy(&mut *tx, node_id, &user.0)
        .await
        .map_err(|e| e.to_api_error(&locale, &app_state.i18n_store))?;

    tx.commit()
        .await
        .map_err(|e| AppError::from(e).to_api_error(&locale, &app_state.i18n_store))?;

    Ok((StatusCode::OK, Json(chain)))
}

// GET /api/administrative/nodes/{node_id}/subtree
#[utoipa::path(
    get,
    path = "/api/administrative/nodes/{node_id}/subtree",
    tag = "Administrative",
    responses(
        (status = 200, description = "O nó e todos os descendentes ativos", body = Vec<AdministrativeNodeWithLevel>),
        (status = 404, description = "Nó inexistente ou desativado")
    ),
    params(("node_id" = Uuid, Path, description = "ID do Nó")),
    security(("api_jwt" = []))
)]
pub async fn get_subtree(
    State(app_state): State<AppState>,
    locale: Locale,
    user: AuthenticatedUser,
    _perm: RequirePermission<PermAdministrativeRead>,
    Path(node_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let mut tx = begin_request_transaction(&app_state)
        .await
        .map_err(|e| e.to_api_error(&locale, &app_state.i18n_store))?;

    let subtree = app_state
        .administrative_service
        .get_subtree(&mut *tx, node_id, &user.0)
        .await
        .map_err(|e| e.to_api_error(&locale, &app_state.i18n_store))?;

    tx.commit()
        .await
        .map_err(|e| AppError::from(e).to_api_error(&locale, &app_state.i18n_store))?;

    Ok((StatusCode::OK, Json(subtree)))
}

// GET /api/administrative/nodes/{node_id}/projects?includeChildren=true
#[utoipa::path(
    get,
    path = "/api/administrative/nodes/{node_id}/projects",
    tag = "Administrative",
    responses((status = 200, description = "Projetos ligados ao nó (ou à subárvore)", body = Vec<Project>)),
    params(
        ("node_id" = Uuid, Path, description = "ID do Nó"),
        NodeProjectsQuery
    ),
    security(("api_jwt" = []))
)]
pub async fn get_node_projects(
    State(app_state): State<AppState>,
    locale: Locale,
    user: AuthenticatedUser,
    _perm: RequirePermission<PermAdministrativeRead>,
    Path(node_id): Path<Uuid>,
    Query(query): Query<NodeProjectsQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let mut tx = begin_request_transaction(&app_state)
        .await
        .map_err(|e| e.to_api_error(&locale, &app_state.i18n_store))?;

    let projects = app_state
        .administrative_service
        .get_node_projects(&mut *tx, node_id, query.include_children.unwrap_or(false), &user.0)
        .await
        .map_err(|e| e.to_api_error(&locale, &app_state.i18n_store))?;

    tx.commit()
        .await
        .map_err(|e| AppError::from(e).to_api_error(&locale, &app_state.i18n_store))?;

    Ok((StatusCode::OK, Json(projects)))
}

// =============================================================================
//  3. ATRIBUIÇÕES
// =============================================================================

// POST /api/administrative/nodes/{node_id}/users
#[utoipa::path(
    post,
    path = "/api/administrative/nodes/{node_id}/users",
    tag = "Administrative",
    request_body = AssignUserPayload,
    responses(
        (status = 201, description = "Atribuição criada ou atualizada", body = AdministrativeUserAssignment),
        (status = 404, description = "Nó ou usuário não encontrado")
    ),
    params(("node_id" = Uuid, Path, description = "ID do Nó")),
    security(("api_jwt" = []))
)]
pub async fn assign_user(
    State(app_state): State<AppState>,
    locale: Locale,
    user: AuthenticatedUser,
    _perm: RequirePermission<PermAdministrativeWrite>,
    Path(node_id): Path<Uuid>,
    Json(payload): Json<AssignUserPayload>,
) -> Result<impl IntoResponse, ApiError> {
    payload
        .validate()
        .map_err(|e| AppError::ValidationError(e).to_api_error(&locale, &app_state.i18n_store))?;

    let mut tx = begin_request_transaction(&app_state)
        .await
        .map_err(|e| e.to_api_error(&locale, &app_state.i18n_store))?;

    let assignment = app_state
        .administrative_service
        .assign_user(&mut *tx, node_id, &user.0, &payload)
        .await
        .map_err(|e| e.to_api_error(&locale, &app_state.i18n_store))?;

    tx.commit()
        .await
        .map_err(|e| AppError::from(e).to_api_error(&locale, &app_state.i18n_store))?;

    Ok((StatusCode::CREATED, Json(assignment)))
}

// GET /api/administrative/states/{state_id}/users/{user_id}/nodes
#[utoipa::path(
    get,
    path = "/api/administrative/states/{state_id}/users/{user_id}/nodes",
    tag = "Administrative",
    responses(
        (status = 200, description = "Atribuições ativas do usuário no Estado", body = Vec<UserNodeAssignment>),
        (status = 403, description = "Nem membro do Estado nem o próprio usuário")
    ),
    params(
        ("state_id" = Uuid, Path, description = "ID do Estado"),
        ("user_id" = Uuid, Path, description = "ID do Usuário")
    ),
    security(("api_jwt" = []))
)]
pub async fn get_user_nodes(
    State(app_state): State<AppState>,
    locale: Locale,
    user: AuthenticatedUser,
    _perm: RequirePermission<PermAdministrativeRead>,
    Path((state_id, user_id)): Path<(Uuid, Uuid)>,
) -> Result<impl IntoResponse, ApiError> {
    let mut tx = begin_request_transaction(&app_state)
        .await
        .map_err(|e| e.to_api_error(&locale, &app_state.i18n_store))?;

    let assignments = app_state
        .administrative_service
        .get_user_nodes(&mut *tx, state_id, user_id, &user.0)
        .await
        .map_err(|e| e.to_api_error(&locale, &app_state.i18n_store))?;

    tx.commit()
        .await
        .map_err(|e| AppError::from(e).to_api_error(&locale, &app_state.i18n_store))?;

    Ok((StatusCode::OK, Json(assignments)))
}
