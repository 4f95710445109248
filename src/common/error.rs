// src/common/error.rs

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::{json, Value};
use thiserror::Error;
use uuid::Uuid;

use crate::{common::i18n::I18nStore, middleware::i18n::Locale};

// Nosso tipo de erro interno, com `thiserror` para melhor ergonomia.
// A mensagem do `#[error]` vai para os logs; o cliente recebe a versão traduzida.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Erro de validação")]
    ValidationError(#[from] validator::ValidationErrors),

    // --- Autenticação ---
    #[error("Token inválido")]
    InvalidToken,

    #[error("Usuário {0} não é membro da organização {1}")]
    NotOrgMember(Uuid, Uuid),

    // --- Acesso ---
    #[error("Acesso negado ao Estado {0}")]
    StateAccessDenied(Uuid),

    #[error("Acesso negado ao nó {0}")]
    NodeAccessDenied(Uuid),

    #[error("Permissão ausente: {0}")]
    MissingPermission(&'static str),

    // --- Não encontrados ---
    #[error("Organização não encontrada")]
    OrgNotFound,

    #[error("Nível administrativo não encontrado")]
    LevelNotFound,

    #[error("Nó administrativo não encontrado")]
    NodeNotFound,

    #[error("Nó pai não encontrado")]
    ParentNodeNotFound,

    #[error("Projeto não encontrado")]
    ProjectNotFound,

    #[error("Usuário não encontrado")]
    UserNotFound,

    #[error("Contrato não encontrado")]
    ContractNotFound,

    #[error("Gestor de contrato não encontrado")]
    ManagerNotFound,

    // --- Integridade da hierarquia ---
    #[error("Nível em uso por nós administrativos")]
    LevelInUse,

    #[error("Nó possui filhos")]
    NodeHasChildren,

    #[error("Nível do pai ({parent_order}) não é superior ao do filho ({child_order})")]
    ParentLevelNotHigher { parent_order: i32, child_order: i32 },

    #[error("Nível '{0}' exige um pai")]
    ParentRequired(String),

    #[error("Pai escolhido criaria um ciclo")]
    ParentCycle,

    // --- Contratos ---
    #[error("Organização {0} não é um Estado")]
    ContractOrgNotState(Uuid),

    #[error("Nó {0} fora do Estado do contrato")]
    ScopeNodeNotInState(Uuid),

    #[error("Usuário já é gestor ativo do contrato")]
    ManagerAlreadyAssigned,

    #[error("Contrato já possui gestor principal ativo")]
    PrimaryManagerExists,

    // --- Unicidade ---
    #[error("Código de nível já existe: {0}")]
    LevelCodeAlreadyExists(String),

    #[error("Ordem de nível já existe: {0}")]
    LevelOrderAlreadyExists(i32),

    #[error("Número de contrato já existe: {0}")]
    ContractNumberAlreadyExists(String),

    #[error("Violação de unicidade: {0}")]
    UniqueConstraintViolation(String),

    // --- Infraestrutura ---
    #[error("Erro de banco de dados: {0}")]
    DatabaseError(#[from] sqlx::Error),

    #[error("Erro de JWT: {0}")]
    JwtError(#[from] jsonwebtoken::errors::Error),

    #[error("Erro interno do servidor: {0}")]
    InternalServerError(#[from] anyhow::Error),
}

/// O formato que vai para o cliente.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub error: String,
    pub details: Option<Value>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = match self.details {
            Some(details) => json!({ "error": self.error, "details": details }),
            None => json!({ "error": self.error }),
        };
        (self.status, Json(body)).into_response()
    }
}

impl AppError {
    /// Status HTTP, chave da mensagem e argumentos de interpolação.
    fn classify(&self) -> (StatusCode, &'static str, Vec<(&'static str, String)>) {
        match self {
            AppError::ValidationError(_) => (StatusCode::BAD_REQUEST, "validation.failed", vec![]),

            AppError::InvalidToken | AppError::JwtError(_) => {
                (StatusCode::UNAUTHORIZED, "auth.invalid_token", vec![])
            }
            AppError::NotOrgMember(..) => (StatusCode::UNAUTHORIZED, "auth.not_member", vec![]),

            AppError::StateAccessDenied(_) => (StatusCode::FORBIDDEN, "state.access_denied", vec![]),
            AppError::NodeAccessDenied(_) => (StatusCode::FORBIDDEN, "node.access_denied", vec![]),
            AppError::MissingPermission(slug) => (
                StatusCode::FORBIDDEN,
                "permission.missing",
                vec![("permission", slug.to_string())],
            ),
            AppError::LevelInUse => (StatusCode::FORBIDDEN, "level.in_use", vec![]),
            AppError::NodeHasChildren => (StatusCode::FORBIDDEN, "node.has_children", vec![]),

            AppError::OrgNotFound => (StatusCode::NOT_FOUND, "org.not_found", vec![]),
            AppError::LevelNotFound => (StatusCode::NOT_FOUND, "level.not_found", vec![]),
            AppError::NodeNotFound => (StatusCode::NOT_FOUND, "node.not_found", vec![]),
            AppError::ParentNodeNotFound => (StatusCode::NOT_FOUND, "node.parent_not_found", vec![]),
            AppError::ProjectNotFound => (StatusCode::NOT_FOUND, "project.not_found", vec![]),
            AppError::UserNotFound => (StatusCode::NOT_FOUND, "user.not_found", vec![]),
            AppError::ContractNotFound => (StatusCode::NOT_FOUND, "contract.not_found", vec![]),
            AppError::ManagerNotFound => (StatusCode::NOT_FOUND, "contract.manager_not_found", vec![]),

            AppError::ContractOrgNotState(_) => (StatusCode::BAD_REQUEST, "contract.org_not_state", vec![]),
            AppError::ScopeNodeNotInState(node_id) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "contract.scope_node_invalid",
                vec![("node_id", node_id.to_string())],
            ),
            AppError::ManagerAlreadyAssigned => (StatusCode::CONFLICT, "contract.manager_exists", vec![]),
            AppError::PrimaryManagerExists => (StatusCode::CONFLICT, "contract.primary_exists", vec![]),
            AppError::ContractNumberAlreadyExists(number) => (
                StatusCode::CONFLICT,
                "contract.number_exists",
                vec![("number", number.clone())],
            ),

            AppError::ParentLevelNotHigher { parent_order, child_order } => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "node.parent_level_not_higher",
                vec![
                    ("parent_order", parent_order.to_string()),
                    ("child_order", child_order.to_string()),
                ],
            ),
            AppError::ParentRequired(level) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "node.parent_required",
                vec![("level", level.clone())],
            ),
            AppError::ParentCycle => (StatusCode::UNPROCESSABLE_ENTITY, "node.parent_cycle", vec![]),

            AppError::LevelCodeAlreadyExists(code) => {
                (StatusCode::CONFLICT, "level.code_exists", vec![("code", code.clone())])
            }
            AppError::LevelOrderAlreadyExists(order) => {
                (StatusCode::CONFLICT, "level.order_exists", vec![("order", order.to_string())])
            }
            AppError::UniqueConstraintViolation(constraint) => (
                StatusCode::CONFLICT,
                "conflict.unique",
                vec![("constraint", constraint.clone())],
            ),

            AppError::DatabaseError(_) | AppError::InternalServerError(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "internal.error", vec![])
            }
        }
    }

    /// Converte o erro interno na resposta traduzida para o idioma do cliente.
    pub fn to_api_error(&self, locale: &Locale, store: &I18nStore) -> ApiError {
        let (status, key, args) = self.classify();

        if status.is_server_error() {
            // O detalhe fica só no log
            tracing::error!("Erro Interno do Servidor: {}", self);
        }

        let details = match self {
            AppError::ValidationError(errors) => Some(validation_details(errors, locale, store)),
            _ => None,
        };

        ApiError {
            status,
            error: store.translate(&locale.0, key, &args),
            details,
        }
    }
}

// Retorna todos os detalhes da validação, campo a campo, já traduzidos.
// A mensagem do validator é uma chave do catálogo; sem mensagem, usa "validation.<code>".
fn validation_details(errors: &validator::ValidationErrors, locale: &Locale, store: &I18nStore) -> Value {
    let mut details = serde_json::Map::new();
    for (field, field_errors) in errors.field_errors() {
        let messages: Vec<String> = field_errors
            .iter()
            .map(|e| {
                let key = e
                    .message
                    .as_ref()
                    .map(|m| m.to_string())
                    .unwrap_or_else(|| format!("validation.{}", e.code));
                let args: Vec<(&str, String)> = e
                    .params
                    .iter()
                    .filter(|&(name, _)| name != "value")
                    .map(|(name, value)| {
                        let value = match value {
                            Value::String(s) => s.clone(),
                            // 1.0 -> "1"
                            Value::Number(n) => match n.as_f64() {
                                Some(f) if f.fract() == 0.0 => (f as i64).to_string(),
                                _ => n.to_string(),
                            },
                            other => other.to_string(),
                        };
                        (&**name, value)
                    })
                    .collect();
                store.translate(&locale.0, &key, &args)
            })
            .collect();
        details.insert(field.to_string(), json!(messages));
    }
    Value::Object(details)
}

/// Traduz violações de unicidade do Postgres pelo nome da constraint.
/// `map` devolve `Some` para as constraints que o chamador sabe nomear.
pub fn map_unique_violation<F>(e: sqlx::Error, map: F) -> AppError
where
    F: FnOnce(&str) -> Option<AppError>,
{
    if let sqlx::Error::Database(db_err) = &e {
        if db_err.is_unique_violation() {
            let constraint = db_err.constraint().unwrap_or_default().to_string();
            return map(&constraint).unwrap_or(AppError::UniqueConstraintViolation(constraint));
        }
    }
    e.into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use validator::Validate;

    fn store() -> I18nStore {
        I18nStore::load().unwrap()
    }

    #[test]
    fn contract_conflicts_and_scope_errors() {
        let api = AppError::ContractNumberAlreadyExists("SN-2026-001".into()).to_api_error(&Locale("en".into()), &store());
        assert_eq!(api.status, StatusCode::CONFLICT);
        assert_eq!(api.error, "A contract with number 'SN-2026-001' already exists.");

        let api = AppError::PrimaryManagerExists.to_api_error(&Locale("fr".into()), &store());
        assert_eq!(api.status, StatusCode::CONFLICT);

        let api = AppError::ContractOrgNotState(Uuid::nil()).to_api_error(&Locale("en".into()), &store());
        assert_eq!(api.status, StatusCode::BAD_REQUEST);

        let api = AppError::ScopeNodeNotInState(Uuid::nil()).to_api_error(&Locale("en".into()), &store());
        assert_eq!(api.status, StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[test]
    fn forbidden_referential_conflicts() {
        let api = AppError::LevelInUse.to_api_error(&Locale("en".into()), &store());
        assert_eq!(api.status, StatusCode::FORBIDDEN);

        let api = AppError::NodeHasChildren.to_api_error(&Locale("fr".into()), &store());
        assert_eq!(api.status, StatusCode::FORBIDDEN);
        assert_eq!(api.error, "Impossible de supprimer un nœud qui a des enfants.");
    }

    #[test]
    fn hierarchy_conflicts_are_unprocessable() {
        let err = AppError::ParentLevelNotHigher { parent_order: 2, child_order: 2 };
        let api = err.to_api_error(&Locale("en".into()), &store());
        assert_eq!(api.status, StatusCode::UNPROCESSABLE_ENTITY);
        assert!(api.error.contains("order 2"));
    }

    #[test]
    fn database_errors_hide_details() {
        let err = AppError::DatabaseError(sqlx::Error::RowNotFound);
        let api = err.to_api_error(&Locale("en".into()), &store());
        assert_eq!(api.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(api.error, "An unexpected error occurred.");
        assert!(api.details.is_none());
    }

    #[derive(Validate)]
    struct NamedInput {
        #[validate(length(min = 1, message = "validation.required"))]
        name: String,
        #[validate(range(min = 1, message = "validation.min"))]
        order: i32,
    }

    #[test]
    fn validation_errors_carry_localized_field_details() {
        let errors = NamedInput { name: String::new(), order: 0 }.validate().unwrap_err();
        let api = AppError::ValidationError(errors).to_api_error(&Locale("en".into()), &store());
        assert_eq!(api.status, StatusCode::BAD_REQUEST);
        let details = api.details.unwrap();
        assert_eq!(details["name"], json!(["This field is required."]));
        assert_eq!(details["order"], json!(["The value must be at least 1."]));

        let errors = NamedInput { name: String::new(), order: 1 }.validate().unwrap_err();
        let api = AppError::ValidationError(errors).to_api_error(&Locale("fr".into()), &store());
        assert_eq!(api.details.unwrap()["name"], json!(["Ce champ est obligatoire."]));
    }

    #[test]
    fn non_unique_errors_pass_through() {
        let err = map_unique_violation(sqlx::Error::RowNotFound, |_| None);
        assert!(matches!(err, AppError::DatabaseError(_)));
    }
}
