// src/models/administrative.rs

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::{Validate, ValidationError};

use crate::common::serde_utils::double_option;

pub const DEFAULT_LEVEL_COLOR: &str = "#6366f1";
pub const DEFAULT_LEVEL_ICON: &str = "map";

// ---
// 1. Nível administrativo (Região, Departamento, Comuna...)
// ---
// level_order define a posição na hierarquia: quanto menor, mais alto.
#[derive(Debug, Clone, Serialize, FromRow, ToSchema)]
pub struct AdministrativeLevel {
    pub id: Uuid,
    pub state_id: Uuid,
    #[schema(example = "Région")]
    pub name: String,
    #[schema(example = "REG")]
    pub code: String,
    #[schema(example = 1)]
    pub level_order: i32,
    #[schema(example = "#6366f1")]
    pub color: String,
    #[schema(example = "map")]
    pub icon: String,
    pub requires_parent: bool,
    #[schema(value_type = Object)]
    pub metadata: Value,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// ---
// 2. Nó administrativo (uma unidade territorial concreta)
// ---
#[derive(Debug, Clone, Serialize, FromRow, ToSchema)]
pub struct AdministrativeNode {
    pub id: Uuid,
    pub state_id: Uuid,
    pub parent_id: Option<Uuid>,
    pub level_id: Uuid,
    #[schema(example = "Dakar")]
    pub name: String,
    pub code: Option<String>,
    pub description: Option<String>,
    #[schema(example = 1_438_725)]
    pub population: Option<i64>,
    pub area_sqm: Option<Decimal>,
    #[schema(value_type = Object)]
    pub metadata: Value,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Nó acompanhado do seu nível (o que a API sempre devolve).
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct AdministrativeNodeWithLevel {
    #[serde(flatten)]
    pub node: AdministrativeNode,
    pub level: AdministrativeLevel,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ParentSummary {
    pub id: Uuid,
    pub name: String,
    pub level_name: String,
}

/// GET /nodes/{id}: o nó, o nível e um resumo do pai.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct AdministrativeNodeDetail {
    #[serde(flatten)]
    pub node: AdministrativeNodeWithLevel,
    pub parent: Option<ParentSummary>,
}

// ---
// 3. Nó da árvore (decoração montada a cada requisição, nunca persistida)
// ---
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct AdministrativeTreeNode {
    #[serde(flatten)]
    pub node: AdministrativeNodeWithLevel,
    #[schema(no_recursion)]
    pub children: Vec<AdministrativeTreeNode>,
    /// Raiz = 0
    pub depth: usize,
    /// Nomes dos ancestrais, da raiz até o pai (sem o próprio nó)
    pub path: Vec<String>,
}

// ---
// 4. Atribuição de usuário a um nó
// ---
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "assignment_scope", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum AssignmentScope {
    /// Autoridade apenas sobre o nó
    #[default]
    Node,
    /// Autoridade sobre o nó e todos os descendentes
    Subtree,
}

#[derive(Debug, Clone, Serialize, FromRow, ToSchema)]
pub struct AdministrativeUserAssignment {
    pub id: Uuid,
    pub user_id: Uuid,
    pub node_id: Uuid,
    #[schema(example = "prefet")]
    pub role: String,
    pub scope: AssignmentScope,
    pub appointed_by: Option<Uuid>,
    pub appointed_at: DateTime<Utc>,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// GET /states/{id}/users/{id}/nodes
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct UserNodeAssignment {
    #[serde(flatten)]
    pub assignment: AdministrativeUserAssignment,
    pub node: AdministrativeNodeWithLevel,
}

// =============================================================================
//  PAYLOADS
// =============================================================================

fn validate_hex_color(color: &str) -> Result<(), ValidationError> {
    let valid = color.len() == 7
        && color.starts_with('#')
        && color[1..].chars().all(|c| c.is_ascii_hexdigit());
    if !valid {
        let mut err = ValidationError::new("color");
        err.message = Some("validation.hex_color".into());
        return Err(err);
    }
    Ok(())
}

pub(crate) fn validate_not_negative(val: &Decimal) -> Result<(), ValidationError> {
    if val.is_sign_negative() {
        let mut err = ValidationError::new("range");
        err.add_param("min".into(), &0.0);
        err.message = Some("validation.not_negative".into());
        return Err(err);
    }
    Ok(())
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreateLevelPayload {
    #[validate(length(min = 1, message = "validation.required"))]
    #[schema(example = "Département")]
    pub name: String,

    #[validate(length(min = 1, message = "validation.required"))]
    #[schema(example = "DEP")]
    pub code: String,

    #[validate(range(min = 1, message = "validation.min"))]
    #[schema(example = 2)]
    pub level_order: i32,

    #[validate(custom(function = "validate_hex_color"))]
    pub color: Option<String>,
    pub icon: Option<String>,
    pub requires_parent: Option<bool>,
    #[schema(value_type = Option<Object>)]
    pub metadata: Option<Value>,
}

#[derive(Debug, Default, Deserialize, Validate, ToSchema)]
pub struct UpdateLevelPayload {
    #[validate(length(min = 1, message = "validation.required"))]
    pub name: Option<String>,

    #[validate(length(min = 1, message = "validation.required"))]
    pub code: Option<String>,

    #[validate(range(min = 1, message = "validation.min"))]
    pub level_order: Option<i32>,

    #[validate(custom(function = "validate_hex_color"))]
    pub color: Option<String>,
    pub icon: Option<String>,
    pub requires_parent: Option<bool>,
    #[schema(value_type = Option<Object>)]
    pub metadata: Option<Value>,
    pub active: Option<bool>,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreateNodePayload {
    pub parent_id: Option<Uuid>,
    pub level_id: Uuid,

    #[validate(length(min = 1, message = "validation.required"))]
    #[schema(example = "Thiès")]
    pub name: String,

    pub code: Option<String>,
    pub description: Option<String>,

    #[validate(range(min = 0, message = "validation.not_negative"))]
    pub population: Option<i64>,

    #[validate(custom(function = "validate_not_negative"))]
    pub area_sqm: Option<Decimal>,

    #[schema(value_type = Option<Object>)]
    pub metadata: Option<Value>,
}

#[derive(Debug, Default, Deserialize, Validate, ToSchema)]
pub struct UpdateNodePayload {
    /// Ausente = não mexe; `null` = vira raiz
    #[serde(default, deserialize_with = "double_option")]
    #[schema(value_type = Option<Uuid>)]
    pub parent_id: Option<Option<Uuid>>,

    pub level_id: Option<Uuid>,

    #[validate(length(min = 1, message = "validation.required"))]
    pub name: Option<String>,

    pub code: Option<String>,
    pub description: Option<String>,

    #[validate(range(min = 0, message = "validation.not_negative"))]
    pub population: Option<i64>,

    #[validate(custom(function = "validate_not_negative"))]
    pub area_sqm: Option<Decimal>,

    #[schema(value_type = Option<Object>)]
    pub metadata: Option<Value>,
}

impl UpdateNodePayload {
    /// Mudanças que exigem revalidar a posição do nó na hierarquia.
    pub fn moves_node(&self) -> bool {
        self.parent_id.is_some() || self.level_id.is_some()
    }
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct AssignUserPayload {
    pub user_id: Uuid,

    #[validate(length(min = 1, message = "validation.required"))]
    #[schema(example = "gouverneur")]
    pub role: String,

    #[serde(default)]
    pub scope: AssignmentScope,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn level_payload_rejects_order_zero_and_bad_color() {
        let payload: CreateLevelPayload = serde_json::from_value(json!({
            "name": "Région", "code": "REG", "level_order": 0, "color": "blue"
        }))
        .unwrap();
        let errors = payload.validate().unwrap_err();
        let fields = errors.field_errors();
        assert!(fields.contains_key("level_order"));
        assert!(fields.contains_key("color"));
    }

    #[test]
    fn level_payload_accepts_defaults() {
        let payload: CreateLevelPayload = serde_json::from_value(json!({
            "name": "Région", "code": "REG", "level_order": 1
        }))
        .unwrap();
        assert!(payload.validate().is_ok());
        assert!(payload.color.is_none());
    }

    #[test]
    fn node_payload_rejects_negative_area() {
        let payload: CreateNodePayload = serde_json::from_value(json!({
            "level_id": Uuid::new_v4(), "name": "Dakar", "area_sqm": -1.5, "population": 10
        }))
        .unwrap();
        let errors = payload.validate().unwrap_err();
        assert!(errors.field_errors().contains_key("area_sqm"));
    }

    #[test]
    fn assignment_scope_defaults_to_node() {
        let payload: AssignUserPayload = serde_json::from_value(json!({
            "user_id": Uuid::new_v4(), "role": "maire"
        }))
        .unwrap();
        assert_eq!(payload.scope, AssignmentScope::Node);

        let payload: AssignUserPayload = serde_json::from_value(json!({
            "user_id": Uuid::new_v4(), "role": "gouverneur", "scope": "subtree"
        }))
        .unwrap();
        assert_eq!(payload.scope, AssignmentScope::Subtree);
    }

    #[test]
    fn update_payload_detects_moves() {
        let patch: UpdateNodePayload = serde_json::from_value(json!({ "name": "X" })).unwrap();
        assert!(!patch.moves_node());
        let patch: UpdateNodePayload = serde_json::from_value(json!({ "parent_id": null })).unwrap();
        assert!(patch.moves_node());
    }
}
