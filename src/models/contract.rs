// src/models/contract.rs

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::{Validate, ValidationError};

use crate::models::administrative::validate_not_negative;

pub const DEFAULT_CONTRACT_CURRENCY: &str = "EUR";
pub const DEFAULT_MANAGER_ROLE: &str = "contract_manager";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "contract_type", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ContractType {
    Municipal,
    Departmental,
    Regional,
    National,
    Custom,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "contract_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ContractStatus {
    #[default]
    Draft,
    Pending,
    Active,
    Suspended,
    Expired,
    Terminated,
}

// ---
// 1. Contrato com um Estado
// ---
#[derive(Debug, Clone, Serialize, FromRow, ToSchema)]
pub struct GovernmentContract {
    pub id: Uuid,
    #[schema(example = "SN-2026-001")]
    pub contract_number: String,
    #[schema(example = "Gestion territoriale de la région de Dakar")]
    pub title: String,
    pub description: Option<String>,
    pub contract_type: ContractType,
    pub government_org_id: Uuid,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub budget_amount: Option<Decimal>,
    #[schema(example = "EUR")]
    pub currency: String,
    pub scope_description: Option<String>,
    pub covers_full_territory: bool,
    pub status: ContractStatus,
    pub signed_date: Option<NaiveDate>,
    pub approved_by: Option<Uuid>,
    pub approved_at: Option<DateTime<Utc>>,
    pub legal_framework: Option<String>,
    pub contract_terms: Option<String>,
    pub renewal_terms: Option<String>,
    pub termination_conditions: Option<String>,
    pub government_contact_name: Option<String>,
    pub government_contact_email: Option<String>,
    pub government_contact_phone: Option<String>,
    pub created_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct GovernmentOrgSummary {
    pub id: Uuid,
    pub name: String,
}

/// Nó coberto pelo contrato (sempre com a subárvore).
#[derive(Debug, Clone, Serialize, FromRow, ToSchema)]
pub struct ContractScopeEntry {
    pub id: Uuid,
    pub includes_subtree: bool,
    pub node_id: Uuid,
    pub node_name: String,
    pub level_name: String,
    pub level_order: i32,
}

/// GET /contracts/{id}: o contrato, o Estado e o escopo territorial.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ContractDetail {
    #[serde(flatten)]
    pub contract: GovernmentContract,
    pub government_org: GovernmentOrgSummary,
    pub scope: Vec<ContractScopeEntry>,
}

// ---
// 2. Gestor do contrato
// ---
#[derive(Debug, Clone, Serialize, FromRow, ToSchema)]
pub struct ContractManager {
    pub id: Uuid,
    pub contract_id: Uuid,
    pub user_id: Uuid,
    #[schema(example = "contract_manager")]
    pub role: String,
    pub is_primary: bool,
    pub administrative_scope_node_id: Option<Uuid>,
    pub manages_full_contract: bool,
    pub can_create_admin_tree: bool,
    pub can_assign_users: bool,
    pub can_manage_projects: bool,
    pub can_view_analytics: bool,
    pub can_export_data: bool,
    pub start_date: NaiveDate,
    pub end_date: Option<NaiveDate>,
    pub appointment_date: NaiveDate,
    pub appointed_by: Option<Uuid>,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ManagerUser {
    pub id: Uuid,
    pub email: String,
    pub full_name: Option<String>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ContractSummary {
    pub id: Uuid,
    pub title: String,
    pub contract_number: String,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ScopeNodeSummary {
    pub id: Uuid,
    pub name: String,
    pub level_name: String,
    pub level_order: i32,
}

/// Gestor com o usuário, o contrato e o nó de escopo (se houver).
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ContractManagerDetail {
    #[serde(flatten)]
    pub manager: ContractManager,
    pub user: ManagerUser,
    pub contract: ContractSummary,
    pub scope_node: Option<ScopeNodeSummary>,
}

// Linha crua: gestor + users + contrato + LEFT JOIN no nó de escopo
#[derive(Debug, FromRow)]
pub struct ContractManagerRow {
    #[sqlx(flatten)]
    pub manager: ContractManager,
    pub user_email: String,
    pub user_full_name: Option<String>,
    pub contract_title: String,
    pub contract_number: String,
    pub scope_node_name: Option<String>,
    pub scope_level_name: Option<String>,
    pub scope_level_order: Option<i32>,
}

impl From<ContractManagerRow> for ContractManagerDetail {
    fn from(row: ContractManagerRow) -> Self {
        let scope_node = match (
            row.manager.administrative_scope_node_id,
            row.scope_node_name,
            row.scope_level_name,
            row.scope_level_order,
        ) {
            (Some(id), Some(name), Some(level_name), Some(level_order)) => {
                Some(ScopeNodeSummary { id, name, level_name, level_order })
            }
            _ => None,
        };

        Self {
            user: ManagerUser {
                id: row.manager.user_id,
                email: row.user_email,
                full_name: row.user_full_name,
            },
            contract: ContractSummary {
                id: row.manager.contract_id,
                title: row.contract_title,
                contract_number: row.contract_number,
            },
            scope_node,
            manager: row.manager,
        }
    }
}

/// GET /contracts/mine: um vínculo ativo do usuário e o contrato correspondente.
#[derive(Debug, Clone, Serialize, FromRow, ToSchema)]
pub struct UserContract {
    pub manager_id: Uuid,
    pub role: String,
    pub is_primary: bool,
    pub manages_full_contract: bool,
    pub contract_id: Uuid,
    pub contract_number: String,
    pub title: String,
    pub status: ContractStatus,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub government_org_id: Uuid,
    pub government_org_name: String,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ContractManagerCheck {
    pub is_manager: bool,
}

// =============================================================================
//  PAYLOADS
// =============================================================================

fn ensure_date_order(start: NaiveDate, end: Option<NaiveDate>) -> Result<(), ValidationError> {
    if end.is_some_and(|end| end < start) {
        let mut err = ValidationError::new("date_range");
        err.message = Some("validation.date_range".into());
        return Err(err);
    }
    Ok(())
}

fn validate_contract_dates(payload: &CreateContractPayload) -> Result<(), ValidationError> {
    ensure_date_order(payload.start_date, Some(payload.end_date))
}

fn validate_manager_dates(payload: &AssignManagerPayload) -> Result<(), ValidationError> {
    ensure_date_order(payload.start_date, payload.end_date)
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
#[validate(schema(function = "validate_contract_dates"))]
pub struct CreateContractPayload {
    #[validate(length(min = 1, message = "validation.required"))]
    #[schema(example = "SN-2026-001")]
    pub contract_number: String,

    #[validate(length(min = 1, message = "validation.required"))]
    pub title: String,

    pub description: Option<String>,
    pub contract_type: ContractType,
    pub government_org_id: Uuid,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,

    #[validate(custom(function = "validate_not_negative"))]
    pub budget_amount: Option<Decimal>,

    #[validate(length(equal = 3, message = "validation.currency"))]
    pub currency: Option<String>,

    pub scope_description: Option<String>,
    pub covers_full_territory: Option<bool>,
    pub status: Option<ContractStatus>,
    pub signed_date: Option<NaiveDate>,
    pub approved_by: Option<Uuid>,
    pub legal_framework: Option<String>,
    pub contract_terms: Option<String>,
    pub renewal_terms: Option<String>,
    pub termination_conditions: Option<String>,
    pub government_contact_name: Option<String>,

    #[validate(email(message = "validation.email"))]
    pub government_contact_email: Option<String>,

    pub government_contact_phone: Option<String>,

    /// Nós do Estado cobertos pelo contrato (cada um com a subárvore)
    #[serde(default)]
    pub administrative_node_ids: Vec<Uuid>,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
#[validate(schema(function = "validate_manager_dates"))]
pub struct AssignManagerPayload {
    pub user_id: Uuid,

    #[validate(length(min = 1, message = "validation.required"))]
    pub role: Option<String>,

    pub is_primary: Option<bool>,
    pub administrative_scope_node_id: Option<Uuid>,
    pub manages_full_contract: Option<bool>,
    pub can_create_admin_tree: Option<bool>,
    pub can_assign_users: Option<bool>,
    pub can_manage_projects: Option<bool>,
    pub can_view_analytics: Option<bool>,
    pub can_export_data: Option<bool>,
    pub start_date: NaiveDate,
    pub end_date: Option<NaiveDate>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateContractStatusPayload {
    pub status: ContractStatus,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn contract_json() -> serde_json::Value {
        json!({
            "contract_number": "SN-2026-001",
            "title": "Gestion territoriale",
            "contract_type": "national",
            "government_org_id": Uuid::nil(),
            "start_date": "2026-01-01",
            "end_date": "2028-12-31"
        })
    }

    #[test]
    fn contract_payload_defaults() {
        let payload: CreateContractPayload = serde_json::from_value(contract_json()).unwrap();
        assert!(payload.validate().is_ok());
        assert!(payload.administrative_node_ids.is_empty());
        assert!(payload.status.is_none());
        assert_eq!(ContractStatus::default(), ContractStatus::Draft);
    }

    #[test]
    fn contract_payload_rejects_inverted_dates_and_bad_email() {
        let mut body = contract_json();
        body["end_date"] = json!("2025-12-31");
        body["government_contact_email"] = json!("not-an-email");
        body["currency"] = json!("EURO");
        let payload: CreateContractPayload = serde_json::from_value(body).unwrap();
        let errors = payload.validate().unwrap_err();
        let fields = errors.field_errors();
        assert!(fields.contains_key("__all__"));
        assert!(fields.contains_key("government_contact_email"));
        assert!(fields.contains_key("currency"));
    }

    #[test]
    fn unknown_contract_type_is_rejected_at_parse() {
        let mut body = contract_json();
        body["contract_type"] = json!("galactic");
        assert!(serde_json::from_value::<CreateContractPayload>(body).is_err());
    }

    #[test]
    fn manager_payload_allows_open_end() {
        let payload: AssignManagerPayload = serde_json::from_value(json!({
            "user_id": Uuid::nil(),
            "start_date": "2026-03-01"
        }))
        .unwrap();
        assert!(payload.validate().is_ok());

        let payload: AssignManagerPayload = serde_json::from_value(json!({
            "user_id": Uuid::nil(),
            "start_date": "2026-03-01",
            "end_date": "2026-02-01"
        }))
        .unwrap();
        assert!(payload.validate().is_err());
    }
}
