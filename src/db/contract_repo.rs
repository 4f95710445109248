// src/db/contract_repo.rs

use sqlx::{Executor, Postgres};
use uuid::Uuid;

use crate::{
    common::error::{map_unique_violation, AppError},
    models::contract::{
        AssignManagerPayload, ContractManager, ContractManagerDetail, ContractManagerRow,
        ContractScopeEntry, ContractStatus, CreateContractPayload, GovernmentContract,
        UserContract, DEFAULT_CONTRACT_CURRENCY, DEFAULT_MANAGER_ROLE,
    },
};

const CONTRACT_NUMBER_CONSTRAINT: &str = "government_contract_number_key";
const MANAGER_ACTIVE_USER_INDEX: &str = "contract_manager_active_user_key";
const MANAGER_ACTIVE_PRIMARY_INDEX: &str = "contract_manager_active_primary_key";

const MANAGER_DETAIL_SELECT: &str = r#"
    SELECT
        cm.*,
        u.email AS user_email, u.full_name AS user_full_name,
        c.title AS contract_title, c.contract_number,
        n.name AS scope_node_name,
        l.name AS scope_level_name, l.level_order AS scope_level_order
    FROM contract_manager cm
    JOIN users u ON u.id = cm.user_id
    JOIN government_contract c ON c.id = cm.contract_id
    LEFT JOIN administrative_node n ON n.id = cm.administrative_scope_node_id
    LEFT JOIN administrative_level l ON l.id = n.level_id
"#;

#[derive(Clone, Default)]
pub struct ContractRepository;

impl ContractRepository {
    pub fn new() -> Self {
        Self
    }

    // =========================================================================
    //  CONTRATOS
    // =========================================================================

    /// Insere o contrato com os padrões (moeda, status, cobertura).
    /// `approved_at` é preenchido quando o contrato já chega assinado.
    pub async fn create_contract<'e, E>(
        &self,
        executor: E,
        input: &CreateContractPayload,
        created_by: Uuid,
    ) -> Result<GovernmentContract, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        sqlx::query_as::<_, GovernmentContract>(
            r#"
            INSERT INTO government_contract (
                contract_number, title, description, contract_type, government_org_id,
                start_date, end_date, budget_amount, currency, scope_description,
                covers_full_territory, status, signed_date, approved_by, approved_at,
                legal_framework, contract_terms, renewal_terms, termination_conditions,
                government_contact_name, government_contact_email, government_contact_phone,
                created_by
            )
            VALUES (
                $1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14,
                CASE WHEN $13::date IS NULL THEN NULL ELSE NOW() END,
                $15, $16, $17, $18, $19, $20, $21, $22
            )
            RETURNING *
            "#,
        )
            .bind(&input.contract_number)
            .bind(&input.title)
            .bind(input.description.as_deref())
            .bind(input.contract_type)
            .bind(input.government_org_id)
            .bind(input.start_date)
            .bind(input.end_date)
            .bind(input.budget_amount)
            .bind(input.currency.as_deref().unwrap_or(DEFAULT_CONTRACT_CURRENCY))
            .bind(input.scope_description.as_deref())
            .bind(input.covers_full_territory.unwrap_or(false))
            .bind(input.status.unwrap_or_default())
            .bind(input.signed_date)
            .bind(input.approved_by)
            .bind(input.legal_framework.as_deref())
            .bind(input.contract_terms.as_deref())
            .bind(input.renewal_terms.as_deref())
            .bind(input.termination_conditions.as_deref())
            .bind(input.government_contact_name.as_deref())
            .bind(input.government_contact_email.as_deref())
            .bind(input.government_contact_phone.as_deref())
            .bind(created_by)
            .fetch_one(executor)
            .await
            .map_err(|e| {
                map_unique_violation(e, |constraint| match constraint {
                    CONTRACT_NUMBER_CONSTRAINT => {
                        Some(AppError::ContractNumberAlreadyExists(input.contract_number.clone()))
                    }
                    _ => None,
                })
            })
    }

    /// Escopo territorial: cada nó cobre a própria subárvore. Ids repetidos são ignorados.
    pub async fn insert_scope<'e, E>(
        &self,
        executor: E,
        contract_id: Uuid,
        node_ids: &[Uuid],
    ) -> Result<u64, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let result = sqlx::query(
            r#"
            INSERT INTO contract_administrative_scope (contract_id, administrative_node_id, includes_subtree)
            SELECT $1, node_id, true FROM UNNEST($2::uuid[]) AS node_id
            ON CONFLICT (contract_id, administrative_node_id) DO NOTHING
            "#,
        )
            .bind(contract_id)
            .bind(node_ids)
            .execute(executor)
            .await?;
        Ok(result.rows_affected())
    }

    pub async fn find_contract<'e, E>(
        &self,
        executor: E,
        contract_id: Uuid,
    ) -> Result<Option<GovernmentContract>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let contract = sqlx::query_as::<_, GovernmentContract>(
            "SELECT * FROM government_contract WHERE id = $1",
        )
            .bind(contract_id)
            .fetch_optional(executor)
            .await?;
        Ok(contract)
    }

    pub async fn list_scope<'e, E>(
        &self,
        executor: E,
        contract_id: Uuid,
    ) -> Result<Vec<ContractScopeEntry>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let entries = sqlx::query_as::<_, ContractScopeEntry>(
            r#"
            SELECT
                s.id, s.includes_subtree,
                n.id AS node_id, n.name AS node_name,
                l.name AS level_name, l.level_order
            FROM contract_administrative_scope s
            JOIN administrative_node n ON n.id = s.administrative_node_id
            JOIN administrative_level l ON l.id = n.level_id
            WHERE s.contract_id = $1
            ORDER BY l.level_order ASC, n.name ASC
            "#,
        )
            .bind(contract_id)
            .fetch_all(executor)
            .await?;
        Ok(entries)
    }

    /// Contratos em vigor (status `active`) do Estado, do mais recente ao mais antigo.
    pub async fn list_active_for_org<'e, E>(
        &self,
        executor: E,
        org_id: Uuid,
    ) -> Result<Vec<GovernmentContract>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let contracts = sqlx::query_as::<_, GovernmentContract>(
            r#"
            SELECT * FROM government_contract
            WHERE government_org_id = $1 AND status = $2
            ORDER BY start_date DESC, contract_number ASC
            "#,
        )
            .bind(org_id)
            .bind(ContractStatus::Active)
            .fetch_all(executor)
            .await?;
        Ok(contracts)
    }

    pub async fn update_status<'e, E>(
        &self,
        executor: E,
        contract_id: Uuid,
        status: ContractStatus,
    ) -> Result<Option<GovernmentContract>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let contract = sqlx::query_as::<_, GovernmentContract>(
            r#"
            UPDATE government_contract SET status = $2, updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
            .bind(contract_id)
            .bind(status)
            .fetch_optional(executor)
            .await?;
        Ok(contract)
    }

    // =========================================================================
    //  GESTORES
    // =========================================================================

    pub async fn create_manager<'e, E>(
        &self,
        executor: E,
        contract_id: Uuid,
        input: &AssignManagerPayload,
        appointed_by: Uuid,
    ) -> Result<ContractManager, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        sqlx::query_as::<_, ContractManager>(
            r#"
            INSERT INTO contract_manager (
                contract_id, user_id, role, is_primary, administrative_scope_node_id,
                manages_full_contract, can_create_admin_tree, can_assign_users,
                can_manage_projects, can_view_analytics, can_export_data,
                start_date, end_date, appointment_date, appointed_by
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, CURRENT_DATE, $14)
            RETURNING *
            "#,
        )
            .bind(contract_id)
            .bind(input.user_id)
            .bind(input.role.as_deref().unwrap_or(DEFAULT_MANAGER_ROLE))
            .bind(input.is_primary.unwrap_or(false))
            .bind(input.administrative_scope_node_id)
            .bind(input.manages_full_contract.unwrap_or(true))
            .bind(input.can_create_admin_tree.unwrap_or(true))
            .bind(input.can_assign_users.unwrap_or(true))
            .bind(input.can_manage_projects.unwrap_or(true))
            .bind(input.can_view_analytics.unwrap_or(true))
            .bind(input.can_export_data.unwrap_or(true))
            .bind(input.start_date)
            .bind(input.end_date)
            .bind(appointed_by)
            .fetch_one(executor)
            .await
            .map_err(|e| {
                map_unique_violation(e, |constraint| match constraint {
                    MANAGER_ACTIVE_USER_INDEX => Some(AppError::ManagerAlreadyAssigned),
                    MANAGER_ACTIVE_PRIMARY_INDEX => Some(AppError::PrimaryManagerExists),
                    _ => None,
                })
            })
    }

    pub async fn find_manager<'e, E>(
        &self,
        executor: E,
        manager_id: Uuid,
    ) -> Result<Option<ContractManagerDetail>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let sql = format!("{} WHERE cm.id = $1", MANAGER_DETAIL_SELECT);
        let row = sqlx::query_as::<_, ContractManagerRow>(&sql)
            .bind(manager_id)
            .fetch_optional(executor)
            .await?;
        Ok(row.map(Into::into))
    }

    /// Gestores ativos, o principal primeiro.
    pub async fn list_active_managers<'e, E>(
        &self,
        executor: E,
        contract_id: Uuid,
    ) -> Result<Vec<ContractManagerDetail>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let sql = format!(
            "{} WHERE cm.contract_id = $1 AND cm.active = true ORDER BY cm.is_primary DESC, u.email ASC",
            MANAGER_DETAIL_SELECT
        );
        let rows = sqlx::query_as::<_, ContractManagerRow>(&sql)
            .bind(contract_id)
            .fetch_all(executor)
            .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    pub async fn is_active_manager<'e, E>(
        &self,
        executor: E,
        contract_id: Uuid,
        user_id: Uuid,
    ) -> Result<bool, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let exists = sqlx::query_scalar::<_, bool>(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM contract_manager
                WHERE contract_id = $1 AND user_id = $2 AND active = true
            )
            "#,
        )
            .bind(contract_id)
            .bind(user_id)
            .fetch_one(executor)
            .await?;
        Ok(exists)
    }

    pub async fn has_active_primary<'e, E>(
        &self,
        executor: E,
        contract_id: Uuid,
    ) -> Result<bool, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let exists = sqlx::query_scalar::<_, bool>(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM contract_manager
                WHERE contract_id = $1 AND is_primary = true AND active = true
            )
            "#,
        )
            .bind(contract_id)
            .fetch_one(executor)
            .await?;
        Ok(exists)
    }

    /// Desativa sem apagar: o histórico de nomeações fica.
    pub async fn deactivate_manager<'e, E>(&self, executor: E, manager_id: Uuid) -> Result<(), AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        sqlx::query(
            "UPDATE contract_manager SET active = false, updated_at = NOW() WHERE id = $1",
        )
            .bind(manager_id)
            .execute(executor)
            .await?;
        Ok(())
    }

    pub async fn list_user_contracts<'e, E>(
        &self,
        executor: E,
        user_id: Uuid,
    ) -> Result<Vec<UserContract>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let contracts = sqlx::query_as::<_, UserContract>(
            r#"
            SELECT
                cm.id AS manager_id, cm.role, cm.is_primary, cm.manages_full_contract,
                c.id AS contract_id, c.contract_number, c.title, c.status,
                c.start_date, c.end_date,
                o.id AS government_org_id, o.name AS government_org_name
            FROM contract_manager cm
            JOIN government_contract c ON c.id = cm.contract_id
            JOIN org o ON o.id = c.government_org_id
            WHERE cm.user_id = $1 AND cm.active = true
            ORDER BY c.start_date DESC, c.contract_number ASC
            "#,
        )
            .bind(user_id)
            .fetch_all(executor)
            .await?;
        Ok(contracts)
    }
}
