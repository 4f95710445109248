// src/services/contract_service.rs

use sqlx::PgConnection;
use uuid::Uuid;

use crate::{
    common::error::AppError,
    db::{AdministrativeRepository, ContractRepository, OrgRepository, RowLock},
    models::{
        auth::CurrentUser,
        contract::{
            AssignManagerPayload, ContractDetail, ContractManagerDetail, ContractStatus,
            CreateContractPayload, GovernmentContract, GovernmentOrgSummary, UserContract,
        },
    },
};

/// Um usuário só tem um vínculo ativo por contrato, e o contrato só tem um principal ativo.
pub fn ensure_manager_slot(already_manager: bool, wants_primary: bool, has_primary: bool) -> Result<(), AppError> {
    if already_manager {
        return Err(AppError::ManagerAlreadyAssigned);
    }
    if wants_primary && has_primary {
        return Err(AppError::PrimaryManagerExists);
    }
    Ok(())
}

/// Só a própria organização do Estado altera o contrato.
fn ensure_contract_owner(contract: &GovernmentContract, user: &CurrentUser) -> Result<(), AppError> {
    if user.org_id != contract.government_org_id {
        return Err(AppError::StateAccessDenied(contract.government_org_id));
    }
    Ok(())
}

#[derive(Clone)]
pub struct ContractService {
    repo: ContractRepository,
    administrative_repo: AdministrativeRepository,
    org_repo: OrgRepository,
}

impl ContractService {
    pub fn new(
        repo: ContractRepository,
        administrative_repo: AdministrativeRepository,
        org_repo: OrgRepository,
    ) -> Self {
        Self { repo, administrative_repo, org_repo }
    }

    async fn load_contract(&self, conn: &mut PgConnection, contract_id: Uuid) -> Result<GovernmentContract, AppError> {
        self.repo
            .find_contract(&mut *conn, contract_id)
            .await?
            .ok_or(AppError::ContractNotFound)
    }

    /// Leitura: a organização do Estado ou um gestor ativo do contrato.
    async fn ensure_reader(
        &self,
        conn: &mut PgConnection,
        contract: &GovernmentContract,
        user: &CurrentUser,
    ) -> Result<(), AppError> {
        if user.org_id == contract.government_org_id {
            return Ok(());
        }
        if self.repo.is_active_manager(&mut *conn, contract.id, user.id).await? {
            return Ok(());
        }
        Err(AppError::StateAccessDenied(contract.government_org_id))
    }

    /// O nó precisa estar ativo e pertencer ao Estado; fica travado até o commit.
    async fn check_scope_node(&self, conn: &mut PgConnection, state_id: Uuid, node_id: Uuid) -> Result<(), AppError> {
        self.administrative_repo
            .find_node_locked(&mut *conn, state_id, node_id, RowLock::Share)
            .await?
            .filter(|n| n.node.active)
            .ok_or(AppError::ScopeNodeNotInState(node_id))?;
        Ok(())
    }

    async fn build_detail(&self, conn: &mut PgConnection, contract: GovernmentContract) -> Result<ContractDetail, AppError> {
        let org = self
            .org_repo
            .find_org(&mut *conn, contract.government_org_id)
            .await?
            .ok_or(AppError::OrgNotFound)?;
        let scope = self.repo.list_scope(&mut *conn, contract.id).await?;

        Ok(ContractDetail {
            contract,
            government_org: GovernmentOrgSummary { id: org.id, name: org.name },
            scope,
        })
    }

    // =========================================================================
    //  CONTRATOS
    // =========================================================================

    pub async fn create_contract(
        &self,
        conn: &mut PgConnection,
        user: &CurrentUser,
        input: &CreateContractPayload,
    ) -> Result<ContractDetail, AppError> {
        let state_id = input.government_org_id;

        // 1. A contraparte precisa ser um Estado, e o chamador precisa ser dele
        self.org_repo
            .find_state(&mut *conn, state_id)
            .await?
            .ok_or(AppError::ContractOrgNotState(state_id))?;
        if user.org_id != state_id {
            return Err(AppError::StateAccessDenied(state_id));
        }

        // 2. Escopo territorial dentro do Estado
        for &node_id in &input.administrative_node_ids {
            self.check_scope_node(conn, state_id, node_id).await?;
        }

        // 3. Contrato e escopo na mesma transação
        let contract = self.repo.create_contract(&mut *conn, input, user.id).await?;
        let scoped = self
            .repo
            .insert_scope(&mut *conn, contract.id, &input.administrative_node_ids)
            .await?;

        tracing::info!(
            "📝 Contrato '{}' criado para o Estado {} ({} nós no escopo)",
            contract.contract_number, state_id, scoped
        );
        self.build_detail(conn, contract).await
    }

    pub async fn get_contract(
        &self,
        conn: &mut PgConnection,
        contract_id: Uuid,
        user: &CurrentUser,
    ) -> Result<ContractDetail, AppError> {
        let contract = self.load_contract(conn, contract_id).await?;
        self.ensure_reader(conn, &contract, user).await?;
        self.build_detail(conn, contract).await
    }

    /// Contratos em vigor do Estado. Só a própria organização consulta.
    pub async fn list_org_contracts(
        &self,
        conn: &mut PgConnection,
        org_id: Uuid,
        user: &CurrentUser,
    ) -> Result<Vec<GovernmentContract>, AppError> {
        self.org_repo
            .find_state(&mut *conn, org_id)
            .await?
            .ok_or(AppError::StateAccessDenied(org_id))?;
        if user.org_id != org_id {
            return Err(AppError::StateAccessDenied(org_id));
        }
        self.repo.list_active_for_org(&mut *conn, org_id).await
    }

    pub async fn update_status(
        &self,
        conn: &mut PgConnection,
        contract_id: Uuid,
        user: &CurrentUser,
        status: ContractStatus,
    ) -> Result<GovernmentContract, AppError> {
        let current = self.load_contract(conn, contract_id).await?;
        ensure_contract_owner(&current, user)?;

        let updated = self
            .repo
            .update_status(&mut *conn, contract_id, status)
            .await?
            .ok_or(AppError::ContractNotFound)?;

        tracing::info!(
            "🔄 Contrato '{}': status {:?} -> {:?}",
            updated.contract_number, current.status, updated.status
        );
        Ok(updated)
    }

    // =========================================================================
    //  GESTORES
    // =========================================================================

    pub async fn assign_manager(
        &self,
        conn: &mut PgConnection,
        contract_id: Uuid,
        user: &CurrentUser,
        input: &AssignManagerPayload,
    ) -> Result<ContractManagerDetail, AppError> {
        let contract = self.load_contract(conn, contract_id).await?;
        ensure_contract_owner(&contract, user)?;

        if !self.org_repo.user_exists(&mut *conn, input.user_id).await? {
            return Err(AppError::UserNotFound);
        }

        if let Some(node_id) = input.administrative_scope_node_id {
            self.check_scope_node(conn, contract.government_org_id, node_id).await?;
        }

        let wants_primary = input.is_primary.unwrap_or(false);
        let already_manager = self.repo.is_active_manager(&mut *conn, contract_id, input.user_id).await?;
        let has_primary = wants_primary && self.repo.has_active_primary(&mut *conn, contract_id).await?;
        ensure_manager_slot(already_manager, wants_primary, has_primary)?;

        // Os índices únicos parciais cobrem a corrida entre as checagens e o INSERT
        let manager = self
            .repo
            .create_manager(&mut *conn, contract_id, input, user.id)
            .await?;

        tracing::info!(
            "👤 Usuário {} nomeado gestor do contrato '{}' ({})",
            input.user_id, contract.contract_number, manager.role
        );

        self.repo
            .find_manager(&mut *conn, manager.id)
            .await?
            .ok_or(AppError::ManagerNotFound)
    }

    pub async fn list_managers(
        &self,
        conn: &mut PgConnection,
        contract_id: Uuid,
        user: &CurrentUser,
    ) -> Result<Vec<ContractManagerDetail>, AppError> {
        let contract = self.load_contract(conn, contract_id).await?;
        self.ensure_reader(conn, &contract, user).await?;
        self.repo.list_active_managers(&mut *conn, contract_id).await
    }

    /// O próprio gestor sempre enxerga o seu vínculo.
    pub async fn get_manager(
        &self,
        conn: &mut PgConnection,
        manager_id: Uuid,
        user: &CurrentUser,
    ) -> Result<ContractManagerDetail, AppError> {
        let manager = self
            .repo
            .find_manager(&mut *conn, manager_id)
            .await?
            .ok_or(AppError::ManagerNotFound)?;

        if manager.manager.user_id != user.id {
            let contract = self.load_contract(conn, manager.manager.contract_id).await?;
            self.ensure_reader(conn, &contract, user).await?;
        }
        Ok(manager)
    }

    pub async fn remove_manager(
        &self,
        conn: &mut PgConnection,
        manager_id: Uuid,
        user: &CurrentUser,
    ) -> Result<(), AppError> {
        let manager = self
            .repo
            .find_manager(&mut *conn, manager_id)
            .await?
            .ok_or(AppError::ManagerNotFound)?;
        let contract = self.load_contract(conn, manager.manager.contract_id).await?;
        ensure_contract_owner(&contract, user)?;

        self.repo.deactivate_manager(&mut *conn, manager_id).await?;
        tracing::info!(
            "🗑️ Gestor {} removido do contrato '{}'",
            manager.user.email, contract.contract_number
        );
        Ok(())
    }

    /// Vínculos ativos do chamador, com o resumo de cada contrato.
    pub async fn user_contracts(&self, conn: &mut PgConnection, user: &CurrentUser) -> Result<Vec<UserContract>, AppError> {
        self.repo.list_user_contracts(&mut *conn, user.id).await
    }

    pub async fn is_manager(&self, conn: &mut PgConnection, contract_id: Uuid, user: &CurrentUser) -> Result<bool, AppError> {
        self.repo.is_active_manager(&mut *conn, contract_id, user.id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn one_active_link_per_user() {
        assert!(ensure_manager_slot(false, false, false).is_ok());
        assert!(matches!(
            ensure_manager_slot(true, false, false),
            Err(AppError::ManagerAlreadyAssigned)
        ));
    }

    #[test]
    fn second_primary_rejected() {
        assert!(ensure_manager_slot(false, true, false).is_ok());
        assert!(matches!(
            ensure_manager_slot(false, true, true),
            Err(AppError::PrimaryManagerExists)
        ));
        // Secundário não compete com o principal existente
        assert!(ensure_manager_slot(false, false, true).is_ok());
    }

    // ---
    // Com banco
    // ---

    use crate::db::fixtures::{insert_level, insert_node, insert_org, insert_user};
    use serde_json::json;
    use sqlx::PgPool;
    use validator::Validate;

    fn service(pool: &PgPool) -> ContractService {
        ContractService::new(
            ContractRepository::new(),
            AdministrativeRepository::new(),
            OrgRepository::new(pool.clone()),
        )
    }

    fn contract_payload(number: &str, state_id: Uuid, node_ids: &[Uuid]) -> CreateContractPayload {
        let payload: CreateContractPayload = serde_json::from_value(json!({
            "contract_number": number,
            "title": "Gestion territoriale",
            "contract_type": "national",
            "government_org_id": state_id,
            "start_date": "2026-01-01",
            "end_date": "2028-12-31",
            "administrative_node_ids": node_ids
        }))
        .unwrap();
        payload.validate().unwrap();
        payload
    }

    fn manager_payload(user_id: Uuid, is_primary: bool) -> AssignManagerPayload {
        serde_json::from_value(json!({
            "user_id": user_id,
            "is_primary": is_primary,
            "start_date": "2026-01-01"
        }))
        .unwrap()
    }

    struct Setup {
        state: Uuid,
        admin: CurrentUser,
        dakar: Uuid,
        bamako: Uuid,
    }

    async fn setup(pool: &PgPool) -> Setup {
        let state = insert_org(pool, "République du Sénégal", true).await;
        let admin = insert_user(pool, "admin@sn.gov", state, "admin").await;
        let region = insert_level(pool, state, "REG", 1).await;
        let dakar = insert_node(pool, state, region, None, "Dakar").await;

        let mali = insert_org(pool, "République du Mali", true).await;
        let mali_region = insert_level(pool, mali, "REG", 1).await;
        let bamako = insert_node(pool, mali, mali_region, None, "Bamako").await;

        Setup { state, admin, dakar, bamako }
    }

    #[sqlx::test]
    async fn contract_is_created_with_its_territorial_scope(pool: PgPool) {
        let s = setup(&pool).await;
        let svc = service(&pool);
        let mut conn = pool.acquire().await.unwrap();

        let detail = svc
            .create_contract(&mut *conn, &s.admin, &contract_payload("SN-2026-001", s.state, &[s.dakar, s.dakar]))
            .await
            .unwrap();
        assert_eq!(detail.contract.status, ContractStatus::Draft);
        assert_eq!(detail.contract.currency, "EUR");
        assert!(detail.contract.approved_at.is_none());
        assert_eq!(detail.government_org.name, "République du Sénégal");
        assert_eq!(detail.scope.len(), 1);
        assert_eq!(detail.scope[0].node_id, s.dakar);
        assert!(detail.scope[0].includes_subtree);

        let err = svc
            .create_contract(&mut *conn, &s.admin, &contract_payload("SN-2026-001", s.state, &[]))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::ContractNumberAlreadyExists(n) if n == "SN-2026-001"));
    }

    #[sqlx::test]
    async fn contract_scope_and_counterpart_are_checked(pool: PgPool) {
        let s = setup(&pool).await;
        let svc = service(&pool);
        let mut conn = pool.acquire().await.unwrap();

        let err = svc
            .create_contract(&mut *conn, &s.admin, &contract_payload("SN-2026-002", s.state, &[s.bamako]))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::ScopeNodeNotInState(id) if id == s.bamako));

        let cabinet = insert_org(&pool, "Cabinet Conseil", false).await;
        let err = svc
            .create_contract(&mut *conn, &s.admin, &contract_payload("SN-2026-003", cabinet, &[]))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::ContractOrgNotState(id) if id == cabinet));

        // Nada ficou gravado pelas tentativas rejeitadas
        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM government_contract")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(total, 0);
    }

    #[sqlx::test]
    async fn managers_lifecycle(pool: PgPool) {
        let s = setup(&pool).await;
        let cabinet = insert_org(&pool, "Cabinet Conseil", false).await;
        let consultant = insert_user(&pool, "chef.projet@conseil.sn", cabinet, "member").await;
        let deputy = insert_user(&pool, "adjoint@conseil.sn", cabinet, "member").await;
        let stranger = insert_user(&pool, "curieux@conseil.sn", cabinet, "member").await;
        let svc = service(&pool);
        let mut conn = pool.acquire().await.unwrap();

        let contract = svc
            .create_contract(&mut *conn, &s.admin, &contract_payload("SN-2026-010", s.state, &[s.dakar]))
            .await
            .unwrap()
            .contract;

        let manager = svc
            .assign_manager(&mut *conn, contract.id, &s.admin, &manager_payload(consultant.id, true))
            .await
            .unwrap();
        assert!(manager.manager.is_primary);
        assert_eq!(manager.manager.role, "contract_manager");
        assert_eq!(manager.user.email, "chef.projet@conseil.sn");
        assert_eq!(manager.contract.contract_number, "SN-2026-010");

        assert!(matches!(
            svc.assign_manager(&mut *conn, contract.id, &s.admin, &manager_payload(consultant.id, false)).await,
            Err(AppError::ManagerAlreadyAssigned)
        ));
        assert!(matches!(
            svc.assign_manager(&mut *conn, contract.id, &s.admin, &manager_payload(deputy.id, true)).await,
            Err(AppError::PrimaryManagerExists)
        ));
        svc.assign_manager(&mut *conn, contract.id, &s.admin, &manager_payload(deputy.id, false))
            .await
            .unwrap();

        // Gestor lê o contrato; quem não é gestor nem do Estado, não
        assert!(svc.get_contract(&mut *conn, contract.id, &consultant).await.is_ok());
        assert!(matches!(
            svc.get_contract(&mut *conn, contract.id, &stranger).await,
            Err(AppError::StateAccessDenied(_))
        ));
        let managers = svc.list_managers(&mut *conn, contract.id, &s.admin).await.unwrap();
        assert_eq!(managers.len(), 2);
        assert_eq!(managers[0].user.id, consultant.id);
        assert!(svc.is_manager(&mut *conn, contract.id, &consultant).await.unwrap());
        assert_eq!(svc.user_contracts(&mut *conn, &consultant).await.unwrap().len(), 1);

        // Só o Estado remove
        assert!(matches!(
            svc.remove_manager(&mut *conn, manager.manager.id, &consultant).await,
            Err(AppError::StateAccessDenied(_))
        ));
        svc.remove_manager(&mut *conn, manager.manager.id, &s.admin).await.unwrap();
        assert!(!svc.is_manager(&mut *conn, contract.id, &consultant).await.unwrap());
        assert!(svc.user_contracts(&mut *conn, &consultant).await.unwrap().is_empty());
        assert!(matches!(
            svc.get_contract(&mut *conn, contract.id, &consultant).await,
            Err(AppError::StateAccessDenied(_))
        ));

        // O vínculo desativado continua visível para o próprio usuário
        let former = svc.get_manager(&mut *conn, manager.manager.id, &consultant).await.unwrap();
        assert!(!former.manager.active);

        // Com o principal removido, outro pode assumir
        let promoted = svc
            .assign_manager(&mut *conn, contract.id, &s.admin, &manager_payload(consultant.id, true))
            .await
            .unwrap();
        assert!(promoted.manager.active);
    }

    #[sqlx::test]
    async fn status_change_controls_the_active_listing(pool: PgPool) {
        let s = setup(&pool).await;
        let svc = service(&pool);
        let mut conn = pool.acquire().await.unwrap();

        let contract = svc
            .create_contract(&mut *conn, &s.admin, &contract_payload("SN-2026-020", s.state, &[]))
            .await
            .unwrap()
            .contract;
        assert!(svc.list_org_contracts(&mut *conn, s.state, &s.admin).await.unwrap().is_empty());

        let updated = svc
            .update_status(&mut *conn, contract.id, &s.admin, ContractStatus::Active)
            .await
            .unwrap();
        assert_eq!(updated.status, ContractStatus::Active);

        let active = svc.list_org_contracts(&mut *conn, s.state, &s.admin).await.unwrap();
        assert_eq!(active.iter().map(|c| c.id).collect::<Vec<_>>(), vec![contract.id]);

        assert!(matches!(
            svc.update_status(&mut *conn, Uuid::new_v4(), &s.admin, ContractStatus::Active).await,
            Err(AppError::ContractNotFound)
        ));
    }
}
