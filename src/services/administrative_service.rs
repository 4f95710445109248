// src/services/administrative_service.rs

use std::collections::HashMap;

use sqlx::PgConnection;
use uuid::Uuid;

use crate::{
    common::error::AppError,
    db::{AdministrativeRepository, OrgRepository, ProjectRepository, RowLock},
    models::{
        administrative::{
            AdministrativeLevel, AdministrativeNodeDetail, AdministrativeNodeWithLevel,
            AdministrativeTreeNode, AdministrativeUserAssignment, AssignUserPayload,
            CreateLevelPayload, CreateNodePayload, ParentSummary, UpdateLevelPayload,
            UpdateNodePayload, UserNodeAssignment,
        },
        auth::CurrentUser,
        project::Project,
    },
    services::{
        hierarchy::HierarchySnapshot,
        scope::{authorized_nodes, StateAccess},
    },
};

// ---
// Guardas da hierarquia (funções puras, testadas isoladamente)
// ---

/// O pai precisa estar num nível estritamente mais alto (level_order menor).
pub fn check_parent_level(parent: &AdministrativeLevel, child: &AdministrativeLevel) -> Result<(), AppError> {
    if parent.level_order >= child.level_order {
        return Err(AppError::ParentLevelNotHigher {
            parent_order: parent.level_order,
            child_order: child.level_order,
        });
    }
    Ok(())
}

/// Nó sem pai: permitido no nível do topo ou em níveis com requires_parent = false.
pub fn check_root_allowed(level: &AdministrativeLevel, top_level_order: Option<i32>) -> Result<(), AppError> {
    let is_top = top_level_order.is_none_or(|top| level.level_order <= top);
    if level.requires_parent && !is_top {
        return Err(AppError::ParentRequired(level.name.clone()));
    }
    Ok(())
}

pub fn ensure_level_unused(referencing_nodes: i64) -> Result<(), AppError> {
    if referencing_nodes > 0 {
        return Err(AppError::LevelInUse);
    }
    Ok(())
}

/// Reordenar um nível não pode inverter nenhuma ligação pai/filho existente:
/// os pais dos nós do nível continuam acima e os filhos continuam abaixo.
pub fn check_level_reorder(snapshot: &HierarchySnapshot, level_id: Uuid, new_order: i32) -> Result<(), AppError> {
    for node in snapshot.nodes_on_level(level_id) {
        if let Some(parent) = snapshot.parent_of(node.node.id) {
            let parent_order = if parent.level.id == level_id { new_order } else { parent.level.level_order };
            if parent_order >= new_order {
                return Err(AppError::ParentLevelNotHigher { parent_order, child_order: new_order });
            }
        }
        for child in snapshot.children_of(node.node.id) {
            if child.level.id != level_id && child.level.level_order <= new_order {
                return Err(AppError::ParentLevelNotHigher {
                    parent_order: new_order,
                    child_order: child.level.level_order,
                });
            }
        }
    }
    Ok(())
}

pub fn ensure_childless(active_children: i64) -> Result<(), AppError> {
    if active_children > 0 {
        return Err(AppError::NodeHasChildren);
    }
    Ok(())
}

#[derive(Clone)]
pub struct AdministrativeService {
    repo: AdministrativeRepository,
    org_repo: OrgRepository,
    project_repo: ProjectRepository,
}

impl AdministrativeService {
    pub fn new(
        repo: AdministrativeRepository,
        org_repo: OrgRepository,
        project_repo: ProjectRepository,
    ) -> Self {
        Self { repo, org_repo, project_repo }
    }

    // =========================================================================
    //  ACESSO
    // =========================================================================

    async fn load_snapshot(&self, conn: &mut PgConnection, state_id: Uuid) -> Result<HierarchySnapshot, AppError> {
        let nodes = self.repo.list_active_nodes(&mut *conn, state_id).await?;
        Ok(HierarchySnapshot::new(nodes))
    }

    /// Resolve como o usuário enxerga o Estado. Estado inexistente (ou que não
    /// é Estado) é tratado como acesso negado.
    pub async fn resolve_state_access(
        &self,
        conn: &mut PgConnection,
        state_id: Uuid,
        user: &CurrentUser,
    ) -> Result<StateAccess, AppError> {
        self.org_repo
            .find_state(&mut *conn, state_id)
            .await?
            .ok_or(AppError::StateAccessDenied(state_id))?;

        if user.org_id == state_id {
            return Ok(StateAccess::Member);
        }

        // Sem vínculo com a organização: só as atribuições contam
        let assignments = self.repo.list_user_assignments(&mut *conn, user.id, state_id).await?;
        if assignments.is_empty() {
            return Err(AppError::StateAccessDenied(state_id));
        }

        let snapshot = self.load_snapshot(conn, state_id).await?;
        Ok(StateAccess::Delegated(authorized_nodes(&snapshot, &assignments)))
    }

    /// Escritas exigem que o token seja da própria organização do Estado.
    async fn ensure_member(&self, conn: &mut PgConnection, state_id: Uuid, user: &CurrentUser) -> Result<(), AppError> {
        match self.resolve_state_access(conn, state_id, user).await? {
            StateAccess::Member => Ok(()),
            StateAccess::Delegated(_) => Err(AppError::StateAccessDenied(state_id)),
        }
    }

    /// Subrecursos da árvore (filhos, ancestrais, subárvore) só existem para nós ativos.
    async fn load_active_node(
        &self,
        conn: &mut PgConnection,
        node_id: Uuid,
        user: &CurrentUser,
    ) -> Result<(AdministrativeNodeWithLevel, StateAccess), AppError> {
        let (node, access) = self.load_accessible_node(conn, node_id, user).await?;
        if !node.node.active {
            return Err(AppError::NodeNotFound);
        }
        Ok((node, access))
    }

    /// Busca o nó pelo id global e revalida o acesso a partir do state_id dele.
    async fn load_accessible_node(
        &self,
        conn: &mut PgConnection,
        node_id: Uuid,
        user: &CurrentUser,
    ) -> Result<(AdministrativeNodeWithLevel, StateAccess), AppError> {
        let node = self
            .repo
            .find_node(&mut *conn, node_id)
            .await?
            .ok_or(AppError::NodeNotFound)?;

        let access = self.resolve_state_access(conn, node.node.state_id, user).await?;
        if !access.allows(node_id) {
            return Err(AppError::NodeAccessDenied(node_id));
        }
        Ok((node, access))
    }

    // =========================================================================
    //  NÍVEIS
    // =========================================================================

    pub async fn list_levels(
        &self,
        conn: &mut PgConnection,
        state_id: Uuid,
        user: &CurrentUser,
    ) -> Result<Vec<AdministrativeLevel>, AppError> {
        self.resolve_state_access(conn, state_id, user).await?;
        self.repo.list_active_levels(&mut *conn, state_id).await
    }

    pub async fn create_level(
        &self,
        conn: &mut PgConnection,
        state_id: Uuid,
        user: &CurrentUser,
        input: &CreateLevelPayload,
    ) -> Result<AdministrativeLevel, AppError> {
        self.ensure_member(conn, state_id, user).await?;

        let level = self.repo.create_level(&mut *conn, state_id, input).await?;
        tracing::info!("🗺️ Nível '{}' (ordem {}) criado no Estado {}", level.code, level.level_order, state_id);
        Ok(level)
    }

    pub async fn update_level(
        &self,
        conn: &mut PgConnection,
        state_id: Uuid,
        level_id: Uuid,
        user: &CurrentUser,
        input: &UpdateLevelPayload,
    ) -> Result<AdministrativeLevel, AppError> {
        self.ensure_member(conn, state_id, user).await?;

        // Trava o nível: criações e movimentos que o usam esperam esta transação
        let current = self
            .repo
            .find_level_locked(&mut *conn, state_id, level_id, RowLock::Update)
            .await?
            .ok_or(AppError::LevelNotFound)?;

        let reorders = input.level_order.is_some_and(|order| order != current.level_order);
        let deactivates = input.active == Some(false) && current.active;
        if reorders || deactivates {
            let snapshot = self.load_snapshot(conn, state_id).await?;
            if deactivates {
                ensure_level_unused(snapshot.nodes_on_level(level_id).count() as i64)?;
            }
            if let Some(order) = input.level_order.filter(|_| reorders) {
                check_level_reorder(&snapshot, level_id, order)?;
            }
        }

        self.repo
            .update_level(&mut *conn, state_id, level_id, input)
            .await?
            .ok_or(AppError::LevelNotFound)
    }

    pub async fn delete_level(
        &self,
        conn: &mut PgConnection,
        state_id: Uuid,
        level_id: Uuid,
        user: &CurrentUser,
    ) -> Result<(), AppError> {
        self.ensure_member(conn, state_id, user).await?;

        self.repo
            .find_level_locked(&mut *conn, state_id, level_id, RowLock::Update)
            .await?
            .ok_or(AppError::LevelNotFound)?;

        let in_use = self.repo.count_nodes_using_level(&mut *conn, level_id).await?;
        ensure_level_unused(in_use)?;

        self.repo.delete_level(&mut *conn, state_id, level_id).await?;
        tracing::info!("🗑️ Nível {} removido do Estado {}", level_id, state_id);
        Ok(())
    }

    // =========================================================================
    //  ÁRVORE
    // =========================================================================

    pub async fn get_tree(
        &self,
        conn: &mut PgConnection,
        state_id: Uuid,
        user: &CurrentUser,
    ) -> Result<Vec<AdministrativeTreeNode>, AppError> {
        let access = self.resolve_state_access(conn, state_id, user).await?;
        let snapshot = self.load_snapshot(conn, state_id).await?;

        let snapshot = match &access {
            StateAccess::Member => snapshot,
            StateAccess::Delegated(allowed) => snapshot.restrict(allowed),
        };

        tracing::debug!("Árvore do Estado {} montada com {} nós", state_id, snapshot.len());
        Ok(snapshot.into_forest())
    }

    // =========================================================================
    //  NÓS
    // =========================================================================

    pub async fn create_node(
        &self,
        conn: &mut PgConnection,
        state_id: Uuid,
        user: &CurrentUser,
        input: &CreateNodePayload,
    ) -> Result<AdministrativeNodeWithLevel, AppError> {
        self.ensure_member(conn, state_id, user).await?;

        // 1. O nível precisa ser deste Estado
        let level = self
            .repo
            .find_level_locked(&mut *conn, state_id, input.level_id, RowLock::Share)
            .await?
            .ok_or(AppError::LevelNotFound)?;

        // 2. O pai (se houver) precisa existir, estar ativo e ser deste Estado.
        //    Fica travado até o commit para não ser desativado no meio do caminho.
        match input.parent_id {
            Some(parent_id) => {
                let parent = self
                    .repo
                    .find_node_locked(&mut *conn, state_id, parent_id, RowLock::Share)
                    .await?
                    .filter(|p| p.node.active)
                    .ok_or(AppError::ParentNodeNotFound)?;
                check_parent_level(&parent.level, &level)?;
            }
            None => {
                let top = self.repo.top_level_order(&mut *conn, state_id).await?;
                check_root_allowed(&level, top)?;
            }
        }

        // 3. Insere
        let node = self.repo.create_node(&mut *conn, state_id, input).await?;
        tracing::info!("📍 Nó '{}' ({}) criado no Estado {}", node.name, level.code, state_id);

        Ok(AdministrativeNodeWithLevel { node, level })
    }

    pub async fn get_node(
        &self,
        conn: &mut PgConnection,
        node_id: Uuid,
        user: &CurrentUser,
    ) -> Result<AdministrativeNodeDetail, AppError> {
        let (node, _) = self.load_accessible_node(conn, node_id, user).await?;

        let parent = match node.node.parent_id {
            Some(parent_id) => self
                .repo
                .find_node(&mut *conn, parent_id)
                .await?
                .map(|p| ParentSummary {
                    id: p.node.id,
                    name: p.node.name,
                    level_name: p.level.name,
                }),
            None => None,
        };

        Ok(AdministrativeNodeDetail { node, parent })
    }

    pub async fn update_node(
        &self,
        conn: &mut PgConnection,
        node_id: Uuid,
        user: &CurrentUser,
        input: &UpdateNodePayload,
    ) -> Result<AdministrativeNodeWithLevel, AppError> {
        let current = self
            .repo
            .find_node(&mut *conn, node_id)
            .await?
            .ok_or(AppError::NodeNotFound)?;
        let state_id = current.node.state_id;
        self.ensure_member(conn, state_id, user).await?;

        if input.moves_node() {
            self.check_move(conn, &current, input).await?;
        }

        self.repo.update_node(&mut *conn, node_id, input).await?;

        self.repo
            .find_node(&mut *conn, node_id)
            .await?
            .ok_or(AppError::NodeNotFound)
    }

    /// Revalida a posição do nó quando o pai ou o nível mudam.
    async fn check_move(
        &self,
        conn: &mut PgConnection,
        current: &AdministrativeNodeWithLevel,
        input: &UpdateNodePayload,
    ) -> Result<(), AppError> {
        let node_id = current.node.id;
        let state_id = current.node.state_id;

        let level_id = input.level_id.unwrap_or(current.level.id);
        let level = self
            .repo
            .find_level_locked(&mut *conn, state_id, level_id, RowLock::Share)
            .await?
            .ok_or(AppError::LevelNotFound)?;

        // Ausente = mantém o pai atual
        let parent_id = match input.parent_id {
            Some(new_parent) => new_parent,
            None => current.node.parent_id,
        };

        let parent = match parent_id {
            Some(parent_id) => Some(
                self.repo
                    .find_node_locked(&mut *conn, state_id, parent_id, RowLock::Share)
                    .await?
                    .filter(|p| p.node.active)
                    .ok_or(AppError::ParentNodeNotFound)?,
            ),
            None => None,
        };

        let snapshot = self.load_snapshot(conn, state_id).await?;

        match parent {
            Some(parent) => {
                if parent.node.id == node_id || snapshot.is_in_subtree(node_id, parent.node.id) {
                    return Err(AppError::ParentCycle);
                }
                check_parent_level(&parent.level, &level)?;
            }
            None => {
                let top = self.repo.top_level_order(&mut *conn, state_id).await?;
                check_root_allowed(&level, top)?;
            }
        }

        // Os filhos atuais continuam abaixo do novo nível
        for child in snapshot.children_of(node_id) {
            check_parent_level(&level, &child.level)?;
        }
        Ok(())
    }

    pub async fn delete_node(
        &self,
        conn: &mut PgConnection,
        node_id: Uuid,
        user: &CurrentUser,
    ) -> Result<(), AppError> {
        let node = self
            .repo
            .find_node(&mut *conn, node_id)
            .await?
            .ok_or(AppError::NodeNotFound)?;
        self.ensure_member(conn, node.node.state_id, user).await?;

        // Trava o nó antes de contar os filhos: uma criação concorrente sob ele
        // espera o commit e então encontra o pai inativo.
        self.repo
            .find_node_locked(&mut *conn, node.node.state_id, node_id, RowLock::Update)
            .await?
            .ok_or(AppError::NodeNotFound)?;

        let children = self.repo.count_active_children(&mut *conn, node_id).await?;
        ensure_childless(children)?;

        self.repo.soft_delete_node(&mut *conn, node_id).await?;
        tracing::info!("🗑️ Nó '{}' desativado", node.node.name);
        Ok(())
    }

    pub async fn get_children(
        &self,
        conn: &mut PgConnection,
        node_id: Uuid,
        user: &CurrentUser,
    ) -> Result<Vec<AdministrativeNodeWithLevel>, AppError> {
        let (node, access) = self.load_active_node(conn, node_id, user).await?;
        let snapshot = self.load_snapshot(conn, node.node.state_id).await?;

        Ok(snapshot
            .children_of(node_id)
            .into_iter()
            .filter(|c| access.allows(c.node.id))
            .collect())
    }

    /// Ancestrais do nó, da raiz até ele (inclusive).
    pub async fn get_hierarchy(
        &self,
        conn: &mut PgConnection,
        node_id: Uuid,
        user: &CurrentUser,
    ) -> Result<Vec<AdministrativeNodeWithLevel>, AppError> {
        let (node, _) = self.load_active_node(conn, node_id, user).await?;
        let snapshot = self.load_snapshot(conn, node.node.state_id).await?;
        Ok(snapshot.ancestry(node_id))
    }

    /// O nó e todos os descendentes ativos.
    pub async fn get_subtree(
        &self,
        conn: &mut PgConnection,
        node_id: Uuid,
        user: &CurrentUser,
    ) -> Result<Vec<AdministrativeNodeWithLevel>, AppError> {
        let (node, access) = self.load_active_node(conn, node_id, user).await?;
        let snapshot = self.load_snapshot(conn, node.node.state_id).await?;

        Ok(snapshot
            .subtree(node_id)
            .into_iter()
            .filter(|n| access.allows(n.node.id))
            .collect())
    }

    pub async fn get_node_projects(
        &self,
        conn: &mut PgConnection,
        node_id: Uuid,
        include_children: bool,
        user: &CurrentUser,
    ) -> Result<Vec<Project>, AppError> {
        let (node, access) = self.load_accessible_node(conn, node_id, user).await?;

        let mut node_ids = vec![node_id];
        if include_children {
            let snapshot = self.load_snapshot(conn, node.node.state_id).await?;
            let subtree = snapshot.subtree_ids(node_id);
            // Nó inativo não está na fotografia: fica só com ele mesmo
            if !subtree.is_empty() {
                node_ids = subtree;
            }
        }

        let node_ids = access.filter_ids(node_ids);
        self.project_repo.list_for_nodes(&mut *conn, &node_ids).await
    }

    // =========================================================================
    //  ATRIBUIÇÕES
    // =========================================================================

    pub async fn assign_user(
        &self,
        conn: &mut PgConnection,
        node_id: Uuid,
        user: &CurrentUser,
        input: &AssignUserPayload,
    ) -> Result<AdministrativeUserAssignment, AppError> {
        let node = self
            .repo
            .find_node(&mut *conn, node_id)
            .await?
            .ok_or(AppError::NodeNotFound)?;
        self.ensure_member(conn, node.node.state_id, user).await?;

        if !self.org_repo.user_exists(&mut *conn, input.user_id).await? {
            return Err(AppError::UserNotFound);
        }

        let assignment = self
            .repo
            .upsert_assignment(&mut *conn, node_id, input, user.id)
            .await?;

        tracing::info!(
            "👤 Usuário {} atribuído ao nó '{}' como '{}' ({:?})",
            input.user_id, node.node.name, assignment.role, assignment.scope
        );
        Ok(assignment)
    }

    /// Atribuições ativas de um usuário no Estado, com o nó e o nível de cada uma.
    /// Liberado para membros do Estado e para o próprio usuário.
    pub async fn get_user_nodes(
        &self,
        conn: &mut PgConnection,
        state_id: Uuid,
        target_user_id: Uuid,
        user: &CurrentUser,
    ) -> Result<Vec<UserNodeAssignment>, AppError> {
        self.org_repo
            .find_state(&mut *conn, state_id)
            .await?
            .ok_or(AppError::StateAccessDenied(state_id))?;

        if user.org_id != state_id && user.id != target_user_id {
            return Err(AppError::StateAccessDenied(state_id));
        }

        let assignments = self
            .repo
            .list_user_assignments(&mut *conn, target_user_id, state_id)
            .await?;

        let node_ids: Vec<Uuid> = assignments.iter().map(|a| a.node_id).collect();
        let mut nodes: HashMap<Uuid, AdministrativeNodeWithLevel> = self
            .repo
            .find_nodes_by_ids(&mut *conn, &node_ids)
            .await?
            .into_iter()
            .map(|n| (n.node.id, n))
            .collect();

        Ok(assignments
            .into_iter()
            .filter_map(|assignment| {
                let node = nodes.remove(&assignment.node_id)?;
                Some(UserNodeAssignment { assignment, node })
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::hierarchy::tests::{level, node};

    #[test]
    fn parent_must_be_strictly_higher() {
        let region = level("region", 1);
        let commune = level("commune", 2);
        assert!(check_parent_level(&region, &commune).is_ok());
        assert!(matches!(
            check_parent_level(&commune, &region),
            Err(AppError::ParentLevelNotHigher { parent_order: 2, child_order: 1 })
        ));
        assert!(matches!(
            check_parent_level(&commune, &commune),
            Err(AppError::ParentLevelNotHigher { .. })
        ));
    }

    #[test]
    fn top_level_may_be_root_even_when_parent_required() {
        let region = level("region", 1);
        let mut forced = region.clone();
        forced.requires_parent = true;
        assert!(check_root_allowed(&forced, Some(1)).is_ok());
        // Primeiro nível do Estado ainda sem outros níveis ativos
        assert!(check_root_allowed(&forced, None).is_ok());
    }

    #[test]
    fn deeper_level_needs_parent_unless_flag_off() {
        let mut commune = level("commune", 3);
        commune.requires_parent = true;
        assert!(matches!(
            check_root_allowed(&commune, Some(1)),
            Err(AppError::ParentRequired(name)) if name == "commune"
        ));

        commune.requires_parent = false;
        assert!(check_root_allowed(&commune, Some(1)).is_ok());
    }

    #[test]
    fn level_delete_rejected_while_referenced() {
        assert!(ensure_level_unused(0).is_ok());
        assert!(matches!(ensure_level_unused(1), Err(AppError::LevelInUse)));
    }

    #[test]
    fn node_delete_rejected_with_direct_children() {
        assert!(ensure_childless(0).is_ok());
        assert!(matches!(ensure_childless(3), Err(AppError::NodeHasChildren)));
    }

    #[test]
    fn reorder_keeps_parents_above_and_children_below() {
        let region = level("region", 1);
        let department = level("department", 2);
        let commune = level("commune", 3);
        let dakar = node("Dakar", &region, None);
        let pikine = node("Pikine", &department, Some(dakar.node.id));
        let guinaw = node("Guinaw Rail", &commune, Some(pikine.node.id));
        let snapshot = HierarchySnapshot::new(vec![dakar, pikine, guinaw]);

        // Continua entre o pai (1) e o filho (3)
        assert!(check_level_reorder(&snapshot, department.id, 2).is_ok());
        assert!(matches!(
            check_level_reorder(&snapshot, department.id, 3),
            Err(AppError::ParentLevelNotHigher { parent_order: 3, child_order: 3 })
        ));
        assert!(matches!(
            check_level_reorder(&snapshot, region.id, 5),
            Err(AppError::ParentLevelNotHigher { parent_order: 5, child_order: 2 })
        ));
        assert!(matches!(
            check_level_reorder(&snapshot, commune.id, 1),
            Err(AppError::ParentLevelNotHigher { parent_order: 2, child_order: 1 })
        ));
        // Nível sem nós pode ir para qualquer ordem
        assert!(check_level_reorder(&snapshot, level("quartier", 4).id, 1).is_ok());
    }

    // ---
    // Com banco (#[sqlx::test] cria um banco novo e aplica ./migrations)
    // ---

    use crate::db::fixtures::{
        assign, deactivate_node, insert_level, insert_node, insert_org, insert_project, insert_user,
    };
    use sqlx::PgPool;
    use std::time::Duration;

    fn service(pool: &PgPool) -> AdministrativeService {
        AdministrativeService::new(
            AdministrativeRepository::new(),
            OrgRepository::new(pool.clone()),
            ProjectRepository::new(),
        )
    }

    struct Territory {
        state: Uuid,
        admin: CurrentUser,
        region: Uuid,
        commune: Uuid,
    }

    async fn territory(pool: &PgPool, name: &str, admin_email: &str) -> Territory {
        let state = insert_org(pool, name, true).await;
        let admin = insert_user(pool, admin_email, state, "admin").await;
        let region = insert_level(pool, state, "REG", 1).await;
        let commune = insert_level(pool, state, "COM", 2).await;
        Territory { state, admin, region, commune }
    }

    fn new_node(level_id: Uuid, parent_id: Option<Uuid>, name: &str) -> CreateNodePayload {
        CreateNodePayload {
            parent_id,
            level_id,
            name: name.into(),
            code: None,
            description: None,
            population: None,
            area_sqm: None,
            metadata: None,
        }
    }

    #[sqlx::test]
    async fn level_reorder_that_would_invert_links_is_rejected(pool: PgPool) {
        let t = territory(&pool, "République du Sénégal", "admin@sn.gov").await;
        let dakar = insert_node(&pool, t.state, t.region, None, "Dakar").await;
        insert_node(&pool, t.state, t.commune, Some(dakar), "Pikine").await;
        let svc = service(&pool);
        let mut conn = pool.acquire().await.unwrap();

        let push_region_down = UpdateLevelPayload { level_order: Some(5), ..Default::default() };
        let err = svc
            .update_level(&mut *conn, t.state, t.region, &t.admin, &push_region_down)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::ParentLevelNotHigher { parent_order: 5, child_order: 2 }));

        let levels = svc.list_levels(&mut *conn, t.state, &t.admin).await.unwrap();
        assert_eq!(levels.iter().map(|l| l.level_order).collect::<Vec<_>>(), vec![1, 2]);

        // Abaixo do pai continua valendo
        let push_commune_down = UpdateLevelPayload { level_order: Some(4), ..Default::default() };
        let commune = svc
            .update_level(&mut *conn, t.state, t.commune, &t.admin, &push_commune_down)
            .await
            .unwrap();
        assert_eq!(commune.level_order, 4);
    }

    #[sqlx::test]
    async fn level_with_active_nodes_cannot_be_deactivated(pool: PgPool) {
        let t = territory(&pool, "République du Sénégal", "admin@sn.gov").await;
        let dakar = insert_node(&pool, t.state, t.region, None, "Dakar").await;
        let pikine = insert_node(&pool, t.state, t.commune, Some(dakar), "Pikine").await;
        let svc = service(&pool);
        let mut conn = pool.acquire().await.unwrap();

        let deactivate = UpdateLevelPayload { active: Some(false), ..Default::default() };
        let err = svc
            .update_level(&mut *conn, t.state, t.commune, &t.admin, &deactivate)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::LevelInUse));

        deactivate_node(&pool, pikine).await;
        let commune = svc
            .update_level(&mut *conn, t.state, t.commune, &t.admin, &deactivate)
            .await
            .unwrap();
        assert!(!commune.active);
    }

    #[sqlx::test]
    async fn level_delete_counts_inactive_nodes_too(pool: PgPool) {
        let t = territory(&pool, "République du Sénégal", "admin@sn.gov").await;
        let dakar = insert_node(&pool, t.state, t.region, None, "Dakar").await;
        let pikine = insert_node(&pool, t.state, t.commune, Some(dakar), "Pikine").await;
        let quartier = insert_level(&pool, t.state, "QRT", 3).await;
        let svc = service(&pool);
        let mut conn = pool.acquire().await.unwrap();

        let err = svc.delete_level(&mut *conn, t.state, t.commune, &t.admin).await.unwrap_err();
        assert!(matches!(err, AppError::LevelInUse));

        deactivate_node(&pool, pikine).await;
        let err = svc.delete_level(&mut *conn, t.state, t.commune, &t.admin).await.unwrap_err();
        assert!(matches!(err, AppError::LevelInUse));

        svc.delete_level(&mut *conn, t.state, quartier, &t.admin).await.unwrap();
        let levels = svc.list_levels(&mut *conn, t.state, &t.admin).await.unwrap();
        assert!(levels.iter().all(|l| l.id != quartier));
    }

    #[sqlx::test]
    async fn deleted_leaf_leaves_the_tree_but_stays_readable(pool: PgPool) {
        let t = territory(&pool, "République du Sénégal", "admin@sn.gov").await;
        let dakar = insert_node(&pool, t.state, t.region, None, "Dakar").await;
        let pikine = insert_node(&pool, t.state, t.commune, Some(dakar), "Pikine").await;
        let svc = service(&pool);
        let mut conn = pool.acquire().await.unwrap();

        let err = svc.delete_node(&mut *conn, dakar, &t.admin).await.unwrap_err();
        assert!(matches!(err, AppError::NodeHasChildren));

        svc.delete_node(&mut *conn, pikine, &t.admin).await.unwrap();

        let tree = svc.get_tree(&mut *conn, t.state, &t.admin).await.unwrap();
        assert_eq!(tree.len(), 1);
        assert_eq!(tree[0].node.node.id, dakar);
        assert!(tree[0].children.is_empty());

        // O registro continua consultável, mas sem subrecursos de árvore
        let detail = svc.get_node(&mut *conn, pikine, &t.admin).await.unwrap();
        assert!(!detail.node.node.active);
        assert!(matches!(
            svc.get_children(&mut *conn, pikine, &t.admin).await,
            Err(AppError::NodeNotFound)
        ));
        assert!(matches!(
            svc.get_hierarchy(&mut *conn, pikine, &t.admin).await,
            Err(AppError::NodeNotFound)
        ));
        assert!(matches!(
            svc.get_subtree(&mut *conn, pikine, &t.admin).await,
            Err(AppError::NodeNotFound)
        ));

        // Sem filhos ativos, o pai pode sair
        svc.delete_node(&mut *conn, dakar, &t.admin).await.unwrap();
        assert!(svc.get_tree(&mut *conn, t.state, &t.admin).await.unwrap().is_empty());
    }

    #[sqlx::test]
    async fn parent_from_another_state_is_rejected(pool: PgPool) {
        let senegal = territory(&pool, "République du Sénégal", "admin@sn.gov").await;
        let mali = territory(&pool, "République du Mali", "admin@ml.gov").await;
        let dakar = insert_node(&pool, senegal.state, senegal.region, None, "Dakar").await;
        let svc = service(&pool);
        let mut conn = pool.acquire().await.unwrap();

        let err = svc
            .create_node(&mut *conn, mali.state, &mali.admin, &new_node(mali.commune, Some(dakar), "Kati"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::ParentNodeNotFound));

        // Nível de outro Estado também não serve
        let err = svc
            .create_node(&mut *conn, mali.state, &mali.admin, &new_node(senegal.region, None, "Bamako"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::LevelNotFound));
    }

    #[sqlx::test]
    async fn delegated_reads_are_limited_to_assignments(pool: PgPool) {
        let t = territory(&pool, "République du Sénégal", "admin@sn.gov").await;
        let dakar = insert_node(&pool, t.state, t.region, None, "Dakar").await;
        let thies = insert_node(&pool, t.state, t.region, None, "Thiès").await;
        let pikine = insert_node(&pool, t.state, t.commune, Some(dakar), "Pikine").await;
        insert_node(&pool, t.state, t.commune, Some(thies), "Mbour").await;

        let p_dakar = insert_project(&pool, t.state, dakar, "Marché central").await;
        let p_pikine = insert_project(&pool, t.state, pikine, "Centre de santé").await;
        insert_project(&pool, t.state, thies, "Gare routière").await;

        let cabinet = insert_org(&pool, "Cabinet Conseil", false).await;
        let subtree_user = insert_user(&pool, "gouverneur@conseil.sn", cabinet, "member").await;
        let node_user = insert_user(&pool, "maire@conseil.sn", cabinet, "member").await;
        assign(&pool, subtree_user.id, dakar, "subtree").await;
        assign(&pool, node_user.id, dakar, "node").await;

        let svc = service(&pool);
        let mut conn = pool.acquire().await.unwrap();

        let tree = svc.get_tree(&mut *conn, t.state, &subtree_user).await.unwrap();
        assert_eq!(tree.len(), 1);
        assert_eq!(tree[0].node.node.name, "Dakar");
        assert_eq!(tree[0].children.len(), 1);
        assert_eq!(tree[0].children[0].node.node.name, "Pikine");

        let mut projects: Vec<Uuid> = svc
            .get_node_projects(&mut *conn, dakar, true, &subtree_user)
            .await
            .unwrap()
            .into_iter()
            .map(|p| p.id)
            .collect();
        projects.sort();
        let mut expected = vec![p_dakar, p_pikine];
        expected.sort();
        assert_eq!(projects, expected);

        assert!(matches!(
            svc.get_node_projects(&mut *conn, thies, false, &subtree_user).await,
            Err(AppError::NodeAccessDenied(id)) if id == thies
        ));

        // Escopo "node": a subárvore fica de fora mesmo com includeChildren
        let tree = svc.get_tree(&mut *conn, t.state, &node_user).await.unwrap();
        assert_eq!(tree.len(), 1);
        assert!(tree[0].children.is_empty());
        let projects = svc.get_node_projects(&mut *conn, dakar, true, &node_user).await.unwrap();
        assert_eq!(projects.iter().map(|p| p.id).collect::<Vec<_>>(), vec![p_dakar]);

        // Delegado não escreve
        let err = svc
            .create_node(&mut *conn, t.state, &subtree_user, &new_node(t.commune, Some(dakar), "Rufisque"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::StateAccessDenied(_)));
    }

    #[sqlx::test]
    async fn child_insert_waits_for_parent_delete_and_sees_it_inactive(pool: PgPool) {
        let t = territory(&pool, "République du Sénégal", "admin@sn.gov").await;
        let dakar = insert_node(&pool, t.state, t.region, None, "Dakar").await;
        let svc = service(&pool);

        let mut deleting = pool.begin().await.unwrap();
        svc.delete_node(&mut *deleting, dakar, &t.admin).await.unwrap();

        let creator = {
            let (svc, pool, admin, commune, state) = (svc.clone(), pool.clone(), t.admin.clone(), t.commune, t.state);
            tokio::spawn(async move {
                let mut tx = pool.begin().await.unwrap();
                let created = svc
                    .create_node(&mut *tx, state, &admin, &new_node(commune, Some(dakar), "Pikine"))
                    .await;
                if created.is_ok() {
                    tx.commit().await.unwrap();
                }
                created.map(|n| n.node.id)
            })
        };

        // O INSERT fica preso na trava do pai até o DELETE confirmar
        tokio::time::sleep(Duration::from_millis(300)).await;
        assert!(!creator.is_finished());
        deleting.commit().await.unwrap();

        let created = creator.await.unwrap();
        assert!(matches!(created, Err(AppError::ParentNodeNotFound)));

        let orphans: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM administrative_node WHERE parent_id = $1 AND active = true",
        )
            .bind(dakar)
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(orphans, 0);
    }

    #[sqlx::test]
    async fn parent_delete_waits_for_child_insert_and_sees_the_child(pool: PgPool) {
        let t = territory(&pool, "République du Sénégal", "admin@sn.gov").await;
        let dakar = insert_node(&pool, t.state, t.region, None, "Dakar").await;
        let svc = service(&pool);

        let mut creating = pool.begin().await.unwrap();
        svc.create_node(&mut *creating, t.state, &t.admin, &new_node(t.commune, Some(dakar), "Pikine"))
            .await
            .unwrap();

        let deleter = {
            let (svc, pool, admin) = (svc.clone(), pool.clone(), t.admin.clone());
            tokio::spawn(async move {
                let mut tx = pool.begin().await.unwrap();
                let deleted = svc.delete_node(&mut *tx, dakar, &admin).await;
                if deleted.is_ok() {
                    tx.commit().await.unwrap();
                }
                deleted
            })
        };

        tokio::time::sleep(Duration::from_millis(300)).await;
        assert!(!deleter.is_finished());
        creating.commit().await.unwrap();

        let deleted = deleter.await.unwrap();
        assert!(matches!(deleted, Err(AppError::NodeHasChildren)));
    }
}
