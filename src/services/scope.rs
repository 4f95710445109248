// src/services/scope.rs

use std::collections::HashSet;

use uuid::Uuid;

use crate::{
    models::administrative::{AdministrativeUserAssignment, AssignmentScope},
    services::hierarchy::HierarchySnapshot,
};

/// Como o chamador enxerga um Estado nesta requisição.
#[derive(Debug)]
pub enum StateAccess {
    /// A organização do token é o próprio Estado
    Member,
    /// Acesso vindo de atribuições: só os nós listados
    Delegated(HashSet<Uuid>),
}

impl StateAccess {
    pub fn allows(&self, node_id: Uuid) -> bool {
        match self {
            StateAccess::Member => true,
            StateAccess::Delegated(ids) => ids.contains(&node_id),
        }
    }

    /// Mantém apenas os ids visíveis, preservando a ordem.
    pub fn filter_ids(&self, ids: Vec<Uuid>) -> Vec<Uuid> {
        match self {
            StateAccess::Member => ids,
            StateAccess::Delegated(allowed) => ids.into_iter().filter(|id| allowed.contains(id)).collect(),
        }
    }
}

/// `node` -> só o nó; `subtree` -> o nó e todos os descendentes ativos.
pub fn expand_scope(snapshot: &HierarchySnapshot, node_id: Uuid, scope: AssignmentScope) -> Vec<Uuid> {
    match scope {
        AssignmentScope::Node => vec![node_id],
        AssignmentScope::Subtree => snapshot.subtree_ids(node_id),
    }
}

/// União das expansões de todas as atribuições ativas do usuário.
pub fn authorized_nodes(
    snapshot: &HierarchySnapshot,
    assignments: &[AdministrativeUserAssignment],
) -> HashSet<Uuid> {
    assignments
        .iter()
        .filter(|a| a.active)
        .flat_map(|a| expand_scope(snapshot, a.node_id, a.scope))
        .collect()
}
