// src/services/hierarchy.rs

use std::collections::{HashMap, HashSet, VecDeque};

use uuid::Uuid;

use crate::models::administrative::{AdministrativeNodeWithLevel, AdministrativeTreeNode};

/// Fotografia imutável da hierarquia de um Estado, montada a cada requisição
/// a partir da lista plana de nós ativos. Nada aqui é compartilhado entre requisições.
///
/// Regras de ligação:
/// - um nó cujo pai não está na lista (inativo, de outro Estado, inexistente) vira raiz;
/// - filhos mantêm a ordem de entrada (o repositório entrega por nome);
/// - um ciclo nos dados é cortado no nó onde foi detectado, que vira raiz.
#[derive(Debug)]
pub struct HierarchySnapshot {
    nodes: Vec<AdministrativeNodeWithLevel>,
    index: HashMap<Uuid, usize>,
    parent: Vec<Option<usize>>,
    children: Vec<Vec<usize>>,
}

impl HierarchySnapshot {
    pub fn new(nodes: Vec<AdministrativeNodeWithLevel>) -> Self {
        let index: HashMap<Uuid, usize> = nodes
            .iter()
            .enumerate()
            .map(|(i, n)| (n.node.id, i))
            .collect();

        let mut parent: Vec<Option<usize>> = nodes
            .iter()
            .map(|n| {
                let parent_id = n.node.parent_id?;
                let found = index.get(&parent_id).copied();
                if found.is_none() {
                    tracing::debug!(node = %n.node.id, parent = %parent_id, "Pai fora do conjunto ativo; nó tratado como raiz");
                }
                found
            })
            .collect();

        break_cycles(&nodes, &mut parent);

        let mut children = vec![Vec::new(); nodes.len()];
        for (i, p) in parent.iter().enumerate() {
            if let Some(p) = p {
                children[*p].push(i);
            }
        }

        Self { nodes, index, parent, children }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Pai ligado na fotografia (ausente para raízes e órfãos).
    pub fn parent_of(&self, id: Uuid) -> Option<&AdministrativeNodeWithLevel> {
        let i = *self.index.get(&id)?;
        self.parent[i].map(|p| &self.nodes[p])
    }

    pub fn nodes_on_level(&self, level_id: Uuid) -> impl Iterator<Item = &AdministrativeNodeWithLevel> + '_ {
        self.nodes.iter().filter(move |n| n.level.id == level_id)
    }

    fn roots(&self) -> impl Iterator<Item = usize> + '_ {
        self.parent.iter().enumerate().filter(|(_, p)| p.is_none()).map(|(i, _)| i)
    }

    /// Índices em largura a partir de `start` (inclusive).
    fn breadth_first(&self, start: impl IntoIterator<Item = usize>) -> Vec<usize> {
        let mut order = Vec::with_capacity(self.nodes.len());
        let mut queue: VecDeque<usize> = start.into_iter().collect();
        while let Some(i) = queue.pop_front() {
            order.push(i);
            queue.extend(self.children[i].iter().copied());
        }
        order
    }

    /// Identificadores do nó e de todos os seus descendentes.
    /// Vazio quando o nó não faz parte da fotografia.
    pub fn subtree_ids(&self, id: Uuid) -> Vec<Uuid> {
        match self.index.get(&id) {
            Some(&i) => self
                .breadth_first([i])
                .into_iter()
                .map(|j| self.nodes[j].node.id)
                .collect(),
            None => Vec::new(),
        }
    }

    /// O nó seguido dos seus descendentes, em largura.
    pub fn subtree(&self, id: Uuid) -> Vec<AdministrativeNodeWithLevel> {
        match self.index.get(&id) {
            Some(&i) => self
                .breadth_first([i])
                .into_iter()
                .map(|j| self.nodes[j].clone())
                .collect(),
            None => Vec::new(),
        }
    }

    /// Cadeia raiz -> ... -> nó (inclusive).
    pub fn ancestry(&self, id: Uuid) -> Vec<AdministrativeNodeWithLevel> {
        let mut chain = Vec::new();
        let mut cursor = self.index.get(&id).copied();
        while let Some(i) = cursor {
            chain.push(self.nodes[i].clone());
            cursor = self.parent[i];
        }
        chain.reverse();
        chain
    }

    pub fn children_of(&self, id: Uuid) -> Vec<AdministrativeNodeWithLevel> {
        self.index
            .get(&id)
            .map(|&i| self.children[i].iter().map(|&c| self.nodes[c].clone()).collect())
            .unwrap_or_default()
    }

    /// `candidate` é `ancestor` ou está abaixo dele.
    pub fn is_in_subtree(&self, ancestor: Uuid, candidate: Uuid) -> bool {
        let Some(mut cursor) = self.index.get(&candidate).copied() else {
            return false;
        };
        loop {
            if self.nodes[cursor].node.id == ancestor {
                return true;
            }
            match self.parent[cursor] {
                Some(p) => cursor = p,
                None => return false,
            }
        }
    }

    /// Nova fotografia apenas com os nós permitidos. Quem perde o pai vira raiz.
    pub fn restrict(self, allowed: &HashSet<Uuid>) -> Self {
        let nodes = self
            .nodes
            .into_iter()
            .filter(|n| allowed.contains(&n.node.id))
            .collect();
        Self::new(nodes)
    }

    /// Monta a floresta decorada (filhos, profundidade, caminho).
    /// Raízes ordenadas por level_order crescente, de forma estável.
    pub fn into_forest(self) -> Vec<AdministrativeTreeNode> {
        let n = self.nodes.len();
        let order = self.breadth_first(self.roots());

        // Profundidade e caminho saem da cadeia de ancestrais, não da ordem de entrada
        let mut depth = vec![0usize; n];
        let mut path: Vec<Vec<String>> = vec![Vec::new(); n];
        for &i in &order {
            if let Some(p) = self.parent[i] {
                depth[i] = depth[p] + 1;
                let mut parent_path = path[p].clone();
                parent_path.push(self.nodes[p].node.name.clone());
                path[i] = parent_path;
            }
        }

        let root_indices: Vec<usize> = self.roots().collect();
        let children = self.children;
        let mut nodes: Vec<Option<AdministrativeNodeWithLevel>> =
            self.nodes.into_iter().map(Some).collect();
        let mut built: Vec<Option<AdministrativeTreeNode>> = (0..n).map(|_| None).collect();

        // Do mais fundo para o mais raso: os filhos ficam prontos antes do pai
        for &i in order.iter().rev() {
            let kids = children[i].iter().filter_map(|&c| built[c].take()).collect();
            if let Some(node) = nodes[i].take() {
                built[i] = Some(AdministrativeTreeNode {
                    node,
                    children: kids,
                    depth: depth[i],
                    path: std::mem::take(&mut path[i]),
                });
            }
        }

        let mut roots: Vec<AdministrativeTreeNode> = root_indices
            .into_iter()
            .filter_map(|i| built[i].take())
            .collect();
        roots.sort_by_key(|r| r.node.level.level_order);
        roots
    }
}

// Marca cada cadeia percorrida; reencontrar um nó da cadeia atual é um ciclo.
fn break_cycles(nodes: &[AdministrativeNodeWithLevel], parent: &mut [Option<usize>]) {
    const NEW: u8 = 0;
    const WALKING: u8 = 1;
    const DONE: u8 = 2;

    let mut state = vec![NEW; parent.len()];
    let mut chain = Vec::new();

    for start in 0..parent.len() {
        if state[start] != NEW {
            continue;
        }
        let mut cursor = start;
        loop {
            state[cursor] = WALKING;
            chain.push(cursor);
            let next = parent[cursor];
            match next {
                None => break,
                Some(p) if state[p] == DONE => break,
                Some(p) if state[p] == WALKING => {
                    tracing::warn!(
                        node = %nodes[cursor].node.id,
                        parent = %nodes[p].node.id,
                        "Ciclo na hierarquia administrativa; ligação ao pai ignorada"
                    );
                    parent[cursor] = None;
                    break;
                }
                Some(p) => cursor = p,
            }
        }
        for i in chain.drain(..) {
            state[i] = DONE;
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::models::administrative::{AdministrativeLevel, AdministrativeNode};
    use chrono::Utc;
    use serde_json::json;

    pub(crate) fn level(name: &str, order: i32) -> AdministrativeLevel {
        AdministrativeLevel {
            id: Uuid::new_v4(),
            state_id: Uuid::nil(),
            name: name.into(),
            code: name.to_uppercase(),
            level_order: order,
            color: "#6366f1".into(),
            icon: "map".into(),
            requires_parent: order > 1,
            metadata: json!({}),
            active: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    pub(crate) fn node(name: &str, level: &AdministrativeLevel, parent: Option<Uuid>) -> AdministrativeNodeWithLevel {
        AdministrativeNodeWithLevel {
            node: AdministrativeNode {
                id: Uuid::new_v4(),
                state_id: Uuid::nil(),
                parent_id: parent,
                level_id: level.id,
                name: name.into(),
                code: None,
                description: None,
                population: None,
                area_sqm: None,
                metadata: json!({}),
                active: true,
                created_at: Utc::now(),
                updated_at: Utc::now(),
            },
            level: level.clone(),
        }
    }

    fn id(n: &AdministrativeNodeWithLevel) -> Uuid {
        n.node.id
    }

    fn names(nodes: &[AdministrativeTreeNode]) -> Vec<&str> {
        nodes.iter().map(|n| n.node.node.name.as_str()).collect()
    }

    fn check_depths(nodes: &[AdministrativeTreeNode], expected_depth: usize) {
        for n in nodes {
            assert_eq!(n.depth, expected_depth);
            assert_eq!(n.path.len(), n.depth);
            check_depths(&n.children, expected_depth + 1);
        }
    }

    #[test]
    fn orphan_parent_becomes_root() {
        let region = level("region", 1);
        let commune = level("commune", 2);
        let a = node("A", &region, None);
        let b = node("B", &commune, Some(id(&a)));
        let c = node("C", &commune, Some(Uuid::new_v4()));

        let forest = HierarchySnapshot::new(vec![a, b, c]).into_forest();

        assert_eq!(names(&forest), vec!["A", "C"]);
        let a = &forest[0];
        assert_eq!(names(&a.children), vec!["B"]);
        assert_eq!(a.children[0].depth, 1);
        assert_eq!(a.children[0].path, vec!["A".to_string()]);
        assert_eq!(forest[1].depth, 0);
        assert!(forest[1].path.is_empty());
    }

    #[test]
    fn roots_sorted_by_level_order_and_stable() {
        let region = level("region", 1);
        let department = level("department", 2);
        let d = node("Dep orphan", &department, Some(Uuid::new_v4()));
        let r1 = node("R1", &region, None);
        let r2 = node("R2", &region, None);

        let forest = HierarchySnapshot::new(vec![d, r1, r2]).into_forest();
        assert_eq!(names(&forest), vec!["R1", "R2", "Dep orphan"]);
        let orders: Vec<i32> = forest.iter().map(|r| r.node.level.level_order).collect();
        assert!(orders.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn depth_matches_path_even_when_children_come_first() {
        let region = level("region", 1);
        let department = level("department", 2);
        let commune = level("commune", 3);
        let r = node("Dakar", &region, None);
        let d = node("Pikine", &department, Some(id(&r)));
        let c = node("Guinaw Rail", &commune, Some(id(&d)));

        // Entrada com o neto antes do avô
        let forest = HierarchySnapshot::new(vec![c, d, r]).into_forest();
        check_depths(&forest, 0);

        let grandchild = &forest[0].children[0].children[0];
        assert_eq!(grandchild.depth, 2);
        assert_eq!(grandchild.path, vec!["Dakar".to_string(), "Pikine".to_string()]);
    }

    #[test]
    fn children_keep_input_order() {
        let region = level("region", 1);
        let commune = level("commune", 2);
        let r = node("R", &region, None);
        let x = node("Ziguinchor", &commune, Some(id(&r)));
        let y = node("Bignona", &commune, Some(id(&r)));

        let forest = HierarchySnapshot::new(vec![r, x, y]).into_forest();
        assert_eq!(names(&forest[0].children), vec!["Ziguinchor", "Bignona"]);
    }

    #[test]
    fn parent_present_never_root() {
        let region = level("region", 1);
        let commune = level("commune", 2);
        let r = node("R", &region, None);
        let kids: Vec<_> = (0..5).map(|i| node(&format!("K{}", i), &commune, Some(id(&r)))).collect();

        let mut all = vec![r];
        all.extend(kids);
        let forest = HierarchySnapshot::new(all).into_forest();
        assert_eq!(forest.len(), 1);
        assert_eq!(forest[0].children.len(), 5);
    }

    #[test]
    fn cycle_is_cut_and_terminates() {
        let region = level("region", 1);
        let mut a = node("A", &region, None);
        let b = node("B", &region, Some(id(&a)));
        a.node.parent_id = Some(id(&b));
        let selfish = {
            let mut s = node("S", &region, None);
            s.node.parent_id = Some(s.node.id);
            s
        };

        let snapshot = HierarchySnapshot::new(vec![a, b, selfish]);
        let forest = snapshot.into_forest();

        let total: usize = forest.iter().map(|r| 1 + r.children.len()).sum();
        assert_eq!(total, 3);
        check_depths(&forest, 0);
    }

    #[test]
    fn subtree_and_ancestry() {
        let region = level("region", 1);
        let department = level("department", 2);
        let commune = level("commune", 3);
        let r = node("R", &region, None);
        let d1 = node("D1", &department, Some(id(&r)));
        let d2 = node("D2", &department, Some(id(&r)));
        let c = node("C", &commune, Some(id(&d1)));
        let (rid, d1id, d2id, cid) = (id(&r), id(&d1), id(&d2), id(&c));

        let snapshot = HierarchySnapshot::new(vec![r, d1, d2, c]);

        let sub: HashSet<Uuid> = snapshot.subtree_ids(d1id).into_iter().collect();
        assert_eq!(sub, HashSet::from([d1id, cid]));
        assert_eq!(snapshot.subtree_ids(rid).len(), 4);
        assert!(snapshot.subtree_ids(Uuid::new_v4()).is_empty());

        let chain: Vec<Uuid> = snapshot.ancestry(cid).iter().map(id).collect();
        assert_eq!(chain, vec![rid, d1id, cid]);

        let kids: Vec<Uuid> = snapshot.children_of(rid).iter().map(id).collect();
        assert_eq!(kids, vec![d1id, d2id]);

        assert!(snapshot.is_in_subtree(d1id, cid));
        assert!(snapshot.is_in_subtree(cid, cid));
        assert!(!snapshot.is_in_subtree(d2id, cid));
    }

    #[test]
    fn restrict_promotes_cut_nodes_to_roots() {
        let region = level("region", 1);
        let department = level("department", 2);
        let r = node("R", &region, None);
        let d = node("D", &department, Some(id(&r)));
        let did = id(&d);

        let forest = HierarchySnapshot::new(vec![r, d])
            .restrict(&HashSet::from([did]))
            .into_forest();
        assert_eq!(names(&forest), vec!["D"]);
        assert_eq!(forest[0].depth, 0);
    }

    #[test]
    fn empty_input_empty_forest() {
        let snapshot = HierarchySnapshot::new(Vec::new());
        assert!(snapshot.is_empty());
        assert!(snapshot.into_forest().is_empty());
    }
}
