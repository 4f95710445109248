// src/db/administrative_repo.rs

use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use sqlx::{Executor, FromRow, Postgres};
use uuid::Uuid;

use crate::{
    common::error::{map_unique_violation, AppError},
    models::administrative::{
        AdministrativeLevel, AdministrativeNode, AdministrativeNodeWithLevel,
        AdministrativeUserAssignment, AssignUserPayload, CreateLevelPayload, CreateNodePayload,
        UpdateLevelPayload, UpdateNodePayload, DEFAULT_LEVEL_COLOR, DEFAULT_LEVEL_ICON,
    },
};

const LEVEL_CODE_CONSTRAINT: &str = "administrative_level_state_code_key";
const LEVEL_ORDER_CONSTRAINT: &str = "administrative_level_state_order_key";

// Nó + nível numa única linha. As colunas do nível vêm com prefixo "l_"
// para não colidirem com as do nó.
const NODE_WITH_LEVEL_SELECT: &str = r#"
    SELECT
        n.id, n.state_id, n.parent_id, n.level_id, n.name, n.code, n.description,
        n.population, n.area_sqm, n.metadata, n.active, n.created_at, n.updated_at,
        l.id AS l_id, l.name AS l_name, l.code AS l_code, l.level_order AS l_level_order,
        l.color AS l_color, l.icon AS l_icon, l.requires_parent AS l_requires_parent,
        l.metadata AS l_metadata, l.active AS l_active,
        l.created_at AS l_created_at, l.updated_at AS l_updated_at
    FROM administrative_node n
    JOIN administrative_level l ON l.id = n.level_id
"#;

#[derive(Debug, FromRow)]
struct NodeWithLevelRow {
    #[sqlx(flatten)]
    node: AdministrativeNode,
    l_id: Uuid,
    l_name: String,
    l_code: String,
    l_level_order: i32,
    l_color: String,
    l_icon: String,
    l_requires_parent: bool,
    l_metadata: Value,
    l_active: bool,
    l_created_at: DateTime<Utc>,
    l_updated_at: DateTime<Utc>,
}

impl From<NodeWithLevelRow> for AdministrativeNodeWithLevel {
    fn from(row: NodeWithLevelRow) -> Self {
        let level = AdministrativeLevel {
            id: row.l_id,
            state_id: row.node.state_id,
            name: row.l_name,
            code: row.l_code,
            level_order: row.l_level_order,
            color: row.l_color,
            icon: row.l_icon,
            requires_parent: row.l_requires_parent,
            metadata: row.l_metadata,
            active: row.l_active,
            created_at: row.l_created_at,
            updated_at: row.l_updated_at,
        };
        Self { node: row.node, level }
    }
}

fn level_unique_error(code: Option<&str>, order: Option<i32>) -> impl FnOnce(&str) -> Option<AppError> + '_ {
    move |constraint| match constraint {
        LEVEL_CODE_CONSTRAINT => code.map(|c| AppError::LevelCodeAlreadyExists(c.to_string())),
        LEVEL_ORDER_CONSTRAINT => order.map(AppError::LevelOrderAlreadyExists),
        _ => None,
    }
}

/// Trava de linha tomada dentro da transação da requisição.
/// `Share` segura o pai enquanto um filho é ligado a ele; `Update` serializa
/// quem altera a própria linha (desativação do nó, mudança do nível).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowLock {
    Share,
    Update,
}

impl RowLock {
    fn level_clause(self) -> &'static str {
        match self {
            RowLock::Share => "FOR SHARE",
            RowLock::Update => "FOR UPDATE",
        }
    }

    // No join, FOR SHARE também trava a linha do nível do pai
    fn node_clause(self) -> &'static str {
        match self {
            RowLock::Share => "FOR SHARE",
            RowLock::Update => "FOR UPDATE OF n",
        }
    }
}

#[derive(Clone, Default)]
pub struct AdministrativeRepository;

impl AdministrativeRepository {
    pub fn new() -> Self {
        Self
    }

    // =========================================================================
    //  NÍVEIS
    // =========================================================================

    pub async fn list_active_levels<'e, E>(
        &self,
        executor: E,
        state_id: Uuid,
    ) -> Result<Vec<AdministrativeLevel>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let levels = sqlx::query_as::<_, AdministrativeLevel>(
            r#"
            SELECT * FROM administrative_level
            WHERE state_id = $1 AND active = true
            ORDER BY level_order ASC
            "#,
        )
            .bind(state_id)
            .fetch_all(executor)
            .await?;
        Ok(levels)
    }

    pub async fn find_level_locked<'e, E>(
        &self,
        executor: E,
        state_id: Uuid,
        level_id: Uuid,
        lock: RowLock,
    ) -> Result<Option<AdministrativeLevel>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let sql = format!(
            "SELECT * FROM administrative_level WHERE id = $1 AND state_id = $2 {}",
            lock.level_clause()
        );
        let level = sqlx::query_as::<_, AdministrativeLevel>(&sql)
            .bind(level_id)
            .bind(state_id)
            .fetch_optional(executor)
            .await?;
        Ok(level)
    }

    /// Menor level_order ativo do Estado (o topo da hierarquia).
    pub async fn top_level_order<'e, E>(
        &self,
        executor: E,
        state_id: Uuid,
    ) -> Result<Option<i32>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let order = sqlx::query_scalar::<_, Option<i32>>(
            "SELECT MIN(level_order) FROM administrative_level WHERE state_id = $1 AND active = true",
        )
            .bind(state_id)
            .fetch_one(executor)
            .await?;
        Ok(order)
    }

    /// Cria o nível aplicando os padrões (cor, ícone, requires_parent, metadata).
    pub async fn create_level<'e, E>(
        &self,
        executor: E,
        state_id: Uuid,
        input: &CreateLevelPayload,
    ) -> Result<AdministrativeLevel, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        sqlx::query_as::<_, AdministrativeLevel>(
            r#"
            INSERT INTO administrative_level
                (state_id, name, code, level_order, color, icon, requires_parent, metadata)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING *
            "#,
        )
            .bind(state_id)
            .bind(&input.name)
            .bind(&input.code)
            .bind(input.level_order)
            .bind(input.color.as_deref().unwrap_or(DEFAULT_LEVEL_COLOR))
            .bind(input.icon.as_deref().unwrap_or(DEFAULT_LEVEL_ICON))
            .bind(input.requires_parent.unwrap_or(true))
            .bind(input.metadata.clone().unwrap_or_else(|| json!({})))
            .fetch_one(executor)
            .await
            .map_err(|e| {
                map_unique_violation(e, level_unique_error(Some(&input.code), Some(input.level_order)))
            })
    }

    /// Atualização parcial: campos ausentes mantêm o valor atual.
    pub async fn update_level<'e, E>(
        &self,
        executor: E,
        state_id: Uuid,
        level_id: Uuid,
        input: &UpdateLevelPayload,
    ) -> Result<Option<AdministrativeLevel>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        sqlx::query_as::<_, AdministrativeLevel>(
            r#"
            UPDATE administrative_level SET
                name = COALESCE($3, name),
                code = COALESCE($4, code),
                level_order = COALESCE($5, level_order),
                color = COALESCE($6, color),
                icon = COALESCE($7, icon),
                requires_parent = COALESCE($8, requires_parent),
                metadata = COALESCE($9, metadata),
                active = COALESCE($10, active),
                updated_at = NOW()
            WHERE id = $1 AND state_id = $2
            RETURNING *
            "#,
        )
            .bind(level_id)
            .bind(state_id)
            .bind(input.name.as_deref())
            .bind(input.code.as_deref())
            .bind(input.level_order)
            .bind(input.color.as_deref())
            .bind(input.icon.as_deref())
            .bind(input.requires_parent)
            .bind(input.metadata.clone())
            .bind(input.active)
            .fetch_optional(executor)
            .await
            .map_err(|e| {
                map_unique_violation(e, level_unique_error(input.code.as_deref(), input.level_order))
            })
    }

    /// Conta nós que usam o nível, ativos ou não.
    pub async fn count_nodes_using_level<'e, E>(
        &self,
        executor: E,
        level_id: Uuid,
    ) -> Result<i64, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM administrative_node WHERE level_id = $1",
        )
            .bind(level_id)
            .fetch_one(executor)
            .await?;
        Ok(count)
    }

    pub async fn delete_level<'e, E>(
        &self,
        executor: E,
        state_id: Uuid,
        level_id: Uuid,
    ) -> Result<u64, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let result = sqlx::query("DELETE FROM administrative_level WHERE id = $1 AND state_id = $2")
            .bind(level_id)
            .bind(state_id)
            .execute(executor)
            .await?;
        Ok(result.rows_affected())
    }

    // =========================================================================
    //  NÓS
    // =========================================================================

    /// Todos os nós ativos do Estado com seus níveis, por nome.
    pub async fn list_active_nodes<'e, E>(
        &self,
        executor: E,
        state_id: Uuid,
    ) -> Result<Vec<AdministrativeNodeWithLevel>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let sql = format!(
            "{} WHERE n.state_id = $1 AND n.active = true ORDER BY n.name ASC, n.id ASC",
            NODE_WITH_LEVEL_SELECT
        );
        let rows = sqlx::query_as::<_, NodeWithLevelRow>(&sql)
            .bind(state_id)
            .fetch_all(executor)
            .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    pub async fn find_nodes_by_ids<'e, E>(
        &self,
        executor: E,
        node_ids: &[Uuid],
    ) -> Result<Vec<AdministrativeNodeWithLevel>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let sql = format!("{} WHERE n.id = ANY($1) ORDER BY n.name ASC", NODE_WITH_LEVEL_SELECT);
        let rows = sqlx::query_as::<_, NodeWithLevelRow>(&sql)
            .bind(node_ids)
            .fetch_all(executor)
            .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    /// Busca pelo id global, ativo ou não (o Estado é derivado da própria linha).
    pub async fn find_node<'e, E>(
        &self,
        executor: E,
        node_id: Uuid,
    ) -> Result<Option<AdministrativeNodeWithLevel>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let sql = format!("{} WHERE n.id = $1", NODE_WITH_LEVEL_SELECT);
        let row = sqlx::query_as::<_, NodeWithLevelRow>(&sql)
            .bind(node_id)
            .fetch_optional(executor)
            .await?;
        Ok(row.map(Into::into))
    }

    /// Nó do Estado, travado até o fim da transação.
    /// Em READ COMMITTED, quem esperou a trava relê a versão já confirmada da linha.
    pub async fn find_node_locked<'e, E>(
        &self,
        executor: E,
        state_id: Uuid,
        node_id: Uuid,
        lock: RowLock,
    ) -> Result<Option<AdministrativeNodeWithLevel>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let sql = format!(
            "{} WHERE n.id = $1 AND n.state_id = $2 {}",
            NODE_WITH_LEVEL_SELECT,
            lock.node_clause()
        );
        let row = sqlx::query_as::<_, NodeWithLevelRow>(&sql)
            .bind(node_id)
            .bind(state_id)
            .fetch_optional(executor)
            .await?;
        Ok(row.map(Into::into))
    }

    pub async fn create_node<'e, E>(
        &self,
        executor: E,
        state_id: Uuid,
        input: &CreateNodePayload,
    ) -> Result<AdministrativeNode, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        sqlx::query_as::<_, AdministrativeNode>(
            r#"
            INSERT INTO administrative_node
                (state_id, parent_id, level_id, name, code, description, population, area_sqm, metadata)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING *
            "#,
        )
            .bind(state_id)
            .bind(input.parent_id)
            .bind(input.level_id)
            .bind(&input.name)
            .bind(input.code.as_deref())
            .bind(input.description.as_deref())
            .bind(input.population)
            .bind(input.area_sqm)
            .bind(input.metadata.clone().unwrap_or_else(|| json!({})))
            .fetch_one(executor)
            .await
            .map_err(|e| map_unique_violation(e, |_| None))
    }

    /// Atualização parcial. `parent_id` só muda quando veio no payload
    /// (inclusive `null`, que transforma o nó em raiz).
    pub async fn update_node<'e, E>(
        &self,
        executor: E,
        node_id: Uuid,
        input: &UpdateNodePayload,
    ) -> Result<AdministrativeNode, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        sqlx::query_as::<_, AdministrativeNode>(
            r#"
            UPDATE administrative_node SET
                parent_id = CASE WHEN $2 THEN $3 ELSE parent_id END,
                level_id = COALESCE($4, level_id),
                name = COALESCE($5, name),
                code = COALESCE($6, code),
                description = COALESCE($7, description),
                population = COALESCE($8, population),
                area_sqm = COALESCE($9, area_sqm),
                metadata = COALESCE($10, metadata),
                updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
            .bind(node_id)
            .bind(input.parent_id.is_some())
            .bind(input.parent_id.flatten())
            .bind(input.level_id)
            .bind(input.name.as_deref())
            .bind(input.code.as_deref())
            .bind(input.description.as_deref())
            .bind(input.population)
            .bind(input.area_sqm)
            .bind(input.metadata.clone())
            .fetch_optional(executor)
            .await?
            .ok_or(AppError::NodeNotFound)
    }

    /// Só filhos diretos e ativos; netos não entram na conta.
    pub async fn count_active_children<'e, E>(
        &self,
        executor: E,
        node_id: Uuid,
    ) -> Result<i64, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM administrative_node WHERE parent_id = $1 AND active = true",
        )
            .bind(node_id)
            .fetch_one(executor)
            .await?;
        Ok(count)
    }

    pub async fn soft_delete_node<'e, E>(&self, executor: E, node_id: Uuid) -> Result<(), AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        sqlx::query(
            "UPDATE administrative_node SET active = false, updated_at = NOW() WHERE id = $1",
        )
            .bind(node_id)
            .execute(executor)
            .await?;
        Ok(())
    }

    // =========================================================================
    //  ATRIBUIÇÕES
    // =========================================================================

    /// Cria ou reativa a atribuição (uma por usuário e nó).
    pub async fn upsert_assignment<'e, E>(
        &self,
        executor: E,
        node_id: Uuid,
        input: &AssignUserPayload,
        appointed_by: Uuid,
    ) -> Result<AdministrativeUserAssignment, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let assignment = sqlx::query_as::<_, AdministrativeUserAssignment>(
            r#"
            INSERT INTO administrative_user (user_id, node_id, role, scope, appointed_by, active)
            VALUES ($1, $2, $3, $4, $5, true)
            ON CONFLICT (user_id, node_id)
            DO UPDATE SET
                role = EXCLUDED.role,
                scope = EXCLUDED.scope,
                appointed_by = EXCLUDED.appointed_by,
                appointed_at = NOW(),
                active = true,
                updated_at = NOW()
            RETURNING *
            "#,
        )
            .bind(input.user_id)
            .bind(node_id)
            .bind(&input.role)
            .bind(input.scope)
            .bind(appointed_by)
            .fetch_one(executor)
            .await?;
        Ok(assignment)
    }

    /// Atribuições ativas do usuário em nós ativos do Estado.
    pub async fn list_user_assignments<'e, E>(
        &self,
        executor: E,
        user_id: Uuid,
        state_id: Uuid,
    ) -> Result<Vec<AdministrativeUserAssignment>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let assignments = sqlx::query_as::<_, AdministrativeUserAssignment>(
            r#"
            SELECT au.*
            FROM administrative_user au
            JOIN administrative_node n ON n.id = au.node_id
            WHERE au.user_id = $1
              AND n.state_id = $2
              AND au.active = true
              AND n.active = true
            ORDER BY au.appointed_at ASC
            "#,
        )
            .bind(user_id)
            .bind(state_id)
            .fetch_all(executor)
            .await?;
        Ok(assignments)
    }
}
