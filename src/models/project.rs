// src/models/project.rs

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ProjectNodeSummary {
    pub id: Uuid,
    pub name: String,
    pub level_name: String,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct Project {
    pub id: Uuid,
    pub org_id: Uuid,
    pub administrative_node_id: Option<Uuid>,
    #[schema(example = "Centre de santé de Pikine")]
    pub name: String,
    pub description: Option<String>,
    #[schema(example = "draft")]
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub administrative_node: Option<ProjectNodeSummary>,
}

// Linha crua do LEFT JOIN project -> administrative_node -> administrative_level
#[derive(Debug, FromRow)]
pub struct ProjectRow {
    pub id: Uuid,
    pub org_id: Uuid,
    pub administrative_node_id: Option<Uuid>,
    pub name: String,
    pub description: Option<String>,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub node_name: Option<String>,
    pub node_level_name: Option<String>,
}

impl From<ProjectRow> for Project {
    fn from(row: ProjectRow) -> Self {
        // O resumo só existe quando o JOIN encontrou o nó
        let administrative_node = match (row.administrative_node_id, row.node_name, row.node_level_name) {
            (Some(id), Some(name), Some(level_name)) => Some(ProjectNodeSummary { id, name, level_name }),
            _ => None,
        };

        Self {
            id: row.id,
            org_id: row.org_id,
            administrative_node_id: row.administrative_node_id,
            name: row.name,
            description: row.description,
            status: row.status,
            created_at: row.created_at,
            updated_at: row.updated_at,
            administrative_node,
        }
    }
}
