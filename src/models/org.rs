// src/models/org.rs

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

// ---
// 1. Organização (o tenant)
// ---
// Quando is_state = true, a organização é um "État" e possui uma hierarquia administrativa.
#[derive(Debug, Clone, Serialize, FromRow, ToSchema)]
pub struct Organization {
    pub id: Uuid,
    #[schema(example = "République du Sénégal")]
    pub name: String,
    pub is_state: bool,
    #[schema(example = "active")]
    pub subscription_status: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// ---
// 2. Membro da organização (membership + users)
// ---
#[derive(Debug, Clone, Serialize, FromRow, ToSchema)]
pub struct OrgMember {
    pub user_id: Uuid,
    #[schema(example = "maire@commune.sn")]
    pub email: String,
    pub full_name: Option<String>,
    #[schema(example = "admin")]
    pub role: String,
    pub created_at: DateTime<Utc>,
}
