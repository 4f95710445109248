// src/middleware/tenancy.rs

use axum::{
    extract::{FromRef, FromRequestParts},
    http::request::Parts,
};
use uuid::Uuid;

use crate::{common::error::ApiError, config::AppState, middleware::auth::AuthenticatedUser};

// A organização ativa da requisição. Vem do token (org_id), já validado
// contra a tabela membership pelo auth_guard.
#[derive(Debug, Clone, Copy)]
pub struct TenantContext(pub Uuid);

impl<S> FromRequestParts<S> for TenantContext
where
    S: Send + Sync,
    AppState: FromRef<S>,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let user = AuthenticatedUser::from_request_parts(parts, state).await?;
        Ok(TenantContext(user.0.org_id))
    }
}
