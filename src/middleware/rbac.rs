// src/middleware/rbac.rs

use axum::{
    extract::{FromRef, FromRequestParts},
    http::request::Parts,
};
use std::marker::PhantomData;

use crate::{
    common::error::{ApiError, AppError},
    config::AppState,
    middleware::{auth::AuthenticatedUser, i18n::Locale},
};

/// 1. O Trait que define o que é uma Permissão
pub trait PermissionDef: Send + Sync + 'static {
    fn slug() -> &'static str;
}

/// Papéis da membership e o que cada um pode fazer.
/// Todo membro lê; só `owner` e `admin` alteram a hierarquia e os contratos.
pub fn role_grants(role: &str, permission: &str) -> bool {
    match permission {
        PERM_ADMINISTRATIVE_READ => true,
        PERM_ADMINISTRATIVE_WRITE => matches!(role, "owner" | "admin"),
        PERM_CONTRACTS_READ => true,
        PERM_CONTRACTS_WRITE => matches!(role, "owner" | "admin"),
        _ => false,
    }
}

/// 2. O Extractor (Guardião)
pub struct RequirePermission<T>(pub PhantomData<T>);

impl<T, S> FromRequestParts<S> for RequirePermission<T>
where
    T: PermissionDef,
    S: Send + Sync,
    AppState: FromRef<S>,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let user = AuthenticatedUser::from_request_parts(parts, state).await?;
        let required_perm = T::slug();

        if !role_grants(&user.0.role, required_perm) {
            let app_state = AppState::from_ref(state);
            let Ok(locale) = Locale::from_request_parts(parts, state).await;
            tracing::debug!("⛔ Papel '{}' sem a permissão '{}'", user.0.role, required_perm);
            return Err(AppError::MissingPermission(required_perm).to_api_error(&locale, &app_state.i18n_store));
        }

        Ok(RequirePermission(PhantomData))
    }
}

// ---
// DEFINIÇÃO DAS PERMISSÕES (TIPOS)
// ---

const PERM_ADMINISTRATIVE_READ: &str = "administrative:read";
const PERM_ADMINISTRATIVE_WRITE: &str = "administrative:write";
const PERM_CONTRACTS_READ: &str = "contracts:read";
const PERM_CONTRACTS_WRITE: &str = "contracts:write";

pub struct PermAdministrativeRead;
impl PermissionDef for PermAdministrativeRead {
    fn slug() -> &'static str { PERM_ADMINISTRATIVE_READ }
}

pub struct PermAdministrativeWrite;
impl PermissionDef for PermAdministrativeWrite {
    fn slug() -> &'static str { PERM_ADMINISTRATIVE_WRITE }
}

pub struct PermContractsRead;
impl PermissionDef for PermContractsRead {
    fn slug() -> &'static str { PERM_CONTRACTS_READ }
}

pub struct PermContractsWrite;
impl PermissionDef for PermContractsWrite {
    fn slug() -> &'static str { PERM_CONTRACTS_WRITE }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_member_reads() {
        for role in ["owner", "admin", "member", "viewer"] {
            assert!(role_grants(role, PermAdministrativeRead::slug()));
        }
    }

    #[test]
    fn only_owner_and_admin_write() {
        assert!(role_grants("owner", PermAdministrativeWrite::slug()));
        assert!(role_grants("admin", PermAdministrativeWrite::slug()));
        assert!(!role_grants("member", PermAdministrativeWrite::slug()));
    }

    #[test]
    fn contracts_follow_the_same_split() {
        assert!(role_grants("viewer", PermContractsRead::slug()));
        assert!(role_grants("admin", PermContractsWrite::slug()));
        assert!(!role_grants("member", PermContractsWrite::slug()));
    }

    #[test]
    fn unknown_permission_is_denied() {
        assert!(!role_grants("owner", "billing:write"));
    }
}
