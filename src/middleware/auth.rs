// src/middleware/auth.rs

use axum::{
    extract::{FromRef, FromRequestParts, Request, State},
    http::request::Parts,
    middleware::Next,
    response::Response,
};
use axum_extra::headers::{authorization::Bearer, Authorization, HeaderMapExt};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};

use crate::{
    common::error::{ApiError, AppError},
    config::AppState,
    middleware::i18n::Locale,
    models::auth::{Claims, CurrentUser},
};

/// Valida assinatura (HS256) e expiração do token.
pub fn decode_claims(token: &str, secret: &str) -> Result<Claims, AppError> {
    let validation = Validation::new(Algorithm::HS256);
    let data = decode::<Claims>(token, &DecodingKey::from_secret(secret.as_bytes()), &validation)?;
    Ok(data.claims)
}

async fn authenticate(
    app_state: &AppState,
    authorization: Option<Authorization<Bearer>>,
) -> Result<CurrentUser, AppError> {
    let Authorization(bearer) = authorization.ok_or(AppError::InvalidToken)?;

    let claims = decode_claims(bearer.token(), &app_state.config.jwt_secret)?;

    // O papel vem sempre da tabela membership, nunca do token
    let role = app_state
        .org_repo
        .find_membership_role(claims.sub, claims.org_id)
        .await?
        .ok_or(AppError::NotOrgMember(claims.sub, claims.org_id))?;

    Ok(CurrentUser {
        id: claims.sub,
        email: claims.email,
        org_id: claims.org_id,
        role,
    })
}

// ---
// O middleware em si
// ---
pub async fn auth_guard(
    State(app_state): State<AppState>,
    locale: Locale,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let authorization = request.headers().typed_get::<Authorization<Bearer>>();
    let user = authenticate(&app_state, authorization)
        .await
        .map_err(|e| e.to_api_error(&locale, &app_state.i18n_store))?;

    tracing::debug!("🔐 Usuário {} autenticado na organização {}", user.id, user.org_id);

    // Insere o usuário nos "extensions" da requisição
    request.extensions_mut().insert(AuthenticatedUser(user));
    Ok(next.run(request).await)
}

// Extrator para obter o usuário autenticado diretamente nos handlers
#[derive(Debug, Clone)]
pub struct AuthenticatedUser(pub CurrentUser);

impl<S> FromRequestParts<S> for AuthenticatedUser
where
    S: Send + Sync,
    AppState: FromRef<S>,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        if let Some(user) = parts.extensions.get::<AuthenticatedUser>() {
            return Ok(user.clone());
        }

        // Rota montada sem o auth_guard
        let app_state = AppState::from_ref(state);
        let Ok(locale) = Locale::from_request_parts(parts, state).await;
        Err(AppError::InvalidToken.to_api_error(&locale, &app_state.i18n_store))
    }
}
