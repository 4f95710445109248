// src/models/auth.rs

use serde::{Deserialize, Serialize};
use uuid::Uuid;

// Estrutura de dados ("claims") dentro do JWT emitido pelo provedor de autenticação.
// O papel (role) que vem no token é ignorado: a fonte da verdade é a tabela membership.
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,     // Subject (ID do usuário)
    pub email: String,
    pub org_id: Uuid,  // Organização ativa do usuário
    pub exp: usize,    // Expiration time
    #[serde(default)]
    pub iat: Option<usize>,
}

/// O usuário da requisição, já com o papel lido do banco.
#[derive(Debug, Clone, Serialize)]
pub struct CurrentUser {
    pub id: Uuid,
    pub email: String,
    pub org_id: Uuid,
    pub role: String,
}
