use sqlx::{Postgres, Transaction};

use crate::common::error::AppError;
use crate::config::AppState;

// ---
// Transação da requisição
// ---
/// Abre a transação onde roda tudo que a requisição faz no banco.
/// O handler faz o commit; qualquer `?` antes disso descarta a transação (rollback).
pub(crate) async fn begin_request_transaction(
    app_state: &AppState,
) -> Result<Transaction<'static, Postgres>, AppError> {
    let tx = app_state.db_pool.begin().await?;
    Ok(tx)
}
