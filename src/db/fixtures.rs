// src/db/fixtures.rs
//
// Dados de apoio para os testes com banco (#[sqlx::test] aplica ./migrations).

use sqlx::PgPool;
use uuid::Uuid;

use crate::models::auth::CurrentUser;

pub(crate) async fn insert_org(pool: &PgPool, name: &str, is_state: bool) -> Uuid {
    sqlx::query_scalar("INSERT INTO org (name, is_state) VALUES ($1, $2) RETURNING id")
        .bind(name)
        .bind(is_state)
        .fetch_one(pool)
        .await
        .unwrap()
}

/// Usuário já vinculado à organização com o papel dado.
pub(crate) async fn insert_user(pool: &PgPool, email: &str, org_id: Uuid, role: &str) -> CurrentUser {
    let id = Uuid::new_v4();
    sqlx::query("INSERT INTO users (id, email) VALUES ($1, $2)")
        .bind(id)
        .bind(email)
        .execute(pool)
        .await
        .unwrap();
    sqlx::query("INSERT INTO membership (user_id, org_id, role) VALUES ($1, $2, $3)")
        .bind(id)
        .bind(org_id)
        .bind(role)
        .execute(pool)
        .await
        .unwrap();
    CurrentUser { id, email: email.to_string(), org_id, role: role.to_string() }
}

pub(crate) async fn insert_level(pool: &PgPool, state_id: Uuid, code: &str, order: i32) -> Uuid {
    sqlx::query_scalar(
        "INSERT INTO administrative_level (state_id, name, code, level_order) VALUES ($1, $2, $2, $3) RETURNING id",
    )
        .bind(state_id)
        .bind(code)
        .bind(order)
        .fetch_one(pool)
        .await
        .unwrap()
}

pub(crate) async fn insert_node(
    pool: &PgPool,
    state_id: Uuid,
    level_id: Uuid,
    parent_id: Option<Uuid>,
    name: &str,
) -> Uuid {
    sqlx::query_scalar(
        r#"
        INSERT INTO administrative_node (state_id, level_id, parent_id, name)
        VALUES ($1, $2, $3, $4)
        RETURNING id
        "#,
    )
        .bind(state_id)
        .bind(level_id)
        .bind(parent_id)
        .bind(name)
        .fetch_one(pool)
        .await
        .unwrap()
}

pub(crate) async fn deactivate_node(pool: &PgPool, node_id: Uuid) {
    sqlx::query("UPDATE administrative_node SET active = false WHERE id = $1")
        .bind(node_id)
        .execute(pool)
        .await
        .unwrap();
}

pub(crate) async fn insert_project(pool: &PgPool, org_id: Uuid, node_id: Uuid, name: &str) -> Uuid {
    sqlx::query_scalar(
        "INSERT INTO project (org_id, administrative_node_id, name) VALUES ($1, $2, $3) RETURNING id",
    )
        .bind(org_id)
        .bind(node_id)
        .bind(name)
        .fetch_one(pool)
        .await
        .unwrap()
}

pub(crate) async fn assign(pool: &PgPool, user_id: Uuid, node_id: Uuid, scope: &str) {
    sqlx::query(
        "INSERT INTO administrative_user (user_id, node_id, role, scope) VALUES ($1, $2, 'prefet', $3::assignment_scope)",
    )
        .bind(user_id)
        .bind(node_id)
        .bind(scope)
        .execute(pool)
        .await
        .unwrap();
}
