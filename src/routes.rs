// src/routes.rs

use axum::{
    middleware as axum_middleware,
    routing::{get, post, put},
    Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::{config::AppState, docs::ApiDoc, handlers, middleware::auth::auth_guard};

pub fn build_router(app_state: AppState) -> Router {
    // Rotas protegidas: todas passam pelo auth_guard (JWT + membership)
    let protected_routes = Router::new()
        // --- Organização ---
        .route("/api/org", get(handlers::org::get_current_org))
        .route("/api/org/members", get(handlers::org::list_members))

        // --- Projetos ---
        .route("/api/projects", get(handlers::projects::list_projects))
        .route("/api/projects/{project_id}", get(handlers::projects::get_project))

        // --- Níveis ---
        .route("/api/administrative/states/{state_id}/levels"
               ,get(handlers::administrative::list_levels)
               .post(handlers::administrative::create_level)
        )
        .route("/api/administrative/states/{state_id}/levels/{level_id}"
               ,put(handlers::administrative::update_level)
               .delete(handlers::administrative::delete_level)
        )

        // --- Árvore e nós ---
        .route("/api/administrative/states/{state_id}/tree", get(handlers::administrative::get_tree))
        .route("/api/administrative/states/{state_id}/nodes", post(handlers::administrative::create_node))
        .route("/api/administrative/nodes/{node_id}"
               ,get(handlers::administrative::get_node)
               .put(handlers::administrative::update_node)
               .delete(handlers::administrative::delete_node)
        )
        .route("/api/administrative/nodes/{node_id}/children", get(handlers::administrative::get_children))
        .route("/api/administrative/nodes/{node_id}/hierarchy", get(handlers::administrative::get_hierarchy))
        .route("/api/administrative/nodes/{node_id}/subtree", get(handlers::administrative::get_subtree))
        .route("/api/administrative/nodes/{node_id}/projects", get(handlers::administrative::get_node_projects))

        // --- Atribuições ---
        .route("/api/administrative/nodes/{node_id}/users", post(handlers::administrative::assign_user))
        .route(
            "/api/administrative/states/{state_id}/users/{user_id}/nodes",
            get(handlers::administrative::get_user_nodes),
        )

        // --- Contratos ---
        .route("/api/contracts", post(handlers::contracts::create_contract))
        .route("/api/contracts/mine", get(handlers::contracts::my_contracts))
        .route("/api/contracts/org/{org_id}", get(handlers::contracts::list_org_contracts))
        .route("/api/contracts/{contract_id}", get(handlers::contracts::get_contract))
        .route("/api/contracts/{contract_id}/status", put(handlers::contracts::update_contract_status))
        .route("/api/contracts/{contract_id}/managers"
               ,get(handlers::contracts::list_managers)
               .post(handlers::contracts::assign_manager)
        )
        .route("/api/contracts/{contract_id}/check-manager", get(handlers::contracts::check_manager))
        .route("/api/contracts/managers/{manager_id}"
               ,get(handlers::contracts::get_manager)
               .delete(handlers::contracts::remove_manager)
        )
        .layer(axum_middleware::from_fn_with_state(
            app_state.clone(),
            auth_guard,
        ));

    Router::new()
        .route("/api/health", get(|| async { "OK" }))
        .merge(SwaggerUi::new("/api/docs").url("/api/openapi.json", ApiDoc::openapi()))
        .merge(protected_routes)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(app_state)
}
