// src/docs.rs

use utoipa::OpenApi;
use utoipa::openapi::security::{Http, HttpAuthScheme, SecurityScheme};
use crate::handlers;
use crate::models;

#[derive(OpenApi)]
#[openapi(
    info(title = "CityGrid API", description = "Hierarquia administrativa dos Estados"),
    paths(
        // --- Organization ---
        handlers::org::get_current_org,
        handlers::org::list_members,

        // --- Projects ---
        handlers::projects::list_projects,
        handlers::projects::get_project,

        // --- Administrative: níveis ---
        handlers::administrative::list_levels,
        handlers::administrative::create_level,
        handlers::administrative::update_level,
        handlers::administrative::delete_level,

        // --- Administrative: árvore e nós ---
        handlers::administrative::get_tree,
        handlers::administrative::create_node,
        handlers::administrative::get_node,
        handlers::administrative::update_node,
        handlers::administrative::delete_node,
        handlers::administrative::get_children,
        handlers::administrative::get_hierarchy,
        handlers::administrative::get_subtree,
        handlers::administrative::get_node_projects,

        // --- Administrative: atribuições ---
        handlers::administrative::assign_user,
        handlers::administrative::get_user_nodes,

        // --- Contracts ---
        handlers::contracts::create_contract,
        handlers::contracts::get_contract,
        handlers::contracts::list_org_contracts,
        handlers::contracts::update_contract_status,
        handlers::contracts::my_contracts,
        handlers::contracts::assign_manager,
        handlers::contracts::list_managers,
        handlers::contracts::check_manager,
        handlers::contracts::get_manager,
        handlers::contracts::remove_manager,
    ),
    components(
        schemas(
            // --- Organization ---
            models::org::Organization,
            models::org::OrgMember,

            // --- Projects ---
            models::project::Project,
            models::project::ProjectNodeSummary,

            // --- Administrative ---
            models::administrative::AdministrativeLevel,
            models::administrative::AdministrativeNode,
            models::administrative::AdministrativeNodeWithLevel,
            models::administrative::ParentSummary,
            models::administrative::AdministrativeNodeDetail,
            models::administrative::AdministrativeTreeNode,
            models::administrative::AssignmentScope,
            models::administrative::AdministrativeUserAssignment,
            models::administrative::UserNodeAssignment,

            // --- Contracts ---
            models::contract::ContractType,
            models::contract::ContractStatus,
            models::contract::GovernmentContract,
            models::contract::GovernmentOrgSummary,
            models::contract::ContractScopeEntry,
            models::contract::ContractDetail,
            models::contract::ContractManager,
            models::contract::ManagerUser,
            models::contract::ContractSummary,
            models::contract::ScopeNodeSummary,
            models::contract::ContractManagerDetail,
            models::contract::UserContract,
            models::contract::ContractManagerCheck,

            // --- Payloads ---
            models::administrative::CreateLevelPayload,
            models::administrative::UpdateLevelPayload,
            models::administrative::CreateNodePayload,
            models::administrative::UpdateNodePayload,
            models::administrative::AssignUserPayload,
            models::contract::CreateContractPayload,
            models::contract::AssignManagerPayload,
            models::contract::UpdateContractStatusPayload,
            handlers::administrative::MessageResponse,
        )
    ),
    tags(
        (name = "Organization", description = "Organização ativa e seus membros"),
        (name = "Projects", description = "Projetos ligados aos nós administrativos"),
        (name = "Administrative", description = "Níveis, nós, árvore e atribuições dos Estados"),
        (name = "Contracts", description = "Contratos dos Estados, escopo territorial e gestores")
    ),
    modifiers(&SecurityAddon)
)]
pub struct ApiDoc;

struct SecurityAddon;

impl utoipa::Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "api_jwt",
            SecurityScheme::Http(
                Http::new(HttpAuthScheme::Bearer)
            ),
        );
    }
}
