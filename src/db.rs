pub mod administrative_repo;
pub use administrative_repo::{AdministrativeRepository, RowLock};
pub mod contract_repo;
pub use contract_repo::ContractRepository;
pub mod org_repo;
pub use org_repo::OrgRepository;
pub mod project_repo;
pub use project_repo::ProjectRepository;

#[cfg(test)]
pub(crate) mod fixtures;
