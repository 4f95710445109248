pub mod administrative_service;
pub mod contract_service;
pub mod hierarchy;
pub mod org_service;
pub mod project_service;
pub mod scope;
