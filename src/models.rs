pub mod administrative;
pub mod auth;
pub mod contract;
pub mod org;
pub mod project;
