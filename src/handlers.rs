pub mod administrative;
pub mod contracts;
pub mod org;
pub mod projects;
